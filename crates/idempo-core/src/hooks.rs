//! Execution hooks.
//!
//! Cross-cutting concerns around a unit of work (metrics, extra logging,
//! audit) are expressed as an ordered chain of before/after/on-error hooks
//! invoked explicitly by the runner, rather than decorator-style
//! interception.

use async_trait::async_trait;
use serde_json::Value;

/// Context handed to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub fingerprint: String,
    /// Whether the result came from the cache rather than a fresh execution.
    /// Only meaningful in `after`.
    pub cached: bool,
}

/// Ordered before/after/on-error callbacks around one idempotent execution.
///
/// Hook failures are logged by the chain and never affect the execution
/// outcome.
#[async_trait]
pub trait ExecutionHook: Send + Sync {
    /// Invoked after fingerprint derivation, before any store access.
    async fn before(&self, ctx: &HookContext) -> Result<(), String>;

    /// Invoked after a successful outcome (fresh or cached).
    async fn after(&self, ctx: &HookContext, result: &Value) -> Result<(), String>;

    /// Invoked when the unit of work fails.
    async fn on_error(&self, ctx: &HookContext, error: &str) -> Result<(), String>;
}

/// No-op implementation for when no cross-cutting behavior is configured.
pub struct NoOpHook;

#[async_trait]
impl ExecutionHook for NoOpHook {
    async fn before(&self, _ctx: &HookContext) -> Result<(), String> {
        Ok(())
    }

    async fn after(&self, _ctx: &HookContext, _result: &Value) -> Result<(), String> {
        Ok(())
    }

    async fn on_error(&self, _ctx: &HookContext, _error: &str) -> Result<(), String> {
        Ok(())
    }
}

/// An ordered list of hooks invoked by the runner.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn ExecutionHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, hook: Box<dyn ExecutionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn run_before(&self, ctx: &HookContext) {
        for hook in &self.hooks {
            if let Err(e) = hook.before(ctx).await {
                tracing::warn!(fingerprint = %ctx.fingerprint, error = %e, "before hook failed");
            }
        }
    }

    pub async fn run_after(&self, ctx: &HookContext, result: &Value) {
        for hook in &self.hooks {
            if let Err(e) = hook.after(ctx, result).await {
                tracing::warn!(fingerprint = %ctx.fingerprint, error = %e, "after hook failed");
            }
        }
    }

    pub async fn run_on_error(&self, ctx: &HookContext, error: &str) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_error(ctx, error).await {
                tracing::warn!(fingerprint = %ctx.fingerprint, error = %e, "on_error hook failed");
            }
        }
    }
}

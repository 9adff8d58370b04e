//! Inbound event parsing.
//!
//! Two event sources feed the pipelines: object-storage "object created"
//! notifications for the thumbnail pipeline, and change-data-capture stream
//! batches for the payment pipeline. Both arrive as JSON; parsing is strict
//! about the fields the pipelines depend on and tolerant of everything else.

use serde_json::{Map, Number, Value};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Unsupported attribute value type: {0}")]
    UnsupportedAttribute(String),
}

/// Object-storage notification for a newly landed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

/// Parse an object-created notification.
///
/// Expected shape (EventBridge-style envelope):
/// `{"detail": {"bucket": {"name": ...}, "object": {"key": ..., "etag": ...}}}`
pub fn parse_object_created(event: &Value) -> Result<ObjectCreatedEvent, EventError> {
    let detail = event
        .get("detail")
        .ok_or_else(|| EventError::Malformed("missing detail".to_string()))?;

    let bucket = detail
        .pointer("/bucket/name")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing detail.bucket.name".to_string()))?;
    let key = detail
        .pointer("/object/key")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing detail.object.key".to_string()))?;
    let etag = detail
        .pointer("/object/etag")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing detail.object.etag".to_string()))?;

    Ok(ObjectCreatedEvent {
        bucket: bucket.to_string(),
        key: key.to_string(),
        etag: etag.to_string(),
    })
}

/// Mutation kind of a change-data-capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventName {
    Insert,
    Modify,
    Remove,
}

impl FromStr for StreamEventName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(StreamEventName::Insert),
            "MODIFY" => Ok(StreamEventName::Modify),
            "REMOVE" => Ok(StreamEventName::Remove),
            other => Err(EventError::Malformed(format!(
                "unknown stream event name: {}",
                other
            ))),
        }
    }
}

/// One record from a change-data-capture batch, with its item images already
/// unmarshalled to plain JSON.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub event_id: String,
    pub event_name: StreamEventName,
    pub new_image: Option<Value>,
    pub old_image: Option<Value>,
}

/// Parse an ordered change-data-capture batch.
///
/// Expected shape: `{"Records": [{"eventID", "eventName", "dynamodb":
/// {"NewImage": {...}, "OldImage": {...}}}]}` where the images are
/// attribute-value maps.
pub fn parse_stream_batch(event: &Value) -> Result<Vec<StreamRecord>, EventError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| EventError::Malformed("missing Records array".to_string()))?;

    records
        .iter()
        .map(|record| {
            let event_id = record
                .get("eventID")
                .and_then(Value::as_str)
                .ok_or_else(|| EventError::Malformed("record missing eventID".to_string()))?
                .to_string();
            let event_name = record
                .get("eventName")
                .and_then(Value::as_str)
                .ok_or_else(|| EventError::Malformed("record missing eventName".to_string()))?
                .parse()?;

            let new_image = record
                .pointer("/dynamodb/NewImage")
                .map(unmarshal_attribute_map)
                .transpose()?;
            let old_image = record
                .pointer("/dynamodb/OldImage")
                .map(unmarshal_attribute_map)
                .transpose()?;

            Ok(StreamRecord {
                event_id,
                event_name,
                new_image,
                old_image,
            })
        })
        .collect()
}

/// Convert a DynamoDB attribute-value map (`{"field": {"S": "x"}, ...}`) to
/// plain JSON.
pub fn unmarshal_attribute_map(image: &Value) -> Result<Value, EventError> {
    let map = image
        .as_object()
        .ok_or_else(|| EventError::Malformed("item image is not an object".to_string()))?;

    let mut out = Map::with_capacity(map.len());
    for (field, attr) in map {
        out.insert(field.clone(), unmarshal_attribute(attr)?);
    }
    Ok(Value::Object(out))
}

/// Convert one attribute value (`{"S": "x"}`, `{"N": "12.5"}`, ...).
fn unmarshal_attribute(attr: &Value) -> Result<Value, EventError> {
    let obj = attr
        .as_object()
        .ok_or_else(|| EventError::Malformed("attribute value is not an object".to_string()))?;
    let (type_tag, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| EventError::Malformed("empty attribute value".to_string()))?;

    match type_tag.as_str() {
        "S" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| EventError::Malformed("S attribute is not a string".to_string())),
        // Numbers arrive as strings to preserve precision on the wire.
        "N" => {
            let text = inner
                .as_str()
                .ok_or_else(|| EventError::Malformed("N attribute is not a string".to_string()))?;
            parse_number(text)
        }
        "BOOL" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| EventError::Malformed("BOOL attribute is not a boolean".to_string())),
        "NULL" => Ok(Value::Null),
        "M" => unmarshal_attribute_map(inner),
        "L" => {
            let items = inner
                .as_array()
                .ok_or_else(|| EventError::Malformed("L attribute is not an array".to_string()))?;
            items
                .iter()
                .map(unmarshal_attribute)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => Err(EventError::UnsupportedAttribute(other.to_string())),
    }
}

fn parse_number(text: &str) -> Result<Value, EventError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| EventError::Malformed(format!("unparseable number: {}", text)))
}

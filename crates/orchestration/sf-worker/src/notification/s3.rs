//! Native S3 event notifications.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sf_error::{Result, SfError};

use super::{malformed, object_notification, BucketEntity, ObjectEntity, ObjectNotification};

const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3EventRecord {
    event_name: String,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

pub(super) fn decode(value: Value) -> Result<Vec<ObjectNotification>> {
    let Value::Object(mut envelope) = unwrap_sns(value)? else {
        return Ok(Vec::new());
    };
    let Some(records) = envelope.remove("Records") else {
        return Ok(Vec::new());
    };

    let records: Vec<S3EventRecord> = serde_json::from_value(records).map_err(malformed)?;

    let mut notifications = Vec::with_capacity(records.len());
    for record in records {
        if !record.event_name.starts_with(OBJECT_CREATED_PREFIX) {
            continue;
        }
        if let Some(notification) = object_notification(&record.s3.bucket, &record.s3.object, record.event_time)? {
            notifications.push(notification);
        }
    }
    Ok(notifications)
}

/// Replace an SNS envelope by the notification in its `Message` field.
fn unwrap_sns(value: Value) -> Result<Value> {
    let inner = match &value {
        Value::Object(map) if !map.contains_key("Records") => map.get("Message").and_then(Value::as_str),
        _ => None,
    };
    match inner {
        Some(message) => serde_json::from_str(message)
            .map_err(|e| SfError::MalformedNotification(format!("SNS message is not JSON: {e}"))),
        None => Ok(value),
    }
}

//! EventBridge and Security Lake notifications.
//!
//! Both carry a single object under `detail.bucket` / `detail.object`.
//! EventBridge events also name their type in `detail-type`; Security Lake
//! notifications have no type and always announce a new object.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sf_error::Result;

use super::{object_notification, BucketEntity, ObjectEntity, ObjectNotification};

const OBJECT_CREATED_DETAIL_TYPE: &str = "Object Created";

#[derive(Debug, Deserialize)]
struct ObjectDetail {
    bucket: BucketEntity,
    object: ObjectEntity,
}

pub(super) fn decode_event_bridge(value: Value) -> Result<Vec<ObjectNotification>> {
    let detail_type = value.get("detail-type").and_then(Value::as_str);
    if detail_type != Some(OBJECT_CREATED_DETAIL_TYPE) {
        return Ok(Vec::new());
    }
    decode_detail(&value)
}

pub(super) fn decode_security_lake(value: Value) -> Result<Vec<ObjectNotification>> {
    decode_detail(&value)
}

fn decode_detail(value: &Value) -> Result<Vec<ObjectNotification>> {
    let Some(detail) = value.get("detail") else {
        return Ok(Vec::new());
    };
    let Ok(detail) = ObjectDetail::deserialize(detail) else {
        return Ok(Vec::new());
    };

    let event_time = value
        .get("time")
        .and_then(Value::as_str)
        .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
        .map(|time| time.with_timezone(&Utc));

    Ok(object_notification(&detail.bucket, &detail.object, event_time)?
        .into_iter()
        .collect())
}

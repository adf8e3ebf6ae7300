//! Notification decoding across wire formats.

use chrono::{TimeZone, Utc};
use serde_json::json;
use sf_types::{BucketOwners, NotificationSource, ObjectReference};
use sf_worker::NotificationDecoder;

use crate::common::{event_bridge_created, s3_created};

const TIME: &str = "2024-03-01T10:15:30Z";

#[test]
fn test_s3_and_event_bridge_decode_to_equal_pairs() {
    let native = NotificationDecoder::new(NotificationSource::S3)
        .decode(&s3_created("orders", "2024/03/01/part-0.json", TIME))
        .unwrap();
    let bridged = NotificationDecoder::new(NotificationSource::EventBridge)
        .decode(&event_bridge_created("orders", "2024/03/01/part-0.json", TIME))
        .unwrap();

    assert_eq!(native.len(), 1);
    assert_eq!(native, bridged);
    assert_eq!(native[0].reference, ObjectReference::new("orders", "2024/03/01/part-0.json"));
    assert_eq!(native[0].event_time, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap());
}

#[test]
fn test_sentinels_decode_to_nothing() {
    let decoder = NotificationDecoder::new(NotificationSource::S3);

    let test_event = json!({
        "Service": "Amazon S3",
        "Event": "s3:TestEvent",
        "Time": TIME,
        "Bucket": "orders"
    })
    .to_string();
    assert!(decoder.decode(&test_event).unwrap().is_empty());

    let folder_marker = json!({
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "eventTime": TIME,
            "s3": {"bucket": {"name": "orders"}, "object": {"key": "2024/03/", "size": 0}}
        }]
    })
    .to_string();
    assert!(decoder.decode(&folder_marker).unwrap().is_empty());

    let removed = json!({
        "Records": [{
            "eventName": "ObjectRemoved:Delete",
            "eventTime": TIME,
            "s3": {"bucket": {"name": "orders"}, "object": {"key": "gone.json"}}
        }]
    })
    .to_string();
    assert!(decoder.decode(&removed).unwrap().is_empty());
}

#[test]
fn test_malformed_bodies_are_errors() {
    let decoder = NotificationDecoder::new(NotificationSource::S3);
    assert!(decoder.decode("").is_err());
    assert!(decoder.decode("{not json").is_err());

    // Well-formed but unrelated traffic is not an error.
    assert!(decoder.decode(r#"{"hello":"world"}"#).unwrap().is_empty());
}

#[test]
fn test_sns_wrapped_and_encoded_keys() {
    let inner = s3_created("orders", "reports/Q1+summary%281%29.csv", TIME);
    let wrapped = json!({"Type": "Notification", "Message": inner}).to_string();

    let decoded = NotificationDecoder::new(NotificationSource::S3)
        .with_bucket_owners(BucketOwners::new().with_default_owner("111122223333"))
        .decode(&wrapped)
        .unwrap();

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].reference.key, "reports/Q1 summary(1).csv");
    assert_eq!(decoded[0].reference.owning_account_hint.as_deref(), Some("111122223333"));
}

#[test]
fn test_security_lake_notification() {
    let body = json!({
        "time": TIME,
        "detail": {
            "bucket": {"name": "lake"},
            "object": {"key": "ext/source/region=us-east-1/data.parquet", "size": 2048}
        }
    })
    .to_string();

    let decoded = NotificationDecoder::new(NotificationSource::SecurityLake).decode(&body).unwrap();
    assert_eq!(decoded[0].reference, ObjectReference::new("lake", "ext/source/region=us-east-1/data.parquet"));
}

//! Queue notification decoding.
//!
//! A message body is decoded into the objects it announces as created.
//! Three wire formats are supported, selected by [`NotificationSource`]:
//!
//! - native S3 event notifications (`Records` array), optionally wrapped in
//!   an SNS envelope
//! - EventBridge "Object Created" events
//! - Security Lake custom source notifications
//!
//! Only an empty body or invalid JSON is an error. Anything else that does
//! not announce a created object (test events, removals, folder markers,
//! unrelated traffic) decodes to an empty list so the message can be
//! deleted instead of being redelivered forever.

mod eventbridge;
mod s3;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sf_error::{Result, SfError};
use sf_types::{BucketOwners, NotificationSource, ObjectReference};

/// One object announced by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNotification {
    pub reference: ObjectReference,

    /// When the object store emitted the event
    pub event_time: DateTime<Utc>,
}

/// Decodes message bodies of one wire format.
#[derive(Debug, Clone, Default)]
pub struct NotificationDecoder {
    source: NotificationSource,
    owners: BucketOwners,
}

impl NotificationDecoder {
    pub fn new(source: NotificationSource) -> Self {
        Self {
            source,
            owners: BucketOwners::default(),
        }
    }

    /// Owners attached as the owning account hint of decoded references.
    pub fn with_bucket_owners(mut self, owners: BucketOwners) -> Self {
        self.owners = owners;
        self
    }

    pub fn source(&self) -> NotificationSource {
        self.source
    }

    /// Decode one message body.
    pub fn decode(&self, body: &str) -> Result<Vec<ObjectNotification>> {
        if body.trim().is_empty() {
            return Err(SfError::MalformedNotification("empty message body".to_string()));
        }
        let value: Value = serde_json::from_str(body).map_err(malformed)?;

        let mut notifications = match self.source {
            NotificationSource::S3 => s3::decode(value)?,
            NotificationSource::EventBridge => eventbridge::decode_event_bridge(value)?,
            NotificationSource::SecurityLake => eventbridge::decode_security_lake(value)?,
        };

        for notification in &mut notifications {
            let owner = self.owners.owner_for(&notification.reference.bucket).map(str::to_string);
            notification.reference.owning_account_hint = owner;
        }
        Ok(notifications)
    }
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    size: Option<u64>,
}

impl ObjectEntity {
    /// Zero-byte key ending in `/`, created by "create folder".
    fn is_folder_marker(&self) -> bool {
        self.size == Some(0) && self.key.ends_with('/')
    }
}

/// Build a notification, or `None` for folder markers.
fn object_notification(
    bucket: &BucketEntity,
    object: &ObjectEntity,
    event_time: Option<DateTime<Utc>>,
) -> Result<Option<ObjectNotification>> {
    if object.is_folder_marker() {
        return Ok(None);
    }
    Ok(Some(ObjectNotification {
        reference: ObjectReference::new(&bucket.name, decode_key(&object.key)?),
        event_time: event_time.unwrap_or_else(Utc::now),
    }))
}

/// Keys arrive form-encoded: `+` is a space, everything else is percent-encoded.
fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| SfError::MalformedNotification(format!("object key {raw:?} is not valid UTF-8: {e}")))
}

fn malformed(error: serde_json::Error) -> SfError {
    SfError::MalformedNotification(error.to_string())
}

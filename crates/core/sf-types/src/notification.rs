//! Queue-based discovery settings.

use serde::{Deserialize, Serialize};

/// Wire format of queue notification bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    /// Native S3 event notification (`Records` array), optionally SNS-wrapped
    #[default]
    S3,

    /// EventBridge "Object Created" event
    EventBridge,

    /// Security Lake custom source notification
    SecurityLake,
}

/// What to do with a queue message whose body cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorOption {
    /// Leave it on the queue; it is redelivered after the visibility timeout
    #[default]
    RetainMessages,

    /// Delete it
    DeleteMessages,
}

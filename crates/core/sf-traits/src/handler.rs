//! Downstream object handler trait.

use async_trait::async_trait;
use sf_error::Result;
use sf_types::{DataSelection, ObjectReference};
use std::sync::Arc;

use crate::AcknowledgementSet;

/// Consumes object references (the buffering/codec layer).
///
/// When an acknowledgement set is given, the handler adds one
/// [`DeliveryHandle`](crate::DeliveryHandle) per record it emits and
/// releases each once the record is durably written. Errors are returned
/// unchanged to the caller, which decides whether the unit of work is
/// retried; [`StoreError::NoSuchKey`](sf_error::StoreError::NoSuchKey) means
/// the object vanished after discovery.
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    async fn process_object(
        &self,
        reference: &ObjectReference,
        selection: DataSelection,
        acknowledgements: Option<Arc<dyn AcknowledgementSet>>,
    ) -> Result<()>;
}

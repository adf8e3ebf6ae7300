//! Integration tests for scanflow.
//!
//! Most tests run against the in-memory coordinator, store, queue and
//! acknowledgement manager from `sf-memory`. Tests that talk to S3 and SQS
//! need LocalStack and are marked `#[ignore]`.
//!
//! ## Running LocalStack Tests
//!
//! 1. Start LocalStack:
//!    ```bash
//!    docker run -d -p 4566:4566 localstack/localstack
//!    ```
//!
//! 2. Run the ignored tests:
//!    ```bash
//!    LOCALSTACK_ENDPOINT=http://localhost:4566 cargo test -p integration-tests -- --ignored
//!    ```

mod common;
mod coordinator_test;
mod discovery_test;
mod notification_test;
mod poller_test;
mod scan_test;
mod sqs_test;

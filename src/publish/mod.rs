//! Publishing documents to the ingestion endpoint

pub mod engine;
pub mod payload;
pub mod response;
pub mod retry;

pub use engine::{PublishEngine, INGEST_PATH, USER_AGENT};
pub use payload::{
    HeartbeatFrame, PayloadKind, SensorFrame, SensorReadings, TestFrame, MAX_DOCUMENT_BYTES,
    OMITTED_READING,
};
pub use response::Response;
pub use retry::{classify, Outcome, RetryPolicy};

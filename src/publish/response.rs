//! Publish result value

use crate::error::{ErrorKind, PublishError};
use bytes::Bytes;
use serde::Serialize;

/// Result of one publish call, returned by value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub ok: bool,
    /// HTTP status of the last attempt, or `<= 0` when none completed
    pub http_code: i32,
    #[serde(serialize_with = "body_as_text")]
    pub body: Bytes,
    pub error_kind: ErrorKind,
    pub error_detail: String,
}

fn body_as_text<S: serde::Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

impl Response {
    pub fn success(http_code: i32, body: Bytes) -> Self {
        Self {
            ok: true,
            http_code,
            body,
            error_kind: ErrorKind::None,
            error_detail: String::new(),
        }
    }

    /// Failure raised before any exchange took place
    pub fn rejected(error: PublishError) -> Self {
        Self {
            ok: false,
            http_code: 0,
            body: Bytes::new(),
            error_kind: error.kind(),
            error_detail: error.to_string(),
        }
    }

    /// Failure classified from an exchange
    pub fn failed(http_code: i32, body: Bytes, error: &PublishError, detail: String) -> Self {
        Self {
            ok: false,
            http_code,
            body,
            error_kind: error.kind(),
            error_detail: detail,
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

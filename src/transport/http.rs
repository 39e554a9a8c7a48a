//! reqwest-backed [`HttpTransport`]
//!
//! Redirects are only followed within the origin of the original request.
//! A cross-origin redirect is not followed and its 3xx status is returned
//! to the caller as-is.

use super::{codes, HttpReply, HttpRequest, HttpTransport};
use async_trait::async_trait;
use reqwest::redirect::{Attempt, Policy};
use tracing::{debug, warn};

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// HTTP transport built on a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the same-origin redirect policy
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::custom(same_origin_redirect))
            .build()?;
        Ok(Self { client })
    }
}

fn same_origin_redirect(attempt: Attempt) -> reqwest::redirect::Action {
    if attempt.previous().len() > MAX_REDIRECTS {
        return attempt.error("too many redirects");
    }
    let same_origin = attempt
        .previous()
        .first()
        .is_some_and(|original| original.origin() == attempt.url().origin());
    if same_origin {
        attempt.follow()
    } else {
        attempt.stop()
    }
}

/// Map a reqwest failure onto a transport failure code
fn failure_code(error: &reqwest::Error) -> i32 {
    if error.is_timeout() {
        codes::READ_TIMEOUT
    } else if error.is_connect() {
        codes::CONNECTION_REFUSED
    } else if error.is_body() || error.is_decode() {
        codes::NO_STREAM
    } else {
        codes::SEND_FAILED
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: &HttpRequest) -> HttpReply {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let code = failure_code(&e);
                warn!(url = %request.url, code, error = %e, "HTTP request failed");
                return HttpReply::transport_failure(code);
            }
        };

        let code = i32::from(response.status().as_u16());
        match response.bytes().await {
            Ok(body) => {
                debug!(url = %request.url, code, bytes = body.len(), "HTTP response received");
                HttpReply::new(code, body)
            }
            Err(e) => {
                warn!(url = %request.url, code, error = %e, "Failed to read response body");
                HttpReply::new(code, bytes::Bytes::new())
            }
        }
    }
}

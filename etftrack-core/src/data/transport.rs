//! Blocking HTTP transport for the monthly report endpoint.
//!
//! The exchange serves its CSV reports in Big5, so the body is decoded here
//! before any parsing happens.

use super::provider::DataError;
use std::time::Duration;

/// Raw response of one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport contract used by the page fetcher. Transport failures (connect,
/// timeout, body read) come back as [`DataError::Remote`].
pub trait PageTransport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<PageResponse, DataError>;
}

impl<T: PageTransport + ?Sized> PageTransport for std::sync::Arc<T> {
    fn get(&self, url: &str, timeout: Duration) -> Result<PageResponse, DataError> {
        (**self).get(url, timeout)
    }
}

/// Production transport using reqwest's blocking client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    encoding: &'static encoding_rs::Encoding,
}

impl ReqwestTransport {
    /// Client that decodes bodies as Big5.
    pub fn new() -> Result<Self, DataError> {
        Self::with_encoding(encoding_rs::BIG5)
    }

    pub fn with_encoding(encoding: &'static encoding_rs::Encoding) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, encoding })
    }
}

impl PageTransport for ReqwestTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<PageResponse, DataError> {
        let resp = self.client.get(url).timeout(timeout).send().map_err(|e| {
            if e.is_timeout() {
                DataError::Remote(format!("request timeout: {e}"))
            } else if e.is_connect() {
                DataError::Remote(format!("connection failed: {e}"))
            } else {
                DataError::Remote(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status().as_u16();
        let bytes = resp
            .bytes()
            .map_err(|e| DataError::Remote(format!("failed to read response body: {e}")))?;
        let (body, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            tracing::debug!(url, "response body contained undecodable bytes");
        }

        Ok(PageResponse {
            status,
            body: body.into_owned(),
        })
    }
}

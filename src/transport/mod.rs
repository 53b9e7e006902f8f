//! HTTP transport abstraction.
//!
//! The rest of the crate only sees [`Transport`]: it sends a GET request and
//! hands back the raw response, reporting download progress along the way.
//! Status codes are not interpreted here; a 404 is a valid response.

mod http;

pub use http::ReqwestTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::errors::ServerResult;

/// A GET request to the index server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    pub url: String,
    /// Query parameters, in insertion order.
    pub params: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

impl WebRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            user_agent: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Value of the first parameter named `key`.
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    pub code: u16,
    pub body: Vec<u8>,
}

impl WebResponse {
    pub fn new(code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// Whether the status code is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Download progress of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebProgress {
    pub downloaded: u64,
    /// Total body size, when the server announced it.
    pub total: Option<u64>,
}

impl WebProgress {
    /// Download progress in percent.
    pub fn download_progress(&self) -> Option<u8> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(((self.downloaded.min(total) * 100) / total) as u8),
        }
    }
}

/// Asynchronous GET primitive used by every server request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Performs the request.
    ///
    /// Returns `ServerError::Transport` with code 0 when no response was
    /// received at all. Any response, whatever its status, is returned as is.
    async fn get(
        &self,
        request: &WebRequest,
        on_progress: &(dyn Fn(WebProgress) + Send + Sync),
    ) -> ServerResult<WebResponse>;
}

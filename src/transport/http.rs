//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;

use super::{Transport, WebProgress, WebRequest, WebResponse};
use crate::types::config::ServerConfig;
use crate::types::errors::{ModIndexResult, ServerError, ServerResult};

/// Upper bound for pre-allocating a body from its announced length.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// Production transport over HTTP(S).
///
/// Timeouts are enforced here, per request, by the underlying client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests give up after `timeout`.
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> ModIndexResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ServerConfig) -> ModIndexResult<Self> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn get(
        &self,
        request: &WebRequest,
        on_progress: &(dyn Fn(WebProgress) + Send + Sync),
    ) -> ServerResult<WebResponse> {
        let mut builder = self.client.get(&request.url).query(&request.params);
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }

        let mut response = builder.send().await.map_err(|e| connection_error(&e))?;
        let code = response.status().as_u16();
        let total = response.content_length();

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOC) as usize);
        while let Some(chunk) = response.chunk().await.map_err(|e| connection_error(&e))? {
            body.extend_from_slice(&chunk);
            on_progress(WebProgress {
                downloaded: body.len() as u64,
                total,
            });
        }

        tracing::trace!(url = %request.url, code, bytes = body.len(), "Response received");
        Ok(WebResponse { code, body })
    }
}

fn connection_error(error: &reqwest::Error) -> ServerError {
    let code = error.status().map(|s| s.as_u16()).unwrap_or(0);
    ServerError::transport(code, error.to_string())
}

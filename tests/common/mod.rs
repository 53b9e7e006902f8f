//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use modindex::server::{InstalledMods, ServerClient};
use modindex::transport::{Transport, WebProgress, WebRequest, WebResponse};
use modindex::types::config::Config;
use modindex::types::errors::ServerResult;
use modindex::types::models::{InstalledMod, VersionInfo};

type Handler = dyn Fn(&WebRequest) -> ServerResult<WebResponse> + Send + Sync;

/// In-memory transport answering through a handler closure.
///
/// Records every request and counts requests whose body is still running,
/// so tests can observe cancellation reaching the transport.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Duration,
    requests: Mutex<Vec<WebRequest>>,
    active: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&WebRequest) -> ServerResult<WebResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every request takes `delay` before it is answered.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<WebRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests whose URL ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    /// Requests currently being answered.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(
        &self,
        request: &WebRequest,
        on_progress: &(dyn Fn(WebProgress) + Send + Sync),
    ) -> ServerResult<WebResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = (self.handler)(request)?;
        let size = response.body.len() as u64;
        on_progress(WebProgress {
            downloaded: size,
            total: Some(size),
        });
        Ok(response)
    }
}

/// `{ "payload": value }` with status 200.
pub fn payload(value: Value) -> WebResponse {
    WebResponse::new(200, json!({ "payload": value }).to_string())
}

pub fn version_json(mod_id: &str, version: &str) -> Value {
    json!({
        "mod_id": mod_id,
        "name": mod_id,
        "description": "A mod",
        "version": version,
        "download_link": format!("https://cdn.test/{mod_id}.zip"),
        "download_count": 5,
        "hash": "deadbeef",
        "geode": "4.0.0",
        "gd": { "win": "2.206", "android64": "*" }
    })
}

pub fn mod_json(id: &str, version: &str) -> Value {
    json!({
        "id": id,
        "featured": true,
        "download_count": 42,
        "developers": [{ "username": "dev", "display_name": "Dev", "is_owner": true }],
        "versions": [version_json(id, version)],
        "tags": ["utility"]
    })
}

pub fn installed(count: usize) -> Vec<InstalledMod> {
    (0..count)
        .map(|i| InstalledMod::new(format!("dev.mod{i}"), VersionInfo::new(1, 0, 0)))
        .collect()
}

pub fn test_config() -> Config {
    let mut config = Config::default_config();
    config.server.base_url = "https://index.test/v1".to_string();
    config.server.platform = "win".to_string();
    config
}

pub fn client_with(
    transport: Arc<MockTransport>,
    installed: Vec<InstalledMod>,
    config: &Config,
) -> ServerClient {
    let installed: Arc<dyn InstalledMods> = Arc::new(installed);
    ServerClient::new(config, transport, installed)
}

/// Answers `/mods/updates` with one newer version per requested ID.
pub fn updates_handler(request: &WebRequest) -> ServerResult<WebResponse> {
    let ids = request.get_param("ids").unwrap_or_default();
    let updates: Vec<Value> = ids
        .split(';')
        .filter(|id| !id.is_empty())
        .map(|id| json!({ "id": id, "version": "1.1.0" }))
        .collect();
    Ok(payload(Value::Array(updates)))
}

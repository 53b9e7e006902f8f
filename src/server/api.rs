//! Uncached fetch functions for every index server endpoint.
//!
//! Each function builds a [`WebRequest`], spawns it on the configured
//! [`Transport`] and parses the answer. Caching is layered on top by
//! [`ServerClient`](super::ServerClient).

use std::sync::Arc;

use serde_json::Value;

use super::batch;
use super::installed::InstalledMods;
use crate::request::{ServerProgress, ServerRequest};
use crate::transport::{Transport, WebProgress, WebRequest, WebResponse};
use crate::types::config::ServerConfig;
use crate::types::errors::{ServerError, ServerResult};
use crate::types::models::{
    json_type_name, ModVersionSelector, ModsQuery, ParseResult, ServerModMetadata,
    ServerModUpdate, ServerModVersion, ServerModsList, ServerTag,
};

/// Unwraps the `{ "payload": ... }` envelope of a successful response.
pub fn parse_server_payload(response: &WebResponse) -> ServerResult<Value> {
    let code = response.code;
    let json = response.json().map_err(|e| {
        ServerError::payload(code, format!("Response was not valid JSON: {e}"))
    })?;

    match json {
        Value::Object(mut object) => match object.remove("payload") {
            Some(payload) => Ok(payload),
            None => Err(ServerError::payload(
                code,
                format!(
                    "Object does not contain \"payload\" key - got {}",
                    Value::Object(object)
                ),
            )),
        },
        other => Err(ServerError::payload(
            code,
            format!("Expected object, got {}", json_type_name(&other)),
        )),
    }
}

/// Builds the error for a non-2xx response.
pub fn parse_server_error(response: &WebResponse) -> ServerError {
    let code = response.code;
    match response.json() {
        Ok(json) => match json.get("error").and_then(Value::as_str) {
            Some(message) => ServerError::transport(code, message),
            None => ServerError::transport(code, "Unknown (not valid JSON)"),
        },
        Err(_) => ServerError::transport(
            code,
            response.text().unwrap_or("Unknown (not a valid string)"),
        ),
    }
}

/// Parses a JSON endpoint response with `parse`.
pub fn parse_json_response<T>(
    response: &WebResponse,
    parse: impl FnOnce(&Value) -> ParseResult<T>,
) -> ServerResult<T> {
    if !response.ok() {
        return Err(parse_server_error(response));
    }
    let payload = parse_server_payload(response)?;
    parse(&payload).map_err(|e| {
        ServerError::payload(response.code, format!("Unable to parse response: {e}"))
    })
}

fn download_progress(label: &str, progress: WebProgress) -> ServerProgress {
    match progress.download_progress() {
        Some(percentage) => ServerProgress::with_percentage(label, percentage),
        None => ServerProgress::new(label),
    }
}

/// Uncached access to the index server.
pub struct ServerApi {
    transport: Arc<dyn Transport>,
    config: ServerConfig,
    installed: Arc<dyn InstalledMods>,
    max_batch_size: usize,
}

impl ServerApi {
    pub fn new(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
        installed: Arc<dyn InstalledMods>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            transport,
            config,
            installed,
            max_batch_size,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn request(&self, path: &str) -> WebRequest {
        WebRequest::new(self.config.url(path)).user_agent(self.config.user_agent())
    }

    /// Spawns `request` and hands the response to `parse`.
    fn send<T, P>(
        &self,
        name: impl Into<String>,
        label: impl Into<String>,
        request: WebRequest,
        parse: P,
    ) -> ServerRequest<T>
    where
        T: Clone + Send + Sync + 'static,
        P: FnOnce(WebResponse) -> ServerResult<T> + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let label = label.into();

        ServerRequest::spawn(name, move |progress| async move {
            tracing::debug!(transport = transport.name(), url = %request.url, "Sending request");
            progress.report(ServerProgress::new(label.as_str()));

            let report = move |web: WebProgress| progress.report(download_progress(&label, web));
            let response = transport.get(&request, &report).await?;
            parse(response)
        })
    }

    /// One page of the mod listing.
    pub fn fetch_mods(&self, query: &ModsQuery) -> ServerRequest<ServerModsList> {
        let mut request = self.request("/mods");
        if let Some(text) = &query.query {
            request = request.param("query", text);
        }
        request = request
            .param("gd", &self.config.game_version)
            .param("geode", &self.config.loader_version);
        if !query.platforms.is_empty() {
            request = request.param("platforms", query.platforms.join(","));
        }
        if !query.tags.is_empty() {
            request = request.param("tags", query.tags.join(","));
        }
        if let Some(featured) = query.featured {
            request = request.param("featured", featured.to_string());
        }
        request = request.param("sort", query.sorting.as_str());
        if let Some(developer) = &query.developer {
            request = request.param("developer", developer);
        }
        request = request
            .param("page", (query.page + 1).to_string())
            .param("per_page", query.page_size.to_string());

        self.send("Get mods", "Downloading mods", request, |response| {
            if response.code == 404 {
                return Ok(ServerModsList::default());
            }
            parse_json_response(&response, ServerModsList::parse)
        })
    }

    pub fn fetch_mod(&self, id: &str) -> ServerRequest<ServerModMetadata> {
        let request = self.request(&format!("/mods/{id}"));
        self.send(
            format!("Get mod {id}"),
            format!("Downloading metadata for {id}"),
            request,
            |response| parse_json_response(&response, ServerModMetadata::parse),
        )
    }

    pub fn fetch_mod_version(
        &self,
        id: &str,
        selector: &ModVersionSelector,
    ) -> ServerRequest<ServerModVersion> {
        let segment = match selector {
            ModVersionSelector::Latest | ModVersionSelector::Major(_) => "latest".to_string(),
            ModVersionSelector::Specific(version) => version.to_non_v_string(),
        };

        let mut request = self
            .request(&format!("/mods/{id}/versions/{segment}"))
            .param("gd", &self.config.game_version)
            .param("platforms", &self.config.platform);
        if let ModVersionSelector::Major(major) = selector {
            request = request.param("major", major.to_string());
        }

        self.send(
            format!("Get version {segment} of {id}"),
            format!("Downloading metadata for {id}"),
            request,
            |response| parse_json_response(&response, ServerModVersion::parse),
        )
    }

    /// Logo image bytes; this endpoint has no JSON envelope.
    pub fn fetch_mod_logo(&self, id: &str) -> ServerRequest<Vec<u8>> {
        let request = self.request(&format!("/mods/{id}/logo"));
        self.send(
            format!("Get logo for {id}"),
            format!("Downloading logo for {id}"),
            request,
            |response| {
                if response.ok() {
                    Ok(response.body)
                } else {
                    Err(parse_server_error(&response))
                }
            },
        )
    }

    pub fn fetch_tags(&self) -> ServerRequest<Vec<ServerTag>> {
        let request = self.request("/detailed-tags");
        self.send("Get tags", "Downloading valid tags", request, |response| {
            parse_json_response(&response, ServerTag::parse_list)
        })
    }

    /// Single update check request for `ids`, however many there are.
    pub fn batched_check_updates(&self, ids: &[String]) -> ServerRequest<Vec<ServerModUpdate>> {
        let request = self
            .request("/mods/updates")
            .param("platform", &self.config.platform)
            .param("gd", &self.config.game_version)
            .param("geode", &self.config.loader_version)
            .param("ids", ids.join(";"));

        self.send(
            format!("Check updates for {} mods", ids.len()),
            "Checking updates for mods",
            request,
            |response| parse_json_response(&response, ServerModUpdate::parse_list),
        )
    }

    /// Update check over every installed mod, split into batches.
    pub fn check_all_updates(self: &Arc<Self>) -> ServerRequest<Vec<ServerModUpdate>> {
        let ids: Vec<String> = self
            .installed
            .installed_mods()
            .into_iter()
            .map(|installed| installed.id)
            .collect();

        let api = Arc::clone(self);
        batch::run_batched("Mod Update Check", ids, self.max_batch_size, move |batch| {
            api.batched_check_updates(&batch)
        })
    }
}

impl std::fmt::Debug for ServerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerApi")
            .field("transport", &self.transport.name())
            .field("base_url", &self.config.base_url)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

//! Value objects exchanged with the mod index server.
//!
//! Query types (`ModsQuery`, `ModVersionSelector`) double as cache keys and
//! therefore only rely on value equality. Payload types are deserialized with
//! serde; lists are parsed item by item so that one malformed record never
//! fails a whole listing.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::ModIndexError;

/// Result of parsing a payload value; the error is a human readable reason.
pub type ParseResult<T> = Result<T, String>;

// ═══════════════════════════════════════════════════════════════════════════
// Versions
// ═══════════════════════════════════════════════════════════════════════════

/// Semantic version of a mod (`v1.2.3` or `1.2.3-beta.1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release tag; a tagged version sorts before the untagged one.
    pub tag: Option<String>,
}

impl VersionInfo {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            tag: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Formats the version without the leading `v`.
    pub fn to_non_v_string(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}.{}.{}-{}", self.major, self.minor, self.patch, tag),
            None => format!("{}.{}.{}", self.major, self.minor, self.patch),
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.to_non_v_string())
    }
}

impl FromStr for VersionInfo {
    type Err = ModIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (numbers, tag) = match trimmed.split_once('-') {
            Some((numbers, tag)) if !tag.is_empty() => (numbers, Some(tag.to_string())),
            Some(_) => return Err(ModIndexError::invalid_argument(format!("empty tag in '{s}'"))),
            None => (trimmed, None),
        };

        let parts = numbers
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ModIndexError::invalid_argument(format!("invalid version '{s}': {e}")))?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
                tag,
            }),
            _ => Err(ModIndexError::invalid_argument(format!(
                "invalid version '{s}': expected major.minor.patch"
            ))),
        }
    }
}

impl Ord for VersionInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.tag, &other.tag) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for VersionInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for VersionInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_non_v_string())
    }
}

impl<'de> Deserialize<'de> for VersionInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which version of a mod to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ModVersionSelector {
    /// Newest version for this game version and platform.
    #[default]
    Latest,
    /// Newest version with the given major number.
    Major(u32),
    /// Exactly this version.
    Specific(VersionInfo),
}

impl FromStr for ModVersionSelector {
    type Err = ModIndexError;

    /// Accepts `latest`, `major:N` or a version string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        if let Some(major) = s.strip_prefix("major:") {
            return major
                .parse()
                .map(Self::Major)
                .map_err(|e| ModIndexError::invalid_argument(format!("invalid major '{major}': {e}")));
        }
        s.parse().map(Self::Specific)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════

/// Sort order for mod listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModsSort {
    #[default]
    Downloads,
    RecentlyUpdated,
    RecentlyPublished,
}

impl ModsSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModsSort::Downloads => "downloads",
            ModsSort::RecentlyUpdated => "recently_updated",
            ModsSort::RecentlyPublished => "recently_published",
        }
    }
}

impl std::fmt::Display for ModsSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModsSort {
    type Err = ModIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloads" => Ok(Self::Downloads),
            "recently_updated" => Ok(Self::RecentlyUpdated),
            "recently_published" => Ok(Self::RecentlyPublished),
            other => Err(ModIndexError::invalid_argument(format!(
                "unknown sort '{other}'"
            ))),
        }
    }
}

/// Filter and paging parameters for a mod listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModsQuery {
    /// Free text search.
    pub query: Option<String>,
    /// Platforms the mods must support; empty means any.
    pub platforms: Vec<String>,
    /// Tags the mods must carry.
    pub tags: Vec<String>,
    pub featured: Option<bool>,
    pub sorting: ModsSort,
    pub developer: Option<String>,
    /// Zero-based page index.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ModsQuery {
    fn default() -> Self {
        Self {
            query: None,
            platforms: Vec::new(),
            tags: Vec::new(),
            featured: None,
            sorting: ModsSort::Downloads,
            developer: None,
            page: 0,
            page_size: 10,
        }
    }
}

impl ModsQuery {
    /// Free text search query.
    #[must_use]
    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════════════════════════════════════

/// Timestamp reported by the server (RFC 3339).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerDateTime(pub DateTime<Utc>);

impl ServerDateTime {
    /// Human readable distance, e.g. `3 hours ago`; dates older than a month
    /// are printed as `Jan 05 2024`.
    pub fn to_ago_string(&self, now: DateTime<Utc>) -> String {
        fn plural(count: i64, unit: &str) -> String {
            if count == 1 {
                format!("{count} {unit} ago")
            } else {
                format!("{count} {unit}s ago")
            }
        }

        let elapsed = now.signed_duration_since(self.0);
        if elapsed.num_minutes() < 60 {
            return plural(elapsed.num_minutes(), "minute");
        }
        if elapsed.num_hours() < 24 {
            return plural(elapsed.num_hours(), "hour");
        }
        if elapsed.num_days() < 31 {
            return plural(elapsed.num_days(), "day");
        }
        self.0.format("%b %d %Y").to_string()
    }
}

/// A tag that can be attached to mods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTag {
    pub id: u64,
    pub name: String,
    pub display_name: String,
}

impl ServerTag {
    /// Parses the tag list payload, skipping malformed tags.
    pub fn parse_list(payload: &Value) -> ParseResult<Vec<Self>> {
        let items = expect_array(payload, "tag list")?;
        Ok(parse_best_effort(items, "tag"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDeveloper {
    pub username: String,
    pub display_name: String,
    pub is_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDependency {
    pub mod_id: String,
    /// Version constraint, e.g. `>=1.2.0`.
    pub version: String,
    #[serde(default)]
    pub importance: Option<String>,
}

/// One published version of a mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModVersion {
    pub mod_id: String,
    pub name: String,
    pub description: String,
    pub version: VersionInfo,
    pub download_link: String,
    pub download_count: u64,
    pub hash: String,
    /// Loader version this release targets.
    pub geode: String,
    /// Game version per platform; `*` means any.
    #[serde(default)]
    pub gd: HashMap<String, Option<String>>,
    #[serde(default)]
    pub api: bool,
    #[serde(default, deserialize_with = "nullable_list")]
    pub dependencies: Vec<ServerDependency>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub incompatibilities: Vec<ServerDependency>,
}

impl ServerModVersion {
    pub fn parse(payload: &Value) -> ParseResult<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| e.to_string())
    }

    /// Game version required on `platform`; `None` when any version works.
    pub fn game_version_for(&self, platform: &str) -> Option<&str> {
        self.gd
            .get(platform)
            .and_then(|v| v.as_deref())
            .filter(|v| *v != "*")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModLinks {
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Full metadata for a mod, including all of its published versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModMetadata {
    pub id: String,
    pub featured: bool,
    pub download_count: u64,
    pub developers: Vec<ServerDeveloper>,
    /// Newest first; versions that fail to parse are skipped.
    #[serde(deserialize_with = "versions_best_effort")]
    pub versions: Vec<ServerModVersion>,
    #[serde(default, deserialize_with = "nullable_set")]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub links: Option<ServerModLinks>,
    #[serde(default)]
    pub created_at: Option<ServerDateTime>,
    #[serde(default)]
    pub updated_at: Option<ServerDateTime>,
}

impl ServerModMetadata {
    /// Parses a mod; a mod without any valid version is rejected.
    pub fn parse(payload: &Value) -> ParseResult<Self> {
        let metadata: Self = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
        if metadata.versions.is_empty() {
            return Err(format!("Mod '{}' has no (valid) versions", metadata.id));
        }
        Ok(metadata)
    }

    pub fn latest_version(&self) -> Option<&ServerModVersion> {
        self.versions.first()
    }

    /// Source repository, preferring the `links.source` entry.
    pub fn source_url(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|links| links.source.as_deref())
            .or(self.repository.as_deref())
    }

    /// Short developer credit line, e.g. `Alice & Bob` or `Alice + 3 More`.
    pub fn format_developers(&self) -> String {
        match self.developers.as_slice() {
            [] => "Unknown".to_string(),
            [only] => only.display_name.clone(),
            [first, second] => format!("{} & {}", first.display_name, second.display_name),
            [first, rest @ ..] => {
                let lead = self
                    .developers
                    .iter()
                    .find(|dev| dev.is_owner)
                    .unwrap_or(first);
                format!("{} + {} More", lead.display_name, rest.len())
            }
        }
    }
}

/// One page of a mod listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerModsList {
    pub mods: Vec<ServerModMetadata>,
    /// Total number of mods matching the query, across all pages.
    pub total_mod_count: u64,
}

#[derive(Deserialize)]
struct RawModsList {
    data: Vec<Value>,
    count: u64,
}

impl ServerModsList {
    pub fn parse(payload: &Value) -> ParseResult<Self> {
        let raw: RawModsList = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

        let mods = raw
            .data
            .iter()
            .filter_map(|item| match ServerModMetadata::parse(item) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    tracing::error!(error = %e, "Unable to parse mod from the server");
                    None
                }
            })
            .collect();

        Ok(Self {
            mods,
            total_mod_count: raw.count,
        })
    }
}

/// Mod that supersedes the one being updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModReplacement {
    pub id: String,
    pub version: VersionInfo,
}

/// Newest available version of an installed mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModUpdate {
    pub id: String,
    pub version: VersionInfo,
    #[serde(default)]
    pub replacement: Option<ServerModReplacement>,
}

impl ServerModUpdate {
    /// Parses the update list payload, skipping malformed entries.
    pub fn parse_list(payload: &Value) -> ParseResult<Vec<Self>> {
        let items = expect_array(payload, "update list")?;
        Ok(parse_best_effort(items, "mod update"))
    }

    /// Whether this entry is an actual update for `installed`.
    pub fn is_update_for(&self, installed: &InstalledMod) -> bool {
        self.id == installed.id && (self.version > installed.version || self.replacement.is_some())
    }
}

/// A mod installed locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstalledMod {
    pub id: String,
    pub version: VersionInfo,
}

impl InstalledMod {
    pub fn new(id: impl Into<String>, version: VersionInfo) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl FromStr for InstalledMod {
    type Err = ModIndexError;

    /// Parses `id@version`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, version) = s.split_once('@').ok_or_else(|| {
            ModIndexError::invalid_argument(format!("expected <id>@<version>, got '{s}'"))
        })?;
        if id.is_empty() {
            return Err(ModIndexError::invalid_argument(format!("missing mod id in '{s}'")));
        }
        Ok(Self::new(id, version.parse()?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Parsing helpers
// ═══════════════════════════════════════════════════════════════════════════

fn expect_array<'a>(payload: &'a Value, what: &str) -> ParseResult<&'a Vec<Value>> {
    payload
        .as_array()
        .ok_or_else(|| format!("Expected {what} to be an array, got {}", json_type_name(payload)))
}

/// Parses every item it can, logging and skipping the rest.
fn parse_best_effort<T: DeserializeOwned>(items: &[Value], what: &str) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::error!(error = %e, "Unable to parse {} from the server", what);
                None
            }
        })
        .collect()
}

fn versions_best_effort<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ServerModVersion>, D::Error> {
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(parse_best_effort(&items, "mod version"))
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_set<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON type name used in payload error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Null => "null",
    }
}

//! Keyserver configuration and outcome types.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KeyServerError, KeyServerResult};

/// One key listed in a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCandidate {
    /// Key ID or fingerprint as listed by the server, uppercase.
    pub key_id: String,

    /// Set when the server listed a full 40-hex-digit fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    pub algorithm: String,

    #[serde(default)]
    pub bits: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    #[serde(default)]
    pub revoked: bool,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub expired: bool,

    /// User IDs, unescaped.
    #[serde(default)]
    pub uids: Vec<String>,
}

impl KeyCandidate {
    /// Identifier to fetch this key by: the fingerprint if known, else the key ID.
    pub fn fetch_id(&self) -> &str {
        self.fingerprint.as_deref().unwrap_or(&self.key_id)
    }
}

/// Outcome of one keyserver search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "candidates", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found(Vec<KeyCandidate>),
    NotFound,
    Timeout,
    ServerNotFound,
    ConnectionError,
    TooManyResponses,
    InsufficientQuery,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn candidates(&self) -> &[KeyCandidate] {
        match self {
            Self::Found(c) => c,
            _ => &[],
        }
    }
}

impl From<&KeyServerError> for SearchOutcome {
    fn from(err: &KeyServerError) -> Self {
        match err {
            KeyServerError::NotFound { .. } => Self::NotFound,
            KeyServerError::Timeout { .. } => Self::Timeout,
            KeyServerError::ServerNotFound { .. } => Self::ServerNotFound,
            KeyServerError::TooManyResponses { .. } => Self::TooManyResponses,
            KeyServerError::InsufficientQuery { .. } => Self::InsufficientQuery,
            KeyServerError::Connection { .. }
            | KeyServerError::InvalidResponse { .. }
            | KeyServerError::Config { .. }
            | KeyServerError::Import { .. } => Self::ConnectionError,
        }
    }
}

/// Why one key of a batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Timeout,
    ServerNotFound,
    ConnectionError,
    TooManyResponses,
    InsufficientQuery,
    InvalidResponse,
    ImportRejected,
}

impl From<&KeyServerError> for FailureKind {
    fn from(err: &KeyServerError) -> Self {
        match err {
            KeyServerError::NotFound { .. } => Self::NotFound,
            KeyServerError::Timeout { .. } => Self::Timeout,
            KeyServerError::ServerNotFound { .. } => Self::ServerNotFound,
            KeyServerError::Connection { .. } | KeyServerError::Config { .. } => {
                Self::ConnectionError
            }
            KeyServerError::TooManyResponses { .. } => Self::TooManyResponses,
            KeyServerError::InsufficientQuery { .. } => Self::InsufficientQuery,
            KeyServerError::InvalidResponse { .. } => Self::InvalidResponse,
            KeyServerError::Import { .. } => Self::ImportRejected,
        }
    }
}

/// Per-key status within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyImportStatus {
    Imported,
    Failed { kind: FailureKind, message: String },
    /// Never attempted because the batch was cancelled first.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyImportEntry {
    pub key_id: String,
    #[serde(flatten)]
    pub status: KeyImportStatus,
}

/// Progress of a running batch: `[done/total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub done: usize,
    pub total: usize,
}

impl std::fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.done, self.total)
    }
}

/// Aggregated result of a bulk import or sync. Entries follow input order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub entries: Vec<KeyImportEntry>,
    #[serde(default)]
    pub cancelled: bool,
}

impl ImportOutcome {
    pub fn imported(&self) -> impl Iterator<Item = &KeyImportEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == KeyImportStatus::Imported)
    }

    pub fn failed(&self) -> impl Iterator<Item = &KeyImportEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, KeyImportStatus::Failed { .. }))
    }

    pub fn status_of(&self, key_id: &str) -> Option<&KeyImportStatus> {
        self.entries
            .iter()
            .find(|e| e.key_id == key_id)
            .map(|e| &e.status)
    }

    /// Keys that were attempted, out of all requested.
    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            done: self
                .entries
                .iter()
                .filter(|e| e.status != KeyImportStatus::Cancelled)
                .count(),
            total: self.entries.len(),
        }
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.imported().count() == self.entries.len()
    }
}

/// Reachability of one configured keyserver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub server: String,
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Keyserver client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerConfig {
    /// Known keyservers.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Index into `servers` of the one used for requests.
    #[serde(default)]
    pub default_server: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Concurrent requests during a bulk sync.
    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,

    /// TCP connect timeout for `probe_servers`, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_servers() -> Vec<String> {
    vec![
        "https://keyserver.ubuntu.com".to_string(),
        "https://keys.openpgp.org".to_string(),
    ]
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_sync_concurrency() -> usize {
    4
}

fn default_probe_timeout_ms() -> u64 {
    2500
}

const PROBE_TIMEOUT_MIN_MS: u64 = 200;
const PROBE_TIMEOUT_MAX_MS: u64 = 16000;

impl Default for KeyServerConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            default_server: 0,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            sync_concurrency: default_sync_concurrency(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl KeyServerConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SIGVERDICT_KEYSERVER` | Keyserver URL to use |
    /// | `SIGVERDICT_KEYSERVER_TIMEOUT` | Request timeout in seconds |
    /// | `SIGVERDICT_KEYSERVER_MAX_RETRIES` | Retries for transient failures |
    /// | `SIGVERDICT_SYNC_CONCURRENCY` | Parallel requests during sync |
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Overlay environment variables on an existing config.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("SIGVERDICT_KEYSERVER") {
            if !url.trim().is_empty() {
                self = self.with_server(url.trim());
            }
        }
        if let Some(v) = env_parse("SIGVERDICT_KEYSERVER_TIMEOUT") {
            self.timeout_secs = v;
        }
        if let Some(v) = env_parse("SIGVERDICT_KEYSERVER_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("SIGVERDICT_SYNC_CONCURRENCY") {
            self.sync_concurrency = v;
        }
        self
    }

    /// Load from a YAML file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> KeyServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KeyServerError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&content).map_err(|e| KeyServerError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Make `url` the server requests go to, adding it to the list if needed.
    pub fn with_server(mut self, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        match self
            .servers
            .iter()
            .position(|s| s.trim_end_matches('/') == url)
        {
            Some(idx) => self.default_server = idx,
            None => {
                self.servers.push(url);
                self.default_server = self.servers.len() - 1;
            }
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_sync_concurrency(mut self, n: usize) -> Self {
        self.sync_concurrency = n;
        self
    }

    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = ms;
        self
    }

    /// The server requests go to.
    pub fn server(&self) -> KeyServerResult<&str> {
        self.servers
            .get(self.default_server)
            .map(String::as_str)
            .ok_or_else(|| KeyServerError::Config {
                message: format!(
                    "default_server index {} out of range ({} servers configured)",
                    self.default_server,
                    self.servers.len()
                ),
            })
    }

    /// At least one.
    pub fn effective_sync_concurrency(&self) -> usize {
        self.sync_concurrency.max(1)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(
            self.probe_timeout_ms
                .clamp(PROBE_TIMEOUT_MIN_MS, PROBE_TIMEOUT_MAX_MS),
        )
    }

    /// Reject unusable configs. Plain `http://` servers are allowed with a warning.
    pub fn validate(&self) -> KeyServerResult<()> {
        if self.servers.is_empty() {
            return Err(KeyServerError::Config {
                message: "no keyservers configured".to_string(),
            });
        }
        self.server()?;
        for server in &self.servers {
            let parsed = url::Url::parse(server).map_err(|e| KeyServerError::Config {
                message: format!("invalid keyserver URL '{}': {}", server, e),
            })?;
            match parsed.scheme() {
                "https" => {}
                "http" => warn!(
                    server = %server,
                    "keyserver uses plain http; traffic is not encrypted"
                ),
                other => {
                    return Err(KeyServerError::Config {
                        message: format!("unsupported scheme '{}' in '{}'", other, server),
                    })
                }
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let cfg = KeyServerConfig::default();
        assert_eq!(cfg.server().unwrap(), "https://keyserver.ubuntu.com");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.probe_timeout(), Duration::from_millis(2500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_with_server_selects_existing_or_appends() {
        let cfg = KeyServerConfig::default().with_server("https://keys.openpgp.org/");
        assert_eq!(cfg.default_server, 1);
        assert_eq!(cfg.servers.len(), 2);

        let cfg = cfg.with_server("http://localhost:11371");
        assert_eq!(cfg.servers.len(), 3);
        assert_eq!(cfg.server().unwrap(), "http://localhost:11371");
    }

    #[test]
    fn test_clamping() {
        let cfg = KeyServerConfig::default()
            .with_sync_concurrency(0)
            .with_probe_timeout_ms(5);
        assert_eq!(cfg.effective_sync_concurrency(), 1);
        assert_eq!(cfg.probe_timeout(), Duration::from_millis(200));

        let cfg = cfg.with_probe_timeout_ms(60_000);
        assert_eq!(cfg.probe_timeout(), Duration::from_millis(16_000));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut cfg = KeyServerConfig::default();
        cfg.default_server = 7;
        assert!(matches!(cfg.validate(), Err(KeyServerError::Config { .. })));

        cfg.servers.clear();
        cfg.default_server = 0;
        assert!(cfg.validate().is_err());

        let cfg = KeyServerConfig::default().with_server("ftp://keys.example.org");
        assert!(cfg.validate().is_err());

        let cfg = KeyServerConfig::default().with_server("hkp is not a url");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyserver.yaml");
        std::fs::write(
            &path,
            "servers:\n  - https://one.example\n  - https://two.example\ndefault_server: 1\nmax_retries: 0\n",
        )
        .unwrap();
        let cfg = KeyServerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.server().unwrap(), "https://two.example");
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("SIGVERDICT_KEYSERVER", "https://env.example");
        std::env::set_var("SIGVERDICT_KEYSERVER_TIMEOUT", "7");
        std::env::set_var("SIGVERDICT_SYNC_CONCURRENCY", "not-a-number");

        let cfg = KeyServerConfig::from_env();

        std::env::remove_var("SIGVERDICT_KEYSERVER");
        std::env::remove_var("SIGVERDICT_KEYSERVER_TIMEOUT");
        std::env::remove_var("SIGVERDICT_SYNC_CONCURRENCY");

        assert_eq!(cfg.server().unwrap(), "https://env.example");
        assert_eq!(cfg.timeout_secs, 7);
        assert_eq!(cfg.sync_concurrency, 4);
    }

    #[test]
    fn test_outcome_progress_and_lookup() {
        let outcome = ImportOutcome {
            entries: vec![
                KeyImportEntry {
                    key_id: "A".into(),
                    status: KeyImportStatus::Imported,
                },
                KeyImportEntry {
                    key_id: "B".into(),
                    status: KeyImportStatus::Failed {
                        kind: FailureKind::ConnectionError,
                        message: "refused".into(),
                    },
                },
                KeyImportEntry {
                    key_id: "C".into(),
                    status: KeyImportStatus::Cancelled,
                },
            ],
            cancelled: true,
        };
        assert_eq!(outcome.progress(), SyncProgress { done: 2, total: 3 });
        assert_eq!(outcome.progress().to_string(), "[2/3]");
        assert_eq!(outcome.imported().count(), 1);
        assert_eq!(outcome.failed().count(), 1);
        assert!(!outcome.is_complete_success());
        assert_eq!(outcome.status_of("A"), Some(&KeyImportStatus::Imported));
    }
}

//! Keyserver client.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{KeyServerError, KeyServerResult};
use crate::sync::{run_batch, KeyImporter, SyncOptions};
use crate::types::{ImportOutcome, KeyCandidate, KeyServerConfig, ProbeResult, SearchOutcome};

pub(crate) mod helpers;
pub(crate) mod http;

use helpers::{hex_key_query, is_insufficient_query, looks_like_bare_key_id};
use http::HttpBackend;

/// User agent for keyserver requests.
pub const KEYSERVER_USER_AGENT: &str = concat!("sigverdict-keyserver/", env!("CARGO_PKG_VERSION"));

/// HKP keyserver client bound to the configured default server.
#[derive(Debug, Clone)]
pub struct KeyServerClient {
    http: HttpBackend,
}

impl KeyServerClient {
    pub fn new(config: KeyServerConfig) -> KeyServerResult<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(KEYSERVER_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| KeyServerError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let server = config.server()?.trim_end_matches('/').to_string();

        Ok(Self {
            http: HttpBackend {
                client,
                server,
                config,
            },
        })
    }

    pub fn from_env() -> KeyServerResult<Self> {
        Self::new(KeyServerConfig::from_env())
    }

    pub fn server(&self) -> &str {
        &self.http.server
    }

    pub fn config(&self) -> &KeyServerConfig {
        &self.http.config
    }

    /// Search the keyserver index.
    ///
    /// Never fails: every failure is a `SearchOutcome` variant. A bare key ID
    /// that matches nothing is retried exactly once with a `0x` prefix.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let query = query.trim();
        if is_insufficient_query(query) {
            debug!(query = %query, "query too short, not sent");
            return SearchOutcome::InsufficientQuery;
        }

        match self.search_once(query).await {
            SearchOutcome::NotFound if looks_like_bare_key_id(query) => {
                let prefixed = format!("0x{}", query);
                debug!(query = %query, retry = %prefixed, "no match, retrying as key id");
                self.search_once(&prefixed).await
            }
            outcome => outcome,
        }
    }

    async fn search_once(&self, query: &str) -> SearchOutcome {
        match self.http.lookup_index(query).await {
            Ok(candidates) if candidates.is_empty() => SearchOutcome::NotFound,
            Ok(candidates) => SearchOutcome::Found(candidates),
            Err(e) => {
                debug!(query = %query, error = %e, "search failed");
                SearchOutcome::from(&e)
            }
        }
    }

    /// Fetch armored key material by key ID or fingerprint.
    pub async fn fetch_key(&self, key_id: &str) -> KeyServerResult<String> {
        if is_insufficient_query(key_id) {
            return Err(KeyServerError::InsufficientQuery {
                query: key_id.to_string(),
            });
        }
        self.http.get_key(&hex_key_query(key_id)).await
    }

    /// Fetch and import every candidate. One failure never stops the rest.
    pub async fn import_candidates(
        &self,
        candidates: &[KeyCandidate],
        importer: Arc<dyn KeyImporter>,
        options: &SyncOptions,
    ) -> ImportOutcome {
        let ids: Vec<String> = candidates.iter().map(|c| c.fetch_id().to_string()).collect();
        self.sync_all(&ids, importer, options).await
    }

    /// Refresh every listed key from the keyserver.
    pub async fn sync_all(
        &self,
        key_ids: &[String],
        importer: Arc<dyn KeyImporter>,
        options: &SyncOptions,
    ) -> ImportOutcome {
        let concurrency = self.http.config.effective_sync_concurrency();
        debug!(keys = key_ids.len(), concurrency, "starting key sync");
        run_batch(&self.http, key_ids, importer, concurrency, options).await
    }

    /// Publish an armored public key.
    pub async fn upload(&self, armored: &str) -> KeyServerResult<()> {
        if !armored.contains("-----BEGIN PGP PUBLIC KEY BLOCK-----") {
            return Err(KeyServerError::InvalidResponse {
                message: "refusing to upload: input is not an armored public key".to_string(),
            });
        }
        self.http.add_key(armored).await
    }

    /// Check TCP reachability of every configured server, in list order.
    pub async fn probe_servers(&self) -> Vec<ProbeResult> {
        let timeout = self.http.config.probe_timeout();
        let servers = self.http.config.servers.clone();

        let mut join_set = JoinSet::new();
        for (idx, server) in servers.iter().cloned().enumerate() {
            join_set.spawn(async move { (idx, probe_one(server, timeout).await) });
        }

        let mut results: Vec<Option<ProbeResult>> = vec![None; servers.len()];
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        servers
            .into_iter()
            .zip(results)
            .map(|(server, result)| {
                result.unwrap_or_else(|| ProbeResult {
                    server,
                    reachable: false,
                    latency_ms: None,
                    error: Some("probe aborted".to_string()),
                })
            })
            .collect()
    }
}

async fn probe_one(server: String, timeout: Duration) -> ProbeResult {
    let unreachable = |server: String, error: String| ProbeResult {
        server,
        reachable: false,
        latency_ms: None,
        error: Some(error),
    };

    let parsed = match url::Url::parse(&server) {
        Ok(u) => u,
        Err(e) => return unreachable(server, format!("invalid URL: {}", e)),
    };
    let (Some(host), Some(port)) = (parsed.host_str(), parsed.port_or_known_default()) else {
        return unreachable(server, "URL has no host or port".to_string());
    };

    let started = Instant::now();
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => {
            let latency = started.elapsed().as_millis() as u64;
            debug!(server = %server, latency_ms = latency, "keyserver reachable");
            ProbeResult {
                server,
                reachable: true,
                latency_ms: Some(latency),
                error: None,
            }
        }
        Ok(Err(e)) => unreachable(server, e.to_string()),
        Err(_) => unreachable(
            server,
            format!("no connection within {} ms", timeout.as_millis()),
        ),
    }
}

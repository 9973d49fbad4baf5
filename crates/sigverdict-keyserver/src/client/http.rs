//! HTTP layer: HKP requests, status mapping, retry.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{KeyServerError, KeyServerResult};
use crate::types::{KeyCandidate, KeyServerConfig};

use super::helpers::{classify_status, parse_machine_index};

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// One HKP operation.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HkpRequest<'a> {
    /// `op=index`: list matching keys.
    Index { search: &'a str },
    /// `op=get`: fetch armored key material.
    Get { search: &'a str },
    /// `POST /pks/add`: publish a key.
    Add { keytext: &'a str },
}

impl HkpRequest<'_> {
    /// What to name in errors.
    fn subject(&self) -> &str {
        match self {
            Self::Index { search } | Self::Get { search } => *search,
            Self::Add { .. } => "upload",
        }
    }
}

/// HTTP backend for making requests (holds reqwest client, server, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) server: String,
    pub(crate) config: KeyServerConfig,
}

impl HttpBackend {
    /// Search the index. Zero candidates is `Ok(vec![])`, not an error.
    pub(crate) async fn lookup_index(&self, search: &str) -> KeyServerResult<Vec<KeyCandidate>> {
        let body = self.request(HkpRequest::Index { search }).await?;
        let candidates = parse_machine_index(&body);

        // some servers answer 200 with a plain-text refusal
        if candidates.is_empty() && body.to_ascii_lowercase().contains("too many") {
            return Err(KeyServerError::TooManyResponses {
                query: search.to_string(),
            });
        }

        Ok(candidates)
    }

    /// Fetch armored key material.
    pub(crate) async fn get_key(&self, search: &str) -> KeyServerResult<String> {
        let body = self.request(HkpRequest::Get { search }).await?;
        if !body.contains(ARMOR_HEADER) {
            if body.trim().is_empty() {
                return Err(KeyServerError::NotFound {
                    query: search.to_string(),
                });
            }
            return Err(KeyServerError::InvalidResponse {
                message: format!("no armored public key in response for '{}'", search),
            });
        }
        Ok(body)
    }

    pub(crate) async fn add_key(&self, keytext: &str) -> KeyServerResult<()> {
        self.request(HkpRequest::Add { keytext }).await.map(|_| ())
    }

    /// Make a request, retrying transient failures with jittered backoff.
    pub(crate) async fn request(&self, req: HkpRequest<'_>) -> KeyServerResult<String> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            match self.request_once(req).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let ceiling = base_backoff(retries);
                    let jittered_ms =
                        rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying keyserver request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, req: HkpRequest<'_>) -> KeyServerResult<String> {
        let request = match req {
            HkpRequest::Index { search } => self.client.get(self.lookup_url("index", search)?),
            HkpRequest::Get { search } => self.client.get(self.lookup_url("get", search)?),
            HkpRequest::Add { keytext } => self
                .client
                .post(format!("{}/pks/add", self.server))
                .form(&[("keytext", keytext)]),
        };

        debug!(server = %self.server, request = ?SafeRequest(&req), "keyserver request");

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        match status {
            200..=299 => Ok(body),
            _ => Err(classify_status(status, &body, req.subject())),
        }
    }

    fn lookup_url(&self, op: &str, search: &str) -> KeyServerResult<url::Url> {
        let mut url = url::Url::parse(&format!("{}/pks/lookup", self.server)).map_err(|e| {
            KeyServerError::Config {
                message: format!("invalid keyserver URL '{}': {}", self.server, e),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("op", op)
            .append_pair("options", "mr")
            .append_pair("search", search);
        Ok(url)
    }
}

/// Exponential backoff ceiling for the given retry, capped at 30s.
fn base_backoff(retry: u32) -> Duration {
    Duration::from_secs(1u64 << retry.min(5)).min(Duration::from_secs(30))
}

/// Debug view of a request without the key body.
struct SafeRequest<'a, 'b>(&'a HkpRequest<'b>);

impl std::fmt::Debug for SafeRequest<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            HkpRequest::Index { search } => write!(f, "index({})", search),
            HkpRequest::Get { search } => write!(f, "get({})", search),
            HkpRequest::Add { keytext } => write!(f, "add({} bytes)", keytext.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(base_backoff(1), Duration::from_secs(2));
        assert_eq!(base_backoff(4), Duration::from_secs(16));
        assert_eq!(base_backoff(5), Duration::from_secs(30));
        assert_eq!(base_backoff(64), Duration::from_secs(30));
        assert_eq!(base_backoff(u32::MAX), Duration::from_secs(30));
    }
}

//! Error types for the keyserver client.

/// Keyserver errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyServerError {
    /// Server answered, but has no key matching the query.
    #[error("no key found for '{query}'")]
    NotFound { query: String },

    /// Request did not complete within the configured timeout.
    #[error("request to {server} timed out")]
    Timeout { server: String },

    /// Server host name could not be resolved.
    #[error("keyserver not found: {server}")]
    ServerNotFound { server: String },

    /// Any other transport or server-side failure.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Server refused to list all matches.
    #[error("too many responses for '{query}'; refine the search")]
    TooManyResponses { query: String },

    /// Query too short or too vague for the server to accept.
    #[error("insufficient query: '{query}'")]
    InsufficientQuery { query: String },

    /// Unexpected response body or status.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The key importer rejected fetched key material.
    #[error("import of {key_id} failed: {message}")]
    Import { key_id: String, message: String },
}

impl KeyServerError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Nothing to act on / user input
            Self::NotFound { .. } => 1,
            Self::TooManyResponses { .. } => 1,
            Self::InsufficientQuery { .. } => 1,
            Self::Config { .. } => 1,

            // Network/transient
            Self::Timeout { .. } => 5,
            Self::ServerNotFound { .. } => 5,
            Self::Connection { .. } => 5,

            // Other
            Self::InvalidResponse { .. } => 6,
            Self::Import { .. } => 6,
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }
}

impl From<reqwest::Error> for KeyServerError {
    fn from(err: reqwest::Error) -> Self {
        let server = err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("keyserver")
            .to_string();
        classify_transport(err.is_timeout(), &error_chain(&err), server)
    }
}

/// Render an error and all of its sources, outermost first.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Map a transport failure onto the taxonomy.
pub(crate) fn classify_transport(timed_out: bool, chain: &str, server: String) -> KeyServerError {
    if timed_out {
        return KeyServerError::Timeout { server };
    }
    let lower = chain.to_ascii_lowercase();
    let dns = [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "nodename nor servname",
        "temporary failure in name resolution",
    ];
    if dns.iter().any(|needle| lower.contains(needle)) {
        return KeyServerError::ServerNotFound { server };
    }
    if lower.contains("timed out") {
        return KeyServerError::Timeout { server };
    }
    KeyServerError::Connection {
        message: chain.to_string(),
    }
}

/// Result type for keyserver operations.
pub type KeyServerResult<T> = Result<T, KeyServerError>;

//! HKP keyserver client for resolving and publishing OpenPGP keys.
//!
//! Provides:
//!
//! - search with a typed outcome taxonomy (`Found`, `NotFound`, `Timeout`,
//!   `ServerNotFound`, `ConnectionError`, `TooManyResponses`, `InsufficientQuery`)
//! - fetch and upload of armored keys
//! - bounded-concurrency bulk import/sync with per-key results, progress and
//!   cooperative cancellation
//! - reachability probing of the configured servers
//!
//! Imported key material is handed to a caller-supplied [`KeyImporter`]; this
//! crate never writes to a key database.
//!
//! # Quick Start
//!
//! ```no_run
//! use sigverdict_keyserver::{KeyServerClient, KeyServerConfig, SearchOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KeyServerClient::new(KeyServerConfig::from_env())?;
//! if let SearchOutcome::Found(keys) = client.search("alice@example.org").await {
//!     for key in keys {
//!         println!("{} {:?}", key.key_id, key.uids);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SIGVERDICT_KEYSERVER` | Keyserver URL (default: `https://keyserver.ubuntu.com`) |
//! | `SIGVERDICT_KEYSERVER_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `SIGVERDICT_KEYSERVER_MAX_RETRIES` | Max retries for transient failures (default: 2) |
//! | `SIGVERDICT_SYNC_CONCURRENCY` | Parallel requests during sync (default: 4) |

pub mod client;
pub mod error;
pub mod sync;
pub mod types;

// Re-export main types
pub use client::helpers::looks_like_key_id;
pub use client::{KeyServerClient, KEYSERVER_USER_AGENT};
pub use error::{KeyServerError, KeyServerResult};
pub use sync::{CancelFlag, KeyImporter, ProgressSink, SyncOptions};
pub use types::{
    FailureKind, ImportOutcome, KeyCandidate, KeyImportEntry, KeyImportStatus, KeyServerConfig,
    ProbeResult, SearchOutcome, SyncProgress,
};

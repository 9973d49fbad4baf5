//! Bulk import and sync.
//!
//! Keys are fetched with bounded concurrency (a semaphore sized by
//! `sync_concurrency`). A failing key never aborts the batch; every key gets
//! an entry in the outcome, in input order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::helpers::hex_key_query;
use crate::client::http::HttpBackend;
use crate::error::KeyServerResult;
use crate::types::{FailureKind, ImportOutcome, KeyImportEntry, KeyImportStatus, SyncProgress};

/// Receives fetched key material. The keyserver client never touches the
/// key database itself.
#[async_trait]
pub trait KeyImporter: Send + Sync {
    /// Import armored key material fetched for `key_id`.
    async fn import_key(&self, key_id: &str, armored: &str) -> KeyServerResult<()>;
}

/// Sink for progress events. Called once per finished key, from worker tasks.
pub type ProgressSink = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Cooperative cancellation for a running batch.
///
/// Cancelling stops new keys from being started; keys already in flight
/// finish (or time out) normally and keep their result.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Optional hooks for a batch.
#[derive(Clone, Default)]
pub struct SyncOptions {
    pub cancel: Option<CancelFlag>,
    pub progress: Option<ProgressSink>,
}

impl SyncOptions {
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Fetch and import every key in `key_ids`.
pub(crate) async fn run_batch(
    http: &HttpBackend,
    key_ids: &[String],
    importer: Arc<dyn KeyImporter>,
    concurrency: usize,
    options: &SyncOptions,
) -> ImportOutcome {
    let total = key_ids.len();
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let done = Arc::new(AtomicUsize::new(0));
    let mut join_set = JoinSet::new();
    let mut started = vec![false; total];
    let mut cancelled = false;

    for (idx, key_id) in key_ids.iter().enumerate() {
        if options.is_cancelled() {
            cancelled = true;
            break;
        }
        let Ok(permit) = sem.clone().acquire_owned().await else {
            break;
        };
        // waiting for a slot may have taken a while
        if options.is_cancelled() {
            cancelled = true;
            break;
        }

        started[idx] = true;
        let http = http.clone();
        let importer = importer.clone();
        let key_id = key_id.clone();
        let done = done.clone();
        let progress = options.progress.clone();

        join_set.spawn(async move {
            let _permit = permit;
            let status = fetch_and_import(&http, &key_id, importer.as_ref()).await;
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(sink) = progress {
                sink(SyncProgress {
                    done: finished,
                    total,
                });
            }
            (idx, status)
        });
    }

    let mut slots: Vec<Option<KeyImportStatus>> = vec![None; total];
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok((idx, status)) => slots[idx] = Some(status),
            Err(e) => warn!(error = %e, "key sync task failed"),
        }
    }

    let entries: Vec<KeyImportEntry> = key_ids
        .iter()
        .zip(slots)
        .zip(started)
        .map(|((key_id, slot), was_started)| KeyImportEntry {
            key_id: key_id.clone(),
            status: match slot {
                Some(status) => status,
                None if was_started => KeyImportStatus::Failed {
                    kind: FailureKind::ConnectionError,
                    message: "sync task aborted".to_string(),
                },
                None => KeyImportStatus::Cancelled,
            },
        })
        .collect();

    let outcome = ImportOutcome { entries, cancelled };
    info!(
        imported = outcome.imported().count(),
        failed = outcome.failed().count(),
        total,
        cancelled,
        "key sync finished"
    );
    outcome
}

async fn fetch_and_import(
    http: &HttpBackend,
    key_id: &str,
    importer: &dyn KeyImporter,
) -> KeyImportStatus {
    let result: KeyServerResult<()> = async {
        let armored = http.get_key(&hex_key_query(key_id)).await?;
        importer.import_key(key_id, &armored).await
    }
    .await;

    match result {
        Ok(()) => {
            debug!(key_id = %key_id, "key imported");
            KeyImportStatus::Imported
        }
        Err(e) => {
            warn!(key_id = %key_id, error = %e, "key sync failed");
            KeyImportStatus::Failed {
                kind: FailureKind::from(&e),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());

        let opts = SyncOptions::default().with_cancel(clone);
        assert!(opts.is_cancelled());
        assert!(!SyncOptions::default().is_cancelled());
    }
}

//! Read-only view of the local key database.
//!
//! The pipeline never mutates keys. Callers hand in a view that is a
//! consistent snapshot for the duration of one evaluation; staleness is the
//! caller's concern.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::{
    long_key_id, normalize_fingerprint, KeyMaterialState, KeyReference, TofuPolicy, TrustLevel,
};

/// What the key database knows about one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub reference: KeyReference,
    pub primary_uid: Option<String>,
    pub state: KeyMaterialState,
}

/// Synchronous lookups against the local key database.
pub trait KeyDatabaseView {
    /// Look up by full fingerprint (canonical form).
    fn by_fingerprint(&self, fingerprint: &str) -> Option<KeyEntry>;

    /// Look up by long (16 hex) or short key ID.
    fn by_key_id(&self, key_id: &str) -> Option<KeyEntry>;

    /// TOFU policy recorded for the key.
    fn tofu_policy(&self, key_id: &str) -> TofuPolicy;
}

/// Look up by fingerprint, falling back to the long key ID the fingerprint ends with.
pub fn lookup(db: &dyn KeyDatabaseView, fingerprint_or_id: &str) -> Option<KeyEntry> {
    let normalized = normalize_fingerprint(fingerprint_or_id);
    if normalized.is_empty() {
        return None;
    }
    db.by_fingerprint(&normalized).or_else(|| {
        debug!(key = %normalized, "fingerprint lookup missed, trying key id");
        db.by_key_id(&long_key_id(&normalized))
    })
}

/// One key in a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub fingerprint: String,

    /// Subkey fingerprints belonging to this key.
    #[serde(default)]
    pub subkeys: Vec<String>,

    #[serde(default)]
    pub uid: Option<String>,

    #[serde(default)]
    pub algorithm: String,

    #[serde(default)]
    pub bits: u32,

    #[serde(default)]
    pub revoked: bool,

    #[serde(default)]
    pub expired: bool,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub owner_trust: TrustLevel,

    #[serde(default)]
    pub tofu_policy: TofuPolicy,
}

/// In-memory key database view, loadable from YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySnapshot {
    #[serde(default)]
    pub keys: Vec<SnapshotKey>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl KeySnapshot {
    pub fn new(keys: Vec<SnapshotKey>) -> Self {
        let mut snapshot = Self {
            keys,
            index: HashMap::new(),
        };
        snapshot.rebuild_index();
        snapshot
    }

    /// Load a snapshot file. YAML is a superset of JSON, so both parse.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Snapshot {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let parsed: KeySnapshot =
            serde_yaml::from_str(content).map_err(|e| CoreError::Snapshot {
                message: format!("failed to parse key snapshot: {}", e),
            })?;
        Ok(Self::new(parsed.keys))
    }

    /// Fingerprints of all primary keys, in file order.
    pub fn fingerprints(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|k| normalize_fingerprint(&k.fingerprint))
            .collect()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, key) in self.keys.iter().enumerate() {
            let fpr = normalize_fingerprint(&key.fingerprint);
            self.index.insert(long_key_id(&fpr), i);
            self.index.insert(fpr, i);
            for sub in &key.subkeys {
                let sub = normalize_fingerprint(sub);
                self.index.insert(long_key_id(&sub), i);
                self.index.insert(sub, i);
            }
        }
    }

    fn entry_for(&self, idx: usize, matched: &str) -> KeyEntry {
        let key = &self.keys[idx];
        let fingerprint = normalize_fingerprint(&key.fingerprint);
        let primary_key_id = long_key_id(&fingerprint);
        let matched_id = long_key_id(matched);
        let subkey_id = (matched_id != primary_key_id).then_some(matched_id);

        KeyEntry {
            reference: KeyReference {
                primary_key_id,
                subkey_id,
                fingerprint,
                algorithm: key.algorithm.clone(),
                bits: key.bits,
            },
            primary_uid: key.uid.clone(),
            state: KeyMaterialState {
                present_locally: true,
                revoked: key.revoked,
                expired: key.expired,
                disabled: key.disabled,
                owner_trust: key.owner_trust,
            },
        }
    }

    fn find(&self, id: &str) -> Option<KeyEntry> {
        let id = normalize_fingerprint(id);
        self.index.get(&id).map(|&idx| self.entry_for(idx, &id))
    }
}

impl KeyDatabaseView for KeySnapshot {
    fn by_fingerprint(&self, fingerprint: &str) -> Option<KeyEntry> {
        self.find(fingerprint)
    }

    fn by_key_id(&self, key_id: &str) -> Option<KeyEntry> {
        let id = normalize_fingerprint(key_id);
        if let Some(entry) = self.find(&id) {
            return Some(entry);
        }
        // short (8 hex) IDs: scan
        if id.len() == 8 {
            for (i, key) in self.keys.iter().enumerate() {
                let fpr = normalize_fingerprint(&key.fingerprint);
                if fpr.ends_with(&id) {
                    return Some(self.entry_for(i, &fpr));
                }
            }
        }
        None
    }

    fn tofu_policy(&self, key_id: &str) -> TofuPolicy {
        let id = normalize_fingerprint(key_id);
        self.index
            .get(&id)
            .or_else(|| self.index.get(&long_key_id(&id)))
            .map(|&idx| self.keys[idx].tofu_policy)
            .unwrap_or_default()
    }
}

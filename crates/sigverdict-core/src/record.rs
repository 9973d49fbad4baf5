//! Builds one `SignatureRecord` from an engine-reported signature.

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::keydb::{lookup, KeyDatabaseView};
use crate::model::{KeyMaterialState, KeyReference, SignatureRecord, SignatureStatus};
use crate::raw::RawSignature;
use crate::status::{hash_algo_name, map_status, pubkey_algo_name, RawStatus};
use crate::trust;

/// Combine engine status, key database state and trust into a record.
///
/// A signer absent from the key database is always `MissingKey`: without key
/// material there is nothing to evaluate trust against.
pub fn build_record(raw: &RawSignature, db: &dyn KeyDatabaseView) -> SignatureRecord {
    let mut status = map_status(RawStatus {
        code: raw.status,
        summary: raw.summary,
    });
    let pubkey_algo = pubkey_algo_name(raw.pubkey_algo).to_string();

    let (signer, signer_uid, key_state) = match lookup(db, &raw.fingerprint) {
        Some(entry) => {
            let mut reference = entry.reference;
            if reference.algorithm.is_empty() {
                reference.algorithm = pubkey_algo.clone();
            }
            (reference, entry.primary_uid, entry.state)
        }
        None => {
            if status != SignatureStatus::MissingKey {
                debug!(
                    fingerprint = %raw.fingerprint,
                    engine_status = %status,
                    "signer not in key database, forcing missing_key"
                );
            }
            status = SignatureStatus::MissingKey;
            (
                KeyReference::from_fingerprint(&raw.fingerprint, pubkey_algo.clone()),
                None,
                KeyMaterialState::absent(),
            )
        }
    };

    let tofu_policy = db.tofu_policy(&signer.primary_key_id);
    let trust = trust::evaluate(&key_state, tofu_policy);

    SignatureRecord {
        signer,
        signer_uid,
        signed_at: timestamp(raw.timestamp),
        expires_at: (raw.exp_timestamp > 0).then(|| timestamp(raw.exp_timestamp)),
        status,
        key_state,
        tofu_policy,
        trust,
        pubkey_algo,
        hash_algo: hash_algo_name(raw.hash_algo).to_string(),
    }
}

/// Build records for a signature list, preserving engine order.
pub fn build_records(raw: &[RawSignature], db: &dyn KeyDatabaseView) -> Vec<SignatureRecord> {
    raw.iter().map(|sig| build_record(sig, db)).collect()
}

/// Unix seconds to UTC. Out-of-range values collapse to the epoch.
pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keydb::{KeySnapshot, SnapshotKey};
    use crate::model::{TofuPolicy, TrustLevel, TrustSource};
    use crate::status::{gpg_err, sigsum};

    const ALICE: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

    fn db(owner_trust: TrustLevel, tofu_policy: TofuPolicy) -> KeySnapshot {
        KeySnapshot::new(vec![SnapshotKey {
            fingerprint: ALICE.into(),
            subkeys: vec![],
            uid: Some("Alice <alice@example.org>".into()),
            algorithm: String::new(),
            bits: 4096,
            revoked: false,
            expired: false,
            disabled: false,
            owner_trust,
            tofu_policy,
        }])
    }

    fn sig(fingerprint: &str, status: u32, summary: u32) -> RawSignature {
        RawSignature {
            fingerprint: fingerprint.into(),
            summary,
            status,
            timestamp: 1_700_000_000,
            exp_timestamp: 0,
            pubkey_algo: 1,
            hash_algo: 8,
        }
    }

    #[test]
    fn known_signer_is_enriched() {
        let db = db(TrustLevel::Full, TofuPolicy::Unknown);
        let rec = build_record(&sig(ALICE, 0, sigsum::VALID | sigsum::GREEN), &db);
        assert_eq!(rec.status, SignatureStatus::Good);
        assert_eq!(rec.signer.fingerprint, ALICE);
        assert_eq!(rec.signer.algorithm, "RSA");
        assert_eq!(rec.signer.bits, 4096);
        assert_eq!(rec.signer_uid.as_deref(), Some("Alice <alice@example.org>"));
        assert_eq!(rec.trust.level, TrustLevel::Full);
        assert_eq!(rec.hash_algo, "SHA256");
        assert_eq!(rec.signed_at.timestamp(), 1_700_000_000);
        assert!(rec.expires_at.is_none());
        assert!(rec.is_fully_valid());
    }

    #[test]
    fn absent_key_forces_missing_key() {
        let db = db(TrustLevel::Ultimate, TofuPolicy::Good);
        let rec = build_record(
            &sig("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", 0, sigsum::GREEN),
            &db,
        );
        assert_eq!(rec.status, SignatureStatus::MissingKey);
        assert!(!rec.key_state.present_locally);
        assert_eq!(rec.signer.primary_key_id, "AAAAAAAAAAAAAAAA");
        assert_eq!(rec.trust.source, TrustSource::None);
        assert!(!rec.is_fully_valid());
    }

    #[test]
    fn absent_key_overrides_bad_status_too() {
        let db = KeySnapshot::default();
        let rec = build_record(&sig(ALICE, gpg_err::BAD_SIGNATURE, 0), &db);
        assert_eq!(rec.status, SignatureStatus::MissingKey);
    }

    #[test]
    fn tofu_policy_is_consulted() {
        let db = db(TrustLevel::Ultimate, TofuPolicy::Bad);
        let rec = build_record(&sig(ALICE, 0, sigsum::GREEN), &db);
        assert_eq!(rec.tofu_policy, TofuPolicy::Bad);
        assert_eq!(rec.trust.level, TrustLevel::Never);
        assert!(!rec.is_fully_valid());
    }

    #[test]
    fn order_is_preserved() {
        let db = db(TrustLevel::Full, TofuPolicy::Unknown);
        let raws = vec![
            sig(ALICE, 0, 0),
            sig("BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB", 0, 0),
            sig(ALICE, gpg_err::SIG_EXPIRED, 0),
        ];
        let recs = build_records(&raws, &db);
        let statuses: Vec<_> = recs.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                SignatureStatus::Good,
                SignatureStatus::MissingKey,
                SignatureStatus::Expired
            ]
        );
    }

    #[test]
    fn expiry_is_recorded() {
        let db = db(TrustLevel::Full, TofuPolicy::Unknown);
        let mut raw = sig(ALICE, 0, 0);
        raw.exp_timestamp = 1_800_000_000;
        let rec = build_record(&raw, &db);
        assert_eq!(rec.expires_at.map(|t| t.timestamp()), Some(1_800_000_000));
    }
}

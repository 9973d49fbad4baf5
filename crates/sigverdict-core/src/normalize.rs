//! Operation result normalization.
//!
//! One function per operation kind; `normalize` dispatches over the closed
//! set of raw result variants. Every path returns a report, even when the
//! engine call failed.

use chrono::Local;
use tracing::debug;

use crate::keydb::{lookup, KeyDatabaseView};
use crate::model::KeyReference;
use crate::raw::{
    RawDecryptResult, RawEncryptResult, RawEngineError, RawInvalidKey, RawOperationResult,
    RawSignResult, RawVerifyResult,
};
use crate::record::{build_records, timestamp};
use crate::report::{
    DecryptReport, EncryptReport, InvalidKeyRecord, NewSignatureRecord, OperationError,
    OperationReport, OperationStatus, RecipientRecord, RecipientStatus, SignReport, VerifyReport,
};
use crate::status::{
    describe_error_code, gpg_err, hash_algo_name, pubkey_algo_name, sign_mode_from_raw,
};

/// Normalize any raw engine result into a report.
pub fn normalize(raw: &RawOperationResult, db: &dyn KeyDatabaseView) -> OperationReport {
    match raw {
        RawOperationResult::Decrypt(d) => OperationReport::Decrypt(normalize_decrypt(d, None, db)),
        RawOperationResult::Encrypt(e) => OperationReport::Encrypt(normalize_encrypt(e)),
        RawOperationResult::Sign(s) => OperationReport::Sign(normalize_sign(s, db)),
        RawOperationResult::Verify(v) => OperationReport::Verify(normalize_verify(v, db)),
        RawOperationResult::DecryptVerify { decrypt, verify } => {
            OperationReport::Decrypt(normalize_decrypt(decrypt, Some(verify), db))
        }
    }
}

fn operation_error(raw: &Option<RawEngineError>) -> Option<OperationError> {
    let err = raw.as_ref()?;
    let code = err.code & gpg_err::CODE_MASK;
    if code == gpg_err::NO_ERROR {
        return None;
    }
    let message = if err.message.is_empty() {
        describe_error_code(code).to_string()
    } else {
        err.message.clone()
    };
    Some(OperationError { code, message })
}

fn invalid_keys(raw: &[RawInvalidKey]) -> Vec<InvalidKeyRecord> {
    raw.iter()
        .map(|k| InvalidKeyRecord {
            fingerprint: k.fingerprint.clone(),
            reason_code: k.reason & gpg_err::CODE_MASK,
            reason: k
                .reason_text
                .clone()
                .unwrap_or_else(|| describe_error_code(k.reason).to_string()),
        })
        .collect()
}

/// Decrypt, optionally combined with the verify half of a decrypt-and-verify call.
pub fn normalize_decrypt(
    raw: &RawDecryptResult,
    verify: Option<&RawVerifyResult>,
    db: &dyn KeyDatabaseView,
) -> DecryptReport {
    let mut error = operation_error(&raw.error);
    if error.is_none() {
        error = verify.and_then(|v| operation_error(&v.error));
    }

    let recipients = raw
        .recipients
        .iter()
        .map(|r| {
            let ok = r.status & gpg_err::CODE_MASK == gpg_err::NO_ERROR;
            RecipientRecord {
                key_id: r.key_id.clone(),
                fingerprint: lookup(db, &r.key_id).map(|e| e.reference.fingerprint),
                pubkey_algo: pubkey_algo_name(r.pubkey_algo).to_string(),
                status: if ok {
                    RecipientStatus::Ok
                } else {
                    RecipientStatus::GeneralError
                },
                reason: match &r.reason {
                    Some(text) => Some(text.clone()),
                    None if !ok => Some(describe_error_code(r.status).to_string()),
                    None => None,
                },
            }
        })
        .collect();

    let integrity_protected = !raw.legacy_cipher_nomdc;
    let signatures = verify
        .map(|v| build_records(&v.signatures, db))
        .unwrap_or_default();

    let status = if error.is_some() {
        OperationStatus::Failed
    } else if !integrity_protected || raw.unsupported_algorithm.is_some() {
        OperationStatus::SucceededWithWarnings
    } else {
        OperationStatus::Success
    };

    DecryptReport {
        status,
        error,
        symmetric_algo: raw.symkey_algo.clone(),
        session_key: raw.session_key.clone(),
        integrity_protected,
        unsupported_algorithm: raw.unsupported_algorithm.clone(),
        file_name: raw.file_name.clone().or_else(|| verify.and_then(|v| v.file_name.clone())),
        recipients,
        verified: verify.is_some(),
        signatures,
    }
}

/// Encrypt. Zero valid recipients is a hard failure, distinct from warnings.
pub fn normalize_encrypt(raw: &RawEncryptResult) -> EncryptReport {
    let invalid_recipients = invalid_keys(&raw.invalid_recipients);
    let mut error = operation_error(&raw.error);

    let asked = raw.recipient_count.max(invalid_recipients.len());
    let valid = asked.saturating_sub(invalid_recipients.len());
    let no_valid_recipients = asked > 0 && valid == 0;

    if no_valid_recipients && error.is_none() {
        error = Some(OperationError {
            code: gpg_err::UNUSABLE_PUBKEY,
            message: "no valid recipients".to_string(),
        });
    }

    let status = if error.is_some() {
        OperationStatus::Failed
    } else if !invalid_recipients.is_empty() {
        OperationStatus::SucceededWithWarnings
    } else {
        OperationStatus::Success
    };

    debug!(asked, valid, ?status, "normalized encrypt result");

    EncryptReport {
        status,
        error,
        recipient_count: asked,
        invalid_recipients,
    }
}

/// Sign. Records the mode and every new signature with UTC and local creation time.
pub fn normalize_sign(raw: &RawSignResult, db: &dyn KeyDatabaseView) -> SignReport {
    let invalid_signers = invalid_keys(&raw.invalid_signers);
    let mut error = operation_error(&raw.error);

    let new_signatures: Vec<NewSignatureRecord> = raw
        .new_signatures
        .iter()
        .map(|s| {
            let pubkey_algo = pubkey_algo_name(s.pubkey_algo).to_string();
            let (signer, signer_uid) = match lookup(db, &s.fingerprint) {
                Some(entry) => (entry.reference, entry.primary_uid),
                None => (
                    KeyReference::from_fingerprint(&s.fingerprint, pubkey_algo.clone()),
                    None,
                ),
            };
            let created_at = timestamp(s.timestamp);
            NewSignatureRecord {
                signer,
                signer_uid,
                pubkey_algo,
                hash_algo: hash_algo_name(s.hash_algo).to_string(),
                created_at,
                created_at_local: created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S %:z")
                    .to_string(),
                sig_class: s.sig_class,
            }
        })
        .collect();

    if new_signatures.is_empty() && error.is_none() {
        error = Some(OperationError::general("no signature was created"));
    }

    let status = if error.is_some() {
        OperationStatus::Failed
    } else if !invalid_signers.is_empty() {
        OperationStatus::SucceededWithWarnings
    } else {
        OperationStatus::Success
    };

    SignReport {
        status,
        error,
        mode: sign_mode_from_raw(raw.mode),
        new_signatures,
        invalid_signers,
    }
}

/// Verify. Produces the full record sequence in engine order.
pub fn normalize_verify(raw: &RawVerifyResult, db: &dyn KeyDatabaseView) -> VerifyReport {
    let error = operation_error(&raw.error);
    let signatures = build_records(&raw.signatures, db);
    VerifyReport {
        status: if error.is_some() {
            OperationStatus::Failed
        } else {
            OperationStatus::Success
        },
        error,
        file_name: raw.file_name.clone(),
        signatures,
    }
}

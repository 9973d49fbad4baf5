//! Normalized operation reports.
//!
//! `OperationReport` is a closed union over the operation kinds. Reports are
//! plain values: serializable, comparable, cloneable across into UI code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{KeyReference, SignatureRecord, SignatureStatus};
use crate::status::{gpg_err, SignMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Decrypt,
    Encrypt,
    Sign,
    Verify,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Decrypt => "Decrypt",
            OperationKind::Encrypt => "Encrypt",
            OperationKind::Sign => "Sign",
            OperationKind::Verify => "Verify",
        };
        f.write_str(s)
    }
}

/// Outcome of the engine operation itself (not of signature validity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    SucceededWithWarnings,
    Failed,
}

/// Operation-level error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// GPG error code; `GENERAL` when the engine did not supply one.
    pub code: u32,
    pub message: String,
}

impl OperationError {
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            code: gpg_err::GENERAL,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Ok,
    GeneralError,
}

/// One recipient of a decrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub key_id: String,

    /// Resolved from the key database when the key is known locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    pub pubkey_algo: String,
    pub status: RecipientStatus,

    /// Engine text for the failure, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A key the engine refused for encryption or signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidKeyRecord {
    pub fingerprint: String,
    pub reason_code: u32,
    pub reason: String,
}

/// A signature created by a Sign operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSignatureRecord {
    pub signer: KeyReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_uid: Option<String>,

    pub pubkey_algo: String,
    pub hash_algo: String,
    pub created_at: DateTime<Utc>,

    /// Creation time rendered in the local timezone at normalization time.
    pub created_at_local: String,

    pub sig_class: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptReport {
    pub status: OperationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric_algo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,

    /// False for legacy ciphertexts without modification detection.
    pub integrity_protected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    pub recipients: Vec<RecipientRecord>,

    /// True for decrypt-and-verify; `signatures` is then meaningful.
    #[serde(default)]
    pub verified: bool,

    #[serde(default)]
    pub signatures: Vec<SignatureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptReport {
    pub status: OperationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,

    pub recipient_count: usize,
    pub invalid_recipients: Vec<InvalidKeyRecord>,
}

impl EncryptReport {
    pub fn valid_recipient_count(&self) -> usize {
        self.recipient_count
            .saturating_sub(self.invalid_recipients.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignReport {
    pub status: OperationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,

    pub mode: SignMode,
    pub new_signatures: Vec<NewSignatureRecord>,
    pub invalid_signers: Vec<InvalidKeyRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub status: OperationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Engine report order; display index is position + 1.
    pub signatures: Vec<SignatureRecord>,
}

/// Normalized result of one engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationReport {
    Decrypt(DecryptReport),
    Encrypt(EncryptReport),
    Sign(SignReport),
    Verify(VerifyReport),
}

impl OperationReport {
    /// Report for an engine call that failed before producing any result.
    pub fn failed(kind: OperationKind, error: OperationError) -> Self {
        let status = OperationStatus::Failed;
        let error = Some(error);
        match kind {
            OperationKind::Decrypt => Self::Decrypt(DecryptReport {
                status,
                error,
                symmetric_algo: None,
                session_key: None,
                integrity_protected: false,
                unsupported_algorithm: None,
                file_name: None,
                recipients: Vec::new(),
                verified: false,
                signatures: Vec::new(),
            }),
            OperationKind::Encrypt => Self::Encrypt(EncryptReport {
                status,
                error,
                recipient_count: 0,
                invalid_recipients: Vec::new(),
            }),
            OperationKind::Sign => Self::Sign(SignReport {
                status,
                error,
                mode: SignMode::Normal,
                new_signatures: Vec::new(),
                invalid_signers: Vec::new(),
            }),
            OperationKind::Verify => Self::Verify(VerifyReport {
                status,
                error,
                file_name: None,
                signatures: Vec::new(),
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Decrypt(_) => OperationKind::Decrypt,
            Self::Encrypt(_) => OperationKind::Encrypt,
            Self::Sign(_) => OperationKind::Sign,
            Self::Verify(_) => OperationKind::Verify,
        }
    }

    pub fn status(&self) -> OperationStatus {
        match self {
            Self::Decrypt(r) => r.status,
            Self::Encrypt(r) => r.status,
            Self::Sign(r) => r.status,
            Self::Verify(r) => r.status,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Decrypt(r) => r.error.as_ref(),
            Self::Encrypt(r) => r.error.as_ref(),
            Self::Sign(r) => r.error.as_ref(),
            Self::Verify(r) => r.error.as_ref(),
        }
    }

    /// Verified signatures carried by the report, in engine order.
    pub fn signatures(&self) -> &[SignatureRecord] {
        match self {
            Self::Decrypt(r) => &r.signatures,
            Self::Verify(r) => &r.signatures,
            Self::Encrypt(_) | Self::Sign(_) => &[],
        }
    }

    /// Whether this report is subject to a validity verdict.
    pub fn is_verification(&self) -> bool {
        match self {
            Self::Verify(_) => true,
            Self::Decrypt(r) => r.verified,
            Self::Encrypt(_) | Self::Sign(_) => false,
        }
    }

    /// Fingerprints of signers whose key is missing, in report order, without duplicates.
    pub fn unknown_signers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sig in self.signatures() {
            if sig.status == SignatureStatus::MissingKey && !out.contains(&sig.signer.fingerprint)
            {
                out.push(sig.signer.fingerprint.clone());
            }
        }
        out
    }
}

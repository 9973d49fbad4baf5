//! Raw engine results as handed over by the OpenPGP engine adapter.
//!
//! Field names and numeric codes follow the GPGME result structures. The
//! engine is a best-effort source: every field except the operation tag has a
//! default so that older or newer engines still deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Engine call failure (GPG error code plus engine message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEngineError {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

/// One signature as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSignature {
    /// Fingerprint or key ID of the signing key.
    pub fingerprint: String,
    /// GPGME `SIGSUM_*` bitmask.
    pub summary: u32,
    /// GPG error code for this signature.
    pub status: u32,
    /// Creation time, unix seconds.
    pub timestamp: i64,
    /// Expiry time, unix seconds; 0 means none.
    pub exp_timestamp: i64,
    pub pubkey_algo: u32,
    pub hash_algo: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawVerifyResult {
    pub error: Option<RawEngineError>,
    pub file_name: Option<String>,
    pub signatures: Vec<RawSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecryptRecipient {
    pub key_id: String,
    pub pubkey_algo: u32,
    /// GPG error code; 0 when this recipient could decrypt.
    pub status: u32,
    /// Engine-supplied text for a failure, kept verbatim.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecryptResult {
    pub error: Option<RawEngineError>,
    pub symkey_algo: Option<String>,
    pub session_key: Option<String>,
    /// Set when the message used a legacy cipher without MDC.
    pub legacy_cipher_nomdc: bool,
    pub unsupported_algorithm: Option<String>,
    pub file_name: Option<String>,
    pub recipients: Vec<RawDecryptRecipient>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInvalidKey {
    pub fingerprint: String,
    /// GPG error code explaining why the key was rejected.
    pub reason: u32,
    pub reason_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEncryptResult {
    pub error: Option<RawEngineError>,
    /// Number of recipients the caller asked to encrypt to.
    pub recipient_count: usize,
    pub invalid_recipients: Vec<RawInvalidKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNewSignature {
    pub fingerprint: String,
    pub pubkey_algo: u32,
    pub hash_algo: u32,
    pub timestamp: i64,
    pub sig_class: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSignResult {
    pub error: Option<RawEngineError>,
    /// 0 normal, 1 detach, 2 clear.
    pub mode: u32,
    pub new_signatures: Vec<RawNewSignature>,
    pub invalid_signers: Vec<RawInvalidKey>,
}

/// Raw result for any operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RawOperationResult {
    Decrypt(RawDecryptResult),
    Encrypt(RawEncryptResult),
    Sign(RawSignResult),
    Verify(RawVerifyResult),
    DecryptVerify {
        decrypt: RawDecryptResult,
        verify: RawVerifyResult,
    },
}

/// Parse an engine result document (JSON).
///
/// This is the only place a structural failure surfaces as `Err`; everything
/// after parsing is absorbed into the typed report.
pub fn parse_raw_result(json: &str) -> CoreResult<RawOperationResult> {
    serde_json::from_str(json).map_err(|e| CoreError::MalformedInput {
        message: e.to_string(),
    })
}

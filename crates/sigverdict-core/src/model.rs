//! Value types shared by every stage of the pipeline.
//!
//! All of these are created fresh per operation and never mutated afterwards.
//! They own no engine resources and can be cloned into presentation code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a key. Looked up, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyReference {
    /// Long (16 hex digit) ID of the primary key.
    pub primary_key_id: String,

    /// Long ID of the subkey that made the signature, if it was not the primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkey_id: Option<String>,

    /// Canonical 40-hex-digit fingerprint, uppercase, no spaces.
    pub fingerprint: String,

    /// Public key algorithm name (e.g. "RSA", "EdDSA").
    pub algorithm: String,

    /// Key length in bits (0 when unknown).
    #[serde(default)]
    pub bits: u32,
}

impl KeyReference {
    /// Build a reference when nothing but the engine-reported fingerprint is known.
    pub fn from_fingerprint(fingerprint: &str, algorithm: impl Into<String>) -> Self {
        let fingerprint = normalize_fingerprint(fingerprint);
        Self {
            primary_key_id: long_key_id(&fingerprint),
            subkey_id: None,
            fingerprint,
            algorithm: algorithm.into(),
            bits: 0,
        }
    }

    /// Whether the fingerprint is in canonical 40-hex-digit form.
    pub fn has_canonical_fingerprint(&self) -> bool {
        is_canonical_fingerprint(&self.fingerprint)
    }
}

/// Uppercase, strip whitespace and an optional `0x` prefix.
pub fn normalize_fingerprint(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn is_canonical_fingerprint(fpr: &str) -> bool {
    fpr.len() == 40 && fpr.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
}

/// Long key ID: the trailing 16 hex digits of a fingerprint (or the input itself if shorter).
pub fn long_key_id(fingerprint: &str) -> String {
    let chars: Vec<char> = normalize_fingerprint(fingerprint).chars().collect();
    let start = chars.len().saturating_sub(16);
    chars[start..].iter().collect()
}

/// Locally assigned owner trust. Declaration order is the total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Unknown,
    Undefined,
    Never,
    Marginal,
    Full,
    Ultimate,
}

impl TrustLevel {
    /// At least `Marginal`.
    pub fn is_sufficient(self) -> bool {
        self >= TrustLevel::Marginal
    }

    /// `Unknown` and `Undefined` mean nobody assigned a trust value.
    pub fn is_explicit(self) -> bool {
        !matches!(self, TrustLevel::Unknown | TrustLevel::Undefined)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Undefined => "undefined",
            TrustLevel::Never => "never",
            TrustLevel::Marginal => "marginal",
            TrustLevel::Full => "full",
            TrustLevel::Ultimate => "ultimate",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust-on-first-use policy recorded for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TofuPolicy {
    Auto,
    Good,
    Bad,
    Ask,
    #[default]
    Unknown,
}

/// Condition of a key at evaluation time. Derived fresh for every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyMaterialState {
    pub present_locally: bool,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub owner_trust: TrustLevel,
}

impl KeyMaterialState {
    /// State used when the key database has no entry for the signer.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Revoked or expired.
    pub fn is_unusable(&self) -> bool {
        self.revoked || self.expired
    }
}

/// Classification of one signature. Exactly one per signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Good,
    Bad,
    /// The signature itself expired.
    Expired,
    KeyExpired,
    KeyRevoked,
    MissingKey,
    #[serde(rename = "missing_crl")]
    MissingCrl,
    GeneralError,
}

impl SignatureStatus {
    /// Higher is more severe: Bad > KeyRevoked > KeyExpired > Expired > MissingKey
    /// > MissingCrl > GeneralError > Good.
    pub fn severity(self) -> u8 {
        match self {
            SignatureStatus::Good => 0,
            SignatureStatus::GeneralError => 1,
            SignatureStatus::MissingCrl => 2,
            SignatureStatus::MissingKey => 3,
            SignatureStatus::Expired => 4,
            SignatureStatus::KeyExpired => 5,
            SignatureStatus::KeyRevoked => 6,
            SignatureStatus::Bad => 7,
        }
    }

    pub fn is_good(self) -> bool {
        self == SignatureStatus::Good
    }

    /// Human-readable description for reports.
    pub fn describe(self) -> &'static str {
        match self {
            SignatureStatus::Good => "A good signature",
            SignatureStatus::Bad => "A bad signature; this signature is invalid",
            SignatureStatus::Expired => "A signature is valid but expired",
            SignatureStatus::KeyExpired => {
                "A signature is valid but the key used to verify it has expired"
            }
            SignatureStatus::KeyRevoked => {
                "A signature is valid but the key used to verify it has been revoked"
            }
            SignatureStatus::MissingKey => {
                "A signature could not be verified due to a missing key"
            }
            SignatureStatus::MissingCrl => {
                "A signature could not be fully checked because a CRL is missing"
            }
            SignatureStatus::GeneralError => {
                "Some other error prevented the signature verification"
            }
        }
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignatureStatus::Good => "good",
            SignatureStatus::Bad => "bad",
            SignatureStatus::Expired => "expired",
            SignatureStatus::KeyExpired => "key_expired",
            SignatureStatus::KeyRevoked => "key_revoked",
            SignatureStatus::MissingKey => "missing_key",
            SignatureStatus::MissingCrl => "missing_crl",
            SignatureStatus::GeneralError => "general_error",
        };
        f.write_str(s)
    }
}

/// Where a trust contribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustSource {
    OwnerTrust,
    Tofu,
    /// Neither owner trust nor TOFU supplied a usable value.
    None,
}

/// Per-signature trust produced by the trust evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustContribution {
    pub level: TrustLevel,
    pub source: TrustSource,
}

impl TrustContribution {
    pub fn is_sufficient(&self) -> bool {
        self.level.is_sufficient()
    }
}

/// One evaluated signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signer: KeyReference,

    /// Primary user ID of the signer, if the key is known locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_uid: Option<String>,

    pub signed_at: DateTime<Utc>,

    /// Signature expiry, if the signature carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub status: SignatureStatus,
    pub key_state: KeyMaterialState,
    pub tofu_policy: TofuPolicy,
    pub trust: TrustContribution,
    pub pubkey_algo: String,
    pub hash_algo: String,
}

impl SignatureRecord {
    /// Good, non-revoked, non-expired and trusted at least marginally.
    pub fn is_fully_valid(&self) -> bool {
        self.status.is_good() && !self.key_state.is_unusable() && self.trust.is_sufficient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_levels_are_totally_ordered() {
        assert!(TrustLevel::Unknown < TrustLevel::Undefined);
        assert!(TrustLevel::Undefined < TrustLevel::Never);
        assert!(TrustLevel::Never < TrustLevel::Marginal);
        assert!(TrustLevel::Marginal < TrustLevel::Full);
        assert!(TrustLevel::Full < TrustLevel::Ultimate);
        assert!(!TrustLevel::Never.is_sufficient());
        assert!(!TrustLevel::Unknown.is_sufficient());
        assert!(TrustLevel::Marginal.is_sufficient());
    }

    #[test]
    fn severity_follows_priority_order() {
        let order = [
            SignatureStatus::Good,
            SignatureStatus::GeneralError,
            SignatureStatus::MissingCrl,
            SignatureStatus::MissingKey,
            SignatureStatus::Expired,
            SignatureStatus::KeyExpired,
            SignatureStatus::KeyRevoked,
            SignatureStatus::Bad,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].severity() < pair[1].severity(), "{:?}", pair);
        }
    }

    #[test]
    fn fingerprint_normalization() {
        let fpr = normalize_fingerprint("0x1234 5678 9abc def0 1234  5678 9ABC DEF0 1234 5678");
        assert_eq!(fpr, "123456789ABCDEF0123456789ABCDEF012345678");
        assert!(is_canonical_fingerprint(&fpr));
        assert_eq!(long_key_id(&fpr), "9ABCDEF012345678");
    }

    #[test]
    fn short_input_is_its_own_key_id() {
        assert_eq!(long_key_id("deadbeef"), "DEADBEEF");
        let r = KeyReference::from_fingerprint("deadbeef", "RSA");
        assert!(!r.has_canonical_fingerprint());
    }

    #[test]
    fn missing_crl_serializes_snake_case() {
        let s = serde_json::to_string(&SignatureStatus::MissingCrl).unwrap();
        assert_eq!(s, "\"missing_crl\"");
    }
}

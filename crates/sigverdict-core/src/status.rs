//! Engine status code mapping.
//!
//! Pure translation of engine-native codes into typed variants. Nothing here
//! panics or fails: values this build does not know degrade to the least
//! trusting variant, because engine versions evolve independently.

use crate::model::{SignatureStatus, TofuPolicy};
use serde::{Deserialize, Serialize};

/// GPGME signature summary bits.
pub mod sigsum {
    pub const VALID: u32 = 0x0001;
    pub const GREEN: u32 = 0x0002;
    pub const RED: u32 = 0x0004;
    pub const KEY_REVOKED: u32 = 0x0010;
    pub const KEY_EXPIRED: u32 = 0x0020;
    pub const SIG_EXPIRED: u32 = 0x0040;
    pub const KEY_MISSING: u32 = 0x0080;
    pub const CRL_MISSING: u32 = 0x0100;
    pub const CRL_TOO_OLD: u32 = 0x0200;
    pub const BAD_POLICY: u32 = 0x0400;
    pub const SYS_ERROR: u32 = 0x0800;
    pub const TOFU_CONFLICT: u32 = 0x1000;
}

/// GPG error codes consulted by the mapper.
pub mod gpg_err {
    pub const NO_ERROR: u32 = 0;
    pub const GENERAL: u32 = 1;
    pub const BAD_SIGNATURE: u32 = 8;
    pub const NO_PUBKEY: u32 = 9;
    pub const NO_SECKEY: u32 = 17;
    pub const UNUSABLE_PUBKEY: u32 = 53;
    pub const UNUSABLE_SECKEY: u32 = 54;
    pub const CERT_REVOKED: u32 = 94;
    pub const NO_CRL_KNOWN: u32 = 95;
    pub const CRL_TOO_OLD: u32 = 96;
    pub const KEY_EXPIRED: u32 = 153;
    pub const SIG_EXPIRED: u32 = 154;

    /// Error values may carry the error source in the high bits.
    pub const CODE_MASK: u32 = 0xFFFF;
}

/// Engine-native status of one signature: error code plus summary bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawStatus {
    pub code: u32,
    pub summary: u32,
}

/// Decode a composite engine status into the single most severe classification.
///
/// Every problem the code or the summary bits report is collected first and
/// the highest-severity one wins, so a signature that is both bad and made by
/// an expired key reports `Bad`.
pub fn map_status(raw: RawStatus) -> SignatureStatus {
    let mut found: Vec<SignatureStatus> = Vec::with_capacity(4);

    match raw.code & gpg_err::CODE_MASK {
        gpg_err::NO_ERROR => {}
        gpg_err::BAD_SIGNATURE => found.push(SignatureStatus::Bad),
        gpg_err::CERT_REVOKED => found.push(SignatureStatus::KeyRevoked),
        gpg_err::KEY_EXPIRED => found.push(SignatureStatus::KeyExpired),
        gpg_err::SIG_EXPIRED => found.push(SignatureStatus::Expired),
        gpg_err::NO_PUBKEY => found.push(SignatureStatus::MissingKey),
        gpg_err::NO_CRL_KNOWN | gpg_err::CRL_TOO_OLD => found.push(SignatureStatus::MissingCrl),
        _ => found.push(SignatureStatus::GeneralError),
    }

    let s = raw.summary;
    if s & sigsum::RED != 0 {
        found.push(SignatureStatus::Bad);
    }
    if s & sigsum::KEY_REVOKED != 0 {
        found.push(SignatureStatus::KeyRevoked);
    }
    if s & sigsum::KEY_EXPIRED != 0 {
        found.push(SignatureStatus::KeyExpired);
    }
    if s & sigsum::SIG_EXPIRED != 0 {
        found.push(SignatureStatus::Expired);
    }
    if s & sigsum::KEY_MISSING != 0 {
        found.push(SignatureStatus::MissingKey);
    }
    if s & (sigsum::CRL_MISSING | sigsum::CRL_TOO_OLD) != 0 {
        found.push(SignatureStatus::MissingCrl);
    }
    if s & sigsum::SYS_ERROR != 0 {
        found.push(SignatureStatus::GeneralError);
    }
    // BAD_POLICY and TOFU_CONFLICT are trust findings, resolved by the trust evaluator.

    found
        .into_iter()
        .max_by_key(|status| status.severity())
        .unwrap_or(SignatureStatus::Good)
}

/// GPGME `gpgme_tofu_policy_t` to policy. `NONE` (0) and unknown values map to `Unknown`.
pub fn tofu_policy_from_raw(raw: u32) -> TofuPolicy {
    match raw {
        1 => TofuPolicy::Auto,
        2 => TofuPolicy::Good,
        4 => TofuPolicy::Bad,
        5 => TofuPolicy::Ask,
        _ => TofuPolicy::Unknown,
    }
}

/// How a signature was attached to the signed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    Normal,
    Clear,
    Detach,
}

pub fn sign_mode_from_raw(raw: u32) -> SignMode {
    match raw {
        1 => SignMode::Detach,
        2 => SignMode::Clear,
        _ => SignMode::Normal,
    }
}

/// RFC 4880 public key algorithm names.
pub fn pubkey_algo_name(id: u32) -> &'static str {
    match id {
        1 => "RSA",
        2 => "RSA-E",
        3 => "RSA-S",
        16 => "ELG-E",
        17 => "DSA",
        18 => "ECDH",
        19 => "ECDSA",
        20 => "ELG",
        22 => "EdDSA",
        _ => "Unknown",
    }
}

/// RFC 4880 hash algorithm names.
pub fn hash_algo_name(id: u32) -> &'static str {
    match id {
        1 => "MD5",
        2 => "SHA1",
        3 => "RIPEMD160",
        8 => "SHA256",
        9 => "SHA384",
        10 => "SHA512",
        11 => "SHA224",
        _ => "Unknown",
    }
}

/// Short description of a GPG error code, used when the engine gave no text.
pub fn describe_error_code(code: u32) -> &'static str {
    match code & gpg_err::CODE_MASK {
        gpg_err::NO_ERROR => "success",
        gpg_err::GENERAL => "general error",
        gpg_err::BAD_SIGNATURE => "bad signature",
        gpg_err::NO_PUBKEY => "no public key",
        gpg_err::NO_SECKEY => "no secret key",
        gpg_err::UNUSABLE_PUBKEY => "unusable public key",
        gpg_err::UNUSABLE_SECKEY => "unusable secret key",
        gpg_err::CERT_REVOKED => "certificate revoked",
        gpg_err::NO_CRL_KNOWN => "no CRL known",
        gpg_err::CRL_TOO_OLD => "CRL too old",
        gpg_err::KEY_EXPIRED => "key expired",
        gpg_err::SIG_EXPIRED => "signature expired",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(code: u32, summary: u32) -> SignatureStatus {
        map_status(RawStatus { code, summary })
    }

    #[test]
    fn clean_status_is_good() {
        assert_eq!(st(0, 0), SignatureStatus::Good);
        assert_eq!(st(0, sigsum::VALID | sigsum::GREEN), SignatureStatus::Good);
    }

    #[test]
    fn bad_beats_key_expired() {
        assert_eq!(st(0, sigsum::RED | sigsum::KEY_EXPIRED), SignatureStatus::Bad);
        assert_eq!(st(gpg_err::BAD_SIGNATURE, sigsum::KEY_EXPIRED), SignatureStatus::Bad);
        assert_eq!(st(gpg_err::KEY_EXPIRED, sigsum::RED), SignatureStatus::Bad);
    }

    #[test]
    fn revoked_beats_expired() {
        assert_eq!(
            st(0, sigsum::KEY_REVOKED | sigsum::KEY_EXPIRED | sigsum::SIG_EXPIRED),
            SignatureStatus::KeyRevoked
        );
        assert_eq!(
            st(gpg_err::SIG_EXPIRED, sigsum::KEY_EXPIRED),
            SignatureStatus::KeyExpired
        );
    }

    #[test]
    fn missing_material() {
        assert_eq!(st(gpg_err::NO_PUBKEY, 0), SignatureStatus::MissingKey);
        assert_eq!(st(0, sigsum::KEY_MISSING), SignatureStatus::MissingKey);
        assert_eq!(st(0, sigsum::CRL_MISSING), SignatureStatus::MissingCrl);
        assert_eq!(st(gpg_err::CRL_TOO_OLD, 0), SignatureStatus::MissingCrl);
        assert_eq!(
            st(0, sigsum::KEY_MISSING | sigsum::CRL_MISSING),
            SignatureStatus::MissingKey
        );
    }

    #[test]
    fn unknown_codes_are_general_errors() {
        assert_eq!(st(gpg_err::GENERAL, 0), SignatureStatus::GeneralError);
        assert_eq!(st(31337, 0), SignatureStatus::GeneralError);
        assert_eq!(st(u32::MAX, 0), SignatureStatus::GeneralError);
        // source bits are ignored
        assert_eq!(st((7 << 24) | gpg_err::NO_PUBKEY, 0), SignatureStatus::MissingKey);
        assert_eq!(st(0, sigsum::SYS_ERROR), SignatureStatus::GeneralError);
    }

    #[test]
    fn unknown_summary_bits_are_ignored() {
        assert_eq!(st(0, 0x8000_0000), SignatureStatus::Good);
    }

    #[test]
    fn policy_and_tofu_bits_leave_status_alone() {
        let good = sigsum::VALID | sigsum::GREEN;
        assert_eq!(st(0, sigsum::TOFU_CONFLICT), SignatureStatus::Good);
        assert_eq!(st(0, good | sigsum::BAD_POLICY), SignatureStatus::Good);
        assert_eq!(
            st(0, good | sigsum::BAD_POLICY | sigsum::TOFU_CONFLICT),
            SignatureStatus::Good
        );
    }

    #[test]
    fn tofu_table() {
        assert_eq!(tofu_policy_from_raw(4), TofuPolicy::Bad);
        assert_eq!(tofu_policy_from_raw(0), TofuPolicy::Unknown);
        assert_eq!(tofu_policy_from_raw(3), TofuPolicy::Unknown);
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(pubkey_algo_name(22), "EdDSA");
        assert_eq!(hash_algo_name(8), "SHA256");
        assert_eq!(hash_algo_name(255), "Unknown");
        assert_eq!(sign_mode_from_raw(2), SignMode::Clear);
        assert_eq!(sign_mode_from_raw(7), SignMode::Normal);
    }
}

//! OpenPGP result normalization and trust verdicts.
//!
//! Takes the raw outcome of a decrypt, encrypt, sign or verify call as
//! reported by the OpenPGP engine and turns it into:
//!
//! - a typed [`OperationReport`] with one [`SignatureRecord`] per signature
//! - a single [`Verdict`] that is `FullyValid` only when every signature is
//!   good, made by a usable key, and trusted at least marginally
//!
//! Everything here is synchronous and free of I/O. The key database is
//! consulted through the read-only [`KeyDatabaseView`] trait.
//!
//! # Quick Start
//!
//! ```
//! use sigverdict_core::{aggregate, normalize, parse_raw_result, KeySnapshot};
//!
//! let raw = parse_raw_result(r#"{"operation":"verify","signatures":[]}"#).unwrap();
//! let report = normalize(&raw, &KeySnapshot::default());
//! let verdict = aggregate(&report);
//! assert!(!verdict.is_fully_valid());
//! ```

pub mod error;
pub mod keydb;
pub mod model;
pub mod normalize;
pub mod raw;
pub mod record;
pub mod report;
pub mod status;
pub mod trust;
pub mod verdict;

// Re-export main types
pub use error::{CoreError, CoreResult};
pub use keydb::{lookup, KeyDatabaseView, KeyEntry, KeySnapshot, SnapshotKey};
pub use model::{
    normalize_fingerprint, KeyMaterialState, KeyReference, SignatureRecord, SignatureStatus,
    TofuPolicy, TrustContribution, TrustLevel, TrustSource,
};
pub use normalize::normalize;
pub use raw::{parse_raw_result, RawOperationResult};
pub use record::{build_record, build_records};
pub use report::{
    DecryptReport, EncryptReport, InvalidKeyRecord, NewSignatureRecord, OperationError,
    OperationKind, OperationReport, OperationStatus, RecipientRecord, RecipientStatus, SignReport,
    VerifyReport,
};
pub use status::{map_status, RawStatus, SignMode};
pub use verdict::{
    aggregate, aggregate_records, Overall, Reason, ReasonKind, Verdict, VerdictAggregator,
    ADJUST_TRUST_HINT,
};

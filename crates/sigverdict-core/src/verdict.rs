//! Verdict aggregation.
//!
//! Reduces the signature records of a Verify or Decrypt-and-Verify report to
//! one pass/fail conclusion with reasons. Nothing averages: one disqualified
//! signature makes the whole verdict `NotFullyValid`.

use serde::{Deserialize, Serialize};

use crate::model::{SignatureRecord, SignatureStatus, TofuPolicy, TrustSource};
use crate::report::OperationReport;

/// Hint attached when trust is the only thing standing between a signature and validity.
pub const ADJUST_TRUST_HINT: &str = "Adjust Trust Level to make it Fully Valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overall {
    FullyValid,
    NotFullyValid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    BadSignature,
    SignatureExpired,
    KeyExpired,
    KeyRevoked,
    MissingKey,
    MissingCrl,
    VerificationError,
    InsufficientTrust,
    /// TOFU history marks the key bad; owner trust cannot override it.
    TofuConflict,
    NoSignatures,
    OperationFailed,
}

impl ReasonKind {
    fn from_status(status: SignatureStatus) -> Option<Self> {
        match status {
            SignatureStatus::Good => None,
            SignatureStatus::Bad => Some(Self::BadSignature),
            SignatureStatus::Expired => Some(Self::SignatureExpired),
            SignatureStatus::KeyExpired => Some(Self::KeyExpired),
            SignatureStatus::KeyRevoked => Some(Self::KeyRevoked),
            SignatureStatus::MissingKey => Some(Self::MissingKey),
            SignatureStatus::MissingCrl => Some(Self::MissingCrl),
            SignatureStatus::GeneralError => Some(Self::VerificationError),
        }
    }

    /// What the user can do about it.
    pub fn hint(self) -> &'static str {
        match self {
            Self::BadSignature => "Do not trust the signed content; it may have been altered",
            Self::SignatureExpired => "Ask the signer for a fresh signature",
            Self::KeyExpired => "Refresh the signer's key; the owner may have extended it",
            Self::KeyRevoked => "Ask the signer for a signature made with a valid key",
            Self::MissingKey => "Import the signer's public key from a keyserver",
            Self::MissingCrl => "Update the certificate revocation lists and verify again",
            Self::VerificationError => "Check the engine setup and verify again",
            Self::InsufficientTrust => ADJUST_TRUST_HINT,
            Self::TofuConflict => "Review the key's TOFU policy before trusting this signature",
            Self::NoSignatures => "Make sure the input actually carries a signature",
            Self::OperationFailed => "Check the input data and verify again",
        }
    }
}

/// One disqualifying finding. `signature_index` is the position in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    pub kind: ReasonKind,
    pub message: String,
    pub hint: String,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(i) = self.signature_index {
            write!(f, "Signature [{}]: ", i + 1)?;
        }
        write!(f, "{} ({})", self.message, self.hint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub overall: Overall,
    pub reasons: Vec<Reason>,

    /// Fingerprints of signers whose key is missing locally.
    #[serde(default)]
    pub unknown_signers: Vec<String>,
}

impl Verdict {
    pub fn is_fully_valid(&self) -> bool {
        self.overall == Overall::FullyValid
    }
}

/// Aggregation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// No record seen yet.
    Pending,
    /// Every record so far qualifies.
    Valid,
    /// At least one record disqualified. Terminal.
    NotFullyValid,
}

/// Incremental verdict builder over signature records.
#[derive(Debug)]
pub struct VerdictAggregator {
    state: AggregatorState,
    seen: usize,
    reasons: Vec<Reason>,
    unknown_signers: Vec<String>,
}

impl Default for VerdictAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictAggregator {
    pub fn new() -> Self {
        Self {
            state: AggregatorState::Pending,
            seen: 0,
            reasons: Vec::new(),
            unknown_signers: Vec::new(),
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Record an operation-level failure. Forces `NotFullyValid`.
    pub fn fail_operation(&mut self, message: impl Into<String>) {
        let kind = ReasonKind::OperationFailed;
        self.reasons.push(Reason {
            signature_index: None,
            fingerprint: None,
            kind,
            message: message.into(),
            hint: kind.hint().to_string(),
        });
        self.state = AggregatorState::NotFullyValid;
    }

    /// Feed the next record, in report order.
    pub fn push(&mut self, record: &SignatureRecord) {
        let index = self.seen;
        self.seen += 1;

        if record.status == SignatureStatus::MissingKey
            && !self.unknown_signers.contains(&record.signer.fingerprint)
        {
            self.unknown_signers.push(record.signer.fingerprint.clone());
        }

        match disqualifier(record) {
            None => {
                if self.state == AggregatorState::Pending {
                    self.state = AggregatorState::Valid;
                }
            }
            Some((kind, message)) => {
                self.reasons.push(Reason {
                    signature_index: Some(index),
                    fingerprint: Some(record.signer.fingerprint.clone()),
                    kind,
                    message,
                    hint: kind.hint().to_string(),
                });
                self.state = AggregatorState::NotFullyValid;
            }
        }
    }

    pub fn finish(mut self) -> Verdict {
        let overall = match self.state {
            AggregatorState::Valid => Overall::FullyValid,
            AggregatorState::NotFullyValid => Overall::NotFullyValid,
            AggregatorState::Pending => {
                let kind = ReasonKind::NoSignatures;
                self.reasons.push(Reason {
                    signature_index: None,
                    fingerprint: None,
                    kind,
                    message: "Could not find information that can be used for verification"
                        .to_string(),
                    hint: kind.hint().to_string(),
                });
                Overall::NotFullyValid
            }
        };
        Verdict {
            overall,
            reasons: self.reasons,
            unknown_signers: self.unknown_signers,
        }
    }
}

/// The single most severe reason a record is not fully valid, if any.
///
/// Order: engine status, then revoked or expired key, then trust. Only a good
/// signature on a usable key can be disqualified by trust alone.
fn disqualifier(record: &SignatureRecord) -> Option<(ReasonKind, String)> {
    if let Some(kind) = ReasonKind::from_status(record.status) {
        return Some((kind, record.status.describe().to_string()));
    }
    if record.key_state.revoked {
        return Some((
            ReasonKind::KeyRevoked,
            "The signing key has been revoked".to_string(),
        ));
    }
    if record.key_state.expired {
        return Some((
            ReasonKind::KeyExpired,
            "The signing key has expired".to_string(),
        ));
    }
    if record.trust.source == TrustSource::Tofu && record.tofu_policy == TofuPolicy::Bad {
        return Some((
            ReasonKind::TofuConflict,
            "A good signature, but the key's TOFU policy is bad".to_string(),
        ));
    }
    if !record.trust.is_sufficient() {
        return Some((
            ReasonKind::InsufficientTrust,
            format!(
                "A good signature, but the signing key's trust level is {}",
                record.trust.level
            ),
        ));
    }
    None
}

/// Aggregate a slice of records.
pub fn aggregate_records(records: &[SignatureRecord]) -> Verdict {
    let mut agg = VerdictAggregator::new();
    for record in records {
        agg.push(record);
    }
    agg.finish()
}

/// Aggregate a whole report, taking its operation-level error into account.
pub fn aggregate(report: &OperationReport) -> Verdict {
    let mut agg = VerdictAggregator::new();
    if let Some(err) = report.error() {
        agg.fail_operation(format!("{} failed: {}", report.kind(), err.message));
    }
    for record in report.signatures() {
        agg.push(record);
    }
    agg.finish()
}

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use sigverdict_core::{
    aggregate_records, map_status, KeyMaterialState, KeyReference, Overall, RawStatus,
    ReasonKind, SignatureRecord, SignatureStatus, TofuPolicy, TrustContribution, TrustLevel,
    TrustSource, ADJUST_TRUST_HINT,
};

const STATUSES: [SignatureStatus; 8] = [
    SignatureStatus::Good,
    SignatureStatus::Bad,
    SignatureStatus::Expired,
    SignatureStatus::KeyExpired,
    SignatureStatus::KeyRevoked,
    SignatureStatus::MissingKey,
    SignatureStatus::MissingCrl,
    SignatureStatus::GeneralError,
];

const LEVELS: [TrustLevel; 6] = [
    TrustLevel::Unknown,
    TrustLevel::Undefined,
    TrustLevel::Never,
    TrustLevel::Marginal,
    TrustLevel::Full,
    TrustLevel::Ultimate,
];

fn make_record(
    n: usize,
    status: SignatureStatus,
    level: TrustLevel,
    revoked: bool,
    expired: bool,
) -> SignatureRecord {
    SignatureRecord {
        signer: KeyReference::from_fingerprint(&format!("{:040X}", n + 1), "RSA"),
        signer_uid: None,
        signed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        expires_at: None,
        status,
        key_state: KeyMaterialState {
            present_locally: status != SignatureStatus::MissingKey,
            revoked,
            expired,
            disabled: false,
            owner_trust: level,
        },
        tofu_policy: TofuPolicy::Unknown,
        trust: TrustContribution {
            level,
            source: TrustSource::OwnerTrust,
        },
        pubkey_algo: "RSA".into(),
        hash_algo: "SHA256".into(),
    }
}

fn arb_record() -> impl Strategy<Value = (usize, usize, bool, bool)> {
    (0..STATUSES.len(), 0..LEVELS.len(), any::<bool>(), any::<bool>())
}

fn build(raw: &[(usize, usize, bool, bool)]) -> Vec<SignatureRecord> {
    raw.iter()
        .enumerate()
        .map(|(n, &(s, l, revoked, expired))| {
            make_record(n, STATUSES[s], LEVELS[l], revoked, expired)
        })
        .collect()
}

proptest! {
    #[test]
    fn fully_valid_iff_every_signature_qualifies(raw in prop::collection::vec(arb_record(), 1..8)) {
        let records = build(&raw);
        let verdict = aggregate_records(&records);

        let expected = records.iter().all(|r| {
            r.status == SignatureStatus::Good
                && r.trust.level >= TrustLevel::Marginal
                && !r.key_state.revoked
                && !r.key_state.expired
        });
        prop_assert_eq!(verdict.is_fully_valid(), expected);

        if !verdict.is_fully_valid() {
            prop_assert!(!verdict.reasons.is_empty());
        }

        // one reason per disqualified signature, in report order
        let disqualified: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_fully_valid())
            .map(|(i, _)| i)
            .collect();
        let indices: Vec<usize> = verdict.reasons.iter().filter_map(|r| r.signature_index).collect();
        prop_assert_eq!(indices, disqualified);
    }

    #[test]
    fn single_bad_among_good_is_never_valid(n in 1usize..10, pos in 0usize..10) {
        let pos = pos % (n + 1);
        let mut records: Vec<SignatureRecord> = (0..=n)
            .map(|i| make_record(i, SignatureStatus::Good, TrustLevel::Ultimate, false, false))
            .collect();
        records[pos].status = SignatureStatus::Bad;

        let verdict = aggregate_records(&records);
        prop_assert_eq!(verdict.overall, Overall::NotFullyValid);
        prop_assert_eq!(verdict.reasons.len(), 1);
        prop_assert_eq!(verdict.reasons[0].kind, ReasonKind::BadSignature);
        prop_assert_eq!(verdict.reasons[0].signature_index, Some(pos));
    }

    #[test]
    fn trust_hint_only_for_pure_trust_problems(raw in prop::collection::vec(arb_record(), 1..8)) {
        let records = build(&raw);
        let verdict = aggregate_records(&records);
        for reason in &verdict.reasons {
            if reason.hint == ADJUST_TRUST_HINT {
                let r = &records[reason.signature_index.unwrap()];
                prop_assert_eq!(r.status, SignatureStatus::Good);
                prop_assert!(!r.key_state.revoked && !r.key_state.expired);
                prop_assert!(!r.trust.is_sufficient());
                prop_assert!(r.tofu_policy != TofuPolicy::Bad);
            }
        }
    }

    #[test]
    fn status_mapping_is_pure(code in any::<u32>(), summary in any::<u32>()) {
        let raw = RawStatus { code, summary };
        prop_assert_eq!(map_status(raw), map_status(raw));
    }

    #[test]
    fn unrecognized_codes_never_map_to_good(code in 1u32..0x1_0000) {
        let known = [8u32, 9, 94, 95, 96, 153, 154];
        prop_assume!(!known.contains(&code));
        prop_assert_eq!(map_status(RawStatus { code, summary: 0 }), SignatureStatus::GeneralError);
    }
}

use sigverdict_core::{
    aggregate, normalize, parse_raw_result, KeySnapshot, OperationKind, OperationReport,
    OperationStatus, Overall, ReasonKind, RecipientStatus, SignatureStatus, Verdict,
    ADJUST_TRUST_HINT,
};

const ALICE: &str = "A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1";
const BOB: &str = "B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2B2";
const CAROL: &str = "C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3C3";

fn keys() -> KeySnapshot {
    KeySnapshot::from_yaml(&format!(
        r#"
keys:
  - fingerprint: "{ALICE}"
    uid: "Alice <alice@example.org>"
    algorithm: RSA
    bits: 3072
    owner_trust: full
  - fingerprint: "{BOB}"
    uid: "Bob <bob@example.org>"
    algorithm: EdDSA
    bits: 255
"#
    ))
    .unwrap()
}

fn sig_json(fpr: &str, status: u32, summary: u32) -> String {
    format!(
        r#"{{"fingerprint":"{fpr}","status":{status},"summary":{summary},"timestamp":1700000000,"pubkey_algo":1,"hash_algo":8}}"#
    )
}

#[test]
fn good_signatures_with_one_untrusted_signer() {
    let json = format!(
        r#"{{"operation":"verify","signatures":[{},{}]}}"#,
        sig_json(ALICE, 0, 3),
        sig_json(BOB, 0, 1)
    );
    let raw = parse_raw_result(&json).unwrap();
    let report = normalize(&raw, &keys());

    assert_eq!(report.kind(), OperationKind::Verify);
    assert_eq!(report.status(), OperationStatus::Success);
    assert!(report
        .signatures()
        .iter()
        .all(|s| s.status == SignatureStatus::Good));

    let verdict = aggregate(&report);
    assert_eq!(verdict.overall, Overall::NotFullyValid);
    assert_eq!(verdict.reasons.len(), 1);
    let reason = &verdict.reasons[0];
    assert_eq!(reason.signature_index, Some(1));
    assert_eq!(reason.fingerprint.as_deref(), Some(BOB));
    assert_eq!(reason.kind, ReasonKind::InsufficientTrust);
    assert_eq!(reason.hint, ADJUST_TRUST_HINT);
}

#[test]
fn decrypt_recipient_reason_is_kept_verbatim() {
    let json = r#"{
        "operation": "decrypt",
        "symkey_algo": "AES256",
        "recipients": [
            {"key_id": "0011223344556677", "pubkey_algo": 1, "status": 17, "reason": "no secret key"}
        ]
    }"#;
    let report = normalize(&parse_raw_result(json).unwrap(), &keys());
    let OperationReport::Decrypt(decrypt) = &report else {
        panic!("expected a decrypt report, got {:?}", report.kind());
    };
    assert_eq!(decrypt.recipients.len(), 1);
    assert_eq!(decrypt.recipients[0].status, RecipientStatus::GeneralError);
    assert_eq!(decrypt.recipients[0].reason.as_deref(), Some("no secret key"));
    assert_eq!(decrypt.symmetric_algo.as_deref(), Some("AES256"));
}

#[test]
fn mixed_verify_report_round_trips() {
    let json = format!(
        r#"{{"operation":"verify","file_name":"release.tar.gz","signatures":[{},{},{}]}}"#,
        sig_json(ALICE, 0, 3),
        sig_json(BOB, 154, 0x40),
        sig_json(CAROL, 9, 0x80)
    );
    let report = normalize(&parse_raw_result(&json).unwrap(), &keys());
    let statuses: Vec<_> = report.signatures().iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            SignatureStatus::Good,
            SignatureStatus::Expired,
            SignatureStatus::MissingKey
        ]
    );

    let encoded = serde_json::to_string(&report).unwrap();
    let decoded: OperationReport = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, report);

    let verdict = aggregate(&report);
    assert_eq!(verdict.unknown_signers, vec![CAROL.to_string()]);
    let encoded = serde_json::to_string(&verdict).unwrap();
    let decoded: Verdict = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, verdict);
}

#[test]
fn engine_failure_still_yields_a_report_and_a_reason() {
    let json = r#"{"operation":"verify","error":{"code":58,"message":"no data"}}"#;
    let report = normalize(&parse_raw_result(json).unwrap(), &keys());
    assert_eq!(report.status(), OperationStatus::Failed);
    assert!(report.signatures().is_empty());

    let verdict = aggregate(&report);
    assert_eq!(verdict.overall, Overall::NotFullyValid);
    assert_eq!(verdict.reasons[0].kind, ReasonKind::OperationFailed);
    assert!(verdict.reasons[0].message.contains("no data"));
}

#[test]
fn tofu_bad_blocks_ultimately_trusted_key() {
    let db = KeySnapshot::from_yaml(&format!(
        r#"
keys:
  - fingerprint: "{ALICE}"
    owner_trust: ultimate
    tofu_policy: bad
"#
    ))
    .unwrap();
    let json = format!(
        r#"{{"operation":"verify","signatures":[{}]}}"#,
        sig_json(ALICE, 0, 3)
    );
    let verdict = aggregate(&normalize(&parse_raw_result(&json).unwrap(), &db));
    assert!(!verdict.is_fully_valid());
    assert_eq!(verdict.reasons.len(), 1);
    assert_eq!(verdict.reasons[0].kind, ReasonKind::TofuConflict);
    assert_eq!(verdict.reasons[0].hint, ReasonKind::TofuConflict.hint());
    assert_ne!(verdict.reasons[0].hint, ADJUST_TRUST_HINT);
}

//! `sigverdict analyse` - Normalize an engine result and judge it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;

use sigverdict_core::{
    aggregate, normalize, parse_raw_result, CoreError, KeySnapshot, OperationReport,
    OperationStatus, RecipientStatus, SignatureRecord, Verdict,
};

use crate::cli::args::AnalyseArgs;
use crate::exit_codes::{EXIT_ERROR, EXIT_NOT_FULLY_VALID, EXIT_SUCCESS};

#[derive(Serialize)]
struct AnalyseOutput<'a> {
    report: &'a OperationReport,
    verdict: Option<&'a Verdict>,
}

pub fn run(args: AnalyseArgs) -> Result<i32> {
    match run_analyse(&args) {
        Ok(code) => Ok(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            Ok(e.downcast_ref::<CoreError>()
                .map(CoreError::exit_code)
                .unwrap_or(EXIT_ERROR))
        }
    }
}

fn run_analyse(args: &AnalyseArgs) -> Result<i32> {
    let raw_json = fs::read_to_string(&args.result)
        .with_context(|| format!("failed to read engine result: {}", args.result.display()))?;
    let raw = parse_raw_result(&raw_json)?;

    let keys = match &args.keys {
        Some(path) => KeySnapshot::from_file(path)?,
        None => KeySnapshot::default(),
    };

    let report = normalize(&raw, &keys);
    let verdict = report.is_verification().then(|| aggregate(&report));

    if args.json {
        let out = AnalyseOutput {
            report: &report,
            verdict: verdict.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&report);
        if let Some(v) = &verdict {
            print_verdict(v);
        }
    }

    Ok(exit_code_for(&report, verdict.as_ref()))
}

fn exit_code_for(report: &OperationReport, verdict: Option<&Verdict>) -> i32 {
    match verdict {
        Some(v) if v.is_fully_valid() => EXIT_SUCCESS,
        Some(_) => EXIT_NOT_FULLY_VALID,
        None if report.status() == OperationStatus::Failed => EXIT_NOT_FULLY_VALID,
        None => EXIT_SUCCESS,
    }
}

fn print_report(report: &OperationReport) {
    println!("{}: {}", report.kind(), status_label(report.status()));
    if let Some(err) = report.error() {
        println!("  error: {} (code {})", err.message, err.code);
    }

    match report {
        OperationReport::Decrypt(d) => {
            if let Some(algo) = &d.symmetric_algo {
                println!("  cipher: {}", algo);
            }
            if !d.integrity_protected {
                println!("  warning: message is not integrity protected");
            }
            if let Some(algo) = &d.unsupported_algorithm {
                println!("  warning: unsupported algorithm {}", algo);
            }
            if let Some(name) = &d.file_name {
                println!("  file: {}", name);
            }
            for r in &d.recipients {
                let who = r.fingerprint.as_deref().unwrap_or(&r.key_id);
                match (r.status, &r.reason) {
                    (RecipientStatus::Ok, _) => println!("  recipient {} [{}]", who, r.pubkey_algo),
                    (RecipientStatus::GeneralError, reason) => println!(
                        "  recipient {} [{}]: {}",
                        who,
                        r.pubkey_algo,
                        reason.as_deref().unwrap_or("unusable")
                    ),
                }
            }
            if d.verified {
                print_signatures(&d.signatures);
            }
        }
        OperationReport::Encrypt(e) => {
            println!(
                "  recipients: {} of {} usable",
                e.valid_recipient_count(),
                e.recipient_count
            );
            for k in &e.invalid_recipients {
                println!("  invalid recipient {}: {}", k.fingerprint, k.reason);
            }
        }
        OperationReport::Sign(s) => {
            println!("  mode: {:?}", s.mode);
            for sig in &s.new_signatures {
                println!(
                    "  new signature by {} ({}/{}) at {}",
                    sig.signer.fingerprint, sig.pubkey_algo, sig.hash_algo, sig.created_at_local
                );
            }
            for k in &s.invalid_signers {
                println!("  invalid signer {}: {}", k.fingerprint, k.reason);
            }
        }
        OperationReport::Verify(v) => {
            if let Some(name) = &v.file_name {
                println!("  file: {}", name);
            }
            print_signatures(&v.signatures);
        }
    }
}

fn print_signatures(signatures: &[SignatureRecord]) {
    for (i, sig) in signatures.iter().enumerate() {
        println!(
            "  signature [{}] {}: {}",
            i + 1,
            sig.signer.fingerprint,
            sig.status.describe()
        );
        if let Some(uid) = &sig.signer_uid {
            println!("      signer: {}", uid);
        }
        println!(
            "      signed: {}  trust: {}",
            sig.signed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            sig.trust.level.as_str()
        );
    }
}

fn print_verdict(verdict: &Verdict) {
    if verdict.is_fully_valid() {
        println!("verdict: fully valid");
        return;
    }
    println!("verdict: not fully valid");
    for reason in &verdict.reasons {
        println!("  - {}", reason);
    }
    if !verdict.unknown_signers.is_empty() {
        println!("unknown signers (try `sigverdict keyserver fetch`):");
        for fpr in &verdict.unknown_signers {
            println!("  {}", fpr);
        }
    }
}

fn status_label(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::Success => "success",
        OperationStatus::SucceededWithWarnings => "succeeded with warnings",
        OperationStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigverdict_core::{OperationError, OperationKind};

    #[test]
    fn failed_non_verification_exits_one() {
        let report =
            OperationReport::failed(OperationKind::Encrypt, OperationError::general("boom"));
        assert_eq!(exit_code_for(&report, None), EXIT_NOT_FULLY_VALID);
    }

    #[test]
    fn verdict_drives_exit_code() {
        let report =
            OperationReport::failed(OperationKind::Verify, OperationError::general("boom"));
        let verdict = aggregate(&report);
        assert!(!verdict.is_fully_valid());
        assert_eq!(exit_code_for(&report, Some(&verdict)), EXIT_NOT_FULLY_VALID);
    }
}

//! Pure helpers: machine-readable index parsing, query heuristics, status
//! classification (no HTTP).

use chrono::{DateTime, TimeZone, Utc};
use sigverdict_core::model::{is_canonical_fingerprint, normalize_fingerprint};
use sigverdict_core::status::pubkey_algo_name;

use crate::error::KeyServerError;
use crate::types::KeyCandidate;

/// Fewer non-space characters than this is rejected without a request.
pub(crate) const MIN_QUERY_CHARS: usize = 3;

pub(crate) fn is_insufficient_query(query: &str) -> bool {
    query.chars().filter(|c| !c.is_whitespace()).count() < MIN_QUERY_CHARS
}

/// Short ID, long ID or fingerprint, with or without a `0x` prefix.
pub fn looks_like_key_id(query: &str) -> bool {
    let q = query.trim();
    let id = q
        .strip_prefix("0x")
        .or_else(|| q.strip_prefix("0X"))
        .unwrap_or(q);
    matches!(id.len(), 8 | 16 | 40) && id.chars().all(|c| c.is_ascii_hexdigit())
}

/// A query the server may only match with a `0x` prefix: a key ID without
/// the prefix yet.
pub(crate) fn looks_like_bare_key_id(query: &str) -> bool {
    let q = query.trim();
    !(q.starts_with("0x") || q.starts_with("0X")) && looks_like_key_id(q)
}

/// `0x`-prefixed, uppercase form of a key ID or fingerprint.
pub(crate) fn hex_key_query(id: &str) -> String {
    format!("0x{}", normalize_fingerprint(id))
}

/// Map a non-success HKP status (plus body) to an error.
pub(crate) fn classify_status(status: u16, body: &str, query: &str) -> KeyServerError {
    let lower = body.to_ascii_lowercase();
    if status == 413 || lower.contains("too many") {
        return KeyServerError::TooManyResponses {
            query: query.to_string(),
        };
    }
    if status == 400 && (lower.contains("insufficient") || lower.contains("too short")) {
        return KeyServerError::InsufficientQuery {
            query: query.to_string(),
        };
    }
    match status {
        404 => KeyServerError::NotFound {
            query: query.to_string(),
        },
        500..=599 => KeyServerError::Connection {
            message: format!("HTTP {}: {}", status, snippet(body)),
        },
        _ => KeyServerError::InvalidResponse {
            message: format!("HTTP {}: {}", status, snippet(body)),
        },
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// Parse an `options=mr` index listing.
///
/// ```text
/// info:1:2
/// pub:<keyid>:<algo>:<bits>:<created>:<expires>:<flags>
/// uid:<escaped uid>:<created>:<expires>:<flags>
/// ```
///
/// Unknown record types and malformed lines are skipped.
pub(crate) fn parse_machine_index(body: &str) -> Vec<KeyCandidate> {
    let mut out: Vec<KeyCandidate> = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") => {
                let Some(id) = fields.get(1).filter(|s| !s.is_empty()) else {
                    continue;
                };
                let id = normalize_fingerprint(id);
                let flags = fields.get(6).copied().unwrap_or("");
                out.push(KeyCandidate {
                    fingerprint: is_canonical_fingerprint(&id).then(|| id.clone()),
                    key_id: id,
                    algorithm: fields
                        .get(2)
                        .and_then(|s| s.parse::<u32>().ok())
                        .map(pubkey_algo_name)
                        .unwrap_or("Unknown")
                        .to_string(),
                    bits: fields.get(3).and_then(|s| s.parse().ok()).unwrap_or(0),
                    created: fields.get(4).and_then(|s| parse_time(s)),
                    expires: fields.get(5).and_then(|s| parse_time(s)),
                    revoked: flags.contains('r'),
                    disabled: flags.contains('d'),
                    expired: flags.contains('e'),
                    uids: Vec::new(),
                });
            }
            Some("uid") => {
                if let (Some(current), Some(uid)) = (out.last_mut(), fields.get(1)) {
                    current.uids.push(percent_decode(uid));
                }
            }
            _ => {}
        }
    }

    out
}

fn parse_time(field: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = field.trim().parse().ok()?;
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Undo `%XX` escapes. Input that does not decode to UTF-8 is kept as is.
pub(crate) fn percent_decode(s: &str) -> String {
    urlencoding::decode(s)
        .unwrap_or_else(|_| s.into())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "info:1:2\n\
pub:0123456789ABCDEF0123456789ABCDEF01234567:1:4096:1500000000::\n\
uid:Alice%20Example%20%3Calice@example.org%3E:1500000000::\n\
uid:Alice%20%28work%29:1500000000::\n\
pub:89abcdef01234567:22:255:1600000000:1700000000:re\n\
uid:Bob+Tag <bob+tag@example.org>:::\n";

    #[test]
    fn test_parse_machine_index() {
        let keys = parse_machine_index(INDEX);
        assert_eq!(keys.len(), 2);

        let alice = &keys[0];
        assert_eq!(
            alice.fingerprint.as_deref(),
            Some("0123456789ABCDEF0123456789ABCDEF01234567")
        );
        assert_eq!(alice.algorithm, "RSA");
        assert_eq!(alice.bits, 4096);
        assert_eq!(alice.created.map(|t| t.timestamp()), Some(1_500_000_000));
        assert!(alice.expires.is_none());
        assert_eq!(
            alice.uids,
            vec!["Alice Example <alice@example.org>", "Alice (work)"]
        );

        let bob = &keys[1];
        assert_eq!(bob.key_id, "89ABCDEF01234567");
        assert!(bob.fingerprint.is_none());
        assert_eq!(bob.fetch_id(), "89ABCDEF01234567");
        assert_eq!(bob.algorithm, "EdDSA");
        assert!(bob.revoked && bob.expired && !bob.disabled);
        assert_eq!(bob.uids, vec!["Bob+Tag <bob+tag@example.org>"]);
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(parse_machine_index("").is_empty());
        assert!(parse_machine_index("<html>nope</html>").is_empty());
        assert!(parse_machine_index("uid:orphan:::\npub::1:2048:::").is_empty());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%3Ab"), "a:b");
        assert_eq!(percent_decode("J%C3%BCrgen"), "Jürgen");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("Bob+Tag"), "Bob+Tag");
        // a dangling UTF-8 lead byte leaves the field untouched
        assert_eq!(percent_decode("J%C3rgen"), "J%C3rgen");
    }

    #[test]
    fn test_bare_key_id_heuristic() {
        assert!(looks_like_bare_key_id("DEADBEEF"));
        assert!(looks_like_bare_key_id("deadbeefdeadbeef"));
        assert!(looks_like_bare_key_id(
            "0123456789ABCDEF0123456789ABCDEF01234567"
        ));
        assert!(!looks_like_bare_key_id("0xDEADBEEF"));
        assert!(!looks_like_bare_key_id("DEADBEE"));
        assert!(!looks_like_bare_key_id("alice@example.org"));
        assert!(!looks_like_bare_key_id("DEADBEEFDEAD"));
        assert_eq!(hex_key_query("deadbeef"), "0xDEADBEEF");

        assert!(looks_like_key_id("0xDEADBEEF"));
        assert!(looks_like_key_id("0Xdeadbeefcafebabe"));
        assert!(looks_like_key_id(" DEADBEEF "));
        assert!(!looks_like_key_id("0x"));
        assert!(!looks_like_key_id("0xDEADBEE"));
        assert!(!looks_like_key_id("alice@example.org"));
    }

    #[test]
    fn test_insufficient_query() {
        assert!(is_insufficient_query(""));
        assert!(is_insufficient_query(" a b "));
        assert!(!is_insufficient_query("abc"));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(404, "", "q"),
            KeyServerError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(413, "", "q"),
            KeyServerError::TooManyResponses { .. }
        ));
        assert!(matches!(
            classify_status(500, "Too many responses", "q"),
            KeyServerError::TooManyResponses { .. }
        ));
        assert!(matches!(
            classify_status(400, "Search string too short", "q"),
            KeyServerError::InsufficientQuery { .. }
        ));
        let err = classify_status(503, "", "q");
        assert!(err.is_retryable());
        let err = classify_status(400, "bad request", "q");
        assert!(matches!(err, KeyServerError::InvalidResponse { .. }));
        assert!(!err.is_retryable());
    }
}

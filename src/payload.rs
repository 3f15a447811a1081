//! # Payload Transformation
//!
//! Converts the raw bytes of an upstream secret into the key/value
//! entries stored in the cluster secret.
//!
//! The upstream labels select the format:
//!
//! 1. `env=true` - a single-line env-var file, one `KEY=value` per line
//! 2. `multiline=true` - an env-var file whose entries are separated by
//!    a literal backslash followed by a newline, so values may span
//!    physical lines
//! 3. otherwise - the whole payload under the single key `secret`
//!
//! Entries keep their input order; duplicate keys, missing `=`
//! separators and keys outside `^[A-Za-z0-9_.-]+$` are rejected.

use std::collections::HashSet;
use std::str;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::provider::SecretMetadata;

/// Key under which a static (non-env) payload is stored
pub const STATIC_SECRET_KEY: &str = "secret";

/// Entry separator for the multiline format: a backslash followed by a
/// line feed
const MULTILINE_SEPARATOR: &str = "\\\n";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("key pattern must compile"));

/// Reasons a payload cannot be turned into key/value entries
///
/// These are configuration errors on the upstream secret; redelivery
/// cannot succeed until the secret's content is fixed.
#[derive(Debug, Error)]
pub enum PayloadFormatError {
    #[error("secret payload is not valid UTF-8")]
    NotUtf8(#[from] str::Utf8Error),
    #[error("line {line}: missing '=' separator")]
    MissingSeparator { line: usize },
    #[error("line {line}: key {key:?} does not match ^[A-Za-z0-9_.-]+$")]
    InvalidKey { line: usize, key: String },
    #[error("line {line}: duplicate key {key:?}")]
    DuplicateKey { line: usize, key: String },
}

/// Transform raw upstream bytes into ordered key/value entries
/// according to the metadata labels. A missing metadata record (the
/// upstream secret was deleted between the event and the fetch) falls
/// through to the static format.
pub fn secret_payload(
    metadata: Option<&SecretMetadata>,
    raw: &[u8],
) -> Result<Vec<(String, String)>, PayloadFormatError> {
    match metadata {
        Some(metadata) if metadata.env_format() => parse_env_entries(str::from_utf8(raw)?, "\n"),
        Some(metadata) if metadata.multiline_format() => {
            parse_env_entries(str::from_utf8(raw)?, MULTILINE_SEPARATOR)
        }
        _ => Ok(vec![(
            STATIC_SECRET_KEY.to_string(),
            str::from_utf8(raw)?.to_string(),
        )]),
    }
}

fn parse_env_entries(
    input: &str,
    separator: &str,
) -> Result<Vec<(String, String)>, PayloadFormatError> {
    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (index, entry) in input.split(separator).enumerate() {
        let line = index + 1;
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }

        let (key, value) = entry
            .split_once('=')
            .ok_or(PayloadFormatError::MissingSeparator { line })?;

        if !KEY_PATTERN.is_match(key) {
            return Err(PayloadFormatError::InvalidKey {
                line,
                key: key.to_string(),
            });
        }
        if !seen.insert(key.to_string()) {
            return Err(PayloadFormatError::DuplicateKey {
                line,
                key: key.to_string(),
            });
        }

        entries.push((key.to_string(), unquote(value)));
    }

    Ok(entries)
}

/// Strip one pair of enclosing double quotes and unescape `\n`, `\t`,
/// `\\` and `\"` inside them; unquoted values are taken verbatim.
fn unquote(value: &str) -> String {
    let Some(quoted) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut unescaped = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            unescaped.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some('\\') => unescaped.push('\\'),
            Some('"') => unescaped.push('"'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env_metadata() -> SecretMetadata {
        SecretMetadata {
            name: String::new(),
            labels: BTreeMap::from([
                ("sync".to_string(), "true".to_string()),
                ("env".to_string(), "true".to_string()),
            ]),
        }
    }

    fn multiline_metadata() -> SecretMetadata {
        SecretMetadata {
            name: String::new(),
            labels: BTreeMap::from([
                ("sync".to_string(), "true".to_string()),
                ("multiline".to_string(), "true".to_string()),
            ]),
        }
    }

    #[test]
    fn static_payload_uses_fixed_key() {
        let entries = secret_payload(None, b"hello").unwrap();
        assert_eq!(
            entries,
            vec![("secret".to_string(), "hello".to_string())]
        );
    }

    #[test]
    fn unlabeled_metadata_is_static() {
        let metadata = SecretMetadata {
            name: String::new(),
            labels: BTreeMap::from([("sync".to_string(), "true".to_string())]),
        };
        let entries = secret_payload(Some(&metadata), b"hello").unwrap();
        assert_eq!(entries[0].0, "secret");
    }

    #[test]
    fn env_payload_skips_comments_and_blanks() {
        let raw = b"FOO=BAR\nBAR=BAZ\n  # comment\n\n";
        let entries = secret_payload(Some(&env_metadata()), raw).unwrap();
        assert_eq!(
            entries,
            vec![
                ("FOO".to_string(), "BAR".to_string()),
                ("BAR".to_string(), "BAZ".to_string()),
            ]
        );
    }

    #[test]
    fn env_payload_preserves_insertion_order() {
        let raw = b"Z=1\nA=2\nM=3";
        let entries = secret_payload(Some(&env_metadata()), raw).unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["Z", "A", "M"]);
    }

    #[test]
    fn quoted_values_are_unescaped() {
        let raw = br#"MESSAGE="line one\nline two\t\"quoted\" \\ end""#;
        let entries = secret_payload(Some(&env_metadata()), raw).unwrap();
        assert_eq!(entries[0].1, "line one\nline two\t\"quoted\" \\ end");
    }

    #[test]
    fn unquoted_values_are_verbatim() {
        let raw = br"PATTERN=\d+\n";
        let entries = secret_payload(Some(&env_metadata()), raw).unwrap();
        assert_eq!(entries[0].1, r"\d+\n");
    }

    #[test]
    fn missing_separator_is_rejected() {
        let raw = b"FOO=BAR\nJUSTAWORD";
        let err = secret_payload(Some(&env_metadata()), raw).unwrap_err();
        assert!(matches!(
            err,
            PayloadFormatError::MissingSeparator { line: 2 }
        ));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let raw = b"SO ME=value";
        let err = secret_payload(Some(&env_metadata()), raw).unwrap_err();
        match err {
            PayloadFormatError::InvalidKey { line, key } => {
                assert_eq!(line, 1);
                assert_eq!(key, "SO ME");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let raw = b"FOO=1\nFOO=2";
        let err = secret_payload(Some(&env_metadata()), raw).unwrap_err();
        assert!(matches!(err, PayloadFormatError::DuplicateKey { line: 2, .. }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let raw = [0xff, 0xfe, 0xfd];
        assert!(matches!(
            secret_payload(Some(&env_metadata()), &raw),
            Err(PayloadFormatError::NotUtf8(_))
        ));
    }

    #[test]
    fn multiline_entries_split_on_backslash_newline() {
        let raw = b"CERT=first line\nsecond line\\\nKEY=short";
        let entries = secret_payload(Some(&multiline_metadata()), raw).unwrap();
        assert_eq!(
            entries,
            vec![
                ("CERT".to_string(), "first line\nsecond line".to_string()),
                ("KEY".to_string(), "short".to_string()),
            ]
        );
    }

    #[test]
    fn multiline_duplicate_key_is_rejected() {
        let raw = b"A=1\\\nA=2";
        let err = secret_payload(Some(&multiline_metadata()), raw).unwrap_err();
        assert!(matches!(err, PayloadFormatError::DuplicateKey { line: 2, .. }));
    }

    #[test]
    fn well_formed_env_payload_round_trips() {
        let raw = "FOO=BAR\nBAR=BAZ\nBAZ=QUX";
        let entries = secret_payload(Some(&env_metadata()), raw.as_bytes()).unwrap();
        let serialized = entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(serialized, raw);
    }

    #[test]
    fn identical_input_yields_identical_entries() {
        let raw = b"B=2\nA=1";
        let first = secret_payload(Some(&env_metadata()), raw).unwrap();
        let second = secret_payload(Some(&env_metadata()), raw).unwrap();
        assert_eq!(first, second);
    }
}

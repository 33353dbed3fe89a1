//! Decoding of the text bodies pushed by iclock attendance terminals.
//!
//! Two grammars share the same endpoints. Older firmware sends a `DATA` form
//! field holding `RECORD=` lines, newer firmware sends `USER `, `FP ` and bare
//! attendance lines as the whole body. [`parse`] picks one per payload and never
//! fails as a whole: a line that cannot be decoded is reported in
//! [`ParsedPayload::skipped`] and the rest of the payload is still returned.

use serde::Serialize;
use thiserror::Error;

use crate::records::DeviceRecord;

pub mod current;
pub mod legacy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("expected at least {expected} tab separated fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("field {field} is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("chunk is not a key=value pair: {0:?}")]
    MalformedPair(String),
    #[error("{0} tag without any fields")]
    BareTag(String),
}

impl LineError {
    /// Stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            LineError::TooFewFields { .. } => "too_few_fields",
            LineError::InvalidInteger { .. } => "invalid_integer",
            LineError::MissingField(_) => "missing_field",
            LineError::MalformedPair(_) => "malformed_pair",
            LineError::BareTag(_) => "bare_tag",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// `DATA=` form field with `RECORD=` lines.
    Legacy,
    /// Whole-body `USER`, `FP` and attendance lines.
    Current,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number within the payload.
    pub line: usize,
    pub content: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: LineError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParsedPayload {
    pub grammar: Grammar,
    pub records: Vec<DeviceRecord>,
    pub skipped: Vec<SkippedLine>,
}

/// One decoded line: its 1-based number, its text and the outcome.
pub type ParsedLine<'a> = (usize, &'a str, Result<DeviceRecord, LineError>);

fn serialize_display<S: serde::Serializer>(
    value: &LineError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn detect_grammar(body: &str) -> Grammar {
    let legacy = body.lines().map(str::trim).any(|line| {
        line.starts_with(legacy::RECORD_PREFIX)
            || line
                .strip_prefix(legacy::DATA_PREFIX)
                .is_some_and(|rest| rest.starts_with(legacy::RECORD_PREFIX))
    });

    if legacy {
        Grammar::Legacy
    } else {
        Grammar::Current
    }
}

pub fn parse(body: &str) -> ParsedPayload {
    let grammar = detect_grammar(body);

    let mut records = Vec::new();
    let mut skipped = Vec::new();

    let lines = match grammar {
        Grammar::Legacy => legacy::parse_lines(body),
        Grammar::Current => current::parse_lines(body),
    };

    for (line, content, result) in lines {
        match result {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::debug!(line, content, %error, "skipping device line");
                skipped.push(SkippedLine {
                    line,
                    content: content.to_string(),
                    error,
                });
            }
        }
    }

    ParsedPayload {
        grammar,
        records,
        skipped,
    }
}

/// Parses a mandatory integer field, trimming surrounding whitespace first.
pub(crate) fn parse_int(field: &'static str, value: &str) -> Result<i64, LineError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| LineError::InvalidInteger {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PunchStatus, UserRecord, VerifyMode};

    #[test]
    fn detects_legacy_record_lines() {
        assert_eq!(
            detect_grammar("RECORD=1\t100\t2024-01-15 09:00:00\t0\t15"),
            Grammar::Legacy
        );
        assert_eq!(
            detect_grammar("DATA=RECORD=1\t100\t2024-01-15 09:00:00\t0\t15"),
            Grammar::Legacy
        );
        assert_eq!(
            detect_grammar("USER PIN=1\n  RECORD=2\t1\tx\t0\t1"),
            Grammar::Legacy
        );
    }

    #[test]
    fn defaults_to_current_grammar() {
        assert_eq!(detect_grammar(""), Grammar::Current);
        assert_eq!(detect_grammar("USER PIN=7\tName=Alice"), Grammar::Current);
        assert_eq!(
            detect_grammar("123456\t2024-01-15 09:00:00\t0\t15\t0"),
            Grammar::Current
        );
        // RECORD= in the middle of a line is not a marker
        assert_eq!(detect_grammar("SN=1&RECORD=2"), Grammar::Current);
    }

    #[test]
    fn empty_body_is_not_an_error() {
        let parsed = parse("");
        assert!(parsed.records.is_empty());
        assert!(parsed.skipped.is_empty());

        let parsed = parse("\n \r\n\t\n");
        assert!(parsed.records.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn parses_user_payload() {
        let parsed = parse("USER PIN=7\tName=Alice\tPri=0");

        assert_eq!(parsed.grammar, Grammar::Current);
        assert_eq!(
            parsed.records,
            vec![DeviceRecord::User(UserRecord {
                pin: "7".to_string(),
                name: "Alice".to_string(),
                privilege: 0,
                ..Default::default()
            })]
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let body = "USER PIN=7\tName=Alice\tPri=14\tCard=123\n\
                    FP PIN=7\tFID=6\tSize=1024\tValid=1\tTMP=abc\n\
                    7\t2024-01-15 09:00:00\t1\t1\t0";

        assert_eq!(parse(body), parse(body));
    }

    #[test]
    fn short_lines_are_isolated() {
        let body = "123456\t2024-01-15 09:00:00\t0\t15\t0\n\
                    999\t2024-01-15 09:00:00\t0\n\
                    789012\t2024-01-15 09:01:00\t1\t25\t0";
        let parsed = parse(body);

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 2);
        assert_eq!(
            parsed.skipped[0].error,
            LineError::TooFewFields {
                expected: 5,
                found: 3
            }
        );
    }

    #[test]
    fn parses_legacy_data_field() {
        let parsed = parse("DATA=RECORD=1\t100\t2024-01-15 09:00:00\t0\t15");

        assert_eq!(parsed.grammar, Grammar::Legacy);
        assert_eq!(parsed.records.len(), 1);
        match &parsed.records[0] {
            DeviceRecord::LegacyAttendance(record) => {
                assert_eq!(record.record_num, "1");
                assert_eq!(record.user_id, "100");
                assert_eq!(record.timestamp, "2024-01-15 09:00:00");
                assert_eq!(record.status, PunchStatus::CheckIn);
                assert_eq!(record.verify_mode, VerifyMode::FingerprintTemplate);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn skipped_lines_serialize_error_text() {
        let parsed = parse("USER\n");
        let json = serde_json::to_value(&parsed).unwrap();

        assert_eq!(json["grammar"], "current");
        assert_eq!(json["skipped"][0]["error"], "USER tag without any fields");
    }
}

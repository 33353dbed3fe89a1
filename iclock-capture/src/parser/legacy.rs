use crate::parser::{LineError, ParsedLine};
use crate::records::{DeviceRecord, LegacyRecord, PunchStatus, VerifyMode};

pub(crate) const DATA_PREFIX: &str = "DATA=";
pub(crate) const RECORD_PREFIX: &str = "RECORD=";

const RECORD_MIN_FIELDS: usize = 5;

/// Decodes `RECORD=` lines, ignoring everything else in the body.
pub fn parse_lines(body: &str) -> Vec<ParsedLine<'_>> {
    body.split('\n')
        .enumerate()
        .filter_map(|(index, raw)| {
            let line = raw.trim();
            let line = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
            if !line.starts_with(RECORD_PREFIX) {
                return None;
            }
            Some((
                index + 1,
                line,
                parse_record(line).map(DeviceRecord::LegacyAttendance),
            ))
        })
        .collect()
}

/// Parses `RECORD=<num>\t<user>\t<timestamp>\t<check type>\t<verify code>`.
pub fn parse_record(line: &str) -> Result<LegacyRecord, LineError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < RECORD_MIN_FIELDS {
        return Err(LineError::TooFewFields {
            expected: RECORD_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let record_num = fields[0]
        .strip_prefix(RECORD_PREFIX)
        .unwrap_or(fields[0])
        .to_string();

    // check type is compared as text, there is no integer requirement here
    let status = if fields[3].trim() == "0" {
        PunchStatus::CheckIn
    } else {
        PunchStatus::CheckOut
    };

    Ok(LegacyRecord {
        record_num,
        user_id: fields[1].to_string(),
        timestamp: fields[2].to_string(),
        status,
        verify_mode: VerifyMode::from_text(fields[4]),
    })
}

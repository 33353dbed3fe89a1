use std::collections::HashMap;

use crate::parser::{parse_int, LineError, ParsedLine};
use crate::records::{
    AttendanceRecord, DeviceRecord, FingerprintRecord, PunchStatus, UserRecord, VerifyMode,
};

const USER_PREFIX: &str = "USER ";
const FP_PREFIX: &str = "FP ";
const USER_TAG: &str = "USER";
const FP_TAG: &str = "FP";

const ATTENDANCE_MIN_FIELDS: usize = 5;

/// Decodes a whole body of `USER`, `FP` and attendance lines.
pub fn parse_lines(body: &str) -> Vec<ParsedLine<'_>> {
    body.split('\n')
        .enumerate()
        .filter_map(|(index, raw)| {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() {
                return None;
            }
            Some((index + 1, line, parse_line(line)))
        })
        .collect()
}

pub fn parse_line(line: &str) -> Result<DeviceRecord, LineError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    // Trimmed text only picks the grammar, attendance fields stay positional
    let tag = line.trim_start();

    match tag.trim_end() {
        USER_TAG | FP_TAG => return Err(LineError::BareTag(tag.trim_end().to_string())),
        _ => {}
    }

    if let Some(rest) = tag.strip_prefix(USER_PREFIX) {
        parse_user(rest).map(DeviceRecord::User)
    } else if let Some(rest) = tag.strip_prefix(FP_PREFIX) {
        parse_fingerprint(rest).map(DeviceRecord::Fingerprint)
    } else {
        parse_attendance(line).map(DeviceRecord::Attendance)
    }
}

/// Splits `KEY=value` chunks separated by tabs. Later keys overwrite earlier ones.
fn parse_pairs(text: &str) -> Result<HashMap<&str, &str>, LineError> {
    let mut pairs = HashMap::new();

    for chunk in text.split('\t') {
        if chunk.trim().is_empty() {
            continue;
        }
        let (key, value) = chunk
            .split_once('=')
            .ok_or_else(|| LineError::MalformedPair(chunk.to_string()))?;
        pairs.insert(key.trim(), value.trim());
    }

    Ok(pairs)
}

fn required<'a>(pairs: &HashMap<&str, &'a str>, key: &'static str) -> Result<&'a str, LineError> {
    match pairs.get(key) {
        Some(&value) if !value.is_empty() => Ok(value),
        _ => Err(LineError::MissingField(key)),
    }
}

fn optional(pairs: &HashMap<&str, &str>, key: &str) -> String {
    pairs.get(key).map(|v| v.to_string()).unwrap_or_default()
}

pub fn parse_user(text: &str) -> Result<UserRecord, LineError> {
    let pairs = parse_pairs(text)?;

    let privilege = match pairs.get("Pri") {
        Some(value) if !value.is_empty() => parse_int("Pri", value)?,
        _ => 0,
    };

    Ok(UserRecord {
        pin: required(&pairs, "PIN")?.to_string(),
        name: optional(&pairs, "Name"),
        privilege,
        password: optional(&pairs, "Passwd"),
        card: optional(&pairs, "Card"),
        group: optional(&pairs, "Grp"),
        timezone: optional(&pairs, "TZ"),
        expires: optional(&pairs, "Expires"),
        start_datetime: optional(&pairs, "StartDatetime"),
        end_datetime: optional(&pairs, "EndDatetime"),
        valid_count: optional(&pairs, "ValidCount"),
    })
}

pub fn parse_fingerprint(text: &str) -> Result<FingerprintRecord, LineError> {
    let pairs = parse_pairs(text)?;

    let pin = required(&pairs, "PIN")?.to_string();
    let template_id = parse_int("FID", required(&pairs, "FID")?)?;

    Ok(FingerprintRecord {
        pin,
        template_id,
        size: pairs.get("Size").and_then(|v| v.parse().ok()),
        valid: pairs.get("Valid").and_then(|v| v.parse().ok()),
        template: optional(&pairs, "TMP"),
    })
}

pub fn parse_attendance(text: &str) -> Result<AttendanceRecord, LineError> {
    let fields: Vec<&str> = text.split('\t').collect();
    if fields.len() < ATTENDANCE_MIN_FIELDS {
        return Err(LineError::TooFewFields {
            expected: ATTENDANCE_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let status = PunchStatus::from_code(parse_int("status", fields[2])?);
    let verify_mode = VerifyMode::from_code(parse_int("verify_mode", fields[3])?);
    let work_code = parse_int("work_code", fields[4])?;

    let slot = |index: usize, default: &str| {
        fields
            .get(index)
            .map_or_else(|| default.to_string(), |v| v.to_string())
    };

    Ok(AttendanceRecord {
        user_pin: fields[0].to_string(),
        timestamp: fields[1].to_string(),
        status,
        verify_mode,
        work_code,
        // the device expects "" for the first two slots and "0" for the last two
        reserved: [slot(5, ""), slot(6, ""), slot(7, "0"), slot(8, "0")],
    })
}

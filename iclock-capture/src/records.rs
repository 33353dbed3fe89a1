use std::fmt::{Display, Formatter};

use serde::Serialize;

/// A single record decoded from a device push payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceRecord {
    User(UserRecord),
    Fingerprint(FingerprintRecord),
    Attendance(AttendanceRecord),
    LegacyAttendance(LegacyRecord),
}

impl DeviceRecord {
    /// Short label used for metrics and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceRecord::User(_) => "user",
            DeviceRecord::Fingerprint(_) => "fingerprint",
            DeviceRecord::Attendance(_) => "attendance",
            DeviceRecord::LegacyAttendance(_) => "legacy_attendance",
        }
    }
}

/// One-line human readable summary, used by the print sink.
impl Display for DeviceRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRecord::User(user) => write!(
                f,
                "User {} ({}) privilege {}",
                user.pin, user.name, user.privilege
            ),
            DeviceRecord::Fingerprint(fp) => {
                write!(f, "Fingerprint {} for user {}", fp.template_id, fp.pin)
            }
            DeviceRecord::Attendance(punch) => write!(
                f,
                "User {} - {} at {} via {}",
                punch.user_pin, punch.status, punch.timestamp, punch.verify_mode
            ),
            DeviceRecord::LegacyAttendance(record) => write!(
                f,
                "Record {}: User {} - {} at {} via {}",
                record.record_num,
                record.user_id,
                record.status,
                record.timestamp,
                record.verify_mode
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub pin: String,
    pub name: String,
    pub privilege: i64,
    pub password: String,
    pub card: String,
    pub group: String,
    pub timezone: String,
    pub expires: String,
    pub start_datetime: String,
    pub end_datetime: String,
    pub valid_count: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FingerprintRecord {
    pub pin: String,
    pub template_id: i64,
    // None when the device sent something that is not a number
    pub size: Option<i64>,
    pub valid: Option<i64>,
    pub template: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub user_pin: String,
    pub timestamp: String,
    pub status: PunchStatus,
    pub verify_mode: VerifyMode,
    pub work_code: i64,
    pub reserved: [String; 4],
}

/// Punch decoded from the older `RECORD=` grammar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LegacyRecord {
    pub record_num: String,
    pub user_id: String,
    pub timestamp: String,
    pub status: PunchStatus,
    pub verify_mode: VerifyMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PunchStatus {
    CheckIn,
    CheckOut,
}

impl PunchStatus {
    /// The device only defines `0` as a check-in, everything else is a check-out.
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            PunchStatus::CheckIn
        } else {
            PunchStatus::CheckOut
        }
    }
}

impl Display for PunchStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PunchStatus::CheckIn => write!(f, "Check-In"),
            PunchStatus::CheckOut => write!(f, "Check-Out"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum VerifyMode {
    Fingerprint,
    FaceRecognition,
    Card,
    Password,
    FingerprintTemplate,
    FaceTemplate,
    Unknown(i64),
    // legacy payloads carry the code as free text
    Unrecognized(String),
}

impl VerifyMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => VerifyMode::Fingerprint,
            2 => VerifyMode::FaceRecognition,
            3 => VerifyMode::Card,
            4 => VerifyMode::Password,
            15 => VerifyMode::FingerprintTemplate,
            25 => VerifyMode::FaceTemplate,
            other => VerifyMode::Unknown(other),
        }
    }

    /// Looks up a code sent as text. Anything that is not an integer is kept verbatim.
    pub fn from_text(code: &str) -> Self {
        match code.trim().parse::<i64>() {
            Ok(code) => VerifyMode::from_code(code),
            Err(_) => VerifyMode::Unrecognized(code.to_string()),
        }
    }
}

impl Display for VerifyMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyMode::Fingerprint => write!(f, "Fingerprint"),
            VerifyMode::FaceRecognition => write!(f, "Face Recognition"),
            VerifyMode::Card => write!(f, "Card"),
            VerifyMode::Password => write!(f, "Password"),
            VerifyMode::FingerprintTemplate => write!(f, "Fingerprint Template"),
            VerifyMode::FaceTemplate => write!(f, "Face Template"),
            VerifyMode::Unknown(code) => write!(f, "Unknown ({code})"),
            VerifyMode::Unrecognized(code) => write!(f, "Unknown ({code})"),
        }
    }
}

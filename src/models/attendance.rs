use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
}

/// Attendance event type as the API serializes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    CheckIn,
    CheckOut,
}

impl RecordType {
    /// API path segment for the mutation endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            RecordType::CheckIn => "/attendance/check-in",
            RecordType::CheckOut => "/attendance/check-out",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RecordType::CheckIn => "check-in",
            RecordType::CheckOut => "check-out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub employee: Employee,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Timestamp formatted for display (local wall-clock style, UTC).
    pub fn timestamp_display(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Response body of `POST /token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

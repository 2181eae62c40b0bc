//! REST and realtime payload shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
            HealthStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Point-in-time vehicle health returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub cpu: f64,
    pub temp: f64,
    pub disk: f64,
    pub memory: f64,
    pub battery: f64,
    pub sat_fix: f64,
    pub fps: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub status: HealthStatus,
    pub timestamp: String,
}

/// Periodic telemetry snapshot pushed as the `indicators` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIndicators {
    pub cpu: f64,
    pub temp: f64,
    pub disk: f64,
    pub mem: f64,
    pub battery: f64,
    pub sat: f64,
    pub fps: f64,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    Idle,
    Running,
    Completed,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MissionState::Idle => "IDLE",
            MissionState::Running => "RUNNING",
            MissionState::Completed => "COMPLETED",
            MissionState::Aborted => "ABORTED",
            MissionState::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

// Realtime `mission_status` pushes may carry only `{status, id}`, so every
// timestamp is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub status: MissionState,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Completed,
    Aborted,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlightStatus::Completed => "COMPLETED",
            FlightStatus::Aborted => "ABORTED",
            FlightStatus::Failed => "FAILED",
            FlightStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub date: String,
    pub duration: f64,
    pub status: FlightStatus,
}

/// Recording state pushed as the `record_status` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub recording: bool,
    pub duration: f64,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Payload of the `record_done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDone {
    pub path: String,
    pub duration: f64,
    pub size: u64,
}

/// Synthetic payload of the client-side `connection` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionChange {
    pub connected: bool,
}

/// A setting value as the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Interprets operator input: booleans first, then numbers, then text.
    pub fn parse(input: &str) -> Self {
        match input {
            "true" => return SettingValue::Bool(true),
            "false" => return SettingValue::Bool(false),
            _ => {}
        }
        match input.parse::<f64>() {
            Ok(number) if number.is_finite() => SettingValue::Number(number),
            _ => SettingValue::Text(input.to_string()),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(value) => write!(f, "{}", value),
            SettingValue::Number(value) => write!(f, "{}", value),
            SettingValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    String,
    Number,
    Boolean,
    Select,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: SettingValue,
    #[serde(rename = "type")]
    pub kind: SettingKind,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingUpdate {
    pub value: SettingValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    Admin,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub upload_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub status: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Optional paging for `GET /flights`; absent fields are not sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlightQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order: Option<SortOrder>,
}

impl FlightQuery {
    /// Query pairs in wire order: `limit`, `offset`, `order`.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(order) = self.order {
            pairs.push(("order", order.as_str().to_string()));
        }
        pairs
    }
}

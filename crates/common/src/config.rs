//! Service configuration types.

use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the service-account credential JSON file.
    #[serde(default)]
    pub credentials_path: String,

    /// Raw service-account credential JSON (takes precedence over the path).
    #[serde(default)]
    pub credentials_json: String,

    /// Spreadsheet document ids.
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Remote call budget.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Cache TTLs per data class (seconds).
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry/backoff parameters.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Document ids for the two logical spreadsheets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Document holding one tab per course plus the contacts tab.
    #[serde(default)]
    pub courses_spreadsheet_id: String,

    /// Document holding the historical ledger and per-course write tabs.
    #[serde(default)]
    pub attendance_spreadsheet_id: String,

    /// Contacts tab name within the courses document.
    #[serde(default = "default_contacts_tab")]
    pub contacts_tab: String,

    /// Historical flat-ledger tab name within the attendance document.
    #[serde(default = "default_history_tab")]
    pub history_tab: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max remote calls per rolling 60-second window.
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Course metadata/roster TTL — rarely changes.
    #[serde(default = "default_course_ttl")]
    pub course_ttl_secs: u64,

    /// Attendance ledger TTL — changes during active sessions.
    #[serde(default = "default_ledger_ttl")]
    pub ledger_ttl_secs: u64,

    /// Contact directory TTL — nearly static.
    #[serde(default = "default_contacts_ttl")]
    pub contacts_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_contacts_tab() -> String {
    "MAILS".into()
}

fn default_history_tab() -> String {
    "ASISTENCIA_HISTORICA".into()
}

fn default_calls_per_minute() -> u32 {
    45
}

fn default_course_ttl() -> u64 {
    1800
}
fn default_ledger_ttl() -> u64 {
    900
}
fn default_contacts_ttl() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1500
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            course_ttl_secs: default_course_ttl(),
            ledger_ttl_secs: default_ledger_ttl(),
            contacts_ttl_secs: default_contacts_ttl(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: String::new(),
            credentials_json: String::new(),
            sheets: SheetsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

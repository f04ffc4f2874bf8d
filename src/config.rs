//! Configuration loader — merges env vars, .env file, and config.toml.

use std::path::Path;

use common::config::AppConfig;
use common::Error;

fn parse_positive_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    let parsed = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_non_negative_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_backoff_factor(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 1")))?;
    if parsed < 1.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 1")));
    }
    Ok(parsed)
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.sheets.courses_spreadsheet_id.trim().is_empty() {
        issues.push("sheets.courses_spreadsheet_id is required".into());
    }
    if config.sheets.attendance_spreadsheet_id.trim().is_empty() {
        issues.push("sheets.attendance_spreadsheet_id is required".into());
    }
    if config.sheets.contacts_tab.trim().is_empty() {
        issues.push("sheets.contacts_tab must not be empty".into());
    }
    if config.sheets.history_tab.trim().is_empty() {
        issues.push("sheets.history_tab must not be empty".into());
    }

    if config.rate_limit.calls_per_minute == 0 {
        issues.push("rate_limit.calls_per_minute must be > 0".into());
    }

    if config.cache.course_ttl_secs == 0 {
        issues.push("cache.course_ttl_secs must be > 0".into());
    }
    if config.cache.ledger_ttl_secs == 0 {
        issues.push("cache.ledger_ttl_secs must be > 0".into());
    }
    if config.cache.contacts_ttl_secs == 0 {
        issues.push("cache.contacts_ttl_secs must be > 0".into());
    }

    if config.retry.initial_delay_ms == 0 {
        issues.push("retry.initial_delay_ms must be > 0".into());
    }
    if config.retry.backoff_factor < 1.0 {
        issues.push("retry.backoff_factor must be >= 1".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load service configuration from environment and optional config file.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(path) = std::env::var("SHEETS_CREDENTIALS_PATH") {
        config.credentials_path = path;
    }
    if let Ok(raw) = std::env::var("SHEETS_CREDENTIALS_JSON") {
        config.credentials_json = raw;
    }
    if let Ok(id) = std::env::var("COURSES_SPREADSHEET_ID") {
        config.sheets.courses_spreadsheet_id = id;
    }
    if let Ok(id) = std::env::var("ATTENDANCE_SPREADSHEET_ID") {
        config.sheets.attendance_spreadsheet_id = id;
    }
    if let Ok(raw) = std::env::var("SHEETS_CALLS_PER_MINUTE") {
        config.rate_limit.calls_per_minute =
            parse_positive_u32(&raw, "SHEETS_CALLS_PER_MINUTE")?;
    }
    if let Ok(raw) = std::env::var("CACHE_COURSE_TTL_SECS") {
        config.cache.course_ttl_secs = parse_positive_u64(&raw, "CACHE_COURSE_TTL_SECS")?;
    }
    if let Ok(raw) = std::env::var("CACHE_LEDGER_TTL_SECS") {
        config.cache.ledger_ttl_secs = parse_positive_u64(&raw, "CACHE_LEDGER_TTL_SECS")?;
    }
    if let Ok(raw) = std::env::var("CACHE_CONTACTS_TTL_SECS") {
        config.cache.contacts_ttl_secs = parse_positive_u64(&raw, "CACHE_CONTACTS_TTL_SECS")?;
    }
    if let Ok(raw) = std::env::var("RETRY_MAX_RETRIES") {
        config.retry.max_retries = parse_non_negative_u32(&raw, "RETRY_MAX_RETRIES")?;
    }
    if let Ok(raw) = std::env::var("RETRY_INITIAL_DELAY_MS") {
        config.retry.initial_delay_ms = parse_positive_u64(&raw, "RETRY_INITIAL_DELAY_MS")?;
    }
    if let Ok(raw) = std::env::var("RETRY_BACKOFF_FACTOR") {
        config.retry.backoff_factor = parse_backoff_factor(&raw, "RETRY_BACKOFF_FACTOR")?;
    }

    // 5. Validate required fields.
    if config.credentials_path.trim().is_empty() && config.credentials_json.trim().is_empty() {
        return Err(Error::Config(
            "Service-account credentials are required (set SHEETS_CREDENTIALS_PATH or SHEETS_CREDENTIALS_JSON)".into(),
        ));
    }

    validate_config(&config)?;

    Ok(config)
}

/// Resolve the raw credential JSON blob, inline value winning over the path.
pub fn load_credentials(config: &AppConfig) -> Result<String, Error> {
    if !config.credentials_json.trim().is_empty() {
        return Ok(config.credentials_json.clone());
    }

    std::fs::read_to_string(&config.credentials_path).map_err(|e| {
        Error::Config(format!(
            "Failed to read credentials file {}: {}",
            config.credentials_path, e
        ))
    })
}

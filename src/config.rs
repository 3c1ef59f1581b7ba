use std::time::Duration;
use serde::Deserialize;

use crate::persistence::store::{KEY_ATTRIBUTE, MAX_ITEMS_PER_TRANSACTION};
use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// The persistence core only consumes configuration; values are supplied by
// the process through environment variables or built in code.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings for one unit of work and its session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnitOfWorkConfig {
    /// Items allowed in one atomic store transaction / one batch chunk
    pub max_batch_size: usize,
    /// Page size used by full scans
    pub scan_page_size: usize,
    /// Attribute the canonical key is stored under
    pub key_name: String,
    pub store_retry: RetryConfig,
    /// Guard updates with the version the aggregate was loaded at
    pub check_version_on_update: bool,
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_ITEMS_PER_TRANSACTION,
            scan_page_size: MAX_ITEMS_PER_TRANSACTION,
            key_name: KEY_ATTRIBUTE.to_string(),
            store_retry: RetryConfig::store_default(),
            check_version_on_update: false,
        }
    }
}

/// Settings for the event bus publisher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub event_bus_name: String,
    pub retry: RetryConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            event_bus_name: "TO-FILL".to_string(),
            retry: RetryConfig::fibonacci(3, Duration::from_secs(3)),
        }
    }
}

/// Everything the process hands to the persistence core
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub company_table_name: String,
    pub employee_table_name: String,
    pub unit_of_work: UnitOfWorkConfig,
    pub publisher: PublisherConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            company_table_name: "companies".to_string(),
            employee_table_name: "employees".to_string(),
            unit_of_work: UnitOfWorkConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

impl AppSettings {
    /// Read settings from the process environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(table) = lookup("AGGREGATE_COMPANY_TABLE_NAME") {
            settings.company_table_name = table;
        }
        if let Some(table) = lookup("AGGREGATE_EMPLOYEE_TABLE_NAME") {
            settings.employee_table_name = table;
        }
        if let Some(bus) = lookup("EVENT_BRIDGE_TOPIC_ARN") {
            settings.publisher.event_bus_name = bus;
        }
        if let Some(tries) = lookup("BACKOFF_DEFAULT_TRIES") {
            settings.publisher.retry.max_attempts = parse("BACKOFF_DEFAULT_TRIES", tries)?;
        }
        if let Some(seconds) = lookup("BACKOFF_DEFAULT_MAX_TIME") {
            let seconds: u64 = parse("BACKOFF_DEFAULT_MAX_TIME", seconds)?;
            settings.publisher.retry.max_elapsed = Some(Duration::from_secs(seconds));
        }
        if let Some(flag) = lookup("CHECK_VERSION_ON_UPDATE") {
            settings.unit_of_work.check_version_on_update = parse("CHECK_VERSION_ON_UPDATE", flag)?;
        }

        Ok(settings)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = AppSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.unit_of_work.max_batch_size, 100);
        assert_eq!(settings.unit_of_work.key_name, "id._key");
        assert_eq!(settings.publisher.retry.max_attempts, 3);
        assert_eq!(settings.publisher.retry.max_elapsed, Some(Duration::from_secs(3)));
        assert!(!settings.unit_of_work.check_version_on_update);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = AppSettings::from_lookup(lookup(&[
            ("AGGREGATE_COMPANY_TABLE_NAME", "prod-companies"),
            ("EVENT_BRIDGE_TOPIC_ARN", "arn:bus"),
            ("BACKOFF_DEFAULT_TRIES", "5"),
            ("BACKOFF_DEFAULT_MAX_TIME", "10"),
            ("CHECK_VERSION_ON_UPDATE", "true"),
        ]))
        .unwrap();

        assert_eq!(settings.company_table_name, "prod-companies");
        assert_eq!(settings.publisher.event_bus_name, "arn:bus");
        assert_eq!(settings.publisher.retry.max_attempts, 5);
        assert_eq!(settings.publisher.retry.max_elapsed, Some(Duration::from_secs(10)));
        assert!(settings.unit_of_work.check_version_on_update);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let error = AppSettings::from_lookup(lookup(&[("BACKOFF_DEFAULT_TRIES", "many")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { name: "BACKOFF_DEFAULT_TRIES", .. }));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: UnitOfWorkConfig =
            serde_json::from_str(r#"{ "max_batch_size": 25, "check_version_on_update": true }"#).unwrap();
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.scan_page_size, 100);
        assert!(config.check_version_on_update);
    }
}

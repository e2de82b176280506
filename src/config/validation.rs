use crate::config::types::{
    ApiConfig, CacheConfig, Config, CrawlerConfig, StorageConfig, WorkerConfig,
    MAX_INTERVAL_HOURS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_cache_config(&config.cache)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_worker_config(&config.worker)?;
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if config.web_host.is_empty() || config.web_host.contains('/') {
        return Err(ConfigError::Validation(format!(
            "web-host must be a bare host name, got '{}'",
            config.web_host
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Rejects intervals longer than [`MAX_INTERVAL_HOURS`]
fn check_interval(name: &str, value: u64, hours_per_unit: u64) -> Result<(), ConfigError> {
    if value.saturating_mul(hours_per_unit) > MAX_INTERVAL_HOURS {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {}, got {}",
            name,
            MAX_INTERVAL_HOURS / hours_per_unit,
            value
        )));
    }
    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    check_interval("validity-hours", config.validity_hours, 1)?;
    check_interval("retention-hours", config.retention_hours, 1)?;

    if config.validity_hours == 0 {
        return Err(ConfigError::Validation(
            "validity-hours must be >= 1".to_string(),
        ));
    }

    if config.retention_hours <= config.validity_hours {
        return Err(ConfigError::Validation(format!(
            "retention-hours ({}) must be longer than validity-hours ({})",
            config.retention_hours, config.validity_hours
        )));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let ext = config.extension.trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "extension must be a non-empty alphanumeric suffix, got '{}'",
            config.extension
        )));
    }

    if let Some(repo) = &config.excluded_repo {
        let mut parts = repo.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(ConfigError::Validation(format!(
                "excluded-repo must look like 'owner/name', got '{}'",
                repo
            )));
        }
    }

    check_interval("active-rescan-hours", config.active_rescan_hours, 1)?;
    check_interval("idle-rescan-days", config.idle_rescan_days, 24)?;
    check_interval("missing-rescan-days", config.missing_rescan_days, 24)?;

    if config.per_page < 1 || config.per_page > 100 {
        return Err(ConfigError::Validation(format!(
            "per-page must be between 1 and 100, got {}",
            config.per_page
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.corpus_path.is_empty() {
        return Err(ConfigError::Validation(
            "corpus-path cannot be empty".to_string(),
        ));
    }

    if config.cache_path.is_empty() {
        return Err(ConfigError::Validation(
            "cache-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "interval-secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

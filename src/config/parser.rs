use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Environment variable holding the API token
pub const TOKEN_ENV: &str = "GITHUB_API_TOKEN";

/// Environment variable holding the minimum rate-limit sleep (seconds)
pub const RATE_LIMIT_SLEEP_ENV: &str = "RATE_LIMIT_SLEEP";

const CORPUS_DB_ENV: &str = "TRAWL_CORPUS_DB";
const CACHE_DB_ENV: &str = "TRAWL_CACHE_DB";

/// Loads the configuration
///
/// # Arguments
///
/// * `path` - Optional path to a TOML configuration file. Without one, the
///   built-in defaults are used.
///
/// # Returns
///
/// * `Ok(Config)` - Configuration with environment overrides applied and validated
/// * `Err(ConfigError)` - Failed to read, parse, or validate the configuration
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            parse_config(&content)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Parses TOML configuration text without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies environment overrides on top of a loaded configuration
///
/// `lookup` resolves a variable name to its value, which keeps this testable
/// without touching the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        config.api.token = Some(token.trim().to_string());
    }

    if let Some(value) = lookup(RATE_LIMIT_SLEEP_ENV) {
        config.api.min_rate_limit_sleep_secs =
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: RATE_LIMIT_SLEEP_ENV.to_string(),
                    value: value.clone(),
                })?;
    }

    if let Some(path) = lookup(CORPUS_DB_ENV) {
        config.storage.corpus_path = path;
    }

    if let Some(path) = lookup(CACHE_DB_ENV) {
        config.storage.cache_path = path;
    }

    Ok(())
}

use crate::config::types::{Config, CrawlerConfig, OutputConfig, PortalConfig, SeedConfig};
use crate::ConfigError;
use url::Url;

/// Largest number of ids a single user-id sweep may cover
const MAX_USER_ID_SPAN: u64 = 1_000_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_portal_config(&config.portal)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_seed_config(&config.seeds)?;
    Ok(())
}

/// Validates portal location and credential
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.root_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid root-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "root-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.credential_header.trim().is_empty() {
        return Err(ConfigError::Validation(
            "credential-header cannot be empty".to_string(),
        ));
    }

    if config.resolved_credential().is_none() {
        return Err(ConfigError::Validation(format!(
            "no credential configured: set portal.credential or {}",
            crate::config::types::CREDENTIAL_ENV_VAR
        )));
    }

    Ok(())
}

/// Validates worker and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-base-ms ({}) cannot exceed backoff-max-ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if let Some(index_path) = &config.index_path {
        if index_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "index-path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates seed sources
fn validate_seed_config(config: &SeedConfig) -> Result<(), ConfigError> {
    match (config.user_id_min, config.user_id_max) {
        (Some(min), Some(max)) if min > max => {
            return Err(ConfigError::Validation(format!(
                "user-id-min ({}) cannot exceed user-id-max ({})",
                min, max
            )));
        }
        (Some(min), Some(max)) if max - min >= MAX_USER_ID_SPAN => {
            return Err(ConfigError::Validation(format!(
                "user-id range {}..={} covers more than {} ids",
                min, max, MAX_USER_ID_SPAN
            )));
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(ConfigError::Validation(
                "user-id-min and user-id-max must be set together".to_string(),
            ));
        }
        _ => {}
    }

    if !config.catalog && !config.has_user_seeds() {
        return Err(ConfigError::Validation(
            "no seeds: enable seeds.catalog or configure a user-id sweep".to_string(),
        ));
    }

    Ok(())
}

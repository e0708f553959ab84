use crate::config::types::{
    Config, CrawlerConfig, FetcherConfig, GovernorConfig, OutputConfig, ShutdownConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_shutdown_config(&config.shutdown)?;
    validate_governor_config(&config.governor)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 1000 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 1000, got {}",
            config.workers
        )));
    }

    if config.global_rate < 1 {
        return Err(ConfigError::Validation(format!(
            "global_rate must be >= 1, got {}",
            config.global_rate
        )));
    }

    if config.rate_window_ms < 1 {
        return Err(ConfigError::Validation(
            "rate_window_ms must be >= 1".to_string(),
        ));
    }

    if config.dispatch_poll_ms < 1 {
        return Err(ConfigError::Validation(
            "dispatch_poll_ms must be >= 1".to_string(),
        ));
    }

    if config.links_per_document < 1 {
        return Err(ConfigError::Validation(
            "links_per_document must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_every must be >= 1".to_string(),
        ));
    }

    if config.max_domains == Some(0) {
        return Err(ConfigError::Validation(
            "max_domains must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP transport limits
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_body_bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    if config.max_connections < 1 || config.max_connections_per_host < 1 {
        return Err(ConfigError::Validation(
            "max_connections and max_connections_per_host must be >= 1".to_string(),
        ));
    }

    if config.max_connections_per_host > config.max_connections {
        return Err(ConfigError::Validation(format!(
            "max_connections_per_host ({}) cannot exceed max_connections ({})",
            config.max_connections_per_host, config.max_connections
        )));
    }

    if config.retry_budget > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_budget must be <= 10, got {}",
            config.retry_budget
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates shutdown timing
fn validate_shutdown_config(config: &ShutdownConfig) -> Result<(), ConfigError> {
    if config.deadline_secs < 1 {
        return Err(ConfigError::Validation(
            "deadline_secs must be >= 1".to_string(),
        ));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates resource ceilings
fn validate_governor_config(config: &GovernorConfig) -> Result<(), ConfigError> {
    if config.memory_ceiling_mb < 1 {
        return Err(ConfigError::Validation(
            "memory_ceiling_mb must be >= 1".to_string(),
        ));
    }

    if config.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "cache_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.seeds_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "seeds_path cannot be empty".to_string(),
        ));
    }

    if config.error_log_cap < 1 {
        return Err(ConfigError::Validation(
            "error_log_cap must be >= 1".to_string(),
        ));
    }

    if config.report_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "report_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

use crate::config::types::{Config, HttpConfig, RetryConfig, SchedulerConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_retry_config(&config.retry)?;
    validate_http_config(&config.http)?;
    Ok(())
}

/// Validates dispatch settings
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 1024 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 1024, got {}",
            config.max_concurrency
        )));
    }

    if config.tick == 0 || config.tick > 10_000 {
        return Err(ConfigError::Validation(format!(
            "tick must be between 1ms and 10000ms, got {}ms",
            config.tick
        )));
    }

    Ok(())
}

/// Validates work item defaults
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP fetcher settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for status in &config.retry_statuses {
        if !(400..600).contains(status) {
            return Err(ConfigError::Validation(format!(
                "retry_statuses may only contain 4xx/5xx codes, got {}",
                status
            )));
        }
    }

    Ok(())
}

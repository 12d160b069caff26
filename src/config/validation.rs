use crate::config::types::{
    CircuitBreakerConfig, Config, PoolConfig, ProxyConfig, StorageConfig, SyncConfig,
};
use crate::state::MAX_COOLDOWN_SECS;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pool_config(&config.pool)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_proxy_config(&config.proxy)?;
    validate_storage_config(&config.storage)?;
    validate_sync_config(&config.sync)?;
    Ok(())
}

fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.min_health > 100 {
        return Err(ConfigError::Validation(format!(
            "min-health must be between 0 and 100, got {}",
            config.min_health
        )));
    }

    if config.base_cooldown_secs < 1 || config.base_cooldown_secs > MAX_COOLDOWN_SECS as u64 {
        return Err(ConfigError::Validation(format!(
            "base-cooldown-secs must be between 1 and {}, got {}",
            MAX_COOLDOWN_SECS, config.base_cooldown_secs
        )));
    }

    if config.max_backoff_multiplier < 1 || config.max_backoff_multiplier > 1024 {
        return Err(ConfigError::Validation(format!(
            "max-backoff-multiplier must be between 1 and 1024, got {}",
            config.max_backoff_multiplier
        )));
    }

    if config.max_daily_requests < 1 {
        return Err(ConfigError::Validation(
            "max-daily-requests must be >= 1".to_string(),
        ));
    }

    if config.health_check_concurrency < 1 {
        return Err(ConfigError::Validation(
            "health-check-concurrency must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.window_secs < 1 {
        return Err(ConfigError::Validation(
            "circuit-breaker window-secs must be >= 1".to_string(),
        ));
    }

    if config.threshold < 1 {
        return Err(ConfigError::Validation(
            "circuit-breaker threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.max_ip_failures < 1 {
        return Err(ConfigError::Validation(
            "max-ip-failures must be >= 1".to_string(),
        ));
    }

    if config.acquire_retries < 1 {
        return Err(ConfigError::Validation(
            "acquire-retries must be >= 1".to_string(),
        ));
    }

    if config.lease_secs <= config.expiry_buffer_secs {
        return Err(ConfigError::Validation(format!(
            "lease-secs ({}) must exceed expiry-buffer-secs ({})",
            config.lease_secs, config.expiry_buffer_secs
        )));
    }

    let echo = Url::parse(&config.echo_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid echo-url: {}", e)))?;
    if echo.scheme() != "http" && echo.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "echo-url must use http or https, got '{}'",
            echo.scheme()
        )));
    }

    for endpoint in &config.endpoints {
        if endpoint.ip.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy endpoint ip cannot be empty".to_string(),
            ));
        }
        if endpoint.port == 0 {
            return Err(ConfigError::Validation(format!(
                "proxy endpoint {} has port 0",
                endpoint.ip
            )));
        }
        if endpoint.user.is_some() != endpoint.password.is_some() {
            return Err(ConfigError::Validation(format!(
                "proxy endpoint {}:{} must set both user and password or neither",
                endpoint.ip, endpoint.port
            )));
        }
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.interval_secs < 1 || config.interval_secs > 3600 {
        return Err(ConfigError::Validation(format!(
            "sync interval-secs must be between 1 and 3600, got {}",
            config.interval_secs
        )));
    }

    if config.full_reload_every < 1 {
        return Err(ConfigError::Validation(
            "full-reload-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

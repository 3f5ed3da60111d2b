//! Configuration validation.

use crate::balancer::strategy::registered_strategies;
use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - A registered balancing strategy name
/// - At least one backend, and at least one enabled backend
/// - Non-empty, unique backend ids
/// - Positive rate and burst when rate limiting is enabled
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if !registered_strategies()
        .iter()
        .any(|method| *method == config.load_balancer.method)
    {
        errors.push(format!(
            "unsupported balancing method: {}. Supported methods: {}",
            config.load_balancer.method,
            registered_strategies().join(", ")
        ));
    }

    if config.backends.is_empty() {
        errors.push("no backends configured".to_string());
    }

    let mut ids = HashSet::new();
    let mut enabled = 0;

    for (i, backend) in config.backends.iter().enumerate() {
        if backend.id.is_empty() {
            errors.push(format!("backend #{} has empty id", i));
        }

        if !ids.insert(backend.id.as_str()) {
            errors.push(format!("duplicate backend id: {}", backend.id));
        }

        if backend.enabled {
            enabled += 1;
        }
    }

    if !config.backends.is_empty() && enabled == 0 {
        errors.push("no enabled backends configured".to_string());
    }

    if config.rate_limit.enabled {
        if config.rate_limit.default_rate <= 0.0 {
            errors.push(format!(
                "rate limit default rate must be positive, got {}",
                config.rate_limit.default_rate
            ));
        }
        if config.rate_limit.default_burst == 0 {
            errors.push(format!(
                "rate limit default burst must be positive, got {}",
                config.rate_limit.default_burst
            ));
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.logging.level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

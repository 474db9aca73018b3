//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes and limits > 0)
//! - Check the log filter parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HarnessConfig → Result<(), Vec<ValidationError>>

use tracing_subscriber::EnvFilter;

use crate::config::schema::HarnessConfig;

/// A single semantic problem in a `HarnessConfig`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.pipe_buffer_size must be greater than zero")]
    ZeroPipeBuffer,
    #[error("envelope.max_content_length must be greater than zero")]
    ZeroContentLength,
    #[error("envelope.max_content_length {0} does not fit in memory on this platform")]
    ContentLengthTooLarge(u64),
    #[error("observability.log_level {level:?} is not a valid filter: {reason}")]
    InvalidLogLevel { level: String, reason: String },
}

/// Check a configuration, reporting every problem found.
pub fn validate_config(config: &HarnessConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.pipe_buffer_size == 0 {
        errors.push(ValidationError::ZeroPipeBuffer);
    }

    let max = config.envelope.max_content_length;
    if max == 0 {
        errors.push(ValidationError::ZeroContentLength);
    } else if usize::try_from(max).is_err() {
        errors.push(ValidationError::ContentLengthTooLarge(max));
    }

    if let Err(e) = EnvFilter::try_new(&config.observability.log_level) {
        errors.push(ValidationError::InvalidLogLevel {
            level: config.observability.log_level.clone(),
            reason: e.to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&HarnessConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = HarnessConfig::default();
        config.listener.pipe_buffer_size = 0;
        config.envelope.max_content_length = 0;
        config.observability.log_level = "telemetry_harness=loudest".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], ValidationError::ZeroPipeBuffer);
        assert_eq!(errors[1], ValidationError::ZeroContentLength);
        assert!(matches!(errors[2], ValidationError::InvalidLogLevel { .. }));
    }
}

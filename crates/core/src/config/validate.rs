use super::{types::Config, ConfigError, ServiceEndpoint};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0 and uploads are allowed to have a size
/// - Every service has a URL and a non-zero timeout
/// - Retry policy performs at least one attempt
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_upload_mb == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_mb cannot be 0".to_string(),
        ));
    }

    validate_endpoint("services.asr", &config.services.asr)?;
    validate_endpoint("services.tts", &config.services.tts)?;
    validate_endpoint("services.lipsync", &config.services.lipsync.endpoint())?;

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_endpoint(name: &str, endpoint: &ServiceEndpoint) -> Result<(), ConfigError> {
    if endpoint.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{}.url cannot be empty",
            name
        )));
    }
    if endpoint.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{}.timeout_secs cannot be 0",
            name
        )));
    }
    Ok(())
}

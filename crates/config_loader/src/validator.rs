//! Blueprint validation
//!
//! Handler names must be present and unique, every effective engine config
//! must be usable, and each handler type gets its required params checked.

use std::collections::HashSet;

use contracts::{ContractError, EngineConfig, HandlerConfig, HandlerType, ListenerBlueprint};

/// Validate a parsed blueprint, stopping at the first violation
pub fn validate(blueprint: &ListenerBlueprint) -> Result<(), ContractError> {
    validate_handler_names(blueprint)?;
    validate_engine_config("engine", &blueprint.engine)?;
    for (idx, (handler, config)) in blueprint.engine_configs().enumerate() {
        validate_engine_config(&format!("handlers[{}].engine", idx), &config)?;
        validate_handler_params(handler)?;
    }
    Ok(())
}

fn validate_handler_names(blueprint: &ListenerBlueprint) -> Result<(), ContractError> {
    if blueprint.handlers.is_empty() {
        return Err(ContractError::config_validation(
            "handlers",
            "at least one handler must be configured",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, handler) in blueprint.handlers.iter().enumerate() {
        if handler.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("handlers[{}].name", idx),
                "handler name cannot be empty",
            ));
        }
        if !seen.insert(&handler.name) {
            return Err(ContractError::config_validation(
                format!("handlers[name={}]", handler.name),
                "duplicate handler name",
            ));
        }
    }
    Ok(())
}

fn validate_engine_config(field: &str, config: &EngineConfig) -> Result<(), ContractError> {
    if config.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            format!("{field}.queue_capacity"),
            "queue_capacity must be >= 1",
        ));
    }
    if config.retry_max == 0 {
        return Err(ContractError::config_validation(
            format!("{field}.retry_max"),
            "retry_max must be >= 1 (it counts the initial attempt)",
        ));
    }
    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ContractError::config_validation(
            format!("{field}.backoff_factor"),
            format!("backoff_factor must be >= 1.0, got {}", config.backoff_factor),
        ));
    }
    if config.retry_delay_ms > config.max_retry_delay_ms {
        return Err(ContractError::config_validation(
            format!("{field}.retry_delay_ms"),
            format!(
                "retry_delay_ms ({}) must be <= max_retry_delay_ms ({})",
                config.retry_delay_ms, config.max_retry_delay_ms
            ),
        ));
    }
    Ok(())
}

/// Required params per handler type
fn validate_handler_params(handler: &HandlerConfig) -> Result<(), ContractError> {
    match handler.handler_type {
        HandlerType::Log => Ok(()),
        HandlerType::Command => {
            if handler.param("command").is_none() {
                return Err(ContractError::handler_param(
                    &handler.name,
                    "command",
                    "command handlers require a non-empty 'command'",
                ));
            }
            Ok(())
        }
        HandlerType::Http | HandlerType::Notify => validate_endpoint(handler),
    }
}

/// `url` must be http(s); `timeout_ms` must be a number when present
fn validate_endpoint(handler: &HandlerConfig) -> Result<(), ContractError> {
    let url = handler.param("url").ok_or_else(|| {
        ContractError::handler_param(
            &handler.name,
            "url",
            format!("{} handlers require 'url'", handler.handler_type.as_str()),
        )
    })?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ContractError::handler_param(
            &handler.name,
            "url",
            format!("'{url}' is not an http(s) URL"),
        ));
    }
    if let Some(timeout) = handler.param("timeout_ms") {
        timeout.parse::<u64>().map_err(|e| {
            ContractError::handler_param(&handler.name, "timeout_ms", e.to_string())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConfigVersion, EngineOverrides};
    use std::collections::HashMap;

    fn handler(name: &str, handler_type: HandlerType, params: &[(&str, &str)]) -> HandlerConfig {
        HandlerConfig {
            name: name.to_string(),
            handler_type,
            engine: EngineOverrides::default(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn blueprint(handlers: Vec<HandlerConfig>) -> ListenerBlueprint {
        ListenerBlueprint {
            version: ConfigVersion::V1,
            engine: EngineConfig::default(),
            handlers,
        }
    }

    #[test]
    fn test_valid_blueprint() {
        let bp = blueprint(vec![
            handler("console", HandlerType::Log, &[]),
            handler("shutdown", HandlerType::Command, &[("command", "true")]),
            handler(
                "uploader",
                HandlerType::Http,
                &[("url", "http://localhost:8080/events"), ("timeout_ms", "500")],
            ),
        ]);
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_no_handlers() {
        let err = validate(&blueprint(vec![])).unwrap_err();
        assert!(err.to_string().contains("at least one handler"));
    }

    #[test]
    fn test_duplicate_handler_name() {
        let bp = blueprint(vec![
            handler("console", HandlerType::Log, &[]),
            handler("console", HandlerType::Log, &[]),
        ]);
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut bp = blueprint(vec![handler("console", HandlerType::Log, &[])]);
        bp.engine.queue_capacity = 0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_zero_retry_max_in_override() {
        let mut console = handler("console", HandlerType::Log, &[]);
        console.engine.retry_max = Some(0);
        let err = validate(&blueprint(vec![console])).unwrap_err();
        assert!(err.to_string().contains("handlers[0].engine.retry_max"));
    }

    #[test]
    fn test_backoff_factor_below_one() {
        let mut bp = blueprint(vec![handler("console", HandlerType::Log, &[])]);
        bp.engine.backoff_factor = 0.5;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_command_handler_requires_command() {
        let bp = blueprint(vec![handler("shutdown", HandlerType::Command, &[])]);
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::HandlerParam { ref param, .. } if param == "command"));
    }

    #[test]
    fn test_http_handler_rejects_bad_url() {
        let bp = blueprint(vec![handler(
            "uploader",
            HandlerType::Http,
            &[("url", "ftp://example.com")],
        )]);
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("not an http(s) URL"));
    }

    #[test]
    fn test_notify_handler_requires_url() {
        let bp = blueprint(vec![handler(
            "announcer",
            HandlerType::Notify,
            &[("value_label", "Battery Voltage")],
        )]);
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("notify handlers require 'url'"));
    }

    #[test]
    fn test_http_handler_rejects_bad_timeout() {
        let bp = blueprint(vec![handler(
            "uploader",
            HandlerType::Http,
            &[("url", "http://localhost/"), ("timeout_ms", "soon")],
        )]);
        assert!(validate(&bp).is_err());
    }
}

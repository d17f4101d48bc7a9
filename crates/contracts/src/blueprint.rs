//! ListenerBlueprint - Config Loader output
//!
//! Describes the full listener setup: engine defaults and the registered handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{EngineConfig, EngineOverrides};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Engine settings shared by every handler
    #[serde(default)]
    pub engine: EngineConfig,

    /// Registered handlers, one dispatch engine each
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// One downstream consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler name (unique)
    pub name: String,

    /// Handler type
    pub handler_type: HandlerType,

    /// Per-handler engine overrides
    #[serde(default)]
    pub engine: EngineOverrides,

    /// Type-specific parameters, passed through to the handler untouched
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Handler type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    /// Log a payload summary
    Log,
    /// Run a local command per payload
    Command,
    /// Upload the measurement batch over HTTP
    Http,
    /// Post a message rendered from a template to a webhook
    Notify,
}

impl HandlerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Command => "command",
            Self::Http => "http",
            Self::Notify => "notify",
        }
    }
}

impl HandlerConfig {
    /// Effective engine settings for this handler
    pub fn engine_config(&self, defaults: &EngineConfig) -> EngineConfig {
        defaults.merged(&self.engine)
    }

    /// Non-empty parameter value, if set
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

impl ListenerBlueprint {
    /// Effective engine settings for every handler, in declaration order
    pub fn engine_configs(&self) -> impl Iterator<Item = (&HandlerConfig, EngineConfig)> {
        self.handlers
            .iter()
            .map(|handler| (handler, handler.engine_config(&self.engine)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backpressure;

    fn sample_handler(name: &str, handler_type: HandlerType) -> HandlerConfig {
        HandlerConfig {
            name: name.to_string(),
            handler_type,
            engine: EngineOverrides::default(),
            params: HashMap::new(),
        }
    }

    #[test]
    fn engine_configs_apply_overrides() {
        let mut uploader = sample_handler("uploader", HandlerType::Http);
        uploader.engine.retry_max = Some(5);
        uploader.engine.backpressure = Some(Backpressure::Reject);

        let blueprint = ListenerBlueprint {
            version: ConfigVersion::V1,
            engine: EngineConfig::default(),
            handlers: vec![sample_handler("console", HandlerType::Log), uploader],
        };

        let configs: Vec<_> = blueprint.engine_configs().collect();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].1, EngineConfig::default());
        assert_eq!(configs[1].1.retry_max, 5);
        assert_eq!(configs[1].1.backpressure, Backpressure::Reject);
        assert_eq!(configs[1].1.queue_capacity, 5);
    }

    #[test]
    fn blank_params_are_treated_as_missing() {
        let mut handler = sample_handler("shutdown", HandlerType::Command);
        handler.params.insert("command".into(), "   ".into());
        assert_eq!(handler.param("command"), None);

        handler
            .params
            .insert("command".into(), "./set_event.sh shutdown".into());
        assert_eq!(handler.param("command"), Some("./set_event.sh shutdown"));
    }
}

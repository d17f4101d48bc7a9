//! # Config Loader
//!
//! Reads a listener configuration (TOML or JSON), resolves `${VAR}`
//! references in handler params from the environment, and validates the
//! result into a `ListenerBlueprint`.
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("listener.toml")).unwrap();
//! println!("Handlers: {}", blueprint.handlers.len());
//! ```

mod validator;

pub use contracts::ListenerBlueprint;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format for a file extension, case-insensitive
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<ListenerBlueprint, ContractError> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("TOML parse error: {e}"),
                source: Some(Box::new(e)),
            }),
            Self::Json => serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("JSON parse error: {e}"),
                source: Some(Box::new(e)),
            }),
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a listener configuration, picking the format from the file extension.
    ///
    /// # Errors
    /// Unreadable file, unknown extension, parse failure, unset `${VAR}`
    /// reference, or a failed validation rule.
    pub fn load_from_path(path: &Path) -> Result<ListenerBlueprint, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;
        let format = ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })?;

        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), ?format, "Loading listener config");
        Self::load_from_str(&content, format)
    }

    /// Load from an in-memory document, resolving `${VAR}` from the process environment
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ListenerBlueprint, ContractError> {
        Self::load_with_env(content, format, |name| std::env::var(name).ok())
    }

    /// Load with an explicit variable lookup
    pub fn load_with_env<F>(
        content: &str,
        format: ConfigFormat,
        lookup: F,
    ) -> Result<ListenerBlueprint, ContractError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut blueprint = format.parse(content)?;
        resolve_params(&mut blueprint, &lookup)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

/// Replace `${VAR}` references in every handler param.
///
/// Credentials stay out of the config file this way.
fn resolve_params<F>(blueprint: &mut ListenerBlueprint, lookup: &F) -> Result<(), ContractError>
where
    F: Fn(&str) -> Option<String>,
{
    for handler in &mut blueprint.handlers {
        for (key, value) in handler.params.iter_mut() {
            if !value.contains("${") {
                continue;
            }
            *value = expand(value, lookup)
                .map_err(|message| ContractError::handler_param(&handler.name, key, message))?;
        }
    }
    Ok(())
}

fn expand<F>(raw: &str, lookup: &F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated variable reference in '{raw}'"))?;
        let name = after[..end].trim();
        if name.is_empty() {
            return Err("empty variable reference".to_string());
        }
        let value = lookup(name).ok_or_else(|| format!("environment variable {name} is not set"))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Backpressure, HandlerType};
    use std::collections::HashMap;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[engine]
queue_capacity = 5
retry_max = 3
retry_delay_ms = 1000

[[handlers]]
name = "console"
handler_type = "log"

[[handlers]]
name = "low_battery"
handler_type = "command"
[handlers.params]
command = "./set_event.sh shutdown"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_from_str_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.handlers.len(), 2);
        assert_eq!(bp.handlers[1].name, "low_battery");
        assert_eq!(bp.handlers[1].param("command"), Some("./set_event.sh shutdown"));
    }

    #[test]
    fn test_engine_table_defaults_and_overrides() {
        let content = r#"
[engine]
queue_capacity = 10
backpressure = "reject"

[[handlers]]
name = "uploader"
handler_type = "http"
[handlers.engine]
retry_max = 5
[handlers.params]
url = "https://telemetry.example.com/events"
"#;
        let bp = ConfigLoader::load_with_env(content, ConfigFormat::Toml, no_env).unwrap();
        assert_eq!(bp.engine.queue_capacity, 10);
        assert_eq!(bp.engine.retry_max, 3);
        assert_eq!(bp.engine.backpressure, Backpressure::Reject);
        assert_eq!(bp.handlers[0].engine.retry_max, Some(5));
        assert_eq!(bp.handlers[0].handler_type, HandlerType::Http);
    }

    #[test]
    fn test_load_json() {
        let content = r#"{
            "engine": { "queue_capacity": 3 },
            "handlers": [
                { "name": "shutdown", "handler_type": "command",
                  "params": { "command": "./set_event.sh shutdown" } }
            ]
        }"#;
        let bp = ConfigLoader::load_with_env(content, ConfigFormat::Json, no_env).unwrap();
        assert_eq!(bp.engine.queue_capacity, 3);
    }

    #[test]
    fn test_syntax_error_and_unknown_handler_type() {
        let err = ConfigLoader::load_from_str("invalid toml [[[", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));

        let content = r#"
[[handlers]]
name = "bot"
handler_type = "carrier_pigeon"
"#;
        assert!(matches!(
            ConfigLoader::load_from_str(content, ConfigFormat::Toml),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[handlers]]
name = "low_battery"
handler_type = "command"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_params_resolve_env_references() {
        let content = r#"
[[handlers]]
name = "uploader"
handler_type = "http"
[handlers.params]
url = "https://${TELEMETRY_HOST}/events"
auth_token = "${TELEMETRY_TOKEN}"
collection = "offgrid"
"#;
        let env = HashMap::from([
            ("TELEMETRY_HOST", "telemetry.example.com"),
            ("TELEMETRY_TOKEN", "s3cret"),
        ]);
        let bp = ConfigLoader::load_with_env(content, ConfigFormat::Toml, |name| {
            env.get(name).map(|v| v.to_string())
        })
        .unwrap();

        let handler = &bp.handlers[0];
        assert_eq!(handler.param("url"), Some("https://telemetry.example.com/events"));
        assert_eq!(handler.param("auth_token"), Some("s3cret"));
        assert_eq!(handler.param("collection"), Some("offgrid"));
    }

    #[test]
    fn test_unset_env_reference_names_handler_and_param() {
        let content = r#"
[[handlers]]
name = "uploader"
handler_type = "http"
[handlers.params]
url = "https://example.com/events"
auth_token = "${MISSING_TOKEN}"
"#;
        let err = ConfigLoader::load_with_env(content, ConfigFormat::Toml, no_env).unwrap_err();
        assert!(matches!(
            err,
            ContractError::HandlerParam { ref handler, ref param, .. }
                if handler == "uploader" && param == "auth_token"
        ));
        assert!(err.to_string().contains("MISSING_TOKEN"));
    }

    #[test]
    fn test_expand_rejects_malformed_references() {
        assert!(expand("${OPEN", &no_env).is_err());
        assert!(expand("${}", &no_env).is_err());
        assert_eq!(expand("plain $HOME", &no_env).unwrap(), "plain $HOME");
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let bp = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(bp.handlers.len(), 2);
    }

    #[test]
    fn test_load_from_path_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}

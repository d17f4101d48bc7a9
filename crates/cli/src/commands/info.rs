//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{EngineConfig, ListenerBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Params never printed in clear text
const SECRET_PARAMS: &[&str] = &["auth_token"];

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    engine: EngineConfig,
    handlers: Vec<HandlerInfo>,
}

#[derive(Serialize)]
struct HandlerInfo {
    name: String,
    handler_type: String,
    /// Effective settings after per-handler overrides
    engine: EngineConfig,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &ListenerBlueprint, args: &InfoArgs) -> ConfigInfo {
    let handlers = blueprint
        .handlers
        .iter()
        .map(|h| HandlerInfo {
            name: h.name.clone(),
            handler_type: h.handler_type.as_str().to_string(),
            engine: h.engine_config(&blueprint.engine),
            params: if args.params {
                h.params
                    .iter()
                    .map(|(k, v)| {
                        let shown = if SECRET_PARAMS.contains(&k.as_str()) {
                            "***".to_string()
                        } else {
                            v.clone()
                        };
                        (k.clone(), shown)
                    })
                    .collect()
            } else {
                BTreeMap::new()
            },
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        engine: blueprint.engine.clone(),
        handlers,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Event Listener Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Engine Defaults");
    println!("   ├─ Version: {}", info.version);
    print_engine(&info.engine, "   ");

    println!("\n📤 Handlers ({})", info.handlers.len());
    for (i, handler) in info.handlers.iter().enumerate() {
        let is_last = i == info.handlers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "      " } else { "   │  " };

        println!("   {} {} ({})", prefix, handler.name, handler.handler_type);
        for (key, value) in &handler.params {
            println!("{}├─ {} = {}", child_prefix, key, value);
        }
        print_engine(&handler.engine, child_prefix);
    }

    println!();
}

fn print_engine(engine: &EngineConfig, indent: &str) {
    println!("{}├─ Queue capacity: {}", indent, engine.queue_capacity);
    println!("{}├─ Backpressure: {:?}", indent, engine.backpressure);
    println!(
        "{}└─ Retries: {} attempts, {}ms delay (x{}, max {}ms)",
        indent,
        engine.retry_max,
        engine.retry_delay_ms,
        engine.backoff_factor,
        engine.max_retry_delay_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};
    use std::path::PathBuf;

    #[test]
    fn test_effective_engine_and_masked_token() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[engine]
queue_capacity = 8

[[handlers]]
name = "uploader"
handler_type = "http"
[handlers.engine]
retry_max = 5
[handlers.params]
url = "https://telemetry.example.com/events"
auth_token = "secret"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let args = InfoArgs {
            config: PathBuf::from("listener.toml"),
            json: true,
            params: true,
        };

        let info = build_config_info(&blueprint, &args);
        let handler = &info.handlers[0];
        assert_eq!(handler.engine.queue_capacity, 8);
        assert_eq!(handler.engine.retry_max, 5);
        assert_eq!(handler.params["auth_token"], "***");
        assert_eq!(handler.params["url"], "https://telemetry.example.com/events");
    }
}

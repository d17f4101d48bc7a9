//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{HandlerType, ListenerBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    handler_count: usize,
    queue_capacity: usize,
    retry_max: u32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    handler_count: blueprint.handlers.len(),
                    queue_capacity: blueprint.engine.queue_capacity,
                    retry_max: blueprint.engine.retry_max,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ListenerBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for handler in &blueprint.handlers {
        let effective = handler.engine_config(&blueprint.engine);

        if effective.retry_max == 1 {
            warnings.push(format!(
                "Handler '{}' has retry_max = 1 - failed payloads are dropped without retry",
                handler.name
            ));
        }

        if handler.handler_type == HandlerType::Http && handler.param("auth_token").is_none() {
            warnings.push(format!(
                "Handler '{}' uploads without an auth_token",
                handler.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Handlers: {}", summary.handler_count);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Retry max: {}", summary.retry_max);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for(
            r#"
[[handlers]]
name = "uploader"
handler_type = "http"
[handlers.engine]
retry_max = 1
[handlers.params]
url = "http://localhost:8086/write"
"#,
        );

        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.warnings.map(|w| w.len()), Some(2));
        assert_eq!(result.summary.map(|s| s.handler_count), Some(1));
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let (_file, args) = args_for("[engine]\nqueue_capacity = 3\n");

        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}

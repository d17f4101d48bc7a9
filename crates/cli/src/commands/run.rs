//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    // Load and parse configuration
    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        handlers = blueprint.handlers.len(),
        queue_capacity = blueprint.engine.queue_capacity,
        retry_max = blueprint.engine.retry_max,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        input: args.input.clone(),
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        buffer_size: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting dispatch...");

    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        payloads = stats.payloads_read,
        malformed = stats.malformed_lines,
        dropped = stats.total_exhausted(),
        duration_secs = stats.duration.as_secs_f64(),
        "Dispatch completed"
    );
    stats.print_summary();

    info!("Event listener finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::ListenerBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Engine defaults:");
    println!("  Queue capacity: {}", blueprint.engine.queue_capacity);
    println!("  Backpressure: {:?}", blueprint.engine.backpressure);
    println!("  Retry max: {}", blueprint.engine.retry_max);
    println!("  Retry delay: {}ms", blueprint.engine.retry_delay_ms);

    println!("\nHandlers ({}):", blueprint.handlers.len());
    for handler in &blueprint.handlers {
        let effective = handler.engine_config(&blueprint.engine);
        println!(
            "  - {} ({}) - queue {}, {} attempts",
            handler.name,
            handler.handler_type.as_str(),
            effective.queue_capacity,
            effective.retry_max
        );
    }

    println!();
}

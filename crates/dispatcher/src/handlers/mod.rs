//! Reference processing steps
//!
//! Contains LogStep, CommandStep, HttpStep and NotifyStep, plus the factory that turns a
//! `HandlerConfig` into a ready (not yet started) `DispatchEngine`.

mod command;
mod http;
mod log;
mod notify;

pub use self::command::CommandStep;
pub use self::http::{HttpStep, HttpStepConfig};
pub use self::log::LogStep;
pub use self::notify::{MessageTemplate, NotifyStep, NotifyStepConfig};

use contracts::{EngineConfig, HandlerConfig, HandlerType};
use tracing::instrument;

use crate::engine::DispatchEngine;
use crate::error::DispatchError;

/// Build the engine for one configured handler
#[instrument(
    name = "dispatcher_create_engine",
    skip(config, defaults),
    fields(handler = %config.name, handler_type = config.handler_type.as_str())
)]
pub fn create_engine(
    config: &HandlerConfig,
    defaults: &EngineConfig,
) -> Result<DispatchEngine, DispatchError> {
    let engine_config = config.engine_config(defaults);
    match config.handler_type {
        HandlerType::Log => DispatchEngine::new(LogStep::new(&config.name), engine_config),
        HandlerType::Command => {
            let step = CommandStep::from_params(&config.name, &config.params)?;
            DispatchEngine::new(step, engine_config)
        }
        HandlerType::Http => {
            let step = HttpStep::from_params(&config.name, &config.params)?;
            DispatchEngine::new(step, engine_config)
        }
        HandlerType::Notify => {
            let step = NotifyStep::from_params(&config.name, &config.params)?;
            DispatchEngine::new(step, engine_config)
        }
    }
}

//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Model
//! - `EventPayload` is produced by a monitoring loop and never mutated afterwards
//! - `ProcessingStep` is the only thing a downstream consumer has to implement

mod blueprint;
mod engine_config;
mod error;
mod payload;
mod step;

pub use blueprint::*;
pub use engine_config::*;
pub use error::*;
pub use payload::*;
pub use step::{LocalProcessingStep, ProcessingStep};

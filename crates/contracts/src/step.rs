//! ProcessingStep trait - dispatcher output interface
//!
//! One implementation per downstream consumer kind.

use crate::{EventPayload, ProcessError};

/// Consumer-specific delivery of one payload.
///
/// Owned exclusively by a single dispatch worker, so implementations need no
/// internal synchronization. `process` may be called several times with the
/// same payload when earlier attempts fail; the implementation is responsible
/// for rebuilding any broken client before it returns a failure or on the next
/// call.
#[trait_variant::make(ProcessingStep: Send)]
pub trait LocalProcessingStep {
    /// Step name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one payload
    ///
    /// # Errors
    /// Returns a classified failure; the engine decides whether to retry.
    async fn process(&mut self, payload: &EventPayload) -> Result<(), ProcessError>;

    /// Release external resources once the worker is done
    async fn close(&mut self) -> Result<(), ProcessError>;
}

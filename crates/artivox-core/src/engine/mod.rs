//! Vocal-tract engine contract
//!
//! The synthesis algorithm itself is an external collaborator; the core
//! only relies on this call contract: push a parameter vector, advance one
//! control step, collect the appended samples. The engine instance is owned
//! exclusively by the audio processor and is only handed over on the
//! control thread, before the real-time callback starts running.

use thiserror::Error;

use crate::config::ProgramConfig;
use crate::types::Sample;

mod sine;

pub use sine::SineEngine;

/// Errors surfaced by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Parameter index outside the engine's parameter list.
    #[error("invalid parameter index {index} (engine has {count} parameters)")]
    InvalidParameter { index: usize, count: usize },

    /// The engine configuration blob could not be used.
    #[error("invalid engine configuration: {0}")]
    Configuration(String),
}

/// Call contract of the articulatory synthesis engine.
///
/// `Send` because the constructed engine moves onto the audio thread (or
/// the offline synthesis worker); it is never shared between threads.
pub trait VocalTractEngine: Send {
    /// The engine-owned output buffer. `exec_synthesis_step` appends to it;
    /// the caller drains it and may clear consumed samples.
    fn output_buffer(&mut self) -> &mut Vec<Sample>;

    /// Set one parameter of the current control vector.
    fn set_parameter(&mut self, index: usize, value: f32) -> Result<(), EngineError>;

    /// Advance the model by one control step, appending the produced
    /// samples to the output buffer. Must not allocate once warmed up.
    fn exec_synthesis_step(&mut self);

    /// Sample rate of the produced samples in Hz.
    fn internal_sample_rate(&self) -> f32;
}

/// Control-thread-only constructor for engine instances.
///
/// The session invokes the factory during `start()`, after the output rate
/// has been written into the configuration; the result is handed to the
/// processor before the callback is activated.
pub type EngineFactory =
    Box<dyn Fn(&ProgramConfig) -> Result<Box<dyn VocalTractEngine>, EngineError> + Send>;

//! Audio session error types

use thiserror::Error;

use crate::engine::EngineError;

/// Errors that can occur while starting or running the audio session.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Failed to open a client connection to the JACK server
    #[error("failed to create JACK client: {0}")]
    ClientCreate(String),

    /// Failed to register the output port
    #[error("failed to register output port: {0}")]
    PortRegister(String),

    /// Failed to activate the client
    #[error("failed to activate JACK client: {0}")]
    ClientActivate(String),

    /// No physical playback ports to connect to: an environment problem,
    /// not recoverable by retrying
    #[error("no physical playback ports")]
    NoPhysicalPlaybackPorts,

    /// The engine factory refused the current configuration
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The ring-buffer ends loaned to the audio thread were lost by an
    /// earlier failed teardown; the session cannot be restarted
    #[error("audio processor state was lost during a failed shutdown")]
    ProcessorStateLost,

    /// A running session could not be stopped before restarting
    #[error("could not stop the running session")]
    StopFailed,
}

/// Result type for audio session operations.
pub type AudioResult<T> = Result<T, AudioError>;

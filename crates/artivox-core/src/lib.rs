//! Artivox core: the real-time bridge for an articulatory speech synthesizer
//!
//! The interactive front-end's audio heart: a lock-free, ring-buffer-
//! mediated hand-off between a control thread and the hard-real-time audio
//! callback that keeps a vocal-tract synthesis engine fed with control
//! parameters and produces discontinuity-free audio blocks.
//!
//! - [`ring_buffer`]: byte-oriented SPSC queue crossing the thread boundary
//! - [`processor`]: the per-callback state machine
//! - [`audio`]: JACK session lifecycle around the processor
//! - [`smoothing`]: per-parameter low-pass filtering
//! - [`modification`]: offline "replay with modification" synthesis
//! - [`engine`]: the vocal-tract engine call contract
//! - [`config`]: shared program configuration

pub mod audio;
pub mod config;
pub mod engine;
pub mod modification;
pub mod processor;
pub mod ring_buffer;
pub mod smoothing;
pub mod types;

pub use types::*;

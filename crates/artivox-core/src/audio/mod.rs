//! Real-time audio session
//!
//! Owns the lifecycle of the native JACK client, the two ring buffers, and
//! the audio processor, following a lock-free design:
//!
//! ```text
//! ┌──────────────────┐                      ┌─────────────────────┐
//! │  Control Thread  │──write_record()─────►│  Parameter Ring     │
//! │  (GUI / driver)  │                      │  (lock-free SPSC)   │
//! └──────────────────┘                      └──────────┬──────────┘
//!                                                      │ drained per period
//!                                                      ▼
//! ┌──────────────────┐                      ┌─────────────────────┐
//! │  Analysis Ring   │◄──mirrored samples───│  JACK RT Thread     │
//! │  (lock-free SPSC)│                      │  (owns Processor)   │
//! └────────┬─────────┘                      └─────────────────────┘
//!          │ drained at leisure
//!          ▼
//!   analysis / visualization consumer
//! ```
//!
//! The two rings are the only shared mutable state; each has exactly one
//! writer and one reader, fixed for its lifetime. The JACK backend is the
//! only backend; the whole design is the JACK ring-buffer/callback
//! pattern.

mod error;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod session;

pub use error::{AudioError, AudioResult};

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use session::{Session, SessionState};

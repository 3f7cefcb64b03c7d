//! Common types for the interactive synthesis core
//!
//! The fundamental value objects that cross the control/audio thread
//! boundary, plus the ring-buffer sizing constants shared by the session
//! and its consumers.

/// Audio sample type (32-bit float, the JACK default audio sample).
pub type Sample = f32;

/// Number of parameter records the control→audio ring buffer can hold.
///
/// Parameter updates are tiny and drained every period that does engine
/// work, so a small queue is enough; a full queue only drops updates that
/// would have been superseded within a couple of milliseconds anyway.
pub const PARAMETER_RINGBUFFER_SIZE: usize = 32;

/// Number of samples the audio→analysis ring buffer can hold.
///
/// Sized for roughly 1.5 s at 44.1 kHz so a slow analysis consumer does not
/// immediately lose data. When it still fills up, samples are dropped;
/// analysis is diagnostic and never allowed to affect audio timing.
pub const MAX_NUM_SAMPLES_FOR_ANALYSIS: usize = 65536;

/// One named-parameter update, moved from the control thread to the audio
/// thread through the parameter ring buffer.
///
/// Uses `#[repr(C)]` so the record has a stable 8-byte layout with no
/// padding; `bytemuck::Pod` lets it cross the byte-oriented ring buffer
/// without any serialization step. Produced by the control thread, consumed
/// exactly once by the audio thread, copied by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParameterValue {
    /// Index into the dynamic parameter list. Out-of-range indices are
    /// ignored by the consumer (a stale index after a configuration change
    /// must not corrupt state).
    pub index: u32,
    /// New raw value; smoothing happens on the audio thread.
    pub value: f32,
}

impl ParameterValue {
    /// Create a new parameter update record.
    #[inline]
    pub fn new(index: u32, value: f32) -> Self {
        Self { index, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_value_layout() {
        // The record crosses a byte-oriented ring buffer; its size is part
        // of the wire contract between the two threads.
        assert_eq!(std::mem::size_of::<ParameterValue>(), 8);
        assert_eq!(std::mem::align_of::<ParameterValue>(), 4);
    }
}

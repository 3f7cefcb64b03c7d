//! Real-time audio processor
//!
//! The per-callback state machine that keeps the vocal-tract engine fed
//! with control parameters and produces exactly the requested number of
//! samples per period. Runs on the audio thread; the only state it shares
//! with the rest of the program are the two ring buffers.
//!
//! Per period, in order:
//! 1. Serve the request from samples the engine already synthesized. If
//!    that covers it, return: no engine work this period.
//! 2. Drain all pending parameter updates from the parameter ring buffer.
//! 3. Drive the engine (smoothed parameters in, one synthesis step at a
//!    time) until the remainder of the request is covered, then copy it.
//!
//! Every sample copied out is also mirrored into the analysis ring buffer,
//! best-effort: a full analysis buffer drops samples, never audio time.

use thiserror::Error;

use crate::config::ProgramConfig;
use crate::engine::{EngineError, VocalTractEngine};
use crate::ring_buffer::{Consumer, Producer};
use crate::smoothing::MovingAverageFilter;
use crate::types::{ParameterValue, Sample};

/// A failed period. Never unwinds into native code; the callback adapter
/// converts it to a logged, silent period.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The engine has not been handed over yet. Fatal to this period only.
    #[error("vocal tract engine is not initialized")]
    EngineNotReady,

    /// A synthesis step produced no samples; bailing out beats spinning
    /// forever inside the callback.
    #[error("vocal tract engine produced no samples")]
    EngineStalled,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Callback state machine. State carried between periods lives here
/// explicitly (buffer cursor, running peak, parameter vector, filters);
/// nothing hides in statics.
pub struct Processor {
    engine: Option<Box<dyn VocalTractEngine>>,
    /// Read cursor into the engine's output buffer.
    vtm_buffer_position: usize,
    /// Largest absolute raw sample magnitude seen this session. Only grows.
    max_abs_sample: f32,
    param_values: Vec<f32>,
    param_filters: Vec<MovingAverageFilter>,
    parameter_rx: Consumer,
    analysis_tx: Option<Producer>,
}

impl Processor {
    /// Build the processor for one session run.
    ///
    /// This is the engine hand-over point: it runs on the control thread
    /// before the callback is registered, and the engine is not touched by
    /// anything else afterwards. Parameter state is seeded from the
    /// configured defaults.
    pub fn new(
        engine: Option<Box<dyn VocalTractEngine>>,
        config: &ProgramConfig,
        parameter_rx: Consumer,
        analysis_tx: Option<Producer>,
    ) -> Self {
        let param_values = config.dynamic_params.iter().map(|p| p.default).collect();
        let param_filters = config
            .dynamic_params
            .iter()
            .map(|_| MovingAverageFilter::new(config.control_rate, config.filter_period))
            .collect();
        Self {
            engine,
            vtm_buffer_position: 0,
            max_abs_sample: 0.0,
            param_values,
            param_filters,
            parameter_rx,
            analysis_tx,
        }
    }

    /// Current output gain, derived from the largest peak seen so far.
    ///
    /// The scale only ever tightens as louder peaks are observed; it is
    /// deliberately never loosened again within a session.
    pub fn calc_scale(&self) -> f32 {
        1.0 / self.max_abs_sample.max(1.0)
    }

    /// Produce exactly `out.len()` samples.
    ///
    /// Real-time safe: no allocation, no locks, no blocking, and errors are
    /// returned, never unwound.
    pub fn render(&mut self, out: &mut [Sample]) -> Result<(), RenderError> {
        let engine = self.engine.as_mut().ok_or(RenderError::EngineNotReady)?;
        let nframes = out.len();

        let n = copy_output(
            engine.output_buffer(),
            &mut self.vtm_buffer_position,
            &mut self.max_abs_sample,
            self.analysis_tx.as_mut(),
            out,
        );
        if n == nframes {
            // The request was covered by already-synthesized samples.
            return Ok(());
        }

        // More samples are needed: first apply every pending parameter
        // update. Indices beyond the parameter list are stale data from a
        // configuration change and are skipped.
        while let Some(update) = self.parameter_rx.read_record::<ParameterValue>() {
            if let Some(slot) = self.param_values.get_mut(update.index as usize) {
                *slot = update.value;
            }
        }

        while engine.output_buffer().len().saturating_sub(self.vtm_buffer_position)
            < nframes - n
        {
            for (index, filter) in self.param_filters.iter_mut().enumerate() {
                engine.set_parameter(index, filter.filter(self.param_values[index]))?;
            }
            let before = engine.output_buffer().len();
            engine.exec_synthesis_step();
            if engine.output_buffer().len() <= before {
                return Err(RenderError::EngineStalled);
            }
        }

        let n2 = copy_output(
            engine.output_buffer(),
            &mut self.vtm_buffer_position,
            &mut self.max_abs_sample,
            self.analysis_tx.as_mut(),
            &mut out[n..],
        );
        debug_assert_eq!(n + n2, nframes);
        Ok(())
    }

    /// Give the ring-buffer ends back so they outlive this processor.
    pub(crate) fn into_parts(self) -> (Consumer, Option<Producer>) {
        (self.parameter_rx, self.analysis_tx)
    }

    #[cfg(test)]
    fn parameter_backlog(&self) -> usize {
        self.parameter_rx.read_space() / std::mem::size_of::<ParameterValue>()
    }

    #[cfg(test)]
    fn param_values(&self) -> &[f32] {
        &self.param_values
    }
}

/// Copy buffered engine samples into `out`, scaling by the running-peak
/// gain and mirroring each copied sample into the analysis ring buffer.
/// Returns the number of samples copied. Once the engine buffer is fully
/// consumed it is cleared so the next step appends from the start.
fn copy_output(
    engine_out: &mut Vec<Sample>,
    position: &mut usize,
    max_abs_sample: &mut f32,
    mut analysis_tx: Option<&mut Producer>,
    out: &mut [Sample],
) -> usize {
    let available = engine_out.len().saturating_sub(*position);
    let n = available.min(out.len());
    let mut analysis_open = true;

    for (dst, &raw) in out[..n]
        .iter_mut()
        .zip(engine_out[*position..*position + n].iter())
    {
        let magnitude = raw.abs();
        if magnitude > *max_abs_sample {
            *max_abs_sample = magnitude;
        }
        let sample = raw * (1.0 / max_abs_sample.max(1.0));
        *dst = sample;

        if analysis_open {
            if let Some(tx) = analysis_tx.as_deref_mut() {
                if !tx.write_record(&sample) {
                    // Analysis buffer full: drop the rest of this block.
                    analysis_open = false;
                }
            }
        }
    }

    *position += n;
    if *position >= engine_out.len() && !engine_out.is_empty() {
        engine_out.clear();
        *position = 0;
    }
    n
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::{DynamicParameter, ProgramConfig};
    use crate::ring_buffer::RingBuffer;
    use crate::types::{ParameterValue, PARAMETER_RINGBUFFER_SIZE};

    #[derive(Default)]
    struct Calls {
        set_parameter: Vec<(usize, f32)>,
    }

    struct MockEngine {
        output: Vec<Sample>,
        samples_per_step: usize,
        level: Sample,
        /// Level increase applied after each step (for gain tests).
        ramp: Sample,
        num_parameters: usize,
        steps: Arc<AtomicUsize>,
        calls: Arc<Mutex<Calls>>,
    }

    impl MockEngine {
        fn new(samples_per_step: usize, level: Sample, num_parameters: usize) -> Self {
            Self {
                output: Vec::new(),
                samples_per_step,
                level,
                ramp: 0.0,
                num_parameters,
                steps: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(Mutex::new(Calls::default())),
            }
        }

        fn probes(&self) -> (Arc<AtomicUsize>, Arc<Mutex<Calls>>) {
            (Arc::clone(&self.steps), Arc::clone(&self.calls))
        }
    }

    impl VocalTractEngine for MockEngine {
        fn output_buffer(&mut self) -> &mut Vec<Sample> {
            &mut self.output
        }

        fn set_parameter(&mut self, index: usize, value: f32) -> Result<(), EngineError> {
            if index >= self.num_parameters {
                return Err(EngineError::InvalidParameter {
                    index,
                    count: self.num_parameters,
                });
            }
            self.calls.lock().unwrap().set_parameter.push((index, value));
            Ok(())
        }

        fn exec_synthesis_step(&mut self) {
            self.steps.fetch_add(1, Ordering::SeqCst);
            for _ in 0..self.samples_per_step {
                self.output.push(self.level);
            }
            self.level += self.ramp;
        }

        fn internal_sample_rate(&self) -> f32 {
            44100.0
        }
    }

    fn test_config(count: usize) -> ProgramConfig {
        let mut config = ProgramConfig::default();
        config.dynamic_params = (0..count)
            .map(|i| DynamicParameter {
                name: format!("p{i}"),
                default: 0.0,
            })
            .collect();
        config.control_rate = 250.0;
        // One-entry smoothing window, so filtered values equal raw values
        // and assertions stay exact.
        config.filter_period = 0.004;
        config
    }

    fn parameter_ring() -> (crate::ring_buffer::Producer, Consumer) {
        RingBuffer::with_capacity(
            PARAMETER_RINGBUFFER_SIZE * std::mem::size_of::<ParameterValue>(),
        )
    }

    #[test]
    fn test_missing_engine_fails_the_period() {
        let (_tx, rx) = parameter_ring();
        let mut processor = Processor::new(None, &test_config(1), rx, None);
        let mut out = [7.0f32; 64];
        assert!(matches!(
            processor.render(&mut out),
            Err(RenderError::EngineNotReady)
        ));
        // The output block was not touched.
        assert!(out.iter().all(|&s| s == 7.0));
    }

    #[test]
    fn test_no_engine_work_when_buffered() {
        let mut engine = MockEngine::new(0, 0.5, 1);
        engine.output = vec![0.5; 512];
        let (steps, calls) = engine.probes();

        let (mut tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);
        assert!(tx.write_record(&ParameterValue::new(0, 0.9)));

        let mut out = [0.0f32; 256];
        processor.render(&mut out).unwrap();

        // Fully served from the buffer: no steps, no parameter pushes, and
        // the ring-buffer entry is still unread.
        assert_eq!(steps.load(Ordering::SeqCst), 0);
        assert!(calls.lock().unwrap().set_parameter.is_empty());
        assert_eq!(processor.parameter_backlog(), 1);
    }

    #[test]
    fn test_exact_frame_count_across_periods() {
        let engine = MockEngine::new(100, 0.5, 1);
        let (steps, _) = engine.probes();
        let (_tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);

        let mut out = [f32::NAN; 256];
        processor.render(&mut out).unwrap();
        assert!(out.iter().all(|s| s.is_finite()));
        // 3 steps of 100 samples cover 256; 44 samples stay buffered.
        assert_eq!(steps.load(Ordering::SeqCst), 3);

        let mut out = [f32::NAN; 256];
        processor.render(&mut out).unwrap();
        assert!(out.iter().all(|s| s.is_finite()));
        // The leftover 44 samples were used before stepping again.
        assert_eq!(steps.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_catch_up_scenario_single_parameter() {
        let engine = MockEngine::new(110, 0.25, 1);
        let (steps, calls) = engine.probes();
        let (mut tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);

        for _ in 0..3 {
            assert!(tx.write_record(&ParameterValue::new(0, 0.5)));
        }

        let mut out = [0.0f32; 256];
        processor.render(&mut out).unwrap();

        // All three records drained in one period; one set_parameter per
        // synthesis step, carrying the (identity-filtered) new value.
        assert_eq!(processor.parameter_backlog(), 0);
        assert_eq!(steps.load(Ordering::SeqCst), 3);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.set_parameter.len(), 3);
        assert!(calls.set_parameter.iter().all(|&(i, v)| i == 0 && v == 0.5));
    }

    #[test]
    fn test_stale_parameter_index_is_ignored() {
        let engine = MockEngine::new(64, 0.1, 2);
        let (_, calls) = engine.probes();
        let (mut tx, rx) = parameter_ring();
        let mut config = test_config(2);
        config.dynamic_params[0].default = 0.3;
        config.dynamic_params[1].default = 0.6;
        let mut processor = Processor::new(Some(Box::new(engine)), &config, rx, None);

        assert!(tx.write_record(&ParameterValue::new(2 + 5, 1.0)));

        let mut out = [0.0f32; 64];
        processor.render(&mut out).unwrap();

        assert_eq!(processor.param_values(), &[0.3, 0.6]);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.set_parameter, vec![(0, 0.3), (1, 0.6)]);
    }

    #[test]
    fn test_gain_scale_is_monotonic() {
        // Each step is 0.8 louder than the last, so the running peak grows
        // past 1.0 and the scale must only ever tighten.
        let mut engine = MockEngine::new(128, 0.8, 1);
        engine.ramp = 0.8;
        let (_tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);

        let mut previous = processor.calc_scale();
        assert_eq!(previous, 1.0);
        for _ in 0..4 {
            let mut out = [0.0f32; 128];
            processor.render(&mut out).unwrap();
            let scale = processor.calc_scale();
            assert!(scale <= previous);
            // Scaled output never clips.
            assert!(out.iter().all(|s| s.abs() <= 1.0));
            previous = scale;
        }
        assert!(previous < 1.0);
    }

    #[test]
    fn test_analysis_mirror_drops_when_full() {
        let engine = MockEngine::new(64, 0.5, 1);
        let (_tx, rx) = parameter_ring();
        // Room for only 7 mirrored samples (32-byte arena, one byte open).
        let (analysis_tx, mut analysis_rx) = RingBuffer::with_capacity(32);
        let mut processor = Processor::new(
            Some(Box::new(engine)),
            &test_config(1),
            rx,
            Some(analysis_tx),
        );

        let mut out = [0.0f32; 64];
        processor.render(&mut out).unwrap();

        // Audio is complete even though most of the mirror was dropped.
        assert!(out.iter().all(|&s| s == 0.5));
        let mut drained = [0.0f32; 64];
        let n = analysis_rx.read_records_into(&mut drained);
        assert_eq!(n, 7);
        assert!(drained[..n].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_engine_error_propagates_as_render_error() {
        // Engine advertises fewer parameters than the configuration: the
        // first push fails and the period reports the engine error.
        let engine = MockEngine::new(64, 0.1, 0);
        let (_tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);

        let mut out = [0.0f32; 64];
        assert!(matches!(
            processor.render(&mut out),
            Err(RenderError::Engine(EngineError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_stalled_engine_is_detected() {
        let engine = MockEngine::new(0, 0.0, 1);
        let (_tx, rx) = parameter_ring();
        let mut processor =
            Processor::new(Some(Box::new(engine)), &test_config(1), rx, None);

        let mut out = [0.0f32; 64];
        assert!(matches!(
            processor.render(&mut out),
            Err(RenderError::EngineStalled)
        ));
    }
}

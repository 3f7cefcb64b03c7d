//! Minimal stand-in engine
//!
//! A sine voice that honors the engine call contract: parameter 0 is pitch
//! in semitones around a 220 Hz reference, parameter 1 is linear volume,
//! remaining parameters are accepted and ignored. Used by the interactive
//! binary and the tests; the real articulatory model is an external
//! collaborator behind the same trait.

use crate::config::ProgramConfig;
use crate::types::Sample;

use super::{EngineError, EngineFactory, VocalTractEngine};

const REFERENCE_FREQUENCY: f32 = 220.0;
const FALLBACK_SAMPLE_RATE: f32 = 44100.0;

pub struct SineEngine {
    sample_rate: f32,
    samples_per_step: usize,
    num_parameters: usize,
    frequency: f32,
    volume: f32,
    phase: f32,
    output: Vec<Sample>,
}

impl SineEngine {
    /// Create an engine producing one control period of samples per step.
    pub fn new(sample_rate: f32, control_rate: f32, num_parameters: usize) -> Self {
        let samples_per_step = ((sample_rate / control_rate).round() as usize).max(1);
        Self {
            sample_rate,
            samples_per_step,
            num_parameters,
            frequency: REFERENCE_FREQUENCY,
            volume: 0.0,
            phase: 0.0,
            // Preallocated generously so steps never grow it mid-callback.
            output: Vec::with_capacity(samples_per_step * 64),
        }
    }

    /// Factory wiring the engine to the shared configuration.
    pub fn factory() -> EngineFactory {
        Box::new(|config: &ProgramConfig| {
            let sample_rate = if config.output_rate > 0.0 {
                config.output_rate
            } else {
                FALLBACK_SAMPLE_RATE
            };
            Ok(Box::new(SineEngine::new(
                sample_rate,
                config.control_rate,
                config.num_parameters(),
            )) as Box<dyn VocalTractEngine>)
        })
    }

    /// Samples appended by each synthesis step.
    pub fn samples_per_step(&self) -> usize {
        self.samples_per_step
    }
}

impl VocalTractEngine for SineEngine {
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
        match index {
            0 => self.frequency = REFERENCE_FREQUENCY * (value / 12.0).exp2(),
            1 => self.volume = value.clamp(0.0, 1.0),
            // The stand-in only voices pitch and volume.
            _ => {}
        }
        Ok(())
    }

    fn exec_synthesis_step(&mut self) {
        let step = self.frequency / self.sample_rate;
        for _ in 0..self.samples_per_step {
            self.output
                .push(self.volume * (std::f32::consts::TAU * self.phase).sin());
            self.phase += step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }

    fn internal_sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

//! Offline "replay with modification" synthesis
//!
//! Resynthesizes a precomputed parameter trajectory to a buffer while one
//! parameter is edited live: each control step consumes at most one queued
//! [`Modification`] and applies it to that step's parameter vector. The
//! edits cross a ring buffer with the same single-writer/single-reader
//! discipline as the realtime path, because the engine still steps on a
//! different thread; it just doesn't have a hard deadline there.
//!
//! The caller drives the control side from a fixed-period timer: each tick
//! sends one modification via [`ModificationSynthesis::modify_parameter`],
//! and a `false` return is the signal to stop that timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::engine::VocalTractEngine;
use crate::ring_buffer::{Consumer, Producer, RingBuffer};
use crate::types::Sample;

/// Number of modification records the control→worker ring buffer can hold.
pub const MODIFICATION_RINGBUFFER_SIZE: usize = 8;

/// How a modification combines with the trajectory value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Multiply,
}

impl Operation {
    fn to_wire(self) -> u32 {
        match self {
            Operation::Add => 0,
            Operation::Multiply => 1,
        }
    }

    fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Operation::Add),
            1 => Some(Operation::Multiply),
            _ => None,
        }
    }
}

/// Single pending edit, consumed at most once per control step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modification {
    pub parameter: u32,
    pub operation: Operation,
    pub value: f32,
}

/// Fixed-size wire form of [`Modification`] for the ring buffer. An
/// unknown operation code (a record from a newer writer) is ignored on the
/// consumer side, like a stale parameter index.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ModificationRecord {
    parameter: u32,
    operation: u32,
    value: f32,
}

/// Map a normalized UI gesture offset in [-1, 1] to a modification value.
///
/// Additive edits scale the offset by the chosen amplitude; multiplicative
/// edits turn the offset into a factor around 1.0, floored at zero so a
/// large downward gesture mutes rather than inverts.
pub fn modification_value(operation: Operation, offset: f32, amplitude: f32) -> f32 {
    match operation {
        Operation::Add => offset * amplitude,
        Operation::Multiply => (1.0 + offset).max(0.0),
    }
}

/// Worker-side state machine: applies edits to the trajectory and drives
/// the engine, one control step per call.
pub struct ModificationProcessor {
    num_parameters: usize,
    /// Engine steps per parameter set; the parameter vector is linearly
    /// interpolated across them.
    control_steps: usize,
    rx: Consumer,
    param_list: Vec<Vec<f32>>,
    /// The trajectory as actually synthesized, kept so it can be saved.
    modified_param_list: Vec<Vec<f32>>,
    current: Vec<f32>,
    target: Vec<f32>,
    delta: Vec<f32>,
    engine: Box<dyn VocalTractEngine>,
    pending: Option<Modification>,
    gain: f32,
    param_set_index: usize,
    output: Vec<Sample>,
}

impl ModificationProcessor {
    fn new(
        engine: Box<dyn VocalTractEngine>,
        num_parameters: usize,
        control_steps: usize,
        rx: Consumer,
    ) -> Self {
        Self {
            num_parameters,
            control_steps: control_steps.max(1),
            rx,
            param_list: Vec::new(),
            modified_param_list: Vec::new(),
            current: vec![0.0; num_parameters],
            target: vec![0.0; num_parameters],
            delta: vec![0.0; num_parameters],
            engine,
            pending: None,
            gain: 1.0,
            param_set_index: 0,
            output: Vec::new(),
        }
    }

    /// Install a new trajectory and discard all progress.
    pub fn reset_data(&mut self, param_list: Vec<Vec<f32>>) {
        self.param_list = param_list;
        self.modified_param_list.clear();
        self.output.clear();
        self.pending = None;
        self.param_set_index = 0;
        self.current = self
            .param_list
            .first()
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.num_parameters]);
    }

    /// Whether the installed trajectory is non-empty and well-formed.
    pub fn valid_data(&self) -> bool {
        !self.param_list.is_empty()
            && self
                .param_list
                .iter()
                .all(|set| set.len() == self.num_parameters)
    }

    /// Arm a synthesis run: set the output gain and rewind.
    fn prepare(&mut self, gain: f32) {
        self.gain = gain;
        self.param_set_index = 0;
        self.modified_param_list.clear();
        self.output.clear();
        self.pending = None;
        self.current = self
            .param_list
            .first()
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.num_parameters]);
        self.engine.output_buffer().clear();
    }

    /// Synthesize one control step of the trajectory.
    ///
    /// Consumes at most one queued modification, applies it to this step's
    /// parameter set, interpolates the engine across the step, and appends
    /// the gain-scaled samples to the output buffer. Returns `false` once
    /// the trajectory is exhausted (and nothing was synthesized).
    pub fn process_control_step(&mut self) -> bool {
        if self.param_set_index >= self.param_list.len() {
            return false;
        }

        if let Some(record) = self.rx.read_record::<ModificationRecord>() {
            if let Some(operation) = Operation::from_wire(record.operation) {
                self.pending = Some(Modification {
                    parameter: record.parameter,
                    operation,
                    value: record.value,
                });
            }
        }

        self.target.clone_from(&self.param_list[self.param_set_index]);
        if let Some(modification) = self.pending {
            if let Some(slot) = self.target.get_mut(modification.parameter as usize) {
                match modification.operation {
                    Operation::Add => *slot += modification.value,
                    Operation::Multiply => *slot *= modification.value,
                }
            }
        }
        self.modified_param_list.push(self.target.clone());

        for i in 0..self.num_parameters {
            self.delta[i] = (self.target[i] - self.current[i]) / self.control_steps as f32;
        }
        for _ in 0..self.control_steps {
            for i in 0..self.num_parameters {
                self.current[i] += self.delta[i];
                // An engine with fewer parameters than the trajectory is
                // stale configuration; skip, don't abort the run.
                if self.engine.set_parameter(i, self.current[i]).is_err() {
                    continue;
                }
            }
            self.engine.exec_synthesis_step();
        }

        let gain = self.gain;
        let buffer = self.engine.output_buffer();
        self.output.extend(buffer.iter().map(|s| s * gain));
        buffer.clear();

        self.param_set_index += 1;
        true
    }

    /// The samples rendered so far.
    pub fn output(&self) -> &[Sample] {
        &self.output
    }

    /// The trajectory as synthesized, with all edits applied.
    pub fn modified_parameters(&self) -> &[Vec<f32>] {
        &self.modified_param_list
    }
}

/// Control-side handle: owns the write end of the modification ring and
/// the worker thread that replays the trajectory.
pub struct ModificationSynthesis {
    tx: Producer,
    control_period: Duration,
    running: Arc<AtomicBool>,
    processor: Option<ModificationProcessor>,
    worker: Option<thread::JoinHandle<ModificationProcessor>>,
}

impl ModificationSynthesis {
    /// Build the handle and its processor around an engine instance.
    ///
    /// `control_rate` is the cadence (Hz) at which the worker consumes one
    /// parameter set; `control_steps` is the number of engine steps each
    /// set is interpolated across.
    pub fn new(
        engine: Box<dyn VocalTractEngine>,
        num_parameters: usize,
        control_rate: f32,
        control_steps: usize,
    ) -> Self {
        let (tx, rx) = RingBuffer::with_capacity(
            MODIFICATION_RINGBUFFER_SIZE * std::mem::size_of::<ModificationRecord>(),
        );
        let processor = ModificationProcessor::new(engine, num_parameters, control_steps, rx);
        Self {
            tx,
            control_period: Duration::from_secs_f32(1.0 / control_rate.max(1.0)),
            running: Arc::new(AtomicBool::new(false)),
            processor: Some(processor),
            worker: None,
        }
    }

    /// Install a new trajectory. Refused while a run is in flight.
    pub fn reset_data(&mut self, param_list: Vec<Vec<f32>>) -> bool {
        if self.worker.is_some() {
            return false;
        }
        match self.processor.as_mut() {
            Some(processor) => {
                processor.reset_data(param_list);
                true
            }
            None => false,
        }
    }

    /// Arm synthesis and spawn the worker that replays the trajectory at
    /// the control-step cadence. Returns `false` if already running or no
    /// valid trajectory is installed.
    pub fn start_synthesis(&mut self, gain: f32) -> bool {
        if self.worker.is_some() {
            return false;
        }
        let Some(mut processor) = self.processor.take() else {
            return false;
        };
        if !processor.valid_data() {
            self.processor = Some(processor);
            return false;
        }
        processor.prepare(gain);

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let period = self.control_period;
        self.worker = Some(thread::spawn(move || {
            while processor.process_control_step() {
                thread::sleep(period);
            }
            running.store(false, Ordering::Release);
            processor
        }));
        true
    }

    /// Queue one edit for the worker and report whether there is more data
    /// to process. A `false` return tells the caller to stop its driving
    /// timer.
    pub fn modify_parameter(&mut self, parameter: u32, operation: Operation, value: f32) -> bool {
        let record = ModificationRecord {
            parameter,
            operation: operation.to_wire(),
            value,
        };
        if !self.tx.write_record(&record) {
            log::warn!("[modification] queue full, edit dropped");
        }
        self.running()
    }

    /// Whether the worker is still replaying the trajectory.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Join the finished worker and expose the processor with its rendered
    /// output and modified trajectory.
    pub fn finish(&mut self) -> Option<&ModificationProcessor> {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(processor) => self.processor = Some(processor),
                Err(_) => {
                    log::error!("[modification] worker thread panicked");
                    self.running.store(false, Ordering::Release);
                }
            }
        }
        self.processor.as_ref()
    }
}

//! JACK session lifecycle
//!
//! Creates the client, registers the output port, binds the processor into
//! the process callback, and wires the port to the physical playback ports.
//! Start/stop can be repeated; the two ring buffers are allocated once in
//! the constructor and survive every start/stop cycle; only the native
//! client and the processor are torn down and rebuilt.

use jack::{AudioOut, Client, ClientOptions, Control, Port, ProcessScope};

use crate::config::ProgramConfig;
use crate::engine::EngineFactory;
use crate::processor::Processor;
use crate::ring_buffer::{Consumer, Producer, RingBuffer};
use crate::types::{ParameterValue, Sample, MAX_NUM_SAMPLES_FOR_ANALYSIS, PARAMETER_RINGBUFFER_SIZE};

use super::error::{AudioError, AudioResult};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Started,
}

/// Ring-buffer ends that are loaned to the real-time processor while the
/// session runs and recovered when it stops.
struct RtEnds {
    parameter_rx: Consumer,
    analysis_tx: Producer,
}

/// Owns the native client, both ring buffers, and the processor.
///
/// All methods run on the control thread; the audio thread only ever sees
/// the [`Processor`] inside the registered callback.
pub struct Session {
    state: SessionState,
    config: ProgramConfig,
    engine_factory: EngineFactory,
    /// Control-thread end of the parameter ring.
    parameter_tx: Producer,
    /// Processor-side ring ends, present while stopped.
    rt_ends: Option<RtEnds>,
    /// Analysis-drain end, until a consumer claims it.
    analysis_rx: Option<Consumer>,
    client: Option<jack::AsyncClient<Notifications, RtProcessor>>,
    sample_rate: u32,
}

impl Session {
    /// Allocate both ring buffers and remember how to build the engine.
    ///
    /// Nothing touches the JACK server until [`start`](Self::start).
    pub fn new(config: ProgramConfig, engine_factory: EngineFactory) -> Self {
        let (parameter_tx, parameter_rx) = RingBuffer::with_capacity(
            PARAMETER_RINGBUFFER_SIZE * std::mem::size_of::<ParameterValue>(),
        );
        // +1 because the ring keeps one position open.
        let (analysis_tx, analysis_rx) = RingBuffer::with_capacity(
            MAX_NUM_SAMPLES_FOR_ANALYSIS * std::mem::size_of::<Sample>() + 1,
        );
        Self {
            state: SessionState::Stopped,
            config,
            engine_factory,
            parameter_tx,
            rt_ends: Some(RtEnds {
                parameter_rx,
                analysis_tx,
            }),
            analysis_rx: Some(analysis_rx),
            client: None,
            sample_rate: 0,
        }
    }

    /// Start the connection to the JACK server.
    ///
    /// Starting a started session stops it first. On success the processor
    /// callback is live and the output port is connected to the first two
    /// physical playback ports; an environment without playback ports is a
    /// hard error and leaves the session stopped.
    pub fn start(&mut self) -> AudioResult<()> {
        if self.state == SessionState::Started && !self.stop() {
            return Err(AudioError::StopFailed);
        }

        let (client, _status) = Client::new(&self.config.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| AudioError::ClientCreate(e.to_string()))?;
        // JACK may rename the client if the name is taken.
        let client_name = client.name().to_string();

        let output_port = client
            .register_port("output", AudioOut::default())
            .map_err(|e| AudioError::PortRegister(e.to_string()))?;

        let sample_rate = client.sample_rate() as u32;
        self.sample_rate = sample_rate;
        self.config.set_output_rate(sample_rate as f32);
        log::info!("[audio] output sample rate: {} Hz", sample_rate);

        // Build the engine on this thread, the only legal point at which
        // the engine instance inside the processor may be replaced.
        let engine = (self.engine_factory)(&self.config)?;

        let ends = self.rt_ends.take().ok_or(AudioError::ProcessorStateLost)?;
        let processor = Processor::new(
            Some(engine),
            &self.config,
            ends.parameter_rx,
            Some(ends.analysis_tx),
        );

        let rt = RtProcessor {
            output_port,
            processor,
        };
        let async_client = match client.activate_async(Notifications, rt) {
            Ok(active) => active,
            Err(e) => {
                // The handler (and with it the loaned ring ends) is gone;
                // a later start() reports ProcessorStateLost.
                return Err(AudioError::ClientActivate(e.to_string()));
            }
        };

        // Connect the ports. This can't happen before activation: JACK
        // refuses connections to clients that aren't running. Playback
        // ports are "input" to the driver backend.
        let playback_ports = async_client.as_client().ports(
            None,
            None,
            jack::PortFlags::IS_PHYSICAL | jack::PortFlags::IS_INPUT,
        );
        if playback_ports.is_empty() {
            self.recover(async_client);
            return Err(AudioError::NoPhysicalPlaybackPorts);
        }
        let our_port = format!("{}:output", client_name);
        for playback in playback_ports.iter().take(2) {
            if let Err(e) = async_client
                .as_client()
                .connect_ports_by_name(&our_port, playback)
            {
                log::warn!("[audio] could not connect {} to {}: {}", our_port, playback, e);
            }
        }

        self.client = Some(async_client);
        self.state = SessionState::Started;
        log::info!("[audio] started");
        Ok(())
    }

    /// Stop the connection to the JACK server.
    ///
    /// Idempotent and callable at any time from the control thread; always
    /// leaves the session in the stopped state. Returns `false` if the
    /// client could not be deactivated cleanly.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return true;
        }
        let clean = match self.client.take() {
            Some(client) => self.recover(client),
            None => true,
        };
        self.state = SessionState::Stopped;
        log::info!("[audio] stopped");
        clean
    }

    /// Deactivate the client and take the processor's ring ends back so
    /// the ring buffers survive into the next start.
    fn recover(&mut self, client: jack::AsyncClient<Notifications, RtProcessor>) -> bool {
        match client.deactivate() {
            Ok((_, _, rt)) => {
                let (parameter_rx, analysis_tx) = rt.processor.into_parts();
                if let Some(analysis_tx) = analysis_tx {
                    self.rt_ends = Some(RtEnds {
                        parameter_rx,
                        analysis_tx,
                    });
                }
                true
            }
            Err(e) => {
                log::error!("[audio] failed to deactivate JACK client: {}", e);
                false
            }
        }
    }

    /// Queue one parameter update for the audio thread.
    ///
    /// Non-blocking; returns `false` when the parameter ring is full and
    /// the update was dropped.
    pub fn send_parameter(&mut self, index: u32, value: f32) -> bool {
        self.parameter_tx.write_record(&ParameterValue::new(index, value))
    }

    /// Write end of the parameter ring, for bulk senders.
    pub fn parameters(&mut self) -> &mut Producer {
        &mut self.parameter_tx
    }

    /// Hand the analysis ring's read end to its (single) consumer.
    ///
    /// The analysis drain is a strictly-reading third actor on its own
    /// thread; there is exactly one such consumer per session.
    pub fn take_analysis_output(&mut self) -> Option<Consumer> {
        self.analysis_rx.take()
    }

    /// Sample rate negotiated with the JACK server (0 before first start).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }
}

/// JACK process handler.
///
/// Owns the processor (and through it the engine) exclusively; no mutex.
/// The adapter is the plain-function-pointer-plus-context trampoline of the
/// C API, expressed as a struct bound at registration time.
struct RtProcessor {
    output_port: Port<AudioOut>,
    processor: Processor,
}

impl jack::ProcessHandler for RtProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let out = self.output_port.as_mut_slice(ps);
        if let Err(e) = self.processor.render(out) {
            // A failed period must never unwind into JACK: log it, emit
            // silence for this period, and keep the session alive.
            log::error!("[audio] render failed: {}", e);
            out.fill(0.0);
        }
        Control::Continue
    }
}

/// JACK notification handler.
struct Notifications;

impl jack::NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        // Runs in a signal-handler-like context; keep it to one log line.
        log::warn!("[audio] JACK shut the client down: {}", reason);
    }

    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("[audio] JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("[audio] JACK xrun detected");
        Control::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SineEngine;

    #[test]
    fn test_stop_is_idempotent_without_start() {
        let mut session = Session::new(ProgramConfig::default(), SineEngine::factory());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stop());
        assert!(session.stop());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_parameter_queue_usable_while_stopped() {
        // The ring exists from construction so the control thread can
        // preload a complete parameter set before the first start. The
        // 256-byte arena keeps one byte open, so 31 records fit.
        let mut session = Session::new(ProgramConfig::default(), SineEngine::factory());
        for i in 0..31 {
            assert!(session.send_parameter(i, 0.5), "record {} refused", i);
        }
        assert!(!session.send_parameter(31, 0.5));
    }

    #[test]
    fn test_analysis_output_single_consumer() {
        let mut session = Session::new(ProgramConfig::default(), SineEngine::factory());
        assert!(session.take_analysis_output().is_some());
        assert!(session.take_analysis_output().is_none());
    }
}

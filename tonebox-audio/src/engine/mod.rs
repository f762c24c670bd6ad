mod backend;
mod dsp;
mod graph;

pub use backend::{
    BackendError, BackendResult, CapturedAudio, GraphOp, NullBackend, SharedTestBackend,
    SynthBackend, TestBackend, TestOp,
};

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use tonebox_types::{NodeId, NoteId, VoiceSource};

use graph::{Engine, EngineCommand};

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(3);
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(2);
/// Capture buffer reserved up front so the callback rarely reallocates.
const CAPTURE_RESERVE_SECS: usize = 60;

/// Real-time backend rendering through the default cpal output device.
///
/// The output stream lives on its own thread (a `cpal::Stream` is not `Send`);
/// the backend only holds channels, so it can be moved freely. Commands queue
/// up before `activate` and are applied once the stream runs.
pub struct CpalBackend {
    tx: Sender<EngineCommand>,
    rx: Receiver<EngineCommand>,
    next_node: AtomicU32,
    active: AtomicBool,
    sample_rate: AtomicU32,
    shutdown: Mutex<Option<Sender<()>>>,
    attempts: Arc<AtomicU64>,
}

impl CpalBackend {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            next_node: AtomicU32::new(1),
            active: AtomicBool::new(false),
            sample_rate: AtomicU32::new(44100),
            shutdown: Mutex::new(None),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    fn alloc(&self) -> NodeId {
        NodeId::new(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, cmd: EngineCommand) -> BackendResult {
        self.tx
            .send(cmd)
            .map_err(|_| BackendError("audio engine is gone".to_string()))
    }

    /// Invalidate the attempt in flight so a late stream never touches the
    /// command queue.
    fn abandon_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn require_active(&self) -> BackendResult {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError("audio engine not started".to_string()))
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.abandon_attempt();
        if let Ok(mut guard) = self.shutdown.lock() {
            guard.take();
        }
    }
}

/// Ties an output thread to one activation attempt.
#[derive(Clone)]
struct AttemptGate {
    current: Arc<AtomicU64>,
    mine: u64,
}

impl AttemptGate {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.mine
    }
}

/// One output period. A stream from an abandoned attempt stays silent and
/// leaves queued commands for the attempt that replaced it.
fn fill_period(
    engine: &mut Engine,
    commands: &Receiver<EngineCommand>,
    gate: &AttemptGate,
    data: &mut [f32],
    channels: usize,
) {
    if !gate.is_current() {
        data.fill(0.0);
        return;
    }
    while let Ok(cmd) = commands.try_recv() {
        engine.handle_cmd(cmd);
    }
    engine.render(data, channels);
}

/// Body of the output thread: build the stream, report the outcome, then keep
/// the stream alive until the shutdown sender is dropped.
fn run_output(
    commands: Receiver<EngineCommand>,
    ready: Sender<Result<u32, String>>,
    shutdown: Receiver<()>,
    gate: AttemptGate,
) {
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = ready.send(Err("no default output device".to_string()));
            return;
        }
    };
    let config = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(format!("no default output config: {}", e)));
            return;
        }
    };
    if config.sample_format() != cpal::SampleFormat::F32 {
        let _ = ready.send(Err(format!(
            "unsupported sample format {:?} (only f32)",
            config.sample_format()
        )));
        return;
    }

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let stream_config: cpal::StreamConfig = config.into();
    let mut engine = Engine::new(sample_rate as f32);
    let callback_gate = gate.clone();

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            fill_period(&mut engine, &commands, &callback_gate, data, channels);
        },
        |err| {
            log::error!(target: "audio", "output stream error: {}", err);
        },
        None,
    );
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to build output stream: {}", e)));
            return;
        }
    };
    if !gate.is_current() {
        log::debug!(target: "audio", "activation abandoned, dropping late stream");
        return;
    }
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(format!("failed to start output stream: {}", e)));
        return;
    }

    let _ = ready.send(Ok(sample_rate));
    // Blocks until the backend drops its sender.
    let _ = shutdown.recv();
    drop(stream);
    log::debug!(target: "audio", "output thread stopped");
}

impl SynthBackend for CpalBackend {
    fn activate(&self) -> BackendResult {
        if self.active.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let commands = self.rx.clone();
        let gate = AttemptGate {
            current: Arc::clone(&self.attempts),
            mine: self.attempts.load(Ordering::SeqCst),
        };

        thread::Builder::new()
            .name("tonebox-audio".to_string())
            .spawn(move || run_output(commands, ready_tx, shutdown_rx, gate))
            .map_err(|e| BackendError(format!("cannot spawn audio thread: {}", e)))?;

        match ready_rx.recv_timeout(ACTIVATION_TIMEOUT) {
            Ok(Ok(sample_rate)) => {
                self.sample_rate.store(sample_rate, Ordering::SeqCst);
                if let Ok(mut guard) = self.shutdown.lock() {
                    *guard = Some(shutdown_tx);
                }
                self.active.store(true, Ordering::SeqCst);
                log::info!(target: "audio", "output running at {} Hz", sample_rate);
                Ok(())
            }
            Ok(Err(e)) => {
                self.abandon_attempt();
                Err(BackendError(e))
            }
            Err(_) => {
                self.abandon_attempt();
                log::warn!(target: "audio", "output stream missed the activation deadline");
                Err(BackendError("audio device did not start in time".to_string()))
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn create_voice(&self, source: VoiceSource) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.send(EngineCommand::AddVoice { node, source })?;
        Ok(node)
    }

    fn create_filter(&self, cutoff_hz: f32) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.send(EngineCommand::AddFilter { node, cutoff_hz })?;
        Ok(node)
    }

    fn create_effect_send(&self, wet: f32) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.send(EngineCommand::AddEffect { node, wet })?;
        Ok(node)
    }

    fn create_capture_tap(&self) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.send(EngineCommand::AddTap { node })?;
        Ok(node)
    }

    fn send_bundle(&self, ops: Vec<GraphOp>) -> BackendResult {
        self.send(EngineCommand::Bundle(ops))
    }

    fn trigger(&self, voice: NodeId, note: NoteId, duration_secs: f32, velocity: f32) -> BackendResult {
        self.send(EngineCommand::Trigger {
            voice,
            freq: Some(note.frequency()),
            duration_secs,
            velocity,
        })
    }

    fn trigger_one_shot(
        &self,
        voice: NodeId,
        pitch: Option<NoteId>,
        duration_secs: f32,
        velocity: f32,
    ) -> BackendResult {
        self.send(EngineCommand::Trigger {
            voice,
            freq: pitch.map(NoteId::frequency),
            duration_secs,
            velocity,
        })
    }

    fn start_capture(&self, tap: NodeId) -> BackendResult {
        self.require_active()?;
        let rate = self.sample_rate.load(Ordering::SeqCst) as usize;
        let buffer = Vec::with_capacity(rate * CAPTURE_RESERVE_SECS);
        self.send(EngineCommand::StartCapture { tap, buffer })
    }

    fn finalize_capture(&self, tap: NodeId) -> BackendResult<CapturedAudio> {
        self.require_active()?;
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(EngineCommand::FinalizeCapture { tap, reply })?;
        let samples = rx
            .recv_timeout(FINALIZE_TIMEOUT)
            .map_err(|_| BackendError("capture did not finalize in time".to_string()))?;
        Ok(CapturedAudio {
            samples,
            sample_rate: self.sample_rate.load(Ordering::SeqCst),
            channels: 1,
        })
    }

    fn play_take(&self, path: &Path, looping: bool) -> BackendResult<NodeId> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        if spec.sample_rate != self.sample_rate.load(Ordering::SeqCst) {
            log::warn!(
                target: "audio",
                "take {} is {} Hz; playing without resampling",
                path.display(),
                spec.sample_rate
            );
        }
        let node = self.alloc();
        self.send(EngineCommand::PlayTake {
            node,
            samples,
            channels: spec.channels,
            looping,
        })?;
        Ok(node)
    }

    fn set_take_looping(&self, player: NodeId, looping: bool) -> BackendResult {
        self.send(EngineCommand::SetTakeLooping { node: player, looping })
    }

    fn stop_take(&self, player: NodeId) -> BackendResult {
        self.send(EngineCommand::Free(player))
    }

    fn free_node(&self, node: NodeId) -> BackendResult {
        self.send(EngineCommand::Free(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(current: &Arc<AtomicU64>) -> AttemptGate {
        AttemptGate {
            current: Arc::clone(current),
            mine: current.load(Ordering::SeqCst),
        }
    }

    #[test]
    fn abandoned_stream_leaves_commands_queued() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(EngineCommand::AddTap { node: NodeId::new(1) }).unwrap();
        tx.send(EngineCommand::AddTap { node: NodeId::new(2) }).unwrap();

        let attempts = Arc::new(AtomicU64::new(0));
        let stale = gate(&attempts);
        attempts.fetch_add(1, Ordering::SeqCst);

        let mut engine = Engine::new(44100.0);
        let mut data = vec![1.0; 64];
        fill_period(&mut engine, &rx, &stale, &mut data, 2);
        assert_eq!(rx.len(), 2);
        assert!(data.iter().all(|s| *s == 0.0));

        let retry = gate(&attempts);
        fill_period(&mut engine, &rx, &retry, &mut data, 2);
        assert!(rx.is_empty());
    }

    #[test]
    fn failed_activation_invalidates_its_attempt() {
        let backend = CpalBackend::new();
        let first = gate(&backend.attempts);
        backend.abandon_attempt();
        assert!(!first.is_current());
        assert!(gate(&backend.attempts).is_current());
    }
}

//! Synthesis backend trait: a semantic-level abstraction over the sound engine.
//!
//! `SynthBackend` captures what the controller *means* to do (create a voice,
//! rewire the graph, trigger a note, capture the mix) independently of how the
//! samples are produced. The controller is tested against `TestBackend`, which
//! records every call, and ships with `CpalBackend` for real output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tonebox_types::{NodeId, NoteId, VoiceSource};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<hound::Error> for BackendError {
    fn from(e: hound::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// One graph mutation. A `Vec<GraphOp>` sent through `send_bundle` is applied
/// by the engine as a unit, between two audio blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    /// Remove every outgoing connection of a node.
    Disconnect(NodeId),
    Connect { from: NodeId, to: NodeId },
    SetGainDb { node: NodeId, db: f32 },
    SetFrequency { node: NodeId, hz: f32 },
    SetWet { node: NodeId, wet: f32 },
}

/// Interleaved audio handed back when a capture is finalized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapturedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CapturedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Semantic-level synthesis backend trait.
///
/// Node-creating calls may happen before `activate`; sound is only produced
/// after it. Implementations must never block indefinitely.
pub trait SynthBackend: Send {
    /// Start (or resume) audio output. Idempotent once it has succeeded.
    fn activate(&self) -> BackendResult;

    /// Whether `activate` has succeeded.
    fn is_active(&self) -> bool;

    /// Create a voice producing dry output only; it is wired by the router.
    fn create_voice(&self, source: VoiceSource) -> BackendResult<NodeId>;

    /// Create the shared low-pass filter feeding the destination.
    fn create_filter(&self, cutoff_hz: f32) -> BackendResult<NodeId>;

    /// Create the shared effect send feeding the destination.
    fn create_effect_send(&self, wet: f32) -> BackendResult<NodeId>;

    /// Create the shared capture tap. Not every engine can capture.
    fn create_capture_tap(&self) -> BackendResult<NodeId>;

    /// Apply several graph mutations atomically.
    fn send_bundle(&self, ops: Vec<GraphOp>) -> BackendResult;

    /// Play a pitched note on a melodic or sampled voice.
    fn trigger(&self, voice: NodeId, note: NoteId, duration_secs: f32, velocity: f32) -> BackendResult;

    /// Start a percussive hit immediately. Hits on the same voice may overlap.
    fn trigger_one_shot(
        &self,
        voice: NodeId,
        pitch: Option<NoteId>,
        duration_secs: f32,
        velocity: f32,
    ) -> BackendResult;

    /// Begin recording whatever passes through the tap.
    fn start_capture(&self, tap: NodeId) -> BackendResult;

    /// Stop recording and hand back the captured audio.
    fn finalize_capture(&self, tap: NodeId) -> BackendResult<CapturedAudio>;

    /// Start playing a recorded take file. Returns the player node.
    fn play_take(&self, path: &Path, looping: bool) -> BackendResult<NodeId>;

    fn set_take_looping(&self, player: NodeId, looping: bool) -> BackendResult;

    fn stop_take(&self, player: NodeId) -> BackendResult;

    /// Free (remove) a node from the engine.
    fn free_node(&self, node: NodeId) -> BackendResult;
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Activate,
    CreateVoice {
        node: NodeId,
        source: VoiceSource,
    },
    CreateFilter {
        node: NodeId,
        cutoff_hz: f32,
    },
    CreateEffectSend {
        node: NodeId,
        wet: f32,
    },
    CreateCaptureTap(NodeId),
    SendBundle(Vec<GraphOp>),
    Trigger {
        voice: NodeId,
        note: NoteId,
        duration_secs: f32,
        velocity: f32,
    },
    TriggerOneShot {
        voice: NodeId,
        pitch: Option<NoteId>,
        duration_secs: f32,
        velocity: f32,
    },
    StartCapture(NodeId),
    FinalizeCapture(NodeId),
    PlayTake {
        node: NodeId,
        path: PathBuf,
        looping: bool,
    },
    SetTakeLooping {
        node: NodeId,
        looping: bool,
    },
    StopTake(NodeId),
    FreeNode(NodeId),
}

/// A test backend that records all operations into a vector for assertions.
///
/// Everything succeeds unless one of the `fail_*` switches is set. Uses
/// `Mutex` and atomics for interior mutability so it can be shared through
/// `Arc<TestBackend>`.
pub struct TestBackend {
    ops: Mutex<Vec<TestOp>>,
    next_node: AtomicU32,
    active: AtomicBool,
    fail_activation: AtomicBool,
    fail_voices: AtomicBool,
    fail_capture_tap: AtomicBool,
    fail_bundles: AtomicBool,
    capture: Mutex<CapturedAudio>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            next_node: AtomicU32::new(1),
            active: AtomicBool::new(false),
            fail_activation: AtomicBool::new(false),
            fail_voices: AtomicBool::new(false),
            fail_capture_tap: AtomicBool::new(false),
            fail_bundles: AtomicBool::new(false),
            capture: Mutex::new(CapturedAudio {
                samples: vec![0.0; 4410],
                sample_rate: 44100,
                channels: 1,
            }),
        }
    }

    /// Make `activate` fail until switched off again.
    pub fn fail_activation(&self, fail: bool) {
        self.fail_activation.store(fail, Ordering::SeqCst);
    }

    /// Make `create_voice` fail.
    pub fn fail_voices(&self, fail: bool) {
        self.fail_voices.store(fail, Ordering::SeqCst);
    }

    /// Make `create_capture_tap` fail, as on an engine without capture.
    pub fn fail_capture_tap(&self, fail: bool) {
        self.fail_capture_tap.store(fail, Ordering::SeqCst);
    }

    /// Make `send_bundle` fail. The bundle is still recorded.
    pub fn fail_bundles(&self, fail: bool) {
        self.fail_bundles.store(fail, Ordering::SeqCst);
    }

    /// Audio returned by the next `finalize_capture` calls.
    pub fn set_captured_audio(&self, audio: CapturedAudio) {
        *self.capture.lock().unwrap() = audio;
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&TestOp) -> bool>(&self, f: F) -> Option<TestOp> {
        self.ops.lock().unwrap().iter().find(|op| f(op)).cloned()
    }

    /// Return every bundle sent, oldest first.
    pub fn bundles(&self) -> Vec<Vec<GraphOp>> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::SendBundle(ops) => Some(ops.clone()),
                _ => None,
            })
            .collect()
    }

    /// Return the most recent bundle, if any.
    pub fn last_bundle(&self) -> Option<Vec<GraphOp>> {
        self.bundles().pop()
    }

    /// Return all FreeNode operations.
    pub fn nodes_freed(&self) -> Vec<NodeId> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::FreeNode(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Number of Trigger and TriggerOneShot operations.
    pub fn trigger_count(&self) -> usize {
        self.count(|op| matches!(op, TestOp::Trigger { .. } | TestOp::TriggerOneShot { .. }))
    }

    fn push(&self, op: TestOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn alloc(&self) -> NodeId {
        NodeId::new(self.next_node.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthBackend for TestBackend {
    fn activate(&self) -> BackendResult {
        self.push(TestOp::Activate);
        if self.fail_activation.load(Ordering::SeqCst) {
            return Err(BackendError("audio device refused to start".to_string()));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn create_voice(&self, source: VoiceSource) -> BackendResult<NodeId> {
        if self.fail_voices.load(Ordering::SeqCst) {
            return Err(BackendError(format!("cannot build {:?} voice", source)));
        }
        let node = self.alloc();
        self.push(TestOp::CreateVoice { node, source });
        Ok(node)
    }

    fn create_filter(&self, cutoff_hz: f32) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.push(TestOp::CreateFilter { node, cutoff_hz });
        Ok(node)
    }

    fn create_effect_send(&self, wet: f32) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.push(TestOp::CreateEffectSend { node, wet });
        Ok(node)
    }

    fn create_capture_tap(&self) -> BackendResult<NodeId> {
        if self.fail_capture_tap.load(Ordering::SeqCst) {
            return Err(BackendError("capture not supported".to_string()));
        }
        let node = self.alloc();
        self.push(TestOp::CreateCaptureTap(node));
        Ok(node)
    }

    fn send_bundle(&self, ops: Vec<GraphOp>) -> BackendResult {
        self.push(TestOp::SendBundle(ops));
        if self.fail_bundles.load(Ordering::SeqCst) {
            return Err(BackendError("engine rejected the bundle".to_string()));
        }
        Ok(())
    }

    fn trigger(&self, voice: NodeId, note: NoteId, duration_secs: f32, velocity: f32) -> BackendResult {
        self.push(TestOp::Trigger {
            voice,
            note,
            duration_secs,
            velocity,
        });
        Ok(())
    }

    fn trigger_one_shot(
        &self,
        voice: NodeId,
        pitch: Option<NoteId>,
        duration_secs: f32,
        velocity: f32,
    ) -> BackendResult {
        self.push(TestOp::TriggerOneShot {
            voice,
            pitch,
            duration_secs,
            velocity,
        });
        Ok(())
    }

    fn start_capture(&self, tap: NodeId) -> BackendResult {
        self.push(TestOp::StartCapture(tap));
        Ok(())
    }

    fn finalize_capture(&self, tap: NodeId) -> BackendResult<CapturedAudio> {
        self.push(TestOp::FinalizeCapture(tap));
        Ok(self.capture.lock().unwrap().clone())
    }

    fn play_take(&self, path: &Path, looping: bool) -> BackendResult<NodeId> {
        let node = self.alloc();
        self.push(TestOp::PlayTake {
            node,
            path: path.to_path_buf(),
            looping,
        });
        Ok(node)
    }

    fn set_take_looping(&self, player: NodeId, looping: bool) -> BackendResult {
        self.push(TestOp::SetTakeLooping { node: player, looping });
        Ok(())
    }

    fn stop_take(&self, player: NodeId) -> BackendResult {
        self.push(TestOp::StopTake(player));
        Ok(())
    }

    fn free_node(&self, node: NodeId) -> BackendResult {
        self.push(TestOp::FreeNode(node));
        Ok(())
    }
}

/// Wraps `Arc<TestBackend>` so the controller can own a `Box<dyn SynthBackend>`
/// while tests retain an `Arc` for assertions.
pub struct SharedTestBackend(pub Arc<TestBackend>);

impl SynthBackend for SharedTestBackend {
    fn activate(&self) -> BackendResult {
        self.0.activate()
    }
    fn is_active(&self) -> bool {
        self.0.is_active()
    }
    fn create_voice(&self, source: VoiceSource) -> BackendResult<NodeId> {
        self.0.create_voice(source)
    }
    fn create_filter(&self, cutoff_hz: f32) -> BackendResult<NodeId> {
        self.0.create_filter(cutoff_hz)
    }
    fn create_effect_send(&self, wet: f32) -> BackendResult<NodeId> {
        self.0.create_effect_send(wet)
    }
    fn create_capture_tap(&self) -> BackendResult<NodeId> {
        self.0.create_capture_tap()
    }
    fn send_bundle(&self, ops: Vec<GraphOp>) -> BackendResult {
        self.0.send_bundle(ops)
    }
    fn trigger(&self, voice: NodeId, note: NoteId, duration_secs: f32, velocity: f32) -> BackendResult {
        self.0.trigger(voice, note, duration_secs, velocity)
    }
    fn trigger_one_shot(&self, voice: NodeId, pitch: Option<NoteId>, duration_secs: f32, velocity: f32) -> BackendResult {
        self.0.trigger_one_shot(voice, pitch, duration_secs, velocity)
    }
    fn start_capture(&self, tap: NodeId) -> BackendResult {
        self.0.start_capture(tap)
    }
    fn finalize_capture(&self, tap: NodeId) -> BackendResult<CapturedAudio> {
        self.0.finalize_capture(tap)
    }
    fn play_take(&self, path: &Path, looping: bool) -> BackendResult<NodeId> {
        self.0.play_take(path, looping)
    }
    fn set_take_looping(&self, player: NodeId, looping: bool) -> BackendResult {
        self.0.set_take_looping(player, looping)
    }
    fn stop_take(&self, player: NodeId) -> BackendResult {
        self.0.stop_take(player)
    }
    fn free_node(&self, node: NodeId) -> BackendResult {
        self.0.free_node(node)
    }
}

// ─── NullBackend ────────────────────────────────────────────────────

/// A silent backend that accepts everything. Used when audio is disabled.
/// It cannot capture, so instrument recording reports the tap as unavailable.
#[derive(Default)]
pub struct NullBackend {
    next_node: AtomicU32,
    active: AtomicBool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self) -> NodeId {
        NodeId::new(self.next_node.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl SynthBackend for NullBackend {
    fn activate(&self) -> BackendResult {
        self.active.store(true, Ordering::Relaxed);
        Ok(())
    }
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
    fn create_voice(&self, _: VoiceSource) -> BackendResult<NodeId> { Ok(self.alloc()) }
    fn create_filter(&self, _: f32) -> BackendResult<NodeId> { Ok(self.alloc()) }
    fn create_effect_send(&self, _: f32) -> BackendResult<NodeId> { Ok(self.alloc()) }
    fn create_capture_tap(&self) -> BackendResult<NodeId> {
        Err(BackendError("audio disabled".to_string()))
    }
    fn send_bundle(&self, _: Vec<GraphOp>) -> BackendResult { Ok(()) }
    fn trigger(&self, _: NodeId, _: NoteId, _: f32, _: f32) -> BackendResult { Ok(()) }
    fn trigger_one_shot(&self, _: NodeId, _: Option<NoteId>, _: f32, _: f32) -> BackendResult { Ok(()) }
    fn start_capture(&self, _: NodeId) -> BackendResult {
        Err(BackendError("audio disabled".to_string()))
    }
    fn finalize_capture(&self, _: NodeId) -> BackendResult<CapturedAudio> {
        Err(BackendError("audio disabled".to_string()))
    }
    fn play_take(&self, _: &Path, _: bool) -> BackendResult<NodeId> { Ok(self.alloc()) }
    fn set_take_looping(&self, _: NodeId, _: bool) -> BackendResult { Ok(()) }
    fn stop_take(&self, _: NodeId) -> BackendResult { Ok(()) }
    fn free_node(&self, _: NodeId) -> BackendResult { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_records_in_order() {
        let backend = TestBackend::new();
        let voice = backend.create_voice(VoiceSource::PolySynth).unwrap();
        let filter = backend.create_filter(5100.0).unwrap();
        backend
            .send_bundle(vec![GraphOp::Disconnect(voice), GraphOp::Connect { from: voice, to: filter }])
            .unwrap();
        backend.free_node(voice).unwrap();

        let ops = backend.operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[0], TestOp::CreateVoice { source: VoiceSource::PolySynth, .. }));
        assert_eq!(backend.bundles().len(), 1);
        assert_eq!(backend.nodes_freed(), vec![voice]);
    }

    #[test]
    fn test_backend_failure_switches() {
        let backend = TestBackend::new();
        backend.fail_activation(true);
        assert!(backend.activate().is_err());
        assert!(!backend.is_active());
        backend.fail_activation(false);
        assert!(backend.activate().is_ok());
        assert!(backend.is_active());

        backend.fail_capture_tap(true);
        assert!(backend.create_capture_tap().is_err());
    }

    #[test]
    fn shared_backend_forwards() {
        let inner = Arc::new(TestBackend::new());
        let shared = SharedTestBackend(Arc::clone(&inner));
        let node = shared.create_effect_send(0.5).unwrap();
        shared.free_node(node).unwrap();
        assert_eq!(inner.nodes_freed(), vec![node]);
    }

    #[test]
    fn null_backend_cannot_capture() {
        let backend = NullBackend::new();
        assert!(backend.activate().is_ok());
        assert!(backend.create_capture_tap().is_err());
        let a = backend.create_voice(VoiceSource::Metal).unwrap();
        let b = backend.create_voice(VoiceSource::Metal).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn captured_audio_frames() {
        let audio = CapturedAudio {
            samples: vec![0.0; 10],
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(audio.frames(), 5);
        assert_eq!(CapturedAudio::default().frames(), 0);
    }
}

//! Recording controller: instrument captures from the router's tap, voice
//! captures from the microphone, and the resulting list of takes.
//!
//! Take ids are handed out when a capture stops, so the list is always in
//! recording order even when a microphone finalizes late.

use crossbeam_channel::{Receiver, Sender};

use tonebox_audio::{CaptureCompletion, MicrophoneSession, MicrophoneSource, SynthBackend, TakeStore};
use tonebox_types::{RecordingMode, Take, TakeId};

use crate::dispatch::EngineActivation;
use crate::error::PerformanceError;
use crate::router::SignalRouter;
use crate::state::PerformanceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    /// Source is being acquired.
    Armed(RecordingMode),
    Capturing(RecordingMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A capture is already running; nothing changed.
    AlreadyCapturing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The take is in the list.
    Saved(TakeId),
    /// The id is reserved; the take appears after `poll_completed`.
    Pending(TakeId),
    NotRecording,
}

/// Everything a recording operation touches.
pub struct RecordingContext<'a> {
    pub backend: &'a dyn SynthBackend,
    pub router: &'a SignalRouter,
    pub activation: &'a mut EngineActivation,
    pub state: &'a mut PerformanceState,
    pub microphone: &'a dyn MicrophoneSource,
    pub store: &'a TakeStore,
}

pub struct RecordingController {
    state: RecorderState,
    session: Option<Box<dyn MicrophoneSession>>,
    takes: Vec<Take>,
    next_take: u32,
    pending: Vec<TakeId>,
    completion_tx: Sender<CaptureCompletion>,
    completion_rx: Receiver<CaptureCompletion>,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingController {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            state: RecorderState::Idle,
            session: None,
            takes: Vec::new(),
            next_take: 1,
            pending: Vec::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, RecorderState::Capturing(_))
    }

    /// Finished takes in recording order.
    pub fn takes(&self) -> &[Take] {
        &self.takes
    }

    pub fn take(&self, id: TakeId) -> Option<&Take> {
        self.takes.iter().find(|t| t.id == id)
    }

    /// Voice takes stopped but not yet finalized.
    pub fn pending(&self) -> &[TakeId] {
        &self.pending
    }

    fn reserve_id(&mut self) -> TakeId {
        let id = TakeId::new(self.next_take);
        self.next_take += 1;
        id
    }

    fn set_state(&mut self, next: RecorderState, perf: &mut PerformanceState) {
        self.state = next;
        perf.set_recording(matches!(next, RecorderState::Capturing(_)));
    }

    pub fn start(&mut self, mode: RecordingMode, mut ctx: RecordingContext<'_>) -> Result<StartOutcome, PerformanceError> {
        if self.state != RecorderState::Idle {
            log::debug!(target: "recording", "start ignored, already {:?}", self.state);
            return Ok(StartOutcome::AlreadyCapturing);
        }
        self.set_state(RecorderState::Armed(mode), ctx.state);

        let started = match mode {
            RecordingMode::Instrument => Self::start_instrument(&mut ctx),
            RecordingMode::Voice => ctx
                .microphone
                .request_access()
                .map(|session| self.session = Some(session))
                .map_err(PerformanceError::MicrophoneAccessDenied),
        };

        match started {
            Ok(()) => {
                log::info!(target: "recording", "{} recording started", mode.name());
                self.set_state(RecorderState::Capturing(mode), ctx.state);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                log::warn!(target: "recording", "{} recording failed to start: {}", mode.name(), e);
                self.set_state(RecorderState::Idle, ctx.state);
                Err(e)
            }
        }
    }

    fn start_instrument(ctx: &mut RecordingContext<'_>) -> Result<(), PerformanceError> {
        let tap = ctx.router.capture_tap().ok_or(PerformanceError::CaptureUnavailable)?;
        ctx.activation.ensure(ctx.backend)?;
        ctx.state.set_armed(true);
        ctx.backend.start_capture(tap)?;
        Ok(())
    }

    pub fn stop(&mut self, ctx: RecordingContext<'_>) -> Result<StopOutcome, PerformanceError> {
        let RecorderState::Capturing(mode) = self.state else {
            return Ok(StopOutcome::NotRecording);
        };
        let id = self.reserve_id();
        self.set_state(RecorderState::Idle, ctx.state);

        match mode {
            RecordingMode::Instrument => {
                let tap = ctx.router.capture_tap().ok_or(PerformanceError::CaptureUnavailable)?;
                let audio = ctx.backend.finalize_capture(tap)?;
                let resource = ctx.store.persist(id, &audio).map_err(PerformanceError::TakeStorage)?;
                log::info!(target: "recording", "take {} saved ({:.2}s)", id, resource.duration_secs());
                self.insert(Take::new(id, resource));
                Ok(StopOutcome::Saved(id))
            }
            RecordingMode::Voice => {
                let Some(session) = self.session.take() else {
                    return Err(PerformanceError::MicrophoneAccessDenied(
                        "no microphone session".to_string(),
                    ));
                };
                session.stop(id, self.completion_tx.clone());
                self.pending.push(id);
                Ok(StopOutcome::Pending(id))
            }
        }
    }

    /// Turn finished microphone captures into takes. Returns one result per
    /// completion received.
    pub fn poll_completed(&mut self, store: &TakeStore) -> Vec<Result<TakeId, PerformanceError>> {
        let mut results = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            let CaptureCompletion { take, result } = completion;
            if !self.pending.contains(&take) {
                log::warn!(target: "recording", "unexpected completion for take {}", take);
                continue;
            }
            self.pending.retain(|id| *id != take);

            let saved = result
                .and_then(|audio| store.persist(take, &audio))
                .map_err(PerformanceError::TakeStorage);
            match saved {
                Ok(resource) => {
                    log::info!(target: "recording", "voice take {} saved", take);
                    self.insert(Take::new(take, resource));
                    results.push(Ok(take));
                }
                Err(e) => {
                    log::error!(target: "recording", "voice take {} lost: {}", take, e);
                    results.push(Err(e));
                }
            }
        }
        results
    }

    fn insert(&mut self, take: Take) {
        let at = self.takes.partition_point(|t| t.id < take.id);
        self.takes.insert(at, take);
    }

    /// Flip the take's loop flag. `None` for an unknown id.
    pub fn toggle_loop(&mut self, id: TakeId) -> Option<bool> {
        let take = self.takes.iter_mut().find(|t| t.id == id)?;
        take.is_looping = !take.is_looping;
        Some(take.is_looping)
    }

    /// Remove a take and release its file. `Ok(false)` for an unknown id.
    pub fn delete(&mut self, id: TakeId, store: &TakeStore) -> Result<bool, PerformanceError> {
        let Some(pos) = self.takes.iter().position(|t| t.id == id) else {
            return Ok(false);
        };
        let take = self.takes.remove(pos);
        store.release(&take.resource).map_err(PerformanceError::TakeStorage)?;
        Ok(true)
    }

    /// Drop a running capture without producing a take.
    pub fn cancel(&mut self, backend: &dyn SynthBackend, router: &SignalRouter, state: &mut PerformanceState) {
        match self.state {
            RecorderState::Capturing(RecordingMode::Voice) => {
                if let Some(session) = self.session.take() {
                    session.cancel();
                }
            }
            RecorderState::Capturing(RecordingMode::Instrument) => {
                if let Some(tap) = router.capture_tap() {
                    let _ = backend.finalize_capture(tap);
                }
            }
            _ => {}
        }
        self.set_state(RecorderState::Idle, state);
    }

    /// Empty the take list and remove every file behind it. Takes still
    /// finishing are abandoned. Returns how many files were released.
    pub fn release_all(&mut self, store: &TakeStore) -> usize {
        self.pending.clear();
        let mut released = 0;
        for take in self.takes.drain(..) {
            match store.release(&take.resource) {
                Ok(()) => released += 1,
                Err(e) => log::warn!(target: "recording", "take {} not released: {}", take.id, e),
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{VoiceRegistry, VoiceSettings};
    use tonebox_audio::{CapturedAudio, TestBackend, TestMicrophone, TestOp};
    use tonebox_types::Controls;

    struct Rig {
        backend: TestBackend,
        router: SignalRouter,
        activation: EngineActivation,
        state: PerformanceState,
        mic: TestMicrophone,
        store: TakeStore,
        recorder: RecordingController,
        _dir: tempfile::TempDir,
    }

    impl Rig {
        fn new() -> Self {
            let backend = TestBackend::new();
            let registry = VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();
            let mut router = SignalRouter::new(&backend, Controls::default()).unwrap();
            router.apply_topology(&backend, &registry.voice_nodes()).unwrap();
            let dir = tempfile::tempdir().unwrap();
            Self {
                backend,
                router,
                activation: EngineActivation::default(),
                state: PerformanceState::default(),
                mic: TestMicrophone::new(),
                store: TakeStore::new(dir.path()),
                recorder: RecordingController::new(),
                _dir: dir,
            }
        }

        fn start(&mut self, mode: RecordingMode) -> Result<StartOutcome, PerformanceError> {
            self.recorder.start(
                mode,
                RecordingContext {
                    backend: &self.backend,
                    router: &self.router,
                    activation: &mut self.activation,
                    state: &mut self.state,
                    microphone: &self.mic,
                    store: &self.store,
                },
            )
        }

        fn stop(&mut self) -> Result<StopOutcome, PerformanceError> {
            self.recorder.stop(RecordingContext {
                backend: &self.backend,
                router: &self.router,
                activation: &mut self.activation,
                state: &mut self.state,
                microphone: &self.mic,
                store: &self.store,
            })
        }
    }

    #[test]
    fn instrument_take_is_saved_on_stop() {
        let mut rig = Rig::new();
        rig.backend.set_captured_audio(CapturedAudio {
            samples: vec![0.1; 4410],
            sample_rate: 44100,
            channels: 1,
        });
        assert_eq!(rig.start(RecordingMode::Instrument).unwrap(), StartOutcome::Started);
        assert!(rig.state.is_recording());

        let tap = rig.router.capture_tap().unwrap();
        assert!(rig.backend.find(|op| *op == TestOp::StartCapture(tap)).is_some());

        let id = match rig.stop().unwrap() {
            StopOutcome::Saved(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        assert!(!rig.state.is_recording());
        let take = rig.recorder.take(id).unwrap();
        assert!(!take.is_looping);
        assert!(take.resource.path.exists());
        assert_eq!(take.resource.frames, 4410);
    }

    #[test]
    fn second_start_is_ignored() {
        let mut rig = Rig::new();
        rig.start(RecordingMode::Instrument).unwrap();
        assert_eq!(rig.start(RecordingMode::Voice).unwrap(), StartOutcome::AlreadyCapturing);
        assert_eq!(rig.mic.sessions_opened(), 0);
        assert_eq!(rig.recorder.state(), RecorderState::Capturing(RecordingMode::Instrument));
    }

    #[test]
    fn stop_while_idle_does_nothing() {
        let mut rig = Rig::new();
        assert_eq!(rig.stop().unwrap(), StopOutcome::NotRecording);
        assert!(rig.recorder.takes().is_empty());
    }

    #[test]
    fn missing_tap_blocks_instrument_capture() {
        let backend = TestBackend::new();
        backend.fail_capture_tap(true);
        let mut rig = Rig::new();
        rig.router = SignalRouter::new(&backend, Controls::default()).unwrap();
        assert_eq!(
            rig.start(RecordingMode::Instrument),
            Err(PerformanceError::CaptureUnavailable)
        );
        assert_eq!(rig.recorder.state(), RecorderState::Idle);
        assert!(!rig.state.is_recording());
    }

    #[test]
    fn denied_microphone_returns_to_idle() {
        let mut rig = Rig::new();
        rig.mic.deny_access(true);
        assert!(matches!(
            rig.start(RecordingMode::Voice),
            Err(PerformanceError::MicrophoneAccessDenied(_))
        ));
        assert_eq!(rig.recorder.state(), RecorderState::Idle);
        assert!(!rig.state.is_recording());
        assert!(rig.recorder.takes().is_empty());
    }

    #[test]
    fn late_voice_completions_keep_recording_order() {
        let mut rig = Rig::new();
        rig.mic.hold_completions(true);

        rig.start(RecordingMode::Voice).unwrap();
        let first = rig.stop().unwrap();
        rig.start(RecordingMode::Voice).unwrap();
        let second = rig.stop().unwrap();
        assert_eq!(first, StopOutcome::Pending(TakeId::new(1)));
        assert_eq!(second, StopOutcome::Pending(TakeId::new(2)));
        assert!(rig.recorder.poll_completed(&rig.store).is_empty());

        rig.mic.release_held(true);
        let done = rig.recorder.poll_completed(&rig.store);
        assert_eq!(done.len(), 2);
        let ids: Vec<TakeId> = rig.recorder.takes().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TakeId::new(1), TakeId::new(2)]);
        assert!(rig.recorder.pending().is_empty());
    }

    #[test]
    fn loop_toggle_and_delete() {
        let mut rig = Rig::new();
        rig.start(RecordingMode::Instrument).unwrap();
        rig.stop().unwrap();
        rig.start(RecordingMode::Instrument).unwrap();
        rig.stop().unwrap();

        let (a, b) = (TakeId::new(1), TakeId::new(2));
        assert_eq!(rig.recorder.toggle_loop(a), Some(true));
        assert_eq!(rig.recorder.toggle_loop(a), Some(false));
        assert_eq!(rig.recorder.toggle_loop(TakeId::new(9)), None);

        let path = rig.recorder.take(a).unwrap().resource.path.clone();
        assert!(rig.recorder.delete(a, &rig.store).unwrap());
        assert!(!path.exists());
        assert!(!rig.recorder.delete(a, &rig.store).unwrap());
        assert_eq!(rig.recorder.takes().len(), 1);
        assert_eq!(rig.recorder.takes()[0].id, b);
    }

    #[test]
    fn release_all_removes_every_file() {
        let mut rig = Rig::new();
        rig.start(RecordingMode::Instrument).unwrap();
        rig.stop().unwrap();
        rig.start(RecordingMode::Instrument).unwrap();
        rig.stop().unwrap();
        let paths: Vec<_> = rig.recorder.takes().iter().map(|t| t.resource.path.clone()).collect();
        assert!(paths.iter().all(|p| p.exists()));

        assert_eq!(rig.recorder.release_all(&rig.store), 2);
        assert!(rig.recorder.takes().is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn cancel_voice_discards_session() {
        let mut rig = Rig::new();
        rig.start(RecordingMode::Voice).unwrap();
        rig.recorder.cancel(&rig.backend, &rig.router, &mut rig.state);
        assert_eq!(rig.mic.sessions_cancelled(), 1);
        assert!(!rig.state.is_recording());
        assert!(rig.recorder.takes().is_empty());
    }
}

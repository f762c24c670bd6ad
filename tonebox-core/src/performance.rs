//! The controller the host loop talks to.
//!
//! `Performance` owns every component and exposes one handler per user or
//! device event. Handlers run to completion; collaborator threads only reach
//! in through channels drained by `tick`.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use tonebox_audio::{MicrophoneSource, SynthBackend, TakeStore};
use tonebox_types::{InstrumentKind, MidiDeviceId, NodeId, NoteId, NoteSource, RecordingMode, Take, TakeId};

use crate::config::Settings;
use crate::dispatch::{DispatchContext, DispatchOutcome, EngineActivation, NoteDispatcher};
use crate::error::PerformanceError;
use crate::midi::{DeviceChange, MidiInputManager, MidiStatus, MidiTransport};
use crate::recording::{RecorderState, RecordingContext, RecordingController, StartOutcome, StopOutcome};
use crate::registry::VoiceRegistry;
use crate::router::SignalRouter;
use crate::state::{PerformanceState, StateChange};

/// What the status line shows.
#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceStatus {
    /// Engine not started yet.
    Ready,
    Armed,
    Recording(RecordingMode),
    /// Something worth telling the performer, not an error.
    Info(String),
    Error(PerformanceError),
}

impl PerformanceStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, PerformanceStatus::Error(_))
    }
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceStatus::Ready => write!(f, "Ready. Play a note to start the audio engine."),
            PerformanceStatus::Armed => write!(f, "Audio engine running."),
            PerformanceStatus::Recording(RecordingMode::Instrument) => write!(f, "Recording instrument..."),
            PerformanceStatus::Recording(RecordingMode::Voice) => write!(f, "Recording microphone..."),
            PerformanceStatus::Info(msg) => write!(f, "{}", msg),
            PerformanceStatus::Error(e) => write!(f, "Error: {}", e),
        }
    }
}

/// What one `tick` did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub notes_played: usize,
    pub device_changes: Vec<DeviceChange>,
    pub takes_completed: Vec<TakeId>,
}

pub struct Performance {
    backend: Box<dyn SynthBackend>,
    registry: VoiceRegistry,
    router: SignalRouter,
    dispatcher: NoteDispatcher,
    midi: MidiInputManager,
    recorder: RecordingController,
    microphone: Box<dyn MicrophoneSource>,
    store: TakeStore,
    activation: EngineActivation,
    state: PerformanceState,
    players: HashMap<TakeId, NodeId>,
    auto_connect_first: bool,
    hotplug_poll: Duration,
    last_hotplug: Option<Instant>,
    message: Option<PerformanceStatus>,
    shut_down: bool,
}

impl Performance {
    /// Build voices and the routing chain. The engine itself starts on the
    /// first note.
    pub fn new(
        settings: Settings,
        backend: Box<dyn SynthBackend>,
        transport: Box<dyn MidiTransport>,
        microphone: Box<dyn MicrophoneSource>,
    ) -> Result<Self, PerformanceError> {
        let mut registry = VoiceRegistry::build(backend.as_ref(), &settings.voices)?;
        let mut router = match SignalRouter::new(backend.as_ref(), settings.controls) {
            Ok(router) => router,
            Err(e) => {
                registry.release(backend.as_ref());
                return Err(e);
            }
        };
        if let Err(e) = router.apply_topology(backend.as_ref(), &registry.voice_nodes()) {
            router.release(backend.as_ref());
            registry.release(backend.as_ref());
            return Err(e);
        }

        log::info!(
            target: "performance",
            "{} voices ready, takes in {}",
            registry.all_voices().len(),
            settings.takes_dir.display()
        );

        Ok(Self {
            backend,
            registry,
            router,
            dispatcher: NoteDispatcher::new(settings.ui_drums, settings.midi_drums),
            midi: MidiInputManager::new(transport),
            recorder: RecordingController::new(),
            microphone,
            store: TakeStore::new(settings.takes_dir),
            activation: EngineActivation::default(),
            state: PerformanceState::new(settings.instrument, settings.controls, settings.recording_mode),
            players: HashMap::new(),
            auto_connect_first: settings.midi.auto_connect_first,
            hotplug_poll: settings.midi.hotplug_poll,
            last_hotplug: None,
            message: None,
            shut_down: false,
        })
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn state(&self) -> &PerformanceState {
        &self.state
    }

    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        self.state.subscribe()
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    pub fn dispatcher(&self) -> &NoteDispatcher {
        &self.dispatcher
    }

    pub fn midi(&self) -> &MidiInputManager {
        &self.midi
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn takes(&self) -> &[Take] {
        self.recorder.takes()
    }

    pub fn activation(&self) -> &EngineActivation {
        &self.activation
    }

    /// The latest message, or a summary of the current state.
    pub fn status(&self) -> PerformanceStatus {
        if let Some(message) = &self.message {
            return message.clone();
        }
        if let RecorderState::Capturing(mode) = self.recorder.state() {
            return PerformanceStatus::Recording(mode);
        }
        if self.state.is_armed() {
            PerformanceStatus::Armed
        } else {
            PerformanceStatus::Ready
        }
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.message = Some(PerformanceStatus::Info(msg.into()));
    }

    fn report<T>(&mut self, result: Result<T, PerformanceError>) -> Result<T, PerformanceError> {
        if let Err(e) = &result {
            log::warn!(target: "performance", "{}", e);
            self.message = Some(PerformanceStatus::Error(e.clone()));
        }
        result
    }

    // ── Instrument and controls ────────────────────────────────────

    pub fn select_instrument(&mut self, kind: InstrumentKind) {
        if self.state.select_instrument(kind) {
            self.info(format!("Instrument: {}", kind.label()));
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), PerformanceError> {
        if self.state.set_volume(volume) {
            self.rebuild_routes()?;
        }
        Ok(())
    }

    pub fn set_tone(&mut self, tone: f32) -> Result<(), PerformanceError> {
        if self.state.set_tone(tone) {
            self.rebuild_routes()?;
        }
        Ok(())
    }

    pub fn set_effect(&mut self, effect: f32) -> Result<(), PerformanceError> {
        if self.state.set_effect(effect) {
            self.rebuild_routes()?;
        }
        Ok(())
    }

    fn rebuild_routes(&mut self) -> Result<(), PerformanceError> {
        let voices = self.registry.voice_nodes();
        let result = self
            .router
            .rebuild(self.backend.as_ref(), &voices, self.state.controls());
        self.report(result)
    }

    /// Takes effect on the next recording; a running capture keeps its mode.
    pub fn set_recording_mode(&mut self, mode: RecordingMode) {
        self.state.set_recording_mode(mode);
    }

    // ── Notes ──────────────────────────────────────────────────────

    /// A key on the on-screen keyboard.
    pub fn play_note(&mut self, note: NoteId) -> Result<DispatchOutcome, PerformanceError> {
        let result = self.dispatch(note, NoteSource::Ui, None);
        if result.is_ok() && self.status().is_error() {
            self.message = None;
        }
        self.report(result)
    }

    fn dispatch(&mut self, note: NoteId, source: NoteSource, velocity: Option<f32>) -> Result<DispatchOutcome, PerformanceError> {
        self.dispatcher.dispatch(
            note,
            source,
            velocity,
            DispatchContext {
                backend: self.backend.as_ref(),
                registry: &self.registry,
                activation: &mut self.activation,
                state: &mut self.state,
            },
        )
    }

    /// User-requested engine restart after a failure.
    pub fn retry_activation(&mut self) -> Result<(), PerformanceError> {
        let result = self.activation.retry(self.backend.as_ref());
        if result.is_ok() {
            self.state.set_armed(true);
            self.message = None;
        }
        self.report(result)
    }

    /// Drain device events: MIDI notes in arrival order, hot-plug at the
    /// configured interval, then finished microphone takes.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        for midi_note in self.midi.poll_notes() {
            match self.dispatch(midi_note.note, NoteSource::Midi, Some(midi_note.velocity)) {
                Ok(DispatchOutcome::Triggered) => report.notes_played += 1,
                Ok(_) => {}
                Err(e) => {
                    let _ = self.report::<()>(Err(e));
                }
            }
        }

        let due = self
            .last_hotplug
            .map_or(true, |last| now.saturating_duration_since(last) >= self.hotplug_poll);
        if due && self.midi.is_enabled() {
            self.last_hotplug = Some(now);
            match self.midi.refresh_devices() {
                Ok(changes) => {
                    self.describe_device_changes(&changes);
                    report.device_changes = changes;
                }
                Err(e) => {
                    let _ = self.report::<()>(Err(e));
                }
            }
        }

        for completed in self.recorder.poll_completed(&self.store) {
            match completed {
                Ok(id) => {
                    self.info(format!("Take {} saved", id));
                    report.takes_completed.push(id);
                }
                Err(e) => {
                    let _ = self.report::<()>(Err(e));
                }
            }
        }

        report
    }

    fn describe_device_changes(&mut self, changes: &[DeviceChange]) {
        for change in changes {
            match change {
                DeviceChange::Connected(info) => self.info(format!("MIDI input connected: {}", info.id)),
                DeviceChange::Disconnected(info) => self.info(format!("MIDI input disconnected: {}", info.id)),
                DeviceChange::BindingCleared(info) => {
                    self.message = Some(PerformanceStatus::Error(PerformanceError::DeviceVanished(
                        info.id.to_string(),
                    )));
                }
            }
        }
    }

    // ── MIDI ───────────────────────────────────────────────────────

    /// Request MIDI access; binds the first input when configured to.
    pub fn enable_midi(&mut self) -> Result<(), PerformanceError> {
        let enabled = self.midi.enable();
        self.report(enabled)?;
        self.last_hotplug = None;

        let count = self.midi.inputs().len();
        if self.auto_connect_first {
            let selected = self.midi.select_first();
            if let Some(id) = self.report(selected)? {
                self.info(format!("MIDI enabled, listening to {}", id));
                return Ok(());
            }
        }
        self.info(format!("MIDI enabled, {} input(s)", count));
        Ok(())
    }

    pub fn disable_midi(&mut self) {
        self.midi.disable();
        self.info("MIDI disabled");
    }

    pub fn midi_status(&self) -> &MidiStatus {
        self.midi.status()
    }

    pub fn select_midi_input(&mut self, id: &MidiDeviceId) -> Result<(), PerformanceError> {
        let selected = self.midi.select_input(id);
        self.report(selected)?;
        self.info(format!("Listening to {}", id));
        Ok(())
    }

    /// Cycle to the next visible input.
    pub fn next_midi_input(&mut self) -> Result<Option<MidiDeviceId>, PerformanceError> {
        let selected = self.midi.select_next();
        let selected = self.report(selected)?;
        if let Some(id) = &selected {
            self.info(format!("Listening to {}", id));
        }
        Ok(selected)
    }

    pub fn clear_midi_input(&mut self) {
        self.midi.clear_selection();
    }

    // ── Recording ──────────────────────────────────────────────────

    pub fn start_recording(&mut self) -> Result<StartOutcome, PerformanceError> {
        let mode = self.state.recording_mode();
        let started = self.recorder.start(
            mode,
            RecordingContext {
                backend: self.backend.as_ref(),
                router: &self.router,
                activation: &mut self.activation,
                state: &mut self.state,
                microphone: self.microphone.as_ref(),
                store: &self.store,
            },
        );
        let outcome = self.report(started)?;
        if outcome == StartOutcome::Started {
            self.message = None;
        }
        Ok(outcome)
    }

    pub fn stop_recording(&mut self) -> Result<StopOutcome, PerformanceError> {
        let stopped = self.recorder.stop(RecordingContext {
            backend: self.backend.as_ref(),
            router: &self.router,
            activation: &mut self.activation,
            state: &mut self.state,
            microphone: self.microphone.as_ref(),
            store: &self.store,
        });
        let outcome = self.report(stopped)?;
        match outcome {
            StopOutcome::Saved(id) => self.info(format!("Take {} saved", id)),
            StopOutcome::Pending(id) => self.info(format!("Finishing take {}...", id)),
            StopOutcome::NotRecording => {}
        }
        Ok(outcome)
    }

    pub fn toggle_recording(&mut self) -> Result<(), PerformanceError> {
        if self.recorder.is_capturing() {
            self.stop_recording().map(|_| ())
        } else {
            self.start_recording().map(|_| ())
        }
    }

    // ── Takes ──────────────────────────────────────────────────────

    /// Play a take from the start, replacing any playback of it already running.
    pub fn preview_take(&mut self, id: TakeId) -> Result<(), PerformanceError> {
        let Some(take) = self.recorder.take(id) else {
            return Ok(());
        };
        let (path, looping) = (take.resource.path.clone(), take.is_looping);

        let result = self.activation.ensure(self.backend.as_ref()).and_then(|()| {
            self.state.set_armed(true);
            if let Some(player) = self.players.remove(&id) {
                self.backend.stop_take(player)?;
            }
            let player = self.backend.play_take(&path, looping)?;
            self.players.insert(id, player);
            Ok(())
        });
        self.report(result)
    }

    /// Flip looping; a take already playing picks the change up.
    pub fn toggle_loop(&mut self, id: TakeId) -> Result<Option<bool>, PerformanceError> {
        let Some(looping) = self.recorder.toggle_loop(id) else {
            return Ok(None);
        };
        if let Some(&player) = self.players.get(&id) {
            let result = self.backend.set_take_looping(player, looping).map_err(PerformanceError::from);
            self.report(result)?;
        }
        Ok(Some(looping))
    }

    pub fn delete_take(&mut self, id: TakeId) -> Result<bool, PerformanceError> {
        if let Some(player) = self.players.remove(&id) {
            if let Err(e) = self.backend.stop_take(player) {
                log::warn!(target: "performance", "failed to stop take {}: {}", id, e);
            }
        }
        let deleted = self.recorder.delete(id, &self.store);
        let deleted = self.report(deleted)?;
        if deleted {
            self.info(format!("Take {} deleted", id));
        }
        Ok(deleted)
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Stop everything, free every engine node and remove the session's take
    /// files. Safe to call twice.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.recorder
            .cancel(self.backend.as_ref(), &self.router, &mut self.state);
        for (_, player) in self.players.drain() {
            let _ = self.backend.stop_take(player);
        }
        let released = self.recorder.release_all(&self.store);
        log::debug!(target: "performance", "released {} take file(s)", released);
        self.midi.disable();
        self.router.release(self.backend.as_ref());
        self.registry.release(self.backend.as_ref());
        log::info!(target: "performance", "shut down");
    }
}

impl Drop for Performance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

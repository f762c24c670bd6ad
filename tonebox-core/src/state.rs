//! Process-wide performance state with change notification.

use crossbeam_channel::{Receiver, Sender};

use tonebox_types::{Controls, InstrumentKind, RecordingMode};

/// Published to every subscriber after a field actually changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateChange {
    Instrument(InstrumentKind),
    Controls(Controls),
    RecordingMode(RecordingMode),
    Armed(bool),
    Recording(bool),
}

/// Selected instrument, continuous controls, recording mode and the two flags.
///
/// Owned by `Performance`; the other components get it by reference for the
/// duration of one handler. `is_recording` is only written by the recording
/// path so it always mirrors a live capture session.
pub struct PerformanceState {
    selected_instrument: InstrumentKind,
    controls: Controls,
    recording_mode: RecordingMode,
    is_armed: bool,
    is_recording: bool,
    subscribers: Vec<Sender<StateChange>>,
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new(InstrumentKind::default(), Controls::default(), RecordingMode::default())
    }
}

impl PerformanceState {
    pub fn new(instrument: InstrumentKind, controls: Controls, recording_mode: RecordingMode) -> Self {
        Self {
            selected_instrument: instrument,
            controls: controls.clamped(),
            recording_mode,
            is_armed: false,
            is_recording: false,
            subscribers: Vec::new(),
        }
    }

    pub fn selected_instrument(&self) -> InstrumentKind {
        self.selected_instrument
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn recording_mode(&self) -> RecordingMode {
        self.recording_mode
    }

    pub fn is_armed(&self) -> bool {
        self.is_armed
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Receive every subsequent change. Dropped receivers are pruned lazily.
    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, change: StateChange) {
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    pub fn select_instrument(&mut self, kind: InstrumentKind) -> bool {
        if self.selected_instrument == kind {
            return false;
        }
        self.selected_instrument = kind;
        self.publish(StateChange::Instrument(kind));
        true
    }

    /// Replace all three controls (clamped). Returns whether anything changed.
    pub fn set_controls(&mut self, controls: Controls) -> bool {
        let controls = controls.clamped();
        if self.controls == controls {
            return false;
        }
        self.controls = controls;
        self.publish(StateChange::Controls(controls));
        true
    }

    pub fn set_volume(&mut self, volume: f32) -> bool {
        self.set_controls(Controls { volume, ..self.controls })
    }

    pub fn set_tone(&mut self, tone: f32) -> bool {
        self.set_controls(Controls { tone, ..self.controls })
    }

    pub fn set_effect(&mut self, effect: f32) -> bool {
        self.set_controls(Controls { effect, ..self.controls })
    }

    pub fn set_recording_mode(&mut self, mode: RecordingMode) -> bool {
        if self.recording_mode == mode {
            return false;
        }
        self.recording_mode = mode;
        self.publish(StateChange::RecordingMode(mode));
        true
    }

    pub(crate) fn set_armed(&mut self, armed: bool) {
        if self.is_armed != armed {
            self.is_armed = armed;
            self.publish(StateChange::Armed(armed));
        }
    }

    pub(crate) fn set_recording(&mut self, recording: bool) {
        if self.is_recording != recording {
            self.is_recording = recording;
            self.publish(StateChange::Recording(recording));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let state = PerformanceState::default();
        assert_eq!(state.selected_instrument(), InstrumentKind::Synth);
        assert_eq!(state.controls(), Controls::new(0.5, 0.5, 0.5));
        assert_eq!(state.recording_mode(), RecordingMode::Instrument);
        assert!(!state.is_armed());
        assert!(!state.is_recording());
    }

    #[test]
    fn subscribers_see_changes_only() {
        let mut state = PerformanceState::default();
        let rx = state.subscribe();
        assert!(state.select_instrument(InstrumentKind::Drums));
        assert!(!state.select_instrument(InstrumentKind::Drums));
        state.set_volume(2.0);

        assert_eq!(rx.try_recv().unwrap(), StateChange::Instrument(InstrumentKind::Drums));
        match rx.try_recv().unwrap() {
            StateChange::Controls(c) => assert_eq!(c.volume, 1.0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let mut state = PerformanceState::default();
        drop(state.subscribe());
        state.set_recording_mode(RecordingMode::Voice);
        assert!(state.subscribers.is_empty());
    }
}

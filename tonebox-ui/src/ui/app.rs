use crossbeam_channel::Receiver;

use tonebox_core::state::StateChange;
use tonebox_core::Performance;
use tonebox_types::NoteSource;

use super::keys::{pad_note, UiCommand};

/// Screen-side state around the controller: which take is highlighted.
pub struct App {
    pub perf: Performance,
    pub selected_take: usize,
    changes: Receiver<StateChange>,
}

impl App {
    pub fn new(mut perf: Performance) -> Self {
        let changes = perf.subscribe();
        Self {
            perf,
            selected_take: 0,
            changes,
        }
    }

    /// Apply one command. Returns false to quit.
    ///
    /// Failures are already on the status line, so results are dropped here.
    pub fn apply(&mut self, cmd: UiCommand) -> bool {
        let controls = self.perf.state().controls();
        match cmd {
            UiCommand::SelectInstrument(kind) => self.perf.select_instrument(kind),
            UiCommand::Pad(pad) => {
                let instrument = self.perf.state().selected_instrument();
                let drum_notes = self.perf.dispatcher().drum_map(NoteSource::Ui).notes();
                if let Some(note) = pad_note(pad, instrument, &drum_notes) {
                    let _ = self.perf.play_note(note);
                }
            }
            UiCommand::Volume(step) => {
                let _ = self.perf.set_volume(controls.volume + step);
            }
            UiCommand::Tone(step) => {
                let _ = self.perf.set_tone(controls.tone + step);
            }
            UiCommand::Effect(step) => {
                let _ = self.perf.set_effect(controls.effect + step);
            }
            UiCommand::ToggleRecordingMode => {
                let mode = self.perf.state().recording_mode().toggled();
                self.perf.set_recording_mode(mode);
            }
            UiCommand::ToggleRecording => {
                let _ = self.perf.toggle_recording();
            }
            UiCommand::PrevTake => self.selected_take = self.selected_take.saturating_sub(1),
            UiCommand::NextTake => {
                let last = self.perf.takes().len().saturating_sub(1);
                self.selected_take = (self.selected_take + 1).min(last);
            }
            UiCommand::PreviewTake => {
                if let Some(id) = self.selected_take_id() {
                    let _ = self.perf.preview_take(id);
                }
            }
            UiCommand::ToggleLoop => {
                if let Some(id) = self.selected_take_id() {
                    let _ = self.perf.toggle_loop(id);
                }
            }
            UiCommand::DeleteTake => {
                if let Some(id) = self.selected_take_id() {
                    let _ = self.perf.delete_take(id);
                }
                self.clamp_selection();
            }
            UiCommand::EnableMidi => {
                let _ = self.perf.enable_midi();
            }
            UiCommand::NextMidiInput => {
                let _ = self.perf.next_midi_input();
            }
            UiCommand::RetryEngine => {
                let _ = self.perf.retry_activation();
            }
            UiCommand::Quit => return false,
        }
        for change in self.changes.try_iter() {
            log::debug!(target: "ui", "{:?}", change);
        }
        true
    }

    fn selected_take_id(&self) -> Option<tonebox_types::TakeId> {
        self.perf.takes().get(self.selected_take).map(|t| t.id)
    }

    pub fn clamp_selection(&mut self) {
        let len = self.perf.takes().len();
        if self.selected_take >= len {
            self.selected_take = len.saturating_sub(1);
        }
    }
}

//! Key bindings for the performance screen.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use tonebox_types::{InstrumentKind, NoteId};

/// Control change per key press.
pub const CONTROL_STEP: f32 = 0.05;

/// Home-row keys, left to right.
pub const PAD_KEYS: [char; 8] = ['a', 's', 'd', 'f', 'g', 'h', 'j', 'k'];

/// C4 D4 E4 F4 G4 A4 B4 C5
const WHITE_KEYS: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiCommand {
    SelectInstrument(InstrumentKind),
    Pad(usize),
    Volume(f32),
    Tone(f32),
    Effect(f32),
    ToggleRecordingMode,
    ToggleRecording,
    PrevTake,
    NextTake,
    PreviewTake,
    ToggleLoop,
    DeleteTake,
    EnableMidi,
    NextMidiInput,
    RetryEngine,
    Quit,
}

pub fn command_for(key: KeyEvent) -> Option<UiCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UiCommand::Quit);
    }
    let cmd = match key.code {
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            UiCommand::SelectInstrument(InstrumentKind::ALL[index])
        }
        KeyCode::Char(c) if PAD_KEYS.contains(&c) => {
            UiCommand::Pad(PAD_KEYS.iter().position(|k| *k == c)?)
        }
        KeyCode::Char('[') => UiCommand::Volume(-CONTROL_STEP),
        KeyCode::Char(']') => UiCommand::Volume(CONTROL_STEP),
        KeyCode::Char('-') => UiCommand::Tone(-CONTROL_STEP),
        KeyCode::Char('=') => UiCommand::Tone(CONTROL_STEP),
        KeyCode::Char(';') => UiCommand::Effect(-CONTROL_STEP),
        KeyCode::Char('\'') => UiCommand::Effect(CONTROL_STEP),
        KeyCode::Char('m') => UiCommand::ToggleRecordingMode,
        KeyCode::Char('r') => UiCommand::ToggleRecording,
        KeyCode::Up => UiCommand::PrevTake,
        KeyCode::Down => UiCommand::NextTake,
        KeyCode::Char('p') => UiCommand::PreviewTake,
        KeyCode::Char('l') => UiCommand::ToggleLoop,
        KeyCode::Char('x') => UiCommand::DeleteTake,
        KeyCode::Char('i') => UiCommand::EnableMidi,
        KeyCode::Char('n') => UiCommand::NextMidiInput,
        KeyCode::Char('u') => UiCommand::RetryEngine,
        KeyCode::Esc | KeyCode::Char('q') => UiCommand::Quit,
        _ => return None,
    };
    Some(cmd)
}

/// The note a pad plays: a white key for melodic instruments, the pad's
/// entry in the drum table for drums.
pub fn pad_note(pad: usize, instrument: InstrumentKind, drum_notes: &[NoteId]) -> Option<NoteId> {
    if instrument.is_drums() {
        drum_notes.get(pad).copied()
    } else {
        WHITE_KEYS.get(pad).and_then(|&midi| NoteId::from_midi(midi))
    }
}

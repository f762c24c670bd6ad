use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch written as note name + octave, e.g. `C4` or `F#2`.
///
/// The on-screen keyboard and MIDI input share this identifier space.
/// MIDI note 60 is `C4` (middle C), MIDI note 0 is `C-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteId {
    midi: u8,
}

impl NoteId {
    /// Build from a MIDI note number. Returns None above 127.
    pub fn from_midi(midi: u8) -> Option<Self> {
        (midi <= 127).then_some(Self { midi })
    }

    pub fn midi(self) -> u8 {
        self.midi
    }

    /// Octave in scientific pitch notation (C4 = middle C).
    pub fn octave(self) -> i8 {
        (self.midi / 12) as i8 - 1
    }

    /// Sharp-spelled note name without octave ("C#").
    pub fn name(self) -> &'static str {
        NOTE_NAMES[(self.midi % 12) as usize]
    }

    /// Equal-tempered frequency with A4 = 440 Hz.
    pub fn frequency(self) -> f32 {
        440.0 * 2.0_f32.powf((self.midi as f32 - 69.0) / 12.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave())
    }
}

/// Error returned when a note string like "H4" or "C12" cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteParseError(pub String);

impl fmt::Display for NoteParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid note '{}'", self.0)
    }
}

impl std::error::Error for NoteParseError {}

impl FromStr for NoteId {
    type Err = NoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NoteParseError(s.to_string());
        let mut chars = s.trim().chars();

        let pitch_class: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(err()),
        };

        let rest: String = chars.collect();
        let (accidental, octave_str) = if let Some(r) = rest.strip_prefix('#') {
            (1, r)
        } else if let Some(r) = rest.strip_prefix('b') {
            (-1, r)
        } else {
            (0, rest.as_str())
        };

        let octave: i32 = octave_str.parse().map_err(|_| err())?;
        let midi = (octave + 1) * 12 + pitch_class + accidental;
        if !(0..=127).contains(&midi) {
            return Err(err());
        }
        Ok(Self { midi: midi as u8 })
    }
}

impl TryFrom<String> for NoteId {
    type Error = NoteParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteId> for String {
    fn from(note: NoteId) -> Self {
        note.to_string()
    }
}

//! # tonebox-types
//!
//! Shared type definitions for the tonebox workspace.
//! These are plain values passed between tonebox-audio, tonebox-core and the terminal front-end.

mod instrument;
mod midi;
mod note;
mod take;
mod voice;

pub use instrument::{Controls, DrumVoice, InstrumentKind, NoteSource, RecordingMode};
pub use midi::{MidiDeviceId, MidiDeviceInfo};
pub use note::{NoteId, NoteParseError};
pub use take::{Take, TakeResource};
pub use voice::{Articulation, DrumHit, VoiceKind, VoiceSource};

/// Identifier of a node in the synthesis graph (voices, filter, effect-send, capture tap, take players).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a recorded take. Assigned in recording order and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TakeId(u32);

impl TakeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TakeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

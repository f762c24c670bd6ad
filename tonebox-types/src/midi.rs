use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a MIDI input within one session.
///
/// Derived from the port name; a repeated name gets a ` #2`, ` #3`... suffix
/// in discovery order so ids stay unique.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MidiDeviceId(String);

impl MidiDeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MidiDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A MIDI input visible to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiDeviceInfo {
    pub id: MidiDeviceId,
    pub name: String,
}

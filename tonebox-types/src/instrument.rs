use serde::{Deserialize, Serialize};

/// The performer-selectable instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Synth,
    Strings,
    Organ,
    Drums,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 4] = [
        InstrumentKind::Synth,
        InstrumentKind::Strings,
        InstrumentKind::Organ,
        InstrumentKind::Drums,
    ];

    /// Instruments backed by a single pitched voice.
    pub const MELODIC: [InstrumentKind; 3] = [
        InstrumentKind::Synth,
        InstrumentKind::Strings,
        InstrumentKind::Organ,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InstrumentKind::Synth => "synth",
            InstrumentKind::Strings => "strings",
            InstrumentKind::Organ => "organ",
            InstrumentKind::Drums => "drums",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InstrumentKind::Synth => "Synth",
            InstrumentKind::Strings => "Strings",
            InstrumentKind::Organ => "Organ",
            InstrumentKind::Drums => "Drums",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn is_drums(self) -> bool {
        self == InstrumentKind::Drums
    }
}

/// The four voices of the drum kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumVoice {
    Kick,
    Snare,
    HiHat,
    Clap,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; 4] = [
        DrumVoice::Kick,
        DrumVoice::Snare,
        DrumVoice::HiHat,
        DrumVoice::Clap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DrumVoice::Kick => "kick",
            DrumVoice::Snare => "snare",
            DrumVoice::HiHat => "hihat",
            DrumVoice::Clap => "clap",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Where a note trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteSource {
    Ui,
    Midi,
}

/// What a recording session captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// The internal mix, taken from the shared capture tap.
    #[default]
    Instrument,
    /// Live microphone input.
    Voice,
}

impl RecordingMode {
    pub fn name(self) -> &'static str {
        match self {
            RecordingMode::Instrument => "instrument",
            RecordingMode::Voice => "voice",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "instrument" => Some(RecordingMode::Instrument),
            "voice" => Some(RecordingMode::Voice),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            RecordingMode::Instrument => RecordingMode::Voice,
            RecordingMode::Voice => RecordingMode::Instrument,
        }
    }
}

/// The three continuous performance controls, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    pub volume: f32,
    pub tone: f32,
    pub effect: f32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            volume: 0.5,
            tone: 0.5,
            effect: 0.5,
        }
    }
}

impl Controls {
    pub fn new(volume: f32, tone: f32, effect: f32) -> Self {
        Self { volume, tone, effect }.clamped()
    }

    /// Clamp every control into `[0, 1]`. NaN becomes 0.
    pub fn clamped(self) -> Self {
        Self {
            volume: clamp_unit(self.volume),
            tone: clamp_unit(self.tone),
            effect: clamp_unit(self.effect),
        }
    }
}

pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

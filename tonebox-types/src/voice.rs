use serde::{Deserialize, Serialize};

use crate::instrument::clamp_unit;
use crate::{DrumVoice, InstrumentKind, NoteId};

/// How a voice is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceKind {
    /// Oscillator voice triggered with note + duration.
    Melodic,
    /// Sample-playback voice triggered with note + duration.
    Sampled,
    /// Percussive voice started immediately; hits may overlap.
    OneShot,
}

/// Sound source the synthesis engine builds for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceSource {
    PolySynth,
    StringSampler,
    FmOrgan,
    Membrane,
    WhiteNoise,
    Metal,
    PinkNoise,
}

impl VoiceSource {
    pub fn kind(self) -> VoiceKind {
        match self {
            VoiceSource::PolySynth | VoiceSource::FmOrgan => VoiceKind::Melodic,
            VoiceSource::StringSampler => VoiceKind::Sampled,
            VoiceSource::Membrane
            | VoiceSource::WhiteNoise
            | VoiceSource::Metal
            | VoiceSource::PinkNoise => VoiceKind::OneShot,
        }
    }

    /// Source for a melodic instrument. Drums have no single source.
    pub fn for_instrument(kind: InstrumentKind) -> Option<Self> {
        match kind {
            InstrumentKind::Synth => Some(VoiceSource::PolySynth),
            InstrumentKind::Strings => Some(VoiceSource::StringSampler),
            InstrumentKind::Organ => Some(VoiceSource::FmOrgan),
            InstrumentKind::Drums => None,
        }
    }

    pub fn for_drum(drum: DrumVoice) -> Self {
        match drum {
            DrumVoice::Kick => VoiceSource::Membrane,
            DrumVoice::Snare => VoiceSource::WhiteNoise,
            DrumVoice::HiHat => VoiceSource::Metal,
            DrumVoice::Clap => VoiceSource::PinkNoise,
        }
    }
}

/// Default note length and velocity used when a voice is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Articulation {
    pub duration_secs: f32,
    pub velocity: f32,
}

impl Articulation {
    pub fn new(duration_secs: f32, velocity: f32) -> Self {
        Self {
            duration_secs: duration_secs.max(0.0),
            velocity: clamp_unit(velocity),
        }
    }
}

/// One entry of a drum note table: which drum to hit and how.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub voice: DrumVoice,
    /// Tuned pitch for pitched drums (the kick); None uses the voice's own pitch.
    pub pitch: Option<NoteId>,
    pub duration_secs: f32,
    pub velocity: f32,
}

impl DrumHit {
    pub fn new(voice: DrumVoice, duration_secs: f32, velocity: f32) -> Self {
        Self {
            voice,
            pitch: None,
            duration_secs: duration_secs.max(0.0),
            velocity: clamp_unit(velocity),
        }
    }

    pub fn pitched(mut self, pitch: NoteId) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

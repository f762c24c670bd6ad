use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use tonebox_types::{Articulation, Controls, DrumHit, DrumVoice, InstrumentKind, NoteId, RecordingMode};

use crate::dispatch::DrumMap;
use crate::error::PerformanceError;
use crate::registry::VoiceSettings;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    articulation: BTreeMap<String, ArticulationConfig>,
    #[serde(default)]
    drums: DrumsConfig,
    #[serde(default)]
    midi: MidiConfig,
    #[serde(default)]
    recording: RecordingConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    instrument: Option<String>,
    volume: Option<f32>,
    tone: Option<f32>,
    effect: Option<f32>,
    recording_mode: Option<String>,
}

#[derive(Deserialize, Default, Clone, Copy)]
struct ArticulationConfig {
    duration_secs: Option<f32>,
    velocity: Option<f32>,
}

#[derive(Deserialize, Default)]
struct DrumsConfig {
    ui: Option<BTreeMap<String, DrumHitConfig>>,
    midi: Option<BTreeMap<String, DrumHitConfig>>,
}

#[derive(Deserialize, Clone)]
struct DrumHitConfig {
    voice: String,
    pitch: Option<String>,
    duration_secs: Option<f32>,
    velocity: Option<f32>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    client_name: Option<String>,
    auto_connect_first: Option<bool>,
    hotplug_poll_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RecordingConfig {
    takes_dir: Option<PathBuf>,
}

/// MIDI subsystem settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiSettings {
    pub client_name: String,
    /// Bind the first discovered input right after enabling.
    pub auto_connect_first: bool,
    /// How often the host polls for hot-plugged devices.
    pub hotplug_poll: Duration,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            client_name: "tonebox".to_string(),
            auto_connect_first: true,
            hotplug_poll: Duration::from_millis(1000),
        }
    }
}

/// Validated runtime settings derived from a `Config`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub instrument: InstrumentKind,
    pub controls: Controls,
    pub recording_mode: RecordingMode,
    pub voices: VoiceSettings,
    pub ui_drums: DrumMap,
    pub midi_drums: DrumMap,
    pub midi: MidiSettings,
    pub takes_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instrument: InstrumentKind::default(),
            controls: Controls::default(),
            recording_mode: RecordingMode::default(),
            voices: VoiceSettings::default(),
            ui_drums: DrumMap::default_ui(),
            midi_drums: DrumMap::default_midi(),
            midi: MidiSettings::default(),
            takes_dir: default_takes_dir(),
        }
    }
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        let mut base = embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config { file: base }
    }

    /// Embedded defaults merged with the given TOML text.
    pub fn with_overrides(text: &str) -> Result<Self, PerformanceError> {
        let user: ConfigFile =
            toml::from_str(text).map_err(|e| PerformanceError::Config(e.to_string()))?;
        let mut base = embedded();
        merge(&mut base, user);
        Ok(Config { file: base })
    }

    /// Turn the merged file into runtime settings, rejecting unknown names.
    pub fn settings(&self) -> Result<Settings, PerformanceError> {
        let fallback = Settings::default();
        let d = &self.file.defaults;

        let instrument = match d.instrument.as_deref() {
            Some(name) => InstrumentKind::from_name(name)
                .ok_or_else(|| PerformanceError::Config(format!("unknown instrument '{}'", name)))?,
            None => fallback.instrument,
        };
        let recording_mode = match d.recording_mode.as_deref() {
            Some(name) => RecordingMode::from_name(name)
                .ok_or_else(|| PerformanceError::Config(format!("unknown recording mode '{}'", name)))?,
            None => fallback.recording_mode,
        };
        let controls = Controls::new(
            d.volume.unwrap_or(fallback.controls.volume),
            d.tone.unwrap_or(fallback.controls.tone),
            d.effect.unwrap_or(fallback.controls.effect),
        );

        let mut voices = fallback.voices;
        for (name, art) in &self.file.articulation {
            let kind = InstrumentKind::from_name(name)
                .filter(|k| !k.is_drums())
                .ok_or_else(|| {
                    PerformanceError::Config(format!("no melodic instrument named '{}'", name))
                })?;
            let current = voices.articulation(kind);
            voices.set_articulation(
                kind,
                Articulation::new(
                    art.duration_secs.unwrap_or(current.duration_secs),
                    art.velocity.unwrap_or(current.velocity),
                ),
            );
        }

        let ui_drums = match &self.file.drums.ui {
            Some(table) => parse_drum_table(table)?,
            None => fallback.ui_drums,
        };
        let midi_drums = match &self.file.drums.midi {
            Some(table) => parse_drum_table(table)?,
            None => fallback.midi_drums,
        };

        let m = &self.file.midi;
        let midi = MidiSettings {
            client_name: m
                .client_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(fallback.midi.client_name),
            auto_connect_first: m.auto_connect_first.unwrap_or(fallback.midi.auto_connect_first),
            hotplug_poll: m
                .hotplug_poll_ms
                .map(|ms| Duration::from_millis(ms.clamp(50, 60_000)))
                .unwrap_or(fallback.midi.hotplug_poll),
        };

        Ok(Settings {
            instrument,
            controls,
            recording_mode,
            voices,
            ui_drums,
            midi_drums,
            midi,
            takes_dir: self.file.recording.takes_dir.clone().unwrap_or(fallback.takes_dir),
        })
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "config", "embedded config.toml is invalid: {}", e);
        ConfigFile::default()
    })
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tonebox").join("config.toml"))
}

fn default_takes_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tonebox")
        .join("takes")
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    let d = user.defaults;
    if d.instrument.is_some() {
        base.defaults.instrument = d.instrument;
    }
    if d.volume.is_some() {
        base.defaults.volume = d.volume;
    }
    if d.tone.is_some() {
        base.defaults.tone = d.tone;
    }
    if d.effect.is_some() {
        base.defaults.effect = d.effect;
    }
    if d.recording_mode.is_some() {
        base.defaults.recording_mode = d.recording_mode;
    }

    for (name, art) in user.articulation {
        let entry = base.articulation.entry(name).or_default();
        if art.duration_secs.is_some() {
            entry.duration_secs = art.duration_secs;
        }
        if art.velocity.is_some() {
            entry.velocity = art.velocity;
        }
    }

    if user.drums.ui.is_some() {
        base.drums.ui = user.drums.ui;
    }
    if user.drums.midi.is_some() {
        base.drums.midi = user.drums.midi;
    }

    let m = user.midi;
    if m.client_name.is_some() {
        base.midi.client_name = m.client_name;
    }
    if m.auto_connect_first.is_some() {
        base.midi.auto_connect_first = m.auto_connect_first;
    }
    if m.hotplug_poll_ms.is_some() {
        base.midi.hotplug_poll_ms = m.hotplug_poll_ms;
    }

    if user.recording.takes_dir.is_some() {
        base.recording.takes_dir = user.recording.takes_dir;
    }
}

fn parse_drum_table(table: &BTreeMap<String, DrumHitConfig>) -> Result<DrumMap, PerformanceError> {
    let mut map = DrumMap::new();
    for (note, hit) in table {
        let note: NoteId = note
            .parse()
            .map_err(|e| PerformanceError::Config(format!("drum table: {}", e)))?;
        let voice = DrumVoice::from_name(&hit.voice).ok_or_else(|| {
            PerformanceError::Config(format!("drum table: unknown drum voice '{}'", hit.voice))
        })?;
        let mut parsed = DrumHit::new(
            voice,
            hit.duration_secs.unwrap_or(0.25),
            hit.velocity.unwrap_or(1.0),
        );
        if let Some(pitch) = &hit.pitch {
            let pitch: NoteId = pitch
                .parse()
                .map_err(|e| PerformanceError::Config(format!("drum table: {}", e)))?;
            parsed = parsed.pitched(pitch);
        }
        map.insert(note, parsed);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(s: &str) -> NoteId {
        s.parse().unwrap()
    }

    #[test]
    fn test_embedded_config_matches_builtin_defaults() {
        let settings = Config::with_overrides("").unwrap().settings().unwrap();
        assert_eq!(settings.instrument, InstrumentKind::Synth);
        assert_eq!(settings.controls, Controls::default());
        assert_eq!(settings.recording_mode, RecordingMode::Instrument);
        assert_eq!(settings.ui_drums, DrumMap::default_ui());
        assert_eq!(settings.midi_drums, DrumMap::default_midi());
        assert_eq!(settings.voices, VoiceSettings::default());
        assert_eq!(settings.midi, MidiSettings::default());
    }

    #[test]
    fn test_user_overrides_merge() {
        let config = Config::with_overrides(
            r#"
            [defaults]
            instrument = "organ"
            volume = 0.9

            [articulation.synth]
            velocity = 0.7

            [midi]
            hotplug_poll_ms = 250
            "#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.instrument, InstrumentKind::Organ);
        assert!((settings.controls.volume - 0.9).abs() < f32::EPSILON);
        assert!((settings.controls.tone - 0.5).abs() < f32::EPSILON);
        let synth = settings.voices.articulation(InstrumentKind::Synth);
        assert!((synth.velocity - 0.7).abs() < f32::EPSILON);
        assert!((synth.duration_secs - 0.25).abs() < f32::EPSILON);
        assert_eq!(settings.midi.hotplug_poll, Duration::from_millis(250));
    }

    #[test]
    fn test_user_drum_table_replaces_whole_table() {
        let config = Config::with_overrides(
            r#"
            [drums.midi]
            C1 = { voice = "snare", velocity = 0.3 }
            "#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.midi_drums.len(), 1);
        let hit = settings.midi_drums.get(note("C1")).unwrap();
        assert_eq!(hit.voice, DrumVoice::Snare);
        assert!((hit.velocity - 0.3).abs() < f32::EPSILON);
        // the UI table is untouched
        assert_eq!(settings.ui_drums, DrumMap::default_ui());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let bad_instrument = Config::with_overrides("[defaults]\ninstrument = \"kazoo\"").unwrap();
        assert!(matches!(bad_instrument.settings(), Err(PerformanceError::Config(_))));

        let bad_drum = Config::with_overrides("[drums.ui]\nC4 = { voice = \"cowbell\" }").unwrap();
        assert!(matches!(bad_drum.settings(), Err(PerformanceError::Config(_))));

        let bad_note = Config::with_overrides("[drums.ui]\nH4 = { voice = \"kick\" }").unwrap();
        assert!(matches!(bad_note.settings(), Err(PerformanceError::Config(_))));

        let drums_articulation = Config::with_overrides("[articulation.drums]\nvelocity = 1.0").unwrap();
        assert!(matches!(drums_articulation.settings(), Err(PerformanceError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::with_overrides("[defaults\nvolume = ").is_err());
    }
}

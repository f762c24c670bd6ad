//! Note dispatch: UI keys and MIDI note-ons become voice triggers.

use std::collections::HashMap;

use tonebox_audio::SynthBackend;
use tonebox_types::{DrumHit, DrumVoice, NoteId, NoteSource};

use crate::error::PerformanceError;
use crate::registry::VoiceRegistry;
use crate::state::PerformanceState;

/// One-time engine start. A failure sticks until `retry` is called, so a
/// broken device is reported on every note rather than retried silently.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EngineActivation {
    #[default]
    Inactive,
    Active,
    Failed(String),
}

impl EngineActivation {
    /// Activate on first use. No-op once active; a stored failure is returned as-is.
    pub fn ensure(&mut self, backend: &dyn SynthBackend) -> Result<(), PerformanceError> {
        match self {
            EngineActivation::Active => return Ok(()),
            EngineActivation::Failed(cause) => {
                return Err(PerformanceError::ActivationFailure(cause.clone()))
            }
            EngineActivation::Inactive => {}
        }
        self.attempt(backend)
    }

    /// User-requested fresh attempt, also after a failure.
    pub fn retry(&mut self, backend: &dyn SynthBackend) -> Result<(), PerformanceError> {
        if *self == EngineActivation::Active {
            return Ok(());
        }
        self.attempt(backend)
    }

    fn attempt(&mut self, backend: &dyn SynthBackend) -> Result<(), PerformanceError> {
        match backend.activate() {
            Ok(()) => {
                log::info!(target: "dispatch", "audio engine active");
                *self = EngineActivation::Active;
                Ok(())
            }
            Err(e) => {
                log::error!(target: "dispatch", "audio engine failed to start: {}", e);
                *self = EngineActivation::Failed(e.0.clone());
                Err(PerformanceError::ActivationFailure(e.0))
            }
        }
    }

    pub fn is_active(&self) -> bool {
        *self == EngineActivation::Active
    }
}

/// Note → drum hit table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrumMap {
    hits: HashMap<NoteId, DrumHit>,
}

/// Built-in pad layout starting at `root`: two kicks, two snares, two hats and
/// two claps over one octave of white keys.
fn pad_layout(root: u8) -> DrumMap {
    let tuned = |hit: DrumHit, midi: u8| match NoteId::from_midi(midi) {
        Some(n) => hit.pitched(n),
        None => hit,
    };
    let rows = [
        (0, tuned(DrumHit::new(DrumVoice::Kick, 0.25, 1.0), 24)),
        (2, DrumHit::new(DrumVoice::Snare, 0.25, 1.0)),
        (4, DrumHit::new(DrumVoice::HiHat, 0.0625, 1.0)),
        (5, DrumHit::new(DrumVoice::Clap, 0.25, 1.0)),
        (7, tuned(DrumHit::new(DrumVoice::Kick, 0.25, 1.0), 36)),
        (9, DrumHit::new(DrumVoice::Snare, 0.25, 0.8)),
        (11, DrumHit::new(DrumVoice::HiHat, 0.125, 0.5)),
        (12, DrumHit::new(DrumVoice::Clap, 0.25, 0.6)),
    ];
    let mut map = DrumMap::new();
    for (offset, hit) in rows {
        if let Some(n) = NoteId::from_midi(root + offset) {
            map.insert(n, hit);
        }
    }
    map
}

impl DrumMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The on-screen pads: C4 through C5.
    pub fn default_ui() -> Self {
        pad_layout(60)
    }

    /// The same pads an octave pair lower, C2 through C3, where most
    /// controllers put their drum pads.
    pub fn default_midi() -> Self {
        pad_layout(36)
    }

    pub fn insert(&mut self, note: NoteId, hit: DrumHit) {
        self.hits.insert(note, hit);
    }

    pub fn get(&self, note: NoteId) -> Option<&DrumHit> {
        self.hits.get(&note)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Mapped notes in ascending pitch order.
    pub fn notes(&self) -> Vec<NoteId> {
        let mut notes: Vec<NoteId> = self.hits.keys().copied().collect();
        notes.sort();
        notes
    }
}

/// What a dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Triggered,
    /// The selected instrument has no voice; nothing sounded.
    NoVoice,
    /// Drum note outside the active table; nothing sounded.
    Unmapped,
}

/// Borrowed view of everything a dispatch touches.
pub struct DispatchContext<'a> {
    pub backend: &'a dyn SynthBackend,
    pub registry: &'a VoiceRegistry,
    pub activation: &'a mut EngineActivation,
    pub state: &'a mut PerformanceState,
}

pub struct NoteDispatcher {
    ui_drums: DrumMap,
    midi_drums: DrumMap,
}

impl NoteDispatcher {
    pub fn new(ui_drums: DrumMap, midi_drums: DrumMap) -> Self {
        Self { ui_drums, midi_drums }
    }

    pub fn drum_map(&self, source: NoteSource) -> &DrumMap {
        match source {
            NoteSource::Ui => &self.ui_drums,
            NoteSource::Midi => &self.midi_drums,
        }
    }

    /// Route one note to the voice of the selected instrument.
    ///
    /// `velocity` overrides the melodic articulation default; drum hits always
    /// use their table velocity.
    pub fn dispatch(
        &self,
        note: NoteId,
        source: NoteSource,
        velocity: Option<f32>,
        ctx: DispatchContext<'_>,
    ) -> Result<DispatchOutcome, PerformanceError> {
        ctx.activation.ensure(ctx.backend)?;
        ctx.state.set_armed(true);

        let instrument = ctx.state.selected_instrument();
        if instrument.is_drums() {
            let Some(hit) = self.drum_map(source).get(note) else {
                log::debug!(target: "dispatch", "{} is not a drum pad", note);
                return Ok(DispatchOutcome::Unmapped);
            };
            let Some(voice) = ctx.registry.get_drum_voice(hit.voice) else {
                return Ok(DispatchOutcome::NoVoice);
            };
            ctx.backend
                .trigger_one_shot(voice.node, hit.pitch, hit.duration_secs, hit.velocity)?;
            return Ok(DispatchOutcome::Triggered);
        }

        let Some(voice) = ctx.registry.get_voice(instrument) else {
            return Ok(DispatchOutcome::NoVoice);
        };
        let velocity = velocity
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(voice.articulation.velocity);
        ctx.backend
            .trigger(voice.node, note, voice.articulation.duration_secs, velocity)?;
        Ok(DispatchOutcome::Triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VoiceSettings;
    use tonebox_audio::{TestBackend, TestOp};
    use tonebox_types::InstrumentKind;

    fn note(s: &str) -> NoteId {
        s.parse().unwrap()
    }

    struct Rig {
        backend: TestBackend,
        registry: VoiceRegistry,
        activation: EngineActivation,
        state: PerformanceState,
        dispatcher: NoteDispatcher,
    }

    impl Rig {
        fn new() -> Self {
            let backend = TestBackend::new();
            let registry = VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();
            backend.clear();
            Self {
                backend,
                registry,
                activation: EngineActivation::default(),
                state: PerformanceState::default(),
                dispatcher: NoteDispatcher::new(DrumMap::default_ui(), DrumMap::default_midi()),
            }
        }

        fn play(&mut self, n: &str, source: NoteSource) -> Result<DispatchOutcome, PerformanceError> {
            self.dispatcher.dispatch(
                note(n),
                source,
                None,
                DispatchContext {
                    backend: &self.backend,
                    registry: &self.registry,
                    activation: &mut self.activation,
                    state: &mut self.state,
                },
            )
        }
    }

    #[test]
    fn default_ui_table_matches_pads() {
        let map = DrumMap::default_ui();
        assert_eq!(map.len(), 8);
        let kick = map.get(note("C4")).unwrap();
        assert_eq!(kick.voice, DrumVoice::Kick);
        assert_eq!(kick.pitch, Some(note("C1")));
        assert_eq!(map.get(note("G4")).unwrap().pitch, Some(note("C2")));
        assert_eq!(map.get(note("E4")).unwrap().duration_secs, 0.0625);
        assert_eq!(map.get(note("B4")).unwrap().velocity, 0.5);
        assert_eq!(map.get(note("C5")).unwrap().voice, DrumVoice::Clap);
        assert!(map.get(note("C#4")).is_none());
    }

    #[test]
    fn midi_table_is_independent() {
        let midi = DrumMap::default_midi();
        assert!(midi.get(note("C4")).is_none());
        assert_eq!(midi.get(note("C2")).unwrap().voice, DrumVoice::Kick);
        assert_eq!(midi.notes().first(), Some(&note("C2")));
        assert_eq!(midi.notes().last(), Some(&note("C3")));
    }

    #[test]
    fn melodic_note_triggers_only_its_voice() {
        for kind in InstrumentKind::MELODIC {
            let mut rig = Rig::new();
            rig.state.select_instrument(kind);
            let expected = rig.registry.get_voice(kind).unwrap().node;

            assert_eq!(rig.play("E4", NoteSource::Ui).unwrap(), DispatchOutcome::Triggered);
            assert_eq!(rig.backend.trigger_count(), 1);
            assert!(rig
                .backend
                .find(|op| matches!(op, TestOp::Trigger { voice, .. } if *voice == expected))
                .is_some());
        }
    }

    #[test]
    fn strings_sustain_longer_than_synth() {
        let mut rig = Rig::new();
        rig.play("C4", NoteSource::Ui).unwrap();
        rig.state.select_instrument(InstrumentKind::Strings);
        rig.play("C4", NoteSource::Ui).unwrap();

        let durations: Vec<f32> = rig
            .backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                TestOp::Trigger { duration_secs, .. } => Some(duration_secs),
                _ => None,
            })
            .collect();
        assert_eq!(durations.len(), 2);
        assert!(durations[1] > durations[0]);
    }

    #[test]
    fn unmapped_drum_notes_make_no_sound() {
        let mut rig = Rig::new();
        rig.state.select_instrument(InstrumentKind::Drums);
        for n in ["C#4", "D#2", "D5", "A0"] {
            assert_eq!(rig.play(n, NoteSource::Ui).unwrap(), DispatchOutcome::Unmapped);
            assert_eq!(rig.play(n, NoteSource::Midi).unwrap(), DispatchOutcome::Unmapped);
        }
        assert_eq!(rig.backend.trigger_count(), 0);
    }

    #[test]
    fn drum_hits_overlap_on_one_voice() {
        let mut rig = Rig::new();
        rig.state.select_instrument(InstrumentKind::Drums);
        rig.play("D4", NoteSource::Ui).unwrap();
        rig.play("D4", NoteSource::Ui).unwrap();
        rig.play("A4", NoteSource::Ui).unwrap();

        let snare = rig.registry.get_drum_voice(DrumVoice::Snare).unwrap().node;
        let hits = rig
            .backend
            .count(|op| matches!(op, TestOp::TriggerOneShot { voice, .. } if *voice == snare));
        assert_eq!(hits, 3);
        assert_eq!(rig.backend.count(|op| matches!(op, TestOp::CreateVoice { .. })), 0);
    }

    #[test]
    fn supplied_velocity_overrides_default() {
        let mut rig = Rig::new();
        rig.dispatcher
            .dispatch(
                note("A4"),
                NoteSource::Midi,
                Some(0.4),
                DispatchContext {
                    backend: &rig.backend,
                    registry: &rig.registry,
                    activation: &mut rig.activation,
                    state: &mut rig.state,
                },
            )
            .unwrap();
        assert!(rig
            .backend
            .find(|op| matches!(op, TestOp::Trigger { velocity, .. } if (*velocity - 0.4).abs() < 1e-6))
            .is_some());
    }

    #[test]
    fn first_trigger_activates_once_and_arms() {
        let mut rig = Rig::new();
        assert!(!rig.state.is_armed());
        rig.play("C4", NoteSource::Ui).unwrap();
        rig.play("D4", NoteSource::Ui).unwrap();
        assert!(rig.state.is_armed());
        assert_eq!(rig.backend.count(|op| matches!(op, TestOp::Activate)), 1);
    }

    #[test]
    fn activation_failure_is_sticky_until_retry() {
        let mut rig = Rig::new();
        rig.backend.fail_activation(true);
        assert!(matches!(
            rig.play("C4", NoteSource::Ui),
            Err(PerformanceError::ActivationFailure(_))
        ));
        rig.backend.fail_activation(false);
        // not retried behind the user's back
        assert!(rig.play("C4", NoteSource::Ui).is_err());
        assert_eq!(rig.backend.count(|op| matches!(op, TestOp::Activate)), 1);
        assert_eq!(rig.backend.trigger_count(), 0);
        assert!(!rig.state.is_armed());

        rig.activation.retry(&rig.backend).unwrap();
        assert_eq!(rig.play("C4", NoteSource::Ui).unwrap(), DispatchOutcome::Triggered);
    }
}

//! One voice per melodic instrument and per drum, built once at startup.

use std::collections::HashMap;

use tonebox_audio::SynthBackend;
use tonebox_types::{Articulation, DrumVoice, InstrumentKind, NodeId, VoiceKind, VoiceSource};

use crate::error::PerformanceError;

/// A constructed voice. Its output is dry until the router wires it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub node: NodeId,
    pub source: VoiceSource,
    pub kind: VoiceKind,
    pub articulation: Articulation,
}

/// Default articulation per melodic instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    articulation: HashMap<InstrumentKind, Articulation>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        let mut articulation = HashMap::new();
        articulation.insert(InstrumentKind::Synth, Articulation::new(0.25, 1.0));
        articulation.insert(InstrumentKind::Strings, Articulation::new(1.0, 1.0));
        articulation.insert(InstrumentKind::Organ, Articulation::new(1.0, 1.0));
        Self { articulation }
    }
}

impl VoiceSettings {
    pub fn articulation(&self, kind: InstrumentKind) -> Articulation {
        self.articulation
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Articulation::new(0.25, 1.0))
    }

    pub fn set_articulation(&mut self, kind: InstrumentKind, articulation: Articulation) {
        self.articulation.insert(kind, articulation);
    }
}

pub struct VoiceRegistry {
    melodic: Vec<(InstrumentKind, Voice)>,
    drums: Vec<(DrumVoice, Voice)>,
}

impl VoiceRegistry {
    /// Construct every voice exactly once. Any backend failure aborts the build
    /// and frees whatever was already created.
    pub fn build(backend: &dyn SynthBackend, settings: &VoiceSettings) -> Result<Self, PerformanceError> {
        let mut registry = Self {
            melodic: Vec::new(),
            drums: Vec::new(),
        };

        for kind in InstrumentKind::MELODIC {
            let Some(source) = VoiceSource::for_instrument(kind) else {
                continue;
            };
            match backend.create_voice(source) {
                Ok(node) => registry.melodic.push((
                    kind,
                    Voice {
                        node,
                        source,
                        kind: source.kind(),
                        articulation: settings.articulation(kind),
                    },
                )),
                Err(e) => {
                    registry.release(backend);
                    return Err(e.into());
                }
            }
        }

        for drum in DrumVoice::ALL {
            let source = VoiceSource::for_drum(drum);
            match backend.create_voice(source) {
                Ok(node) => registry.drums.push((
                    drum,
                    Voice {
                        node,
                        source,
                        kind: source.kind(),
                        articulation: Articulation::new(0.25, 1.0),
                    },
                )),
                Err(e) => {
                    registry.release(backend);
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            target: "registry",
            "built {} melodic and {} drum voices",
            registry.melodic.len(),
            registry.drums.len()
        );
        Ok(registry)
    }

    /// Voice for a melodic instrument. Drums have no single voice.
    pub fn get_voice(&self, kind: InstrumentKind) -> Option<&Voice> {
        self.melodic.iter().find(|(k, _)| *k == kind).map(|(_, v)| v)
    }

    pub fn get_drum_voice(&self, drum: DrumVoice) -> Option<&Voice> {
        self.drums.iter().find(|(d, _)| *d == drum).map(|(_, v)| v)
    }

    /// Every voice, melodic first, in construction order.
    pub fn all_voices(&self) -> Vec<&Voice> {
        self.melodic
            .iter()
            .map(|(_, v)| v)
            .chain(self.drums.iter().map(|(_, v)| v))
            .collect()
    }

    pub fn voice_nodes(&self) -> Vec<NodeId> {
        self.all_voices().into_iter().map(|v| v.node).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.melodic.is_empty() && self.drums.is_empty()
    }

    /// Free every voice node. The registry is empty afterwards.
    pub fn release(&mut self, backend: &dyn SynthBackend) {
        let nodes = self.voice_nodes();
        self.melodic.clear();
        self.drums.clear();
        for node in nodes {
            if let Err(e) = backend.free_node(node) {
                log::warn!(target: "registry", "failed to free voice {}: {}", node, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonebox_audio::{TestBackend, TestOp};

    #[test]
    fn builds_one_voice_per_instrument_and_drum() {
        let backend = TestBackend::new();
        let registry = VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();

        assert_eq!(registry.all_voices().len(), 7);
        assert_eq!(backend.count(|op| matches!(op, TestOp::CreateVoice { .. })), 7);
        assert!(registry.get_voice(InstrumentKind::Drums).is_none());

        let organ = registry.get_voice(InstrumentKind::Organ).unwrap();
        assert_eq!(organ.source, VoiceSource::FmOrgan);
        assert_eq!(organ.kind, VoiceKind::Melodic);

        let strings = registry.get_voice(InstrumentKind::Strings).unwrap();
        assert_eq!(strings.kind, VoiceKind::Sampled);

        let hat = registry.get_drum_voice(DrumVoice::HiHat).unwrap();
        assert_eq!(hat.source, VoiceSource::Metal);
        assert_eq!(hat.kind, VoiceKind::OneShot);
    }

    #[test]
    fn voices_are_never_pre_wired() {
        let backend = TestBackend::new();
        VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();
        assert!(backend.bundles().is_empty());
    }

    #[test]
    fn lookups_return_the_same_voice() {
        let backend = TestBackend::new();
        let registry = VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();
        let a = registry.get_voice(InstrumentKind::Synth).unwrap().node;
        let b = registry.get_voice(InstrumentKind::Synth).unwrap().node;
        assert_eq!(a, b);
        assert_eq!(backend.count(|op| matches!(op, TestOp::CreateVoice { .. })), 7);
    }

    #[test]
    fn construction_failure_is_an_error() {
        let backend = TestBackend::new();
        backend.fail_voices(true);
        let result = VoiceRegistry::build(&backend, &VoiceSettings::default());
        assert!(matches!(result, Err(PerformanceError::Backend(_))));
    }

    #[test]
    fn release_frees_every_voice() {
        let backend = TestBackend::new();
        let mut registry = VoiceRegistry::build(&backend, &VoiceSettings::default()).unwrap();
        let nodes = registry.voice_nodes();
        registry.release(&backend);
        assert_eq!(backend.nodes_freed(), nodes);
        assert!(registry.is_empty());
    }
}

#![allow(dead_code)]
//! Test harness utilities for tonebox-core integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tonebox_audio::{SharedTestBackend, TestBackend, TestMicrophone, TestOp};
use tonebox_core::config::Settings;
use tonebox_core::midi::TestMidiTransport;
use tonebox_core::Performance;
use tonebox_types::{NodeId, NoteId};

/// A `Performance` wired to test doubles, plus handles to drive and inspect them.
pub struct Harness {
    pub perf: Performance,
    pub backend: Arc<TestBackend>,
    pub midi: TestMidiTransport,
    pub mic: TestMicrophone,
    pub clock: Instant,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Start from default settings with takes in a temp dir, then let the
    /// caller adjust them.
    pub fn with_settings(adjust: impl FnOnce(&mut Settings)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings {
            takes_dir: dir.path().join("takes"),
            ..Settings::default()
        };
        adjust(&mut settings);

        let backend = Arc::new(TestBackend::new());
        let midi = TestMidiTransport::new();
        let mic = TestMicrophone::new();
        let perf = Performance::new(
            settings,
            Box::new(SharedTestBackend(Arc::clone(&backend))),
            Box::new(midi.clone()),
            Box::new(mic.clone()),
        )
        .unwrap();

        Self {
            perf,
            backend,
            midi,
            mic,
            clock: Instant::now(),
            dir,
        }
    }

    /// Advance the fake clock and run one host-loop tick.
    pub fn tick(&mut self, advance: Duration) -> tonebox_core::TickReport {
        self.clock += advance;
        self.perf.tick(self.clock)
    }

    /// Voices that received a trigger (melodic or one-shot), in order.
    pub fn triggered_voices(&self) -> Vec<NodeId> {
        self.backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                TestOp::Trigger { voice, .. } | TestOp::TriggerOneShot { voice, .. } => Some(voice),
                _ => None,
            })
            .collect()
    }

    /// Notes sent to melodic voices, in order.
    pub fn triggered_notes(&self) -> Vec<NoteId> {
        self.backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                TestOp::Trigger { note, .. } => Some(note),
                _ => None,
            })
            .collect()
    }
}

pub fn note(name: &str) -> NoteId {
    name.parse().unwrap()
}

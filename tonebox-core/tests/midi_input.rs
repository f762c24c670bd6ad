mod common;

use std::time::Duration;

use common::{note, Harness};
use tonebox_core::midi::{DeviceChange, MidiStatus};
use tonebox_core::{PerformanceError, PerformanceStatus};
use tonebox_types::InstrumentKind;

fn manual_select() -> Harness {
    Harness::with_settings(|s| s.midi.auto_connect_first = false)
}

#[test]
fn switching_inputs_drops_the_old_one_immediately() {
    let mut h = manual_select();
    let a = h.midi.plug("Keystation");
    let b = h.midi.plug("Launchpad");
    h.perf.enable_midi().unwrap();

    h.perf.select_midi_input(&a).unwrap();
    h.midi.note_on(&a, 60, 100);
    h.perf.select_midi_input(&b).unwrap();
    h.midi.note_on(&a, 62, 100);
    h.midi.note_on(&b, 64, 100);

    let report = h.tick(Duration::ZERO);
    assert_eq!(report.notes_played, 1);
    assert_eq!(h.triggered_notes(), vec![note("E4")]);
    assert_eq!(h.midi.subscribed(), vec![b]);
}

#[test]
fn midi_notes_dispatch_in_arrival_order() {
    let mut h = Harness::new();
    let keys = h.midi.plug("Keys");
    h.perf.enable_midi().unwrap();
    assert_eq!(h.perf.midi().selected(), Some(&keys));

    for n in [67, 60, 64, 72] {
        h.midi.note_on(&keys, n, 90);
    }
    h.midi.note_off(&keys, 67);
    h.tick(Duration::ZERO);
    assert_eq!(
        h.triggered_notes(),
        vec![note("G4"), note("C4"), note("E4"), note("C5")]
    );
}

#[test]
fn midi_drums_use_their_own_table() {
    let mut h = Harness::new();
    let pads = h.midi.plug("Pads");
    h.perf.enable_midi().unwrap();
    h.perf.select_instrument(InstrumentKind::Drums);

    h.midi.note_on(&pads, 36, 127); // C2: kick
    h.midi.note_on(&pads, 60, 127); // C4: a UI pad, not a MIDI one
    let report = h.tick(Duration::ZERO);
    assert_eq!(report.notes_played, 1);
    assert_eq!(h.backend.trigger_count(), 1);
}

#[test]
fn denied_midi_degrades_to_ui_play() {
    let mut h = Harness::new();
    h.midi.deny(true);
    assert!(matches!(h.perf.enable_midi(), Err(PerformanceError::MidiUnavailable(_))));
    assert!(matches!(h.perf.midi_status(), MidiStatus::Failed(_)));
    assert!(h.perf.status().to_string().contains("MIDI unavailable"));

    h.perf.play_note(note("C4")).unwrap();
    assert_eq!(h.backend.trigger_count(), 1);
}

#[test]
fn hotplug_is_polled_at_the_configured_interval() {
    let mut h = Harness::with_settings(|s| s.midi.hotplug_poll = Duration::from_millis(500));
    h.perf.enable_midi().unwrap();
    h.tick(Duration::ZERO);

    let keys = h.midi.plug("Keys");
    assert!(h.tick(Duration::from_millis(100)).device_changes.is_empty());
    let report = h.tick(Duration::from_millis(500));
    assert!(matches!(&report.device_changes[..], [DeviceChange::Connected(d)] if d.id == keys));
    assert_eq!(
        h.perf.status(),
        PerformanceStatus::Info("MIDI input connected: Keys".to_string())
    );
}

#[test]
fn unplugging_the_bound_input_clears_it() {
    let mut h = Harness::new();
    let keys = h.midi.plug("Keys");
    h.perf.enable_midi().unwrap();
    h.tick(Duration::ZERO);

    h.midi.unplug(&keys);
    h.tick(Duration::from_secs(2));
    assert!(h.perf.midi().selected().is_none());
    assert_eq!(
        h.perf.status(),
        PerformanceStatus::Error(PerformanceError::DeviceVanished("Keys".to_string()))
    );

    // replugging lists it again but does not rebind on its own
    let keys = h.midi.plug("Keys");
    h.tick(Duration::from_secs(2));
    assert!(h.perf.midi().inputs().iter().any(|d| d.id == keys));
    assert!(h.perf.midi().selected().is_none());
}

#[test]
fn unplugging_the_first_of_two_twins_clears_the_binding() {
    let mut h = Harness::new();
    let first = h.midi.plug("Keys");
    let second = h.midi.plug("Keys");
    h.perf.enable_midi().unwrap();
    assert_eq!(h.perf.midi().selected(), Some(&first));

    h.midi.unplug(&first);
    let report = h.tick(Duration::from_secs(2));

    assert!(h.perf.midi().selected().is_none());
    assert!(h.midi.subscribed().is_empty());
    let ids: Vec<_> = h.perf.midi().inputs().iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec![second.clone()]);
    assert!(report
        .device_changes
        .iter()
        .any(|c| matches!(c, DeviceChange::Disconnected(info) if info.id == first)));
    assert_eq!(
        h.perf.status(),
        PerformanceStatus::Error(PerformanceError::DeviceVanished(first.to_string()))
    );

    // the survivor keeps its id and can be bound
    h.perf.select_midi_input(&second).unwrap();
    assert!(h.midi.note_on(&second, 60, 100));
    assert_eq!(h.tick(Duration::ZERO).notes_played, 1);
}

#[test]
fn next_input_cycles() {
    let mut h = manual_select();
    let a = h.midi.plug("A");
    let b = h.midi.plug("B");
    h.perf.enable_midi().unwrap();
    assert_eq!(h.perf.next_midi_input().unwrap(), Some(a));
    assert_eq!(h.perf.next_midi_input().unwrap(), Some(b));
    assert_eq!(h.midi.bindings_opened(), 2);
    assert_eq!(h.midi.bindings_closed(), 1);
}

#[test]
fn shutdown_unsubscribes() {
    let mut h = Harness::new();
    let keys = h.midi.plug("Keys");
    h.perf.enable_midi().unwrap();
    h.perf.shutdown();
    assert!(h.midi.subscribed().is_empty());
    assert!(!h.midi.note_on(&keys, 60, 100));
}

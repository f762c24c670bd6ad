mod common;

use std::time::Duration;

use common::{note, Harness};
use tonebox_audio::{CapturedAudio, TestOp};
use tonebox_core::recording::{RecorderState, StartOutcome, StopOutcome};
use tonebox_core::PerformanceError;
use tonebox_types::{RecordingMode, TakeId};

fn record_instrument_take(h: &mut Harness) -> TakeId {
    h.perf.start_recording().unwrap();
    h.perf.play_note(note("C4")).unwrap();
    match h.perf.stop_recording().unwrap() {
        StopOutcome::Saved(id) => id,
        other => panic!("Expected Saved, got {:?}", other),
    }
}

#[test]
fn start_stop_appends_one_take() {
    let mut h = Harness::new();
    h.backend.set_captured_audio(CapturedAudio {
        samples: vec![0.5; 8820],
        sample_rate: 44100,
        channels: 2,
    });

    let id = record_instrument_take(&mut h);
    let takes = h.perf.takes();
    assert_eq!(takes.len(), 1);
    assert_eq!(takes[0].id, id);
    assert!(!takes[0].is_looping);
    assert_eq!(takes[0].resource.channels, 2);
    assert!((takes[0].resource.duration_secs() - 0.1).abs() < 1e-6);

    let reader = hound::WavReader::open(&takes[0].resource.path).unwrap();
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.len(), 8820);

    let id2 = record_instrument_take(&mut h);
    assert_eq!(h.perf.takes().last().unwrap().id, id2);
    assert!(id2 > id);
}

#[test]
fn start_while_capturing_is_a_no_op() {
    let mut h = Harness::new();
    assert_eq!(h.perf.start_recording().unwrap(), StartOutcome::Started);
    h.perf.set_recording_mode(RecordingMode::Voice);
    assert_eq!(h.perf.start_recording().unwrap(), StartOutcome::AlreadyCapturing);

    assert_eq!(h.mic.sessions_opened(), 0);
    assert_eq!(h.backend.count(|op| matches!(op, TestOp::StartCapture(_))), 1);
    assert_eq!(
        h.perf.recorder_state(),
        RecorderState::Capturing(RecordingMode::Instrument)
    );

    // the running capture keeps its mode
    assert!(matches!(h.perf.stop_recording().unwrap(), StopOutcome::Saved(_)));
    assert_eq!(h.perf.takes().len(), 1);
}

#[test]
fn recording_flag_mirrors_capture() {
    let mut h = Harness::new();
    let changes = h.perf.subscribe();
    h.perf.toggle_recording().unwrap();
    assert!(h.perf.state().is_recording());
    h.perf.toggle_recording().unwrap();
    assert!(!h.perf.state().is_recording());

    let recording: Vec<bool> = changes
        .try_iter()
        .filter_map(|c| match c {
            tonebox_core::state::StateChange::Recording(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(recording, vec![true, false]);
}

#[test]
fn instrument_capture_needs_a_tap() {
    let dir = tempfile::tempdir().unwrap();
    let backend = std::sync::Arc::new(tonebox_audio::TestBackend::new());
    backend.fail_capture_tap(true);
    let mut perf = tonebox_core::Performance::new(
        tonebox_core::config::Settings {
            takes_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        Box::new(tonebox_audio::SharedTestBackend(backend.clone())),
        Box::new(tonebox_core::midi::TestMidiTransport::new()),
        Box::new(tonebox_audio::TestMicrophone::new()),
    )
    .unwrap();

    assert_eq!(perf.start_recording(), Err(PerformanceError::CaptureUnavailable));
    assert!(!perf.state().is_recording());
    // playback is unaffected
    perf.play_note(note("C4")).unwrap();
    assert_eq!(backend.trigger_count(), 1);
}

#[test]
fn voice_take_arrives_after_tick() {
    let mut h = Harness::new();
    h.perf.set_recording_mode(RecordingMode::Voice);
    h.perf.start_recording().unwrap();
    assert_eq!(h.mic.sessions_opened(), 1);

    assert_eq!(h.perf.stop_recording().unwrap(), StopOutcome::Pending(TakeId::new(1)));
    assert!(!h.perf.state().is_recording());
    assert!(h.perf.takes().is_empty());

    let report = h.tick(Duration::from_millis(16));
    assert_eq!(report.takes_completed, vec![TakeId::new(1)]);
    assert_eq!(h.perf.takes().len(), 1);
    assert_eq!(h.perf.takes()[0].resource.sample_rate, 48000);
}

#[test]
fn delayed_voice_take_keeps_its_place() {
    let mut h = Harness::new();
    h.mic.hold_completions(true);
    h.perf.set_recording_mode(RecordingMode::Voice);
    h.perf.start_recording().unwrap();
    h.perf.stop_recording().unwrap();

    h.perf.set_recording_mode(RecordingMode::Instrument);
    let later = record_instrument_take(&mut h);

    h.mic.release_held(false);
    h.tick(Duration::from_millis(16));
    let ids: Vec<TakeId> = h.perf.takes().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![TakeId::new(1), later]);
}

#[test]
fn denied_microphone_leaves_instrument_recording_working() {
    let mut h = Harness::new();
    h.mic.deny_access(true);
    h.perf.set_recording_mode(RecordingMode::Voice);
    assert!(matches!(
        h.perf.start_recording(),
        Err(PerformanceError::MicrophoneAccessDenied(_))
    ));
    assert_eq!(h.perf.recorder_state(), RecorderState::Idle);
    assert!(!h.perf.state().is_recording());

    h.perf.set_recording_mode(RecordingMode::Instrument);
    record_instrument_take(&mut h);
    assert_eq!(h.perf.takes().len(), 1);
}

#[test]
fn toggle_loop_twice_restores() {
    let mut h = Harness::new();
    let id = record_instrument_take(&mut h);
    assert_eq!(h.perf.toggle_loop(id).unwrap(), Some(true));
    assert_eq!(h.perf.toggle_loop(id).unwrap(), Some(false));
    assert!(!h.perf.takes()[0].is_looping);
    assert_eq!(h.perf.toggle_loop(TakeId::new(99)).unwrap(), None);
}

#[test]
fn delete_removes_one_and_keeps_order() {
    let mut h = Harness::new();
    let ids: Vec<TakeId> = (0..4).map(|_| record_instrument_take(&mut h)).collect();
    let doomed = h.perf.takes()[1].resource.path.clone();

    assert!(h.perf.delete_take(ids[1]).unwrap());
    assert!(!doomed.exists());
    let left: Vec<TakeId> = h.perf.takes().iter().map(|t| t.id).collect();
    assert_eq!(left, vec![ids[0], ids[2], ids[3]]);
    assert!(!h.perf.delete_take(ids[1]).unwrap());
}

#[test]
fn preview_follows_loop_flag_and_stops_on_delete() {
    let mut h = Harness::new();
    let id = record_instrument_take(&mut h);
    h.perf.toggle_loop(id).unwrap();
    h.backend.clear();

    h.perf.preview_take(id).unwrap();
    let player = match h.backend.find(|op| matches!(op, TestOp::PlayTake { .. })) {
        Some(TestOp::PlayTake { node, looping, .. }) => {
            assert!(looping);
            node
        }
        other => panic!("Expected PlayTake, got {:?}", other),
    };

    h.perf.toggle_loop(id).unwrap();
    assert!(h
        .backend
        .find(|op| *op == TestOp::SetTakeLooping { node: player, looping: false })
        .is_some());

    h.perf.delete_take(id).unwrap();
    assert!(h.backend.find(|op| *op == TestOp::StopTake(player)).is_some());
}

#[test]
fn shutdown_cancels_a_running_voice_capture() {
    let mut h = Harness::new();
    h.perf.set_recording_mode(RecordingMode::Voice);
    h.perf.start_recording().unwrap();
    h.perf.shutdown();
    assert_eq!(h.mic.sessions_cancelled(), 1);
    assert!(!h.perf.state().is_recording());
    assert!(h.perf.takes().is_empty());
}

#[test]
fn shutdown_removes_take_files() {
    let mut h = Harness::new();
    record_instrument_take(&mut h);
    record_instrument_take(&mut h);
    let paths: Vec<_> = h.perf.takes().iter().map(|t| t.resource.path.clone()).collect();
    assert!(paths.iter().all(|p| p.exists()));

    h.perf.shutdown();
    assert!(h.perf.takes().is_empty());
    assert!(paths.iter().all(|p| !p.exists()));
}

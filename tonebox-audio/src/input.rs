//! Microphone capture using cpal.
//!
//! A session starts capturing as soon as access is granted. Stopping hands the
//! samples to a finalizer thread which reports back through a channel, so the
//! caller never waits on the device.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::Sender;

use tonebox_types::TakeId;

use crate::CapturedAudio;

/// Delivered once per stopped session.
#[derive(Debug, Clone)]
pub struct CaptureCompletion {
    /// Take id reserved when the session was stopped.
    pub take: TakeId,
    pub result: Result<CapturedAudio, String>,
}

/// Grants access to a live input. Denial is reported as an error string.
pub trait MicrophoneSource {
    fn request_access(&self) -> Result<Box<dyn MicrophoneSession>, String>;
}

/// A running microphone capture.
pub trait MicrophoneSession {
    /// Stop capturing. The completion arrives later on `done`.
    fn stop(self: Box<Self>, take: TakeId, done: Sender<CaptureCompletion>);

    /// Stop capturing and discard everything.
    fn cancel(self: Box<Self>);
}

// ─── cpal ───────────────────────────────────────────────────────────

/// Default input device through cpal.
#[derive(Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn request_access(&self) -> Result<Box<dyn MicrophoneSession>, String> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| "No input device available".to_string())?;

        let config = device
            .default_input_config()
            .map_err(|e| format!("Failed to get input config: {}", e))?;

        let channels = config.channels();
        let sample_rate = config.sample_rate().0;
        let stream_config: StreamConfig = config.into();
        let buffer = Arc::new(Mutex::new(Vec::<f32>::with_capacity(
            sample_rate as usize * channels as usize * 10,
        )));
        let sink = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    log::error!(target: "audio", "Audio input error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build input stream: {}", e))?;

        stream
            .play()
            .map_err(|e| format!("Failed to start input stream: {}", e))?;

        log::info!(target: "audio", "microphone open: {} Hz, {} ch", sample_rate, channels);
        Ok(Box::new(CpalMicSession {
            stream,
            buffer,
            sample_rate,
            channels,
        }))
    }
}

type FinalizeJob = Box<dyn FnOnce() + Send + 'static>;

/// Run `finalize` through `spawn` and send its completion. If the job cannot
/// be started the failure is sent from here, so the take never stays pending.
fn deliver_completion(
    take: TakeId,
    done: Sender<CaptureCompletion>,
    finalize: impl FnOnce() -> Result<CapturedAudio, String> + Send + 'static,
    spawn: impl FnOnce(FinalizeJob) -> io::Result<()>,
) {
    let fallback = done.clone();
    let job: FinalizeJob = Box::new(move || {
        let result = finalize();
        let _ = done.send(CaptureCompletion { take, result });
    });
    if let Err(e) = spawn(job) {
        log::error!(target: "audio", "cannot spawn microphone finalizer: {}", e);
        let _ = fallback.send(CaptureCompletion {
            take,
            result: Err(format!("cannot finish take: {}", e)),
        });
    }
}

struct CpalMicSession {
    stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    channels: u16,
}

impl MicrophoneSession for CpalMicSession {
    fn stop(self: Box<Self>, take: TakeId, done: Sender<CaptureCompletion>) {
        let CpalMicSession {
            stream,
            buffer,
            sample_rate,
            channels,
        } = *self;
        // Dropping the stream ends the input callback.
        drop(stream);

        deliver_completion(
            take,
            done,
            move || {
                buffer
                    .lock()
                    .map(|mut buf| CapturedAudio {
                        samples: std::mem::take(&mut *buf),
                        sample_rate,
                        channels,
                    })
                    .map_err(|_| "capture buffer poisoned".to_string())
            },
            |job| {
                thread::Builder::new()
                    .name("tonebox-mic-finalize".to_string())
                    .spawn(job)
                    .map(|_| ())
            },
        );
    }

    fn cancel(self: Box<Self>) {
        drop(self);
    }
}

// ─── Test microphone ────────────────────────────────────────────────

#[derive(Default)]
struct TestMicShared {
    deny: AtomicBool,
    hold: AtomicBool,
    opened: AtomicUsize,
    cancelled: AtomicUsize,
    held: Mutex<Vec<(Sender<CaptureCompletion>, CaptureCompletion)>>,
}

/// Deterministic microphone for tests.
///
/// Completions are delivered synchronously on `stop` unless `hold_completions`
/// is on, in which case they wait for `release_held` (in any order).
#[derive(Clone, Default)]
pub struct TestMicrophone {
    shared: Arc<TestMicShared>,
}

impl TestMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_access(&self, deny: bool) {
        self.shared.deny.store(deny, Ordering::SeqCst);
    }

    pub fn hold_completions(&self, hold: bool) {
        self.shared.hold.store(hold, Ordering::SeqCst);
    }

    /// Deliver held completions, newest first when `reverse` is set.
    pub fn release_held(&self, reverse: bool) {
        let mut held: Vec<_> = self.shared.held.lock().unwrap().drain(..).collect();
        if reverse {
            held.reverse();
        }
        for (tx, completion) in held {
            let _ = tx.send(completion);
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_cancelled(&self) -> usize {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

impl MicrophoneSource for TestMicrophone {
    fn request_access(&self) -> Result<Box<dyn MicrophoneSession>, String> {
        if self.shared.deny.load(Ordering::SeqCst) {
            return Err("Permission denied".to_string());
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestMicSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct TestMicSession {
    shared: Arc<TestMicShared>,
}

impl MicrophoneSession for TestMicSession {
    fn stop(self: Box<Self>, take: TakeId, done: Sender<CaptureCompletion>) {
        let completion = CaptureCompletion {
            take,
            result: Ok(CapturedAudio {
                samples: vec![0.25; 480],
                sample_rate: 48000,
                channels: 1,
            }),
        };
        if self.shared.hold.load(Ordering::SeqCst) {
            self.shared.held.lock().unwrap().push((done, completion));
        } else {
            let _ = done.send(completion);
        }
    }

    fn cancel(self: Box<Self>) {
        self.shared.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

//! Render graph owned by the audio callback.
//!
//! The host thread never touches this state directly; it sends `EngineCommand`s
//! which are drained at the top of every block, so a `Bundle` lands between two
//! blocks as a whole.

use crossbeam_channel::Sender;

use tonebox_types::{NodeId, VoiceSource};

use super::backend::GraphOp;
use super::dsp::{LowPass, Noise, Note, Reverb, MAX_POLYPHONY};

pub(crate) enum EngineCommand {
    AddVoice { node: NodeId, source: VoiceSource },
    AddFilter { node: NodeId, cutoff_hz: f32 },
    AddEffect { node: NodeId, wet: f32 },
    AddTap { node: NodeId },
    Bundle(Vec<GraphOp>),
    Trigger {
        voice: NodeId,
        freq: Option<f32>,
        duration_secs: f32,
        velocity: f32,
    },
    StartCapture { tap: NodeId, buffer: Vec<f32> },
    FinalizeCapture { tap: NodeId, reply: Sender<Vec<f32>> },
    PlayTake {
        node: NodeId,
        samples: Vec<f32>,
        channels: u16,
        looping: bool,
    },
    SetTakeLooping { node: NodeId, looping: bool },
    Free(NodeId),
}

#[derive(Clone, Copy)]
enum Route {
    Filter(usize),
    Effect(usize),
    Tap(usize),
}

struct VoiceUnit {
    node: NodeId,
    source: VoiceSource,
    gain: f32,
    outputs: Vec<NodeId>,
    routes: Vec<Route>,
    notes: Vec<Note>,
}

struct FilterUnit {
    node: NodeId,
    lp: LowPass,
    input: f32,
}

struct EffectUnit {
    node: NodeId,
    reverb: Reverb,
    input: f32,
}

struct TapUnit {
    node: NodeId,
    input: f32,
    recording: Option<Vec<f32>>,
}

struct TakePlayer {
    node: NodeId,
    samples: Vec<f32>,
    channels: usize,
    frame: usize,
    looping: bool,
}

pub(crate) struct Engine {
    sample_rate: f32,
    voices: Vec<VoiceUnit>,
    filters: Vec<FilterUnit>,
    effects: Vec<EffectUnit>,
    taps: Vec<TapUnit>,
    players: Vec<TakePlayer>,
    noise: Noise,
}

impl Engine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: Vec::new(),
            filters: Vec::new(),
            effects: Vec::new(),
            taps: Vec::new(),
            players: Vec::new(),
            noise: Noise::new(0x1234_5678),
        }
    }

    pub fn handle_cmd(&mut self, cmd: EngineCommand) {
        let sr = self.sample_rate;
        match cmd {
            EngineCommand::AddVoice { node, source } => {
                self.voices.push(VoiceUnit {
                    node,
                    source,
                    gain: 1.0,
                    outputs: Vec::new(),
                    routes: Vec::new(),
                    notes: Vec::with_capacity(MAX_POLYPHONY),
                });
            }
            EngineCommand::AddFilter { node, cutoff_hz } => {
                self.filters.push(FilterUnit { node, lp: LowPass::new(cutoff_hz, sr), input: 0.0 });
                self.resolve_routes();
            }
            EngineCommand::AddEffect { node, wet } => {
                self.effects.push(EffectUnit { node, reverb: Reverb::new(wet, sr), input: 0.0 });
                self.resolve_routes();
            }
            EngineCommand::AddTap { node } => {
                self.taps.push(TapUnit { node, input: 0.0, recording: None });
                self.resolve_routes();
            }
            EngineCommand::Bundle(ops) => {
                for op in ops {
                    self.apply(op);
                }
                self.resolve_routes();
            }
            EngineCommand::Trigger { voice, freq, duration_secs, velocity } => {
                if let Some(v) = self.voices.iter_mut().find(|v| v.node == voice) {
                    if v.notes.len() >= MAX_POLYPHONY {
                        v.notes.remove(0);
                    }
                    v.notes.push(Note::new(v.source, freq, duration_secs, velocity, sr));
                }
            }
            EngineCommand::StartCapture { tap, mut buffer } => {
                if let Some(t) = self.taps.iter_mut().find(|t| t.node == tap) {
                    buffer.clear();
                    t.recording = Some(buffer);
                }
            }
            EngineCommand::FinalizeCapture { tap, reply } => {
                let samples = self
                    .taps
                    .iter_mut()
                    .find(|t| t.node == tap)
                    .and_then(|t| t.recording.take())
                    .unwrap_or_default();
                let _ = reply.try_send(samples);
            }
            EngineCommand::PlayTake { node, samples, channels, looping } => {
                self.players.push(TakePlayer {
                    node,
                    samples,
                    channels: channels.max(1) as usize,
                    frame: 0,
                    looping,
                });
            }
            EngineCommand::SetTakeLooping { node, looping } => {
                if let Some(p) = self.players.iter_mut().find(|p| p.node == node) {
                    p.looping = looping;
                }
            }
            EngineCommand::Free(node) => {
                self.voices.retain(|v| v.node != node);
                self.filters.retain(|f| f.node != node);
                self.effects.retain(|e| e.node != node);
                self.taps.retain(|t| t.node != node);
                self.players.retain(|p| p.node != node);
                for v in &mut self.voices {
                    v.outputs.retain(|&o| o != node);
                }
                self.resolve_routes();
            }
        }
    }

    fn apply(&mut self, op: GraphOp) {
        let sr = self.sample_rate;
        match op {
            GraphOp::Disconnect(node) => {
                if let Some(v) = self.voices.iter_mut().find(|v| v.node == node) {
                    v.outputs.clear();
                }
            }
            GraphOp::Connect { from, to } => {
                if let Some(v) = self.voices.iter_mut().find(|v| v.node == from) {
                    if !v.outputs.contains(&to) {
                        v.outputs.push(to);
                    }
                }
            }
            GraphOp::SetGainDb { node, db } => {
                if let Some(v) = self.voices.iter_mut().find(|v| v.node == node) {
                    v.gain = if db.is_finite() { 10f32.powf(db / 20.0) } else { 0.0 };
                }
            }
            GraphOp::SetFrequency { node, hz } => {
                if let Some(f) = self.filters.iter_mut().find(|f| f.node == node) {
                    f.lp.set_cutoff(hz, sr);
                }
            }
            GraphOp::SetWet { node, wet } => {
                if let Some(e) = self.effects.iter_mut().find(|e| e.node == node) {
                    e.reverb.set_wet(wet);
                }
            }
        }
    }

    fn resolve_routes(&mut self) {
        let filters = &self.filters;
        let effects = &self.effects;
        let taps = &self.taps;
        for v in &mut self.voices {
            v.routes = v
                .outputs
                .iter()
                .filter_map(|&o| {
                    if let Some(i) = filters.iter().position(|f| f.node == o) {
                        Some(Route::Filter(i))
                    } else if let Some(i) = effects.iter().position(|e| e.node == o) {
                        Some(Route::Effect(i))
                    } else {
                        taps.iter().position(|t| t.node == o).map(Route::Tap)
                    }
                })
                .collect();
        }
    }

    /// Render interleaved output with `channels` channels. Voices are mono and
    /// copied to every channel.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let sr = self.sample_rate;
        for frame in data.chunks_mut(channels) {
            for f in &mut self.filters {
                f.input = 0.0;
            }
            for e in &mut self.effects {
                e.input = 0.0;
            }
            for t in &mut self.taps {
                t.input = 0.0;
            }

            for v in &mut self.voices {
                if v.notes.is_empty() {
                    continue;
                }
                let mut s = 0.0;
                for n in &mut v.notes {
                    s += n.next(sr, &mut self.noise);
                }
                v.notes.retain(|n| !n.finished());
                let s = s * v.gain;
                for route in &v.routes {
                    match *route {
                        Route::Filter(i) => self.filters[i].input += s,
                        Route::Effect(i) => self.effects[i].input += s,
                        Route::Tap(i) => self.taps[i].input += s,
                    }
                }
            }

            let mut mix = 0.0;
            for f in &mut self.filters {
                mix += f.lp.process(f.input);
            }
            for e in &mut self.effects {
                mix += e.reverb.process(e.input);
            }
            for t in &mut self.taps {
                if let Some(rec) = t.recording.as_mut() {
                    rec.push(t.input);
                }
            }

            for p in &mut self.players {
                let frames = p.samples.len() / p.channels;
                if p.frame >= frames {
                    if p.looping && frames > 0 {
                        p.frame = 0;
                    } else {
                        continue;
                    }
                }
                let start = p.frame * p.channels;
                let sum: f32 = p.samples[start..start + p.channels].iter().sum();
                mix += sum / p.channels as f32;
                p.frame += 1;
            }

            let out = mix.clamp(-1.0, 1.0);
            for s in frame.iter_mut() {
                *s = out;
            }
        }
        self.players
            .retain(|p| p.looping || p.frame < p.samples.len() / p.channels);
    }
}

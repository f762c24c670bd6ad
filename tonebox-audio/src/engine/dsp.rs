//! Minimal sound sources and processors for the cpal engine.
//!
//! Nothing here aims at fidelity; each source only has to be recognisable.

use std::f32::consts::TAU;

use tonebox_types::VoiceSource;

/// Notes sounding at once per voice. The oldest note is stolen beyond this.
pub(crate) const MAX_POLYPHONY: usize = 16;

const ORGAN_HARMONICITY: f32 = 2.0;
const ORGAN_MOD_INDEX: f32 = 3.0;
const METAL_BASE_HZ: f32 = 200.0;
const METAL_RATIOS: [f32; 6] = [1.0, 1.483, 1.932, 2.546, 2.630, 3.897];
const KICK_DEFAULT_HZ: f32 = 32.7;

/// xorshift32; deterministic and allocation-free.
pub(crate) struct Noise(u32);

impl Noise {
    pub fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[derive(Clone, Copy)]
struct Shape {
    attack: f32,
    release: f32,
    /// Exponential decay constant for one-shot sources, seconds.
    decay: Option<f32>,
}

fn shape(source: VoiceSource) -> Shape {
    match source {
        VoiceSource::PolySynth => Shape { attack: 0.005, release: 0.3, decay: None },
        VoiceSource::StringSampler => Shape { attack: 0.08, release: 0.6, decay: None },
        VoiceSource::FmOrgan => Shape { attack: 0.01, release: 0.2, decay: None },
        VoiceSource::Membrane => Shape { attack: 0.001, release: 0.0, decay: Some(0.35) },
        VoiceSource::WhiteNoise => Shape { attack: 0.001, release: 0.0, decay: Some(0.12) },
        VoiceSource::Metal => Shape { attack: 0.001, release: 0.0, decay: Some(0.05) },
        VoiceSource::PinkNoise => Shape { attack: 0.001, release: 0.0, decay: Some(0.1) },
    }
}

/// One sounding note of a voice.
pub(crate) struct Note {
    source: VoiceSource,
    freq: f32,
    velocity: f32,
    phases: [f32; 6],
    age: u32,
    hold: u32,
    end: u32,
    pink: [f32; 3],
}

impl Note {
    pub fn new(
        source: VoiceSource,
        freq: Option<f32>,
        duration_secs: f32,
        velocity: f32,
        sample_rate: f32,
    ) -> Self {
        let s = shape(source);
        let freq = freq.unwrap_or(match source {
            VoiceSource::Membrane => KICK_DEFAULT_HZ,
            VoiceSource::Metal => METAL_BASE_HZ,
            _ => 261.63,
        });
        let hold = (duration_secs.max(0.0) * sample_rate) as u32;
        let tail = match s.decay {
            Some(d) => d * 6.0,
            None => s.release,
        };
        let end = hold.max((s.attack * sample_rate) as u32) + (tail * sample_rate) as u32;
        Self {
            source,
            freq,
            velocity,
            phases: [0.0; 6],
            age: 0,
            hold,
            end,
            pink: [0.0; 3],
        }
    }

    pub fn finished(&self) -> bool {
        self.age >= self.end
    }

    fn envelope(&self, sr: f32) -> f32 {
        let s = shape(self.source);
        let t = self.age as f32 / sr;
        let attack = if s.attack > 0.0 { (t / s.attack).min(1.0) } else { 1.0 };
        match s.decay {
            Some(d) => attack * (-t / d).exp(),
            None => {
                if self.age <= self.hold {
                    attack
                } else if s.release > 0.0 {
                    let r = (self.age - self.hold) as f32 / sr;
                    attack * (1.0 - r / s.release).max(0.0)
                } else {
                    0.0
                }
            }
        }
    }

    pub fn next(&mut self, sr: f32, noise: &mut Noise) -> f32 {
        let t = self.age as f32 / sr;
        let raw = match self.source {
            VoiceSource::PolySynth => {
                let p = advance(&mut self.phases[0], self.freq, sr);
                1.0 - 4.0 * (p - 0.5).abs()
            }
            VoiceSource::StringSampler => {
                let a = advance(&mut self.phases[0], self.freq, sr);
                let b = advance(&mut self.phases[1], self.freq * 1.003, sr);
                ((2.0 * a - 1.0) + (2.0 * b - 1.0)) * 0.35
            }
            VoiceSource::FmOrgan => {
                let m = advance(&mut self.phases[1], self.freq * ORGAN_HARMONICITY, sr);
                let c = advance(&mut self.phases[0], self.freq, sr);
                (c * TAU + ORGAN_MOD_INDEX * (m * TAU).sin()).sin()
            }
            VoiceSource::Membrane => {
                let f = self.freq * (1.0 + 7.0 * (-t / 0.02).exp());
                let p = advance(&mut self.phases[0], f, sr);
                (p * TAU).sin()
            }
            VoiceSource::WhiteNoise => noise.next(),
            VoiceSource::Metal => {
                let scale = self.freq / METAL_BASE_HZ;
                let mut sum = 0.0;
                for (i, ratio) in METAL_RATIOS.iter().enumerate() {
                    let p = advance(&mut self.phases[i], METAL_BASE_HZ * scale * ratio * 8.0, sr);
                    sum += if p < 0.5 { 1.0 } else { -1.0 };
                }
                sum / METAL_RATIOS.len() as f32
            }
            VoiceSource::PinkNoise => {
                let white = noise.next();
                self.pink[0] = 0.99765 * self.pink[0] + white * 0.099_046;
                self.pink[1] = 0.963 * self.pink[1] + white * 0.296_516_4;
                self.pink[2] = 0.57 * self.pink[2] + white * 1.052_691_3;
                (self.pink[0] + self.pink[1] + self.pink[2] + white * 0.1848) * 0.25
            }
        };
        let out = raw * self.envelope(sr) * self.velocity;
        self.age = self.age.saturating_add(1);
        out
    }
}

fn advance(phase: &mut f32, freq: f32, sr: f32) -> f32 {
    let p = *phase;
    *phase = (p + freq / sr).fract();
    p
}

/// One-pole low-pass.
pub(crate) struct LowPass {
    cutoff_hz: f32,
    coeff: f32,
    state: f32,
}

impl LowPass {
    pub fn new(cutoff_hz: f32, sr: f32) -> Self {
        let mut f = Self { cutoff_hz, coeff: 0.0, state: 0.0 };
        f.set_cutoff(cutoff_hz, sr);
        f
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32, sr: f32) {
        self.cutoff_hz = cutoff_hz.clamp(20.0, sr * 0.45);
        self.coeff = 1.0 - (-TAU * self.cutoff_hz / sr).exp();
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.state += self.coeff * (x - self.state);
        self.state
    }
}

/// Small comb/allpass reverb with a wet/dry mix.
pub(crate) struct Reverb {
    wet: f32,
    combs: Vec<Delay>,
    allpasses: Vec<Delay>,
}

struct Delay {
    buf: Vec<f32>,
    pos: usize,
}

impl Delay {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0 }
    }

    fn comb(&mut self, x: f32, feedback: f32) -> f32 {
        let y = self.buf[self.pos];
        self.buf[self.pos] = x + y * feedback;
        self.pos = (self.pos + 1) % self.buf.len();
        y
    }

    fn allpass(&mut self, x: f32) -> f32 {
        let delayed = self.buf[self.pos];
        let y = delayed - x;
        self.buf[self.pos] = x + delayed * 0.5;
        self.pos = (self.pos + 1) % self.buf.len();
        y
    }
}

impl Reverb {
    pub fn new(wet: f32, sr: f32) -> Self {
        let scale = sr / 44100.0;
        let combs = [1116, 1188, 1277, 1356]
            .iter()
            .map(|&n| Delay::new((n as f32 * scale) as usize))
            .collect();
        let allpasses = [556, 441]
            .iter()
            .map(|&n| Delay::new((n as f32 * scale) as usize))
            .collect();
        Self { wet: wet.clamp(0.0, 1.0), combs, allpasses }
    }

    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let mut acc = 0.0;
        for c in &mut self.combs {
            acc += c.comb(x * 0.25, 0.8);
        }
        for a in &mut self.allpasses {
            acc = a.allpass(acc);
        }
        x * (1.0 - self.wet) + acc * self.wet
    }
}

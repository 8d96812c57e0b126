//! Waveform generator
//!
//! Samples a parametric waveform into a PCM track. Used to build test
//! material for the mixer and the player and exposed through the CLI.
//!
//! For sample `n` at time `t = n / sample_rate`, normalized time
//! `τ = t / total` and channel `c`, the phase is `phase + c·π/2`; the raw
//! sample is scaled by `amplitude[c] · envelope(τ)`, soft-clipped with
//! `tanh` and quantized to the track format.

pub mod note;

pub use note::Note;

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::quantize::SampleCodec;
use crate::track::{SampleBuffer, Track, TrackMetadata};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_FREQUENCY: f64 = 440.0;
pub const DEFAULT_AMPLITUDE: f64 = 0.5;
pub const DEFAULT_DUTY_CYCLE: f64 = 0.5;
pub const DEFAULT_SWEEP: (f64, f64) = (440.0, 880.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaveType {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
    Impulse,
    Silence,
    /// Linear frequency chirp between the sweep bounds
    Chirp,
    /// Exponential frequency sweep between the sweep bounds
    Sweep,
}

impl WaveType {
    pub const ALL: [WaveType; 9] = [
        WaveType::Sine,
        WaveType::Square,
        WaveType::Sawtooth,
        WaveType::Triangle,
        WaveType::Noise,
        WaveType::Impulse,
        WaveType::Silence,
        WaveType::Chirp,
        WaveType::Sweep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WaveType::Sine => "sine",
            WaveType::Square => "square",
            WaveType::Sawtooth => "sawtooth",
            WaveType::Triangle => "triangle",
            WaveType::Noise => "noise",
            WaveType::Impulse => "impulse",
            WaveType::Silence => "silence",
            WaveType::Chirp => "chirp",
            WaveType::Sweep => "sweep",
        }
    }
}

impl fmt::Display for WaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaveType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WaveType::ALL
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Generation(format!("unknown wave type '{}'", s)))
    }
}

/// Amplitude envelope over normalized time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeType {
    #[default]
    None,
    /// Attack 0.1, decay 0.2, sustain 0.7, release 0.2
    Adsr,
    /// Triangle peaking at τ = 0.5
    Linear,
    /// `exp(−5·|τ − 0.5|)`
    Exponential,
    Hann,
    Hamming,
}

const ADSR_ATTACK: f64 = 0.1;
const ADSR_DECAY: f64 = 0.2;
const ADSR_SUSTAIN: f64 = 0.7;
const ADSR_RELEASE: f64 = 0.2;

impl EnvelopeType {
    /// Gain at normalized time `tau` in [0, 1]
    pub fn gain(&self, tau: f64) -> f64 {
        match self {
            EnvelopeType::None => 1.0,
            EnvelopeType::Adsr => {
                if tau < ADSR_ATTACK {
                    tau / ADSR_ATTACK
                } else if tau < ADSR_ATTACK + ADSR_DECAY {
                    1.0 - (tau - ADSR_ATTACK) / ADSR_DECAY * (1.0 - ADSR_SUSTAIN)
                } else if tau < 1.0 - ADSR_RELEASE {
                    ADSR_SUSTAIN
                } else {
                    ADSR_SUSTAIN * (1.0 - (tau - (1.0 - ADSR_RELEASE)) / ADSR_RELEASE)
                }
            }
            EnvelopeType::Linear => {
                if tau < 0.5 {
                    tau * 2.0
                } else {
                    (1.0 - tau) * 2.0
                }
            }
            EnvelopeType::Exponential => (-5.0 * (tau - 0.5).abs()).exp(),
            EnvelopeType::Hann => 0.5 * (1.0 - (TAU * tau).cos()),
            EnvelopeType::Hamming => 0.54 - 0.46 * (TAU * tau).cos(),
        }
    }
}

impl FromStr for EnvelopeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(EnvelopeType::None),
            "adsr" => Ok(EnvelopeType::Adsr),
            "linear" => Ok(EnvelopeType::Linear),
            "exponential" => Ok(EnvelopeType::Exponential),
            "hann" => Ok(EnvelopeType::Hann),
            "hamming" => Ok(EnvelopeType::Hamming),
            _ => Err(Error::Generation(format!("unknown envelope '{}'", s))),
        }
    }
}

/// Generator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    frequencies: Vec<f64>,
    amplitudes: Vec<f64>,
    wave_type: WaveType,
    phase: f64,
    duty_cycle: f64,
    frequency_sweep: bool,
    start_frequency: f64,
    end_frequency: f64,
    envelope: EnvelopeType,
    seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frequencies: vec![DEFAULT_FREQUENCY],
            amplitudes: vec![DEFAULT_AMPLITUDE],
            wave_type: WaveType::Sine,
            phase: 0.0,
            duty_cycle: DEFAULT_DUTY_CYCLE,
            frequency_sweep: false,
            start_frequency: DEFAULT_SWEEP.0,
            end_frequency: DEFAULT_SWEEP.1,
            envelope: EnvelopeType::None,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn wave_type(&self) -> WaveType {
        self.wave_type
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn is_frequency_sweep(&self) -> bool {
        self.frequency_sweep
    }

    pub fn sweep_range(&self) -> (f64, f64) {
        (self.start_frequency, self.end_frequency)
    }

    pub fn envelope(&self) -> EnvelopeType {
        self.envelope
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Per-channel value, reusing the last entry for extra channels
    fn pick(values: &[f64], channel: usize, fallback: f64) -> f64 {
        match values.len() {
            0 => fallback,
            len => values[channel.min(len - 1)],
        }
    }

    fn frequency_for(&self, channel: usize) -> f64 {
        Self::pick(&self.frequencies, channel, DEFAULT_FREQUENCY)
    }

    fn amplitude_for(&self, channel: usize) -> f64 {
        Self::pick(&self.amplitudes, channel, DEFAULT_AMPLITUDE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    /// Reset per-channel arrays to `count` default entries
    pub fn channels(mut self, count: u16) -> Self {
        self.config.frequencies = vec![DEFAULT_FREQUENCY; count as usize];
        self.config.amplitudes = vec![DEFAULT_AMPLITUDE; count as usize];
        self
    }

    /// Same frequency on every channel
    pub fn frequency(mut self, frequency: f64) -> Self {
        self.config.frequencies.fill(frequency);
        self
    }

    pub fn frequencies(mut self, frequencies: &[f64]) -> Self {
        self.config.frequencies = frequencies.to_vec();
        self
    }

    /// Out-of-range channels are ignored
    pub fn channel_frequency(mut self, channel: usize, frequency: f64) -> Self {
        if let Some(slot) = self.config.frequencies.get_mut(channel) {
            *slot = frequency;
        }
        self
    }

    /// Same amplitude on every channel, clamped to [0, 1]
    pub fn amplitude(mut self, amplitude: f64) -> Self {
        self.config.amplitudes.fill(amplitude.clamp(0.0, 1.0));
        self
    }

    pub fn amplitudes(mut self, amplitudes: &[f64]) -> Self {
        self.config.amplitudes = amplitudes.iter().map(|a| a.clamp(0.0, 1.0)).collect();
        self
    }

    pub fn channel_amplitude(mut self, channel: usize, amplitude: f64) -> Self {
        if let Some(slot) = self.config.amplitudes.get_mut(channel) {
            *slot = amplitude.clamp(0.0, 1.0);
        }
        self
    }

    pub fn wave_type(mut self, wave_type: WaveType) -> Self {
        self.config.wave_type = wave_type;
        self
    }

    pub fn phase(mut self, phase: f64) -> Self {
        self.config.phase = phase;
        self
    }

    /// Fraction of a SQUARE period spent high, clamped to [0, 1]
    pub fn duty_cycle(mut self, duty_cycle: f64) -> Self {
        self.config.duty_cycle = duty_cycle.clamp(0.0, 1.0);
        self
    }

    /// Sweep the frequency linearly from `start` to `end` over the track
    pub fn sweep(mut self, start: f64, end: f64) -> Self {
        self.config.frequency_sweep = true;
        self.config.start_frequency = start;
        self.config.end_frequency = end;
        self
    }

    pub fn envelope(mut self, envelope: EnvelopeType) -> Self {
        self.config.envelope = envelope;
        self
    }

    /// Fixed seed for NOISE; unseeded noise differs on every run
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}

/// Generate `duration` of audio in `format`.
///
/// The sample count is `duration_ms · sample_rate / 1000`; durations under
/// one millisecond are rejected.
pub fn generate(duration: Duration, format: &TrackFormat, config: &GeneratorConfig) -> Result<Track> {
    let millis = duration.as_millis();
    if millis == 0 {
        return Err(Error::Generation(format!(
            "duration must be positive, got {:?}",
            duration
        )));
    }
    if format.channels() == 0 || format.sample_rate() == 0 {
        return Err(Error::Generation(format!("cannot generate {}", format)));
    }
    let codec = SampleCodec::for_format(format)?;

    let sample_rate = format.sample_rate() as f64;
    let channels = format.channels() as usize;
    let num_samples = (millis * format.sample_rate() as u128 / 1000) as usize;
    let total_time = millis as f64 / 1000.0;
    let width = codec.width();

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut buffer = SampleBuffer::zeroed(num_samples * format.frame_size(), format.byte_order());
    let out = buffer.as_mut_bytes();
    let (start, end) = config.sweep_range();

    for n in 0..num_samples {
        let t = n as f64 / sample_rate;
        let tau = t / total_time;
        let gain = config.envelope.gain(tau);

        for c in 0..channels {
            let frequency = if config.frequency_sweep {
                start + (end - start) * tau
            } else {
                config.frequency_for(c)
            };
            let phase = config.phase + c as f64 * PI / 2.0;
            let raw = wave_sample(config, n, t, frequency, phase, &mut rng);
            let sample = (raw * config.amplitude_for(c) * gain).tanh();

            let at = (n * channels + c) * width;
            codec.encode(sample, &mut out[at..at + width])?;
        }
    }

    debug!(
        "Generated {} ({:?} envelope) into {} ({} samples)",
        config.wave_type, config.envelope, format, num_samples
    );

    let exact = Duration::from_millis(millis as u64);
    Track::new(buffer, exact, format.clone(), TrackMetadata::new())
}

fn wave_sample(
    config: &GeneratorConfig,
    n: usize,
    t: f64,
    frequency: f64,
    phase: f64,
    rng: &mut StdRng,
) -> f64 {
    let omega = TAU * frequency;
    let v = (omega * t + phase).rem_euclid(TAU);
    let (start, end) = config.sweep_range();

    match config.wave_type {
        WaveType::Sine => (omega * t + phase).sin(),
        WaveType::Square => {
            if v < TAU * config.duty_cycle {
                1.0
            } else {
                -1.0
            }
        }
        WaveType::Sawtooth => v / PI - 1.0,
        WaveType::Triangle => {
            if v < PI {
                2.0 * v / PI - 1.0
            } else {
                2.0 * (TAU - v) / PI - 1.0
            }
        }
        WaveType::Noise => rng.gen_range(-1.0..=1.0),
        WaveType::Impulse => {
            if n == 0 {
                1.0
            } else {
                0.0
            }
        }
        WaveType::Silence => 0.0,
        WaveType::Chirp => {
            let f = start + (end - start) * t;
            (TAU * f * t + phase).sin()
        }
        WaveType::Sweep => {
            let f = start * (end / start).powf(t);
            (TAU * f * t + phase).sin()
        }
    }
}

fn note_config(format: &TrackFormat, note: Note, wave_type: WaveType) -> GeneratorConfigBuilder {
    GeneratorConfig::builder()
        .channels(format.channels())
        .frequency(note.frequency())
        .amplitude(note.amplitude())
        .wave_type(wave_type)
}

pub fn generate_sine(format: &TrackFormat, duration: Duration, note: Note) -> Result<Track> {
    generate(duration, format, &note_config(format, note, WaveType::Sine).build())
}

/// Sine with one note per channel, each at its own amplitude; extra
/// channels repeat the last note
pub fn generate_chord(format: &TrackFormat, duration: Duration, notes: &[Note]) -> Result<Track> {
    let frequencies: Vec<f64> = notes.iter().map(|n| n.frequency()).collect();
    let amplitudes: Vec<f64> = notes.iter().map(|n| n.amplitude()).collect();
    let config = GeneratorConfig::builder()
        .frequencies(&frequencies)
        .amplitudes(&amplitudes)
        .wave_type(WaveType::Sine)
        .build();
    generate(duration, format, &config)
}

pub fn generate_noise(format: &TrackFormat, duration: Duration) -> Result<Track> {
    let config = GeneratorConfig::builder()
        .channels(format.channels())
        .amplitude(0.1)
        .wave_type(WaveType::Noise)
        .build();
    generate(duration, format, &config)
}

pub fn generate_silence(format: &TrackFormat, duration: Duration) -> Result<Track> {
    let config = GeneratorConfig::builder()
        .channels(format.channels())
        .amplitude(0.0)
        .wave_type(WaveType::Silence)
        .build();
    generate(duration, format, &config)
}

/// Linear chirp from `from` to `to`
pub fn generate_chirp(format: &TrackFormat, duration: Duration, from: Note, to: Note) -> Result<Track> {
    let config = note_config(format, from, WaveType::Chirp)
        .amplitude((from.amplitude() + to.amplitude()) / 2.0)
        .sweep(from.frequency(), to.frequency())
        .build();
    generate(duration, format, &config)
}

pub fn generate_square(
    format: &TrackFormat,
    duration: Duration,
    note: Note,
    duty_cycle: f64,
) -> Result<Track> {
    let config = note_config(format, note, WaveType::Square)
        .duty_cycle(duty_cycle)
        .build();
    generate(duration, format, &config)
}

pub fn generate_sawtooth(format: &TrackFormat, duration: Duration, note: Note) -> Result<Track> {
    generate(duration, format, &note_config(format, note, WaveType::Sawtooth).build())
}

pub fn generate_triangle(format: &TrackFormat, duration: Duration, note: Note) -> Result<Track> {
    generate(duration, format, &note_config(format, note, WaveType::Triangle).build())
}

/// Single full-scale sample followed by silence
pub fn generate_impulse(format: &TrackFormat, duration: Duration) -> Result<Track> {
    let config = GeneratorConfig::builder()
        .channels(format.channels())
        .amplitude(1.0)
        .wave_type(WaveType::Impulse)
        .build();
    generate(duration, format, &config)
}

/// Exponential sweep from `from` to `to`
pub fn generate_sweep(format: &TrackFormat, duration: Duration, from: Note, to: Note) -> Result<Track> {
    let config = GeneratorConfig::builder()
        .channels(format.channels())
        .amplitude((from.amplitude() + to.amplitude()) / 2.0)
        .wave_type(WaveType::Sweep)
        .sweep(from.frequency(), to.frequency())
        .build();
    generate(duration, format, &config)
}

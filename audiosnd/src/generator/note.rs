//! Musical note value
//!
//! A note is a base frequency plus octave and semitone shifts. The sounding
//! frequency is `base · 2^octave · 2^(semitone/12)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amplitude given to notes built from a bare frequency
pub const DEFAULT_NOTE_AMPLITUDE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    base: f64,
    amplitude: f64,
    octave_shift: i32,
    semitone_shift: i32,
}

impl Note {
    pub const C2: Note = Note::of_freq(261.63);
    pub const D2: Note = Note::of_freq(293.66);
    pub const E2: Note = Note::of_freq(329.63);
    pub const F2: Note = Note::of_freq(349.23);
    pub const G2: Note = Note::of_freq(392.00);
    pub const A2: Note = Note::of_freq(440.00);
    pub const B2: Note = Note::of_freq(492.88);

    pub const fn new(base: f64, amplitude: f64, octave_shift: i32, semitone_shift: i32) -> Self {
        Self {
            base,
            amplitude,
            octave_shift,
            semitone_shift,
        }
    }

    pub const fn of_freq(frequency: f64) -> Self {
        Self::new(frequency, DEFAULT_NOTE_AMPLITUDE, 0, 0)
    }

    /// Note whose shifts approximate a frequency multiplier
    /// (0.5 = one octave down, 2.0 = one octave up)
    pub fn with_factor(frequency: f64, amplitude: f64, factor: f64) -> Self {
        let octaves = factor.log2();
        let whole = octaves.trunc();
        let semitones = ((octaves - whole) * 12.0).round();
        Self::new(frequency, amplitude, whole as i32, semitones as i32)
    }

    pub fn with_amplitude(self, amplitude: f64) -> Self {
        Self { amplitude, ..self }
    }

    pub fn base_frequency(&self) -> f64 {
        self.base
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn octave_shift(&self) -> i32 {
        self.octave_shift
    }

    pub fn semitone_shift(&self) -> i32 {
        self.semitone_shift
    }

    /// Sounding frequency after octave and semitone shifts
    pub fn frequency(&self) -> f64 {
        let mut freq = self.base * 2f64.powi(self.octave_shift);
        if self.semitone_shift != 0 {
            freq *= 2f64.powf(self.semitone_shift as f64 / 12.0);
        }
        freq
    }

    pub fn up_octave(self) -> Self {
        Self {
            octave_shift: self.octave_shift + 1,
            ..self
        }
    }

    pub fn down_octave(self) -> Self {
        Self {
            octave_shift: self.octave_shift - 1,
            ..self
        }
    }

    /// Shift by `semitones`; whole octaves move into the octave shift
    pub fn transpose(self, semitones: i32) -> Self {
        let total = self.semitone_shift + semitones;
        Self {
            octave_shift: self.octave_shift + total / 12,
            semitone_shift: total % 12,
            ..self
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Freq: {:.2}; Ampl: {})", self.frequency(), self.amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_octaves() {
        assert!(close(Note::A2.up_octave().frequency(), 880.0));
        assert!(close(Note::A2.down_octave().frequency(), 220.0));
        assert!(close(Note::A2.up_octave().down_octave().frequency(), 440.0));
    }

    #[test]
    fn test_transpose_carries_into_octave() {
        let up = Note::A2.transpose(14);
        assert_eq!(up.octave_shift(), 1);
        assert_eq!(up.semitone_shift(), 2);
        assert!(close(up.frequency(), 880.0 * 2f64.powf(2.0 / 12.0)));

        let down = Note::A2.transpose(-3);
        assert_eq!(down.octave_shift(), 0);
        assert_eq!(down.semitone_shift(), -3);
        assert!(down.frequency() < 440.0);
    }

    #[test]
    fn test_with_factor() {
        let n = Note::with_factor(440.0, 0.3, 2.0);
        assert_eq!((n.octave_shift(), n.semitone_shift()), (1, 0));
        assert!(close(n.frequency(), 880.0));

        let n = Note::with_factor(440.0, 0.3, 0.5);
        assert_eq!(n.octave_shift(), -1);
        assert_eq!(n.amplitude(), 0.3);
    }

    #[test]
    fn test_defaults_and_display() {
        assert_eq!(Note::C2.amplitude(), DEFAULT_NOTE_AMPLITUDE);
        assert_eq!(Note::A2.with_amplitude(0.9).amplitude(), 0.9);
        assert_eq!(Note::A2.to_string(), "(Freq: 440.00; Ampl: 0.5)");
    }
}

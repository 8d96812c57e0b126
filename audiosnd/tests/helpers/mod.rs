//! Test helper modules for audiosnd integration tests
//!
//! - audio_generator: WAV fixtures written with hound, plus raw RIFF builders
//!   for malformed files
//! - audio_analysis: Goertzel tone detection and RMS

#![allow(dead_code)]

pub mod audio_analysis;
pub mod audio_generator;

pub use audio_analysis::{calculate_rms, channel_samples_i16, goertzel_magnitude};
pub use audio_generator::{
    fmt_body, generate_silent_wav, generate_sine_wav, riff_bytes, TEST_SAMPLE_RATE,
};

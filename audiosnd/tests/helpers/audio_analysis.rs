//! Audio analysis for integration tests

use std::f64::consts::PI;

/// One channel of interleaved little-endian i16 samples, normalized to [-1, 1)
pub fn channel_samples_i16(bytes: &[u8], channels: usize, channel: usize) -> Vec<f32> {
    bytes
        .chunks_exact(2 * channels)
        .map(|frame| {
            let i = channel * 2;
            i16::from_le_bytes([frame[i], frame[i + 1]]) as f32 / 32768.0
        })
        .collect()
}

/// Magnitude of the `frequency_hz` bin via the Goertzel algorithm,
/// normalized by the sample count
pub fn goertzel_magnitude(samples: &[f32], sample_rate: u32, frequency_hz: f64) -> f64 {
    let omega = 2.0 * PI * frequency_hz / sample_rate as f64;
    let coeff = 2.0 * omega.cos();
    let (mut s1, mut s2) = (0.0f64, 0.0f64);
    for &x in samples {
        let s0 = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    power.max(0.0).sqrt() / samples.len().max(1) as f64
}

/// Root mean square of the samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

//! Audio format descriptor
//!
//! `TrackFormat` is an immutable value describing how the bytes of a sample
//! buffer are laid out: sample rate, channel count, sample width,
//! signedness, byte order and codec tag.

pub mod presets;
pub mod utils;

use serde::{Deserialize, Serialize};

pub use utils::{chunk_size, duration_ms, file_size, QualityPreset};

/// Byte order of multi-byte samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the running platform
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LE",
            ByteOrder::BigEndian => "BE",
        }
    }
}

/// Codec tag carried by a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Codec {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
    Float64,
    Alaw,
    Ulaw,
    Mp3,
    Aac,
    Opus,
    Vorbis,
    Flac,
    Alac,
    Wavpack,
    Adpcm,
    Other,
}

impl Codec {
    /// Integer PCM codec for a sample width
    pub fn for_pcm_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Codec::Pcm8),
            16 => Some(Codec::Pcm16),
            24 => Some(Codec::Pcm24),
            32 => Some(Codec::Pcm32),
            _ => None,
        }
    }

    /// Codecs whose payload is not a plain sample array
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Codec::Mp3
                | Codec::Aac
                | Codec::Opus
                | Codec::Vorbis
                | Codec::Flac
                | Codec::Alac
                | Codec::Wavpack
                | Codec::Adpcm
        )
    }

    /// Linear sample codecs the mixer, generator and player can process
    pub fn is_pcm(&self) -> bool {
        matches!(
            self,
            Codec::Pcm8 | Codec::Pcm16 | Codec::Pcm24 | Codec::Pcm32 | Codec::Float32
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Pcm8 => "PCM8",
            Codec::Pcm16 => "PCM16",
            Codec::Pcm24 => "PCM24",
            Codec::Pcm32 => "PCM32",
            Codec::Float32 => "FLOAT32",
            Codec::Float64 => "FLOAT64",
            Codec::Alaw => "ALAW",
            Codec::Ulaw => "ULAW",
            Codec::Mp3 => "MP3",
            Codec::Aac => "AAC",
            Codec::Opus => "OPUS",
            Codec::Vorbis => "VORBIS",
            Codec::Flac => "FLAC",
            Codec::Alac => "ALAC",
            Codec::Wavpack => "WAVPACK",
            Codec::Adpcm => "ADPCM",
            Codec::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable audio format descriptor
///
/// Equality and hashing cover every field. A `bits_per_sample` of 0 marks a
/// compressed payload whose sample width is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackFormat {
    extension: String,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    signed: bool,
    byte_order: ByteOrder,
    codec: Codec,
}

impl TrackFormat {
    pub fn new(
        extension: impl Into<String>,
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        signed: bool,
        byte_order: ByteOrder,
        codec: Codec,
    ) -> Self {
        Self {
            extension: extension.into(),
            channels,
            bits_per_sample,
            sample_rate,
            signed,
            byte_order,
            codec,
        }
    }

    /// Integer PCM format; the codec tag follows the sample width
    pub fn pcm(
        extension: impl Into<String>,
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        signed: bool,
        byte_order: ByteOrder,
    ) -> Self {
        let codec = Codec::for_pcm_bits(bits_per_sample).unwrap_or(Codec::Other);
        Self::new(
            extension,
            channels,
            bits_per_sample,
            sample_rate,
            signed,
            byte_order,
            codec,
        )
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Bits per second; 0 for compressed codecs
    pub fn bit_rate(&self) -> u64 {
        if self.codec.is_compressed() {
            return 0;
        }
        self.sample_rate as u64 * self.bits_per_sample as u64 * self.channels as u64
    }

    /// Bytes per single-channel sample
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// True when the payload is a linear sample array this crate can process
    pub fn is_pcm(&self) -> bool {
        self.codec.is_pcm() && self.bits_per_sample > 0 && self.channels > 0
    }

    /// Copy of this format with another extension tag
    pub fn with_extension(&self, extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for TrackFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}Hz, {}ch, {}bit, {}, {}, {}",
            self.extension,
            self.sample_rate,
            self.channels,
            self.bits_per_sample,
            if self.signed { "signed" } else { "unsigned" },
            self.byte_order.short_name(),
            self.codec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bit_rate() {
        let cd = TrackFormat::pcm("wav", 2, 16, 44100, true, ByteOrder::LittleEndian);
        assert_eq!(cd.bit_rate(), 1_411_200);
        assert_eq!(cd.frame_size(), 4);
        assert_eq!(cd.codec(), Codec::Pcm16);

        let flac = TrackFormat::new("flac", 2, 16, 44100, true, ByteOrder::LittleEndian, Codec::Flac);
        assert_eq!(flac.bit_rate(), 0, "compressed codecs report no bit rate");
    }

    #[test]
    fn test_display() {
        let f = TrackFormat::pcm("wav", 2, 24, 48000, true, ByteOrder::LittleEndian);
        assert_eq!(f.to_string(), "wav: 48000Hz, 2ch, 24bit, signed, LE, PCM24");

        let u = TrackFormat::pcm("raw", 1, 8, 8000, false, ByteOrder::BigEndian);
        assert_eq!(u.to_string(), "raw: 8000Hz, 1ch, 8bit, unsigned, BE, PCM8");
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = TrackFormat::pcm("wav", 2, 16, 44100, true, ByteOrder::LittleEndian);
        let b = TrackFormat::pcm("wav", 2, 16, 44100, true, ByteOrder::LittleEndian);
        assert_eq!(a, b);
        assert_ne!(a, a.with_extension("raw"));
        assert_ne!(
            a,
            TrackFormat::new("wav", 2, 16, 44100, true, ByteOrder::LittleEndian, Codec::Other)
        );
        assert_ne!(a, TrackFormat::pcm("wav", 2, 16, 44100, false, ByteOrder::LittleEndian));
        assert_ne!(a, TrackFormat::pcm("wav", 2, 16, 44100, true, ByteOrder::BigEndian));

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
    }

    #[test]
    fn test_codec_classification() {
        assert_eq!(Codec::for_pcm_bits(24), Some(Codec::Pcm24));
        assert_eq!(Codec::for_pcm_bits(12), None);
        assert!(Codec::Mp3.is_compressed());
        assert!(!Codec::Pcm16.is_compressed());
        assert!(Codec::Float32.is_pcm());
        assert!(!Codec::Alaw.is_pcm());
    }
}

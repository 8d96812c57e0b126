//! Sample quantization
//!
//! Converts normalized samples in [-1, 1] to integers of the target width
//! and back. Signed widths scale by `2^(bits-1) - 1`; unsigned widths are
//! offset so that -1 maps to 0 and +1 to the maximum code.

use crate::error::{Error, Result};
use crate::format::{ByteOrder, Codec, TrackFormat};

/// Quantize one normalized sample. Inputs outside [-1, 1] are clamped
/// and NaN maps to silence.
pub fn quantize(sample: f64, bits: u16, signed: bool) -> Result<i64> {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };

    let value = match (bits, signed) {
        (8, true) => (s * 127.0).floor(),
        (8, false) => ((s + 1.0) * 127.5).floor(),
        (16, true) => (s * 32767.0).floor(),
        (16, false) => ((s + 1.0) * 32767.5).floor(),
        (24, true) => (s * 8_388_607.0).floor(),
        (24, false) => ((s + 1.0) * 8_388_607.5).floor(),
        (32, true) => (s * 2_147_483_647.0).floor(),
        (32, false) => ((s + 1.0) * 2_147_483_647.5).floor(),
        _ => return Err(Error::UnsupportedBitDepth(bits)),
    };
    Ok(value as i64)
}

/// Inverse of `quantize`, clamped to [-1, 1].
///
/// Unsigned codes subtract the midpoint `2^(bits-1)` before scaling.
pub fn dequantize(value: i64, bits: u16, signed: bool) -> Result<f64> {
    if !matches!(bits, 8 | 16 | 24 | 32) {
        return Err(Error::UnsupportedBitDepth(bits));
    }
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let centered = if signed {
        value
    } else {
        value - (1i64 << (bits - 1))
    };
    Ok((centered as f64 / max).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Int { bits: u16, signed: bool },
    Float32,
}

/// Per-format sample encoder/decoder.
///
/// Built once per format so the per-sample paths do no validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    encoding: Encoding,
    byte_order: ByteOrder,
    width: usize,
}

impl SampleCodec {
    pub fn for_format(format: &TrackFormat) -> Result<Self> {
        let bits = format.bits_per_sample();
        let encoding = match format.codec() {
            Codec::Float32 if bits == 32 => Encoding::Float32,
            Codec::Float32 => return Err(Error::UnsupportedBitDepth(bits)),
            codec if codec.is_pcm() => {
                if !matches!(bits, 8 | 16 | 24 | 32) {
                    return Err(Error::UnsupportedBitDepth(bits));
                }
                Encoding::Int {
                    bits,
                    signed: format.is_signed(),
                }
            }
            codec => {
                return Err(Error::UnsupportedCodec(format!(
                    "{} samples cannot be processed as PCM",
                    codec
                )))
            }
        };
        Ok(Self {
            encoding,
            byte_order: format.byte_order(),
            width: bits as usize / 8,
        })
    }

    /// Bytes per encoded sample
    pub fn width(&self) -> usize {
        self.width
    }

    /// Encode one sample into `out[..width]`
    pub fn encode(&self, sample: f64, out: &mut [u8]) -> Result<()> {
        match self.encoding {
            Encoding::Float32 => {
                let bytes = match self.byte_order {
                    ByteOrder::LittleEndian => (sample as f32).to_le_bytes(),
                    ByteOrder::BigEndian => (sample as f32).to_be_bytes(),
                };
                out[..4].copy_from_slice(&bytes);
            }
            Encoding::Int { bits, signed } => {
                let raw = quantize(sample, bits, signed)? as u64;
                write_uint(raw, &mut out[..self.width], self.byte_order);
            }
        }
        Ok(())
    }

    /// Decode one sample from `bytes[..width]`
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        match self.encoding {
            Encoding::Float32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                match self.byte_order {
                    ByteOrder::LittleEndian => f32::from_le_bytes(raw) as f64,
                    ByteOrder::BigEndian => f32::from_be_bytes(raw) as f64,
                }
            }
            Encoding::Int { bits, signed } => {
                let raw = read_uint(&bytes[..self.width], self.byte_order);
                let value = if signed {
                    let shift = 64 - bits as u32;
                    ((raw << shift) as i64) >> shift
                } else {
                    raw as i64
                };
                // bits were validated in for_format
                dequantize(value, bits, signed).unwrap_or(0.0)
            }
        }
    }
}

fn write_uint(value: u64, out: &mut [u8], order: ByteOrder) {
    let n = out.len();
    for i in 0..n {
        let byte = (value >> (8 * i)) as u8;
        match order {
            ByteOrder::LittleEndian => out[i] = byte,
            ByteOrder::BigEndian => out[n - 1 - i] = byte,
        }
    }
}

fn read_uint(bytes: &[u8], order: ByteOrder) -> u64 {
    let n = bytes.len();
    let mut value = 0u64;
    for i in 0..n {
        let byte = match order {
            ByteOrder::LittleEndian => bytes[i],
            ByteOrder::BigEndian => bytes[n - 1 - i],
        };
        value |= (byte as u64) << (8 * i);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::presets;

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize(1.0, 8, true).unwrap(), 127);
        assert_eq!(quantize(-1.0, 8, true).unwrap(), -127);
        assert_eq!(quantize(1.0, 8, false).unwrap(), 255);
        assert_eq!(quantize(-1.0, 8, false).unwrap(), 0);
        assert_eq!(quantize(1.0, 16, true).unwrap(), 32767);
        assert_eq!(quantize(1.0, 16, false).unwrap(), 65535);
        assert_eq!(quantize(-1.0, 24, true).unwrap(), -8_388_607);
        assert_eq!(quantize(1.0, 32, true).unwrap(), 2_147_483_647);
        assert_eq!(quantize(1.0, 32, false).unwrap(), 4_294_967_295);
        assert_eq!(quantize(0.0, 16, true).unwrap(), 0);
        assert_eq!(quantize(-0.5, 16, true).unwrap(), -16384);
    }

    #[test]
    fn test_quantize_range_for_all_widths() {
        for bits in [8u16, 16, 24, 32] {
            let max = (1i64 << (bits - 1)) - 1;
            for i in -100..=100 {
                let s = i as f64 / 100.0;
                let signed = quantize(s, bits, true).unwrap();
                assert!((-max..=max).contains(&signed), "{} bits signed: {}", bits, signed);
                let unsigned = quantize(s, bits, false).unwrap();
                assert!(
                    (0..=(1i64 << bits) - 1).contains(&unsigned),
                    "{} bits unsigned: {}",
                    bits,
                    unsigned
                );
            }
        }
    }

    #[test]
    fn test_unsupported_width() {
        assert!(matches!(quantize(0.1, 12, true), Err(Error::UnsupportedBitDepth(12))));
        assert!(matches!(dequantize(0, 0, true), Err(Error::UnsupportedBitDepth(0))));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(quantize(3.0, 16, true).unwrap(), 32767);
        assert_eq!(quantize(f64::NAN, 16, true).unwrap(), 0);
    }

    #[test]
    fn test_24bit_byte_orders() {
        let le = SampleCodec::for_format(&presets::wav24bit_stereo_48khz()).unwrap();
        let mut out = [0u8; 3];
        le.encode(-1.0, &mut out).unwrap();
        // -8388607 = 0x800001
        assert_eq!(out, [0x01, 0x00, 0x80]);
        assert!((le.decode(&out) + 1.0).abs() < 1e-9);

        let be_format = TrackFormat::pcm("raw", 1, 24, 48000, true, ByteOrder::BigEndian);
        let be = SampleCodec::for_format(&be_format).unwrap();
        be.encode(-1.0, &mut out).unwrap();
        assert_eq!(out, [0x80, 0x00, 0x01]);
    }

    #[test]
    fn test_codec_round_trip_is_close() {
        let formats = [
            presets::wav8bit_mono_44khz(),
            presets::wav16bit_stereo_44khz(),
            presets::wav24bit_stereo_96khz(),
            TrackFormat::pcm("raw", 1, 32, 48000, true, ByteOrder::BigEndian),
            TrackFormat::pcm("raw", 1, 16, 48000, false, ByteOrder::LittleEndian),
            presets::wav32bit_float_stereo_48khz(),
        ];
        for format in &formats {
            let codec = SampleCodec::for_format(format).unwrap();
            let step = 2.0 / ((1u64 << format.bits_per_sample().min(24)) as f64);
            let mut buf = vec![0u8; codec.width()];
            for s in [-0.9, -0.25, 0.0, 0.3, 0.75] {
                codec.encode(s, &mut buf).unwrap();
                let back = codec.decode(&buf);
                assert!(
                    (back - s).abs() <= step * 2.0,
                    "{}: {} -> {}",
                    format,
                    s,
                    back
                );
            }
        }
    }

    #[test]
    fn test_compressed_formats_rejected() {
        let err = SampleCodec::for_format(&presets::mp3_stereo_128kbps()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCodec(_)));
    }
}

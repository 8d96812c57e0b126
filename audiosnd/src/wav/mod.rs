//! WAV container support
//!
//! - `chunk`: RIFF chunk framing
//! - `reader`: RIFF/WAVE parsing into a `Track`
//! - `writer`: `Track` serialization

pub mod chunk;
pub mod reader;
pub mod writer;

pub use chunk::ChunkId;
pub use reader::{
    read_wav, read_wav_format, read_wav_summary, read_wav_with_progress, FormatChunk, WavFile,
    WavSummary,
};
pub use writer::write_wav;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::presets;
    use crate::track::{SampleBuffer, Track, TrackMetadata};
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_write_then_read_is_identical() {
        for format in [
            presets::wav8bit_mono_44khz(),
            presets::wav16bit_stereo_44khz(),
            presets::wav24bit_stereo_48khz(),
        ] {
            // The reader always reports signed samples
            let format = crate::format::TrackFormat::new(
                "wav",
                format.channels(),
                format.bits_per_sample(),
                format.sample_rate(),
                true,
                format.byte_order(),
                format.codec(),
            );
            let len = format.frame_size() * 480;
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let buffer = SampleBuffer::from_vec(bytes.clone(), format.byte_order());
            let duration = Duration::from_millis(crate::format::duration_ms(&format, len as u64));
            let track = Track::new(buffer, duration, format.clone(), TrackMetadata::new()).unwrap();

            let mut out = Vec::new();
            write_wav(&track, &mut out).unwrap();
            let back = read_wav(Cursor::new(out)).unwrap().into_track().unwrap();

            assert_eq!(back.format(), &format);
            assert_eq!(back.buffer().as_bytes(), &bytes[..]);
            assert_eq!(back.duration(), duration);
        }
    }
}

//! Track: format + sample buffer + duration + metadata

pub mod buffer;
pub mod metadata;

pub use buffer::{BufferView, SampleBuffer};
pub use metadata::{MetaKey, MetaType, MetaValue, TrackMetadata};

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use std::time::Duration;

/// Decoded audio track.
///
/// Owns its sample buffer. For PCM formats the buffer holds at least
/// `duration × sample_rate` whole frames and shares the format's byte order.
/// Only the metadata may change after construction.
#[derive(Debug, Clone)]
pub struct Track {
    buffer: SampleBuffer,
    duration: Duration,
    format: TrackFormat,
    metadata: TrackMetadata,
}

impl Track {
    pub fn new(
        buffer: SampleBuffer,
        duration: Duration,
        format: TrackFormat,
        metadata: TrackMetadata,
    ) -> Result<Self> {
        if buffer.byte_order() != format.byte_order() {
            return Err(Error::InvalidTrack(format!(
                "buffer byte order {:?} differs from format {}",
                buffer.byte_order(),
                format
            )));
        }

        if format.is_pcm() {
            let frames = duration.as_nanos() * format.sample_rate() as u128 / 1_000_000_000;
            let required = frames * format.frame_size() as u128;
            if required > buffer.len() as u128 {
                return Err(Error::InvalidTrack(format!(
                    "{} bytes cannot hold {:?} of {}",
                    buffer.len(),
                    duration,
                    format
                )));
            }
        }

        Ok(Self {
            buffer,
            duration,
            format,
            metadata,
        })
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn format(&self) -> &TrackFormat {
        &self.format
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut TrackMetadata {
        &mut self.metadata
    }

    pub fn set_metadata(&mut self, metadata: TrackMetadata) {
        self.metadata = metadata;
    }

    /// Number of whole frames in the buffer
    pub fn frame_count(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            size => self.buffer.len() / size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{presets, ByteOrder};

    #[test]
    fn test_track_invariants() {
        let format = presets::wav16bit_stereo_44khz();
        let buffer = SampleBuffer::zeroed(44100 * 4, ByteOrder::LittleEndian);
        let track = Track::new(buffer, Duration::from_secs(1), format, TrackMetadata::new()).unwrap();
        assert_eq!(track.frame_count(), 44100);

        let short = SampleBuffer::zeroed(100, ByteOrder::LittleEndian);
        let err = Track::new(
            short,
            Duration::from_secs(1),
            presets::wav16bit_stereo_44khz(),
            TrackMetadata::new(),
        );
        assert!(matches!(err, Err(Error::InvalidTrack(_))));
    }

    #[test]
    fn test_byte_order_must_match() {
        let buffer = SampleBuffer::zeroed(16, ByteOrder::BigEndian);
        let result = Track::new(
            buffer,
            Duration::ZERO,
            presets::wav16bit_stereo_44khz(),
            TrackMetadata::new(),
        );
        assert!(matches!(result, Err(Error::InvalidTrack(_))));
    }

    #[test]
    fn test_fractional_frames_are_tolerated() {
        // 1 ms at 44.1 kHz is 44.1 frames; 44 whole frames are enough
        let format = presets::wav16bit_mono_44khz();
        let buffer = SampleBuffer::zeroed(44 * 2, ByteOrder::LittleEndian);
        assert!(Track::new(buffer, Duration::from_millis(1), format, TrackMetadata::new()).is_ok());
    }
}

//! RIFF/WAVE writer
//!
//! Emits the canonical 44-byte header followed by the track's samples.
//! 32-bit float tracks are tagged with compression code 3.

use super::reader::{WAVE_FORMAT_IEEE_FLOAT, WAVE_FORMAT_PCM};
use crate::error::{Error, Result};
use crate::format::{ByteOrder, Codec, TrackFormat};
use crate::track::Track;
use std::io::Write;
use tracing::debug;

/// Length of the header written before the sample bytes
pub const HEADER_LEN: usize = 44;

/// Serialize a PCM track as a WAV stream
pub fn write_wav<W: Write>(track: &Track, mut sink: W) -> Result<()> {
    let format = track.format();
    check_writable(format)?;

    let data = track.buffer().rewound();
    let data_size = u32::try_from(data.len())
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| {
            Error::TrackExport(format!("{} data bytes exceed the RIFF size limit", data.len()))
        })?;

    let header = build_header(format, data_size);
    sink.write_all(&header).map_err(export_err)?;
    sink.write_all(&data).map_err(export_err)?;
    sink.flush().map_err(export_err)?;

    debug!("Wrote WAV: {} ({} data bytes)", format, data_size);
    Ok(())
}

fn check_writable(format: &TrackFormat) -> Result<()> {
    if !format.is_pcm() {
        return Err(Error::TrackExport(format!(
            "cannot write {} as WAV: not a PCM format",
            format
        )));
    }
    if !matches!(format.bits_per_sample(), 8 | 16 | 24 | 32) {
        return Err(Error::TrackExport(format!(
            "cannot write {}-bit samples as WAV",
            format.bits_per_sample()
        )));
    }
    if format.byte_order() != ByteOrder::LittleEndian {
        return Err(Error::TrackExport(format!(
            "WAV samples are little-endian, track is {}",
            format
        )));
    }
    Ok(())
}

fn build_header(format: &TrackFormat, data_size: u32) -> [u8; HEADER_LEN] {
    let audio_format = if format.bits_per_sample() == 32 && format.codec() == Codec::Float32 {
        WAVE_FORMAT_IEEE_FLOAT
    } else {
        WAVE_FORMAT_PCM
    };
    let block_align = format.frame_size() as u16;
    let byte_rate = format.sample_rate() * block_align as u32;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&audio_format.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels().to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate().to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample().to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

fn export_err(e: std::io::Error) -> Error {
    Error::TrackExport(e.to_string())
}

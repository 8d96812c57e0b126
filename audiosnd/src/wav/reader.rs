//! RIFF/WAVE reader
//!
//! Validates the RIFF/WAVE framing, walks the chunk list and extracts the
//! `fmt ` and `data` chunks. Only integer PCM (compression code 1) is
//! accepted. Unknown chunks are skipped and their tags recorded.

use super::chunk::{ChunkId, ChunkReader};
use crate::error::{Error, Result};
use crate::format::{self, ByteOrder, Codec, TrackFormat};
use crate::track::{SampleBuffer, Track, TrackMetadata};
use std::io::{BufReader, Read};
use std::time::Duration;
use tracing::debug;

/// Compression code of integer PCM in the `fmt ` chunk
pub const WAVE_FORMAT_PCM: u16 = 1;

/// Compression code of IEEE float in the `fmt ` chunk
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

const FMT_MIN_LEN: usize = 16;

/// Raw `fmt ` chunk fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChunk {
    pub compression_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < FMT_MIN_LEN {
            return Err(Error::ContainerFormat(format!(
                "fmt chunk is {} bytes, need at least {}",
                body.len(),
                FMT_MIN_LEN
            )));
        }
        let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);
        Ok(Self {
            compression_code: u16_at(0),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            byte_rate: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        })
    }

    /// Track format described by this chunk
    pub fn to_format(&self) -> Result<TrackFormat> {
        if self.compression_code != WAVE_FORMAT_PCM {
            return Err(Error::UnsupportedCodec(format!(
                "WAV compression code 0x{:04X} (only PCM is supported)",
                self.compression_code
            )));
        }
        let codec = Codec::for_pcm_bits(self.bits_per_sample).ok_or_else(|| {
            Error::UnsupportedCodec(format!("{}-bit PCM", self.bits_per_sample))
        })?;
        if self.channels == 0 {
            return Err(Error::ContainerFormat("fmt chunk declares 0 channels".to_string()));
        }
        Ok(TrackFormat::new(
            "wav",
            self.channels,
            self.bits_per_sample,
            self.sample_rate,
            true,
            ByteOrder::LittleEndian,
            codec,
        ))
    }
}

/// Parsed WAV file
#[derive(Debug, Clone)]
pub struct WavFile {
    pub format: TrackFormat,
    pub data: Vec<u8>,
    /// Every chunk tag encountered, in stream order
    pub chunks: Vec<ChunkId>,
}

impl WavFile {
    /// Duration of the payload per the format's byte rate
    pub fn duration(&self) -> Duration {
        Duration::from_millis(format::duration_ms(&self.format, self.data.len() as u64))
    }

    pub fn into_track(self) -> Result<Track> {
        let duration = self.duration();
        let buffer = SampleBuffer::from_vec(self.data, self.format.byte_order());
        Track::new(buffer, duration, self.format, TrackMetadata::new())
    }
}

/// Parse a complete WAV stream
pub fn read_wav<R: Read>(source: R) -> Result<WavFile> {
    read_wav_with_progress(source, &mut |_| {})
}

/// Parse a complete WAV stream, reporting bytes of `data` copied so far
pub fn read_wav_with_progress<R: Read>(
    source: R,
    progress: &mut dyn FnMut(u64),
) -> Result<WavFile> {
    let mut reader = open(source)?;
    let mut chunks = Vec::new();
    let mut format = None;
    let mut data = None;

    while let Some(header) = reader.next_header()? {
        chunks.push(header.id);
        match header.id {
            ChunkId::Fmt if format.is_none() => {
                let body = reader.read_body(&header, &mut |_| {})?;
                format = Some(FormatChunk::parse(&body)?.to_format()?);
            }
            ChunkId::Data if data.is_none() => {
                data = Some(reader.read_body(&header, progress)?);
            }
            _ => reader.skip_body(&header)?,
        }
    }

    let format = format.ok_or_else(|| Error::ContainerFormat("missing fmt chunk".to_string()))?;
    let data = data.ok_or_else(|| Error::ContainerFormat("missing data chunk".to_string()))?;

    debug!(
        "Parsed WAV: {} ({} data bytes, chunks: {})",
        format,
        data.len(),
        chunks.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",")
    );

    Ok(WavFile {
        format,
        data,
        chunks,
    })
}

/// Read only as far as the `fmt ` chunk and return the format
pub fn read_wav_format<R: Read>(source: R) -> Result<TrackFormat> {
    let mut reader = open(source)?;
    while let Some(header) = reader.next_header()? {
        if header.id == ChunkId::Fmt {
            let body = reader.read_body(&header, &mut |_| {})?;
            return FormatChunk::parse(&body)?.to_format();
        }
        reader.skip_body(&header)?;
    }
    Err(Error::ContainerFormat("missing fmt chunk".to_string()))
}

/// Header-level summary: format, payload size and chunk list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavSummary {
    pub format: TrackFormat,
    pub data_len: u64,
    pub chunks: Vec<ChunkId>,
}

impl WavSummary {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(format::duration_ms(&self.format, self.data_len))
    }
}

/// Walk every chunk without copying the payload
pub fn read_wav_summary<R: Read>(source: R) -> Result<WavSummary> {
    let mut reader = open(source)?;
    let mut chunks = Vec::new();
    let mut format = None;
    let mut data_len = None;

    while let Some(header) = reader.next_header()? {
        chunks.push(header.id);
        match header.id {
            ChunkId::Fmt if format.is_none() => {
                let body = reader.read_body(&header, &mut |_| {})?;
                format = Some(FormatChunk::parse(&body)?.to_format()?);
            }
            ChunkId::Data if data_len.is_none() => {
                data_len = Some(header.size as u64);
                reader.skip_body(&header)?;
            }
            _ => reader.skip_body(&header)?,
        }
    }

    Ok(WavSummary {
        format: format.ok_or_else(|| Error::ContainerFormat("missing fmt chunk".to_string()))?,
        data_len: data_len
            .ok_or_else(|| Error::ContainerFormat("missing data chunk".to_string()))?,
        chunks,
    })
}

fn open<R: Read>(source: R) -> Result<ChunkReader<BufReader<R>>> {
    let mut reader = ChunkReader::new(BufReader::new(source));
    reader.expect_tag(b"RIFF")?;
    // Overall RIFF length is not trusted for validation
    let _riff_len = reader.read_u32_le().map_err(|_| {
        Error::ContainerFormat("missing RIFF length".to_string())
    })?;
    reader.expect_tag(b"WAVE")?;
    Ok(reader)
}

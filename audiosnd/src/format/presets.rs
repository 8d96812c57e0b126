//! Named format presets
//!
//! Ready-made descriptors for common container/quality combinations.
//! Compressed presets carry a sample width of 0.

use super::{ByteOrder, Codec, TrackFormat};

const LE: ByteOrder = ByteOrder::LittleEndian;
const BE: ByteOrder = ByteOrder::BigEndian;

fn wav(channels: u16, bits: u16, sample_rate: u32) -> TrackFormat {
    TrackFormat::pcm("wav", channels, bits, sample_rate, true, LE)
}

fn wav_float(channels: u16, sample_rate: u32) -> TrackFormat {
    TrackFormat::new("wav", channels, 32, sample_rate, true, LE, Codec::Float32)
}

// WAV

pub fn wav8bit_mono_44khz() -> TrackFormat {
    TrackFormat::pcm("wav", 1, 8, 44100, false, LE)
}

pub fn wav16bit_mono_8khz() -> TrackFormat {
    wav(1, 16, 8000)
}

pub fn wav16bit_mono_44khz() -> TrackFormat {
    wav(1, 16, 44100)
}

/// CD quality
pub fn wav16bit_stereo_44khz() -> TrackFormat {
    wav(2, 16, 44100)
}

pub fn wav24bit_stereo_44khz() -> TrackFormat {
    wav(2, 24, 44100)
}

pub fn wav32bit_float_stereo_44khz() -> TrackFormat {
    wav_float(2, 44100)
}

pub fn wav16bit_stereo_48khz() -> TrackFormat {
    wav(2, 16, 48000)
}

pub fn wav24bit_stereo_48khz() -> TrackFormat {
    wav(2, 24, 48000)
}

pub fn wav32bit_float_stereo_48khz() -> TrackFormat {
    wav_float(2, 48000)
}

pub fn wav16bit_stereo_96khz() -> TrackFormat {
    wav(2, 16, 96000)
}

pub fn wav24bit_stereo_96khz() -> TrackFormat {
    wav(2, 24, 96000)
}

pub fn wav24bit_stereo_192khz() -> TrackFormat {
    wav(2, 24, 192000)
}

pub fn raw16bit_stereo_44khz() -> TrackFormat {
    TrackFormat::pcm("raw", 2, 16, 44100, true, LE)
}

pub fn studio_master_24bit_96khz() -> TrackFormat {
    wav(2, 24, 96000)
}

pub fn studio_master_32bit_float_192khz() -> TrackFormat {
    wav_float(2, 192000)
}

// Voice, games and multichannel

pub fn telephone_mono_8khz() -> TrackFormat {
    wav(1, 16, 8000)
}

pub fn game_audio_22khz() -> TrackFormat {
    wav(1, 16, 22050)
}

pub fn game_audio_stereo_32khz() -> TrackFormat {
    wav(2, 16, 32000)
}

/// 5.1 surround, 24-bit at 48 kHz
pub fn surround_51() -> TrackFormat {
    wav(6, 24, 48000)
}

/// 7.1 surround, 24-bit at 48 kHz
pub fn surround_71() -> TrackFormat {
    wav(8, 24, 48000)
}

/// 12-channel bed, 32-bit float at 48 kHz
pub fn dolby_atmos() -> TrackFormat {
    wav_float(12, 48000)
}

// Compressed families

pub fn flac16bit_stereo_44khz() -> TrackFormat {
    TrackFormat::new("flac", 2, 16, 44100, true, LE, Codec::Flac)
}

pub fn flac24bit_stereo_96khz() -> TrackFormat {
    TrackFormat::new("flac", 2, 24, 96000, true, LE, Codec::Flac)
}

fn mp3_stereo() -> TrackFormat {
    TrackFormat::new("mp3", 2, 0, 44100, true, BE, Codec::Mp3)
}

pub fn mp3_stereo_64kbps() -> TrackFormat {
    mp3_stereo()
}

pub fn mp3_stereo_128kbps() -> TrackFormat {
    mp3_stereo()
}

pub fn mp3_stereo_192kbps() -> TrackFormat {
    mp3_stereo()
}

pub fn mp3_stereo_320kbps() -> TrackFormat {
    mp3_stereo()
}

pub fn opus_webm() -> TrackFormat {
    TrackFormat::new("webm", 2, 0, 48000, true, LE, Codec::Opus)
}

pub fn aac_m4a() -> TrackFormat {
    TrackFormat::new("m4a", 2, 0, 44100, true, BE, Codec::Aac)
}

pub fn vorbis_ogg() -> TrackFormat {
    TrackFormat::new("ogg", 2, 0, 44100, true, LE, Codec::Vorbis)
}

pub fn aiff16bit_stereo_44khz() -> TrackFormat {
    TrackFormat::pcm("aiff", 2, 16, 44100, true, BE)
}

//! Format size helpers, quality presets and classifiers

use super::{presets, TrackFormat};

/// Bytes needed to hold `seconds` of audio in `format`.
///
/// Uses the bit rate when known, otherwise the raw sample parameters.
pub fn file_size(format: &TrackFormat, seconds: u64) -> u64 {
    let bit_rate = format.bit_rate();
    if bit_rate > 0 {
        bit_rate * seconds / 8
    } else {
        format.sample_rate() as u64
            * format.bits_per_sample() as u64
            * format.channels() as u64
            * seconds
            / 8
    }
}

/// Playback length in milliseconds of `bytes` of `format` audio; 0 when the
/// format has no byte rate.
pub fn duration_ms(format: &TrackFormat, bytes: u64) -> u64 {
    let bytes_per_second = format.sample_rate() as u64
        * (format.bits_per_sample() as u64 / 8)
        * format.channels() as u64;
    if bytes_per_second == 0 {
        return 0;
    }
    bytes * 1000 / bytes_per_second
}

/// Bytes covering `ms` milliseconds, always a whole number of frames.
///
/// At least one frame per millisecond is used for rates below 1 kHz.
pub fn chunk_size(format: &TrackFormat, ms: u64) -> usize {
    let frames_per_ms = (format.sample_rate() as usize / 1000).max(1);
    frames_per_ms * format.frame_size() * ms as usize
}

/// Typical use cases mapped to a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityPreset {
    Telephone,
    Radio,
    Podcast,
    MusicMp3,
    MusicLossless,
    Game,
    Dvd,
    Bluray,
    StudioMaster,
    Surround51,
    DolbyAtmos,
}

impl QualityPreset {
    pub fn format(&self) -> TrackFormat {
        match self {
            QualityPreset::Telephone => presets::telephone_mono_8khz(),
            QualityPreset::Radio => presets::wav16bit_mono_44khz(),
            QualityPreset::Podcast => presets::wav16bit_stereo_44khz(),
            QualityPreset::MusicMp3 => presets::mp3_stereo_192kbps(),
            QualityPreset::MusicLossless => presets::flac16bit_stereo_44khz(),
            QualityPreset::Game => presets::game_audio_stereo_32khz(),
            QualityPreset::Dvd => presets::wav24bit_stereo_48khz(),
            QualityPreset::Bluray => presets::wav24bit_stereo_96khz(),
            QualityPreset::StudioMaster => presets::studio_master_24bit_96khz(),
            QualityPreset::Surround51 => presets::surround_51(),
            QualityPreset::DolbyAtmos => presets::dolby_atmos(),
        }
    }
}

/// Resolve a format alias such as `cd_quality` or `mp3_high`.
///
/// Unknown names fall back to CD quality.
pub fn format_from_name(name: &str) -> TrackFormat {
    match name.trim().to_lowercase().as_str() {
        "cd_quality" | "redbook" => presets::wav16bit_stereo_44khz(),
        "dvd_audio" | "broadcast" => presets::wav24bit_stereo_48khz(),
        "bluray_audio" | "film" => presets::wav24bit_stereo_96khz(),
        "studio_24_96" => presets::studio_master_24bit_96khz(),
        "mp3_low" => presets::mp3_stereo_64kbps(),
        "mp3_medium" => presets::mp3_stereo_128kbps(),
        "mp3_high" => presets::mp3_stereo_192kbps(),
        "mp3_extreme" => presets::mp3_stereo_320kbps(),
        "flac_cd" => presets::flac16bit_stereo_44khz(),
        "flac_hd" => presets::flac24bit_stereo_96khz(),
        "telephone" => presets::telephone_mono_8khz(),
        "game" => presets::game_audio_stereo_32khz(),
        "surround_51" => presets::surround_51(),
        "atmos" => presets::dolby_atmos(),
        _ => presets::wav16bit_stereo_44khz(),
    }
}

pub fn is_cd_compatible(format: &TrackFormat) -> bool {
    format.sample_rate() == 44100 && format.channels() == 2 && format.bits_per_sample() == 16
}

pub fn is_dvd_compatible(format: &TrackFormat) -> bool {
    format.sample_rate() == 48000 && format.bits_per_sample() >= 16
}

pub fn is_broadcast_compatible(format: &TrackFormat) -> bool {
    is_dvd_compatible(format) && format.is_signed()
}

pub fn is_telephone_quality(format: &TrackFormat) -> bool {
    format.sample_rate() <= 8000 && format.channels() == 1
}

pub fn is_studio_master(format: &TrackFormat) -> bool {
    format.sample_rate() >= 96000 && format.bits_per_sample() >= 24
}

pub fn is_surround_51(format: &TrackFormat) -> bool {
    format.channels() == 6
}

pub fn is_atmos(format: &TrackFormat) -> bool {
    format.channels() >= 12
}

pub fn is_lossy_extension(extension: &str) -> bool {
    matches!(
        normalize_extension(extension).as_str(),
        "mp3" | "ogg" | "aac" | "m4a" | "opus" | "wma"
    )
}

pub fn is_lossless_extension(extension: &str) -> bool {
    matches!(
        normalize_extension(extension).as_str(),
        "wav" | "wave" | "aiff" | "flac" | "alac" | "ape" | "wv" | "wavpack"
    )
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

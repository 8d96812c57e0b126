//! WAV reading and writing through files, cross-checked with hound

mod helpers;

use audiosnd::format::presets;
use audiosnd::generator::{generate_sine, Note};
use audiosnd::loader::{wav_handler, Source, TrackLoader};
use audiosnd::track::MetaKey;
use audiosnd::wav::{read_wav, write_wav};
use audiosnd::Error;
use helpers::{fmt_body, generate_sine_wav, riff_bytes, TEST_SAMPLE_RATE};
use std::fs::File;
use std::io::Cursor;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_one_second_sine_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sine.wav");
    let format = presets::wav16bit_stereo_44khz();
    let track = generate_sine(&format, Duration::from_secs(1), Note::A2).unwrap();

    write_wav(&track, File::create(&path).unwrap()).unwrap();
    let back = read_wav(File::open(&path).unwrap())
        .unwrap()
        .into_track()
        .unwrap();

    assert_eq!(back.format().bit_rate(), 1_411_200);
    assert_eq!(back.buffer().len(), 44100 * 2 * 2);
    assert_eq!(back.buffer().len(), 176_400);
    assert_eq!(back.duration(), Duration::from_secs(1));
    assert_eq!(back.format(), track.format());
    assert_eq!(back.buffer().as_bytes(), track.buffer().as_bytes());
}

#[test]
fn test_reads_hound_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hound.wav");
    generate_sine_wav(&path, 250, 440.0, 0.5).unwrap();

    let expected: Vec<i16> = hound::WavReader::open(&path)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect();

    let wav = read_wav(File::open(&path).unwrap()).unwrap();
    assert_eq!(wav.format.channels(), 2);
    assert_eq!(wav.format.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(wav.format.bits_per_sample(), 16);

    let decoded: Vec<i16> = wav
        .data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(decoded, expected);
    assert_eq!(wav.duration(), Duration::from_millis(250));
}

#[test]
fn test_hound_reads_our_output() {
    for format in [
        presets::wav16bit_mono_8khz(),
        presets::wav16bit_stereo_48khz(),
        presets::wav8bit_mono_44khz(),
    ] {
        let track = generate_sine(&format, Duration::from_millis(100), Note::A2).unwrap();
        let mut bytes = Vec::new();
        write_wav(&track, &mut bytes).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, format.channels());
        assert_eq!(spec.sample_rate, format.sample_rate());
        assert_eq!(spec.bits_per_sample, format.bits_per_sample());
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(
            reader.len() as usize,
            track.buffer().len() / format.bytes_per_sample()
        );
    }
}

#[test]
fn test_mp3_in_wav_rejected() {
    let bytes = riff_bytes(&[
        (b"fmt ", fmt_body(0x0055, 2, 44100, 16)),
        (b"data", vec![0u8; 64]),
    ]);
    assert!(matches!(
        read_wav(Cursor::new(bytes)),
        Err(Error::UnsupportedCodec(_))
    ));
}

#[test]
fn test_short_fmt_chunk_is_truncated() {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&24u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&fmt_body(1, 2, 44100, 16)[..12]);

    assert!(matches!(read_wav(Cursor::new(bytes)), Err(Error::Truncated(_))));
}

#[test]
fn test_extra_chunks_are_skipped() {
    let samples: Vec<u8> = (0..400u32).map(|i| (i % 256) as u8).collect();
    let bytes = riff_bytes(&[
        (b"LIST", b"INFOISFT\x05\x00\x00\x00test\x00".to_vec()),
        (b"fmt ", fmt_body(1, 1, 8000, 16)),
        (b"fact", vec![1, 2, 3]),
        (b"data", samples.clone()),
    ]);
    let wav = read_wav(Cursor::new(bytes)).unwrap();
    assert_eq!(wav.data, samples);
    assert_eq!(wav.chunks.len(), 4);
}

#[test]
fn test_loader_metadata_for_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("meta.wav");
    generate_sine_wav(&path, 500, 440.0, 0.25).unwrap();

    let handler = wav_handler();
    let loader = handler.loader().unwrap();
    let meta = loader.read_metadata(Source::from(path.as_path())).unwrap();

    assert_eq!(meta.get_integer(MetaKey::SampleRate), Some(44100));
    assert_eq!(meta.get_integer(MetaKey::Channels), Some(2));
    assert_eq!(meta.get_integer(MetaKey::BitDepth), Some(16));
    assert_eq!(meta.get_duration(MetaKey::Duration), Some(Duration::from_millis(500)));
    assert_eq!(meta.get_path(MetaKey::FilePath), Some(path.as_path()));
    assert_eq!(meta.get_integer(MetaKey::FileSize), Some(44 + 88200));
}

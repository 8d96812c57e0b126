//! Track mixer
//!
//! Sums any number of PCM tracks into one track of the output format.
//!
//! Per source track and output frame:
//! - resample by linear interpolation between the two nearest source frames
//! - map channels (copy, mono fan-out, average to mono, or truncate/zero-fill)
//! - accumulate into the output frame
//!
//! The accumulated frame is soft-clipped with `tanh` and re-quantized to the
//! output bit depth. Shorter tracks are zero-padded.

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::quantize::SampleCodec;
use crate::track::{SampleBuffer, Track, TrackMetadata};
use serde_json::json;
use snd_common::{ChannelType, EventSink};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Mixer state: output format plus an ordered list of source tracks
pub struct TrackMixer {
    output_format: RwLock<TrackFormat>,
    tracks: RwLock<Arc<Vec<Arc<Track>>>>,
    events: Option<Arc<dyn EventSink>>,
}

impl TrackMixer {
    pub fn new(output_format: TrackFormat) -> Self {
        Self {
            output_format: RwLock::new(output_format),
            tracks: RwLock::new(Arc::new(Vec::new())),
            events: None,
        }
    }

    /// Publish `MIXER_CHANNEL_ADDED` / `MIXER_CHANNEL_REMOVED` to the sink
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn set_output_format(&self, format: TrackFormat) {
        *self.output_format.write().unwrap_or_else(|e| e.into_inner()) = format;
    }

    pub fn output_format(&self) -> TrackFormat {
        self.output_format
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Duplicates are allowed and mixed once per occurrence
    pub fn add_track(&self, track: Arc<Track>) {
        let count = self.update(|list| list.push(track));
        self.publish(ChannelType::MixerChannelAdded, count);
    }

    /// Remove the first occurrence of this exact track
    pub fn remove_track(&self, track: &Arc<Track>) -> bool {
        let mut removed = false;
        let count = self.update(|list| {
            if let Some(pos) = list.iter().position(|t| Arc::ptr_eq(t, track)) {
                list.remove(pos);
                removed = true;
            }
        });
        if removed {
            self.publish(ChannelType::MixerChannelRemoved, count);
        }
        removed
    }

    pub fn clear(&self) {
        self.update(|list| list.clear());
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn tracks(&self) -> Arc<Vec<Arc<Track>>> {
        self.snapshot()
    }

    /// Mix a snapshot of the current track list into a new track
    pub fn mix(&self) -> Result<Track> {
        let tracks = self.snapshot();
        let format = self.output_format();
        mix_tracks(&tracks, &format)
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Track>>> {
        self.tracks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<Track>>)) -> usize {
        let mut guard = self.tracks.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<Arc<Track>> = guard.iter().cloned().collect();
        f(&mut next);
        let len = next.len();
        *guard = Arc::new(next);
        len
    }

    fn publish(&self, channel: ChannelType, count: usize) {
        if let Some(events) = &self.events {
            events.publish(channel, json!({ "track_count": count }));
        }
    }
}

impl std::fmt::Debug for TrackMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackMixer")
            .field("output_format", &self.output_format())
            .field("tracks", &self.track_count())
            .finish()
    }
}

/// Decoded view over one source track
struct SourceReader<'a> {
    bytes: &'a [u8],
    codec: SampleCodec,
    channels: usize,
    frames: usize,
    frame_size: usize,
    /// Source frames advanced per output frame
    step: f64,
    resample: bool,
}

impl<'a> SourceReader<'a> {
    fn new(track: &'a Track, output: &TrackFormat) -> Result<Self> {
        let format = track.format();
        let codec = SampleCodec::for_format(format)
            .map_err(|e| Error::Mixing(format!("cannot mix {}: {}", format, e)))?;
        if format.channels() == 0 || format.sample_rate() == 0 {
            return Err(Error::Mixing(format!("cannot mix {}", format)));
        }
        let bytes = track.buffer().as_bytes();
        let frame_size = format.frame_size();
        Ok(Self {
            bytes,
            codec,
            channels: format.channels() as usize,
            frames: bytes.len() / frame_size,
            frame_size,
            step: format.sample_rate() as f64 / output.sample_rate() as f64,
            resample: format.sample_rate() != output.sample_rate(),
        })
    }

    fn sample(&self, frame: usize, channel: usize) -> f64 {
        let start = frame * self.frame_size + channel * self.codec.width();
        self.codec.decode(&self.bytes[start..start + self.codec.width()])
    }

    /// Source channel values at output frame `index`, zero past the end
    fn frame_at(&self, index: usize, out: &mut [f64]) {
        if !self.resample {
            if index >= self.frames {
                out.fill(0.0);
            } else {
                for (c, v) in out.iter_mut().enumerate() {
                    *v = self.sample(index, c);
                }
            }
            return;
        }

        let pos = index as f64 * self.step;
        let i0 = pos.floor() as usize;
        if i0 >= self.frames {
            out.fill(0.0);
            return;
        }
        let i1 = (i0 + 1).min(self.frames - 1);
        let frac = pos - i0 as f64;
        for (c, v) in out.iter_mut().enumerate() {
            let a = self.sample(i0, c);
            let b = self.sample(i1, c);
            *v = a + (b - a) * frac;
        }
    }
}

/// Add `src` (source channel values) into `acc` (output channel accumulators)
fn map_channels(src: &[f64], acc: &mut [f64]) {
    if src.len() == acc.len() {
        for (a, s) in acc.iter_mut().zip(src) {
            *a += s;
        }
    } else if src.len() == 1 {
        for a in acc.iter_mut() {
            *a += src[0];
        }
    } else if acc.len() == 1 {
        acc[0] += src.iter().sum::<f64>() / src.len() as f64;
    } else {
        for (a, s) in acc.iter_mut().zip(src) {
            *a += s;
        }
    }
}

/// Output frame count covering `duration` at `sample_rate`, rounded up
fn frames_for(duration: Duration, sample_rate: u32) -> usize {
    let scaled = duration.as_nanos() * sample_rate as u128;
    scaled.div_ceil(1_000_000_000) as usize
}

/// Mix `tracks` into a single track of `output`
pub fn mix_tracks(tracks: &[Arc<Track>], output: &TrackFormat) -> Result<Track> {
    if tracks.is_empty() {
        return Err(Error::Mixing("no tracks to mix".to_string()));
    }
    let out_codec = SampleCodec::for_format(output)
        .map_err(|e| Error::Mixing(format!("cannot mix into {}: {}", output, e)))?;
    if output.channels() == 0 || output.sample_rate() == 0 {
        return Err(Error::Mixing(format!("cannot mix into {}", output)));
    }

    let sources = tracks
        .iter()
        .map(|t| SourceReader::new(t, output))
        .collect::<Result<Vec<_>>>()?;

    let duration = tracks
        .iter()
        .map(|t| t.duration())
        .max()
        .unwrap_or_default();
    let frames = frames_for(duration, output.sample_rate());
    let out_channels = output.channels() as usize;
    let width = out_codec.width();
    let frame_size = output.frame_size();

    let mut buffer = SampleBuffer::zeroed(frames * frame_size, output.byte_order());
    let out = buffer.as_mut_bytes();
    let mut acc = vec![0.0f64; out_channels];
    let mut scratch: Vec<Vec<f64>> = sources.iter().map(|s| vec![0.0; s.channels]).collect();

    for frame in 0..frames {
        acc.fill(0.0);
        for (source, values) in sources.iter().zip(scratch.iter_mut()) {
            source.frame_at(frame, values);
            map_channels(values, &mut acc);
        }
        let base = frame * frame_size;
        for (c, sum) in acc.iter().enumerate() {
            let at = base + c * width;
            out_codec.encode(sum.tanh(), &mut out[at..at + width])?;
        }
    }

    info!(
        "Mixed {} tracks into {} ({} frames, {:?})",
        tracks.len(),
        output,
        frames,
        duration
    );
    debug!(
        "Mixer inputs: {}",
        tracks
            .iter()
            .map(|t| t.format().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    );

    Track::new(buffer, duration, output.clone(), TrackMetadata::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{presets, ByteOrder, TrackFormat};
    use std::sync::Mutex;

    fn pcm16_track(format: TrackFormat, samples: &[i16], duration: Duration) -> Arc<Track> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Arc::new(
            Track::new(
                SampleBuffer::from_vec(bytes, ByteOrder::LittleEndian),
                duration,
                format,
                TrackMetadata::new(),
            )
            .unwrap(),
        )
    }

    fn read_i16(track: &Track) -> Vec<i16> {
        track
            .buffer()
            .as_bytes()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Expected 16-bit output for a summed input value
    fn clipped(value: f64) -> i16 {
        ((value / 32767.0).tanh() * 32767.0).floor() as i16
    }

    fn mono_1k(n: usize, value: i16) -> Arc<Track> {
        let format = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        pcm16_track(format, &vec![value; n], Duration::from_millis(n as u64))
    }

    #[test]
    fn test_empty_mixer_fails() {
        let mixer = TrackMixer::new(presets::wav16bit_stereo_44khz());
        assert!(mixer.is_empty());
        assert!(matches!(mixer.mix(), Err(Error::Mixing(_))));
    }

    #[test]
    fn test_identity_removal_with_duplicates() {
        let mixer = TrackMixer::new(presets::wav16bit_mono_8khz());
        let a = mono_1k(4, 0);
        let b = mono_1k(4, 0);
        mixer.add_track(a.clone());
        mixer.add_track(b.clone());
        mixer.add_track(a.clone());
        assert_eq!(mixer.track_count(), 3);

        let snapshot = mixer.tracks();
        assert!(mixer.remove_track(&a));
        assert_eq!(mixer.track_count(), 2);
        assert!(Arc::ptr_eq(&mixer.tracks()[0], &b));
        assert_eq!(snapshot.len(), 3);

        let stranger = mono_1k(4, 0);
        assert!(!mixer.remove_track(&stranger));
        mixer.clear();
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_single_track_passes_through_soft_clip() {
        let format = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        let samples = [0i16, 100, -100, 327, -327];
        let track = pcm16_track(format.clone(), &samples, Duration::from_millis(5));

        let mixed = mix_tracks(&[track], &format).unwrap();
        assert_eq!(mixed.duration(), Duration::from_millis(5));
        let out = read_i16(&mixed);
        for (got, want) in out.iter().zip(samples) {
            assert!((*got as i32 - want as i32).abs() <= 1, "{} vs {}", got, want);
            assert_eq!(*got, clipped(want as f64));
        }
    }

    #[test]
    fn test_length_follows_longest_track_and_pads() {
        let format = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        let short = mono_1k(2, 3000);
        let long = mono_1k(6, 0);

        let mixed = mix_tracks(&[short, long], &format).unwrap();
        assert_eq!(mixed.duration(), Duration::from_millis(6));
        let out = read_i16(&mixed);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], clipped(3000.0));
        assert_eq!(out[1], clipped(3000.0));
        assert_eq!(&out[2..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_sum_is_soft_clipped() {
        let format = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        let loud = mono_1k(4, i16::MAX);
        let mixed = mix_tracks(&[loud.clone(), loud.clone(), loud], &format).unwrap();
        let expected = (3.0f64.tanh() * 32767.0).floor() as i16;
        assert!(read_i16(&mixed).iter().all(|s| *s == expected));
    }

    #[test]
    fn test_channel_mapping() {
        let mono_fmt = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        let stereo_fmt = TrackFormat::pcm("wav", 2, 16, 1000, true, ByteOrder::LittleEndian);
        let quad_fmt = TrackFormat::pcm("wav", 4, 16, 1000, true, ByteOrder::LittleEndian);

        // mono fans out to both channels
        let mono = pcm16_track(mono_fmt.clone(), &[1000, 1000], Duration::from_millis(2));
        let out = read_i16(&mix_tracks(&[mono], &stereo_fmt).unwrap());
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|s| *s == clipped(1000.0)));

        // stereo averages down to mono
        let stereo = pcm16_track(stereo_fmt.clone(), &[2000, 0, 2000, 0], Duration::from_millis(2));
        let out = read_i16(&mix_tracks(&[stereo.clone()], &mono_fmt).unwrap());
        assert!(out.iter().all(|s| *s == clipped(1000.0)));

        // stereo into quad fills the first two channels only
        let out = read_i16(&mix_tracks(&[stereo], &quad_fmt).unwrap());
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], clipped(2000.0));
        assert_eq!(&out[1..4], &[0, 0, 0]);
    }

    #[test]
    fn test_linear_resampling() {
        let src_fmt = TrackFormat::pcm("wav", 1, 16, 1000, true, ByteOrder::LittleEndian);
        let out_fmt = TrackFormat::pcm("wav", 1, 16, 2000, true, ByteOrder::LittleEndian);
        let ramp = pcm16_track(src_fmt, &[0, 2000, 4000, 6000], Duration::from_millis(4));

        let out = read_i16(&mix_tracks(&[ramp], &out_fmt).unwrap());
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0);
        // halfway points interpolate between neighbours
        assert!((out[1] - clipped(1000.0)).abs() <= 1, "{}", out[1]);
        assert!((out[3] - clipped(3000.0)).abs() <= 1, "{}", out[3]);
        assert!((out[4] - clipped(4000.0)).abs() <= 1, "{}", out[4]);
        // the last source frame is held
        assert!((out[7] - clipped(6000.0)).abs() <= 1, "{}", out[7]);
    }

    #[test]
    fn test_rejects_non_pcm() {
        let mixer = TrackMixer::new(presets::mp3_stereo_128kbps());
        mixer.add_track(mono_1k(2, 0));
        assert!(matches!(mixer.mix(), Err(Error::Mixing(_))));
    }

    struct Captured(Mutex<Vec<(ChannelType, serde_json::Value)>>);

    impl EventSink for Captured {
        fn publish(&self, channel: ChannelType, payload: serde_json::Value) {
            self.0.lock().unwrap().push((channel, payload));
        }
    }

    #[test]
    fn test_events_on_add_and_remove() {
        let sink = Arc::new(Captured(Mutex::new(Vec::new())));
        let mixer = TrackMixer::new(presets::wav16bit_mono_8khz()).with_events(sink.clone());
        let t = mono_1k(1, 0);
        mixer.add_track(t.clone());
        mixer.remove_track(&t);
        mixer.remove_track(&t);

        let seen = sink.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, ChannelType::MixerChannelAdded);
        assert_eq!(seen[1].0, ChannelType::MixerChannelRemoved);
        assert_eq!(seen[1].1["track_count"], 0);
    }
}

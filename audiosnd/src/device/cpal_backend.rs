//! System audio devices through cpal
//!
//! Each opened device runs its cpal stream on a dedicated worker thread that
//! owns the stream until the device is closed. Samples cross between the
//! caller and the audio callback through a ringbuf ring of `f32`:
//! - output: `write` decodes the PCM view into the ring, the callback drains it
//! - input: the callback fills the ring, `read` quantizes into the caller's buffer

use super::{
    AudioDevice, DeviceBackend, DeviceInfo, DeviceKind, DeviceStatus, InputAudioDevice,
    OutputAudioDevice, StatusCallback, StatusCell,
};
use crate::error::{Error, Result};
use crate::format::{ByteOrder, Codec, TrackFormat};
use crate::quantize::SampleCodec;
use crate::track::BufferView;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Smallest ring in samples, whatever the configured buffers
const MIN_RING_SAMPLES: usize = 4096;

/// How long a blocked write or read waits before giving up
const IO_STALL_TIMEOUT: Duration = Duration::from_secs(2);

const IO_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Sample rates advertised in `DeviceInfo::supported_formats`
const COMMON_RATES: [u32; 6] = [8000, 22050, 44100, 48000, 96000, 192000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigRange {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    sample_format: SampleFormat,
}

impl ConfigRange {
    fn accepts(&self, format: &TrackFormat) -> bool {
        self.channels == format.channels()
            && (self.min_rate..=self.max_rate).contains(&format.sample_rate())
    }
}

fn ranges_of(configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>) -> Vec<ConfigRange> {
    configs
        .map(|c| ConfigRange {
            channels: c.channels(),
            min_rate: c.min_sample_rate().0,
            max_rate: c.max_sample_rate().0,
            sample_format: c.sample_format(),
        })
        .collect()
}

/// Track format equivalent of a cpal sample format
fn format_for(sample_format: SampleFormat, channels: u16, rate: u32) -> Option<TrackFormat> {
    let native = ByteOrder::native();
    let (bits, signed, codec) = match sample_format {
        SampleFormat::F32 => (32, true, Codec::Float32),
        SampleFormat::I8 => (8, true, Codec::Pcm8),
        SampleFormat::U8 => (8, false, Codec::Pcm8),
        SampleFormat::I16 => (16, true, Codec::Pcm16),
        SampleFormat::U16 => (16, false, Codec::Pcm16),
        SampleFormat::I32 => (32, true, Codec::Pcm32),
        SampleFormat::U32 => (32, false, Codec::Pcm32),
        _ => return None,
    };
    Some(TrackFormat::new("pcm", channels, bits, rate, signed, native, codec))
}

fn supported_formats(ranges: &[ConfigRange]) -> Vec<TrackFormat> {
    let mut formats = Vec::new();
    for range in ranges {
        for rate in COMMON_RATES {
            if rate < range.min_rate || rate > range.max_rate {
                continue;
            }
            if let Some(f) = format_for(range.sample_format, range.channels, rate) {
                if !formats.contains(&f) {
                    formats.push(f);
                }
            }
        }
    }
    formats
}

/// Matching range for `format`, preferring an `f32` stream
fn pick_range(ranges: &[ConfigRange], format: &TrackFormat) -> Option<ConfigRange> {
    let mut matching = ranges.iter().filter(|r| r.accepts(format));
    let first = matching.clone().next().copied();
    matching
        .find(|r| r.sample_format == SampleFormat::F32)
        .copied()
        .or(first)
}

fn device_info(host: &cpal::Host, name: &str, kind: DeviceKind, ranges: &[ConfigRange]) -> DeviceInfo {
    DeviceInfo {
        id: format!("{}:{}", host.id().name(), name),
        name: name.to_string(),
        vendor: host.id().name().to_string(),
        kind,
        channels: ranges.iter().map(|r| r.channels).max().unwrap_or(0),
        supported_formats: supported_formats(ranges),
    }
}

fn accepts_format(ranges: &[ConfigRange], format: &TrackFormat) -> bool {
    SampleCodec::for_format(format).is_ok() && pick_range(ranges, format).is_some()
}

/// Devices of the default cpal host
#[derive(Debug, Clone)]
pub struct CpalBackend {
    ring_samples: usize,
}

impl CpalBackend {
    /// Ring size is `buffer_size × buffer_count` bytes of `f32` samples
    pub fn new(buffer_size: usize, buffer_count: usize) -> Self {
        let bytes = buffer_size.saturating_mul(buffer_count);
        Self {
            ring_samples: (bytes / std::mem::size_of::<f32>()).max(MIN_RING_SAMPLES),
        }
    }

    pub fn ring_samples(&self) -> usize {
        self.ring_samples
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &str {
        "audio-snd"
    }

    fn output_devices(&self) -> Result<Vec<Arc<dyn OutputAudioDevice>>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::OpenDevice(format!("Failed to enumerate output devices: {}", e)))?;

        let mut found: Vec<Arc<dyn OutputAudioDevice>> = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let ranges = match device.supported_output_configs() {
                Ok(configs) => ranges_of(configs),
                Err(e) => {
                    warn!("Skipping output device '{}': {}", name, e);
                    continue;
                }
            };
            let info = device_info(&host, &name, DeviceKind::Output, &ranges);
            found.push(Arc::new(CpalOutputDevice::new(info, ranges, self.ring_samples)));
        }
        debug!("Found {} output devices", found.len());
        Ok(found)
    }

    fn input_devices(&self) -> Result<Vec<Arc<dyn InputAudioDevice>>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| Error::OpenDevice(format!("Failed to enumerate input devices: {}", e)))?;

        let mut found: Vec<Arc<dyn InputAudioDevice>> = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let ranges = match device.supported_input_configs() {
                Ok(configs) => ranges_of(configs),
                Err(e) => {
                    warn!("Skipping input device '{}': {}", name, e);
                    continue;
                }
            };
            let info = device_info(&host, &name, DeviceKind::Input, &ranges);
            found.push(Arc::new(CpalInputDevice::new(info, ranges, self.ring_samples)));
        }
        debug!("Found {} input devices", found.len());
        Ok(found)
    }
}

/// Stream worker: owns the cpal stream until told to stop
struct Worker {
    stop: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Run `build` on a new thread and wait for it to report the stream started
    fn spawn<F>(thread_name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> std::result::Result<cpal::Stream, String> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<(), String>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("Failed to start stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Returns on stop or when the device drops its sender
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: stop_tx,
                handle: Some(handle),
            }),
            Ok(Err(msg)) => {
                let _ = handle.join();
                Err(Error::OpenDevice(msg))
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::OpenDevice(format!("{} exited before starting", thread_name)))
            }
        }
    }

    fn shutdown(mut self) -> Result<()> {
        let _ = self.stop.send(());
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::CloseDevice("stream worker panicked".to_string())),
            None => Ok(()),
        }
    }
}

fn find_device(output: bool, name: &str) -> std::result::Result<cpal::Device, String> {
    let host = cpal::default_host();
    let mut devices: Box<dyn Iterator<Item = cpal::Device>> = if output {
        Box::new(host.output_devices().map_err(|e| e.to_string())?)
    } else {
        Box::new(host.input_devices().map_err(|e| e.to_string())?)
    };
    devices
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| format!("device '{}' is no longer available", name))
}

fn stream_config(format: &TrackFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    error_flag: Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let n = consumer.pop_slice(&mut scratch);
                // Underrun: pad with silence
                scratch[n..].fill(0.0);
                for (out, s) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*s);
                }
            },
            move |err| {
                error!("Audio output stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| format!("Failed to build stream: {}", e))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
    error_flag: Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, String>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|s| s.to_sample::<f32>()));
                // Overrun: drop what does not fit
                producer.push_slice(&scratch);
            },
            move |err| {
                error!("Audio input stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| format!("Failed to build stream: {}", e))
}

struct OutputStream {
    format: TrackFormat,
    codec: SampleCodec,
    producer: HeapProd<f32>,
    error_flag: Arc<AtomicBool>,
    worker: Worker,
    scratch: Vec<f32>,
}

/// Output device playing through a cpal stream
pub struct CpalOutputDevice {
    info: DeviceInfo,
    ranges: Vec<ConfigRange>,
    ring_samples: usize,
    status: StatusCell,
    stream: Mutex<Option<OutputStream>>,
}

impl CpalOutputDevice {
    fn new(info: DeviceInfo, ranges: Vec<ConfigRange>, ring_samples: usize) -> Self {
        let status = StatusCell::new(info.name.clone(), DeviceStatus::Closed);
        Self {
            info,
            ranges,
            ring_samples,
            status,
            stream: Mutex::new(None),
        }
    }

    fn fail(&self, message: String) -> Error {
        error!("Output device '{}': {}", self.info.name, message);
        self.status.set(DeviceStatus::Error);
        Error::DeviceNotReady(message)
    }
}

impl AudioDevice for CpalOutputDevice {
    fn open(&self, format: &TrackFormat) -> Result<()> {
        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = guard.as_ref() {
            if current.format == *format && self.status.get().is_operable() {
                return Ok(());
            }
        }
        if let Some(previous) = guard.take() {
            previous.worker.shutdown()?;
        }

        let codec = SampleCodec::for_format(format)?;
        let range = pick_range(&self.ranges, format).ok_or_else(|| {
            Error::OpenDevice(format!("'{}' cannot play {}", self.info.name, format))
        })?;

        self.status.set(DeviceStatus::Opening);
        let (producer, consumer) = HeapRb::<f32>::new(self.ring_samples).split();
        let error_flag = Arc::new(AtomicBool::new(false));

        let name = self.info.name.clone();
        let config = stream_config(format);
        let flag = error_flag.clone();
        let spawned = Worker::spawn("snd-output", move || {
            let device = find_device(true, &name)?;
            match range.sample_format {
                SampleFormat::F32 => build_output::<f32>(&device, &config, consumer, flag),
                SampleFormat::I16 => build_output::<i16>(&device, &config, consumer, flag),
                SampleFormat::U16 => build_output::<u16>(&device, &config, consumer, flag),
                SampleFormat::I32 => build_output::<i32>(&device, &config, consumer, flag),
                SampleFormat::I8 => build_output::<i8>(&device, &config, consumer, flag),
                SampleFormat::U8 => build_output::<u8>(&device, &config, consumer, flag),
                other => Err(format!("unsupported device sample format {:?}", other)),
            }
        });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.status.set(DeviceStatus::Error);
                return Err(e);
            }
        };

        info!("Opened output device '{}' for {}", self.info.name, format);
        *guard = Some(OutputStream {
            format: format.clone(),
            codec,
            producer,
            error_flag,
            worker,
            scratch: Vec::new(),
        });
        self.status.set(DeviceStatus::Opened);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(stream) = stream else {
            self.status.set(DeviceStatus::Closed);
            return Ok(());
        };
        self.status.set(DeviceStatus::Closing);
        let result = stream.worker.shutdown();
        self.status.set(if result.is_ok() {
            DeviceStatus::Closed
        } else {
            DeviceStatus::Error
        });
        info!("Closed output device '{}'", self.info.name);
        result
    }

    fn is_supported_format(&self, format: &TrackFormat) -> bool {
        accepts_format(&self.ranges, format)
    }

    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>) {
        self.status.set_callback(callback);
    }
}

impl OutputAudioDevice for CpalOutputDevice {
    fn write(&self, view: BufferView<'_>) -> Result<usize> {
        self.status.ensure_operable()?;
        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let stream = guard
            .as_mut()
            .ok_or_else(|| Error::DeviceNotReady(format!("'{}' is not open", self.info.name)))?;

        let width = stream.codec.width();
        let codec = stream.codec;
        stream.scratch.clear();
        stream.scratch.extend(
            view.as_bytes()
                .chunks_exact(width)
                .map(|b| codec.decode(b) as f32),
        );

        let deadline = Instant::now() + IO_STALL_TIMEOUT;
        let mut offset = 0;
        while offset < stream.scratch.len() {
            if stream.error_flag.load(Ordering::SeqCst) {
                return Err(self.fail("stream reported an error".to_string()));
            }
            let pushed = stream.producer.push_slice(&stream.scratch[offset..]);
            offset += pushed;
            if pushed == 0 {
                if Instant::now() >= deadline {
                    return Err(self.fail("output stalled".to_string()));
                }
                thread::sleep(IO_POLL_INTERVAL);
            }
        }

        self.status.set(DeviceStatus::Running);
        Ok(stream.scratch.len() * width)
    }

    fn flush(&self) -> Result<()> {
        self.status.ensure_operable()?;
        let guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let Some(stream) = guard.as_ref() else {
            return Ok(());
        };
        let deadline = Instant::now() + IO_STALL_TIMEOUT;
        while stream.producer.occupied_len() > 0 {
            if stream.error_flag.load(Ordering::SeqCst) {
                return Err(self.fail("stream reported an error".to_string()));
            }
            if Instant::now() >= deadline {
                warn!("Flush of '{}' timed out", self.info.name);
                break;
            }
            thread::sleep(IO_POLL_INTERVAL);
        }
        Ok(())
    }
}

struct InputStream {
    format: TrackFormat,
    codec: SampleCodec,
    consumer: HeapCons<f32>,
    error_flag: Arc<AtomicBool>,
    worker: Worker,
    scratch: Vec<f32>,
}

/// Input device capturing through a cpal stream
pub struct CpalInputDevice {
    info: DeviceInfo,
    ranges: Vec<ConfigRange>,
    ring_samples: usize,
    status: StatusCell,
    stream: Mutex<Option<InputStream>>,
}

impl CpalInputDevice {
    fn new(info: DeviceInfo, ranges: Vec<ConfigRange>, ring_samples: usize) -> Self {
        let status = StatusCell::new(info.name.clone(), DeviceStatus::Closed);
        Self {
            info,
            ranges,
            ring_samples,
            status,
            stream: Mutex::new(None),
        }
    }
}

impl AudioDevice for CpalInputDevice {
    fn open(&self, format: &TrackFormat) -> Result<()> {
        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = guard.as_ref() {
            if current.format == *format && self.status.get().is_operable() {
                return Ok(());
            }
        }
        if let Some(previous) = guard.take() {
            previous.worker.shutdown()?;
        }

        let codec = SampleCodec::for_format(format)?;
        let range = pick_range(&self.ranges, format).ok_or_else(|| {
            Error::OpenDevice(format!("'{}' cannot capture {}", self.info.name, format))
        })?;

        self.status.set(DeviceStatus::Opening);
        let (producer, consumer) = HeapRb::<f32>::new(self.ring_samples).split();
        let error_flag = Arc::new(AtomicBool::new(false));

        let name = self.info.name.clone();
        let config = stream_config(format);
        let flag = error_flag.clone();
        let spawned = Worker::spawn("snd-input", move || {
            let device = find_device(false, &name)?;
            match range.sample_format {
                SampleFormat::F32 => build_input::<f32>(&device, &config, producer, flag),
                SampleFormat::I16 => build_input::<i16>(&device, &config, producer, flag),
                SampleFormat::U16 => build_input::<u16>(&device, &config, producer, flag),
                SampleFormat::I32 => build_input::<i32>(&device, &config, producer, flag),
                SampleFormat::I8 => build_input::<i8>(&device, &config, producer, flag),
                SampleFormat::U8 => build_input::<u8>(&device, &config, producer, flag),
                other => Err(format!("unsupported device sample format {:?}", other)),
            }
        });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.status.set(DeviceStatus::Error);
                return Err(e);
            }
        };

        info!("Opened input device '{}' for {}", self.info.name, format);
        *guard = Some(InputStream {
            format: format.clone(),
            codec,
            consumer,
            error_flag,
            worker,
            scratch: Vec::new(),
        });
        self.status.set(DeviceStatus::Opened);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(stream) = stream else {
            self.status.set(DeviceStatus::Closed);
            return Ok(());
        };
        self.status.set(DeviceStatus::Closing);
        let result = stream.worker.shutdown();
        self.status.set(if result.is_ok() {
            DeviceStatus::Closed
        } else {
            DeviceStatus::Error
        });
        info!("Closed input device '{}'", self.info.name);
        result
    }

    fn is_supported_format(&self, format: &TrackFormat) -> bool {
        accepts_format(&self.ranges, format)
    }

    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>) {
        self.status.set_callback(callback);
    }
}

impl InputAudioDevice for CpalInputDevice {
    /// Waits for at least one frame, then returns the whole frames available
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.status.ensure_operable()?;
        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let stream = guard
            .as_mut()
            .ok_or_else(|| Error::DeviceNotReady(format!("'{}' is not open", self.info.name)))?;

        let channels = stream.format.channels() as usize;
        let width = stream.codec.width();
        let wanted = buffer.len() / (width * channels) * channels;
        if wanted == 0 {
            return Ok(0);
        }

        let deadline = Instant::now() + IO_STALL_TIMEOUT;
        while stream.consumer.occupied_len() < channels {
            if stream.error_flag.load(Ordering::SeqCst) {
                self.status.set(DeviceStatus::Error);
                return Err(Error::DeviceNotReady(format!(
                    "'{}' stream reported an error",
                    self.info.name
                )));
            }
            if Instant::now() >= deadline {
                return Ok(0);
            }
            thread::sleep(IO_POLL_INTERVAL);
        }

        let n = stream.consumer.occupied_len().min(wanted) / channels * channels;
        stream.scratch.resize(n, 0.0);
        let popped = stream.consumer.pop_slice(&mut stream.scratch[..n]);
        for (i, sample) in stream.scratch[..popped].iter().enumerate() {
            stream
                .codec
                .encode(*sample as f64, &mut buffer[i * width..(i + 1) * width])?;
        }
        self.status.set(DeviceStatus::Running);
        Ok(popped * width)
    }
}

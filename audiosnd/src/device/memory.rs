//! In-memory devices
//!
//! `MemoryOutputDevice` records every byte written to it and
//! `MemoryInputDevice` replays a fixed buffer. Together they form the `null`
//! backend used by tests and headless hosts.

use super::{
    AudioDevice, DeviceBackend, DeviceInfo, DeviceKind, DeviceStatus, InputAudioDevice,
    OutputAudioDevice, StatusCallback, StatusCell,
};
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::quantize::SampleCodec;
use crate::track::BufferView;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const MEMORY_VENDOR: &str = "audiosnd";
const MEMORY_MAX_CHANNELS: u16 = 16;

fn memory_info(name: &str, kind: DeviceKind) -> DeviceInfo {
    DeviceInfo {
        id: format!("memory:{}", name),
        name: name.to_string(),
        vendor: MEMORY_VENDOR.to_string(),
        kind,
        channels: MEMORY_MAX_CHANNELS,
        supported_formats: Vec::new(),
    }
}

fn accepts(format: &TrackFormat, max_channels: u16) -> bool {
    format.channels() > 0
        && format.channels() <= max_channels
        && format.sample_rate() > 0
        && SampleCodec::for_format(format).is_ok()
}

/// Output device that appends every write to an in-memory buffer
pub struct MemoryOutputDevice {
    info: DeviceInfo,
    status: StatusCell,
    format: Mutex<Option<TrackFormat>>,
    written: Mutex<Vec<u8>>,
    writes: AtomicUsize,
    flushes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryOutputDevice {
    pub fn new(name: &str) -> Self {
        Self {
            info: memory_info(name, DeviceKind::Output),
            status: StatusCell::new(name, DeviceStatus::Closed),
            format: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Copy of everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn written_len(&self) -> usize {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn opened_format(&self) -> Option<TrackFormat> {
        self.format.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make subsequent writes fail and move the device to `Error`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.writes.store(0, Ordering::SeqCst);
        self.flushes.store(0, Ordering::SeqCst);
    }
}

impl AudioDevice for MemoryOutputDevice {
    fn open(&self, format: &TrackFormat) -> Result<()> {
        if !self.is_supported_format(format) {
            return Err(Error::OpenDevice(format!(
                "'{}' cannot play {}",
                self.info.name, format
            )));
        }
        let mut current = self.format.lock().unwrap_or_else(|e| e.into_inner());
        if self.status.get().is_operable() && current.as_ref() == Some(format) {
            return Ok(());
        }
        self.status.set(DeviceStatus::Opening);
        *current = Some(format.clone());
        drop(current);
        self.status.set(DeviceStatus::Opened);
        debug!("Opened memory output '{}' for {}", self.info.name, format);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.status.set(DeviceStatus::Closing);
        *self.format.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.status.set(DeviceStatus::Closed);
        Ok(())
    }

    fn is_supported_format(&self, format: &TrackFormat) -> bool {
        accepts(format, self.info.channels)
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

impl OutputAudioDevice for MemoryOutputDevice {
    fn write(&self, view: BufferView<'_>) -> Result<usize> {
        self.status.ensure_operable()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            warn!("Memory output '{}' rejecting write", self.info.name);
            self.status.set(DeviceStatus::Error);
            return Err(Error::DeviceNotReady(format!(
                "'{}' failed to write {} bytes",
                self.info.name,
                view.len()
            )));
        }
        self.status.set(DeviceStatus::Running);
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(view.as_bytes());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(view.len())
    }

    fn flush(&self) -> Result<()> {
        self.status.ensure_operable()?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Input device replaying a fixed byte buffer, then reporting end of data
pub struct MemoryInputDevice {
    info: DeviceInfo,
    status: StatusCell,
    format: Mutex<Option<TrackFormat>>,
    data: Vec<u8>,
    cursor: Mutex<usize>,
}

impl MemoryInputDevice {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            info: memory_info(name, DeviceKind::Input),
            status: StatusCell::new(name, DeviceStatus::Closed),
            format: Mutex::new(None),
            data,
            cursor: Mutex::new(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - *self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioDevice for MemoryInputDevice {
    fn open(&self, format: &TrackFormat) -> Result<()> {
        if !self.is_supported_format(format) {
            return Err(Error::OpenDevice(format!(
                "'{}' cannot capture {}",
                self.info.name, format
            )));
        }
        self.status.set(DeviceStatus::Opening);
        *self.format.lock().unwrap_or_else(|e| e.into_inner()) = Some(format.clone());
        self.status.set(DeviceStatus::Opened);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.status.set(DeviceStatus::Closing);
        *self.format.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.status.set(DeviceStatus::Closed);
        Ok(())
    }

    fn is_supported_format(&self, format: &TrackFormat) -> bool {
        accepts(format, self.info.channels)
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

impl InputAudioDevice for MemoryInputDevice {
    /// Copies whole frames only; returns 0 once the data is exhausted
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.status.ensure_operable()?;
        let frame_size = self
            .format
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|f| f.frame_size().max(1))
            .unwrap_or(1);

        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let available = self.data.len() - *cursor;
        let n = available.min(buffer.len()) / frame_size * frame_size;
        buffer[..n].copy_from_slice(&self.data[*cursor..*cursor + n]);
        *cursor += n;
        if n > 0 {
            self.status.set(DeviceStatus::Running);
        }
        Ok(n)
    }
}

/// Backend serving a fixed set of in-memory devices
pub struct NullBackend {
    outputs: Vec<Arc<MemoryOutputDevice>>,
    inputs: Vec<Arc<MemoryInputDevice>>,
}

impl NullBackend {
    /// One silent input and one recording output
    pub fn new() -> Self {
        Self::with_devices(
            vec![Arc::new(MemoryOutputDevice::new("null-output"))],
            vec![Arc::new(MemoryInputDevice::new("null-input", Vec::new()))],
        )
    }

    pub fn with_devices(
        outputs: Vec<Arc<MemoryOutputDevice>>,
        inputs: Vec<Arc<MemoryInputDevice>>,
    ) -> Self {
        Self { outputs, inputs }
    }

    /// Backend without devices
    pub fn empty() -> Self {
        Self::with_devices(Vec::new(), Vec::new())
    }

    pub fn outputs(&self) -> &[Arc<MemoryOutputDevice>] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[Arc<MemoryInputDevice>] {
        &self.inputs
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn output_devices(&self) -> Result<Vec<Arc<dyn OutputAudioDevice>>> {
        Ok(self
            .outputs
            .iter()
            .map(|d| d.clone() as Arc<dyn OutputAudioDevice>)
            .collect())
    }

    fn input_devices(&self) -> Result<Vec<Arc<dyn InputAudioDevice>>> {
        Ok(self
            .inputs
            .iter()
            .map(|d| d.clone() as Arc<dyn InputAudioDevice>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{presets, ByteOrder};

    #[test]
    fn test_output_records_writes() {
        let device = MemoryOutputDevice::new("out");
        let format = presets::wav16bit_stereo_44khz();
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];

        assert!(matches!(
            device.write(BufferView::new(&bytes, ByteOrder::LittleEndian)),
            Err(Error::DeviceNotReady(_))
        ));

        device.open(&format).unwrap();
        assert_eq!(device.status(), DeviceStatus::Opened);
        assert_eq!(device.write(BufferView::new(&bytes[..4], ByteOrder::LittleEndian)).unwrap(), 4);
        assert_eq!(device.write(BufferView::new(&bytes[4..], ByteOrder::LittleEndian)).unwrap(), 4);
        device.flush().unwrap();

        assert_eq!(device.written(), bytes.to_vec());
        assert_eq!(device.write_count(), 2);
        assert_eq!(device.flush_count(), 1);
        assert_eq!(device.status(), DeviceStatus::Running);
        assert_eq!(device.opened_format(), Some(format));

        device.close().unwrap();
        assert_eq!(device.status(), DeviceStatus::Closed);
        assert!(device.flush().is_err());
    }

    #[test]
    fn test_failing_writes_move_to_error() {
        let device = MemoryOutputDevice::new("out");
        device.open(&presets::wav16bit_mono_8khz()).unwrap();
        device.set_fail_writes(true);
        assert!(device.write(BufferView::new(&[0, 0], ByteOrder::LittleEndian)).is_err());
        assert_eq!(device.status(), DeviceStatus::Error);
        assert!(!device.is_ready());
    }

    #[test]
    fn test_rejects_compressed_formats() {
        let device = MemoryOutputDevice::new("out");
        assert!(!device.is_supported_format(&presets::mp3_stereo_320kbps()));
        assert!(matches!(
            device.open(&presets::flac16bit_stereo_44khz()),
            Err(Error::OpenDevice(_))
        ));
        assert!(device.is_supported_format(&presets::surround_71()));
    }

    #[test]
    fn test_input_replays_whole_frames() {
        let device = MemoryInputDevice::new("in", (0u8..10).collect());
        device.open(&presets::wav16bit_stereo_44khz()).unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(device.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[0, 1, 2, 3]);
        assert_eq!(device.read_range(&mut buf, 2, 6).unwrap(), 4);
        assert_eq!(&buf[2..6], &[4, 5, 6, 7]);
        assert_eq!(device.read(&mut buf).unwrap(), 0);
        assert_eq!(device.remaining(), 2);
        assert!(device.read_range(&mut buf, 4, 9).is_err());
    }

    #[test]
    fn test_null_backend_devices() {
        let backend = NullBackend::new();
        assert_eq!(backend.name(), "null");
        assert_eq!(backend.output_devices().unwrap().len(), 1);
        assert_eq!(backend.input_devices().unwrap().len(), 1);
        let info = backend.output_devices().unwrap()[0].device_info();
        assert_eq!(info.name, "null-output");
        assert_eq!(info.kind, DeviceKind::Output);

        assert!(NullBackend::empty().output_devices().unwrap().is_empty());
    }
}

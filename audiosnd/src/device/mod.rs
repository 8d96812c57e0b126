//! Audio devices
//!
//! Devices are capability traits: every device opens, closes and reports
//! its status; output devices accept byte views of interleaved PCM in the
//! opened format, input devices fill caller buffers in that format.
//!
//! Two backends enumerate devices:
//! - `CpalBackend`: system devices through cpal
//! - `NullBackend`: in-memory devices for tests and headless hosts

pub mod cpal_backend;
pub mod memory;

pub use cpal_backend::{CpalBackend, CpalInputDevice, CpalOutputDevice};
pub use memory::{MemoryInputDevice, MemoryOutputDevice, NullBackend};

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::track::BufferView;
use serde::{Deserialize, Serialize};
use snd_common::NativeLib;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error};

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Opening,
    Opened,
    Running,
    Paused,
    Stopped,
    Closing,
    Closed,
    Destroyed,
    Unavailable,
    Error,
}

impl DeviceStatus {
    /// Whether I/O calls may be issued
    pub fn is_operable(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Opened | DeviceStatus::Running | DeviceStatus::Paused | DeviceStatus::Stopped
        )
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Input,
    Output,
}

/// Static description of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
    /// Maximum channel count
    pub channels: u16,
    pub supported_formats: Vec<TrackFormat>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {:?}, vendor: {}, up to {} channels, {} formats",
            self.name,
            self.id,
            self.kind,
            self.vendor,
            self.channels,
            self.supported_formats.len()
        )
    }
}

/// Called with `(old, new)` whenever a device changes status
pub type StatusCallback = Arc<dyn Fn(DeviceStatus, DeviceStatus) + Send + Sync>;

pub trait AudioDevice: Send + Sync {
    /// Prepare the device for I/O in `format`
    fn open(&self, format: &TrackFormat) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn is_supported_format(&self, format: &TrackFormat) -> bool;

    fn device_info(&self) -> DeviceInfo;

    fn status(&self) -> DeviceStatus;

    fn is_ready(&self) -> bool {
        self.status().is_operable()
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>);
}

pub trait OutputAudioDevice: AudioDevice {
    /// Queue the view for playback; returns bytes accepted
    fn write(&self, view: BufferView<'_>) -> Result<usize>;

    /// Block until queued samples have been played
    fn flush(&self) -> Result<()>;
}

pub trait InputAudioDevice: AudioDevice {
    /// Fill `buffer` with captured bytes; returns bytes written
    fn read(&self, buffer: &mut [u8]) -> Result<usize>;

    /// Fill `buffer[start..end]`
    fn read_range(&self, buffer: &mut [u8], start: usize, end: usize) -> Result<usize> {
        if start > end || end > buffer.len() {
            return Err(Error::DeviceNotReady(format!(
                "read range {}..{} outside buffer of {} bytes",
                start,
                end,
                buffer.len()
            )));
        }
        self.read(&mut buffer[start..end])
    }
}

/// Enumerates the devices of one native library
pub trait DeviceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn output_devices(&self) -> Result<Vec<Arc<dyn OutputAudioDevice>>>;

    fn input_devices(&self) -> Result<Vec<Arc<dyn InputAudioDevice>>>;
}

/// Backend for a configured native library
pub fn backend_for(lib: NativeLib, buffer_size: usize, buffer_count: usize) -> Arc<dyn DeviceBackend> {
    match lib {
        NativeLib::Default => Arc::new(CpalBackend::new(buffer_size, buffer_count)),
        NativeLib::Null => Arc::new(NullBackend::new()),
    }
}

/// Status shared by device implementations; fires the callback on change only
pub(crate) struct StatusCell {
    status: Mutex<DeviceStatus>,
    callback: RwLock<Option<StatusCallback>>,
    label: String,
}

impl StatusCell {
    pub(crate) fn new(label: impl Into<String>, initial: DeviceStatus) -> Self {
        Self {
            status: Mutex::new(initial),
            callback: RwLock::new(None),
            label: label.into(),
        }
    }

    pub(crate) fn get(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, next: DeviceStatus) {
        let previous = {
            let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
            let previous = *guard;
            if previous == next {
                return;
            }
            *guard = next;
            previous
        };

        debug!("Device '{}': {} -> {}", self.label, previous, next);
        let callback = self
            .callback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(cb) = callback {
            if catch_unwind(AssertUnwindSafe(|| cb(previous, next))).is_err() {
                error!("Status callback of device '{}' panicked", self.label);
            }
        }
    }

    pub(crate) fn set_callback(&self, callback: Option<StatusCallback>) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = callback;
    }

    /// Fail with `DeviceNotReady` unless the status allows I/O
    pub(crate) fn ensure_operable(&self) -> Result<()> {
        let status = self.get();
        if status.is_operable() {
            Ok(())
        } else {
            Err(Error::DeviceNotReady(format!("'{}' is {}", self.label, status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_status_callback_fires_on_change_only() {
        let cell = StatusCell::new("test", DeviceStatus::Closed);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        cell.set_callback(Some(Arc::new(move |old: DeviceStatus, new: DeviceStatus| {
            seen.lock().unwrap().push((old, new));
        })));

        cell.set(DeviceStatus::Opening);
        cell.set(DeviceStatus::Opening);
        cell.set(DeviceStatus::Opened);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                (DeviceStatus::Closed, DeviceStatus::Opening),
                (DeviceStatus::Opening, DeviceStatus::Opened)
            ]
        );
        assert!(cell.ensure_operable().is_ok());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let cell = StatusCell::new("test", DeviceStatus::Closed);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        cell.set_callback(Some(Arc::new(move |_: DeviceStatus, _: DeviceStatus| {
            c.fetch_add(1, Ordering::SeqCst);
            panic!("listener bug");
        })));
        cell.set(DeviceStatus::Error);
        cell.set(DeviceStatus::Closed);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(cell.get(), DeviceStatus::Closed);
        assert!(matches!(cell.ensure_operable(), Err(Error::DeviceNotReady(_))));
    }

    #[test]
    fn test_operable_statuses() {
        assert!(DeviceStatus::Running.is_operable());
        assert!(!DeviceStatus::Opening.is_operable());
        assert!(!DeviceStatus::Error.is_operable());
        assert!(!DeviceStatus::Closed.is_operable());
    }
}

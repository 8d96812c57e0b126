//! Track player
//!
//! Streams one track to one output device from a dedicated thread. The
//! thread writes 1 ms chunks and parks briefly between writes, which keeps
//! the device buffer fed without spinning.
//!
//! ```text
//! UNAVAILABLE ─init_player→ INITED ─play→ PLAYING
//! PLAYING ─pause→ PAUSED ─play→ PLAYING
//! PLAYING | PAUSED ─stop→ STOPPED (offset := 0)
//! PLAYING ─end of data→ STOPPED
//! any ─close→ DESTROYED
//! ```
//!
//! The status sink runs after the player's locks are released, so it may call
//! back into the player. On the playback thread such calls never join the
//! thread; a `play()` issued there restarts the running loop.

use crate::device::OutputAudioDevice;
use crate::error::{Error, Result};
use crate::format::utils::chunk_size;
use crate::quantize::SampleCodec;
use crate::track::{BufferView, Track};
use serde::{Deserialize, Serialize};
use serde_json::json;
use snd_common::{ChannelType, EventSink};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause between chunk writes
const PARK_INTERVAL: Duration = Duration::from_micros(700);

/// Raw loop count meaning "repeat until stopped"
const INFINITE_LOOPS: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Unavailable,
    Inited,
    Playing,
    Paused,
    Stopped,
    Destroyed,
}

impl TrackStatus {
    /// Whether playback operations are accepted
    pub fn is_ready(&self) -> bool {
        !matches!(self, TrackStatus::Unavailable | TrackStatus::Destroyed)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Passes played after the first one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopCount {
    Times(u32),
    Infinite,
}

impl LoopCount {
    fn to_raw(self) -> u32 {
        match self {
            LoopCount::Times(n) => n.min(INFINITE_LOOPS - 1),
            LoopCount::Infinite => INFINITE_LOOPS,
        }
    }

    fn from_raw(raw: u32) -> Self {
        if raw == INFINITE_LOOPS {
            LoopCount::Infinite
        } else {
            LoopCount::Times(raw)
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Times(0)
    }
}

impl From<u32> for LoopCount {
    fn from(n: u32) -> Self {
        LoopCount::Times(n)
    }
}

/// Called with `(old, new)` on every player status change
pub type StatusSink = Arc<dyn Fn(TrackStatus, TrackStatus) + Send + Sync>;

/// Status change waiting to be announced
type Change = Option<(TrackStatus, TrackStatus)>;

type Monitor<'a> = MutexGuard<'a, Option<JoinHandle<()>>>;

/// State shared between the player handle and its playback thread
struct Shared {
    track: Arc<Track>,
    device: Arc<dyn OutputAudioDevice>,
    codec: SampleCodec,
    chunk: usize,
    limit: usize,
    offset: AtomicUsize,
    playing: AtomicBool,
    status: Mutex<TrackStatus>,
    /// f32 bits
    volume: AtomicU32,
    /// f32 bits
    speed: AtomicU32,
    loop_count: AtomicU32,
    cycle: AtomicU32,
    sink: RwLock<Option<StatusSink>>,
    events: Option<Arc<dyn EventSink>>,
    /// Thread currently running `run`
    runner: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn status(&self) -> TrackStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Move to `next` when `allowed(current)` holds. Nothing is notified
    /// until the change is passed to `announce`.
    fn advance(&self, allowed: impl Fn(TrackStatus) -> bool, next: TrackStatus) -> Change {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *guard;
        if previous == next || !allowed(previous) {
            return None;
        }
        *guard = next;
        debug!("Player status: {} -> {}", previous, next);
        Some((previous, next))
    }

    fn announce(&self, change: Change) {
        if let Some((previous, next)) = change {
            self.notify(previous, next);
        }
    }

    /// Advance and notify at once; the playback thread holds no monitor
    fn transition(&self, allowed: impl Fn(TrackStatus) -> bool, next: TrackStatus) {
        let change = self.advance(allowed, next);
        self.announce(change);
    }

    fn on_playback_thread(&self) -> bool {
        *self.runner.lock().unwrap_or_else(|e| e.into_inner()) == Some(thread::current().id())
    }

    fn notify(&self, previous: TrackStatus, next: TrackStatus) {
        let sink = self.sink.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            if catch_unwind(AssertUnwindSafe(|| sink(previous, next))).is_err() {
                error!("Player status sink panicked on {} -> {}", previous, next);
            }
        }

        let channel = match next {
            TrackStatus::Playing => ChannelType::TrackPlayStarted,
            TrackStatus::Paused => ChannelType::TrackPlayPaused,
            TrackStatus::Stopped => ChannelType::TrackPlayStopped,
            _ => return,
        };
        if let Some(events) = &self.events {
            events.publish(
                channel,
                json!({
                    "position_ms": self.position_ms(),
                    "duration_ms": self.track.duration().as_millis() as u64,
                    "device": self.device.device_info().name,
                }),
            );
        }
    }

    fn position_ms(&self) -> u64 {
        (self.offset.load(Ordering::Acquire) / self.chunk) as u64
    }

    /// End of data with no cycles left: STOPPED and rewound
    fn finish(&self) {
        self.playing.store(false, Ordering::Release);
        self.offset.store(0, Ordering::Release);
        self.cycle.store(0, Ordering::Release);
        self.transition(|s| s == TrackStatus::Playing, TrackStatus::Stopped);
    }

    /// Write chunks until paused, stopped or out of data
    fn run(&self) {
        *self.runner.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread::current().id());
        loop {
            let reached_end = self.stream_chunks();
            if let Err(e) = self.device.flush() {
                warn!("Device flush after playback failed: {}", e);
            }
            if reached_end {
                self.finish();
            }
            // A status sink may have restarted playback from this thread
            if !self.playing.load(Ordering::Acquire) {
                break;
            }
            debug!("Player restarted from its status sink");
        }
    }

    /// Returns true when the data ran out with no cycles left
    fn stream_chunks(&self) -> bool {
        let mut scratch: Vec<u8> = Vec::new();
        let width = self.codec.width();
        let byte_order = self.track.format().byte_order();

        while self.playing.load(Ordering::Acquire) {
            let start = self.offset.load(Ordering::Acquire);
            if start >= self.limit {
                let cycle = self.cycle.load(Ordering::Acquire);
                let loops = self.loop_count.load(Ordering::Acquire);
                if loops == INFINITE_LOOPS || cycle < loops {
                    self.cycle.store(cycle.saturating_add(1), Ordering::Release);
                    self.offset.store(0, Ordering::Release);
                    debug!("Player rewinding for cycle {}", cycle + 1);
                    continue;
                }
                return true;
            }

            let end = (start + self.chunk).min(self.limit);
            let Some(view) = self.track.buffer().slice(start, end) else {
                return true;
            };

            let volume = self.volume();
            let written = if volume == 1.0 {
                self.device.write(view)
            } else {
                scratch.clear();
                scratch.resize(view.len(), 0);
                match scale(&self.codec, view.as_bytes(), &mut scratch, width, volume as f64) {
                    Ok(()) => self.device.write(BufferView::new(&scratch, byte_order)),
                    Err(e) => Err(e),
                }
            };

            if let Err(e) = written {
                error!("Playback aborted: {}", e);
                self.playing.store(false, Ordering::Release);
                self.transition(|s| s == TrackStatus::Playing, TrackStatus::Stopped);
                return false;
            }

            // A concurrent seek wins over the advance
            let _ = self
                .offset
                .compare_exchange(start, end, Ordering::AcqRel, Ordering::Acquire);
            thread::park_timeout(PARK_INTERVAL);
        }
        false
    }
}

/// Copy `input` into `output` with every sample scaled by `volume`
fn scale(codec: &SampleCodec, input: &[u8], output: &mut [u8], width: usize, volume: f64) -> Result<()> {
    for (src, dst) in input.chunks_exact(width).zip(output.chunks_exact_mut(width)) {
        codec.encode(codec.decode(src) * volume, dst)?;
    }
    Ok(())
}

/// Plays one track on one output device
pub struct TrackPlayer {
    shared: Arc<Shared>,
    /// Serializes play/pause/stop/close and owns the playback thread
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl TrackPlayer {
    /// Player in `UNAVAILABLE`; call `init_player` before playing
    pub fn new(track: Arc<Track>, device: Arc<dyn OutputAudioDevice>) -> Result<Self> {
        Self::build(track, device, None)
    }

    /// Player publishing `TRACK_PLAY_*` events on every transition
    pub fn with_events(
        track: Arc<Track>,
        device: Arc<dyn OutputAudioDevice>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::build(track, device, Some(events))
    }

    fn build(
        track: Arc<Track>,
        device: Arc<dyn OutputAudioDevice>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Result<Self> {
        let codec = SampleCodec::for_format(track.format())?;
        let chunk = chunk_size(track.format(), 1);
        if chunk == 0 {
            return Err(Error::InvalidTrack(format!(
                "{} has no playable frames",
                track.format()
            )));
        }
        let limit = track.buffer().len();

        Ok(Self {
            shared: Arc::new(Shared {
                track,
                device,
                codec,
                chunk,
                limit,
                offset: AtomicUsize::new(0),
                playing: AtomicBool::new(false),
                status: Mutex::new(TrackStatus::Unavailable),
                volume: AtomicU32::new(1.0f32.to_bits()),
                speed: AtomicU32::new(1.0f32.to_bits()),
                loop_count: AtomicU32::new(0),
                cycle: AtomicU32::new(0),
                sink: RwLock::new(None),
                events,
                runner: Mutex::new(None),
            }),
            monitor: Mutex::new(None),
        })
    }

    /// Open the device in the track's format.
    ///
    /// Repeated calls are no-ops, except that a device left unusable by a
    /// failed write is opened again.
    pub fn init_player(&self) -> Result<()> {
        let change = {
            let _guard = self.control();
            match self.shared.status() {
                TrackStatus::Destroyed => return Err(Error::PlayerNotReady),
                TrackStatus::Unavailable => {
                    self.shared.device.open(self.shared.track.format())?;
                    info!(
                        "Player ready on '{}' for {}",
                        self.shared.device.device_info().name,
                        self.shared.track.format()
                    );
                    self.shared
                        .advance(|s| s == TrackStatus::Unavailable, TrackStatus::Inited)
                }
                TrackStatus::Playing => None,
                _ => {
                    if !self.shared.device.is_ready() {
                        warn!(
                            "Re-opening '{}' ({})",
                            self.shared.device.device_info().name,
                            self.shared.device.status()
                        );
                        self.shared.device.open(self.shared.track.format())?;
                    }
                    None
                }
            }
        };
        self.shared.announce(change);
        Ok(())
    }

    /// Start or resume playback.
    ///
    /// Fails with `DeviceNotReady` while the device is unusable; `init_player`
    /// opens it again.
    pub fn play(&self) -> Result<()> {
        let change = {
            let mut guard = self.control();
            let status = self.ensure_ready()?;
            if status == TrackStatus::Playing {
                return Ok(());
            }
            if !self.shared.device.is_ready() {
                return Err(Error::DeviceNotReady(format!(
                    "'{}' is {}",
                    self.shared.device.device_info().name,
                    self.shared.device.status()
                )));
            }
            Self::join(&mut guard);
            // PLAYING before the thread starts so an immediate end of data can stop it
            self.shared.playing.store(true, Ordering::Release);
            self.shared.advance(|_| true, TrackStatus::Playing)
        };
        self.shared.announce(change);

        if self.shared.on_playback_thread() {
            // The running loop picks the restart up
            return Ok(());
        }
        self.spawn_runner()
    }

    /// Start the playback thread unless the sink or another caller changed
    /// course while PLAYING was announced
    fn spawn_runner(&self) -> Result<()> {
        let mut slot = self.lock();
        if slot.is_some()
            || !self.shared.playing.load(Ordering::Acquire)
            || self.shared.status() != TrackStatus::Playing
        {
            return Ok(());
        }
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("snd-player".to_string())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.playing.store(false, Ordering::Release);
                let change = self
                    .shared
                    .advance(|s| s == TrackStatus::Playing, TrackStatus::Stopped);
                drop(slot);
                self.shared.announce(change);
                Err(e.into())
            }
        }
    }

    /// No-op unless playing; keeps the offset
    pub fn pause(&self) -> Result<()> {
        let change = {
            let mut guard = self.control();
            if self.ensure_ready()? != TrackStatus::Playing {
                return Ok(());
            }
            self.shared.playing.store(false, Ordering::Release);
            Self::join(&mut guard);
            self.shared
                .advance(|s| s == TrackStatus::Playing, TrackStatus::Paused)
        };
        self.shared.announce(change);
        Ok(())
    }

    /// Stop and rewind; no-op unless playing or paused
    pub fn stop(&self) -> Result<()> {
        let change = {
            let mut guard = self.control();
            let status = self.ensure_ready()?;
            if !matches!(status, TrackStatus::Playing | TrackStatus::Paused) {
                return Ok(());
            }
            self.shared.playing.store(false, Ordering::Release);
            Self::join(&mut guard);
            self.shared.offset.store(0, Ordering::Release);
            self.shared.cycle.store(0, Ordering::Release);
            self.shared.advance(
                |s| matches!(s, TrackStatus::Playing | TrackStatus::Paused),
                TrackStatus::Stopped,
            )
        };
        self.shared.announce(change);
        Ok(())
    }

    /// Stop playback, release the device and move to `DESTROYED`
    pub fn close(&self) -> Result<()> {
        let change = {
            let mut guard = self.control();
            if self.shared.status() == TrackStatus::Destroyed {
                return Err(Error::PlayerNotReady);
            }
            self.shared.playing.store(false, Ordering::Release);
            Self::join(&mut guard);
            if let Err(e) = self.shared.device.close() {
                warn!("Closing player device failed: {}", e);
            }
            info!("Player closed");
            self.shared.advance(|_| true, TrackStatus::Destroyed)
        };
        self.shared.announce(change);
        Ok(())
    }

    /// Jump to `millis`; negative positions clamp to the start, overshoot to the end
    pub fn seek(&self, millis: i64) -> Result<()> {
        self.ensure_ready()?;
        let target = if millis <= 0 {
            0
        } else {
            (millis as u128 * self.shared.chunk as u128).min(self.shared.limit as u128) as usize
        };
        self.shared.offset.store(target, Ordering::Release);
        debug!("Player seek to {} ms (byte {})", millis, target);
        Ok(())
    }

    /// Position as `offset / chunk-size(1 ms)`
    pub fn current_time(&self) -> Duration {
        Duration::from_millis(self.shared.position_ms())
    }

    /// Sample scale in `[0, 1]` applied while copying to the device
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.ensure_ready()?;
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::InvalidConfig(format!("volume {}", volume)));
        }
        self.shared.volume.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    /// Stored and reported; playback always runs at 1×
    pub fn set_speed(&self, speed: f32) -> Result<()> {
        self.ensure_ready()?;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(Error::InvalidConfig(format!("speed {}", speed)));
        }
        self.shared.speed.store(speed.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.shared.speed.load(Ordering::Relaxed))
    }

    /// Extra passes after the first; `Times(0)` plays once
    pub fn set_loop_count(&self, count: impl Into<LoopCount>) -> Result<()> {
        self.ensure_ready()?;
        self.shared
            .loop_count
            .store(count.into().to_raw(), Ordering::Release);
        Ok(())
    }

    pub fn cycles(&self) -> LoopCount {
        LoopCount::from_raw(self.shared.loop_count.load(Ordering::Acquire))
    }

    pub fn current_cycle(&self) -> u32 {
        self.shared.cycle.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TrackStatus {
        self.shared.status()
    }

    pub fn set_status_sink(&self, sink: Option<StatusSink>) {
        *self.shared.sink.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.shared.track
    }

    pub fn device(&self) -> &Arc<dyn OutputAudioDevice> {
        &self.shared.device
    }

    fn lock(&self) -> Monitor<'_> {
        self.monitor.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Monitor guard, or `None` on the playback thread, which must neither
    /// wait for the monitor nor join itself
    fn control(&self) -> Option<Monitor<'_>> {
        if self.shared.on_playback_thread() {
            None
        } else {
            Some(self.lock())
        }
    }

    fn ensure_ready(&self) -> Result<TrackStatus> {
        let status = self.shared.status();
        if status.is_ready() {
            Ok(status)
        } else {
            Err(Error::PlayerNotReady)
        }
    }

    fn join(guard: &mut Option<Monitor<'_>>) {
        if let Some(handle) = guard.as_mut().and_then(|slot| slot.take()) {
            if handle.join().is_err() {
                error!("Playback thread panicked");
            }
        }
    }
}

impl Drop for TrackPlayer {
    fn drop(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
        let mut guard = self.control();
        Self::join(&mut guard);
    }
}

impl fmt::Debug for TrackPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackPlayer")
            .field("status", &self.status())
            .field("format", self.shared.track.format())
            .field("position", &self.current_time())
            .finish()
    }
}

//! Engine facade
//!
//! `AudioEngine` ties the pieces together: configuration, the device
//! backend, the ordered loader registry and the event manager. Every
//! operation other than `init` fails with `NotInited` until `init` has run,
//! and again after `close`.

use crate::device::{
    backend_for, AudioDevice, DeviceBackend, DeviceStatus, InputAudioDevice, OutputAudioDevice,
};
use crate::error::{Error, Result};
use crate::format::{presets, TrackFormat};
use crate::loader::{wav_handler, LoadListener, LoaderHandler, LoaderRegistry, Source};
use crate::mixer::TrackMixer;
use crate::player::TrackPlayer;
use crate::track::Track;
use serde_json::json;
use snd_common::{ChannelType, EngineConfig, EventManager, EventSink};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Source of loader handlers registered at `init`
pub trait HandlerDiscovery: Send + Sync {
    fn discover(&self) -> Vec<LoaderHandler>;
}

/// Handlers compiled into the crate: WAV
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinHandlers;

impl HandlerDiscovery for BuiltinHandlers {
    fn discover(&self) -> Vec<LoaderHandler> {
        vec![wav_handler()]
    }
}

/// Publishes loader progress as `TRACK_LOAD_PROGRESS`
struct LoadProgress {
    events: Arc<EventManager>,
}

impl LoadListener for LoadProgress {
    fn on_load_started(&self, total: Option<u64>) {
        debug!("Load started ({:?} bytes)", total);
    }

    fn on_loading(&self, loaded: u64) {
        self.events
            .publish(ChannelType::TrackLoadProgress, json!({ "loaded": loaded }));
    }

    fn on_load_finished(&self) {}

    fn on_load_failed(&self, error: &Error) {
        debug!("Load failed in loader: {}", error);
    }
}

struct EngineState {
    config: EngineConfig,
    backend: Arc<dyn DeviceBackend>,
}

pub struct AudioEngine {
    events: Arc<EventManager>,
    registry: LoaderRegistry,
    discovery: Vec<Arc<dyn HandlerDiscovery>>,
    backend_override: Option<Arc<dyn DeviceBackend>>,
    state: RwLock<Option<EngineState>>,
}

impl AudioEngine {
    /// Engine with builtin handlers and its own event pool
    pub fn new() -> Result<Self> {
        Ok(Self::with_events(Arc::new(EventManager::new()?)))
    }

    pub fn with_events(events: Arc<EventManager>) -> Self {
        Self {
            events,
            registry: LoaderRegistry::new(),
            discovery: vec![Arc::new(BuiltinHandlers)],
            backend_override: None,
            state: RwLock::new(None),
        }
    }

    /// Use `backend` instead of the one named by the configuration
    pub fn with_backend(mut self, backend: Arc<dyn DeviceBackend>) -> Self {
        self.backend_override = Some(backend);
        self
    }

    /// Replace the handler sources consulted by `init`
    pub fn with_discovery(mut self, discovery: Vec<Arc<dyn HandlerDiscovery>>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn init(&self, config: EngineConfig) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.is_some() {
            return Err(Error::AlreadyInited);
        }

        let backend = match &self.backend_override {
            Some(backend) => backend.clone(),
            None => {
                let lib = config.backend().ok_or_else(|| {
                    Error::InvalidConfig(format!("unknown native library '{}'", config.native_lib()))
                })?;
                backend_for(lib, config.buffer_size(), config.buffer_count())
            }
        };

        for source in &self.discovery {
            for handler in source.discover() {
                self.attach_progress(&handler);
                self.registry.add(handler);
            }
        }

        info!(
            "Audio engine initialized: backend '{}', handlers {:?}",
            backend.name(),
            self.registry.names()
        );
        *state = Some(EngineState { config, backend });
        Ok(())
    }

    /// Drop all handlers and the backend
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.take().is_none() {
            return Err(Error::NotInited);
        }
        for handler in self.registry.snapshot().iter() {
            if let Some(loader) = handler.loader() {
                loader.set_load_listener(None);
            }
        }
        self.registry.clear();
        info!("Audio engine closed");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn config(&self) -> Result<EngineConfig> {
        self.with_state(|s| s.config.clone())
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// Load through the earliest-registered handler accepting the source
    pub fn load_track(&self, source: Source) -> Result<Track> {
        self.ensure_inited()?;
        let described = source.describe();
        self.events
            .publish(ChannelType::TrackLoadStarted, json!({ "source": described }));

        match self.registry.load(source) {
            Ok(track) => {
                info!("Loaded {}: {}", described, track.format());
                self.events.publish(
                    ChannelType::TrackLoadCompleted,
                    json!({
                        "source": described,
                        "format": track.format().to_string(),
                        "duration_ms": track.duration().as_millis() as u64,
                    }),
                );
                Ok(track)
            }
            Err(e) => {
                warn!("Loading {} failed: {}", described, e);
                self.events.publish(
                    ChannelType::TrackLoadFailed,
                    json!({ "source": described, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Load every source through one handler accepting all of them.
    ///
    /// Returns an empty list when no single handler accepts every source.
    pub fn batch_load_track(&self, sources: Vec<Source>) -> Result<Vec<Track>> {
        self.ensure_inited()?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let Some(handler) = self.registry.find_for_all(&sources) else {
            debug!("No single handler accepts all {} sources", sources.len());
            return Ok(Vec::new());
        };
        match handler.loader() {
            Some(loader) => loader.load_batch(sources),
            None => Ok(Vec::new()),
        }
    }

    /// Initialized player bound to the first output device able to play the track
    pub fn get_track_player(&self, track: Arc<Track>) -> Result<TrackPlayer> {
        self.ensure_inited()?;
        let devices = self.available_output_devices().map_err(|e| {
            warn!("Output device enumeration failed: {}", e);
            Error::NoDevice
        })?;

        let device = devices
            .iter()
            .find(|d| d.is_supported_format(track.format()))
            .or_else(|| devices.first())
            .cloned()
            .ok_or(Error::NoDevice)?;

        let events = self.events.clone();
        let name = device.device_info().name;
        device.set_status_callback(Some(Arc::new(move |old: DeviceStatus, new: DeviceStatus| {
            events.publish(
                ChannelType::DeviceChanged,
                json!({ "device": name, "old": old, "new": new }),
            );
        })));

        let player = TrackPlayer::with_events(track, device, self.events.clone())?;
        player.init_player()?;
        Ok(player)
    }

    /// Handler claiming the format's extension
    pub fn find_loader_for(&self, format: &TrackFormat) -> Result<Option<Arc<LoaderHandler>>> {
        self.ensure_inited()?;
        Ok(self.registry.find_for_format(format))
    }

    /// Fresh mixer publishing on this engine's event manager; CD quality output
    pub fn mixer(&self) -> Result<TrackMixer> {
        self.ensure_inited()?;
        Ok(TrackMixer::new(presets::wav16bit_stereo_44khz()).with_events(self.events.clone()))
    }

    pub fn add_loader_handler(&self, handler: LoaderHandler) -> Result<()> {
        self.ensure_inited()?;
        self.attach_progress(&handler);
        self.registry.add(handler);
        Ok(())
    }

    pub fn remove_loader_handler(&self, name: &str) -> Result<bool> {
        self.ensure_inited()?;
        Ok(self.registry.remove(name))
    }

    /// Handler names in dispatch order
    pub fn available_loaders(&self) -> Result<Vec<String>> {
        self.ensure_inited()?;
        Ok(self.registry.names())
    }

    /// Forward a search prefix to every registered reader
    pub fn register_path_locator(&self, prefix: impl Into<PathBuf>) -> Result<()> {
        self.ensure_inited()?;
        let prefix = prefix.into();
        for handler in self.registry.snapshot().iter() {
            handler.register_path_locator(prefix.clone());
        }
        Ok(())
    }

    pub fn available_output_devices(&self) -> Result<Vec<Arc<dyn OutputAudioDevice>>> {
        self.with_state(|s| s.backend.clone())?.output_devices()
    }

    pub fn available_input_devices(&self) -> Result<Vec<Arc<dyn InputAudioDevice>>> {
        self.with_state(|s| s.backend.clone())?.input_devices()
    }

    /// Write the track with the exporter of the handler claiming `extension`
    pub fn export_track(&self, track: &Track, extension: &str, sink: &mut dyn Write) -> Result<()> {
        self.ensure_inited()?;
        let handler = self.exporter_for(extension)?;
        match handler.exporter() {
            Some(exporter) => exporter.save(track, sink),
            None => Err(Error::TrackExport(format!("no exporter for '{}'", extension))),
        }
    }

    /// Like `export_track`, choosing the handler from the path's extension
    pub fn export_track_to_path(&self, track: &Track, path: &Path) -> Result<()> {
        self.ensure_inited()?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::TrackExport(format!("{} has no extension", path.display())))?;
        let handler = self.exporter_for(extension)?;
        match handler.exporter() {
            Some(exporter) => exporter.save_to_path(track, path),
            None => Err(Error::TrackExport(format!("no exporter for '{}'", extension))),
        }
    }

    fn exporter_for(&self, extension: &str) -> Result<Arc<LoaderHandler>> {
        self.registry
            .snapshot()
            .iter()
            .find(|h| h.exporter().is_some() && h.handles_extension(extension))
            .cloned()
            .ok_or_else(|| Error::TrackExport(format!("no exporter for '{}'", extension)))
    }

    fn attach_progress(&self, handler: &LoaderHandler) {
        if let Some(loader) = handler.loader() {
            loader.set_load_listener(Some(Arc::new(LoadProgress {
                events: self.events.clone(),
            })));
        }
    }

    fn ensure_inited(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInited)
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&EngineState) -> T) -> Result<T> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.as_ref().map(f).ok_or(Error::NotInited)
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("initialized", &self.is_initialized())
            .field("handlers", &self.registry.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryOutputDevice, NullBackend};
    use crate::generator::generate_silence;
    use std::io::Cursor;
    use std::time::Duration;

    fn engine() -> AudioEngine {
        AudioEngine::new().unwrap().with_backend(Arc::new(NullBackend::new()))
    }

    fn cd_silence(ms: u64) -> Track {
        generate_silence(&presets::wav16bit_stereo_44khz(), Duration::from_millis(ms)).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let engine = engine();
        assert!(matches!(engine.available_loaders(), Err(Error::NotInited)));

        engine.init(EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.init(EngineConfig::default()),
            Err(Error::AlreadyInited)
        ));
        assert_eq!(engine.available_loaders().unwrap(), vec!["wav".to_string()]);

        engine.close().unwrap();
        assert!(!engine.is_initialized());
        assert!(matches!(engine.load_track(Source::path("a.wav")), Err(Error::NotInited)));
        assert!(matches!(engine.close(), Err(Error::NotInited)));
    }

    #[test]
    fn test_unknown_native_lib_rejected() {
        let engine = AudioEngine::new().unwrap();
        let mut config = EngineConfig::default();
        config.set_native_lib("pulse-direct").unwrap();
        assert!(matches!(engine.init(config), Err(Error::InvalidConfig(_))));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_null_lib_from_config() {
        let engine = AudioEngine::new().unwrap();
        let mut config = EngineConfig::default();
        config.set_native_lib("null").unwrap();
        engine.init(config).unwrap();
        let outputs = engine.available_output_devices().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].device_info().name, "null-output");
    }

    #[test]
    fn test_no_device() {
        let engine = AudioEngine::new()
            .unwrap()
            .with_backend(Arc::new(NullBackend::empty()));
        engine.init(EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.get_track_player(Arc::new(cd_silence(10))),
            Err(Error::NoDevice)
        ));
    }

    #[test]
    fn test_player_uses_backend_device() {
        let device = Arc::new(MemoryOutputDevice::new("speakers"));
        let backend = NullBackend::with_devices(vec![device.clone()], Vec::new());
        let engine = AudioEngine::new().unwrap().with_backend(Arc::new(backend));
        engine.init(EngineConfig::default()).unwrap();

        let player = engine.get_track_player(Arc::new(cd_silence(10))).unwrap();
        assert_eq!(player.device().device_info().name, "speakers");
        assert_eq!(device.opened_format(), Some(presets::wav16bit_stereo_44khz()));
    }

    #[test]
    fn test_export_then_load_stream() {
        let engine = engine();
        engine.init(EngineConfig::default()).unwrap();
        let track = cd_silence(20);

        let mut bytes = Vec::new();
        engine.export_track(&track, "wav", &mut bytes).unwrap();
        assert!(matches!(
            engine.export_track(&track, "mp3", &mut Vec::new()),
            Err(Error::TrackExport(_))
        ));

        // Streams are never claimed by extension
        assert!(matches!(
            engine.load_track(Source::stream(Cursor::new(bytes))),
            Err(Error::NoLoader(_))
        ));
    }

    #[test]
    fn test_handler_management() {
        let engine = engine();
        engine.init(EngineConfig::default()).unwrap();
        assert!(engine
            .find_loader_for(&presets::wav24bit_stereo_96khz())
            .unwrap()
            .is_some());
        assert!(engine.find_loader_for(&presets::mp3_stereo_128kbps()).unwrap().is_none());

        assert!(engine.remove_loader_handler("wav").unwrap());
        assert!(!engine.remove_loader_handler("wav").unwrap());
        assert!(engine.available_loaders().unwrap().is_empty());
        engine.add_loader_handler(wav_handler()).unwrap();
        assert_eq!(engine.available_loaders().unwrap(), vec!["wav".to_string()]);
    }

    #[test]
    fn test_batch_without_common_handler_is_empty() {
        let engine = engine();
        engine.init(EngineConfig::default()).unwrap();
        let loaded = engine
            .batch_load_track(vec![Source::path("a.wav"), Source::path("b.flac")])
            .unwrap();
        assert!(loaded.is_empty());
        assert!(engine.batch_load_track(Vec::new()).unwrap().is_empty());
    }
}

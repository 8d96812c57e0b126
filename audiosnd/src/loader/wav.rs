//! WAV handler: reader over paths, streams and URIs, plus the exporter

use super::{has_extension, LoadListener, LoaderHandler, PathLocators, Source, TrackExporter, TrackLoader};
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::track::{MetaKey, Track, TrackMetadata};
use crate::wav::{self, WavSummary};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// File extensions claimed by the WAV handler
pub const WAV_EXTENSIONS: &[&str] = &["wav", "wave"];

/// Handler with a WAV reader and writer and no codec hooks
pub fn wav_handler() -> LoaderHandler {
    LoaderHandler::new("wav", WAV_EXTENSIONS)
        .with_loader(Arc::new(WavTrackLoader::new()))
        .with_exporter(Arc::new(WavTrackExporter))
}

struct Opened {
    reader: Box<dyn Read + Send>,
    total: Option<u64>,
    path: Option<PathBuf>,
}

#[derive(Default)]
pub struct WavTrackLoader {
    locators: PathLocators,
    listener: RwLock<Option<Arc<dyn LoadListener>>>,
}

impl WavTrackLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locators(&self) -> &PathLocators {
        &self.locators
    }

    fn listener(&self) -> Option<Arc<dyn LoadListener>> {
        self.listener
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn open(&self, source: Source) -> Result<Opened> {
        match source {
            Source::Path(name) => open_file(self.locators.resolve(&name)?),
            Source::Stream(reader) => Ok(Opened {
                reader,
                total: None,
                path: None,
            }),
            Source::Uri(uri) => {
                let url = reqwest::Url::parse(&uri)
                    .map_err(|e| Error::UnsupportedSource(format!("{}: {}", uri, e)))?;
                match url.scheme() {
                    "file" => {
                        let path = url.to_file_path().map_err(|_| {
                            Error::UnsupportedSource(format!("{}: not a local path", uri))
                        })?;
                        if !path.is_file() {
                            return Err(Error::SourceNotFound(uri));
                        }
                        open_file(path)
                    }
                    "http" | "https" => fetch(url),
                    other => Err(Error::UnsupportedSource(format!(
                        "URI scheme '{}' in {}",
                        other, uri
                    ))),
                }
            }
        }
    }
}

fn open_file(path: PathBuf) -> Result<Opened> {
    let file = File::open(&path)?;
    let total = file.metadata().ok().map(|m| m.len());
    Ok(Opened {
        reader: Box::new(file),
        total,
        path: Some(path),
    })
}

fn fetch(url: reqwest::Url) -> Result<Opened> {
    debug!("Fetching {}", url);
    let response = reqwest::blocking::get(url.clone())
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Http(format!("{}: {}", url, e)))?;
    let total = response.content_length();
    Ok(Opened {
        reader: Box::new(response),
        total,
        path: None,
    })
}

/// Technical fields derivable from the header and the file system
fn technical_metadata(summary: &WavSummary, path: Option<&PathBuf>) -> Result<TrackMetadata> {
    let format = &summary.format;
    let mut meta = TrackMetadata::new();
    meta.set(MetaKey::SampleRate, format.sample_rate() as i64)?;
    meta.set(MetaKey::BitDepth, format.bits_per_sample() as i64)?;
    meta.set(MetaKey::Channels, format.channels() as i64)?;
    meta.set(MetaKey::Bitrate, format.bit_rate() as i64)?;
    meta.set(MetaKey::FileFormat, format.extension())?;
    meta.set(MetaKey::AudioCodec, format.codec().name())?;
    meta.set(MetaKey::Encoding, "PCM")?;
    meta.set(MetaKey::Duration, summary.duration())?;

    if let Some(path) = path {
        meta.set(MetaKey::FilePath, path.clone())?;
        if let Ok(stat) = fs::metadata(path) {
            meta.set(MetaKey::FileSize, stat.len() as i64)?;
            if let Ok(created) = stat.created() {
                meta.set(MetaKey::CreationDate, DateTime::<Utc>::from(created))?;
            }
            if let Ok(modified) = stat.modified() {
                meta.set(MetaKey::ModificationDate, DateTime::<Utc>::from(modified))?;
            }
        }
    }
    Ok(meta)
}

impl TrackLoader for WavTrackLoader {
    fn load(&self, source: Source) -> Result<Track> {
        let listener = self.listener();
        let described = source.describe();

        let result = self.open(source).and_then(|opened| {
            if let Some(l) = &listener {
                l.on_load_started(opened.total);
            }
            let mut progress = |loaded: u64| {
                if let Some(l) = &listener {
                    l.on_loading(loaded);
                }
            };
            wav::read_wav_with_progress(opened.reader, &mut progress)?.into_track()
        });

        match &result {
            Ok(track) => {
                debug!("Loaded {}: {} ({:?})", described, track.format(), track.duration());
                if let Some(l) = &listener {
                    l.on_load_finished();
                }
            }
            Err(e) => {
                warn!("Failed to load {}: {}", described, e);
                if let Some(l) = &listener {
                    l.on_load_failed(e);
                }
            }
        }
        result
    }

    fn read_metadata(&self, source: Source) -> Result<TrackMetadata> {
        let opened = self.open(source)?;
        let summary = wav::read_wav_summary(opened.reader)?;
        technical_metadata(&summary, opened.path.as_ref())
    }

    fn get_format(&self, source: Source) -> Result<TrackFormat> {
        wav::read_wav_format(self.open(source)?.reader)
    }

    fn is_supported(&self, source: &Source) -> bool {
        source
            .name()
            .map(|name| has_extension(&name, WAV_EXTENSIONS))
            .unwrap_or(false)
    }

    fn set_load_listener(&self, listener: Option<Arc<dyn LoadListener>>) {
        *self.listener.write().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    fn register_path_locator(&self, prefix: PathBuf) {
        self.locators.register(prefix);
    }
}

impl fmt::Debug for WavTrackLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WavTrackLoader")
            .field("locators", &self.locators.snapshot())
            .field("listener", &self.listener().is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WavTrackExporter;

impl TrackExporter for WavTrackExporter {
    fn save(&self, track: &Track, sink: &mut dyn Write) -> Result<()> {
        wav::write_wav(track, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::presets;
    use crate::track::SampleBuffer;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn ramp_track() -> Track {
        let format = presets::wav16bit_mono_8khz();
        let bytes: Vec<u8> = (0..16000u32).map(|i| (i % 251) as u8).collect();
        Track::new(
            SampleBuffer::from_vec(bytes, format.byte_order()),
            Duration::from_secs(1),
            format,
            TrackMetadata::new(),
        )
        .unwrap()
    }

    fn wav_bytes(track: &Track) -> Vec<u8> {
        let mut out = Vec::new();
        WavTrackExporter.save(track, &mut out).unwrap();
        out
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        loaded: Mutex<u64>,
    }

    impl LoadListener for Recorder {
        fn on_load_started(&self, total: Option<u64>) {
            self.events.lock().unwrap().push(format!("started {:?}", total));
        }

        fn on_loading(&self, loaded: u64) {
            *self.loaded.lock().unwrap() = loaded;
        }

        fn on_load_finished(&self) {
            self.events.lock().unwrap().push("finished".to_string());
        }

        fn on_load_failed(&self, _error: &Error) {
            self.events.lock().unwrap().push("failed".to_string());
        }
    }

    #[test]
    fn test_load_through_locator_with_progress() {
        let dir = TempDir::new().unwrap();
        let track = ramp_track();
        let bytes = wav_bytes(&track);
        fs::write(dir.path().join("ramp.wav"), &bytes).unwrap();

        let loader = WavTrackLoader::new();
        let recorder = Arc::new(Recorder::default());
        loader.set_load_listener(Some(recorder.clone()));
        loader.register_path_locator(dir.path().to_path_buf());

        let loaded = loader.load(Source::path("ramp.wav")).unwrap();
        assert_eq!(loaded.format(), track.format());
        assert_eq!(loaded.buffer().as_bytes(), track.buffer().as_bytes());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![format!("started {:?}", Some(bytes.len() as u64)), "finished".to_string()]
        );
        assert_eq!(*recorder.loaded.lock().unwrap(), 16000);
    }

    #[test]
    fn test_listener_sees_failure() {
        let loader = WavTrackLoader::new();
        let recorder = Arc::new(Recorder::default());
        loader.set_load_listener(Some(recorder.clone()));
        let err = loader
            .load(Source::stream(Cursor::new(b"RIFX".to_vec())))
            .unwrap_err();
        assert!(matches!(err, Error::ContainerFormat(_)));
        assert_eq!(recorder.events.lock().unwrap().last().unwrap(), "failed");
    }

    #[test]
    fn test_stream_and_file_uri() {
        let dir = TempDir::new().unwrap();
        let track = ramp_track();
        let file = dir.path().join("uri.wav");
        fs::write(&file, wav_bytes(&track)).unwrap();

        let loader = WavTrackLoader::new();
        let from_stream = loader
            .load(Source::stream(Cursor::new(wav_bytes(&track))))
            .unwrap();
        assert_eq!(from_stream.buffer().len(), 16000);

        let uri = reqwest::Url::from_file_path(&file).unwrap().to_string();
        assert!(loader.is_supported(&Source::uri(uri.clone())));
        let from_uri = loader.load(Source::uri(uri)).unwrap();
        assert_eq!(from_uri.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_uri_errors() {
        let loader = WavTrackLoader::new();
        assert!(matches!(
            loader.load(Source::uri("ftp://host/a.wav")),
            Err(Error::UnsupportedSource(_))
        ));
        assert!(matches!(
            loader.load(Source::uri("::not a uri::")),
            Err(Error::UnsupportedSource(_))
        ));
        assert!(matches!(
            loader.load(Source::path("definitely-missing.wav")),
            Err(Error::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_support_checks() {
        let loader = WavTrackLoader::new();
        assert!(loader.is_supported(&Source::path("a.WAV")));
        assert!(loader.is_supported(&Source::path("a.wave")));
        assert!(!loader.is_supported(&Source::path("a.mp3")));
        assert!(!loader.is_supported(&Source::stream(Cursor::new(Vec::new()))));
        assert!(loader.is_supported(&Source::uri("https://example.com/x.wav")));
    }

    #[test]
    fn test_metadata_and_format() {
        let dir = TempDir::new().unwrap();
        let track = ramp_track();
        let file = dir.path().join("meta.wav");
        let bytes = wav_bytes(&track);
        fs::write(&file, &bytes).unwrap();

        let loader = WavTrackLoader::new();
        let source = || Source::from(file.clone());
        assert_eq!(loader.get_format(source()).unwrap(), *track.format());

        let meta = loader.read_metadata(source()).unwrap();
        assert_eq!(meta.get_integer(MetaKey::SampleRate), Some(8000));
        assert_eq!(meta.get_integer(MetaKey::BitDepth), Some(16));
        assert_eq!(meta.get_integer(MetaKey::Channels), Some(1));
        assert_eq!(meta.get_integer(MetaKey::Bitrate), Some(128_000));
        assert_eq!(meta.get_text(MetaKey::FileFormat), Some("wav"));
        assert_eq!(meta.get_duration(MetaKey::Duration), Some(Duration::from_secs(1)));
        assert_eq!(meta.get_integer(MetaKey::FileSize), Some(bytes.len() as i64));
        assert_eq!(meta.get_path(MetaKey::FilePath), Some(file.as_path()));
        assert!(meta.contains(MetaKey::ModificationDate));
    }

    #[test]
    fn test_handler_exports_to_path() {
        let dir = TempDir::new().unwrap();
        let handler = wav_handler();
        let out = dir.path().join("out.wav");
        handler
            .exporter()
            .unwrap()
            .save_to_path(&ramp_track(), &out)
            .unwrap();
        assert_eq!(fs::metadata(&out).unwrap().len(), 44 + 16000);
        assert!(handler.encoder().is_none());
        assert!(handler.decoder().is_none());
    }
}

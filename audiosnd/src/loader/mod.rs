//! Loader plugin contract
//!
//! A [`LoaderHandler`] bundles the optional capabilities of one container
//! family: a reader ([`TrackLoader`]), a writer ([`TrackExporter`]) and
//! codec hooks ([`TrackEncoder`], [`TrackDecoder`]). Handlers are kept in
//! registration order by [`LoaderRegistry`] and the first one whose
//! reader accepts a source wins.

pub mod locator;
pub mod registry;
pub mod wav;

pub use locator::PathLocators;
pub use registry::LoaderRegistry;
pub use wav::{wav_handler, WavTrackExporter, WavTrackLoader};

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::track::{Track, TrackMetadata};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a track comes from
pub enum Source {
    /// File name, resolved through the loader's path locators
    Path(String),
    /// Already opened byte stream
    Stream(Box<dyn Read + Send>),
    /// `file:`, `http:` or `https:` URI
    Uri(String),
}

impl Source {
    pub fn path(name: impl Into<String>) -> Self {
        Source::Path(name.into())
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Source::Uri(uri.into())
    }

    pub fn stream<R: Read + Send + 'static>(reader: R) -> Self {
        Source::Stream(Box::new(reader))
    }

    /// Short human-readable description for logs and errors
    pub fn describe(&self) -> String {
        match self {
            Source::Path(p) => p.clone(),
            Source::Stream(_) => "<stream>".to_string(),
            Source::Uri(u) => u.clone(),
        }
    }

    /// Name used for extension checks; streams have none
    pub fn name(&self) -> Option<String> {
        match self {
            Source::Path(p) => Some(p.clone()),
            Source::Stream(_) => None,
            Source::Uri(u) => reqwest::Url::parse(u).ok().map(|url| url.path().to_string()),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Source::Stream(_) => f.write_str("Stream(..)"),
            Source::Uri(u) => f.debug_tuple("Uri").field(u).finish(),
        }
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::from(path.as_path())
    }
}

/// Case-insensitive match of `name` against `.ext` for any listed extension
pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext.to_lowercase())))
}

/// Progress callbacks for a running load
pub trait LoadListener: Send + Sync {
    /// `total` is the source size in bytes when known
    fn on_load_started(&self, total: Option<u64>);

    /// Bytes of sample data copied so far
    fn on_loading(&self, loaded: u64);

    fn on_load_finished(&self);

    fn on_load_failed(&self, error: &Error);
}

/// Reader side of a handler
pub trait TrackLoader: Send + Sync {
    fn load(&self, source: Source) -> Result<Track>;

    fn read_metadata(&self, source: Source) -> Result<TrackMetadata>;

    /// Format from the header only; the payload is not copied
    fn get_format(&self, source: Source) -> Result<TrackFormat>;

    fn is_supported(&self, source: &Source) -> bool;

    /// Load every source in order, failing on the first error
    fn load_batch(&self, sources: Vec<Source>) -> Result<Vec<Track>> {
        sources.into_iter().map(|s| self.load(s)).collect()
    }

    fn set_load_listener(&self, listener: Option<Arc<dyn LoadListener>>);

    fn register_path_locator(&self, prefix: PathBuf);
}

/// Writer side of a handler
pub trait TrackExporter: Send + Sync {
    fn save(&self, track: &Track, sink: &mut dyn Write) -> Result<()>;

    fn save_to_path(&self, track: &Track, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::TrackExport(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        self.save(track, &mut writer)?;
        writer
            .flush()
            .map_err(|e| Error::TrackExport(format!("{}: {}", path.display(), e)))
    }
}

/// PCM to compressed conversion
pub trait TrackEncoder: Send + Sync {
    fn encode_from_pcm(&self, input: &Track) -> Result<Track>;

    fn encode_to_format(&self, input: &Track, output: &TrackFormat) -> Result<Track>;
}

/// Compressed to PCM conversion
pub trait TrackDecoder: Send + Sync {
    fn decode_to_pcm(&self, input: &Track) -> Result<Track>;

    fn decode_to_format(&self, input: &Track, output: &TrackFormat) -> Result<Track>;
}

/// Capability bundle for one container family
#[derive(Clone)]
pub struct LoaderHandler {
    name: String,
    extensions: Vec<String>,
    loader: Option<Arc<dyn TrackLoader>>,
    exporter: Option<Arc<dyn TrackExporter>>,
    encoder: Option<Arc<dyn TrackEncoder>>,
    decoder: Option<Arc<dyn TrackDecoder>>,
}

impl LoaderHandler {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            loader: None,
            exporter: None,
            encoder: None,
            decoder: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn TrackLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn TrackExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn TrackEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TrackDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn loader(&self) -> Option<&Arc<dyn TrackLoader>> {
        self.loader.as_ref()
    }

    pub fn exporter(&self) -> Option<&Arc<dyn TrackExporter>> {
        self.exporter.as_ref()
    }

    pub fn encoder(&self) -> Option<&Arc<dyn TrackEncoder>> {
        self.encoder.as_ref()
    }

    pub fn decoder(&self) -> Option<&Arc<dyn TrackDecoder>> {
        self.decoder.as_ref()
    }

    /// Reader present and accepting the source
    pub fn is_supported(&self, source: &Source) -> bool {
        self.loader
            .as_ref()
            .map(|l| l.is_supported(source))
            .unwrap_or(false)
    }

    /// Format extension is one this handler claims
    pub fn handles_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    /// Forwarded to the reader; a handler without one ignores it
    pub fn register_path_locator(&self, prefix: impl Into<PathBuf>) {
        if let Some(loader) = &self.loader {
            loader.register_path_locator(prefix.into());
        }
    }
}

impl fmt::Debug for LoaderHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderHandler")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("loader", &self.loader.is_some())
            .field("exporter", &self.exporter.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

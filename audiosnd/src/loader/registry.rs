//! Ordered handler registry
//!
//! Readers see an immutable snapshot; registration swaps in a new list.

use super::{LoaderHandler, Source};
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::track::Track;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct LoaderRegistry {
    handlers: RwLock<Arc<Vec<Arc<LoaderHandler>>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. A handler with the same name is replaced in place.
    pub fn add(&self, handler: LoaderHandler) {
        let handler = Arc::new(handler);
        self.update(|list| {
            if let Some(slot) = list.iter_mut().find(|h| h.name() == handler.name()) {
                debug!("Replacing loader handler '{}'", handler.name());
                *slot = handler.clone();
            } else {
                info!("Registered loader handler '{}'", handler.name());
                list.push(handler.clone());
            }
        });
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut removed = false;
        self.update(|list| {
            let before = list.len();
            list.retain(|h| h.name() != name);
            removed = list.len() != before;
        });
        if removed {
            info!("Removed loader handler '{}'", name);
        }
        removed
    }

    pub fn clear(&self) {
        self.update(|list| list.clear());
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<LoaderHandler>>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handler names in dispatch order
    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|h| h.name().to_string()).collect()
    }

    /// Earliest-registered handler accepting the source
    pub fn find_for(&self, source: &Source) -> Option<Arc<LoaderHandler>> {
        self.snapshot()
            .iter()
            .find(|h| h.is_supported(source))
            .cloned()
    }

    /// Earliest-registered handler accepting every source
    pub fn find_for_all(&self, sources: &[Source]) -> Option<Arc<LoaderHandler>> {
        self.snapshot()
            .iter()
            .find(|h| h.loader().is_some() && sources.iter().all(|s| h.is_supported(s)))
            .cloned()
    }

    /// Earliest-registered handler claiming the format's extension
    pub fn find_for_format(&self, format: &TrackFormat) -> Option<Arc<LoaderHandler>> {
        self.snapshot()
            .iter()
            .find(|h| h.handles_extension(format.extension()))
            .cloned()
    }

    /// Load through the first accepting handler.
    ///
    /// When a handler rejects the content as unsupported the next accepting
    /// handler is tried, as long as the source can be reopened. Container
    /// and truncation errors end the dispatch.
    pub fn load(&self, source: Source) -> Result<Track> {
        let handlers = self.snapshot();
        let candidates: Vec<&Arc<LoaderHandler>> =
            handlers.iter().filter(|h| h.is_supported(&source)).collect();

        let Some((last, rest)) = candidates.split_last() else {
            return Err(Error::NoLoader(source.describe()));
        };

        for handler in rest {
            let Some(retry) = reopen(&source) else {
                return load_with(handler, source);
            };
            match load_with(handler, retry) {
                Err(e) if is_cascading(&e) => {
                    warn!(
                        "Loader '{}' rejected {}: {}; trying next handler",
                        handler.name(),
                        source.describe(),
                        e
                    );
                }
                other => return other,
            }
        }

        load_with(last, source)
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<LoaderHandler>>)) {
        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<Arc<LoaderHandler>> = guard.iter().cloned().collect();
        f(&mut next);
        *guard = Arc::new(next);
    }
}

fn load_with(handler: &LoaderHandler, source: Source) -> Result<Track> {
    match handler.loader() {
        Some(loader) => loader.load(source),
        None => Err(Error::NoLoader(source.describe())),
    }
}

fn reopen(source: &Source) -> Option<Source> {
    match source {
        Source::Path(p) => Some(Source::Path(p.clone())),
        Source::Uri(u) => Some(Source::Uri(u.clone())),
        Source::Stream(_) => None,
    }
}

fn is_cascading(error: &Error) -> bool {
    matches!(
        error,
        Error::UnsupportedCodec(_) | Error::UnsupportedSource(_) | Error::NoLoader(_)
    )
}

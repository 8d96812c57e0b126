//! Path locators
//!
//! A locator is a directory prefix. Relative inputs are tried as
//! `<locator>/<input>` in registration order before falling back to the
//! input as a plain path.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Ordered, copy-on-write list of directory prefixes
#[derive(Debug, Default)]
pub struct PathLocators {
    prefixes: RwLock<Arc<Vec<PathBuf>>>,
}

impl PathLocators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prefix; duplicates are ignored
    pub fn register(&self, prefix: impl Into<PathBuf>) {
        let prefix = prefix.into();
        let mut guard = self.prefixes.write().unwrap_or_else(|e| e.into_inner());
        if guard.iter().any(|p| *p == prefix) {
            return;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        debug!("Registered path locator {}", prefix.display());
        next.push(prefix);
        *guard = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<Vec<PathBuf>> {
        self.prefixes
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

    /// First existing file among `<prefix>/<input>` and then `input` itself
    pub fn resolve(&self, input: &str) -> Result<PathBuf> {
        for prefix in self.snapshot().iter() {
            let candidate = prefix.join(input);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        let plain = Path::new(input);
        if plain.is_file() {
            return Ok(plain.to_path_buf());
        }

        Err(Error::SourceNotFound(input.to_string()))
    }
}

//! Typed track metadata
//!
//! Each `MetaKey` declares the type of value it accepts; `TrackMetadata`
//! checks values against that type on insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Value type a key accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    Text,
    Integer,
    Float,
    Duration,
    Path,
    Timestamp,
    Binary,
}

impl std::fmt::Display for MetaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetaType::Text => "text",
            MetaType::Integer => "integer",
            MetaType::Float => "float",
            MetaType::Duration => "duration",
            MetaType::Path => "path",
            MetaType::Timestamp => "timestamp",
            MetaType::Binary => "binary",
        };
        write!(f, "{}", name)
    }
}

/// Metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Duration(Duration),
    Path(PathBuf),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl MetaValue {
    pub fn meta_type(&self) -> MetaType {
        match self {
            MetaValue::Text(_) => MetaType::Text,
            MetaValue::Integer(_) => MetaType::Integer,
            MetaValue::Float(_) => MetaType::Float,
            MetaValue::Duration(_) => MetaType::Duration,
            MetaValue::Path(_) => MetaType::Path,
            MetaValue::Timestamp(_) => MetaType::Timestamp,
            MetaValue::Binary(_) => MetaType::Binary,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Integer(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<Duration> for MetaValue {
    fn from(v: Duration) -> Self {
        MetaValue::Duration(v)
    }
}

impl From<PathBuf> for MetaValue {
    fn from(v: PathBuf) -> Self {
        MetaValue::Path(v)
    }
}

impl From<DateTime<Utc>> for MetaValue {
    fn from(v: DateTime<Utc>) -> Self {
        MetaValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for MetaValue {
    fn from(v: Vec<u8>) -> Self {
        MetaValue::Binary(v)
    }
}

/// Metadata errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Metadata key {key} expects {expected}, got {actual}")]
    TypeMismatch {
        key: MetaKey,
        expected: MetaType,
        actual: MetaType,
    },
}

macro_rules! meta_keys {
    ($($variant:ident => ($id:expr, $readable:expr, $ty:ident)),+ $(,)?) => {
        /// Known metadata keys with their ID3 frame id (or a plain tag id)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum MetaKey {
            $($variant),+
        }

        impl MetaKey {
            pub const ALL: &'static [MetaKey] = &[$(MetaKey::$variant),+];

            /// ID3v2 frame id, or the plain tag id for non-ID3 fields
            pub fn id3(&self) -> &'static str {
                match self {
                    $(MetaKey::$variant => $id),+
                }
            }

            /// Human readable field name, e.g. `album_artist`
            pub fn readable_name(&self) -> &'static str {
                match self {
                    $(MetaKey::$variant => $readable),+
                }
            }

            pub fn value_type(&self) -> MetaType {
                match self {
                    $(MetaKey::$variant => MetaType::$ty),+
                }
            }
        }
    };
}

meta_keys! {
    Title => ("TIT2", "title", Text),
    Artist => ("TPE1", "artist", Text),
    Album => ("TALB", "album", Text),
    AlbumArtist => ("TPE2", "album_artist", Text),
    Year => ("TYER", "year", Integer),
    TrackNumber => ("TRCK", "track_number", Integer),
    Genre => ("TCON", "genre", Text),
    Composer => ("TCOM", "composer", Text),
    Lyricist => ("TEXT", "lyricist", Text),
    Publisher => ("TPUB", "publisher", Text),
    Bpm => ("TBPM", "bpm", Float),
    Key => ("TKEY", "key", Text),
    Mood => ("TMOO", "mood", Text),
    Isrc => ("TSRC", "isrc", Text),
    Encoder => ("TENC", "encoder", Text),
    Language => ("TLAN", "language", Text),
    Copyright => ("TCOP", "copyright", Text),
    Comment => ("COMM", "comment", Text),
    DiscNumber => ("TPOS", "disc_number", Integer),
    DiscTotal => ("TPOS", "disc_total", Integer),
    TrackTotal => ("TRCK", "track_total", Integer),
    Duration => ("DURATION", "duration", Duration),
    SampleRate => ("SAMPLERATE", "samplerate", Integer),
    BitDepth => ("BITDEPTH", "bitdepth", Integer),
    Channels => ("CHANNELS", "channels", Integer),
    Bitrate => ("BITRATE", "bitrate", Integer),
    Encoding => ("ENCODING", "encoding", Text),
    FileFormat => ("FORMAT", "format", Text),
    AudioCodec => ("CODEC", "codec", Text),
    FilePath => ("FILEPATH", "filepath", Path),
    FileSize => ("FILESIZE", "filesize", Integer),
    CreationDate => ("CREATED", "created", Timestamp),
    ModificationDate => ("MODIFIED", "modified", Timestamp),
    AlbumArt => ("APIC", "album_art", Binary),
    ArtistImage => ("APIC", "artist_image", Binary),
    ReplaygainTrackGain => ("REPLAYGAIN_TRACK_GAIN", "replaygain_track_gain", Float),
    ReplaygainTrackPeak => ("REPLAYGAIN_TRACK_PEAK", "replaygain_track_peak", Float),
    ReplaygainAlbumGain => ("REPLAYGAIN_ALBUM_GAIN", "replaygain_album_gain", Float),
    ReplaygainAlbumPeak => ("REPLAYGAIN_ALBUM_PEAK", "replaygain_album_peak", Float),
}

impl MetaKey {
    /// First key using the given frame id
    pub fn from_id3(id: &str) -> Option<MetaKey> {
        MetaKey::ALL
            .iter()
            .copied()
            .find(|k| k.id3().eq_ignore_ascii_case(id))
    }
}

impl std::fmt::Display for MetaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.readable_name(), self.value_type())
    }
}

/// Key/value metadata attached to a track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    entries: BTreeMap<MetaKey, MetaValue>,
}

impl TrackMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous one.
    ///
    /// Fails when the value's type differs from the key's declared type.
    pub fn set(&mut self, key: MetaKey, value: impl Into<MetaValue>) -> Result<(), MetadataError> {
        let value = value.into();
        let actual = value.meta_type();
        let expected = key.value_type();
        if actual != expected {
            return Err(MetadataError::TypeMismatch {
                key,
                expected,
                actual,
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: MetaKey) -> Option<&MetaValue> {
        self.entries.get(&key)
    }

    pub fn get_text(&self, key: MetaKey) -> Option<&str> {
        match self.entries.get(&key) {
            Some(MetaValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_integer(&self, key: MetaKey) -> Option<i64> {
        match self.entries.get(&key) {
            Some(MetaValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: MetaKey) -> Option<f64> {
        match self.entries.get(&key) {
            Some(MetaValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_duration(&self, key: MetaKey) -> Option<Duration> {
        match self.entries.get(&key) {
            Some(MetaValue::Duration(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_path(&self, key: MetaKey) -> Option<&Path> {
        match self.entries.get(&key) {
            Some(MetaValue::Path(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_timestamp(&self, key: MetaKey) -> Option<DateTime<Utc>> {
        match self.entries.get(&key) {
            Some(MetaValue::Timestamp(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_binary(&self, key: MetaKey) -> Option<&[u8]> {
        match self.entries.get(&key) {
            Some(MetaValue::Binary(v)) => Some(v),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: MetaKey) -> Option<MetaValue> {
        self.entries.remove(&key)
    }

    pub fn contains(&self, key: MetaKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys present, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = MetaKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy all entries of `other` over this map
    pub fn merge(&mut self, other: &TrackMetadata) {
        for (key, value) in &other.entries {
            self.entries.insert(*key, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_set_and_get() {
        let mut meta = TrackMetadata::new();
        meta.set(MetaKey::Title, "Block Story").unwrap();
        meta.set(MetaKey::Year, 2024i64).unwrap();
        meta.set(MetaKey::Bpm, 128.0).unwrap();
        meta.set(MetaKey::Duration, Duration::from_secs(3)).unwrap();

        assert_eq!(meta.get_text(MetaKey::Title), Some("Block Story"));
        assert_eq!(meta.get_integer(MetaKey::Year), Some(2024));
        assert_eq!(meta.get_float(MetaKey::Bpm), Some(128.0));
        assert_eq!(meta.get_duration(MetaKey::Duration), Some(Duration::from_secs(3)));
        assert_eq!(meta.get_text(MetaKey::Year), None);
        assert_eq!(meta.len(), 4);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut meta = TrackMetadata::new();
        let err = meta.set(MetaKey::Year, "2024").unwrap_err();
        assert_eq!(
            err,
            MetadataError::TypeMismatch {
                key: MetaKey::Year,
                expected: MetaType::Integer,
                actual: MetaType::Text,
            }
        );
        assert!(meta.is_empty());
    }

    #[test]
    fn test_keys_clear_and_merge() {
        let mut a = TrackMetadata::new();
        a.set(MetaKey::Artist, "A").unwrap();
        let mut b = TrackMetadata::new();
        b.set(MetaKey::Artist, "B").unwrap();
        b.set(MetaKey::Genre, "Ambient").unwrap();

        a.merge(&b);
        assert_eq!(a.keys().collect::<Vec<_>>(), vec![MetaKey::Artist, MetaKey::Genre]);
        assert_eq!(a.get_text(MetaKey::Artist), Some("B"));

        assert_eq!(a.remove(MetaKey::Genre), Some(MetaValue::Text("Ambient".into())));
        a.clear();
        assert!(a.is_empty());
        assert!(!a.contains(MetaKey::Artist));
    }

    #[test]
    fn test_readable_names() {
        assert_eq!(MetaKey::AlbumArtist.readable_name(), "album_artist");
        assert_eq!(MetaKey::AlbumArtist.id3(), "TPE2");
        assert_eq!(MetaKey::from_id3("tpos"), Some(MetaKey::DiscNumber));
        assert_eq!(MetaKey::from_id3("XXXX"), None);
        assert_eq!(MetaKey::Bpm.to_string(), "bpm (float)");
    }
}

//! # AudioSND
//!
//! Embeddable audio engine: WAV loading and export, PCM mixing, waveform
//! generation and device playback.
//!
//! **Architecture:** loaders decode sources into immutable `Track`s; the
//! mixer and generator produce new tracks; a `TrackPlayer` streams a track to
//! an output device from its own thread. `AudioEngine` owns configuration,
//! the device backend, the loader registry and the event manager.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod generator;
pub mod loader;
pub mod mixer;
pub mod player;
pub mod quantize;
pub mod track;
pub mod wav;

pub use engine::{AudioEngine, BuiltinHandlers, HandlerDiscovery};
pub use error::{Error, Result};
pub use format::{ByteOrder, Codec, TrackFormat};
pub use loader::{LoaderHandler, Source};
pub use mixer::TrackMixer;
pub use player::{LoopCount, TrackPlayer, TrackStatus};
pub use track::{Track, TrackMetadata};

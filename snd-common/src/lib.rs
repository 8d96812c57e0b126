//! # AudioSND Common Library
//!
//! Shared code for the AudioSND engine and its tools:
//! - Error type shared by configuration and events
//! - Engine configuration and the TOML preference store
//! - Event channels, listeners and the broadcasting event manager

pub mod config;
pub mod error;
pub mod events;

pub use config::{EngineConfig, NativeLib, PreferencesStore};
pub use error::{Error, Result};
pub use events::{ChannelType, EventListener, EventManager, EventSink, ListenerId, SndEvent};

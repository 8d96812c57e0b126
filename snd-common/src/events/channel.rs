//! Event channel and event value types

use serde::{Deserialize, Serialize};

/// Channels an event can be published on.
///
/// Listeners subscribe to a single channel or to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    TrackPlayStarted,
    TrackPlayPaused,
    TrackPlayStopped,
    TrackLoadStarted,
    TrackLoadProgress,
    TrackLoadCompleted,
    TrackLoadFailed,
    MixerChannelAdded,
    MixerChannelRemoved,
    MixerVolumeChanged,
    EffectApplied,
    EffectChainUpdated,
    DeviceChanged,
    BufferUnderrun,
}

impl ChannelType {
    /// Every channel, in declaration order
    pub const ALL: [ChannelType; 14] = [
        ChannelType::TrackPlayStarted,
        ChannelType::TrackPlayPaused,
        ChannelType::TrackPlayStopped,
        ChannelType::TrackLoadStarted,
        ChannelType::TrackLoadProgress,
        ChannelType::TrackLoadCompleted,
        ChannelType::TrackLoadFailed,
        ChannelType::MixerChannelAdded,
        ChannelType::MixerChannelRemoved,
        ChannelType::MixerVolumeChanged,
        ChannelType::EffectApplied,
        ChannelType::EffectChainUpdated,
        ChannelType::DeviceChanged,
        ChannelType::BufferUnderrun,
    ];

    /// Wire name of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::TrackPlayStarted => "TRACK_PLAY_STARTED",
            ChannelType::TrackPlayPaused => "TRACK_PLAY_PAUSED",
            ChannelType::TrackPlayStopped => "TRACK_PLAY_STOPPED",
            ChannelType::TrackLoadStarted => "TRACK_LOAD_STARTED",
            ChannelType::TrackLoadProgress => "TRACK_LOAD_PROGRESS",
            ChannelType::TrackLoadCompleted => "TRACK_LOAD_COMPLETED",
            ChannelType::TrackLoadFailed => "TRACK_LOAD_FAILED",
            ChannelType::MixerChannelAdded => "MIXER_CHANNEL_ADDED",
            ChannelType::MixerChannelRemoved => "MIXER_CHANNEL_REMOVED",
            ChannelType::MixerVolumeChanged => "MIXER_VOLUME_CHANGED",
            ChannelType::EffectApplied => "EFFECT_APPLIED",
            ChannelType::EffectChainUpdated => "EFFECT_CHAIN_UPDATED",
            ChannelType::DeviceChanged => "DEVICE_CHANGED",
            ChannelType::BufferUnderrun => "BUFFER_UNDERRUN",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published event: channel, opaque payload and publication time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SndEvent {
    pub channel: ChannelType,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SndEvent {
    pub fn new(channel: ChannelType, payload: serde_json::Value) -> Self {
        Self {
            channel,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_serializes_to_wire_name() {
        for channel in ChannelType::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{}\"", channel.as_str()));
        }
    }

    #[test]
    fn test_event_round_trips_through_json() {
        let event = SndEvent::new(
            ChannelType::TrackLoadProgress,
            serde_json::json!({ "loaded": 1024 }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: SndEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.channel, ChannelType::TrackLoadProgress);
        assert_eq!(back.payload["loaded"], 1024);
    }
}

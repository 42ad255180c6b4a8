//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser's player and the
//! API server. The browser reports what its media element does and what the
//! viewer touches; the server answers with commands for the media element and
//! the player chrome.

use gloverse_core::player::{Effect, Input, MediaKind, PlaybackMode, SeekDirection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Mounts the player for a video. A second `Mount` replaces the running
    /// session and runs ad selection again.
    Mount { content_id: Uuid },

    /// The player was unmounted. The connection may mount again later.
    Unmount,

    // --- Media element events ---
    // `source` echoes the number of the `load_source` the element is playing.
    TimeUpdate { source: u64, current_time: f64 },
    DurationChange { source: u64, duration: f64 },
    VolumeChange { volume: f64, muted: bool },
    Playing { source: u64 },
    Paused { source: u64 },
    Ended { source: u64 },

    /// The browser refused to start playback with sound.
    AutoplayRejected { source: u64 },

    FullscreenChanged { active: bool },

    /// The browser rejected a fullscreen request or exit.
    FullscreenError { message: String },

    // --- Viewer interactions ---
    /// A tap on the video surface; `x_fraction` is 0.0 at the left edge and
    /// 1.0 at the right edge.
    Tap { x_fraction: f64 },
    PointerActivity,
    TogglePlay,
    Scrub { time: f64 },
    SetVolume { volume: f64 },
    ToggleMute,
    Unmute,
    SkipAd,
    ToggleFullscreen,
}

impl ClientMessage {
    /// The source a media element event belongs to. `None` for messages that
    /// are not tied to the element's current source.
    pub fn source(&self) -> Option<u64> {
        match self {
            ClientMessage::TimeUpdate { source, .. }
            | ClientMessage::DurationChange { source, .. }
            | ClientMessage::Playing { source }
            | ClientMessage::Paused { source }
            | ClientMessage::Ended { source }
            | ClientMessage::AutoplayRejected { source } => Some(*source),
            _ => None,
        }
    }

    /// Converts a message into a session input. Session lifecycle messages and
    /// pure reports (`FullscreenError`) have no input counterpart.
    pub fn into_input(self) -> Option<Input> {
        let input = match self {
            ClientMessage::Mount { .. }
            | ClientMessage::Unmount
            | ClientMessage::FullscreenError { .. } => return None,
            ClientMessage::TimeUpdate { current_time, .. } => Input::TimeUpdate(current_time),
            ClientMessage::DurationChange { duration, .. } => Input::DurationChange(duration),
            ClientMessage::VolumeChange { volume, muted } => Input::VolumeChange { volume, muted },
            ClientMessage::Playing { .. } => Input::Playing,
            ClientMessage::Paused { .. } => Input::Paused,
            ClientMessage::Ended { .. } => Input::Ended,
            ClientMessage::AutoplayRejected { .. } => Input::AutoplayRejected,
            ClientMessage::FullscreenChanged { active } => Input::FullscreenChanged(active),
            ClientMessage::Tap { x_fraction } => Input::Tap { x_fraction },
            ClientMessage::PointerActivity => Input::PointerActivity,
            ClientMessage::TogglePlay => Input::TogglePlay,
            ClientMessage::Scrub { time } => Input::Scrub(time),
            ClientMessage::SetVolume { volume } => Input::SetVolume(volume),
            ClientMessage::ToggleMute => Input::ToggleMute,
            ClientMessage::Unmute => Input::Unmute,
            ClientMessage::SkipAd => Input::SkipAd,
            ClientMessage::ToggleFullscreen => Input::ToggleFullscreen,
        };
        Some(input)
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ad,
    Content,
}

impl From<MediaKind> for SourceKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Ad => SourceKind::Ad,
            MediaKind::Content => SourceKind::Content,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Ad,
    Content,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Backward,
    Forward,
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms that a session was created for the mounted video.
    SessionStarted { content_id: Uuid, generation: u64 },

    /// Replace the media element's source. Media events for it must carry
    /// `source`; events with any other number are dropped.
    LoadSource {
        source: u64,
        url: String,
        kind: SourceKind,
    },
    Play { muted: bool },
    Pause,
    Seek { time: f64 },
    Volume { volume: f64, muted: bool },
    ModeChanged { mode: Mode },
    SkipAvailable { visible: bool },
    UnmutePrompt { visible: bool },
    Controls { visible: bool },

    /// Seek acknowledgement overlay; `null` hides it.
    SeekIndicator { direction: Option<Direction> },
    RequestFullscreen,
    ExitFullscreen,

    /// A dismissible, non-blocking notification.
    Notice { id: u64, message: String },

    /// Reports an error that prevented the player from starting.
    Error { message: String },
}

impl ServerMessage {
    pub fn load_source(source: u64, url: &str, kind: MediaKind) -> Self {
        ServerMessage::LoadSource {
            source,
            url: url.to_string(),
            kind: kind.into(),
        }
    }

    /// Translates a session effect into a client command. Effects addressed to
    /// the driver itself yield `None`, as does `LoadSource`, which the driver
    /// numbers and sends through `ServerMessage::load_source`.
    pub fn from_effect(effect: &Effect) -> Option<Self> {
        let message = match effect {
            Effect::FetchInventory { .. } | Effect::Bill { .. } | Effect::LoadSource { .. } => {
                return None
            }
            Effect::Play { muted } => ServerMessage::Play { muted: *muted },
            Effect::Pause => ServerMessage::Pause,
            Effect::Seek { time } => ServerMessage::Seek { time: *time },
            Effect::SetVolume { volume, muted } => ServerMessage::Volume {
                volume: *volume,
                muted: *muted,
            },
            Effect::ModeChanged(mode) => ServerMessage::ModeChanged {
                mode: match mode {
                    PlaybackMode::AdPhase => Mode::Ad,
                    PlaybackMode::ContentPhase => Mode::Content,
                },
            },
            Effect::SkipAvailable(visible) => ServerMessage::SkipAvailable { visible: *visible },
            Effect::UnmutePrompt(visible) => ServerMessage::UnmutePrompt { visible: *visible },
            Effect::ControlsVisible(visible) => ServerMessage::Controls { visible: *visible },
            Effect::SeekIndicator(direction) => ServerMessage::SeekIndicator {
                direction: direction.map(|d| match d {
                    SeekDirection::Backward => Direction::Backward,
                    SeekDirection::Forward => Direction::Forward,
                }),
            },
            Effect::RequestFullscreen => ServerMessage::RequestFullscreen,
            Effect::ExitFullscreen => ServerMessage::ExitFullscreen,
        };
        Some(message)
    }
}

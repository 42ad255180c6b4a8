//! Commands emitted by the player state machine.

use uuid::Uuid;

use super::controls::SeekDirection;
use super::session::PlaybackMode;

/// Which kind of media a `LoadSource` command carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Ad,
    Content,
}

/// A side effect requested by a `PlaybackSession`.
///
/// Most variants are commands for the client's media element. `FetchInventory`
/// and `Bill` are requests for the driver, which performs them asynchronously
/// and feeds the outcome back as an `Input` tagged with the same generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchInventory {
        generation: u64,
    },
    Bill {
        generation: u64,
        advertiser_id: Uuid,
        campaign_id: Uuid,
        amount_cents: i64,
    },
    LoadSource {
        url: String,
        kind: MediaKind,
    },
    Play {
        muted: bool,
    },
    Pause,
    Seek {
        time: f64,
    },
    SetVolume {
        volume: f64,
        muted: bool,
    },
    ModeChanged(PlaybackMode),
    SkipAvailable(bool),
    UnmutePrompt(bool),
    ControlsVisible(bool),
    /// `None` clears the acknowledgement.
    SeekIndicator(Option<SeekDirection>),
    RequestFullscreen,
    ExitFullscreen,
}

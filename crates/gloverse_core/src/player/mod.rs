//! crates/gloverse_core/src/player/mod.rs
//!
//! The headless video player: pre-roll ad selection and billing, playback
//! controls and gesture interpretation. The client's media element only
//! reports events and executes the `Effect`s produced here.
//!
//! Nothing in this module performs I/O or reads a clock. Every input carries
//! the current time as a `Duration` since the driver started, which keeps all
//! transitions deterministic under test.

pub mod ad_flow;
pub mod controls;
pub mod effect;
pub mod session;

use std::time::Duration;

pub use ad_flow::{ActiveAd, AdFlow, AdFlowState};
pub use controls::{Controls, MediaState, SeekDirection};
pub use effect::{Effect, MediaKind};
pub use session::{Input, PlaybackMode, PlaybackSession};

/// Watched seconds after which an ad is billed and becomes skippable.
pub const SKIP_THRESHOLD_SECS: f64 = 5.0;

/// Fixed debit per impression, in cents (0.10 currency units).
pub const DEFAULT_AD_CHARGE_CENTS: i64 = 10;

/// Two taps closer together than this form a double tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

/// Distance of a double-tap seek.
pub const SEEK_STEP_SECS: f64 = 10.0;

/// How long the seek acknowledgement stays on screen.
pub const SEEK_INDICATOR_DURATION: Duration = Duration::from_millis(500);

/// Inactivity before the controls hide while playing.
pub const CONTROLS_HIDE_DELAY: Duration = Duration::from_secs(3);

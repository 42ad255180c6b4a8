//! crates/gloverse_core/src/player/controls.rs
//!
//! Playback controls and gesture interpretation. This layer is unaware of ads;
//! the session tells it whether gestures and seeking are currently allowed.

use std::time::Duration;

use super::effect::Effect;
use super::{CONTROLS_HIDE_DELAY, DOUBLE_TAP_WINDOW, SEEK_INDICATOR_DURATION, SEEK_STEP_SECS};

/// Mirror of the client's media element. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
    pub paused: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            paused: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Backward,
    Forward,
}

impl SeekDirection {
    /// Left half of the surface seeks backward, right half forward.
    pub fn from_tap(x_fraction: f64) -> Self {
        if x_fraction < 0.5 {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        }
    }

    fn offset(self) -> f64 {
        match self {
            SeekDirection::Backward => -SEEK_STEP_SECS,
            SeekDirection::Forward => SEEK_STEP_SECS,
        }
    }
}

#[derive(Debug)]
pub struct Controls {
    media: MediaState,
    /// Last non-zero volume, restored on unmute.
    last_volume: f64,
    visible: bool,
    hide_at: Option<Duration>,
    pending_tap: Option<Duration>,
    indicator: Option<(SeekDirection, Duration)>,
    fullscreen: bool,
    unmute_prompt: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl Controls {
    pub fn new() -> Self {
        Self {
            media: MediaState::default(),
            last_volume: 1.0,
            visible: true,
            hide_at: None,
            pending_tap: None,
            indicator: None,
            fullscreen: false,
            unmute_prompt: false,
        }
    }

    pub fn media(&self) -> &MediaState {
        &self.media
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn unmute_prompt(&self) -> bool {
        self.unmute_prompt
    }

    pub fn seek_indicator(&self) -> Option<SeekDirection> {
        self.indicator.map(|(direction, _)| direction)
    }

    //-------------------------------------------------------------------------------------
    // Timers
    //-------------------------------------------------------------------------------------

    /// The earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        [
            self.pending_tap.map(|at| at + DOUBLE_TAP_WINDOW),
            self.indicator.map(|(_, until)| until),
            self.hide_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn tick(&mut self, now: Duration) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(at) = self.pending_tap {
            if now >= at + DOUBLE_TAP_WINDOW {
                self.pending_tap = None;
                effects.extend(self.toggle_play());
            }
        }

        if let Some((_, until)) = self.indicator {
            if now >= until {
                self.indicator = None;
                effects.push(Effect::SeekIndicator(None));
            }
        }

        if let Some(at) = self.hide_at {
            if now >= at {
                self.hide_at = None;
                if self.visible && !self.media.paused {
                    self.visible = false;
                    effects.push(Effect::ControlsVisible(false));
                }
            }
        }

        effects
    }

    /// Any pointer or touch activity shows the controls and restarts the hide timer.
    pub fn register_activity(&mut self, now: Duration) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.visible {
            self.visible = true;
            effects.push(Effect::ControlsVisible(true));
        }
        self.hide_at = (!self.media.paused).then(|| now + CONTROLS_HIDE_DELAY);
        effects
    }

    //-------------------------------------------------------------------------------------
    // Gestures and seeking
    //-------------------------------------------------------------------------------------

    /// A tap on the video surface.
    ///
    /// The first tap is held for the double-tap window; `tick` turns it into a
    /// play/pause toggle if no second tap arrives in time.
    pub fn tap(&mut self, now: Duration, x_fraction: f64, gestures_enabled: bool) -> Vec<Effect> {
        let mut effects = self.register_activity(now);
        if !gestures_enabled {
            self.pending_tap = None;
            return effects;
        }

        if let Some(first) = self.pending_tap.take() {
            if now.saturating_sub(first) < DOUBLE_TAP_WINDOW {
                effects.extend(self.seek_step(now, SeekDirection::from_tap(x_fraction)));
                return effects;
            }
            effects.extend(self.toggle_play());
        }
        self.pending_tap = Some(now);
        effects
    }

    pub fn scrub(&mut self, time: f64, seek_enabled: bool) -> Vec<Effect> {
        if !seek_enabled || !time.is_finite() {
            return Vec::new();
        }
        let target = self.clamp_time(time);
        self.media.current_time = target;
        vec![Effect::Seek { time: target }]
    }

    fn seek_step(&mut self, now: Duration, direction: SeekDirection) -> Vec<Effect> {
        let target = self.clamp_time(self.media.current_time + direction.offset());
        self.media.current_time = target;
        self.indicator = Some((direction, now + SEEK_INDICATOR_DURATION));
        vec![
            Effect::Seek { time: target },
            Effect::SeekIndicator(Some(direction)),
        ]
    }

    fn clamp_time(&self, time: f64) -> f64 {
        // An unknown duration (metadata not loaded yet) only bounds from below.
        if self.media.duration > 0.0 {
            time.clamp(0.0, self.media.duration)
        } else {
            time.max(0.0)
        }
    }

    pub fn toggle_play(&mut self) -> Vec<Effect> {
        if self.media.paused {
            vec![Effect::Play {
                muted: self.media.muted,
            }]
        } else {
            vec![Effect::Pause]
        }
    }

    //-------------------------------------------------------------------------------------
    // Volume
    //-------------------------------------------------------------------------------------

    pub fn set_volume(&mut self, volume: f64) -> Vec<Effect> {
        if !volume.is_finite() {
            return Vec::new();
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut effects = Vec::new();
        self.media.volume = volume;
        if volume > 0.0 {
            self.last_volume = volume;
            self.media.muted = false;
            effects.extend(self.clear_unmute_prompt());
        }
        effects.push(self.volume_effect());
        effects
    }

    pub fn toggle_mute(&mut self) -> Vec<Effect> {
        if self.media.muted {
            self.unmute()
        } else {
            self.mute()
        }
    }

    pub fn mute(&mut self) -> Vec<Effect> {
        if self.media.volume > 0.0 {
            self.last_volume = self.media.volume;
        }
        self.media.muted = true;
        vec![self.volume_effect()]
    }

    /// Explicit unmute by the viewer; also dismisses the autoplay prompt.
    pub fn unmute(&mut self) -> Vec<Effect> {
        self.media.muted = false;
        if self.media.volume <= 0.0 {
            self.media.volume = self.last_volume;
        }
        let mut effects = self.clear_unmute_prompt();
        effects.push(self.volume_effect());
        effects
    }

    fn volume_effect(&self) -> Effect {
        Effect::SetVolume {
            volume: self.media.volume,
            muted: self.media.muted,
        }
    }

    fn clear_unmute_prompt(&mut self) -> Vec<Effect> {
        if self.unmute_prompt {
            self.unmute_prompt = false;
            vec![Effect::UnmutePrompt(false)]
        } else {
            Vec::new()
        }
    }

    /// The platform refused to autoplay with sound: retry muted and keep the
    /// unmute affordance up until the viewer acts on it.
    pub fn on_autoplay_rejected(&mut self) -> Vec<Effect> {
        self.media.muted = true;
        let mut effects = vec![Effect::Play { muted: true }];
        if !self.unmute_prompt {
            self.unmute_prompt = true;
            effects.push(Effect::UnmutePrompt(true));
        }
        effects
    }

    //-------------------------------------------------------------------------------------
    // Fullscreen
    //-------------------------------------------------------------------------------------

    /// Requests the opposite of the last reported state. The state itself only
    /// changes when the client confirms it through `on_fullscreen_changed`.
    pub fn toggle_fullscreen(&self) -> Vec<Effect> {
        if self.fullscreen {
            vec![Effect::ExitFullscreen]
        } else {
            vec![Effect::RequestFullscreen]
        }
    }

    pub fn on_fullscreen_changed(&mut self, active: bool) {
        self.fullscreen = active;
    }

    //-------------------------------------------------------------------------------------
    // Media element mirror
    //-------------------------------------------------------------------------------------

    pub fn on_time_update(&mut self, current_time: f64) {
        if current_time.is_finite() {
            self.media.current_time = current_time.max(0.0);
        }
    }

    pub fn on_duration_change(&mut self, duration: f64) {
        if duration.is_finite() && duration >= 0.0 {
            self.media.duration = duration;
        }
    }

    pub fn on_volume_change(&mut self, volume: f64, muted: bool) {
        if volume.is_finite() {
            self.media.volume = volume.clamp(0.0, 1.0);
            if self.media.volume > 0.0 {
                self.last_volume = self.media.volume;
            }
        }
        self.media.muted = muted;
    }

    pub fn on_playing(&mut self, now: Duration) {
        self.media.paused = false;
        if self.visible {
            self.hide_at = Some(now + CONTROLS_HIDE_DELAY);
        }
    }

    /// Paused or ended: controls stay up until playback resumes.
    pub fn on_paused(&mut self) -> Vec<Effect> {
        self.media.paused = true;
        self.hide_at = None;
        if self.visible {
            Vec::new()
        } else {
            self.visible = true;
            vec![Effect::ControlsVisible(true)]
        }
    }

    /// A new source was loaded: position and duration start over, gestures in
    /// flight are dropped.
    pub fn reset_for_new_source(&mut self) -> Vec<Effect> {
        self.media.current_time = 0.0;
        self.media.duration = 0.0;
        self.pending_tap = None;
        if self.indicator.take().is_some() {
            vec![Effect::SeekIndicator(None)]
        } else {
            Vec::new()
        }
    }
}

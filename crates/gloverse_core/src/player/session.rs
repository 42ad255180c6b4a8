//! crates/gloverse_core/src/player/session.rs
//!
//! `PlaybackSession` ties the ad flow, the controls and the media mirror
//! together for one mounted player and one content id.

use std::time::Duration;

use rand::rngs::StdRng;
use uuid::Uuid;

use super::ad_flow::{ActiveAd, AdFlow, AdFlowState};
use super::controls::{Controls, MediaState, SeekDirection};
use super::effect::Effect;
use crate::domain::AdCampaign;
use crate::ports::PortResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    AdPhase,
    ContentPhase,
}

/// Everything that can happen to a session: client media events, viewer
/// interactions, and results of the collaborator calls the driver made.
#[derive(Debug)]
pub enum Input {
    InventoryLoaded {
        generation: u64,
        result: PortResult<Vec<AdCampaign>>,
    },
    TimeUpdate(f64),
    DurationChange(f64),
    VolumeChange { volume: f64, muted: bool },
    Playing,
    Paused,
    Ended,
    AutoplayRejected,
    FullscreenChanged(bool),
    Tap { x_fraction: f64 },
    PointerActivity,
    TogglePlay,
    Scrub(f64),
    SetVolume(f64),
    ToggleMute,
    Unmute,
    SkipAd,
    ToggleFullscreen,
}

impl Input {
    /// Viewer interactions show the controls and restart the hide timer.
    fn is_interaction(&self) -> bool {
        matches!(
            self,
            Input::Tap { .. }
                | Input::PointerActivity
                | Input::TogglePlay
                | Input::Scrub(_)
                | Input::SetVolume(_)
                | Input::ToggleMute
                | Input::Unmute
                | Input::SkipAd
                | Input::ToggleFullscreen
        )
    }
}

pub struct PlaybackSession {
    content_id: Uuid,
    generation: u64,
    ad_flow: AdFlow,
    controls: Controls,
    rng: StdRng,
    torn_down: bool,
}

impl PlaybackSession {
    pub fn new(
        content_id: Uuid,
        content_url: impl Into<String>,
        generation: u64,
        charge_cents: i64,
        rng: StdRng,
    ) -> Self {
        Self {
            content_id,
            generation,
            ad_flow: AdFlow::new(content_url, charge_cents, generation),
            controls: Controls::new(),
            rng,
            torn_down: false,
        }
    }

    pub fn content_id(&self) -> Uuid {
        self.content_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> PlaybackMode {
        self.ad_flow.mode()
    }

    pub fn ad_state(&self) -> AdFlowState {
        self.ad_flow.state()
    }

    pub fn active_ad(&self) -> Option<&ActiveAd> {
        self.ad_flow.active_ad()
    }

    pub fn billed(&self) -> bool {
        self.ad_flow.billed()
    }

    pub fn skip_visible(&self) -> bool {
        self.ad_flow.skip_eligible()
    }

    pub fn media(&self) -> &MediaState {
        self.controls.media()
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.visible()
    }

    pub fn unmute_prompt_visible(&self) -> bool {
        self.controls.unmute_prompt()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.controls.fullscreen()
    }

    pub fn seek_indicator(&self) -> Option<SeekDirection> {
        self.controls.seek_indicator()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Starts ad selection. The driver answers `FetchInventory` with
    /// `Input::InventoryLoaded` carrying the same generation.
    pub fn start(&mut self, now: Duration) -> Vec<Effect> {
        if self.torn_down || !self.ad_flow.begin_selection() {
            return Vec::new();
        }
        let mut effects = vec![
            Effect::ModeChanged(PlaybackMode::AdPhase),
            Effect::SkipAvailable(false),
            Effect::FetchInventory {
                generation: self.generation,
            },
        ];
        effects.extend(self.controls.register_activity(now));
        effects
    }

    pub fn handle(&mut self, input: Input, now: Duration) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }

        // Timers that expired before this input are settled first so the
        // input observes an up-to-date state.
        let mut effects = self.controls.tick(now);
        if input.is_interaction() {
            effects.extend(self.controls.register_activity(now));
        }

        let content_phase = self.mode() == PlaybackMode::ContentPhase;
        let muted = self.controls.media().muted;

        match input {
            Input::InventoryLoaded { generation, result } => {
                if generation != self.generation {
                    return effects;
                }
                let selected = self.ad_flow.select_ad(result, &mut self.rng, muted);
                effects.extend(self.after_source_change(selected));
            }
            Input::TimeUpdate(current_time) => {
                self.controls.on_time_update(current_time);
                effects.extend(self.ad_flow.on_ad_time_update(current_time));
            }
            Input::DurationChange(duration) => self.controls.on_duration_change(duration),
            Input::VolumeChange { volume, muted } => self.controls.on_volume_change(volume, muted),
            Input::Playing => self.controls.on_playing(now),
            Input::Paused => effects.extend(self.controls.on_paused()),
            Input::Ended => {
                effects.extend(self.controls.on_paused());
                let ended = self.ad_flow.on_ad_ended(muted);
                effects.extend(self.after_source_change(ended));
            }
            Input::AutoplayRejected => effects.extend(self.controls.on_autoplay_rejected()),
            Input::FullscreenChanged(active) => self.controls.on_fullscreen_changed(active),
            Input::Tap { x_fraction } => {
                effects.extend(self.controls.tap(now, x_fraction, content_phase));
            }
            Input::PointerActivity => {}
            Input::TogglePlay => {
                if content_phase {
                    effects.extend(self.controls.toggle_play());
                }
            }
            Input::Scrub(time) => effects.extend(self.controls.scrub(time, content_phase)),
            Input::SetVolume(volume) => effects.extend(self.controls.set_volume(volume)),
            Input::ToggleMute => effects.extend(self.controls.toggle_mute()),
            Input::Unmute => effects.extend(self.controls.unmute()),
            Input::SkipAd => {
                let skipped = self.ad_flow.skip_ad(muted);
                effects.extend(self.after_source_change(skipped));
            }
            Input::ToggleFullscreen => effects.extend(self.controls.toggle_fullscreen()),
        }

        effects
    }

    /// Fires any expired timers.
    pub fn tick(&mut self, now: Duration) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        self.controls.tick(now)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        if self.torn_down {
            return None;
        }
        self.controls.next_deadline()
    }

    /// Unmount. Every later input, including late collaborator results, is
    /// ignored and no timer remains pending.
    pub fn teardown(&mut self) {
        self.torn_down = true;
    }

    fn after_source_change(&mut self, transition: Vec<Effect>) -> Vec<Effect> {
        let loads_source = transition
            .iter()
            .any(|effect| matches!(effect, Effect::LoadSource { .. }));
        if !loads_source {
            return transition;
        }
        let mut effects = self.controls.reset_for_new_source();
        effects.extend(transition);
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CampaignStatus;
    use crate::player::effect::MediaKind;
    use crate::ports::PortError;
    use rand::SeedableRng;

    const GENERATION: u64 = 4;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn session() -> PlaybackSession {
        PlaybackSession::new(
            Uuid::new_v4(),
            "content.mp4",
            GENERATION,
            10,
            StdRng::seed_from_u64(11),
        )
    }

    fn campaign(url: &str) -> AdCampaign {
        AdCampaign {
            id: Uuid::new_v4(),
            media_url: url.to_string(),
            advertiser_id: Uuid::new_v4(),
            status: CampaignStatus::Active,
        }
    }

    fn bills(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Bill { .. }))
            .count()
    }

    /// A session that is showing an ad.
    fn in_ad() -> PlaybackSession {
        let mut session = session();
        session.start(ms(0));
        session.handle(
            Input::InventoryLoaded {
                generation: GENERATION,
                result: Ok(vec![campaign("ad.mp4")]),
            },
            ms(10),
        );
        session.handle(Input::Playing, ms(20));
        session.handle(Input::DurationChange(15.0), ms(20));
        session
    }

    /// A session that fell through to content and is playing it.
    fn in_content() -> PlaybackSession {
        let mut session = session();
        session.start(ms(0));
        session.handle(
            Input::InventoryLoaded {
                generation: GENERATION,
                result: Ok(vec![]),
            },
            ms(10),
        );
        session.handle(Input::DurationChange(300.0), ms(20));
        session.handle(Input::Playing, ms(20));
        session
    }

    #[test]
    fn start_requests_inventory_for_its_generation() {
        let mut session = session();
        let effects = session.start(ms(0));
        assert!(effects.contains(&Effect::FetchInventory {
            generation: GENERATION
        }));
        assert_eq!(session.ad_state(), AdFlowState::AdSelecting);
        assert!(session.start(ms(5)).is_empty());
    }

    #[test]
    fn skip_control_is_hidden_once_before_the_ad_loads() {
        let mut session = session();
        let mut effects = session.start(ms(0));
        effects.extend(session.handle(
            Input::InventoryLoaded {
                generation: GENERATION,
                result: Ok(vec![campaign("ad.mp4")]),
            },
            ms(10),
        ));
        let hides = effects
            .iter()
            .filter(|e| **e == Effect::SkipAvailable(false))
            .count();
        assert_eq!(hides, 1);
    }

    #[test]
    fn stale_inventory_result_is_discarded() {
        let mut session = session();
        session.start(ms(0));
        let effects = session.handle(
            Input::InventoryLoaded {
                generation: GENERATION - 1,
                result: Ok(vec![campaign("old.mp4")]),
            },
            ms(10),
        );
        assert!(effects.is_empty());
        assert_eq!(session.ad_state(), AdFlowState::AdSelecting);
    }

    #[test]
    fn inventory_failure_goes_straight_to_content() {
        let mut session = session();
        session.start(ms(0));
        let effects = session.handle(
            Input::InventoryLoaded {
                generation: GENERATION,
                result: Err(PortError::Unexpected("timeout".to_string())),
            },
            ms(10),
        );
        assert_eq!(session.mode(), PlaybackMode::ContentPhase);
        assert_eq!(bills(&effects), 0);
    }

    #[test]
    fn watched_ad_is_billed_once_and_becomes_skippable() {
        let mut session = in_ad();
        let mut total = 0;
        for (i, t) in [1.0, 3.0, 4.9, 5.2, 5.4, 6.0, 7.0].into_iter().enumerate() {
            let effects = session.handle(Input::TimeUpdate(t), ms(100 + i as u64 * 250));
            total += bills(&effects);
            assert_eq!(session.skip_visible(), t >= 5.0);
        }
        assert_eq!(total, 1);
        assert!(session.billed());
    }

    #[test]
    fn taps_and_seeks_are_ignored_during_ads() {
        let mut session = in_ad();
        session.handle(Input::TimeUpdate(3.0), ms(100));
        session.handle(Input::Tap { x_fraction: 0.9 }, ms(200));
        let effects = session.handle(Input::Tap { x_fraction: 0.9 }, ms(300));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Seek { .. })));

        let later = session.tick(ms(1_000));
        assert!(!later.contains(&Effect::Pause));

        assert!(session
            .handle(Input::Scrub(10.0), ms(1_100))
            .iter()
            .all(|e| !matches!(e, Effect::Seek { .. })));
        assert!(!session
            .handle(Input::TogglePlay, ms(1_200))
            .contains(&Effect::Pause));
        assert_eq!(session.media().current_time, 3.0);
    }

    #[test]
    fn gestures_stay_disabled_once_the_ad_is_skippable() {
        let mut session = in_ad();
        session.handle(Input::TimeUpdate(5.2), ms(100));
        assert_eq!(session.ad_state(), AdFlowState::AdSkippable);

        session.handle(Input::Tap { x_fraction: 0.1 }, ms(200));
        let effects = session.handle(Input::Tap { x_fraction: 0.1 }, ms(320));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Seek { .. })));
        assert_eq!(session.seek_indicator(), None);
        assert!(!session.tick(ms(1_000)).contains(&Effect::Pause));
        assert!(session
            .handle(Input::Scrub(1.0), ms(1_100))
            .iter()
            .all(|e| !matches!(e, Effect::Seek { .. })));
        assert_eq!(session.media().current_time, 5.2);
        assert_eq!(session.ad_state(), AdFlowState::AdSkippable);
    }

    #[test]
    fn skipping_swaps_to_content_at_time_zero() {
        let mut session = in_ad();
        session.handle(Input::TimeUpdate(5.2), ms(100));
        session.handle(Input::TimeUpdate(7.0), ms(200));
        let effects = session.handle(Input::SkipAd, ms(300));

        let loads: Vec<&Effect> = effects
            .iter()
            .filter(|e| matches!(e, Effect::LoadSource { .. }))
            .collect();
        assert_eq!(
            loads,
            vec![&Effect::LoadSource {
                url: "content.mp4".to_string(),
                kind: MediaKind::Content,
            }]
        );
        assert!(effects.contains(&Effect::Seek { time: 0.0 }));
        assert_eq!(session.mode(), PlaybackMode::ContentPhase);
        assert_eq!(session.media().current_time, 0.0);

        assert!(session.handle(Input::SkipAd, ms(400)).is_empty());
        assert_eq!(bills(&session.handle(Input::TimeUpdate(9.0), ms(500))), 0);
    }

    #[test]
    fn double_tap_seeks_in_content() {
        let mut session = in_content();
        session.handle(Input::TimeUpdate(100.0), ms(1_000));
        session.handle(Input::Tap { x_fraction: 0.1 }, ms(2_000));
        let effects = session.handle(Input::Tap { x_fraction: 0.1 }, ms(2_150));
        assert!(effects.contains(&Effect::Seek { time: 90.0 }));
        assert_eq!(session.seek_indicator(), Some(SeekDirection::Backward));
        assert_eq!(session.next_deadline(), Some(ms(2_650)));
    }

    #[test]
    fn single_tap_pauses_content() {
        let mut session = in_content();
        session.handle(Input::Tap { x_fraction: 0.5 }, ms(1_000));
        assert_eq!(session.next_deadline(), Some(ms(1_300)));
        assert!(session.tick(ms(1_300)).contains(&Effect::Pause));
    }

    #[test]
    fn autoplay_rejection_during_ad_plays_muted() {
        let mut session = in_ad();
        let effects = session.handle(Input::AutoplayRejected, ms(30));
        assert!(effects.contains(&Effect::Play { muted: true }));
        assert!(session.unmute_prompt_visible());

        session.handle(Input::TimeUpdate(5.0), ms(100));
        let effects = session.handle(Input::SkipAd, ms(200));
        assert!(effects.contains(&Effect::Play { muted: true }));
        assert!(session.unmute_prompt_visible());

        session.handle(Input::Unmute, ms(300));
        assert!(!session.unmute_prompt_visible());
    }

    #[test]
    fn teardown_ignores_late_results() {
        let mut session = session();
        session.start(ms(0));
        session.teardown();
        let effects = session.handle(
            Input::InventoryLoaded {
                generation: GENERATION,
                result: Ok(vec![campaign("ad.mp4")]),
            },
            ms(50),
        );
        assert!(effects.is_empty());
        assert_eq!(session.ad_state(), AdFlowState::AdSelecting);
        assert_eq!(session.next_deadline(), None);
    }
}

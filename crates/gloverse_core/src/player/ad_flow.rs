//! crates/gloverse_core/src/player/ad_flow.rs
//!
//! The pre-roll state machine:
//!
//! ```text
//! Idle -> AdSelecting -> AdPlaying -> AdSkippable -> ContentPlaying
//!             \__________________________________________/
//!                    (no eligible ad, or inventory failure)
//! ```
//!
//! `ContentPlaying` is terminal. Ordinary content playback after that point is
//! handled by the controls, not by this machine.

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use super::effect::{Effect, MediaKind};
use super::session::PlaybackMode;
use super::SKIP_THRESHOLD_SECS;
use crate::domain::AdCampaign;
use crate::ports::PortResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdFlowState {
    Idle,
    AdSelecting,
    AdPlaying,
    AdSkippable,
    ContentPlaying,
}

/// The campaign chosen for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAd {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub media_url: String,
}

#[derive(Debug)]
pub struct AdFlow {
    state: AdFlowState,
    active_ad: Option<ActiveAd>,
    billed: bool,
    skip_eligible: bool,
    content_url: String,
    charge_cents: i64,
    generation: u64,
}

impl AdFlow {
    pub fn new(content_url: impl Into<String>, charge_cents: i64, generation: u64) -> Self {
        Self {
            state: AdFlowState::Idle,
            active_ad: None,
            billed: false,
            skip_eligible: false,
            content_url: content_url.into(),
            charge_cents,
            generation,
        }
    }

    pub fn state(&self) -> AdFlowState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        match self.state {
            AdFlowState::ContentPlaying => PlaybackMode::ContentPhase,
            _ => PlaybackMode::AdPhase,
        }
    }

    pub fn is_ad_playing(&self) -> bool {
        matches!(self.state, AdFlowState::AdPlaying | AdFlowState::AdSkippable)
    }

    pub fn active_ad(&self) -> Option<&ActiveAd> {
        self.active_ad.as_ref()
    }

    pub fn billed(&self) -> bool {
        self.billed
    }

    pub fn skip_eligible(&self) -> bool {
        self.skip_eligible
    }

    pub fn content_url(&self) -> &str {
        &self.content_url
    }

    /// Idle -> AdSelecting. Returns `false` if selection already ran.
    pub fn begin_selection(&mut self) -> bool {
        if self.state != AdFlowState::Idle {
            return false;
        }
        self.state = AdFlowState::AdSelecting;
        true
    }

    /// Resolves ad selection with the inventory's answer.
    ///
    /// A failed query is handled exactly like an empty one: content starts and
    /// nothing is reported to the viewer. `muted` is the viewer's current mute
    /// state, used only when falling back to content.
    pub fn select_ad<R: Rng + ?Sized>(
        &mut self,
        inventory: PortResult<Vec<AdCampaign>>,
        rng: &mut R,
        muted: bool,
    ) -> Vec<Effect> {
        if self.state != AdFlowState::AdSelecting {
            return Vec::new();
        }

        let campaigns = inventory.unwrap_or_default();
        let eligible: Vec<&AdCampaign> = campaigns.iter().filter(|c| c.is_active()).collect();

        match eligible.choose(rng) {
            Some(campaign) => {
                let ad = ActiveAd {
                    campaign_id: campaign.id,
                    advertiser_id: campaign.advertiser_id,
                    media_url: campaign.media_url.clone(),
                };
                self.state = AdFlowState::AdPlaying;
                self.billed = false;
                self.skip_eligible = false;
                let effects = vec![
                    Effect::LoadSource {
                        url: ad.media_url.clone(),
                        kind: MediaKind::Ad,
                    },
                    Effect::Play { muted: false },
                ];
                self.active_ad = Some(ad);
                effects
            }
            None => self.enter_content(muted),
        }
    }

    /// Bills and unlocks skipping once the watched threshold is reached.
    /// Calling this repeatedly past the threshold never bills twice.
    pub fn on_ad_time_update(&mut self, current_time: f64) -> Vec<Effect> {
        if !self.is_ad_playing() || self.billed || current_time < SKIP_THRESHOLD_SECS {
            return Vec::new();
        }
        let Some(ad) = self.active_ad.as_ref() else {
            return Vec::new();
        };

        // The guard flips before the debit is dispatched so that a second
        // time update arriving while the charge is in flight sees it set.
        self.billed = true;
        self.skip_eligible = true;
        self.state = AdFlowState::AdSkippable;

        vec![
            Effect::Bill {
                generation: self.generation,
                advertiser_id: ad.advertiser_id,
                campaign_id: ad.campaign_id,
                amount_cents: self.charge_cents,
            },
            Effect::SkipAvailable(true),
        ]
    }

    /// Skips to content. Only honoured once the ad is skippable.
    pub fn skip_ad(&mut self, muted: bool) -> Vec<Effect> {
        if self.state != AdFlowState::AdSkippable {
            return Vec::new();
        }
        self.enter_content(muted)
    }

    /// The ad finished on its own.
    pub fn on_ad_ended(&mut self, muted: bool) -> Vec<Effect> {
        if !self.is_ad_playing() {
            return Vec::new();
        }
        self.enter_content(muted)
    }

    fn enter_content(&mut self, muted: bool) -> Vec<Effect> {
        self.state = AdFlowState::ContentPlaying;
        self.active_ad = None;
        let mut effects = Vec::new();
        // The skip control is hidden from session start until the threshold.
        if std::mem::take(&mut self.skip_eligible) {
            effects.push(Effect::SkipAvailable(false));
        }
        effects.extend([
            Effect::ModeChanged(PlaybackMode::ContentPhase),
            Effect::LoadSource {
                url: self.content_url.clone(),
                kind: MediaKind::Content,
            },
            Effect::Seek { time: 0.0 },
            Effect::Play { muted },
        ]);
        effects
    }
}

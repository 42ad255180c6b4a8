//! Drives `player_process` over its channels with in-memory collaborators.

use async_trait::async_trait;
use gloverse_api::web::{
    player_process,
    protocol::{ClientMessage, Mode, ServerMessage, SourceKind},
    state::PlayerServices,
};
use gloverse_core::{
    domain::{AdCampaign, CampaignStatus},
    ports::{AdInventoryService, BillingLedgerService, ContentResolver, PortError, PortResult},
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

//=========================================================================================
// In-memory collaborators
//=========================================================================================

/// Serves a fixed campaign list. Each queued gate holds back one call until it
/// is notified.
#[derive(Default)]
struct FakeInventory {
    campaigns: Vec<AdCampaign>,
    unavailable: bool,
    gates: Mutex<VecDeque<Arc<Notify>>>,
}

impl FakeInventory {
    fn with_campaigns(campaigns: Vec<AdCampaign>) -> Self {
        Self {
            campaigns,
            ..Default::default()
        }
    }

    fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().push_back(gate.clone());
        gate
    }
}

#[async_trait]
impl AdInventoryService for FakeInventory {
    async fn active_campaigns(&self) -> PortResult<Vec<AdCampaign>> {
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.unavailable {
            return Err(PortError::Unexpected("inventory offline".to_string()));
        }
        Ok(self.campaigns.clone())
    }
}

/// Records every charge; fails all of them when `declines` is set.
#[derive(Default)]
struct FakeLedger {
    charges: Mutex<Vec<(Uuid, Uuid, i64)>>,
    declines: bool,
}

impl FakeLedger {
    fn charges(&self) -> Vec<(Uuid, Uuid, i64)> {
        self.charges.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingLedgerService for FakeLedger {
    async fn charge_impression(
        &self,
        advertiser_id: Uuid,
        campaign_id: Uuid,
        amount_cents: i64,
    ) -> PortResult<i64> {
        self.charges
            .lock()
            .unwrap()
            .push((advertiser_id, campaign_id, amount_cents));
        if self.declines {
            return Err(PortError::Unexpected("ledger unavailable".to_string()));
        }
        Ok(1_000 - amount_cents)
    }
}

struct FakeCatalog {
    videos: HashMap<Uuid, String>,
}

/// A catalog whose lookups never finish.
struct StalledCatalog;

#[async_trait]
impl ContentResolver for StalledCatalog {
    async fn resolve_media_url(&self, _content_id: Uuid) -> PortResult<String> {
        std::future::pending().await
    }
}

#[async_trait]
impl ContentResolver for FakeCatalog {
    async fn resolve_media_url(&self, content_id: Uuid) -> PortResult<String> {
        self.videos
            .get(&content_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("video {}", content_id)))
    }
}

//=========================================================================================
// Harness
//=========================================================================================

struct Harness {
    inbound: mpsc::Sender<ClientMessage>,
    outbound: mpsc::Receiver<ServerMessage>,
    token: CancellationToken,
    handle: JoinHandle<()>,
    ledger: Arc<FakeLedger>,
}

impl Harness {
    fn start(
        inventory: Arc<FakeInventory>,
        ledger: Arc<FakeLedger>,
        videos: &[(Uuid, &str)],
    ) -> Self {
        let catalog = FakeCatalog {
            videos: videos
                .iter()
                .map(|(id, url)| (*id, url.to_string()))
                .collect(),
        };
        Self::spawn(inventory, ledger, Arc::new(catalog))
    }

    fn spawn(
        inventory: Arc<FakeInventory>,
        ledger: Arc<FakeLedger>,
        content: Arc<dyn ContentResolver>,
    ) -> Self {
        let services = PlayerServices {
            inventory,
            ledger: ledger.clone(),
            content,
            ad_charge_cents: 10,
        };
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let token = CancellationToken::new();
        let handle = tokio::spawn(player_process(
            services,
            inbound_rx,
            outbound_tx,
            token.clone(),
        ));
        Self {
            inbound: inbound_tx,
            outbound: outbound_rx,
            token,
            handle,
            ledger,
        }
    }

    async fn send(&self, message: ClientMessage) {
        self.inbound.send(message).await.unwrap();
    }

    async fn recv(&mut self) -> ServerMessage {
        timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a player message")
            .expect("player process closed its outbound channel")
    }

    /// Receives messages until one matches, returning everything received.
    async fn recv_until<F>(&mut self, matches: F) -> Vec<ServerMessage>
    where
        F: Fn(&ServerMessage) -> bool,
    {
        let mut received = Vec::new();
        loop {
            let message = self.recv().await;
            let done = matches(&message);
            received.push(message);
            if done {
                return received;
            }
        }
    }

    /// Receives up to the next `load_source` of `kind` and returns its number.
    async fn recv_load(&mut self, kind: SourceKind) -> u64 {
        let received = self.recv_until(is_load(kind)).await;
        match received.last() {
            Some(ServerMessage::LoadSource { source, .. }) => *source,
            other => panic!("expected a load_source, got {:?}", other),
        }
    }

    async fn assert_quiet(&mut self) {
        if let Ok(Some(message)) = timeout(QUIET_PERIOD, self.outbound.recv()).await {
            panic!("unexpected player message: {:?}", message);
        }
    }

    async fn wait_for_charges(&self, count: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.ledger.charges().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for the ledger");
    }

    async fn shutdown(self) {
        self.token.cancel();
        self.handle.await.unwrap();
    }
}

fn active_campaign(url: &str) -> AdCampaign {
    AdCampaign {
        id: Uuid::new_v4(),
        media_url: url.to_string(),
        advertiser_id: Uuid::new_v4(),
        status: CampaignStatus::Active,
    }
}

fn is_load(kind: SourceKind) -> impl Fn(&ServerMessage) -> bool {
    move |m| matches!(m, ServerMessage::LoadSource { kind: k, .. } if *k == kind)
}

fn time_update(source: u64, current_time: f64) -> ClientMessage {
    ClientMessage::TimeUpdate {
        source,
        current_time,
    }
}

//=========================================================================================
// Scenarios
//=========================================================================================

#[tokio::test]
async fn ad_is_billed_once_and_skip_leads_to_content() {
    let campaign = active_campaign("https://cdn.test/ad.mp4");
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![campaign.clone()]));
    let ledger = Arc::new(FakeLedger::default());
    let video = Uuid::new_v4();
    let mut harness = Harness::start(
        inventory,
        ledger.clone(),
        &[(video, "https://cdn.test/v.mp4")],
    );

    harness.send(ClientMessage::Mount { content_id: video }).await;
    let opening = harness.recv_until(is_load(SourceKind::Ad)).await;
    assert!(matches!(
        opening[0],
        ServerMessage::SessionStarted { content_id, generation: 1 } if content_id == video
    ));
    assert!(opening.contains(&ServerMessage::ModeChanged { mode: Mode::Ad }));
    assert_eq!(
        opening.last(),
        Some(&ServerMessage::LoadSource {
            source: 1,
            url: "https://cdn.test/ad.mp4".to_string(),
            kind: SourceKind::Ad,
        })
    );
    assert_eq!(harness.recv().await, ServerMessage::Play { muted: false });

    let ad = 1;
    harness
        .send(ClientMessage::DurationChange {
            source: ad,
            duration: 15.0,
        })
        .await;
    harness.send(ClientMessage::Playing { source: ad }).await;
    harness.send(time_update(ad, 4.9)).await;
    harness.send(ClientMessage::SkipAd).await;
    harness.send(time_update(ad, 5.0)).await;
    harness
        .recv_until(|m| *m == ServerMessage::SkipAvailable { visible: true })
        .await;
    for current_time in [6.0, 7.0, 8.0] {
        harness.send(time_update(ad, current_time)).await;
    }

    harness.send(ClientMessage::SkipAd).await;
    let switch = harness
        .recv_until(|m| matches!(m, ServerMessage::Play { .. }))
        .await;
    assert!(switch.contains(&ServerMessage::SkipAvailable { visible: false }));
    assert!(switch.contains(&ServerMessage::ModeChanged {
        mode: Mode::Content
    }));
    assert!(switch.contains(&ServerMessage::LoadSource {
        source: 2,
        url: "https://cdn.test/v.mp4".to_string(),
        kind: SourceKind::Content,
    }));
    assert!(switch.contains(&ServerMessage::Seek { time: 0.0 }));

    harness.wait_for_charges(1).await;
    harness.assert_quiet().await;
    assert_eq!(
        ledger.charges(),
        vec![(campaign.advertiser_id, campaign.id, 10)]
    );
    harness.shutdown().await;
}

#[tokio::test]
async fn empty_inventory_plays_content_without_billing() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![]));
    let ledger = Arc::new(FakeLedger::default());
    let video = Uuid::new_v4();
    let mut harness = Harness::start(inventory, ledger.clone(), &[(video, "v.mp4")]);

    harness.send(ClientMessage::Mount { content_id: video }).await;
    let messages = harness
        .recv_until(|m| matches!(m, ServerMessage::Play { .. }))
        .await;

    assert!(!messages.iter().any(is_load(SourceKind::Ad)));
    assert!(messages.contains(&ServerMessage::ModeChanged {
        mode: Mode::Content
    }));
    let hides = messages
        .iter()
        .filter(|m| **m == ServerMessage::SkipAvailable { visible: false })
        .count();
    assert_eq!(hides, 1);
    assert_eq!(messages.last(), Some(&ServerMessage::Play { muted: false }));
    assert!(ledger.charges().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn inventory_failure_falls_back_to_content_silently() {
    let inventory = Arc::new(FakeInventory::unavailable());
    let ledger = Arc::new(FakeLedger::default());
    let video = Uuid::new_v4();
    let mut harness = Harness::start(inventory, ledger.clone(), &[(video, "v.mp4")]);

    harness.send(ClientMessage::Mount { content_id: video }).await;
    let messages = harness.recv_until(is_load(SourceKind::Content)).await;

    assert!(!messages
        .iter()
        .any(|m| matches!(m, ServerMessage::Error { .. } | ServerMessage::Notice { .. })));
    assert!(ledger.charges().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn unmount_while_selecting_ignores_the_late_inventory() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![active_campaign(
        "ad.mp4",
    )]));
    let gate = inventory.hold_next_call();
    let ledger = Arc::new(FakeLedger::default());
    let video = Uuid::new_v4();
    let mut harness = Harness::start(inventory, ledger, &[(video, "v.mp4")]);

    harness.send(ClientMessage::Mount { content_id: video }).await;
    harness
        .recv_until(|m| *m == ServerMessage::SkipAvailable { visible: false })
        .await;

    harness.send(ClientMessage::Unmount).await;
    // A mount that fails proves the unmount was processed before the release.
    harness
        .send(ClientMessage::Mount {
            content_id: Uuid::new_v4(),
        })
        .await;
    harness
        .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
        .await;

    gate.notify_one();
    harness.assert_quiet().await;

    // Media events without a mounted player are ignored too.
    harness.send(time_update(1, 6.0)).await;
    harness.assert_quiet().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn remount_discards_inventory_of_the_previous_video() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![]));
    let first_gate = inventory.hold_next_call();
    let second_gate = inventory.hold_next_call();
    let ledger = Arc::new(FakeLedger::default());
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let mut harness = Harness::start(
        inventory,
        ledger,
        &[(first, "first.mp4"), (second, "second.mp4")],
    );

    harness.send(ClientMessage::Mount { content_id: first }).await;
    harness
        .recv_until(|m| matches!(m, ServerMessage::SessionStarted { .. }))
        .await;
    harness.send(ClientMessage::Mount { content_id: second }).await;
    harness
        .recv_until(|m| {
            *m == ServerMessage::SessionStarted {
                content_id: second,
                generation: 2,
            }
        })
        .await;
    let opening = harness
        .recv_until(|m| *m == ServerMessage::SkipAvailable { visible: false })
        .await;
    assert_eq!(
        opening,
        vec![
            ServerMessage::ModeChanged { mode: Mode::Ad },
            ServerMessage::SkipAvailable { visible: false },
        ]
    );

    first_gate.notify_one();
    harness.assert_quiet().await;

    second_gate.notify_one();
    let messages = harness.recv_until(is_load(SourceKind::Content)).await;
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::LoadSource { url, kind: SourceKind::Content, .. }) if url == "second.mp4"
    ));
    harness.shutdown().await;
}

#[tokio::test]
async fn media_events_from_the_previous_video_do_not_bill_the_next_ad() {
    let campaign = active_campaign("ad.mp4");
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![campaign.clone()]));
    let ledger = Arc::new(FakeLedger::default());
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let mut harness = Harness::start(
        inventory,
        ledger.clone(),
        &[(first, "first.mp4"), (second, "second.mp4")],
    );

    // The first video runs past its ad and well into the content.
    harness.send(ClientMessage::Mount { content_id: first }).await;
    let first_ad = harness.recv_load(SourceKind::Ad).await;
    harness.send(ClientMessage::Ended { source: first_ad }).await;
    let first_content = harness.recv_load(SourceKind::Content).await;
    harness
        .send(ClientMessage::Playing {
            source: first_content,
        })
        .await;
    harness.send(time_update(first_content, 42.0)).await;

    // The browser keeps reporting the old video until it loads the new ad.
    harness.send(ClientMessage::Mount { content_id: second }).await;
    let second_ad = harness.recv_load(SourceKind::Ad).await;
    assert_ne!(second_ad, first_content);
    assert_eq!(harness.recv().await, ServerMessage::Play { muted: false });
    harness.send(time_update(first_content, 42.25)).await;
    harness
        .send(ClientMessage::Ended {
            source: first_content,
        })
        .await;
    harness.assert_quiet().await;
    assert!(ledger.charges().is_empty());

    // The new ad bills only on its own progress.
    harness.send(time_update(second_ad, 5.1)).await;
    harness
        .recv_until(|m| *m == ServerMessage::SkipAvailable { visible: true })
        .await;
    harness.wait_for_charges(1).await;
    assert_eq!(ledger.charges().len(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn declined_charge_surfaces_a_notice_and_playback_continues() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![active_campaign(
        "ad.mp4",
    )]));
    let ledger = Arc::new(FakeLedger {
        declines: true,
        ..Default::default()
    });
    let video = Uuid::new_v4();
    let mut harness = Harness::start(inventory, ledger.clone(), &[(video, "v.mp4")]);

    harness.send(ClientMessage::Mount { content_id: video }).await;
    let ad = harness.recv_load(SourceKind::Ad).await;
    harness.send(time_update(ad, 5.5)).await;

    let messages = harness
        .recv_until(|m| matches!(m, ServerMessage::Notice { .. }))
        .await;
    assert!(messages.contains(&ServerMessage::SkipAvailable { visible: true }));
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::Notice { id: 1, .. })
    ));
    assert_eq!(ledger.charges().len(), 1);

    harness.send(ClientMessage::SkipAd).await;
    harness.recv_until(is_load(SourceKind::Content)).await;
    harness.shutdown().await;
}

#[tokio::test]
async fn muted_autoplay_carries_over_from_ad_to_content() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![active_campaign(
        "ad.mp4",
    )]));
    let ledger = Arc::new(FakeLedger::default());
    let video = Uuid::new_v4();
    let mut harness = Harness::start(inventory, ledger, &[(video, "v.mp4")]);

    harness.send(ClientMessage::Mount { content_id: video }).await;
    let ad = harness.recv_load(SourceKind::Ad).await;
    assert_eq!(harness.recv().await, ServerMessage::Play { muted: false });

    harness
        .send(ClientMessage::AutoplayRejected { source: ad })
        .await;
    assert_eq!(harness.recv().await, ServerMessage::Play { muted: true });
    assert_eq!(
        harness.recv().await,
        ServerMessage::UnmutePrompt { visible: true }
    );

    harness.send(ClientMessage::Ended { source: ad }).await;
    let messages = harness
        .recv_until(|m| matches!(m, ServerMessage::Play { .. }))
        .await;
    assert!(messages.contains(&ServerMessage::ModeChanged {
        mode: Mode::Content
    }));
    assert_eq!(messages.last(), Some(&ServerMessage::Play { muted: true }));
    harness.shutdown().await;
}

#[tokio::test]
async fn unknown_video_reports_an_error() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![]));
    let ledger = Arc::new(FakeLedger::default());
    let mut harness = Harness::start(inventory, ledger, &[]);

    harness
        .send(ClientMessage::Mount {
            content_id: Uuid::new_v4(),
        })
        .await;
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            message: "This video is unavailable.".to_string(),
        }
    );
    harness.assert_quiet().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_mount() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![]));
    let ledger = Arc::new(FakeLedger::default());
    let mut harness = Harness::spawn(inventory, ledger, Arc::new(StalledCatalog));

    harness
        .send(ClientMessage::Mount {
            content_id: Uuid::new_v4(),
        })
        .await;
    harness.assert_quiet().await;

    let Harness { token, handle, .. } = harness;
    token.cancel();
    timeout(RECV_TIMEOUT, handle)
        .await
        .expect("player process kept waiting on the catalog")
        .unwrap();
}

#[tokio::test]
async fn closing_the_inbound_channel_ends_the_process() {
    let inventory = Arc::new(FakeInventory::with_campaigns(vec![]));
    let ledger = Arc::new(FakeLedger::default());
    let harness = Harness::start(inventory, ledger, &[]);

    let Harness { inbound, handle, .. } = harness;
    drop(inbound);
    timeout(RECV_TIMEOUT, handle)
        .await
        .expect("player process kept running")
        .unwrap();
}

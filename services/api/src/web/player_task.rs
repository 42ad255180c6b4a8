//! services/api/src/web/player_task.rs
//!
//! This module contains the asynchronous "worker" that drives the player for
//! one connection.
//!
//! The task owns the `PlaybackSession` exclusively. It feeds the session with
//! client messages, with results of the collaborator calls it spawned, and with
//! timer expiries, then executes the effects the session returns. Collaborator
//! calls never block the loop: their results re-enter it through a channel,
//! tagged with the generation of the session that asked for them.
//!
//! Every `load_source` sent to the client is numbered. Media element events
//! echo that number, and events for any source other than the current one are
//! dropped before they reach the session.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::PlayerServices,
};
use gloverse_core::{
    domain::AdCampaign,
    player::{Effect, Input, PlaybackSession},
    ports::PortResult,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Results of work the driver spawned on behalf of a session.
#[derive(Debug)]
enum TaskEvent {
    Inventory {
        generation: u64,
        result: PortResult<Vec<AdCampaign>>,
    },
    Billing {
        generation: u64,
        advertiser_id: Uuid,
        result: PortResult<i64>,
    },
}

type Outbound = mpsc::Sender<ServerMessage>;

/// The main asynchronous task for one player connection.
///
/// Runs until the inbound channel closes, the client stops accepting
/// messages, or `cancellation_token` is cancelled. Whatever session is mounted
/// at that point is torn down; results still in flight are dropped.
pub async fn player_process(
    services: PlayerServices,
    mut inbound: mpsc::Receiver<ClientMessage>,
    outbound: Outbound,
    cancellation_token: CancellationToken,
) {
    info!("Player process started.");

    let (task_tx, mut task_rx) = mpsc::unbounded_channel();
    let mut driver = PlayerDriver {
        services,
        outbound,
        task_tx,
        cancellation_token: cancellation_token.clone(),
        session: None,
        generation: 0,
        source_seq: 0,
        current_source: None,
        notice_seq: 0,
        clock: Instant::now(),
    };

    loop {
        let deadline = driver.next_deadline();

        let outcome = tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Player process cancelled.");
                break;
            }
            message = inbound.recv() => match message {
                Some(message) => driver.on_client_message(message).await,
                None => {
                    info!("Player inbound channel closed.");
                    break;
                }
            },
            Some(event) = task_rx.recv() => driver.on_task_event(event).await,
            _ = sleep_until(deadline.unwrap_or(driver.clock)), if deadline.is_some() => {
                driver.on_deadline().await
            }
        };

        if outcome.is_err() {
            warn!("Client stopped accepting player messages. Ending player process.");
            break;
        }
    }

    driver.unmount();
    info!("Player process finished.");
}

struct PlayerDriver {
    services: PlayerServices,
    outbound: Outbound,
    task_tx: mpsc::UnboundedSender<TaskEvent>,
    cancellation_token: CancellationToken,
    session: Option<PlaybackSession>,
    generation: u64,
    /// Number of the last `load_source` sent on this connection.
    source_seq: u64,
    current_source: Option<u64>,
    notice_seq: u64,
    clock: Instant,
}

impl PlayerDriver {
    fn now(&self) -> std::time::Duration {
        self.clock.elapsed()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.session
            .as_ref()
            .and_then(|session| session.next_deadline())
            .map(|offset| self.clock + offset)
    }

    async fn on_client_message(
        &mut self,
        message: ClientMessage,
    ) -> Result<(), SendError<ServerMessage>> {
        match message {
            ClientMessage::Mount { content_id } => self.mount(content_id).await,
            ClientMessage::Unmount => {
                self.unmount();
                Ok(())
            }
            ClientMessage::FullscreenError { message } => {
                warn!("Client rejected a fullscreen change: {}", message);
                Ok(())
            }
            other => {
                if let Some(source) = other.source() {
                    if self.current_source != Some(source) {
                        debug!("Dropping {:?}: source {} is no longer playing.", other, source);
                        return Ok(());
                    }
                }
                let now = self.now();
                let Some(session) = self.session.as_mut() else {
                    debug!("Ignoring {:?}: no player is mounted.", other);
                    return Ok(());
                };
                let effects = match other.into_input() {
                    Some(input) => session.handle(input, now),
                    None => Vec::new(),
                };
                self.apply(effects).await
            }
        }
    }

    async fn mount(&mut self, content_id: Uuid) -> Result<(), SendError<ServerMessage>> {
        self.unmount();
        info!("Mounting player for content {}", content_id);

        let resolved = tokio::select! {
            _ = self.cancellation_token.cancelled() => {
                info!("Mount of content {} abandoned: connection closing.", content_id);
                return Ok(());
            }
            resolved = self.services.content.resolve_media_url(content_id) => resolved,
        };
        let content_url = match resolved {
            Ok(url) => url,
            Err(e) => {
                error!("Failed to resolve media for content {}: {:?}", content_id, e);
                return self
                    .outbound
                    .send(ServerMessage::Error {
                        message: "This video is unavailable.".to_string(),
                    })
                    .await;
            }
        };

        self.generation += 1;
        let mut session = PlaybackSession::new(
            content_id,
            content_url,
            self.generation,
            self.services.ad_charge_cents,
            StdRng::from_entropy(),
        );
        let effects = session.start(self.now());
        self.session = Some(session);

        self.outbound
            .send(ServerMessage::SessionStarted {
                content_id,
                generation: self.generation,
            })
            .await?;
        self.apply(effects).await
    }

    fn unmount(&mut self) {
        self.current_source = None;
        if let Some(mut session) = self.session.take() {
            session.teardown();
            info!(
                "Player for content {} unmounted (generation {}).",
                session.content_id(),
                session.generation()
            );
        }
    }

    async fn on_task_event(&mut self, event: TaskEvent) -> Result<(), SendError<ServerMessage>> {
        match event {
            TaskEvent::Inventory { generation, result } => {
                let now = self.now();
                let Some(session) = self.session.as_mut() else {
                    debug!("Dropping ad inventory for unmounted generation {}.", generation);
                    return Ok(());
                };
                let effects = session.handle(Input::InventoryLoaded { generation, result }, now);
                self.apply(effects).await
            }
            TaskEvent::Billing {
                generation,
                advertiser_id,
                result,
            } => match result {
                Ok(balance) => {
                    info!(
                        "Billed advertiser {} for an impression. Remaining balance: {} cents.",
                        advertiser_id, balance
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to bill advertiser {}: {:?}", advertiser_id, e);
                    if self.current_generation() != Some(generation) {
                        return Ok(());
                    }
                    self.notice_seq += 1;
                    self.outbound
                        .send(ServerMessage::Notice {
                            id: self.notice_seq,
                            message: "We couldn't record this ad view. Playback will continue."
                                .to_string(),
                        })
                        .await
                }
            },
        }
    }

    async fn on_deadline(&mut self) -> Result<(), SendError<ServerMessage>> {
        let now = self.now();
        let effects = match self.session.as_mut() {
            Some(session) => session.tick(now),
            None => Vec::new(),
        };
        self.apply(effects).await
    }

    fn current_generation(&self) -> Option<u64> {
        self.session.as_ref().map(|session| session.generation())
    }

    /// Executes session effects in order: driver requests are spawned, client
    /// commands are sent.
    async fn apply(&mut self, effects: Vec<Effect>) -> Result<(), SendError<ServerMessage>> {
        for effect in effects {
            match effect {
                Effect::FetchInventory { generation } => self.spawn_inventory_fetch(generation),
                Effect::Bill {
                    generation,
                    advertiser_id,
                    campaign_id,
                    amount_cents,
                } => self.spawn_billing(generation, advertiser_id, campaign_id, amount_cents),
                Effect::LoadSource { url, kind } => {
                    self.source_seq += 1;
                    self.current_source = Some(self.source_seq);
                    self.outbound
                        .send(ServerMessage::load_source(self.source_seq, &url, kind))
                        .await?;
                }
                other => {
                    if let Some(message) = ServerMessage::from_effect(&other) {
                        self.outbound.send(message).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn_inventory_fetch(&self, generation: u64) {
        let inventory = self.services.inventory.clone();
        let task_tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = inventory.active_campaigns().await;
            if let Err(e) = &result {
                // Treated as "no ads"; the viewer never sees this.
                warn!("Ad inventory unavailable, playing content directly: {:?}", e);
            }
            // The receiver is gone once the player process has ended.
            let _ = task_tx.send(TaskEvent::Inventory { generation, result });
        });
    }

    fn spawn_billing(
        &self,
        generation: u64,
        advertiser_id: Uuid,
        campaign_id: Uuid,
        amount_cents: i64,
    ) {
        let ledger = self.services.ledger.clone();
        let task_tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = ledger
                .charge_impression(advertiser_id, campaign_id, amount_cents)
                .await;
            if task_tx
                .send(TaskEvent::Billing {
                    generation,
                    advertiser_id,
                    result,
                })
                .is_err()
            {
                debug!("Billing finished after the player process ended.");
            }
        });
    }
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the collaborator set handed to
//! each player connection.

use crate::config::Config;
use gloverse_core::ports::{
    AdInventoryService, BillingLedgerService, ContentResolver, DatabaseService,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub player: PlayerServices,
}

//=========================================================================================
// PlayerServices (Cloned Into Every Player Connection)
//=========================================================================================

/// The collaborators a player session depends on. Each connection gets its own
/// clone; nothing here holds per-session state.
#[derive(Clone)]
pub struct PlayerServices {
    pub inventory: Arc<dyn AdInventoryService>,
    pub ledger: Arc<dyn BillingLedgerService>,
    pub content: Arc<dyn ContentResolver>,
    /// Debit per billed impression, in cents.
    pub ad_charge_cents: i64,
}

//! services/api/src/lib.rs
//!
//! The GloVerse API service: Postgres adapters, configuration, and the axum
//! surface that hosts player sessions over WebSockets.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Study Hub: a gated, shared assignment tracker.
//!
//! A small group of users signs in with Google, enters a shared access
//! password, and then sees one live, shared list of homework assignments
//! stored in Firestore.

pub mod app;
pub mod config;
pub mod db;
pub mod editor;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod sync;
pub mod time_utils;

use app::StudyHub;
use config::Config;
use tokio::sync::Mutex;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub hub: std::sync::Arc<Mutex<StudyHub>>,
}

//! PrinTera Lead Intake API
//!
//! Backend for the printer-rental landing page. A single business endpoint
//! accepts a contact-form submission, validates it, screens out bots,
//! notifies the sales inbox by email and appends the lead to a
//! spreadsheet-backed log.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use services::{bot_check::BotVerifier, ledger::Ledger, notifier::Notifier};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub bot_verifier: Arc<dyn BotVerifier>,
    pub notifier: Arc<dyn Notifier>,
    pub ledger: Arc<dyn Ledger>,
}

/// Builds the application router: banner, liveness probe and the
/// contact-form intake endpoint.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "printera-api up" }))
        .route("/health", get(handlers::health::liveness_check))
        .route("/api/contact", post(handlers::leads::submit_contact))
        .with_state(state)
}

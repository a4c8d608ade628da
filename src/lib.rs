//! Pustaka Library Lending Server
//!
//! A REST JSON API around the loan ledger: borrow requests, admin approval,
//! rejection and returns, with book availability and late fines kept
//! consistent in Postgres.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

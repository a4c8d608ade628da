//! Business logic services

pub mod loans;

use std::sync::Arc;

use crate::{config::LoansConfig, repository::{LedgerStore, Repository}};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, loans_config: &LoansConfig) -> Self {
        Self::with_store(Arc::new(repository), loans_config)
    }

    /// Create all services over any ledger store
    pub fn with_store(store: Arc<dyn LedgerStore>, loans_config: &LoansConfig) -> Self {
        Self {
            loans: loans::LoansService::new(store, loans_config),
        }
    }
}

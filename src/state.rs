// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::events::HandlerRegistry;
use crate::storage::{LedgerDb, LedgerDbResult, LEDGER_DB_FILE};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerDb>,
    pub registry: Arc<HandlerRegistry>,
    /// Relief contract app ID watched by the indexer (`0` when disabled).
    pub app_id: u64,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerDb>, registry: Arc<HandlerRegistry>, app_id: u64) -> Self {
        Self {
            ledger,
            registry,
            app_id,
            started_at: Utc::now(),
        }
    }

    /// Open (or create) the ledger under `data_dir` with the default handlers.
    pub fn open(data_dir: &Path, app_id: u64) -> LedgerDbResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let ledger = LedgerDb::open(&data_dir.join(LEDGER_DB_FILE))?;
        Ok(Self::new(
            Arc::new(ledger),
            Arc::new(HandlerRegistry::with_default_handlers()),
            app_id,
        ))
    }

    pub fn indexer_enabled(&self) -> bool {
        self.app_id > 0
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Round Indexer
//!
//! Background task that follows the Algorand chain round by round and applies
//! relief contract events to the ledger.
//!
//! ## Strategy
//!
//! Every `poll_interval` the indexer:
//! 1. Loads the [`Cursor`] from the ledger (seeding it `lookback_rounds` behind
//!    the head on first start).
//! 2. Fetches each round in `(cursor, head]` in order and scans application
//!    calls to the configured app for log lines.
//! 3. Decodes and dispatches each log line through the [`HandlerRegistry`].
//! 4. Persists the cursor once the cycle has finished.
//!
//! ## Failures
//!
//! A bad event (unknown wallet, malformed log, overdraw) is logged and skipped;
//! the rest of the round still applies. A round that cannot be fetched or
//! committed ends the cycle without moving the cursor, so it is retried on
//! the next tick. After `max_round_retries` consecutive failures the round is
//! written to `skipped_rounds` and passed over.
//!
//! Replaying a round is harmless: already-applied events are recognized by
//! their idempotency key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::algorand::{ChainError, ChainSource};
use crate::events::{
    decode_log, ChainEvent, DispatchOutcome, EventContext, HandlerRegistry, ReconcileError,
};
use crate::storage::{LedgerDb, LedgerDbError, SkippedRound};

mod cursor;

pub use cursor::Cursor;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How far behind the head to start when no cursor is stored.
pub const DEFAULT_LOOKBACK_ROUNDS: u64 = 100;

/// Consecutive failures before a round is skipped.
pub const DEFAULT_MAX_ROUND_RETRIES: u32 = 5;

/// Indexer settings.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Relief contract application ID.
    pub app_id: u64,
    pub poll_interval: Duration,
    pub lookback_rounds: u64,
    pub max_round_retries: u32,
}

impl IndexerConfig {
    pub fn new(app_id: u64) -> Self {
        Self {
            app_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lookback_rounds: DEFAULT_LOOKBACK_ROUNDS,
            max_round_retries: DEFAULT_MAX_ROUND_RETRIES,
        }
    }
}

/// Counts for one round or one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Node head observed at the start of the cycle.
    pub head: u64,
    /// Cursor after the cycle.
    pub cursor: u64,
    pub rounds_processed: u64,
    pub applied: u64,
    pub duplicates: u64,
    /// Events skipped because they could not be applied.
    pub rejected: u64,
    /// Log lines with tags this service does not handle.
    pub ignored: u64,
    /// Rounds given up on during this cycle.
    pub skipped_rounds: Vec<u64>,
    /// Round that stopped the cycle, if any.
    pub failed_round: Option<u64>,
}

impl CycleReport {
    fn absorb(&mut self, round: RoundStats) {
        self.rounds_processed += 1;
        self.applied += round.applied;
        self.duplicates += round.duplicates;
        self.rejected += round.rejected;
        self.ignored += round.ignored;
    }
}

#[derive(Debug, Default)]
struct RoundStats {
    applied: u64,
    duplicates: u64,
    rejected: u64,
    ignored: u64,
}

/// Algorand round indexer that runs as a background tokio task.
pub struct RoundIndexer<S> {
    source: S,
    ledger: Arc<LedgerDb>,
    registry: Arc<HandlerRegistry>,
    config: IndexerConfig,
    /// Consecutive failure count per round. Cleared once a round succeeds.
    failures: HashMap<u64, u32>,
}

impl<S: ChainSource> RoundIndexer<S> {
    pub fn new(
        source: S,
        ledger: Arc<LedgerDb>,
        registry: Arc<HandlerRegistry>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            source,
            ledger,
            registry,
            config,
            failures: HashMap::new(),
        }
    }

    /// Run the indexer loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(indexer.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            app_id = self.config.app_id,
            interval_secs = self.config.poll_interval.as_secs(),
            "Round indexer starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Round indexer shutting down");
                return;
            }

            match self.poll_once().await {
                Ok(report) if report.rounds_processed > 0 || report.failed_round.is_some() => {
                    tracing::info!(
                        head = report.head,
                        cursor = report.cursor,
                        rounds = report.rounds_processed,
                        applied = report.applied,
                        duplicates = report.duplicates,
                        rejected = report.rejected,
                        failed_round = ?report.failed_round,
                        "Indexer cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Indexer cycle failed, will retry");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Round indexer shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one cycle: process every round from the cursor to the head.
    ///
    /// A freshly seeded cursor is stored immediately. After that the cursor
    /// is written back only once the cycle finishes without a round failure.
    /// Rounds that exhaust their retries count as finished.
    pub async fn poll_once(&mut self) -> Result<CycleReport, IndexerError> {
        let head = self.source.current_round().await?;
        let stored = self.ledger.last_processed_round()?;
        let mut cursor = Cursor::resume(stored, head, self.config.lookback_rounds);

        if stored.is_none() {
            tracing::info!(
                head,
                start = cursor.next_round(),
                "No stored cursor, starting behind chain head"
            );
            // A later head must not move the start point if this cycle fails.
            self.ledger.set_last_processed_round(cursor.last_processed())?;
        }
        let stored = Some(cursor.last_processed());

        let mut report = CycleReport {
            head,
            cursor: cursor.last_processed(),
            ..CycleReport::default()
        };

        while cursor.is_behind(head) {
            let round = cursor.next_round();
            match self.process_round(round).await {
                Ok(stats) => {
                    self.failures.remove(&round);
                    report.absorb(stats);
                    cursor.advance_to(round);
                }
                Err(e) => {
                    let attempts = self.failures.entry(round).or_insert(0);
                    *attempts += 1;

                    if *attempts < self.config.max_round_retries {
                        tracing::warn!(
                            round,
                            attempt = *attempts,
                            error = %e,
                            "Round failed, will retry next cycle"
                        );
                        report.failed_round = Some(round);
                        break;
                    }

                    tracing::error!(
                        round,
                        attempts = *attempts,
                        error = %e,
                        "Round failed too many times, skipping"
                    );
                    self.ledger.record_skipped_round(&SkippedRound {
                        round,
                        attempts: *attempts,
                        last_error: e.to_string(),
                        skipped_at: Utc::now(),
                    })?;
                    self.failures.remove(&round);
                    report.skipped_rounds.push(round);
                    cursor.advance_to(round);
                }
            }
        }

        if report.failed_round.is_none() && stored != Some(cursor.last_processed()) {
            self.ledger.set_last_processed_round(cursor.last_processed())?;
            report.cursor = cursor.last_processed();
        }

        Ok(report)
    }

    /// Fetch one round and apply every relief contract event in it.
    async fn process_round(&self, round: u64) -> Result<RoundStats, IndexerError> {
        let block = self.source.block(round).await?;
        let mut stats = RoundStats::default();

        for tx in block
            .transactions
            .iter()
            .filter(|tx| tx.is_app_call_to(self.config.app_id))
        {
            for (index, line) in tx.logs.iter().enumerate() {
                let ctx = EventContext::new(tx.tx_id.clone())
                    .with_sender(tx.sender.clone())
                    .at(round, index as u32);

                let event = match decode_log(line) {
                    Ok(ChainEvent::Unrecognized { tag, .. }) => {
                        tracing::debug!(round, tx_id = %tx.tx_id, tag = %tag, "Ignoring unrecognized log");
                        stats.ignored += 1;
                        continue;
                    }
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(round, tx_id = %tx.tx_id, log_index = index, error = %e, "Malformed contract log");
                        stats.rejected += 1;
                        continue;
                    }
                };

                match self.registry.dispatch(&self.ledger, &event, &ctx) {
                    Ok(DispatchOutcome::Applied { .. }) => {
                        tracing::info!(round, tx_id = %tx.tx_id, event = %event.tag(), "Applied contract event");
                        stats.applied += 1;
                    }
                    Ok(DispatchOutcome::Duplicate) => stats.duplicates += 1,
                    Err(e) if e.is_transient() => return Err(e.into()),
                    Err(e) => {
                        tracing::warn!(
                            round,
                            tx_id = %tx.tx_id,
                            event = %event.tag(),
                            error = %e,
                            "Skipping contract event"
                        );
                        stats.rejected += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Database error: {0}")]
    Db(#[from] LedgerDbError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::future::Future;
    use std::sync::Mutex;

    use crate::algorand::{BlockTransaction, ChainBlock, APP_CALL_TX_TYPE};
    use crate::storage::{UserRecord, UserRole, VIRTUAL_TOKEN};

    const APP_ID: u64 = 4242;
    const ALICE: &str = "ALICEALICEALICEALICEALICEALICEALICEALICEALICEALICEALICE";

    #[derive(Default)]
    struct FakeState {
        head: u64,
        blocks: HashMap<u64, ChainBlock>,
        failing: HashSet<u64>,
        fetched: Vec<u64>,
    }

    /// In-memory chain; rounds without a stored block are empty.
    #[derive(Clone, Default)]
    struct FakeChain(Arc<Mutex<FakeState>>);

    impl FakeChain {
        fn at_head(head: u64) -> Self {
            let chain = Self::default();
            chain.0.lock().unwrap().head = head;
            chain
        }

        fn set_head(&self, head: u64) {
            self.0.lock().unwrap().head = head;
        }

        fn put_logs(&self, round: u64, tx_id: &str, app_id: u64, logs: &[&str]) {
            let tx = BlockTransaction {
                tx_id: tx_id.to_string(),
                tx_type: APP_CALL_TX_TYPE.to_string(),
                app_id: Some(app_id),
                sender: ALICE.to_string(),
                logs: logs.iter().map(|l| l.as_bytes().to_vec()).collect(),
            };
            let mut state = self.0.lock().unwrap();
            state
                .blocks
                .entry(round)
                .or_insert_with(|| ChainBlock {
                    round,
                    transactions: vec![],
                })
                .transactions
                .push(tx);
        }

        fn fail_round(&self, round: u64, failing: bool) {
            let mut state = self.0.lock().unwrap();
            if failing {
                state.failing.insert(round);
            } else {
                state.failing.remove(&round);
            }
        }

        fn fetched(&self) -> Vec<u64> {
            self.0.lock().unwrap().fetched.clone()
        }
    }

    impl ChainSource for FakeChain {
        fn current_round(&self) -> impl Future<Output = Result<u64, ChainError>> + Send {
            let head = self.0.lock().unwrap().head;
            async move { Ok(head) }
        }

        fn block(&self, round: u64) -> impl Future<Output = Result<ChainBlock, ChainError>> + Send {
            let mut state = self.0.lock().unwrap();
            state.fetched.push(round);
            let result = if state.failing.contains(&round) {
                Err(ChainError::Http("node unavailable".into()))
            } else {
                Ok(state.blocks.get(&round).cloned().unwrap_or(ChainBlock {
                    round,
                    transactions: vec![],
                }))
            };
            async move { result }
        }
    }

    fn setup(chain: &FakeChain) -> (RoundIndexer<FakeChain>, Arc<LedgerDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let mut config = IndexerConfig::new(APP_ID);
        config.max_round_retries = 3;
        let indexer = RoundIndexer::new(
            chain.clone(),
            ledger.clone(),
            Arc::new(HandlerRegistry::with_default_handlers()),
            config,
        );
        (indexer, ledger, dir)
    }

    fn register_alice(ledger: &LedgerDb) -> UserRecord {
        let user = UserRecord::new(ALICE.into(), UserRole::User);
        ledger.write(|w| w.insert_user(&user)).unwrap();
        user
    }

    #[tokio::test]
    async fn first_cycle_seeds_cursor_behind_head() {
        let chain = FakeChain::at_head(1_000);
        let (mut indexer, ledger, _dir) = setup(&chain);

        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.rounds_processed, 100);
        assert_eq!(chain.fetched().first(), Some(&901));
        assert_eq!(ledger.last_processed_round().unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn seed_survives_a_failed_first_cycle() {
        let chain = FakeChain::at_head(1_000);
        let (mut indexer, ledger, _dir) = setup(&chain);
        let alice = register_alice(&ledger);
        chain.put_logs(901, "TX1", APP_ID, &[&format!("FIAT_DEPOSIT:{ALICE}:5000000:pi_1:0")]);
        chain.fail_round(901, true);

        let report = indexer.poll_once().await.unwrap();
        assert_eq!(report.failed_round, Some(901));
        assert_eq!(ledger.last_processed_round().unwrap(), Some(900));

        chain.fail_round(901, false);
        chain.set_head(1_005);
        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.failed_round, None);
        assert_eq!(report.applied, 1);
        assert_eq!(chain.fetched().iter().filter(|r| **r == 901).count(), 2);
        assert_eq!(ledger.balance(&alice.id, VIRTUAL_TOKEN).unwrap(), 5_000_000);
        assert_eq!(ledger.last_processed_round().unwrap(), Some(1_005));
        assert!(ledger.skipped_rounds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_rounds_advance_cursor_without_events() {
        let chain = FakeChain::at_head(10);
        let (mut indexer, ledger, _dir) = setup(&chain);
        ledger.set_last_processed_round(8).unwrap();

        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.rounds_processed, 2);
        assert_eq!(report.applied, 0);
        assert_eq!(ledger.last_processed_round().unwrap(), Some(10));
        assert!(ledger.recent_events(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn caught_up_cycle_fetches_nothing() {
        let chain = FakeChain::at_head(10);
        let (mut indexer, ledger, _dir) = setup(&chain);
        ledger.set_last_processed_round(10).unwrap();

        let report = indexer.poll_once().await.unwrap();
        assert_eq!(report.rounds_processed, 0);
        assert!(chain.fetched().is_empty());
    }

    #[tokio::test]
    async fn applies_only_logs_from_configured_app() {
        let chain = FakeChain::at_head(11);
        let (mut indexer, ledger, _dir) = setup(&chain);
        let alice = register_alice(&ledger);
        ledger.set_last_processed_round(10).unwrap();

        chain.put_logs(11, "TX1", APP_ID, &[&format!("FIAT_DEPOSIT:{ALICE}:5000000:pi_1:0")]);
        chain.put_logs(11, "TX2", APP_ID + 1, &[&format!("FIAT_DEPOSIT:{ALICE}:7000000:pi_2:0")]);

        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(ledger.balance(&alice.id, VIRTUAL_TOKEN).unwrap(), 5_000_000);
        let events = ledger.recent_events(10).unwrap();
        assert_eq!(events[0].algorand_round, Some(11));
        assert_eq!(events[0].data["algorandSender"], ALICE);
    }

    #[tokio::test]
    async fn bad_events_are_skipped_and_round_still_advances() {
        let chain = FakeChain::at_head(11);
        let (mut indexer, ledger, _dir) = setup(&chain);
        let alice = register_alice(&ledger);
        ledger.set_last_processed_round(10).unwrap();

        chain.put_logs(
            11,
            "TX1",
            APP_ID,
            &[
                "FIAT_DEPOSIT:UNKNOWNADDRESS:1000000:pi_1:0",
                "FIAT_DEPOSIT:too:few",
                "PRICE_UPDATED:ALGO:1",
                &format!("FIAT_DEPOSIT:{ALICE}:2000000:pi_2:0"),
            ],
        );

        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.ignored, 1);
        assert_eq!(ledger.balance(&alice.id, VIRTUAL_TOKEN).unwrap(), 2_000_000);
        assert_eq!(ledger.last_processed_round().unwrap(), Some(11));
    }

    #[tokio::test]
    async fn failed_round_does_not_advance_cursor() {
        let chain = FakeChain::at_head(12);
        let (mut indexer, ledger, _dir) = setup(&chain);
        ledger.set_last_processed_round(10).unwrap();
        chain.fail_round(12, true);

        let report = indexer.poll_once().await.unwrap();
        assert_eq!(report.failed_round, Some(12));
        assert_eq!(ledger.last_processed_round().unwrap(), Some(10));

        chain.fail_round(12, false);
        let report = indexer.poll_once().await.unwrap();
        assert_eq!(report.failed_round, None);
        assert_eq!(ledger.last_processed_round().unwrap(), Some(12));
        assert!(ledger.skipped_rounds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn replayed_rounds_do_not_double_apply() {
        let chain = FakeChain::at_head(12);
        let (mut indexer, ledger, _dir) = setup(&chain);
        let alice = register_alice(&ledger);
        ledger.set_last_processed_round(10).unwrap();

        chain.put_logs(11, "TX1", APP_ID, &[&format!("FIAT_DEPOSIT:{ALICE}:5000000:pi_1:0")]);
        chain.fail_round(12, true);

        indexer.poll_once().await.unwrap();
        chain.fail_round(12, false);
        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(ledger.balance(&alice.id, VIRTUAL_TOKEN).unwrap(), 5_000_000);
    }

    #[tokio::test]
    async fn round_is_skipped_after_max_retries() {
        let chain = FakeChain::at_head(11);
        let (mut indexer, ledger, _dir) = setup(&chain);
        ledger.set_last_processed_round(10).unwrap();
        chain.fail_round(11, true);

        for _ in 0..2 {
            let report = indexer.poll_once().await.unwrap();
            assert_eq!(report.failed_round, Some(11));
        }
        let report = indexer.poll_once().await.unwrap();

        assert_eq!(report.skipped_rounds, vec![11]);
        assert_eq!(ledger.last_processed_round().unwrap(), Some(11));
        let skipped = ledger.skipped_rounds().unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].round, 11);
        assert_eq!(skipped[0].attempts, 3);
    }

    #[tokio::test]
    async fn new_head_is_picked_up_next_cycle() {
        let chain = FakeChain::at_head(5);
        let (mut indexer, ledger, _dir) = setup(&chain);
        ledger.set_last_processed_round(5).unwrap();

        chain.set_head(7);
        let report = indexer.poll_once().await.unwrap();
        assert_eq!(report.rounds_processed, 2);
        assert_eq!(chain.fetched(), vec![6, 7]);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let chain = FakeChain::at_head(0);
        let (indexer, _ledger, _dir) = setup(&chain);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(indexer.run(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handler registry keyed by event kind.

use std::collections::HashMap;

use serde_json::Value;

use crate::storage::{EventLogEntry, LedgerDb, LedgerWrite};

use super::handlers::*;
use super::*;

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Handler ran and its writes committed.
    Applied {
        /// Sequence number of the audit entry.
        event_seq: u64,
        result: Value,
    },
    /// The event was already applied earlier; nothing was written.
    Duplicate,
}

/// Type-erased handler so the registry can hold every kind in one map.
trait ErasedHandler: Send + Sync {
    fn apply(
        &self,
        ledger: &LedgerWrite<'_>,
        event: &ChainEvent,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError>;
}

impl<H: EventHandler> ErasedHandler for H {
    fn apply(
        &self,
        ledger: &LedgerWrite<'_>,
        event: &ChainEvent,
        ctx: &EventContext,
    ) -> Result<HandlerOutput, ReconcileError> {
        let payload = H::Payload::from_event(event).ok_or_else(|| {
            ReconcileError::InvalidEvent(format!(
                "{} handler cannot take a {} event",
                H::Payload::KIND,
                event.tag()
            ))
        })?;
        self.handle(ledger, payload, ctx)
    }
}

/// Maps event kinds to the handler that applies them.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Box<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every known contract event.
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        registry
            .register(FiatDepositHandler)
            .register(NgoAuthorizedHandler)
            .register(CrisisBadgeHandler)
            .register(EmergencyDisbursalHandler)
            .register(TokenTransferHandler)
            .register(VirtualCardHandler)
            .register(SystemUpdateHandler);
        registry
    }

    /// Register a handler, replacing any previous one for the same kind.
    pub fn register<H: EventHandler>(&mut self, handler: H) -> &mut Self {
        self.handlers.insert(H::Payload::KIND, Box::new(handler));
        self
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Apply an event to the ledger exactly once.
    ///
    /// The idempotency check, handler writes, processed marker and audit
    /// entry share one write transaction; on error none of them persist.
    pub fn dispatch(
        &self,
        ledger: &LedgerDb,
        event: &ChainEvent,
        ctx: &EventContext,
    ) -> Result<DispatchOutcome, ReconcileError> {
        let kind = event
            .kind()
            .ok_or_else(|| ReconcileError::Unrecognized(event.tag().to_string()))?;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ReconcileError::NoHandler(kind.tag()))?;
        let key = ctx.idempotency_key(kind);

        let outcome = ledger.write(|w| -> Result<DispatchOutcome, ReconcileError> {
            if w.is_processed(&key)? {
                return Ok(DispatchOutcome::Duplicate);
            }

            let output = handler.apply(w, event, ctx)?;
            w.mark_processed(&key)?;

            let mut data = event.payload_json();
            if let Value::Object(map) = &mut data {
                map.insert("algorandSender".into(), ctx.sender.clone().into());
                map.insert("logIndex".into(), ctx.log_index.into());
                map.insert("result".into(), output.result.clone());
            }

            let mut entry = EventLogEntry::new(kind.audit_type())
                .with_chain(ctx.tx_id.clone(), ctx.round)
                .with_data(data);
            if let Some(user_id) = output.user_id {
                entry = entry.with_user(user_id);
            }
            let event_seq = w.append_event(&entry)?;

            Ok(DispatchOutcome::Applied {
                event_seq,
                result: output.result,
            })
        })?;

        match &outcome {
            DispatchOutcome::Applied { event_seq, .. } => {
                tracing::debug!(key = %key, event_seq, "Event applied");
            }
            DispatchOutcome::Duplicate => {
                tracing::debug!(key = %key, "Event already applied, skipping");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{UserRecord, UserRole, VIRTUAL_TOKEN};

    const ALICE: &str = "ALICEALICEALICEALICEALICEALICEALICEALICEALICEALICEALICE";

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    fn deposit(amount_micro: u64) -> ChainEvent {
        FiatDeposit {
            user_address: ALICE.into(),
            amount_micro,
            stripe_payment_id: "pi_123".into(),
            timestamp: 1_700_000_000,
        }
        .into()
    }

    #[test]
    fn default_registry_covers_every_kind() {
        let registry = HandlerRegistry::with_default_handlers();
        for kind in EventKind::ALL {
            assert!(registry.handles(kind), "{kind}");
        }
    }

    #[test]
    fn dispatch_applies_and_audits() {
        let (db, _dir) = temp_db();
        let user = UserRecord::new(ALICE.into(), UserRole::User);
        db.write(|w| w.insert_user(&user)).unwrap();

        let registry = HandlerRegistry::with_default_handlers();
        let ctx = EventContext::new("TX1").with_sender(ALICE).at(100, 0);
        let outcome = registry.dispatch(&db, &deposit(5_000_000), &ctx).unwrap();

        let DispatchOutcome::Applied { event_seq, result } = outcome else {
            panic!("expected applied");
        };
        assert_eq!(event_seq, 1);
        assert_eq!(result["amount"], 5.0);

        let events = db.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "algorand_fiat_deposit");
        assert_eq!(events[0].user_id.as_deref(), Some(user.id.as_str()));
        assert_eq!(events[0].algorand_tx_id.as_deref(), Some("TX1"));
        assert_eq!(events[0].algorand_round, Some(100));
        assert_eq!(events[0].data["stripePaymentId"], "pi_123");
        assert_eq!(events[0].data["logIndex"], 0);
    }

    #[test]
    fn replay_is_a_no_op() {
        let (db, _dir) = temp_db();
        let user = UserRecord::new(ALICE.into(), UserRole::User);
        db.write(|w| w.insert_user(&user)).unwrap();

        let registry = HandlerRegistry::with_default_handlers();
        let ctx = EventContext::new("TX1").at(100, 0);
        registry.dispatch(&db, &deposit(5_000_000), &ctx).unwrap();
        let again = registry.dispatch(&db, &deposit(5_000_000), &ctx).unwrap();

        assert_eq!(again, DispatchOutcome::Duplicate);
        assert_eq!(db.balance(&user.id, VIRTUAL_TOKEN).unwrap(), 5_000_000);
        assert_eq!(db.transactions_for_user(&user.id).unwrap().len(), 1);
        assert_eq!(db.recent_events(10).unwrap().len(), 1);
    }

    #[test]
    fn distinct_log_index_is_not_a_duplicate() {
        let (db, _dir) = temp_db();
        let user = UserRecord::new(ALICE.into(), UserRole::User);
        db.write(|w| w.insert_user(&user)).unwrap();

        let registry = HandlerRegistry::with_default_handlers();
        registry
            .dispatch(&db, &deposit(1_000_000), &EventContext::new("TX1").at(100, 0))
            .unwrap();
        registry
            .dispatch(&db, &deposit(1_000_000), &EventContext::new("TX1").at(100, 1))
            .unwrap();

        assert_eq!(db.balance(&user.id, VIRTUAL_TOKEN).unwrap(), 2_000_000);
    }

    #[test]
    fn failed_event_is_not_marked_processed() {
        let (db, _dir) = temp_db();
        let registry = HandlerRegistry::with_default_handlers();
        let ctx = EventContext::new("TX1").at(100, 0);

        let err = registry.dispatch(&db, &deposit(5_000_000), &ctx).unwrap_err();
        assert!(matches!(err, ReconcileError::AddressNotFound { .. }));
        assert!(db.recent_events(10).unwrap().is_empty());

        // Once the user exists, the same event applies.
        let user = UserRecord::new(ALICE.into(), UserRole::User);
        db.write(|w| w.insert_user(&user)).unwrap();
        let outcome = registry.dispatch(&db, &deposit(5_000_000), &ctx).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied { .. }));
    }

    #[test]
    fn unrecognized_event_is_rejected() {
        let (db, _dir) = temp_db();
        let registry = HandlerRegistry::with_default_handlers();
        let event = ChainEvent::Unrecognized {
            tag: "PRICE_UPDATED".into(),
            fields: vec![],
        };
        let err = registry
            .dispatch(&db, &event, &EventContext::new("TX"))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Unrecognized(tag) if tag == "PRICE_UPDATED"));
    }

    #[test]
    fn missing_handler_is_reported() {
        let (db, _dir) = temp_db();
        let registry = HandlerRegistry::new();
        let err = registry
            .dispatch(&db, &deposit(1), &EventContext::new("TX"))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoHandler("FIAT_DEPOSIT")));
    }
}

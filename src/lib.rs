// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SAMOA Bankcard Sync - Algorand Event Reconciliation Service
//!
//! Watches the relief smart contract on Algorand and mirrors its logged
//! events into an off-chain ledger of users, balances, cases and cards.
//!
//! ## Modules
//!
//! - `algorand` - algod REST client and block types
//! - `events` - Log decoding, per-event handlers and idempotent dispatch
//! - `indexer` - Round polling loop and durable cursor
//! - `storage` - Ledger database (redb)
//! - `api` - HTTP API handlers (Axum), including the manual sync endpoint

pub mod algorand;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod indexer;
pub mod models;
pub mod state;
pub mod storage;

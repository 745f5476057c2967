// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Algorand integration.
//!
//! This module provides:
//! - The [`ChainSource`] abstraction the indexer polls
//! - An algod REST client implementing it
//! - Block types and micro-unit helpers

pub mod client;
pub mod types;

pub use client::{AlgodClient, ChainError, ChainSource};
pub use types::*;

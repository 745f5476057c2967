// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

/// Last fully processed round, loaded at the start of each poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    last_processed: u64,
}

impl Cursor {
    /// Resume from the stored round, or start `lookback` rounds behind `head`.
    pub fn resume(stored: Option<u64>, head: u64, lookback: u64) -> Self {
        Self {
            last_processed: stored.unwrap_or_else(|| head.saturating_sub(lookback)),
        }
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    pub fn next_round(&self) -> u64 {
        self.last_processed.saturating_add(1)
    }

    /// Whether `head` has rounds this cursor has not processed.
    pub fn is_behind(&self, head: u64) -> bool {
        self.last_processed < head
    }

    /// Mark `round` as processed. Never moves backwards.
    pub fn advance_to(&mut self, round: u64) {
        self.last_processed = self.last_processed.max(round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_behind_head_when_absent() {
        let cursor = Cursor::resume(None, 1_000, 100);
        assert_eq!(cursor.last_processed(), 900);
        assert_eq!(cursor.next_round(), 901);
    }

    #[test]
    fn seed_saturates_near_genesis() {
        assert_eq!(Cursor::resume(None, 40, 100).last_processed(), 0);
    }

    #[test]
    fn stored_round_wins() {
        let cursor = Cursor::resume(Some(950), 1_000, 100);
        assert_eq!(cursor.last_processed(), 950);
        assert!(cursor.is_behind(1_000));
        assert!(!cursor.is_behind(950));
    }

    #[test]
    fn advance_is_monotonic() {
        let mut cursor = Cursor::resume(Some(10), 10, 0);
        cursor.advance_to(12);
        cursor.advance_to(11);
        assert_eq!(cursor.last_processed(), 12);
    }
}

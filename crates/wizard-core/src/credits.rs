//! Credit balance and consumption record types.
//!
//! A [`CreditBalance`] is the source of truth for how many paid generations
//! an account may still run. [`ConsumptionRecord`]s are an append-only audit
//! trail and are never used to compute a balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, RecordId};

/// Credits granted to a freshly provisioned account (both `current` and
/// `max`).
pub const DEFAULT_GRANT: i32 = 3;

/// A per-account credit balance.
///
/// Invariant: `0 <= current <= max` and `max >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Credits currently available.
    pub current: i32,
    /// Ceiling restored by the periodic reset.
    pub max: i32,
}

impl CreditBalance {
    /// A full balance of `grant` credits.
    ///
    /// `grant` is clamped to at least 1.
    #[must_use]
    pub fn full(grant: i32) -> Self {
        let max = grant.max(1);
        Self { current: max, max }
    }

    /// Whether the invariant `0 <= current <= max`, `max >= 1` holds.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.max >= 1 && self.current >= 0 && self.current <= self.max
    }

    /// Whether `amount` credits can be deducted.
    #[must_use]
    pub const fn can_afford(&self, amount: i32) -> bool {
        amount > 0 && self.current >= amount
    }

    /// The balance after deducting `amount`, or `None` if there are not
    /// enough credits. Never goes below zero.
    #[must_use]
    pub fn deducted(&self, amount: i32) -> Option<Self> {
        if !self.can_afford(amount) {
            return None;
        }
        Some(Self {
            current: (self.current - amount).max(0),
            max: self.max,
        })
    }

    /// The balance after a periodic reset.
    #[must_use]
    pub const fn reset(&self) -> Self {
        Self {
            current: self.max,
            max: self.max,
        }
    }
}

/// Outcome of a conditional deduction at the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// The deduction committed.
    Applied {
        /// Balance before the deduction.
        before: CreditBalance,
        /// Balance after the deduction.
        after: CreditBalance,
    },
    /// Not enough credits; nothing was changed.
    Insufficient(CreditBalance),
}

/// An audit entry for one committed consume operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    /// Time-ordered record id.
    pub id: RecordId,
    /// The account whose balance was decremented.
    pub account_id: AccountId,
    /// Credits deducted; negative when a late deduction was refunded.
    pub amount: i32,
    /// `current` before the deduction.
    pub balance_before: i32,
    /// `current` after the deduction.
    pub balance_after: i32,
    /// When the deduction happened.
    pub created_at: DateTime<Utc>,
}

impl ConsumptionRecord {
    /// Build a record for a committed deduction.
    #[must_use]
    pub fn new(account_id: AccountId, amount: i32, before: CreditBalance, after: CreditBalance) -> Self {
        Self {
            id: RecordId::generate(),
            account_id,
            amount,
            balance_before: before.current,
            balance_after: after.current,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_balance() {
        assert_eq!(CreditBalance::full(3), CreditBalance { current: 3, max: 3 });
        assert_eq!(CreditBalance::full(0), CreditBalance { current: 1, max: 1 });
    }

    #[test]
    fn deduction_never_goes_negative() {
        let balance = CreditBalance { current: 1, max: 3 };
        assert_eq!(balance.deducted(1), Some(CreditBalance { current: 0, max: 3 }));
        assert_eq!(balance.deducted(2), None);
        assert_eq!(balance.deducted(0), None);
        assert_eq!(balance.deducted(-1), None);
    }

    #[test]
    fn reset_restores_max() {
        let balance = CreditBalance { current: 0, max: 5 };
        assert_eq!(balance.reset(), CreditBalance { current: 5, max: 5 });
        assert_eq!(balance.reset().reset(), balance.reset());
    }

    #[test]
    fn validity() {
        assert!(CreditBalance { current: 0, max: 1 }.is_valid());
        assert!(!CreditBalance { current: 2, max: 1 }.is_valid());
        assert!(!CreditBalance { current: -1, max: 1 }.is_valid());
        assert!(!CreditBalance { current: 0, max: 0 }.is_valid());
    }

    #[test]
    fn record_captures_before_and_after() {
        let account = AccountId::new(9).unwrap();
        let before = CreditBalance { current: 3, max: 3 };
        let after = before.deducted(2).unwrap();
        let record = ConsumptionRecord::new(account, 2, before, after);
        assert_eq!(record.balance_before, 3);
        assert_eq!(record.balance_after, 1);
        assert_eq!(record.amount, 2);
    }
}

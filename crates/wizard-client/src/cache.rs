//! Advisory balance cache.
//!
//! Display only. A cached balance never authorises a deduction; every
//! deduction goes to the server.

use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use wizard_core::CreditBalance;

struct Entry {
    balance: CreditBalance,
    stored_at: Instant,
}

/// A single balance remembered for at most `ttl`.
pub(crate) struct BalanceCache {
    ttl: Duration,
    entry: RwLock<Option<Entry>>,
}

impl BalanceCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// The cached balance, if still fresh.
    pub(crate) async fn get(&self) -> Option<CreditBalance> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.balance)
    }

    pub(crate) async fn store(&self, balance: CreditBalance) {
        *self.entry.write().await = Some(Entry {
            balance,
            stored_at: Instant::now(),
        });
    }

    pub(crate) async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

//! Storage layer and credit ledger for the section wizard.
//!
//! This crate owns every read and write of account and credit state:
//!
//! - [`Store`]: the datastore seam, with a PostgreSQL backend ([`PgStore`])
//!   and an in-memory backend ([`MemoryStore`]) for development and tests.
//! - [`Ledger`]: the credit ledger (`get_balance`, `consume`, `reset_all`)
//!   layered on a `Store`, adding lazy provisioning, bounded retries and
//!   per-operation timeouts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wizard_core::{ExternalId, IdentityProfile};
//! use wizard_store::{Ledger, LedgerOptions, MemoryStore, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
//! let ledger = Ledger::new(store.clone(), LedgerOptions::default());
//!
//! let (account, _) = store
//!     .sync_identity(&IdentityProfile {
//!         external_id: ExternalId::new("google-123")?,
//!         name: None,
//!         email: None,
//!         avatar_url: None,
//!     })
//!     .await?;
//!
//! let balance = ledger.consume(account.id, 1).await?;
//! println!("{} of {} credits left", balance.current, balance.max);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod schema;

pub use error::{Result, StoreError};
pub use ledger::{Ledger, LedgerOptions};
pub use memory::MemoryStore;
pub use postgres::{PgStore, PgStoreOptions};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use wizard_core::{
    Account, AccountId, Consumption, ConsumptionRecord, CreditBalance, ExternalId,
    IdentityProfile, ProfileUpdate,
};

/// The storage trait defining all datastore operations.
///
/// Implementations must make [`Store::consume`] a single indivisible
/// check-and-decrement relative to other `consume` and `reset_all` calls on
/// the same account.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create the account for an identity, or refresh its profile if it
    /// already exists. Returns the account and whether it was created.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the email belongs to another account.
    /// - `StoreError::Unavailable` / `StoreError::Database` on datastore failure.
    async fn sync_identity(&self, profile: &IdentityProfile) -> Result<(Account, bool)>;

    /// Get an account by its canonical id.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Resolve an identity-provider subject to its account.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn find_account_by_external_id(&self, external_id: &ExternalId)
        -> Result<Option<Account>>;

    /// Apply a profile edit and return the updated account.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::Conflict` if the email belongs to another account.
    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account>;

    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Read an account's balance, if provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn get_balance(&self, id: AccountId) -> Result<Option<CreditBalance>>;

    /// Insert a balance row for an account.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the account already has a balance.
    /// - `StoreError::UnknownAccount` if the account doesn't exist.
    async fn insert_balance(&self, id: AccountId, balance: CreditBalance) -> Result<CreditBalance>;

    /// Atomically deduct `amount` credits if the balance covers it.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account has no balance row.
    /// - `StoreError::Unavailable` / `StoreError::Database` on datastore failure.
    async fn consume(&self, id: AccountId, amount: i32) -> Result<Consumption>;

    /// Give back `amount` credits, capped at `max`. Compensates a deduction
    /// whose caller was told it failed.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account has no balance row.
    /// - `StoreError::Unavailable` / `StoreError::Database` on datastore failure.
    async fn refund(&self, id: AccountId, amount: i32) -> Result<CreditBalance>;

    /// Set `current = max` for every balance. Returns the number of rows reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn reset_all(&self) -> Result<u64>;

    // =========================================================================
    // Consumption Records
    // =========================================================================

    /// Append an audit record.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn append_consumption(&self, record: &ConsumptionRecord) -> Result<()>;

    /// List an account's records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the datastore operation fails.
    async fn list_consumption(&self, id: AccountId, limit: usize)
        -> Result<Vec<ConsumptionRecord>>;

    /// Check that the datastore is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if it is not.
    async fn ping(&self) -> Result<()>;
}

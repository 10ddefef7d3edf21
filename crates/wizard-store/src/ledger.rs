//! The credit ledger.
//!
//! The ledger is the only component that mutates credit balances. It adds
//! three things on top of a [`Store`]:
//!
//! - **Lazy provisioning**: the first read or consume for an account creates
//!   its balance with the default grant. A racing duplicate insert surfaces as
//!   a uniqueness conflict and is resolved by re-reading the winner's row.
//! - **Bounded waits**: every operation runs under a timeout and is reported
//!   as `DatastoreUnavailable` when it expires. A consume that commits after
//!   its caller was told it failed is refunded.
//! - **Bounded retries** for idempotent datastore calls (reads, provisioning,
//!   reset). A consume is never retried: after a transport failure its
//!   outcome is unknown, and a blind retry could spend twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use wizard_core::{
    AccountId, Consumption, ConsumptionRecord, CreditBalance, LedgerError, DEFAULT_GRANT,
};

use crate::error::StoreError;
use crate::retry::RetryPolicy;
use crate::Store;

/// Default bounded wait for a single ledger operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Ledger tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOptions {
    /// `current` and `max` of a freshly provisioned balance.
    pub default_grant: i32,
    /// Bounded wait per operation.
    pub operation_timeout: Duration,
    /// Retry policy for idempotent datastore calls.
    pub retry: RetryPolicy,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            default_grant: DEFAULT_GRANT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Race-free per-account credit accounting.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    options: LedgerOptions,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, options: LedgerOptions) -> Self {
        Self { store, options }
    }

    /// The ledger's configuration.
    #[must_use]
    pub const fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Read an account's balance, provisioning the default grant on first
    /// access.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAccount` if the account doesn't exist.
    /// - `LedgerError::DatastoreUnavailable` on datastore failure or timeout.
    pub async fn get_balance(&self, account_id: AccountId) -> Result<CreditBalance, LedgerError> {
        self.bounded("get_balance", self.provisioned_balance(account_id))
            .await
    }

    /// Deduct `amount` credits and return the balance after the deduction.
    ///
    /// The check and the decrement are one indivisible datastore operation:
    /// of two concurrent `consume(1)` calls against a balance of 1, exactly
    /// one succeeds. The deduction runs in its own task, so a caller that
    /// goes away mid-flight cannot leave it half-done. If the bounded wait
    /// expires first, the caller gets `DatastoreUnavailable` and the task is
    /// watched to completion: should the deduction still commit, the credits
    /// are refunded, so a reported failure never costs the account anything.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is not positive.
    /// - `LedgerError::InsufficientCredit` if the balance is below `amount`;
    ///   nothing is changed.
    /// - `LedgerError::InvalidAccount` if the account doesn't exist.
    /// - `LedgerError::DatastoreUnavailable` on datastore failure or timeout.
    pub async fn consume(
        &self,
        account_id: AccountId,
        amount: i32,
    ) -> Result<CreditBalance, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(i64::from(amount)));
        }

        let ledger = self.clone();
        let mut task = tokio::spawn(async move { ledger.consume_inner(account_id, amount).await });

        match tokio::time::timeout(self.options.operation_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(
                    account_id = %account_id,
                    error = %join_error,
                    "Consume task aborted"
                );
                Err(LedgerError::DatastoreUnavailable(
                    "consume aborted before completion".into(),
                ))
            }
            Err(_) => {
                tracing::error!(
                    account_id = %account_id,
                    timeout_ms = %self.options.operation_timeout.as_millis(),
                    "Consume timed out; refunding if it commits late"
                );
                tokio::spawn(self.clone().refund_if_applied(account_id, amount, task));
                Err(timed_out("consume", self.options.operation_timeout))
            }
        }
    }

    /// Restore every balance to its maximum. Returns the number of balances
    /// reset.
    ///
    /// Each row is reset atomically; the reset as a whole is not one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::DatastoreUnavailable` on datastore failure or
    /// timeout.
    pub async fn reset_all(&self) -> Result<u64, LedgerError> {
        let store = &self.store;
        let reset = self
            .bounded("reset_all", async {
                self.options
                    .retry
                    .run("reset_all", || store.reset_all())
                    .await
                    .map_err(LedgerError::from)
            })
            .await?;

        tracing::info!(reset = reset, "Credit balances reset");
        Ok(reset)
    }

    /// Recent consumption records for an account, newest first.
    ///
    /// Diagnostics only; balances are never derived from these.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::DatastoreUnavailable` on datastore failure or
    /// timeout.
    pub async fn history(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<ConsumptionRecord>, LedgerError> {
        let store = &self.store;
        self.bounded("history", async {
            self.options
                .retry
                .run("list_consumption", || store.list_consumption(account_id, limit))
                .await
                .map_err(LedgerError::from)
        })
        .await
    }

    async fn consume_inner(
        &self,
        account_id: AccountId,
        amount: i32,
    ) -> Result<CreditBalance, LedgerError> {
        self.provisioned_balance(account_id).await?;

        match self.store.consume(account_id, amount).await? {
            Consumption::Applied { before, after } => {
                tracing::info!(
                    account_id = %account_id,
                    amount = amount,
                    before = before.current,
                    after = after.current,
                    "Credits consumed"
                );
                self.record_consumption(ConsumptionRecord::new(account_id, amount, before, after))
                    .await;
                Ok(after)
            }
            Consumption::Insufficient(balance) => {
                tracing::info!(
                    account_id = %account_id,
                    amount = amount,
                    current = balance.current,
                    "Insufficient credit"
                );
                Err(LedgerError::InsufficientCredit {
                    current: balance.current,
                    required: amount,
                })
            }
        }
    }

    /// Wait out a consume whose caller already saw a timeout and give the
    /// credits back if it applied.
    async fn refund_if_applied(
        self,
        account_id: AccountId,
        amount: i32,
        task: JoinHandle<Result<CreditBalance, LedgerError>>,
    ) {
        match task.await {
            Ok(Ok(after)) => match self.store.refund(account_id, amount).await {
                Ok(restored) => {
                    tracing::warn!(
                        account_id = %account_id,
                        amount = amount,
                        current = restored.current,
                        "Refunded consume that committed after its timeout"
                    );
                    let record = ConsumptionRecord::new(account_id, -amount, after, restored);
                    self.record_consumption(record).await;
                }
                Err(e) => tracing::error!(
                    account_id = %account_id,
                    amount = amount,
                    error = %e,
                    "Failed to refund late consume; balance needs manual correction"
                ),
            },
            Ok(Err(e)) => tracing::debug!(
                account_id = %account_id,
                error = %e,
                "Timed-out consume did not apply"
            ),
            Err(join_error) => tracing::error!(
                account_id = %account_id,
                error = %join_error,
                "Timed-out consume task aborted"
            ),
        }
    }

    /// Read the balance, creating it with the default grant if absent.
    async fn provisioned_balance(&self, account_id: AccountId) -> Result<CreditBalance, LedgerError> {
        let store = &self.store;
        let retry = &self.options.retry;

        if let Some(balance) = retry
            .run("get_balance", || store.get_balance(account_id))
            .await?
        {
            return Ok(balance);
        }

        let grant = CreditBalance::full(self.options.default_grant);
        match retry
            .run("insert_balance", || store.insert_balance(account_id, grant))
            .await
        {
            Ok(balance) => {
                tracing::info!(
                    account_id = %account_id,
                    current = balance.current,
                    max = balance.max,
                    "Credit balance provisioned"
                );
                Ok(balance)
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!(
                    account_id = %account_id,
                    "Balance provisioned concurrently, re-reading"
                );
                retry
                    .run("get_balance", || store.get_balance(account_id))
                    .await?
                    .ok_or_else(|| {
                        LedgerError::DatastoreUnavailable(
                            "balance missing after provisioning conflict".into(),
                        )
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append an audit record. Failure is logged and swallowed: the
    /// deduction has already committed and stays committed.
    async fn record_consumption(&self, record: ConsumptionRecord) {
        if let Err(e) = self.store.append_consumption(&record).await {
            tracing::warn!(
                account_id = %record.account_id,
                record_id = %record.id,
                error = %e,
                "Failed to append consumption record"
            );
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let limit = self.options.operation_timeout;
        tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            tracing::error!(
                operation = operation,
                timeout_ms = %limit.as_millis(),
                "Ledger operation timed out"
            );
            Err(timed_out(operation, limit))
        })
    }
}

fn timed_out(operation: &str, limit: Duration) -> LedgerError {
    LedgerError::DatastoreUnavailable(format!(
        "{operation} timed out after {}ms",
        limit.as_millis()
    ))
}

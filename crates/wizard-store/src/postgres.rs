//! PostgreSQL storage implementation.
//!
//! Every balance mutation is a single conditional statement, so the
//! check-and-decrement of `consume` is atomic under PostgreSQL's row-level
//! locking without an explicit transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use wizard_core::{
    Account, AccountId, Consumption, ConsumptionRecord, CreditBalance, ExternalId,
    IdentityProfile, ProfileUpdate,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Embedded schema migrations.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a free connection before failing.
    pub acquire_timeout: Duration,
    /// Server-side `statement_timeout` for every pooled connection. Keep it
    /// below the ledger's operation timeout so a slow deduction is aborted
    /// by the server rather than committing after its caller gave up.
    pub statement_timeout: Option<Duration>,
}

impl Default for PgStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            statement_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// PostgreSQL-backed storage implementation.
///
/// The pool is created once at startup and connections are acquired per
/// statement, so every exit path returns its connection to the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    external_id: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: AccountId::new(row.id).map_err(|e| StoreError::Database(e.to_string()))?,
            external_id: ExternalId::new(row.external_id)
                .map_err(|e| StoreError::Database(e.to_string()))?,
            name: row.name,
            email: row.email,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BalanceRow {
    current: i32,
    max: i32,
}

impl From<BalanceRow> for CreditBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            current: row.current,
            max: row.max,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    account_id: i64,
    amount: i32,
    balance_before: i32,
    balance_after: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for ConsumptionRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .parse()
                .map_err(|e: wizard_core::IdError| StoreError::Database(e.to_string()))?,
            account_id: AccountId::new(row.account_id)
                .map_err(|e| StoreError::Database(e.to_string()))?,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            created_at: row.created_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, external_id, name, email, avatar_url, created_at, updated_at";

impl PgStore {
    /// Connect to the database and build the pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if no connection can be established.
    pub async fn connect(database_url: &str, options: &PgStoreOptions) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Database(format!("invalid database url: {e}")))?;
        if let Some(limit) = options.statement_timeout {
            connect_options =
                connect_options.options([("statement_timeout", statement_timeout_value(limit))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(
            max_connections = options.max_connections,
            statement_timeout = ?options.statement_timeout,
            "PostgreSQL pool created"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `statement_timeout` takes milliseconds; zero would disable it.
fn statement_timeout_value(limit: Duration) -> String {
    format!("{}ms", limit.as_millis().max(1))
}

#[async_trait]
impl Store for PgStore {
    async fn sync_identity(&self, profile: &IdentityProfile) -> Result<(Account, bool)> {
        // xmax is zero only for a row version created by this INSERT.
        let query = format!(
            "INSERT INTO accounts (external_id, name, email, avatar_url) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (external_id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 email = EXCLUDED.email, \
                 avatar_url = EXCLUDED.avatar_url, \
                 updated_at = now() \
             RETURNING {ACCOUNT_COLUMNS}, (xmax = 0) AS inserted"
        );

        let (row, inserted): (AccountRow, bool) = {
            let row = sqlx::query(&query)
                .bind(profile.external_id.as_str())
                .bind(profile.name.as_deref())
                .bind(profile.email.as_deref())
                .bind(profile.avatar_url.as_deref())
                .fetch_one(&self.pool)
                .await?;
            let inserted: bool = sqlx::Row::try_get(&row, "inserted")?;
            (sqlx::FromRow::from_row(&row)?, inserted)
        };

        Ok((Account::try_from(row)?, inserted))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_account_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE external_id = $1");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(external_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account> {
        let query = format!(
            "UPDATE accounts SET \
                 name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 avatar_url = COALESCE($4, avatar_url), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );

        sqlx::query_as::<_, AccountRow>(&query)
            .bind(id.get())
            .bind(update.name.as_deref())
            .bind(update.email.as_deref())
            .bind(update.avatar_url.as_deref())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
            .and_then(Account::try_from)
    }

    async fn get_balance(&self, id: AccountId) -> Result<Option<CreditBalance>> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT current, max FROM credit_balances WHERE account_id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CreditBalance::from))
    }

    async fn insert_balance(&self, id: AccountId, balance: CreditBalance) -> Result<CreditBalance> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "INSERT INTO credit_balances (account_id, current, max) \
             VALUES ($1, $2, $3) \
             RETURNING current, max",
        )
        .bind(id.get())
        .bind(balance.current)
        .bind(balance.max)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn consume(&self, id: AccountId, amount: i32) -> Result<Consumption> {
        let updated = sqlx::query_as::<_, BalanceRow>(
            "UPDATE credit_balances \
             SET current = GREATEST(current - $2, 0), updated_at = now() \
             WHERE account_id = $1 AND current >= $2 \
             RETURNING current, max",
        )
        .bind(id.get())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            let after = CreditBalance::from(row);
            let before = CreditBalance {
                current: after.current + amount,
                max: after.max,
            };
            return Ok(Consumption::Applied { before, after });
        }

        let current = self.get_balance(id).await?.ok_or(StoreError::NotFound)?;
        Ok(Consumption::Insufficient(current))
    }

    async fn refund(&self, id: AccountId, amount: i32) -> Result<CreditBalance> {
        sqlx::query_as::<_, BalanceRow>(
            "UPDATE credit_balances \
             SET current = LEAST(current + $2, max), updated_at = now() \
             WHERE account_id = $1 \
             RETURNING current, max",
        )
        .bind(id.get())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?
        .map(CreditBalance::from)
        .ok_or(StoreError::NotFound)
    }

    async fn reset_all(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE credit_balances SET current = max, updated_at = now()")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn append_consumption(&self, record: &ConsumptionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO consumption_records \
                 (id, account_id, amount, balance_before, balance_after, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id.to_string())
        .bind(record.account_id.get())
        .bind(record.amount)
        .bind(record.balance_before)
        .bind(record.balance_after)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_consumption(&self, id: AccountId, limit: usize) -> Result<Vec<ConsumptionRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query_as::<_, RecordRow>(
            "SELECT id, account_id, amount, balance_before, balance_after, created_at \
             FROM consumption_records \
             WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2",
        )
        .bind(id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ConsumptionRecord::try_from)
        .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_timeout_in_milliseconds() {
        assert_eq!(statement_timeout_value(Duration::from_secs(10)), "10000ms");
        assert_eq!(statement_timeout_value(Duration::from_millis(1500)), "1500ms");
        assert_eq!(statement_timeout_value(Duration::ZERO), "1ms");
    }
}

//! Database schema definitions.
//!
//! Table and constraint names used by the PostgreSQL backend. The DDL itself
//! lives in `migrations/`.

/// Table names.
pub mod table {
    /// One row per account, keyed by the canonical id.
    pub const ACCOUNTS: &str = "accounts";

    /// One row per provisioned account, keyed by `account_id`.
    pub const CREDIT_BALANCES: &str = "credit_balances";

    /// Append-only audit of committed deductions.
    pub const CONSUMPTION_RECORDS: &str = "consumption_records";
}

/// Constraint names reported by unique violations.
pub mod constraint {
    /// Uniqueness of `accounts.external_id`.
    pub const ACCOUNTS_EXTERNAL_ID: &str = "accounts_external_id_key";

    /// Uniqueness of `accounts.email`.
    pub const ACCOUNTS_EMAIL: &str = "accounts_email_key";

    /// Primary key of `credit_balances` (one balance per account).
    pub const CREDIT_BALANCES_PKEY: &str = "credit_balances_pkey";
}

/// Returns all table names, in dependency order.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::ACCOUNTS,
        table::CREDIT_BALANCES,
        table::CONSUMPTION_RECORDS,
    ]
}

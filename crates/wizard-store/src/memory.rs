//! In-memory storage implementation.
//!
//! Used when no database is configured and throughout the test suites. All
//! state sits behind one mutex, so every operation is trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use wizard_core::{
    Account, AccountId, Consumption, ConsumptionRecord, CreditBalance, ExternalId,
    IdentityProfile, ProfileUpdate,
};

use crate::error::{Result, StoreError};
use crate::schema::constraint;
use crate::Store;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    accounts: HashMap<AccountId, Account>,
    by_external_id: HashMap<ExternalId, AccountId>,
    balances: HashMap<AccountId, CreditBalance>,
    records: Vec<ConsumptionRecord>,
}

impl MemoryState {
    fn email_taken(&self, email: Option<&str>, owner: Option<AccountId>) -> bool {
        let Some(email) = email else {
            return false;
        };
        self.accounts
            .values()
            .any(|a| Some(a.id) != owner && a.email.as_deref() == Some(email))
    }

    fn allocate_id(&mut self) -> Result<AccountId> {
        self.next_id += 1;
        AccountId::new(self.next_id).map_err(|e| StoreError::Database(e.to_string()))
    }
}

/// Process-local storage backend.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of provisioned balance rows.
    pub async fn balance_count(&self) -> usize {
        self.state.lock().await.balances.len()
    }
}

fn email_conflict() -> StoreError {
    StoreError::Conflict {
        constraint: constraint::ACCOUNTS_EMAIL.into(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn sync_identity(&self, profile: &IdentityProfile) -> Result<(Account, bool)> {
        let mut state = self.state.lock().await;
        let existing = state.by_external_id.get(&profile.external_id).copied();

        if state.email_taken(profile.email.as_deref(), existing) {
            return Err(email_conflict());
        }

        let now = Utc::now();
        if let Some(id) = existing {
            let account = state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
            account.name.clone_from(&profile.name);
            account.email.clone_from(&profile.email);
            account.avatar_url.clone_from(&profile.avatar_url);
            account.updated_at = now;
            return Ok((account.clone(), false));
        }

        let id = state.allocate_id()?;
        let account = Account {
            id,
            external_id: profile.external_id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            avatar_url: profile.avatar_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.by_external_id.insert(profile.external_id.clone(), id);
        state.accounts.insert(id, account.clone());
        Ok((account, true))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .by_external_id
            .get(external_id)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if state.email_taken(update.email.as_deref(), Some(id)) {
            return Err(email_conflict());
        }

        let account = state.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = &update.name {
            account.name = Some(name.clone());
        }
        if let Some(email) = &update.email {
            account.email = Some(email.clone());
        }
        if let Some(avatar) = &update.avatar_url {
            account.avatar_url = Some(avatar.clone());
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn get_balance(&self, id: AccountId) -> Result<Option<CreditBalance>> {
        Ok(self.state.lock().await.balances.get(&id).copied())
    }

    async fn insert_balance(&self, id: AccountId, balance: CreditBalance) -> Result<CreditBalance> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::UnknownAccount);
        }
        if !balance.is_valid() {
            return Err(StoreError::Database(format!("invalid balance {balance:?}")));
        }
        if state.balances.contains_key(&id) {
            return Err(StoreError::Conflict {
                constraint: constraint::CREDIT_BALANCES_PKEY.into(),
            });
        }
        state.balances.insert(id, balance);
        Ok(balance)
    }

    async fn consume(&self, id: AccountId, amount: i32) -> Result<Consumption> {
        let mut state = self.state.lock().await;
        let balance = state.balances.get_mut(&id).ok_or(StoreError::NotFound)?;

        let before = *balance;
        match before.deducted(amount) {
            Some(after) => {
                *balance = after;
                Ok(Consumption::Applied { before, after })
            }
            None => Ok(Consumption::Insufficient(before)),
        }
    }

    async fn refund(&self, id: AccountId, amount: i32) -> Result<CreditBalance> {
        let mut state = self.state.lock().await;
        let balance = state.balances.get_mut(&id).ok_or(StoreError::NotFound)?;
        balance.current = balance.current.saturating_add(amount).min(balance.max);
        Ok(*balance)
    }

    async fn reset_all(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        for balance in state.balances.values_mut() {
            *balance = balance.reset();
        }
        Ok(state.balances.len() as u64)
    }

    async fn append_consumption(&self, record: &ConsumptionRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&record.account_id) {
            return Err(StoreError::UnknownAccount);
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn list_consumption(&self, id: AccountId, limit: usize) -> Result<Vec<ConsumptionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.account_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str, email: Option<&str>) -> IdentityProfile {
        IdentityProfile {
            external_id: ExternalId::new(subject).unwrap(),
            name: Some("Test User".into()),
            email: email.map(Into::into),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn sync_creates_then_updates() {
        let store = MemoryStore::new();

        let (created, is_new) = store.sync_identity(&identity("g-1", Some("a@x.io"))).await.unwrap();
        assert!(is_new);

        let mut again = identity("g-1", Some("b@x.io"));
        again.name = Some("Renamed".into());
        let (updated, is_new) = store.sync_identity(&again).await.unwrap();
        assert!(!is_new);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name.as_deref(), Some("Renamed"));
        assert_eq!(updated.email.as_deref(), Some("b@x.io"));
    }

    #[tokio::test]
    async fn external_ids_map_to_distinct_accounts() {
        let store = MemoryStore::new();
        let (a, _) = store.sync_identity(&identity("g-1", None)).await.unwrap();
        let (b, _) = store.sync_identity(&identity("g-2", None)).await.unwrap();
        assert_ne!(a.id, b.id);

        let found = store
            .find_account_by_external_id(&ExternalId::new("g-2").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.id);
    }

    #[tokio::test]
    async fn email_must_be_unique() {
        let store = MemoryStore::new();
        store.sync_identity(&identity("g-1", Some("a@x.io"))).await.unwrap();

        let err = store
            .sync_identity(&identity("g-2", Some("a@x.io")))
            .await
            .unwrap_err();
        assert!(err.is_email_conflict());

        let (other, _) = store.sync_identity(&identity("g-3", None)).await.unwrap();
        let err = store
            .update_profile(
                other.id,
                &ProfileUpdate {
                    email: Some("a@x.io".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_email_conflict());
    }

    #[tokio::test]
    async fn update_profile_keeps_untouched_fields() {
        let store = MemoryStore::new();
        let (account, _) = store.sync_identity(&identity("g-1", Some("a@x.io"))).await.unwrap();

        let updated = store
            .update_profile(
                account.id,
                &ProfileUpdate {
                    name: Some("New Name".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("New Name"));
        assert_eq!(updated.email.as_deref(), Some("a@x.io"));
    }

    #[tokio::test]
    async fn duplicate_balance_insert_conflicts() {
        let store = MemoryStore::new();
        let (account, _) = store.sync_identity(&identity("g-1", None)).await.unwrap();

        store.insert_balance(account.id, CreditBalance::full(3)).await.unwrap();
        let err = store
            .insert_balance(account.id, CreditBalance::full(3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn balance_for_unknown_account_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_balance(AccountId::new(99).unwrap(), CreditBalance::full(3))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownAccount);
    }

    #[tokio::test]
    async fn consume_is_conditional() {
        let store = MemoryStore::new();
        let (account, _) = store.sync_identity(&identity("g-1", None)).await.unwrap();
        store
            .insert_balance(account.id, CreditBalance { current: 1, max: 3 })
            .await
            .unwrap();

        let first = store.consume(account.id, 1).await.unwrap();
        assert_eq!(
            first,
            Consumption::Applied {
                before: CreditBalance { current: 1, max: 3 },
                after: CreditBalance { current: 0, max: 3 },
            }
        );

        let second = store.consume(account.id, 1).await.unwrap();
        assert_eq!(second, Consumption::Insufficient(CreditBalance { current: 0, max: 3 }));
    }

    #[tokio::test]
    async fn refund_is_capped_at_max() {
        let store = MemoryStore::new();
        let (account, _) = store.sync_identity(&identity("g-1", None)).await.unwrap();
        store
            .insert_balance(account.id, CreditBalance { current: 1, max: 3 })
            .await
            .unwrap();

        assert_eq!(
            store.refund(account.id, 1).await.unwrap(),
            CreditBalance { current: 2, max: 3 }
        );
        assert_eq!(
            store.refund(account.id, 5).await.unwrap(),
            CreditBalance { current: 3, max: 3 }
        );
        assert_eq!(
            store.refund(AccountId::new(999).unwrap(), 1).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn list_consumption_newest_first() {
        let store = MemoryStore::new();
        let (account, _) = store.sync_identity(&identity("g-1", None)).await.unwrap();
        let full = CreditBalance::full(3);

        for amount in 1..=3 {
            let after = CreditBalance {
                current: 3 - amount,
                max: 3,
            };
            store
                .append_consumption(&ConsumptionRecord::new(account.id, amount, full, after))
                .await
                .unwrap();
        }

        let records = store.list_consumption(account.id, 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 3);
        assert_eq!(records[1].amount, 2);
    }
}

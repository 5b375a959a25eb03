use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::errors::LedgerError;
use crate::ledger::model::{AccountState, Transaction, UserAccount};
use crate::ledger::CreditStore;

/// Process-local store. Balances vanish on restart.
pub struct InMemoryCreditStore {
    free_tier_credits: u64,
    accounts: DashMap<String, Arc<Mutex<AccountState>>>,
}

impl InMemoryCreditStore {
    pub fn new(free_tier_credits: u64) -> Self {
        Self {
            free_tier_credits,
            accounts: DashMap::new(),
        }
    }

    fn entry(&self, user_id: &str) -> Arc<Mutex<AccountState>> {
        // clone the Arc so the shard lock is released before the account lock is taken
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::info!(user_id, credits = self.free_tier_credits, "provisioned account");
                Arc::new(Mutex::new(AccountState::new(
                    user_id,
                    UserAccount::provision(self.free_tier_credits),
                    Vec::new(),
                )))
            })
            .clone()
    }
}

impl CreditStore for InMemoryCreditStore {
    fn account(&self, user_id: &str) -> Result<UserAccount, LedgerError> {
        Ok(self.entry(user_id).lock().account.clone())
    }

    fn debit(&self, user_id: &str, amount: u64, reason: &str) -> Result<u64, LedgerError> {
        let entry = self.entry(user_id);
        let mut state = entry.lock();
        let tx = state.prepare_debit(amount, reason)?;
        let balance = state.commit(tx);
        tracing::info!(user_id, amount, reason, balance, "debited credits");
        Ok(balance)
    }

    fn credit(
        &self,
        user_id: &str,
        amount: u64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<u64, LedgerError> {
        let entry = self.entry(user_id);
        let mut state = entry.lock();
        let tx = state.prepare_credit(amount, reason, reference)?;
        let balance = state.commit(tx);
        tracing::info!(user_id, amount, reason, balance, "credited credits");
        Ok(balance)
    }

    fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.entry(user_id).lock().recent(limit))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn new_users_start_with_free_tier_and_no_history() {
        let store = InMemoryCreditStore::new(10);
        assert_eq!(store.account("alice").unwrap().credits, 10);
        assert!(store.list_transactions("alice", 10).unwrap().is_empty());
    }

    #[test]
    fn failed_debit_leaves_balance_untouched() {
        let store = InMemoryCreditStore::new(1);
        let err = store.debit("bob", 2, "summary:detailed").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCredits { required: 2, current: 1 }));
        assert_eq!(store.account("bob").unwrap().credits, 1);
        assert!(store.list_transactions("bob", 10).unwrap().is_empty());
    }

    #[test]
    fn concurrent_debits_spend_balance_exactly_once() {
        let store = Arc::new(InMemoryCreditStore::new(5));
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.debit("carol", 5, "summary:brief")
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InsufficientCredits { .. }))));
        assert_eq!(store.account("carol").unwrap().credits, 0);
        assert_eq!(store.list_transactions("carol", 10).unwrap().len(), 1);
    }

    #[test]
    fn users_are_isolated_and_history_is_newest_first() {
        let store = InMemoryCreditStore::new(3);
        store.credit("dave", 100, "purchase", Some("cs_1")).unwrap();
        store.debit("dave", 2, "summary:detailed").unwrap();
        store.debit("erin", 1, "summary:brief").unwrap();
        let history = store.list_transactions("dave", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, "summary:detailed");
        assert_eq!(history[0].balance_after, 101);
        assert_eq!(store.list_transactions("dave", 1).unwrap().len(), 1);
        assert_eq!(store.account("erin").unwrap().credits, 2);
    }
}

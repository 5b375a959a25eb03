use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::LedgerError;

pub mod file;
pub mod memory;
pub mod model;

use model::{Transaction, UserAccount};

/// Per-user credit balances with an append-only transaction log.
///
/// Implementations must make `debit` and `credit` linearizable per user: two
/// concurrent calls for the same user never observe the same starting balance.
pub trait CreditStore: Send + Sync {
    fn account(&self, user_id: &str) -> Result<UserAccount, LedgerError>;

    fn get_balance(&self, user_id: &str) -> Result<u64, LedgerError> {
        self.account(user_id).map(|a| a.credits)
    }

    fn debit(&self, user_id: &str, amount: u64, reason: &str) -> Result<u64, LedgerError>;

    fn credit(
        &self,
        user_id: &str,
        amount: u64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<u64, LedgerError>;

    /// Most recent first.
    fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>, LedgerError>;

    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    Memory,
    File,
}

pub fn build_store(
    kind: StoreKind,
    data_dir: PathBuf,
    free_tier_credits: u64,
) -> Result<Arc<dyn CreditStore>, LedgerError> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(memory::InMemoryCreditStore::new(free_tier_credits))),
        StoreKind::File => Ok(Arc::new(file::FileCreditStore::open(data_dir, free_tier_credits)?)),
    }
}

#[derive(Debug, Clone)]
pub struct BalanceView {
    pub account: UserAccount,
    /// True when the store failed and the free-tier default was substituted.
    pub fallback: bool,
}

/// The one place a storage failure on a balance read becomes the free-tier default.
pub fn balance_or_default(store: &dyn CreditStore, user_id: &str, free_tier_credits: u64) -> BalanceView {
    match store.account(user_id) {
        Ok(account) => BalanceView {
            account,
            fallback: false,
        },
        Err(e) => {
            tracing::warn!(user_id, error = %e, backend = store.backend(), "balance read failed, using free-tier default");
            BalanceView {
                account: UserAccount::provision(free_tier_credits),
                fallback: true,
            }
        }
    }
}

/// Balance-only variant of [`balance_or_default`] for the pre-summary credit check.
pub fn credits_or_default(store: &dyn CreditStore, user_id: &str, free_tier_credits: u64) -> (u64, bool) {
    match store.get_balance(user_id) {
        Ok(credits) => (credits, false),
        Err(e) => {
            tracing::warn!(user_id, error = %e, backend = store.backend(), "balance read failed, using free-tier default");
            (free_tier_credits, true)
        }
    }
}

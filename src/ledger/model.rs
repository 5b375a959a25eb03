use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Some(SubscriptionTier::Free),
            "BASIC" => Some(SubscriptionTier::Basic),
            "PRO" => Some(SubscriptionTier::Pro),
            "ENTERPRISE" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "FREE",
            SubscriptionTier::Basic => "BASIC",
            SubscriptionTier::Pro => "PRO",
            SubscriptionTier::Enterprise => "ENTERPRISE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub credits: u64,
    pub subscription_tier: SubscriptionTier,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserAccount {
    pub fn provision(free_tier_credits: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            credits: free_tier_credits,
            subscription_tier: SubscriptionTier::Free,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub balance_after: u64,
}

/// One user's balance plus its append-only log, oldest first.
#[derive(Debug)]
pub struct AccountState {
    pub user_id: String,
    pub account: UserAccount,
    pub transactions: Vec<Transaction>,
}

impl AccountState {
    pub fn new(user_id: &str, account: UserAccount, transactions: Vec<Transaction>) -> Self {
        Self {
            user_id: user_id.to_string(),
            account,
            transactions,
        }
    }

    /// Computes the debit without mutating; callers persist first, then `commit`.
    pub fn prepare_debit(&self, amount: u64, reason: &str) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let current = self.account.credits;
        let balance_after = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientCredits {
                required: amount,
                current,
            })?;
        Ok(self.record(TransactionKind::Debit, amount, reason, None, balance_after))
    }

    pub fn prepare_credit(
        &self,
        amount: u64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if let Some(r) = reference {
            if self.has_reference(r) {
                return Err(LedgerError::DuplicateReference(r.to_string()));
            }
        }
        let balance_after = self
            .account
            .credits
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Storage("balance overflow".into()))?;
        Ok(self.record(
            TransactionKind::Credit,
            amount,
            reason,
            reference.map(str::to_string),
            balance_after,
        ))
    }

    pub fn commit(&mut self, tx: Transaction) -> u64 {
        self.account.credits = tx.balance_after;
        self.account.updated_at = tx.timestamp;
        self.transactions.push(tx);
        self.account.credits
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.reference.as_deref() == Some(reference))
    }

    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        self.transactions.iter().rev().take(limit).cloned().collect()
    }

    fn record(
        &self,
        kind: TransactionKind,
        amount: u64,
        reason: &str,
        reference: Option<String>,
        balance_after: u64,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            kind,
            amount,
            reason: reason.to_string(),
            reference,
            timestamp: OffsetDateTime::now_utc(),
            balance_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(credits: u64) -> AccountState {
        AccountState::new("u1", UserAccount::provision(credits), Vec::new())
    }

    #[test]
    fn debit_beyond_balance_is_rejected_without_change() {
        let s = state(1);
        match s.prepare_debit(2, "summary:brief") {
            Err(LedgerError::InsufficientCredits { required, current }) => {
                assert_eq!((required, current), (2, 1));
            }
            other => panic!("expected insufficient credits, got {other:?}"),
        }
        assert_eq!(s.account.credits, 1);
        assert!(s.transactions.is_empty());
    }

    #[test]
    fn commit_applies_balance_and_appends() {
        let mut s = state(5);
        let tx = s.prepare_debit(5, "summary:detailed").unwrap();
        assert_eq!(s.commit(tx), 0);
        let tx = s.prepare_credit(3, "purchase", Some("cs_1")).unwrap();
        assert_eq!(s.commit(tx), 3);
        let recent = s.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, TransactionKind::Credit);
        assert_eq!(recent[0].balance_after, 3);
        assert_eq!(recent[1].kind, TransactionKind::Debit);
    }

    #[test]
    fn zero_amounts_and_duplicate_references_are_rejected() {
        let mut s = state(5);
        assert!(matches!(s.prepare_debit(0, "x"), Err(LedgerError::InvalidAmount)));
        assert!(matches!(s.prepare_credit(0, "x", None), Err(LedgerError::InvalidAmount)));
        let tx = s.prepare_credit(1, "purchase", Some("cs_9")).unwrap();
        s.commit(tx);
        assert!(matches!(
            s.prepare_credit(1, "purchase", Some("cs_9")),
            Err(LedgerError::DuplicateReference(_))
        ));
    }

    #[test]
    fn transaction_serializes_with_wire_names() {
        let s = state(2);
        let tx = s.prepare_debit(1, "summary:brief").unwrap();
        let v = serde_json::to_value(&tx).unwrap();
        assert_eq!(v["type"], "debit");
        assert_eq!(v["balanceAfter"], 1);
        assert!(v.get("reference").is_none());
        assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}

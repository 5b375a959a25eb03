use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::LedgerError;
use crate::ledger::model::{AccountState, Transaction, UserAccount};
use crate::ledger::CreditStore;

const ACCOUNT_FILE: &str = "account.json";
const LOG_FILE: &str = "transactions.jsonl";

/// Durable store: one directory per user holding `account.json` and an
/// append-only `transactions.jsonl`.
///
/// The log is authoritative. `account.json` is a snapshot rewritten after
/// each append; when it is missing or behind, the log wins on the next load.
pub struct FileCreditStore {
    root: PathBuf,
    free_tier_credits: u64,
    accounts: DashMap<String, Arc<Mutex<AccountState>>>,
}

impl FileCreditStore {
    pub fn open(root: PathBuf, free_tier_credits: u64) -> Result<Self, LedgerError> {
        fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), "opened file credit store");
        Ok(Self {
            root,
            free_tier_credits,
            accounts: DashMap::new(),
        })
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        self.root.join(format!("{:x}", hasher.finalize()))
    }

    fn entry(&self, user_id: &str) -> Result<Arc<Mutex<AccountState>>, LedgerError> {
        if let Some(e) = self.accounts.get(user_id) {
            return Ok(e.clone());
        }
        // load under the shard lock so two first-touches cannot both provision
        let entry = self
            .accounts
            .entry(user_id.to_string())
            .or_try_insert_with(|| self.load(user_id).map(|s| Arc::new(Mutex::new(s))))?;
        Ok(entry.clone())
    }

    fn load(&self, user_id: &str) -> Result<AccountState, LedgerError> {
        let dir = self.user_dir(user_id);
        let account_path = dir.join(ACCOUNT_FILE);
        let transactions = read_log(&dir.join(LOG_FILE))?;

        if !account_path.exists() {
            fs::create_dir_all(&dir)?;
            let mut account = UserAccount::provision(self.free_tier_credits);
            if let Some(last) = transactions.last() {
                tracing::warn!(user_id, "account document missing, rebuilding from transaction log");
                account.credits = last.balance_after;
                account.updated_at = last.timestamp;
            }
            write_atomic(&account_path, &serde_json::to_vec_pretty(&account)?)?;
            tracing::info!(user_id, credits = account.credits, "provisioned account");
            return Ok(AccountState::new(user_id, account, transactions));
        }

        let mut account: UserAccount = serde_json::from_slice(&fs::read(&account_path)?)?;
        if let Some(last) = transactions.last() {
            if last.timestamp > account.updated_at {
                tracing::warn!(user_id, "account document behind transaction log, reconciling");
                account.credits = last.balance_after;
                account.updated_at = last.timestamp;
            }
        }
        Ok(AccountState::new(user_id, account, transactions))
    }

    fn append(&self, user_id: &str, tx: &Transaction) -> Result<(), LedgerError> {
        let mut line = serde_json::to_vec(tx)?;
        line.push(b'\n');
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.user_dir(user_id).join(LOG_FILE))?;
        log.write_all(&line)?;
        log.sync_data()?;
        Ok(())
    }

    fn snapshot(&self, state: &AccountState) -> Result<(), LedgerError> {
        let path = self.user_dir(&state.user_id).join(ACCOUNT_FILE);
        write_atomic(&path, &serde_json::to_vec_pretty(&state.account)?)
    }

    fn apply<F>(&self, user_id: &str, prepare: F) -> Result<u64, LedgerError>
    where
        F: FnOnce(&AccountState) -> Result<Transaction, LedgerError>,
    {
        let entry = self.entry(user_id)?;
        let mut state = entry.lock();
        let tx = prepare(&state)?;
        // once the log line is durable the transaction has happened
        self.append(user_id, &tx)?;
        let balance = state.commit(tx);
        if let Err(e) = self.snapshot(&state) {
            tracing::warn!(user_id, error = %e, "account snapshot write failed, log remains authoritative");
        }
        Ok(balance)
    }
}

impl CreditStore for FileCreditStore {
    fn account(&self, user_id: &str) -> Result<UserAccount, LedgerError> {
        Ok(self.entry(user_id)?.lock().account.clone())
    }

    fn debit(&self, user_id: &str, amount: u64, reason: &str) -> Result<u64, LedgerError> {
        let balance = self.apply(user_id, |s| s.prepare_debit(amount, reason))?;
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
        let balance = self.apply(user_id, |s| s.prepare_credit(amount, reason, reference))?;
        tracing::info!(user_id, amount, reason, balance, "credited credits");
        Ok(balance)
    }

    fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.entry(user_id)?.lock().recent(limit))
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

fn read_log(path: &Path) -> Result<Vec<Transaction>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Transaction>(&line) {
            Ok(tx) => out.push(tx),
            Err(e) => {
                // a torn final write is the only expected corruption
                tracing::warn!(path = %path.display(), line = n + 1, error = %e, "skipping unreadable log line");
            }
        }
    }
    Ok(out)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

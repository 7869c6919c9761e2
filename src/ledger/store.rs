use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::models::{DepositBatch, EntryKind, LedgerEntry};

/// Seam to the host ledger. The ledger is never created or mutated by
/// this system except through create_deposit, which flips the included
/// entries' availability.
///
/// Implementations must normalize availability to a real bool at this
/// boundary - string-encoded flags never cross into the engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Entries whose human document number equals `doc_number`,
    /// restricted to one entry kind, in store order.
    async fn find_by_doc_number(
        &self,
        doc_number: &str,
        kind: EntryKind,
    ) -> AppResult<Vec<LedgerEntry>>;

    /// Payment-kind entries matching either the authorization code or
    /// the transaction's own external id, capped at `limit` rows.
    async fn search_by_auth_or_external_id(
        &self,
        auth_code: Option<&str>,
        external_id: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<LedgerEntry>>;

    async fn get_entry(&self, id: &str) -> AppResult<Option<LedgerEntry>>;

    /// The account's current undeposited set. Owned by the external
    /// system and can shrink between match time and deposit time.
    async fn undeposited_entries(&self, account: &str) -> AppResult<Vec<LedgerEntry>>;

    /// Commit a deposit batch over the given entries and flip their
    /// availability off.
    async fn create_deposit(
        &self,
        account: &str,
        deposit_date: NaiveDate,
        memo: &str,
        entry_ids: &[String],
    ) -> AppResult<DepositBatch>;
}

/// In-memory ledger. Keeps entries in insertion order so "first result"
/// behaves like store order.
pub struct InMemoryLedger {
    entries: tokio::sync::RwLock<Vec<LedgerEntry>>,
    deposits: tokio::sync::RwLock<Vec<DepositBatch>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            entries: tokio::sync::RwLock::new(Vec::new()),
            deposits: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    pub async fn insert_entry(&self, entry: LedgerEntry) {
        let mut entries = self.entries.write().await;
        entries.push(entry);
    }

    pub async fn deposits(&self) -> Vec<DepositBatch> {
        self.deposits.read().await.clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn find_by_doc_number(
        &self,
        doc_number: &str,
        kind: EntryKind,
    ) -> AppResult<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.doc_number == doc_number && e.kind == kind)
            .cloned()
            .collect())
    }

    async fn search_by_auth_or_external_id(
        &self,
        auth_code: Option<&str>,
        external_id: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        let hits = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Payment)
            .filter(|e| {
                auth_code.is_some_and(|code| e.auth_code.as_deref() == Some(code))
                    || external_id.is_some_and(|ext| e.external_id.as_deref() == Some(ext))
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn get_entry(&self, id: &str) -> AppResult<Option<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn undeposited_entries(&self, _account: &str) -> AppResult<Vec<LedgerEntry>> {
        // The in-memory ledger models a single undeposited-funds pool;
        // the account only matters to the external system.
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.available_for_deposit)
            .cloned()
            .collect())
    }

    async fn create_deposit(
        &self,
        account: &str,
        deposit_date: NaiveDate,
        memo: &str,
        entry_ids: &[String],
    ) -> AppResult<DepositBatch> {
        if entry_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "Cannot create a deposit with no entries".to_string(),
            ));
        }

        let mut entries = self.entries.write().await;
        for id in entry_ids {
            let entry = entries
                .iter_mut()
                .find(|e| &e.id == id)
                .ok_or_else(|| AppError::NotFound(format!("Ledger entry {}", id)))?;
            entry.available_for_deposit = false;
        }

        let deposit = DepositBatch {
            deposit_ref: format!("DEP-{}", Uuid::new_v4()),
            account: account.to_string(),
            deposit_date,
            memo: memo.to_string(),
            entry_ids: entry_ids.to_vec(),
            created_at: Utc::now(),
        };

        let mut deposits = self.deposits.write().await;
        deposits.push(deposit.clone());
        info!(
            "Deposit {} committed to {} with {} entries",
            deposit.deposit_ref,
            account,
            entry_ids.len()
        );
        Ok(deposit)
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppResult, DepositError};
use crate::ledger::LedgerStore;
use crate::recon::engine::MatchResult;
use crate::store::models::{CreditDebit, DepositBatch, SettlementBatch};
use crate::store::SettlementRepository;

/// Groups validated matches into bank-deposit batches.
///
/// The ledger's undeposited set is the one resource shared with actors
/// outside this system. There is no cross-system lock, so grouping
/// re-derives the eligible set at deposit time and intersects it with
/// the matched set; a shrunk intersection is detected, never guessed
/// around.
pub struct DepositGrouper {
    ledger: Arc<dyn LedgerStore>,
    repo: Arc<SettlementRepository>,
}

impl DepositGrouper {
    pub fn new(ledger: Arc<dyn LedgerStore>, repo: Arc<SettlementRepository>) -> Self {
        Self { ledger, repo }
    }

    /// Initial grouping, invoked right after reconciliation. Returns
    /// None (without creating anything) when there is nothing safe to
    /// deposit; those cases are logged, not surfaced - the scheduled
    /// run has no operator to talk to.
    pub async fn create_deposit(
        &self,
        batch: &SettlementBatch,
        matched: &[MatchResult],
        account: &str,
    ) -> AppResult<Option<DepositBatch>> {
        if batch.credit_or_debit == CreditDebit::Debit {
            warn!(
                "Settlement {} is a debit; auto-deposit skipped, requires manual handling",
                batch.external_id
            );
            return Ok(None);
        }
        if matched.is_empty() {
            return Ok(None);
        }

        let by_entry: HashMap<String, uuid::Uuid> = matched
            .iter()
            .map(|m| (m.entry.id.clone(), m.txn_id))
            .collect();

        let selected = self.intersect_undeposited(account, &by_entry).await?;
        if selected.is_empty() {
            warn!(
                "Settlement {}: all {} matched entries left the undeposited set before grouping",
                batch.external_id,
                matched.len()
            );
            return Ok(None);
        }

        let deposit = self.commit(batch, account, &selected, &by_entry).await?;
        Ok(Some(deposit))
    }

    /// Supplementary grouping for entries matched after the initial
    /// deposit was posted (e.g. via manual match). Operator-invoked, so
    /// every failure mode is surfaced as an error instead of a silent
    /// None.
    pub async fn create_supplementary_deposit(
        &self,
        batch: &SettlementBatch,
        account: &str,
    ) -> AppResult<DepositBatch> {
        let pending: Vec<_> = self
            .repo
            .transactions_for_batch(batch.id)
            .await?
            .into_iter()
            .filter(|t| t.matched && !t.in_deposit)
            .collect();
        if pending.is_empty() {
            return Err(DepositError::NoPendingEntries.into());
        }

        let by_entry: HashMap<String, uuid::Uuid> = pending
            .iter()
            .filter_map(|t| t.ledger_entry_id.clone().map(|e| (e, t.id)))
            .collect();

        let selected = self.intersect_undeposited(account, &by_entry).await?;
        if selected.is_empty() {
            return Err(DepositError::EmptyIntersection.into());
        }

        self.commit(batch, account, &selected, &by_entry).await
    }

    /// Re-derive the account's undeposited set and keep only entries
    /// present in the matched map.
    async fn intersect_undeposited(
        &self,
        account: &str,
        by_entry: &HashMap<String, uuid::Uuid>,
    ) -> AppResult<Vec<String>> {
        let undeposited = self.ledger.undeposited_entries(account).await?;
        Ok(undeposited
            .into_iter()
            .filter(|e| by_entry.contains_key(&e.id))
            .map(|e| e.id)
            .collect())
    }

    async fn commit(
        &self,
        batch: &SettlementBatch,
        account: &str,
        entry_ids: &[String],
        by_entry: &HashMap<String, uuid::Uuid>,
    ) -> AppResult<DepositBatch> {
        let memo = format!(
            "Settlement {} ({})",
            batch.external_reference, batch.external_id
        );
        let deposit = self
            .ledger
            .create_deposit(account, batch.settlement_date, &memo, entry_ids)
            .await?;

        for entry_id in entry_ids {
            if let Some(txn_id) = by_entry.get(entry_id) {
                self.repo
                    .mark_in_deposit(*txn_id, &deposit.deposit_ref)
                    .await?;
            }
        }

        info!(
            "Settlement {}: deposit {} created with {} entries",
            batch.external_id,
            deposit.deposit_ref,
            entry_ids.len()
        );
        Ok(deposit)
    }
}

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::models::{ExternalTransaction, SettlementBatch};

/// Persistence for settlement batches and their child transactions.
///
/// The external-id uniqueness enforced in create_batch is what backs
/// the coordinator's at-most-once guarantee.
pub struct SettlementRepository {
    batches: tokio::sync::RwLock<HashMap<Uuid, SettlementBatch>>,
    transactions: tokio::sync::RwLock<HashMap<Uuid, ExternalTransaction>>,
}

impl SettlementRepository {
    pub fn new() -> Self {
        Self {
            batches: tokio::sync::RwLock::new(HashMap::new()),
            transactions: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_batch(&self, batch: SettlementBatch) -> AppResult<SettlementBatch> {
        let mut batches = self.batches.write().await;
        if batches.values().any(|b| b.external_id == batch.external_id) {
            return Err(AppError::Store(format!(
                "Settlement batch with external id {} already exists",
                batch.external_id
            )));
        }
        batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<SettlementBatch> {
        let batches = self.batches.read().await;
        batches
            .get(&batch_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Settlement batch {}", batch_id)))
    }

    /// Idempotency check: has a batch with this source-side id already
    /// been persisted?
    pub async fn exists_by_external_id(&self, external_id: &str) -> bool {
        let batches = self.batches.read().await;
        batches.values().any(|b| b.external_id == external_id)
    }

    pub async fn list_batches(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<SettlementBatch>> {
        let batches = self.batches.read().await;
        let mut rows: Vec<SettlementBatch> = batches
            .values()
            .filter(|b| from.is_none_or(|d| b.settlement_date >= d))
            .filter(|b| to.is_none_or(|d| b.settlement_date <= d))
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.settlement_date);
        Ok(rows)
    }

    pub async fn insert_transaction(
        &self,
        txn: ExternalTransaction,
    ) -> AppResult<ExternalTransaction> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(txn.id, txn.clone());
        Ok(txn)
    }

    pub async fn get_transaction(&self, txn_id: Uuid) -> AppResult<ExternalTransaction> {
        let transactions = self.transactions.read().await;
        transactions
            .get(&txn_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", txn_id)))
    }

    pub async fn transactions_for_batch(
        &self,
        batch_id: Uuid,
    ) -> AppResult<Vec<ExternalTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|t| t.batch_id == batch_id)
            .cloned()
            .collect())
    }

    pub async fn mark_matched(&self, txn_id: Uuid, entry_id: &str) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let txn = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", txn_id)))?;
        txn.matched = true;
        txn.ledger_entry_id = Some(entry_id.to_string());
        txn.match_error = None;
        Ok(())
    }

    pub async fn set_match_error(&self, txn_id: Uuid, reason: &str) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let txn = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", txn_id)))?;
        txn.matched = false;
        txn.ledger_entry_id = None;
        txn.match_error = Some(reason.to_string());
        Ok(())
    }

    pub async fn mark_in_deposit(&self, txn_id: Uuid, deposit_ref: &str) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let txn = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", txn_id)))?;
        if !txn.matched {
            return Err(AppError::Store(format!(
                "Transaction {} cannot enter a deposit before matching",
                txn_id
            )));
        }
        txn.in_deposit = true;
        txn.deposit_ref = Some(deposit_ref.to_string());
        Ok(())
    }

    /// Recompute the denormalized match statistics on a batch from a
    /// fresh scan of its children.
    pub async fn recompute_stats(&self, batch_id: Uuid) -> AppResult<SettlementBatch> {
        let (matched_count, unmatched_count, matched_amount) = {
            let transactions = self.transactions.read().await;
            let mut matched = 0u32;
            let mut unmatched = 0u32;
            let mut amount = Decimal::ZERO;
            for txn in transactions.values().filter(|t| t.batch_id == batch_id) {
                if txn.matched {
                    matched += 1;
                    amount += txn.amount;
                } else {
                    unmatched += 1;
                }
            }
            (matched, unmatched, amount)
        };

        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Settlement batch {}", batch_id)))?;
        batch.matched_count = matched_count;
        batch.unmatched_count = unmatched_count;
        batch.matched_amount = matched_amount;
        Ok(batch.clone())
    }

    /// Record a follow-up deposit on an already-processed batch. The
    /// batch keeps its original deposit ref when it has one, and any
    /// recorded error stays in place for the operator.
    pub async fn record_supplementary_deposit(
        &self,
        batch_id: Uuid,
        deposit_ref: &str,
    ) -> AppResult<SettlementBatch> {
        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Settlement batch {}", batch_id)))?;
        if batch.deposit_ref.is_none() {
            batch.deposit_ref = Some(deposit_ref.to_string());
        }
        Ok(batch.clone())
    }

    pub async fn mark_processed(
        &self,
        batch_id: Uuid,
        deposit_ref: Option<&str>,
        last_error: Option<&str>,
    ) -> AppResult<SettlementBatch> {
        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Settlement batch {}", batch_id)))?;
        batch.processed = true;
        batch.processed_at = Some(Utc::now());
        if let Some(dep) = deposit_ref {
            batch.deposit_ref = Some(dep.to_string());
        }
        batch.last_error = last_error.map(|e| e.to_string());
        Ok(batch.clone())
    }
}

impl Default for SettlementRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{CreditDebit, SettlementStatus, TransactionType};
    use rust_decimal_macros::dec;

    fn batch(external_id: &str) -> SettlementBatch {
        SettlementBatch {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            settlement_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            total_amount: dec!(120.00),
            currency: "USD".to_string(),
            status: SettlementStatus::Done,
            credit_or_debit: CreditDebit::Credit,
            external_reference: "REF-1".to_string(),
            merchant_id: "M1".to_string(),
            matched_count: 0,
            unmatched_count: 0,
            matched_amount: Decimal::ZERO,
            processed: false,
            processed_at: None,
            last_error: None,
            deposit_ref: None,
        }
    }

    fn txn(batch_id: Uuid, amount: Decimal) -> ExternalTransaction {
        ExternalTransaction {
            id: Uuid::new_v4(),
            batch_id,
            external_txn_id: Uuid::new_v4().to_string(),
            external_reference: "1001".to_string(),
            amount,
            currency: "USD".to_string(),
            txn_type: TransactionType::Purchase,
            payment_method: None,
            auth_code: None,
            occurred_at: Utc::now(),
            matched: false,
            match_error: None,
            ledger_entry_id: None,
            in_deposit: false,
            deposit_ref: None,
        }
    }

    #[tokio::test]
    async fn duplicate_external_id_rejected() {
        let repo = SettlementRepository::new();
        repo.create_batch(batch("S1")).await.unwrap();
        assert!(repo.create_batch(batch("S1")).await.is_err());
        assert!(repo.exists_by_external_id("S1").await);
        assert!(!repo.exists_by_external_id("S2").await);
    }

    #[tokio::test]
    async fn recompute_matches_fresh_scan_after_manual_match() {
        let repo = SettlementRepository::new();
        let b = repo.create_batch(batch("S1")).await.unwrap();

        let t1 = repo.insert_transaction(txn(b.id, dec!(100.00))).await.unwrap();
        let t2 = repo.insert_transaction(txn(b.id, dec!(20.00))).await.unwrap();
        repo.set_match_error(t1.id, "no match").await.unwrap();
        repo.set_match_error(t2.id, "no match").await.unwrap();

        let stats = repo.recompute_stats(b.id).await.unwrap();
        assert_eq!(stats.matched_count, 0);
        assert_eq!(stats.unmatched_count, 2);

        // Operator binds t1 to a ledger entry
        repo.mark_matched(t1.id, "E1").await.unwrap();
        let stats = repo.recompute_stats(b.id).await.unwrap();
        assert_eq!(stats.matched_count, 1);
        assert_eq!(stats.unmatched_count, 1);
        assert_eq!(stats.matched_amount, dec!(100.00));
    }

    #[tokio::test]
    async fn supplementary_deposit_keeps_original_ref_and_error() {
        let repo = SettlementRepository::new();
        let b = repo.create_batch(batch("S1")).await.unwrap();
        repo.mark_processed(b.id, Some("DEP-1"), Some("partial failure"))
            .await
            .unwrap();

        let updated = repo.record_supplementary_deposit(b.id, "DEP-2").await.unwrap();
        assert_eq!(updated.deposit_ref.as_deref(), Some("DEP-1"));
        assert_eq!(updated.last_error.as_deref(), Some("partial failure"));

        // A batch whose first deposit never happened picks up the ref
        let b2 = repo.create_batch(batch("S2")).await.unwrap();
        repo.mark_processed(b2.id, None, Some("deposit failed"))
            .await
            .unwrap();
        let updated = repo.record_supplementary_deposit(b2.id, "DEP-3").await.unwrap();
        assert_eq!(updated.deposit_ref.as_deref(), Some("DEP-3"));
        assert_eq!(updated.last_error.as_deref(), Some("deposit failed"));
    }

    #[tokio::test]
    async fn in_deposit_requires_matched() {
        let repo = SettlementRepository::new();
        let b = repo.create_batch(batch("S1")).await.unwrap();
        let t = repo.insert_transaction(txn(b.id, dec!(10.00))).await.unwrap();

        assert!(repo.mark_in_deposit(t.id, "DEP-X").await.is_err());
        repo.mark_matched(t.id, "E1").await.unwrap();
        repo.mark_in_deposit(t.id, "DEP-X").await.unwrap();

        let stored = repo.get_transaction(t.id).await.unwrap();
        assert!(stored.in_deposit);
        assert_eq!(stored.deposit_ref.as_deref(), Some("DEP-X"));
    }
}

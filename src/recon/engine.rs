use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::recon::locator::EntryLocator;
use crate::recon::validator::{validate, MatchDecision};
use crate::store::models::{ExternalTransaction, LedgerEntry, SettlementBatch, TransactionType};
use crate::store::SettlementRepository;

pub const REFUND_REASON: &str = "refunds require manual handling";

/// A settlement transaction successfully bound to a ledger entry.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub txn_id: Uuid,
    pub entry: LedgerEntry,
}

/// A settlement transaction that could not be auto-matched.
#[derive(Debug, Clone)]
pub struct UnmatchedResult {
    pub txn_id: Uuid,
    pub external_txn_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReconOutcome {
    pub matched: Vec<MatchResult>,
    pub unmatched: Vec<UnmatchedResult>,
}

/// Orchestrates locator + validator over one settlement batch.
///
/// Every incoming line is persisted before matching so the batch is
/// auditable even when nothing matches. One write per transaction;
/// NOT idempotent - re-running the same batch would duplicate rows,
/// which the coordinator's at-most-once check prevents upstream.
pub struct ReconEngine {
    locator: EntryLocator,
    repo: Arc<SettlementRepository>,
}

impl ReconEngine {
    pub fn new(locator: EntryLocator, repo: Arc<SettlementRepository>) -> Self {
        Self { locator, repo }
    }

    /// Process transactions one at a time (no concurrent matching, so
    /// two lines can never race on the same ledger entry within a
    /// batch) and partition them into matched/unmatched.
    pub async fn reconcile_batch(
        &self,
        txns: Vec<ExternalTransaction>,
        batch: &SettlementBatch,
    ) -> AppResult<ReconOutcome> {
        info!(
            "Reconciling settlement {} with {} transactions",
            batch.external_id,
            txns.len()
        );

        let mut outcome = ReconOutcome::default();

        for txn in txns {
            let txn = self.repo.insert_transaction(txn).await?;

            if txn.txn_type == TransactionType::Refund {
                self.repo.set_match_error(txn.id, REFUND_REASON).await?;
                outcome.unmatched.push(UnmatchedResult {
                    txn_id: txn.id,
                    external_txn_id: txn.external_txn_id.clone(),
                    reason: REFUND_REASON.to_string(),
                });
                continue;
            }

            let candidate = self.locator.locate(&txn).await?;
            match validate(candidate.as_ref(), &txn) {
                MatchDecision::Valid => {
                    // validate only passes when a candidate exists
                    let entry = candidate.expect("valid decision implies candidate");
                    self.repo.mark_matched(txn.id, &entry.id).await?;
                    outcome.matched.push(MatchResult {
                        txn_id: txn.id,
                        entry,
                    });
                }
                MatchDecision::Invalid { reason } => {
                    warn!(
                        "Transaction {} unmatched: {}",
                        txn.external_txn_id, reason
                    );
                    self.repo.set_match_error(txn.id, &reason).await?;
                    outcome.unmatched.push(UnmatchedResult {
                        txn_id: txn.id,
                        external_txn_id: txn.external_txn_id.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Settlement {}: {} matched, {} unmatched",
            batch.external_id,
            outcome.matched.len(),
            outcome.unmatched.len()
        );
        Ok(outcome)
    }
}

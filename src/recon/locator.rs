use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;
use crate::ledger::LedgerStore;
use crate::recon::validator::{cleaned_reference, AMOUNT_TOLERANCE};
use crate::store::models::{EntryKind, ExternalTransaction, LedgerEntry};

/// Result window for the auth-code / external-id fallback query.
const SEARCH_WINDOW: usize = 10;

/// Resolves an external transaction to zero-or-one candidate ledger
/// entries via an ordered strategy chain. First success wins; ambiguity
/// is never resolved by guessing.
pub struct EntryLocator {
    ledger: Arc<dyn LedgerStore>,
}

impl EntryLocator {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn locate(&self, txn: &ExternalTransaction) -> AppResult<Option<LedgerEntry>> {
        if let Some(entry) = self.by_reference(txn).await? {
            return Ok(Some(entry));
        }
        self.by_auth_or_external_id(txn).await
    }

    /// Strategy 1: cleaned external reference as a ledger document
    /// number, payment kind first, cash-sale kind as fallback. Takes
    /// the first row in store order - multiple reference hits are not
    /// disambiguated at this stage.
    async fn by_reference(&self, txn: &ExternalTransaction) -> AppResult<Option<LedgerEntry>> {
        let doc_number = cleaned_reference(&txn.external_reference);
        if doc_number.is_empty() {
            return Ok(None);
        }

        let hits = self
            .ledger
            .find_by_doc_number(&doc_number, EntryKind::Payment)
            .await?;
        if let Some(entry) = hits.into_iter().next() {
            debug!("Reference lookup hit payment {} for doc {}", entry.id, doc_number);
            return Ok(Some(entry));
        }

        let hits = self
            .ledger
            .find_by_doc_number(&doc_number, EntryKind::CashSale)
            .await?;
        Ok(hits.into_iter().next())
    }

    /// Strategy 2: auth code or the transaction's own external id,
    /// payment kind only. A single candidate is accepted
    /// unconditionally; among multiple candidates only an
    /// amount-tolerant one is accepted.
    async fn by_auth_or_external_id(
        &self,
        txn: &ExternalTransaction,
    ) -> AppResult<Option<LedgerEntry>> {
        let auth_code = txn
            .auth_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let external_id = Some(txn.external_txn_id.trim()).filter(|s| !s.is_empty());

        if auth_code.is_none() && external_id.is_none() {
            return Ok(None);
        }

        let mut hits = self
            .ledger
            .search_by_auth_or_external_id(auth_code, external_id, SEARCH_WINDOW)
            .await?;

        if hits.len() == 1 {
            return Ok(Some(hits.remove(0)));
        }

        Ok(hits
            .into_iter()
            .find(|e| (e.amount - txn.amount).abs() <= AMOUNT_TOLERANCE))
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::store::models::{ExternalTransaction, LedgerEntry};

/// Maximum allowed absolute difference between a settlement
/// transaction's amount and its matched ledger entry's amount, in the
/// reference currency unit. A single global - currency-aware tolerance
/// is out of scope.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// Outcome of validating a candidate match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    Valid,
    Invalid { reason: String },
}

impl MatchDecision {
    pub fn is_valid(&self) -> bool {
        matches!(self, MatchDecision::Valid)
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        MatchDecision::Invalid {
            reason: reason.into(),
        }
    }
}

/// Decide whether a candidate ledger entry is postable against a
/// settlement transaction. Pure: no side effects, deterministic for
/// equal inputs. Rules run in order, first failure wins.
pub fn validate(entry: Option<&LedgerEntry>, txn: &ExternalTransaction) -> MatchDecision {
    let entry = match entry {
        Some(entry) => entry,
        None => {
            return MatchDecision::invalid(format!(
                "no matching ledger entry (searched doc number '{}', auth code '{}', external id '{}')",
                cleaned_reference(&txn.external_reference),
                txn.auth_code.as_deref().unwrap_or(""),
                txn.external_txn_id,
            ));
        }
    };

    if !entry.available_for_deposit {
        return MatchDecision::invalid(format!(
            "entry {} already deposited",
            entry.doc_number
        ));
    }

    let diff = (entry.amount - txn.amount).abs();
    if diff > AMOUNT_TOLERANCE {
        return MatchDecision::invalid(format!(
            "amount mismatch: entry {} has {} but transaction amount is {}",
            entry.doc_number, entry.amount, txn.amount
        ));
    }

    MatchDecision::Valid
}

/// Strip everything but ASCII digits from a raw external reference.
pub fn cleaned_reference(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

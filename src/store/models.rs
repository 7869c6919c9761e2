use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a settlement batch as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Done,
    Void,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Done => "done",
            SettlementStatus::Void => "void",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of money movement for a settlement.
/// Debit settlements are never auto-deposited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditDebit {
    Credit,
    Debit,
}

/// Transaction type within a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Refund,
    Auth,
    Complete,
    Void,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Refund => "refund",
            TransactionType::Auth => "auth",
            TransactionType::Complete => "complete",
            TransactionType::Void => "void",
        }
    }
}

/// Eligible ledger entry kinds for reference lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Payment,
    CashSale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
}

/// Schedule descriptor on a merchant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: ScheduleFrequency,
    /// Only consulted for weekly schedules
    pub day_of_week: Option<Weekday>,
    /// UTC hour (0-23) the run should fire
    pub hour: u32,
}

/// API credential pair for the settlement source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCredentials {
    pub api_login: String,
    pub api_key: String,
}

/// One merchant configuration - a credential set plus deposit target
/// and scheduling metadata. Mutated by the coordinator only to record
/// last-run bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub id: Uuid,
    pub name: String,
    pub credentials: SourceCredentials,
    /// Merchant/customer filter passed through to the source
    pub merchant_filter: Option<String>,
    /// Target deposit account for grouped matches
    pub deposit_account: String,
    /// Fetch window length in days
    pub lookback_days: i64,
    pub active: bool,
    pub schedule: Option<Schedule>,
    pub notify_email: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<String>,
}

/// One external settlement, persisted on first observation with status
/// "done". Immutable after creation except for the derived match
/// statistics below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub id: Uuid,
    /// Unique source-side key; at-most-once processing hangs off this
    pub external_id: String,
    pub settlement_date: NaiveDate,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: SettlementStatus,
    pub credit_or_debit: CreditDebit,
    pub external_reference: String,
    pub merchant_id: String,

    // Derived, recomputed wholesale after matching or a manual match
    pub matched_count: u32,
    pub unmatched_count: u32,
    pub matched_amount: Decimal,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub deposit_ref: Option<String>,
}

/// One line within a settlement batch.
///
/// Invariants: matched implies ledger_entry_id is set; in_deposit
/// implies matched and deposit_ref set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTransaction {
    pub id: Uuid,
    /// Owning settlement batch
    pub batch_id: Uuid,
    pub external_txn_id: String,
    /// Expected to encode a ledger document number
    pub external_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub txn_type: TransactionType,
    pub payment_method: Option<String>,
    pub auth_code: Option<String>,
    pub occurred_at: DateTime<Utc>,

    // Set by reconciliation
    pub matched: bool,
    pub match_error: Option<String>,
    pub ledger_entry_id: Option<String>,
    pub in_deposit: bool,
    pub deposit_ref: Option<String>,
}

/// A payment-like record in the host ledger. Read-mostly: never created
/// here, only flipped to unavailable when swept into a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    /// Human-readable document number
    pub doc_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub available_for_deposit: bool,
    pub kind: EntryKind,
    /// Card-processor authorization code recorded on the payment, if any
    pub auth_code: Option<String>,
    /// Source-side transaction id recorded on the payment, if any
    pub external_id: Option<String>,
}

/// A grouping of ledger entries posted as one bank deposit. Immutable
/// once created; later entries go into a new supplementary batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositBatch {
    pub deposit_ref: String,
    pub account: String,
    pub deposit_date: NaiveDate,
    pub memo: String,
    pub entry_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::ledger::LedgerStore;
use crate::recon::{validate, BatchCoordinator, DepositGrouper, MatchDecision, RunStats};
use crate::store::models::{
    DepositBatch, ExternalTransaction, MerchantConfig, Schedule, SettlementBatch,
    SourceCredentials,
};
use crate::store::{ConfigRepository, SettlementRepository};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub repo: Arc<SettlementRepository>,
    pub configs: Arc<ConfigRepository>,
    pub ledger: Arc<dyn LedgerStore>,
    pub grouper: Arc<DepositGrouper>,
    pub coordinator: Arc<BatchCoordinator>,
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn list_settlements(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<SettlementBatch>>> {
    let batches = state.repo.list_batches(range.from, range.to).await?;
    Ok(Json(batches))
}

#[derive(Debug, Serialize)]
pub struct SettlementDetailResponse {
    pub settlement: SettlementBatch,
    pub transactions: Vec<ExternalTransaction>,
}

pub async fn get_settlement(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<SettlementDetailResponse>> {
    let settlement = state.repo.get_batch(batch_id).await?;
    let transactions = state.repo.transactions_for_batch(batch_id).await?;
    Ok(Json(SettlementDetailResponse {
        settlement,
        transactions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ManualMatchRequest {
    pub transaction_id: Uuid,
    pub entry_id: String,
}

/// Bind one unmatched transaction to an operator-chosen ledger entry.
/// The candidate still has to pass validation, and the owning batch's
/// statistics are recomputed afterwards.
pub async fn manual_match(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<ManualMatchRequest>,
) -> AppResult<Json<SettlementBatch>> {
    let txn = state.repo.get_transaction(request.transaction_id).await?;
    if txn.batch_id != batch_id {
        return Err(AppError::InvalidInput(format!(
            "Transaction {} does not belong to settlement {}",
            request.transaction_id, batch_id
        )));
    }

    let entry = state
        .ledger
        .get_entry(&request.entry_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ledger entry {}", request.entry_id)))?;

    match validate(Some(&entry), &txn) {
        MatchDecision::Valid => {}
        MatchDecision::Invalid { reason } => return Err(AppError::InvalidInput(reason)),
    }

    state.repo.mark_matched(txn.id, &entry.id).await?;
    let batch = state.repo.recompute_stats(batch_id).await?;
    info!(
        "Manual match: transaction {} bound to entry {} on settlement {}",
        txn.external_txn_id, entry.id, batch.external_id
    );
    Ok(Json(batch))
}

#[derive(Debug, Deserialize, Default)]
pub struct SupplementaryDepositRequest {
    /// Overrides the configuration's deposit account when set
    pub account: Option<String>,
}

pub async fn supplementary_deposit(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<SupplementaryDepositRequest>,
) -> AppResult<Json<DepositBatch>> {
    let batch = state.repo.get_batch(batch_id).await?;
    let account = match request.account {
        Some(account) => account,
        None => {
            state
                .configs
                .find_for_merchant(&batch.merchant_id)
                .await?
                .deposit_account
        }
    };

    let deposit = state
        .grouper
        .create_supplementary_deposit(&batch, &account)
        .await?;
    state
        .repo
        .record_supplementary_deposit(batch_id, &deposit.deposit_ref)
        .await?;
    Ok(Json(deposit))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRunRequest {
    #[serde(default)]
    pub config_ids: Vec<Uuid>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub budget: Option<u32>,
}

/// Ad-hoc fetch for an explicit date range and configuration
/// selection; no schedule gate.
pub async fn trigger_run(
    State(state): State<AppState>,
    Json(request): Json<TriggerRunRequest>,
) -> AppResult<Json<RunStats>> {
    if request.from > request.to {
        return Err(AppError::InvalidInput(
            "from must not be after to".to_string(),
        ));
    }
    let budget = request.budget.unwrap_or(state.config.run_budget);
    let stats = state
        .coordinator
        .run_adhoc(&request.config_ids, request.from, request.to, budget)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct CreateConfigRequest {
    pub name: String,
    pub api_login: String,
    pub api_key: String,
    pub merchant_filter: Option<String>,
    pub deposit_account: String,
    pub lookback_days: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub schedule: Option<Schedule>,
    pub notify_email: Option<String>,
}

fn default_active() -> bool {
    true
}

pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> AppResult<Json<MerchantConfig>> {
    if request.lookback_days <= 0 {
        return Err(AppError::InvalidInput(
            "lookback_days must be positive".to_string(),
        ));
    }
    let config = MerchantConfig {
        id: Uuid::new_v4(),
        name: request.name,
        credentials: SourceCredentials {
            api_login: request.api_login,
            api_key: request.api_key,
        },
        merchant_filter: request.merchant_filter,
        deposit_account: request.deposit_account,
        lookback_days: request.lookback_days,
        active: request.active,
        schedule: request.schedule,
        notify_email: request.notify_email,
        last_run_at: None,
        last_run_status: None,
    };
    let created = state.configs.create(config).await?;
    Ok(Json(created))
}

pub async fn list_configs(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MerchantConfig>>> {
    Ok(Json(state.configs.list().await?))
}

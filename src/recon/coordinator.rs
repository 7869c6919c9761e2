use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::notify::{render_run_summary, NotificationSink};
use crate::recon::deposit::DepositGrouper;
use crate::recon::engine::ReconEngine;
use crate::source::{SettlementSource, SettlementSummary};
use crate::store::models::{MerchantConfig, ScheduleFrequency, SettlementStatus};
use crate::store::{ConfigRepository, SettlementRepository};

/// Work units consumed per settlement processed.
const SETTLEMENT_COST: u32 = 10;
/// Below this remainder, the run stops rather than starting more work.
const LOW_WATER: u32 = 10;
/// Minimum interval between two runs of the same configuration.
const MIN_RERUN_MINUTES: i64 = 60;

pub const BUDGET_STOP_REASON: &str = "stopped due to low budget";

/// Caller-supplied processing quota. Checked cooperatively between
/// units of work; never preemptive.
#[derive(Debug, Clone)]
pub struct RunBudget {
    remaining: u32,
}

impl RunBudget {
    pub fn new(units: u32) -> Self {
        Self { remaining: units }
    }

    pub fn is_low(&self) -> bool {
        self.remaining < LOW_WATER
    }

    pub fn consume(&mut self, units: u32) {
        self.remaining = self.remaining.saturating_sub(units);
    }
}

/// Outcome of one configuration within a run.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigRunResult {
    pub config_id: Uuid,
    pub config_name: String,
    pub notify_email: Option<String>,
    /// True when the schedule gate skipped this configuration
    pub gate_skipped: bool,
    pub settlements_seen: u32,
    pub settlements_processed: u32,
    pub settlements_skipped: u32,
    pub matched: u32,
    pub unmatched: u32,
    pub matched_amount: Decimal,
    pub deposits_created: u32,
    pub errors: Vec<String>,
}

impl ConfigRunResult {
    fn new(config: &MerchantConfig) -> Self {
        Self {
            config_id: config.id,
            config_name: config.name.clone(),
            notify_email: config.notify_email.clone(),
            gate_skipped: false,
            settlements_seen: 0,
            settlements_processed: 0,
            settlements_skipped: 0,
            matched: 0,
            unmatched: 0,
            matched_amount: Decimal::ZERO,
            deposits_created: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stopped_early: bool,
    pub configs: Vec<ConfigRunResult>,
}

impl RunStats {
    pub fn settlements_processed(&self) -> u32 {
        self.configs.iter().map(|c| c.settlements_processed).sum()
    }

    pub fn total_matched(&self) -> u32 {
        self.configs.iter().map(|c| c.matched).sum()
    }

    pub fn total_unmatched(&self) -> u32 {
        self.configs.iter().map(|c| c.unmatched).sum()
    }
}

enum Progress {
    Completed,
    Stopped,
}

/// Iterates configurations and settlement batches, applies the
/// at-most-once idempotency check, and drives the engine and grouper.
/// Single run-to-completion execution; overlapping invocations are not
/// mutex-protected, the schedule gate's minimum interval is the only
/// defense against a scheduler misfire.
pub struct BatchCoordinator {
    source: Arc<dyn SettlementSource>,
    repo: Arc<SettlementRepository>,
    configs: Arc<ConfigRepository>,
    engine: Arc<ReconEngine>,
    grouper: Arc<DepositGrouper>,
    sink: Arc<dyn NotificationSink>,
}

impl BatchCoordinator {
    pub fn new(
        source: Arc<dyn SettlementSource>,
        repo: Arc<SettlementRepository>,
        configs: Arc<ConfigRepository>,
        engine: Arc<ReconEngine>,
        grouper: Arc<DepositGrouper>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            source,
            repo,
            configs,
            engine,
            grouper,
            sink,
        }
    }

    /// Scheduler entry point: all active configurations, schedule gate
    /// enforced, lookback window computed per configuration.
    pub async fn run_scheduled(&self, now: DateTime<Utc>, budget: u32) -> AppResult<RunStats> {
        let active = self.configs.list_active().await?;
        if active.is_empty() {
            return Err(AppError::Config("no active configuration".to_string()));
        }
        self.run_inner(active, None, Some(now), budget).await
    }

    /// Operator entry point: explicit configuration selection and date
    /// range, no schedule gate.
    pub async fn run_adhoc(
        &self,
        config_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
        budget: u32,
    ) -> AppResult<RunStats> {
        let selected = if config_ids.is_empty() {
            self.configs.list_active().await?
        } else {
            let mut selected = Vec::with_capacity(config_ids.len());
            for id in config_ids {
                selected.push(self.configs.get(*id).await?);
            }
            selected
        };
        if selected.is_empty() {
            return Err(AppError::Config("no active configuration".to_string()));
        }
        self.run_inner(selected, Some((from, to)), None, budget).await
    }

    async fn run_inner(
        &self,
        configs: Vec<MerchantConfig>,
        window: Option<(NaiveDate, NaiveDate)>,
        gate_now: Option<DateTime<Utc>>,
        budget: u32,
    ) -> AppResult<RunStats> {
        let started_at = Utc::now();
        let mut budget = RunBudget::new(budget);
        let mut stopped_early = false;
        let mut results: Vec<ConfigRunResult> = Vec::with_capacity(configs.len());

        for config in configs {
            let mut result = ConfigRunResult::new(&config);

            if budget.is_low() {
                warn!("{} for configuration {}", BUDGET_STOP_REASON, config.name);
                result.errors.push(BUDGET_STOP_REASON.to_string());
                results.push(result);
                stopped_early = true;
                break;
            }

            if let Some(now) = gate_now {
                if !schedule_gate(&config, now) {
                    info!("Schedule gate skipped configuration {}", config.name);
                    result.gate_skipped = true;
                    results.push(result);
                    continue;
                }
            }

            let (from, to) = window.unwrap_or_else(|| {
                let today = Utc::now().date_naive();
                (today - Duration::days(config.lookback_days), today)
            });

            let progress = self
                .process_config(&config, from, to, &mut budget, &mut result)
                .await;
            if matches!(progress, Progress::Stopped) {
                stopped_early = true;
            }

            let status = if result.errors.is_empty() { "ok" } else { "error" };
            if let Err(e) = self
                .configs
                .record_last_run(config.id, Utc::now(), status)
                .await
            {
                error!("Failed to record last run for {}: {}", config.name, e);
            }

            let stop = matches!(progress, Progress::Stopped);
            results.push(result);
            if stop {
                break;
            }
        }

        let stats = RunStats {
            started_at,
            finished_at: Utc::now(),
            stopped_early,
            configs: results,
        };
        self.notify(&stats).await;
        Ok(stats)
    }

    /// One configuration. Fetch errors abort this configuration's
    /// remaining work only; the run continues with the next one.
    async fn process_config(
        &self,
        config: &MerchantConfig,
        from: NaiveDate,
        to: NaiveDate,
        budget: &mut RunBudget,
        result: &mut ConfigRunResult,
    ) -> Progress {
        info!(
            "Processing configuration {} over {}..{}",
            config.name, from, to
        );

        let settlements = match self
            .source
            .list_settlements(&config.credentials, config.merchant_filter.as_deref(), from, to)
            .await
        {
            Ok(settlements) => settlements,
            Err(e) => {
                error!("Fetch failed for configuration {}: {}", config.name, e);
                result.errors.push(format!("fetch failed: {}", e));
                return Progress::Completed;
            }
        };

        for summary in settlements {
            if budget.is_low() {
                warn!("{} for configuration {}", BUDGET_STOP_REASON, config.name);
                result.errors.push(BUDGET_STOP_REASON.to_string());
                return Progress::Stopped;
            }

            result.settlements_seen += 1;

            if summary.status != SettlementStatus::Done {
                result.settlements_skipped += 1;
                continue;
            }
            if self.repo.exists_by_external_id(&summary.external_id).await {
                info!("Settlement {} already processed, skipping", summary.external_id);
                result.settlements_skipped += 1;
                continue;
            }

            budget.consume(SETTLEMENT_COST);

            let external_id = summary.external_id.clone();
            match self.process_settlement(config, summary).await {
                Ok(counts) => {
                    result.settlements_processed += 1;
                    result.matched += counts.matched;
                    result.unmatched += counts.unmatched;
                    result.matched_amount += counts.matched_amount;
                    if counts.deposit_created {
                        result.deposits_created += 1;
                    }
                }
                Err(e) => {
                    error!("Settlement {} failed: {}", external_id, e);
                    result
                        .errors
                        .push(format!("settlement {}: {}", external_id, e));
                }
            }
        }

        Progress::Completed
    }

    async fn process_settlement(
        &self,
        config: &MerchantConfig,
        summary: SettlementSummary,
    ) -> AppResult<SettlementCounts> {
        let detail = self
            .source
            .get_settlement_detail(&config.credentials, &summary.external_id)
            .await?;

        let batch = self.repo.create_batch(detail.settlement.into_batch()).await?;
        let txns = detail
            .transactions
            .into_iter()
            .map(|line| line.into_transaction(batch.id))
            .collect();

        let outcome = self.engine.reconcile_batch(txns, &batch).await?;

        // A failed grouping attempt is recorded on the batch; the
        // settlement itself still counts as processed.
        let (deposit_ref, deposit_error) = match self
            .grouper
            .create_deposit(&batch, &outcome.matched, &config.deposit_account)
            .await
        {
            Ok(deposit) => (deposit.map(|d| d.deposit_ref), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let stats = self.repo.recompute_stats(batch.id).await?;
        self.repo
            .mark_processed(batch.id, deposit_ref.as_deref(), deposit_error.as_deref())
            .await?;

        Ok(SettlementCounts {
            matched: stats.matched_count,
            unmatched: stats.unmatched_count,
            matched_amount: stats.matched_amount,
            deposit_created: deposit_ref.is_some(),
        })
    }

    /// One combined summary per distinct recipient address.
    async fn notify(&self, stats: &RunStats) {
        let mut by_address: BTreeMap<&str, Vec<&ConfigRunResult>> = BTreeMap::new();
        for result in stats.configs.iter().filter(|r| !r.gate_skipped) {
            if let Some(address) = result.notify_email.as_deref() {
                by_address.entry(address).or_default().push(result);
            }
        }

        for (address, results) in by_address {
            let body = render_run_summary(stats, &results);
            if let Err(e) = self
                .sink
                .send(address, "Settlement reconciliation run summary", &body)
                .await
            {
                error!("Failed to notify {}: {}", address, e);
            }
        }
    }
}

struct SettlementCounts {
    matched: u32,
    unmatched: u32,
    matched_amount: Decimal,
    deposit_created: bool,
}

/// Should this configuration run now? A failed gate is a skip, never
/// an error. The 1-hour minimum interval guards against a trigger
/// firing more than once per hour.
pub fn schedule_gate(config: &MerchantConfig, now: DateTime<Utc>) -> bool {
    if let Some(last) = config.last_run_at {
        if now.signed_duration_since(last) < Duration::minutes(MIN_RERUN_MINUTES) {
            return false;
        }
    }

    match &config.schedule {
        None => true,
        Some(schedule) => {
            let hour_matches = now.hour() == schedule.hour;
            match schedule.frequency {
                ScheduleFrequency::Daily => hour_matches,
                ScheduleFrequency::Weekly => {
                    hour_matches
                        && schedule
                            .day_of_week
                            .is_some_and(|day| now.weekday() == day)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerStore};
    use crate::notify::testing::RecordingSink;
    use crate::recon::locator::EntryLocator;
    use crate::source::client::{SettlementDetail, SettlementLine};
    use crate::source::SettlementSource;
    use crate::store::models::{
        CreditDebit, EntryKind, LedgerEntry, Schedule, SourceCredentials, TransactionType,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct MockSource {
        settlements: Vec<SettlementSummary>,
        details: HashMap<String, SettlementDetail>,
    }

    #[async_trait]
    impl SettlementSource for MockSource {
        async fn list_settlements(
            &self,
            _credentials: &SourceCredentials,
            _merchant_filter: Option<&str>,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> AppResult<Vec<SettlementSummary>> {
            Ok(self.settlements.clone())
        }

        async fn get_settlement_detail(
            &self,
            _credentials: &SourceCredentials,
            external_id: &str,
        ) -> AppResult<SettlementDetail> {
            self.details
                .get(external_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Settlement {}", external_id)))
        }
    }

    fn summary(external_id: &str, crdr: CreditDebit, status: SettlementStatus) -> SettlementSummary {
        SettlementSummary {
            external_id: external_id.to_string(),
            settlement_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            total_amount: dec!(120.00),
            currency: "USD".to_string(),
            status,
            credit_or_debit: crdr,
            external_reference: "REF-1".to_string(),
            merchant_id: "M1".to_string(),
        }
    }

    fn line(
        txn_id: &str,
        reference: &str,
        amount: Decimal,
        txn_type: TransactionType,
    ) -> SettlementLine {
        SettlementLine {
            external_txn_id: txn_id.to_string(),
            external_reference: reference.to_string(),
            amount,
            currency: "USD".to_string(),
            txn_type,
            payment_method: None,
            auth_code: None,
            occurred_at: Utc::now(),
        }
    }

    fn s1_source(lines: Vec<SettlementLine>) -> MockSource {
        let s1 = summary("S1", CreditDebit::Credit, SettlementStatus::Done);
        let mut details = HashMap::new();
        details.insert(
            "S1".to_string(),
            SettlementDetail {
                settlement: s1.clone(),
                transactions: lines,
            },
        );
        MockSource {
            settlements: vec![s1],
            details,
        }
    }

    fn ledger_entry(id: &str, doc: &str, amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            doc_number: doc.to_string(),
            amount,
            currency: "USD".to_string(),
            status: "deposited".to_string(),
            available_for_deposit: true,
            kind: EntryKind::Payment,
            auth_code: None,
            external_id: None,
        }
    }

    fn merchant_config(name: &str, notify: Option<&str>) -> MerchantConfig {
        MerchantConfig {
            id: Uuid::new_v4(),
            name: name.to_string(),
            credentials: SourceCredentials {
                api_login: "login".to_string(),
                api_key: "key".to_string(),
            },
            merchant_filter: Some("M1".to_string()),
            deposit_account: "Bank Checking".to_string(),
            lookback_days: 7,
            active: true,
            schedule: None,
            notify_email: notify.map(|s| s.to_string()),
            last_run_at: None,
            last_run_status: None,
        }
    }

    struct Harness {
        coordinator: BatchCoordinator,
        repo: Arc<SettlementRepository>,
        configs: Arc<ConfigRepository>,
        ledger: Arc<InMemoryLedger>,
        sink: Arc<RecordingSink>,
    }

    async fn harness(source: MockSource, entries: Vec<LedgerEntry>) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        for e in entries {
            ledger.insert_entry(e).await;
        }
        let ledger_dyn: Arc<dyn LedgerStore> = ledger.clone();
        let repo = Arc::new(SettlementRepository::new());
        let configs = Arc::new(ConfigRepository::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(ReconEngine::new(
            EntryLocator::new(ledger_dyn.clone()),
            repo.clone(),
        ));
        let grouper = Arc::new(DepositGrouper::new(ledger_dyn, repo.clone()));
        let coordinator = BatchCoordinator::new(
            Arc::new(source),
            repo.clone(),
            configs.clone(),
            engine,
            grouper,
            sink.clone(),
        );
        Harness {
            coordinator,
            repo,
            configs,
            ledger,
            sink,
        }
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn settlement_scenario_matches_deposits_and_counts() {
        let source = s1_source(vec![
            line("T1", "1001", dec!(100.00), TransactionType::Purchase),
            line("T2", "", dec!(20.00), TransactionType::Refund),
        ]);
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        let stats = h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();

        assert_eq!(stats.configs.len(), 1);
        let r = &stats.configs[0];
        assert_eq!(r.settlements_processed, 1);
        assert_eq!(r.matched, 1);
        assert_eq!(r.unmatched, 1);
        assert_eq!(r.matched_amount, dec!(100.00));
        assert_eq!(r.deposits_created, 1);

        let batches = h.repo.list_batches(None, None).await.unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.matched_count, 1);
        assert_eq!(batch.unmatched_count, 1);
        assert_eq!(batch.matched_amount, dec!(100.00));
        assert!(batch.processed);
        assert!(batch.deposit_ref.is_some());

        let deposits = h.ledger.deposits().await;
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].entry_ids, vec!["E1".to_string()]);
    }

    #[tokio::test]
    async fn at_most_once_across_overlapping_runs() {
        let source = s1_source(vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)]);
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();
        let second = h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();

        // Second overlapping run skips S1 instead of reprocessing it
        assert_eq!(second.configs[0].settlements_processed, 0);
        assert_eq!(second.configs[0].settlements_skipped, 1);

        let batches = h.repo.list_batches(None, None).await.unwrap();
        assert_eq!(batches.len(), 1);
        let txns = h.repo.transactions_for_batch(batches[0].id).await.unwrap();
        assert_eq!(txns.len(), 1);
    }

    #[tokio::test]
    async fn amount_mismatch_leaves_no_deposit() {
        let source = s1_source(vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)]);
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.02))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        let stats = h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();

        let r = &stats.configs[0];
        assert_eq!(r.matched, 0);
        assert_eq!(r.unmatched, 1);
        assert_eq!(r.deposits_created, 0);
        assert!(h.ledger.deposits().await.is_empty());

        let batches = h.repo.list_batches(None, None).await.unwrap();
        let txns = h.repo.transactions_for_batch(batches[0].id).await.unwrap();
        let reason = txns[0].match_error.clone().unwrap();
        assert!(reason.contains("100.02"));
        assert!(reason.contains("100.00"));
    }

    #[tokio::test]
    async fn non_done_settlements_are_skipped_not_errored() {
        let pending = summary("S2", CreditDebit::Credit, SettlementStatus::Pending);
        let mut source = s1_source(vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)]);
        source.settlements.push(pending);
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        let stats = h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();
        let r = &stats.configs[0];
        assert_eq!(r.settlements_processed, 1);
        assert_eq!(r.settlements_skipped, 1);
        assert!(r.errors.is_empty());
    }

    #[tokio::test]
    async fn failing_settlement_is_isolated_and_the_run_continues() {
        // S1's detail fetch fails; S2 is healthy and must still process
        let s1 = summary("S1", CreditDebit::Credit, SettlementStatus::Done);
        let s2 = summary("S2", CreditDebit::Credit, SettlementStatus::Done);
        let mut details = HashMap::new();
        details.insert(
            "S2".to_string(),
            SettlementDetail {
                settlement: s2.clone(),
                transactions: vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)],
            },
        );
        let source = MockSource {
            settlements: vec![s1, s2],
            details,
        };
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        let stats = h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();

        assert!(!stats.stopped_early);
        let r = &stats.configs[0];
        assert_eq!(r.settlements_seen, 2);
        assert_eq!(r.settlements_processed, 1);
        assert_eq!(r.matched, 1);
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].starts_with("settlement S1:"));

        let batches = h.repo.list_batches(None, None).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].external_id, "S2");
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_gracefully_and_keeps_work() {
        let s1 = summary("S1", CreditDebit::Credit, SettlementStatus::Done);
        let s2 = summary("S2", CreditDebit::Credit, SettlementStatus::Done);
        let mut details = HashMap::new();
        for s in [&s1, &s2] {
            details.insert(
                s.external_id.clone(),
                SettlementDetail {
                    settlement: s.clone(),
                    transactions: vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)],
                },
            );
        }
        let source = MockSource {
            settlements: vec![s1, s2],
            details,
        };
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs.create(merchant_config("Store A", None)).await.unwrap();

        let (from, to) = window();
        // Enough for one settlement only
        let stats = h.coordinator.run_adhoc(&[], from, to, 15).await.unwrap();

        assert!(stats.stopped_early);
        let r = &stats.configs[0];
        assert_eq!(r.settlements_processed, 1);
        assert!(r.errors.iter().any(|e| e == BUDGET_STOP_REASON));

        // Completed work is kept and resumable
        assert_eq!(h.repo.list_batches(None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shared_notification_address_gets_one_combined_summary() {
        let source = s1_source(vec![line("T1", "1001", dec!(100.00), TransactionType::Purchase)]);
        let h = harness(source, vec![ledger_entry("E1", "1001", dec!(100.00))]).await;
        h.configs
            .create(merchant_config("Store A", Some("ops@x.com")))
            .await
            .unwrap();
        h.configs
            .create(merchant_config("Store B", Some("ops@x.com")))
            .await
            .unwrap();

        let (from, to) = window();
        h.coordinator.run_adhoc(&[], from, to, 1000).await.unwrap();

        let sent = h.sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        let (to_addr, _subject, body) = &sent[0];
        assert_eq!(to_addr, "ops@x.com");
        assert!(body.contains("Per-configuration breakdown"));
        assert!(body.contains("Store A"));
        assert!(body.contains("Store B"));
    }

    #[test]
    fn gate_enforces_minimum_rerun_interval() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let mut config = merchant_config("Store A", None);

        config.last_run_at = Some(now - Duration::minutes(30));
        assert!(!schedule_gate(&config, now));

        config.last_run_at = Some(now - Duration::minutes(90));
        assert!(schedule_gate(&config, now));
    }

    #[test]
    fn gate_matches_daily_hour_and_weekly_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 14, 5, 0).unwrap(); // a Monday
        let mut config = merchant_config("Store A", None);

        config.schedule = Some(Schedule {
            frequency: ScheduleFrequency::Daily,
            day_of_week: None,
            hour: 14,
        });
        assert!(schedule_gate(&config, now));

        config.schedule = Some(Schedule {
            frequency: ScheduleFrequency::Daily,
            day_of_week: None,
            hour: 9,
        });
        assert!(!schedule_gate(&config, now));

        config.schedule = Some(Schedule {
            frequency: ScheduleFrequency::Weekly,
            day_of_week: Some(chrono::Weekday::Mon),
            hour: 14,
        });
        assert!(schedule_gate(&config, now));

        config.schedule = Some(Schedule {
            frequency: ScheduleFrequency::Weekly,
            day_of_week: Some(chrono::Weekday::Tue),
            hour: 14,
        });
        assert!(!schedule_gate(&config, now));
    }

    #[tokio::test]
    async fn no_active_configuration_is_a_config_error() {
        let source = s1_source(vec![]);
        let h = harness(source, vec![]).await;
        let err = h
            .coordinator
            .run_scheduled(Utc::now(), 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}

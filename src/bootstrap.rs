use std::sync::Arc;

use tracing::{info, warn};

use crate::api::handlers::AppState;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::ledger::{InMemoryLedger, LedgerStore};
use crate::notify::{EmailNotifier, LogNotifier, NotificationSink};
use crate::recon::{BatchCoordinator, DepositGrouper, EntryLocator, ReconEngine};
use crate::source::HttpSettlementSource;
use crate::store::{ConfigRepository, SettlementRepository};

pub async fn initialize_app_state(config: &AppConfig) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let ledger: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
    let repo = Arc::new(SettlementRepository::new());
    let configs = Arc::new(ConfigRepository::new());
    info!("✅ Stores initialized");

    let source = Arc::new(HttpSettlementSource::new(&config.source_base_url));
    info!(
        "✅ Settlement source client initialized for: {}",
        config.source_base_url
    );

    let sink: Arc<dyn NotificationSink> = if config.notify_api_key.is_empty() {
        warn!("NOTIFY_API_KEY not set - email notifications disabled, logging summaries instead");
        Arc::new(LogNotifier)
    } else {
        info!("✅ Email notifier initialized");
        Arc::new(EmailNotifier::new(
            &config.notify_base_url,
            config.notify_api_key.clone(),
            config.notify_from_email.clone(),
        ))
    };

    let locator = EntryLocator::new(ledger.clone());
    let engine = Arc::new(ReconEngine::new(locator, repo.clone()));
    let grouper = Arc::new(DepositGrouper::new(ledger.clone(), repo.clone()));
    let coordinator = Arc::new(BatchCoordinator::new(
        source,
        repo.clone(),
        configs.clone(),
        engine,
        grouper.clone(),
        sink,
    ));
    info!("✅ Reconciliation pipeline initialized");

    Ok(AppState {
        config: config.clone(),
        repo,
        configs,
        ledger,
        grouper,
        coordinator,
    })
}

mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod notify;
mod recon;
mod scheduler;
mod server;
mod source;
mod store;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::scheduler::ReconScheduler;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,settlement_recon=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting Settlement Reconciliation Service");

    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    let state = bootstrap::initialize_app_state(&config).await?;

    // Background scheduler drives the periodic reconciliation runs
    let scheduler = ReconScheduler::new(
        state.coordinator.clone(),
        config.schedule_tick_secs,
        config.run_budget,
    );
    let _scheduler_handle = scheduler.start();
    info!(
        "⏰ Scheduler started (tick every {}s, budget {} units per run)",
        config.schedule_tick_secs, config.run_budget
    );

    let app = server::create_app(state).await;
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}

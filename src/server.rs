use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handlers::{
    create_config, get_settlement, health_check, list_configs, list_settlements, manual_match,
    supplementary_deposit, trigger_run, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Settlement endpoints
                .route("/settlements", get(list_settlements))
                .route("/settlements/:id", get(get_settlement))
                .route("/settlements/:id/manual-match", post(manual_match))
                .route(
                    "/settlements/:id/supplementary-deposit",
                    post(supplementary_deposit),
                )
                // Run endpoints
                .route("/runs", post(trigger_run))
                // Configuration endpoints
                .route("/configs", get(list_configs).post(create_config)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

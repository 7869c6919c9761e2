use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::recon::{ConfigRunResult, RunStats};

/// Outbound run-summary delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct EmailRequest {
    to: String,
    from: String,
    subject: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    id: String,
}

/// Email delivery over a Resend-style HTTP API.
pub struct EmailNotifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_email: String,
}

impl EmailNotifier {
    pub fn new(base_url: &str, api_key: String, from_email: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from_email,
        }
    }
}

#[async_trait]
impl NotificationSink for EmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let request = EmailRequest {
            to: to.to_string(),
            from: self.from_email.clone(),
            subject: subject.to_string(),
            text: body.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!(
                "Email API error: {}",
                error_text
            )));
        }

        let result: EmailResponse = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("Email API response: {}", e)))?;
        info!("Run summary emailed to {}: {}", to, result.id);
        Ok(())
    }
}

/// Fallback sink when no email provider is configured: the summary
/// still lands in the logs.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        info!("Notification for {} - {}\n{}", to, subject, body);
        Ok(())
    }
}

/// Render the plain-text summary for one recipient. The per-config
/// breakdown only appears when more than one configuration ran for
/// this address's combined summary.
pub fn render_run_summary(stats: &RunStats, results: &[&ConfigRunResult]) -> String {
    let mut body = String::new();
    body.push_str("Settlement reconciliation run summary\n");
    body.push_str(&format!(
        "Run window: {} .. {}\n",
        stats.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        stats.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));

    let seen: u32 = results.iter().map(|r| r.settlements_seen).sum();
    let processed: u32 = results.iter().map(|r| r.settlements_processed).sum();
    let skipped: u32 = results.iter().map(|r| r.settlements_skipped).sum();
    let matched: u32 = results.iter().map(|r| r.matched).sum();
    let unmatched: u32 = results.iter().map(|r| r.unmatched).sum();
    let amount: Decimal = results.iter().map(|r| r.matched_amount).sum();
    let deposits: u32 = results.iter().map(|r| r.deposits_created).sum();

    body.push_str(&format!(
        "Settlements: {} seen, {} processed, {} skipped\n",
        seen, processed, skipped
    ));
    body.push_str(&format!(
        "Transactions: {} matched, {} unmatched, matched amount {}\n",
        matched, unmatched, amount
    ));
    body.push_str(&format!("Deposits created: {}\n", deposits));
    if stats.stopped_early {
        body.push_str("Run stopped early: processing budget exhausted\n");
    }

    if results.len() > 1 {
        body.push_str("\nPer-configuration breakdown:\n");
        for r in results {
            body.push_str(&format!(
                "  {}: {} processed, {} matched, {} unmatched, amount {}\n",
                r.config_name, r.settlements_processed, r.matched, r.unmatched, r.matched_amount
            ));
        }
    }

    let errors: Vec<&String> = results.iter().flat_map(|r| r.errors.iter()).collect();
    if !errors.is_empty() {
        body.push_str("\nErrors:\n");
        for e in errors {
            body.push_str(&format!("  - {}\n", e));
        }
    }

    body
}

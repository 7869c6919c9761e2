use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppResult, SourceError};
use crate::store::models::{
    CreditDebit, ExternalTransaction, SettlementBatch, SettlementStatus, SourceCredentials,
    TransactionType,
};

/// One settlement as returned by the batch-listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub external_id: String,
    pub settlement_date: NaiveDate,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: SettlementStatus,
    pub credit_or_debit: CreditDebit,
    pub external_reference: String,
    pub merchant_id: String,
}

impl SettlementSummary {
    pub fn into_batch(self) -> SettlementBatch {
        SettlementBatch {
            id: Uuid::new_v4(),
            external_id: self.external_id,
            settlement_date: self.settlement_date,
            total_amount: self.total_amount,
            currency: self.currency,
            status: self.status,
            credit_or_debit: self.credit_or_debit,
            external_reference: self.external_reference,
            merchant_id: self.merchant_id,
            matched_count: 0,
            unmatched_count: 0,
            matched_amount: Decimal::ZERO,
            processed: false,
            processed_at: None,
            last_error: None,
            deposit_ref: None,
        }
    }
}

/// One transaction line within a settlement detail response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementLine {
    pub external_txn_id: String,
    #[serde(default)]
    pub external_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub txn_type: TransactionType,
    pub payment_method: Option<String>,
    pub auth_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SettlementLine {
    pub fn into_transaction(self, batch_id: Uuid) -> ExternalTransaction {
        ExternalTransaction {
            id: Uuid::new_v4(),
            batch_id,
            external_txn_id: self.external_txn_id,
            external_reference: self.external_reference,
            amount: self.amount,
            currency: self.currency,
            txn_type: self.txn_type,
            payment_method: self.payment_method,
            auth_code: self.auth_code,
            occurred_at: self.occurred_at,
            matched: false,
            match_error: None,
            ledger_entry_id: None,
            in_deposit: false,
            deposit_ref: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub settlement: SettlementSummary,
    pub transactions: Vec<SettlementLine>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    settlements: Vec<SettlementSummary>,
}

/// Seam to the external settlement source.
#[async_trait]
pub trait SettlementSource: Send + Sync {
    async fn list_settlements(
        &self,
        credentials: &SourceCredentials,
        merchant_filter: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<SettlementSummary>>;

    async fn get_settlement_detail(
        &self,
        credentials: &SourceCredentials,
        external_id: &str,
    ) -> AppResult<SettlementDetail>;
}

/// How a response status should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Success,
    /// 401/403 - retrying cannot help
    AuthFailure,
    /// 5xx and request timeout
    Retryable,
    /// Any other non-2xx
    Fatal,
}

fn classify_status(status: StatusCode) -> RetryClass {
    if status.is_success() {
        RetryClass::Success
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        RetryClass::AuthFailure
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        RetryClass::Retryable
    } else {
        RetryClass::Fatal
    }
}

fn basic_auth_header(credentials: &SourceCredentials) -> String {
    let pair = format!("{}:{}", credentials.api_login, credentials.api_key);
    format!("Basic {}", BASE64.encode(pair))
}

/// reqwest-backed settlement source client with bounded retries and
/// linear backoff.
pub struct HttpSettlementSource {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl HttpSettlementSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }

    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
        credentials: &SourceCredentials,
    ) -> AppResult<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let result = self
                .client
                .get(url)
                .query(query)
                .header(reqwest::header::AUTHORIZATION, basic_auth_header(credentials))
                .send()
                .await;

            let last_status = match result {
                Ok(response) => match classify_status(response.status()) {
                    RetryClass::Success => return Ok(response),
                    RetryClass::AuthFailure => {
                        return Err(SourceError::AuthFailed(response.status().as_u16()).into());
                    }
                    RetryClass::Fatal => {
                        let status = response.status().as_u16();
                        let body = response.text().await.unwrap_or_default();
                        return Err(SourceError::Status { status, body }.into());
                    }
                    RetryClass::Retryable => response.status().as_u16(),
                },
                Err(e) if e.is_timeout() => 408,
                Err(e) => return Err(SourceError::Transport(e.to_string()).into()),
            };

            attempt += 1;
            if attempt > self.max_retries {
                return Err(SourceError::RetriesExhausted {
                    status: last_status,
                    attempts: attempt,
                }
                .into());
            }

            let delay = self.backoff * attempt; // linear backoff
            warn!(
                "Settlement source returned {} for {}; retry {}/{} in {:?}",
                last_status, url, attempt, self.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SettlementSource for HttpSettlementSource {
    async fn list_settlements(
        &self,
        credentials: &SourceCredentials,
        merchant_filter: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<SettlementSummary>> {
        let url = format!("{}/settlements", self.base_url);
        let mut query = vec![
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ];
        if let Some(merchant) = merchant_filter {
            query.push(("merchant", merchant.to_string()));
        }

        let response = self.get_with_retry(&url, &query, credentials).await?;
        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        info!(
            "Settlement source listed {} settlements for {}..{}",
            parsed.settlements.len(),
            from,
            to
        );
        Ok(parsed.settlements)
    }

    async fn get_settlement_detail(
        &self,
        credentials: &SourceCredentials,
        external_id: &str,
    ) -> AppResult<SettlementDetail> {
        let url = format!("{}/settlements/{}", self.base_url, external_id);
        let response = self.get_with_retry(&url, &[], credentials).await?;
        let detail: SettlementDetail = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_encodes_credential_pair() {
        let creds = SourceCredentials {
            api_login: "merchant".to_string(),
            api_key: "s3cret".to_string(),
        };
        // base64("merchant:s3cret")
        assert_eq!(basic_auth_header(&creds), "Basic bWVyY2hhbnQ6czNjcmV0");
    }

    #[test]
    fn status_classification_matches_retry_policy() {
        assert_eq!(classify_status(StatusCode::OK), RetryClass::Success);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            RetryClass::AuthFailure
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            RetryClass::AuthFailure
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            RetryClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::REQUEST_TIMEOUT),
            RetryClass::Retryable
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryClass::Fatal);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), RetryClass::Fatal);
    }

    #[test]
    fn merchant_filter_is_percent_encoded() {
        let query = [
            ("from", "2024-01-01".to_string()),
            ("to", "2024-01-10".to_string()),
            ("merchant", "A&B Store".to_string()),
        ];
        let request = Client::new()
            .get("http://source.test/settlements")
            .query(&query)
            .build()
            .unwrap();
        assert_eq!(
            request.url().query(),
            Some("from=2024-01-01&to=2024-01-10&merchant=A%26B+Store")
        );
    }
}

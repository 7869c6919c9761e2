use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::models::MerchantConfig;

/// Merchant configurations. Created and edited by an operator; the
/// coordinator only writes last-run bookkeeping.
pub struct ConfigRepository {
    configs: tokio::sync::RwLock<HashMap<Uuid, MerchantConfig>>,
}

impl ConfigRepository {
    pub fn new() -> Self {
        Self {
            configs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, config: MerchantConfig) -> AppResult<MerchantConfig> {
        let mut configs = self.configs.write().await;
        configs.insert(config.id, config.clone());
        Ok(config)
    }

    pub async fn get(&self, config_id: Uuid) -> AppResult<MerchantConfig> {
        let configs = self.configs.read().await;
        configs
            .get(&config_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Configuration {}", config_id)))
    }

    pub async fn list(&self) -> AppResult<Vec<MerchantConfig>> {
        let configs = self.configs.read().await;
        let mut rows: Vec<MerchantConfig> = configs.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    pub async fn list_active(&self) -> AppResult<Vec<MerchantConfig>> {
        let configs = self.configs.read().await;
        let mut rows: Vec<MerchantConfig> =
            configs.values().filter(|c| c.active).cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Resolve the configuration responsible for a merchant id.
    /// A config with a matching filter wins; a filterless active config
    /// is the fallback.
    pub async fn find_for_merchant(&self, merchant_id: &str) -> AppResult<MerchantConfig> {
        let configs = self.configs.read().await;
        configs
            .values()
            .find(|c| c.active && c.merchant_filter.as_deref() == Some(merchant_id))
            .or_else(|| {
                configs
                    .values()
                    .find(|c| c.active && c.merchant_filter.is_none())
            })
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("No active configuration for merchant {}", merchant_id))
            })
    }

    pub async fn record_last_run(
        &self,
        config_id: Uuid,
        at: DateTime<Utc>,
        status: &str,
    ) -> AppResult<()> {
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(&config_id)
            .ok_or_else(|| AppError::NotFound(format!("Configuration {}", config_id)))?;
        config.last_run_at = Some(at);
        config.last_run_status = Some(status.to_string());
        Ok(())
    }
}

impl Default for ConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

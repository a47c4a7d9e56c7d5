//! Global platform counters kept under `platformStats/`.

use crate::errors::CoreResult;
use crate::storage::KeyValueStore;
use crate::types::{now_millis, Amount};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const STATS_PATH: &str = "platformStats";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    #[serde(default)]
    pub total_games_played: u64,
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub daily_active_users: u64,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct PlatformStatsStore {
    store: Arc<dyn KeyValueStore>,
}

impl PlatformStatsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn increment_games_played(&self, delta: u64) -> CoreResult<u64> {
        let next = self
            .store
            .increment(&format!("{}/totalGamesPlayed", STATS_PATH), delta as f64)
            .await?;
        Ok(next as u64)
    }

    /// Revenue in major currency units. Atomic increment, so two
    /// concurrent settlements cannot lose a contribution.
    pub async fn add_revenue(&self, amount: Amount) -> CoreResult<()> {
        self.store
            .increment(&format!("{}/totalRevenue", STATS_PATH), amount.as_major())
            .await?;
        Ok(())
    }

    pub async fn set_daily_active_users(&self, count: u64) -> CoreResult<()> {
        self.store
            .update(vec![
                (format!("{}/dailyActiveUsers", STATS_PATH), json!(count)),
                (format!("{}/timestamp", STATS_PATH), json!(now_millis())),
            ])
            .await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> CoreResult<PlatformStats> {
        let Some(value) = self.store.read(STATS_PATH).await? else {
            return Ok(PlatformStats::default());
        };
        let stats = serde_json::from_value(value)
            .map_err(|e| crate::errors::StoreError::corrupted(STATS_PATH, e))?;
        Ok(stats)
    }
}

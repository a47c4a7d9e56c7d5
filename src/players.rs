//! Player profiles: one aggregate record per wallet address,
//! upserted lazily on first touch.

use crate::errors::{CoreResult, StoreError};
use crate::storage::KeyValueStore;
use crate::types::{now_millis, Amount, PlayerProfile, WalletAddress};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const PLAYERS_PATH: &str = "players";

fn player_path(address: &WalletAddress) -> String {
    format!("{}/{}", PLAYERS_PATH, address)
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfileUpdate {
    pub username: Option<String>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub total_earnings: Option<Amount>,
}

#[derive(Clone)]
pub struct PlayerStore {
    store: Arc<dyn KeyValueStore>,
}

impl PlayerStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn get_player(&self, address: &WalletAddress) -> CoreResult<Option<PlayerProfile>> {
        let path = player_path(address);
        let Some(value) = self.store.read(&path).await? else {
            return Ok(None);
        };
        let profile = serde_json::from_value(value)
            .map_err(|e| StoreError::corrupted(&path, e))?;
        Ok(Some(profile))
    }

    /// Upsert with caller-supplied fields. Creates the profile with
    /// defaults when absent, otherwise merges the supplied fields and
    /// refreshes `lastActive`.
    pub async fn create_or_update_player(
        &self,
        address: &WalletAddress,
        update: PlayerProfileUpdate,
    ) -> CoreResult<PlayerProfile> {
        let now = now_millis();
        let profile = match self.get_player(address).await? {
            None => PlayerProfile {
                address: address.clone(),
                username: update.username.unwrap_or_else(|| address.short()),
                wins: update.wins.unwrap_or(0),
                losses: update.losses.unwrap_or(0),
                total_earnings: update.total_earnings.unwrap_or(Amount::ZERO),
                created_at: now,
                last_active: now,
            },
            Some(mut existing) => {
                if let Some(username) = update.username {
                    existing.username = username;
                }
                if let Some(wins) = update.wins {
                    existing.wins = wins;
                }
                if let Some(losses) = update.losses {
                    existing.losses = losses;
                }
                if let Some(earnings) = update.total_earnings {
                    existing.total_earnings = earnings;
                }
                existing.last_active = now;
                existing
            }
        };
        self.store
            .write(
                &player_path(address),
                serde_json::to_value(&profile).map_err(StoreError::Serialization)?,
            )
            .await?;
        Ok(profile)
    }

    /// Settlement-side stat update: exactly one of wins/losses is
    /// incremented per call. Counter bumps on an existing profile use
    /// the store's atomic increment, so concurrent settlements of
    /// different games touching the same player cannot lose updates.
    pub async fn update_stats(
        &self,
        address: &WalletAddress,
        is_winner: bool,
        reward: Amount,
    ) -> CoreResult<PlayerProfile> {
        let now = now_millis();
        let path = player_path(address);

        if self.get_player(address).await?.is_none() {
            let profile = PlayerProfile {
                address: address.clone(),
                username: address.short(),
                wins: u32::from(is_winner),
                losses: u32::from(!is_winner),
                total_earnings: if is_winner { reward } else { Amount::ZERO },
                created_at: now,
                last_active: now,
            };
            self.store
                .write(
                    &path,
                    serde_json::to_value(&profile).map_err(StoreError::Serialization)?,
                )
                .await?;
            debug!(player = %address, "created profile on first settlement");
            return Ok(profile);
        }

        let counter = if is_winner { "wins" } else { "losses" };
        self.store
            .increment(&format!("{}/{}", path, counter), 1.0)
            .await?;
        if is_winner && !reward.is_zero() {
            // Atomic like the win/loss counters, so concurrent
            // settlements touching the same player cannot lose a
            // reward.
            self.store
                .increment(&format!("{}/totalEarnings", path), reward.as_major())
                .await?;
        }
        self.store
            .update(vec![(format!("{}/lastActive", path), json!(now))])
            .await?;

        // Re-read so the caller sees the post-increment counters.
        self.get_player(address)
            .await?
            .ok_or_else(|| StoreError::corrupted(&path, "profile vanished during stat update").into())
    }
}

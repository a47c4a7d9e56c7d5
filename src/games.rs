//! Game records and the settlement pipeline.
//!
//! `finish_game` is the one state machine in the system: it moves a
//! game from `active` to `completed` exactly once and fans the result
//! out to match history, both player profiles, and the platform
//! counters. The transition itself is a conditional multi-path update
//! guarded on the stored status, so concurrent duplicate finishers
//! (retried network calls, both clients reporting) resolve to a single
//! settlement.

use crate::errors::{CoreError, CoreResult, StoreError};
use crate::history::MatchHistory;
use crate::notifications::NotificationStore;
use crate::platform_stats::PlatformStatsStore;
use crate::players::PlayerStore;
use crate::storage::KeyValueStore;
use crate::types::{
    now_millis, Amount, GameRecord, GameStakes, GameStatus, GameType, WalletAddress,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub const GAMES_PATH: &str = "games";

fn game_path(game_id: &str) -> String {
    format!("{}/{}", GAMES_PATH, game_id)
}

/// Result of a successful settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub game_id: String,
    pub match_id: String,
}

#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn KeyValueStore>,
    history: MatchHistory,
    players: PlayerStore,
    stats: PlatformStatsStore,
    notifications: NotificationStore,
}

impl GameService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            history: MatchHistory::new(store.clone()),
            players: PlayerStore::new(store.clone()),
            stats: PlatformStatsStore::new(store.clone()),
            notifications: NotificationStore::new(store.clone()),
            store,
        }
    }

    /// Create an `active` game for two paired players with a symmetric
    /// wager. The generated key is back-filled into the record's own
    /// `id` field with a second write; a crash in between leaves a
    /// record temporarily missing `id`, which is acceptable because
    /// the key is always known to the store.
    pub async fn create_game(
        &self,
        player1: &str,
        player2: &str,
        game_type: GameType,
        stake: Amount,
    ) -> CoreResult<(String, GameRecord)> {
        let p1 = WalletAddress::new(player1);
        let p2 = WalletAddress::new(player2);
        if p1 == p2 {
            return Err(CoreError::IdenticalPlayers(p1.to_string()));
        }

        let mut record = GameRecord {
            id: None,
            player1: p1,
            player2: p2,
            game_type,
            start_time: now_millis(),
            end_time: None,
            stakes: GameStakes {
                player1_stake: stake,
                player2_stake: stake,
            },
            status: GameStatus::Active,
            winner_id: None,
            player1_score: None,
            player2_score: None,
        };

        let key = self
            .store
            .push(
                GAMES_PATH,
                serde_json::to_value(&record).map_err(StoreError::Serialization)?,
            )
            .await?;
        self.store
            .write(&format!("{}/id", game_path(&key)), json!(key))
            .await?;
        record.id = Some(key.clone());

        info!(game_id = %key, game_type = %game_type, stake = %stake, "created game");
        Ok((key, record))
    }

    pub async fn get_game(&self, game_id: &str) -> CoreResult<Option<GameRecord>> {
        let path = game_path(game_id);
        let Some(value) = self.store.read(&path).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(value)
            .map_err(|e| StoreError::corrupted(&path, e))?;
        Ok(Some(record))
    }

    /// Settle a game: validate, transition `active -> completed`
    /// exactly once, then fan out history rows and stat updates.
    ///
    /// The fan-out is not transactionally linked to the transition; a
    /// failure after the guard leaves the game `completed` with
    /// partial downstream writes. That state is surfaced as an error
    /// and logged with the game id and failing step so an external
    /// reconciliation pass can repair it.
    pub async fn finish_game(
        &self,
        game_id: &str,
        winner_address: &str,
        player1_score: Option<f64>,
        player2_score: Option<f64>,
    ) -> CoreResult<SettlementReceipt> {
        let game = self
            .get_game(game_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(game_id.to_string()))?;

        let winner = WalletAddress::new(winner_address);
        if !game.is_participant(&winner) {
            return Err(CoreError::InvalidWinner {
                game_id: game_id.to_string(),
                winner: winner.to_string(),
            });
        }
        if game.status == GameStatus::Completed {
            return Err(CoreError::AlreadyCompleted(game_id.to_string()));
        }

        let end_time = now_millis();
        let path = game_path(game_id);
        let mut updates = vec![
            (format!("{}/endTime", path), json!(end_time)),
            (format!("{}/winnerId", path), json!(winner.as_str())),
            (format!("{}/status", path), json!("completed")),
        ];
        if let Some(score) = player1_score {
            updates.push((format!("{}/player1Score", path), json!(score)));
        }
        if let Some(score) = player2_score {
            updates.push((format!("{}/player2Score", path), json!(score)));
        }

        // The idempotency guard: only the caller that wins this
        // conditional update performs the fan-out below.
        let applied = self
            .store
            .update_if(&format!("{}/status", path), &json!("active"), updates)
            .await?;
        if !applied {
            return Err(CoreError::AlreadyCompleted(game_id.to_string()));
        }

        // Post-settlement snapshot, merging the update into the record
        // read above.
        let settled = GameRecord {
            end_time: Some(end_time),
            winner_id: Some(winner.clone()),
            status: GameStatus::Completed,
            player1_score: player1_score.or(game.player1_score),
            player2_score: player2_score.or(game.player2_score),
            ..game
        };

        let match_id = format!("m_{}", game_id);
        if let Err(e) = self
            .history
            .add_match_for_players(game_id, &match_id, &settled, &winner)
            .await
        {
            error!(game_id, step = "history", error = %e, "settlement fan-out failed");
            return Err(e);
        }

        for (player, is_winner) in [
            (&settled.player1, winner == settled.player1),
            (&settled.player2, winner == settled.player2),
        ] {
            if let Err(e) = self.players.update_stats(player, is_winner, Amount::ZERO).await {
                error!(game_id, step = "stats", player = %player, error = %e, "settlement fan-out failed");
                return Err(e);
            }
        }

        if let Err(e) = self.stats.increment_games_played(1).await {
            // Platform counters are advisory; losing one bump is not
            // worth failing an otherwise settled game.
            error!(game_id, step = "platform-stats", error = %e, "settlement fan-out failed");
        }

        for (player, message) in [
            (&settled.player1, result_message(&settled, &settled.player1, &winner)),
            (&settled.player2, result_message(&settled, &settled.player2, &winner)),
        ] {
            if let Err(e) = self.notifications.send(player, &message).await {
                error!(game_id, step = "notify", player = %player, error = %e, "settlement fan-out failed");
            }
        }

        info!(game_id, winner = %winner, %match_id, "game settled");
        Ok(SettlementReceipt {
            game_id: game_id.to_string(),
            match_id,
        })
    }
}

fn result_message(game: &GameRecord, player: &WalletAddress, winner: &WalletAddress) -> String {
    if player == winner {
        format!("You won the {} match for {}", game.game_type, game.stakes.player1_stake)
    } else {
        format!("You lost the {} match for {}", game.game_type, game.stakes.player1_stake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn service() -> GameService {
        GameService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_game_invariants() {
        let games = service();
        let (key, record) = games
            .create_game("0xAAA", "0xBBB", GameType::Pattern, Amount::from_major(2.5))
            .await
            .unwrap();

        assert_eq!(record.status, GameStatus::Active);
        assert_eq!(record.stakes.player1_stake, Amount::from_major(2.5));
        assert_eq!(record.stakes.player1_stake, record.stakes.player2_stake);
        assert_ne!(record.player1, record.player2);
        assert_eq!(record.id.as_deref(), Some(key.as_str()));

        // The stored record carries its own key.
        let stored = games.get_game(&key).await.unwrap().unwrap();
        assert_eq!(stored.id.as_deref(), Some(key.as_str()));
    }

    #[tokio::test]
    async fn test_create_game_rejects_identical_players() {
        let games = service();
        let err = games
            .create_game("0xAAA", "0xaaa", GameType::Pattern, Amount::from_major(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IdenticalPlayers(_)));
    }

    #[tokio::test]
    async fn test_finish_unknown_game() {
        let games = service();
        let err = games
            .finish_game("missing", "0xaaa", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finish_rejects_non_participant() {
        let games = service();
        let (key, _) = games
            .create_game("0xaaa", "0xbbb", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        let err = games
            .finish_game(&key, "0xccc", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWinner { .. }));

        // Nothing mutated.
        let record = games.get_game(&key).await.unwrap().unwrap();
        assert_eq!(record.status, GameStatus::Active);
        assert!(record.winner_id.is_none());
    }

    #[tokio::test]
    async fn test_finish_accepts_mixed_case_winner() {
        let games = service();
        let (key, _) = games
            .create_game("0xaaa", "0xbbb", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        let receipt = games
            .finish_game(&key, "0xAAA", Some(7.0), Some(3.0))
            .await
            .unwrap();
        assert_eq!(receipt.match_id, format!("m_{}", key));

        let record = games.get_game(&key).await.unwrap().unwrap();
        assert_eq!(record.status, GameStatus::Completed);
        assert_eq!(record.winner_id, Some(WalletAddress::new("0xaaa")));
        assert_eq!(record.player1_score, Some(7.0));
        assert_eq!(record.player2_score, Some(3.0));
        assert!(record.end_time.is_some());
    }

    #[tokio::test]
    async fn test_settlement_notifies_both_players() {
        let store = Arc::new(MemoryStore::new());
        let games = GameService::new(store.clone());
        let (key, _) = games
            .create_game("0xaaa", "0xbbb", GameType::MemoryMatch, Amount::from_major(1.0))
            .await
            .unwrap();
        games.finish_game(&key, "0xbbb", None, None).await.unwrap();

        let winner_inbox = store.scan("notifications/0xbbb", None, 10).await.unwrap();
        let loser_inbox = store.scan("notifications/0xaaa", None, 10).await.unwrap();
        assert_eq!(winner_inbox.len(), 1);
        assert_eq!(loser_inbox.len(), 1);
        assert!(winner_inbox[0].1["message"].as_str().unwrap().starts_with("You won"));
        assert!(loser_inbox[0].1["message"].as_str().unwrap().starts_with("You lost"));
    }

    #[tokio::test]
    async fn test_second_finish_is_already_completed() {
        let games = service();
        let (key, _) = games
            .create_game("0xaaa", "0xbbb", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        games.finish_game(&key, "0xaaa", None, None).await.unwrap();
        let err = games
            .finish_game(&key, "0xbbb", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyCompleted(_)));
    }
}

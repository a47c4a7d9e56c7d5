//! Append-only match history.
//!
//! Every settled game produces one row under each participant's
//! address plus one canonical row in the global log. Rows are never
//! mutated; reads are cursor-paginated.

use crate::errors::{CoreResult, StoreError};
use crate::storage::KeyValueStore;
use crate::types::{
    now_millis, GameRecord, GlobalMatchRecord, MatchHistoryRecord, MatchOutcome, WalletAddress,
};
use std::sync::Arc;
use tracing::warn;

pub const HISTORY_PATH: &str = "matchHistory";
pub const GLOBAL_LOG_KEY: &str = "all";

fn player_history_path(address: &WalletAddress) -> String {
    format!("{}/{}", HISTORY_PATH, address)
}

#[derive(Clone)]
pub struct MatchHistory {
    store: Arc<dyn KeyValueStore>,
}

impl MatchHistory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Append the per-player rows and the canonical global row for a
    /// settled game. `game` is the post-settlement snapshot; its
    /// `winner_id` decides each participant's outcome.
    pub async fn add_match_for_players(
        &self,
        game_id: &str,
        match_id: &str,
        game: &GameRecord,
        winner: &WalletAddress,
    ) -> CoreResult<()> {
        let now = now_millis();

        let record_for_p1 = MatchHistoryRecord {
            match_id: match_id.to_string(),
            game_id: game_id.to_string(),
            opponent: game.player2.clone(),
            outcome: outcome_for(&game.player1, winner),
            score: game.player1_score,
            stake: game.stakes.player1_stake,
            timestamp: now,
            game_type: game.game_type,
        };
        let record_for_p2 = MatchHistoryRecord {
            match_id: match_id.to_string(),
            game_id: game_id.to_string(),
            opponent: game.player1.clone(),
            outcome: outcome_for(&game.player2, winner),
            score: game.player2_score,
            stake: game.stakes.player2_stake,
            timestamp: now,
            game_type: game.game_type,
        };
        let canonical = GlobalMatchRecord {
            match_id: match_id.to_string(),
            game_id: game_id.to_string(),
            player1: game.player1.clone(),
            player2: game.player2.clone(),
            winner: winner.clone(),
            timestamp: now,
            game_type: game.game_type,
        };

        self.store
            .push(
                &player_history_path(&game.player1),
                serde_json::to_value(&record_for_p1).map_err(StoreError::Serialization)?,
            )
            .await?;
        self.store
            .push(
                &player_history_path(&game.player2),
                serde_json::to_value(&record_for_p2).map_err(StoreError::Serialization)?,
            )
            .await?;
        self.store
            .push(
                &format!("{}/{}", HISTORY_PATH, GLOBAL_LOG_KEY),
                serde_json::to_value(&canonical).map_err(StoreError::Serialization)?,
            )
            .await?;
        Ok(())
    }

    /// Page through a player's history in storage order. The returned
    /// cursor is opaque; feed it back to continue.
    pub async fn matches_for_player(
        &self,
        address: &WalletAddress,
        cursor: Option<&str>,
        limit: usize,
    ) -> CoreResult<(Vec<(String, MatchHistoryRecord)>, Option<String>)> {
        let start_after = cursor
            .map(|c| {
                hex::decode(c)
                    .ok()
                    .and_then(|b| String::from_utf8(b).ok())
                    .ok_or_else(|| StoreError::InvalidCursor(c.to_string()))
            })
            .transpose()?;

        let rows = self
            .store
            .scan(
                &player_history_path(address),
                start_after.as_deref(),
                limit.max(1),
            )
            .await?;

        let raw_count = rows.len();
        let mut records = Vec::with_capacity(raw_count);
        let mut last_key: Option<String> = None;
        for (key, value) in rows {
            match serde_json::from_value::<MatchHistoryRecord>(value) {
                Ok(record) => {
                    last_key = Some(key.clone());
                    records.push((key, record));
                }
                Err(e) => {
                    warn!(history_key = %key, error = %e, "skipping undecodable history row");
                    last_key = Some(key);
                }
            }
        }

        // Only hand back a cursor when the raw page was full. The
        // decoded count can fall short of the limit when a row is
        // skipped, and must not end pagination early.
        let next_cursor = if raw_count >= limit.max(1) {
            last_key.map(|k| hex::encode(k.as_bytes()))
        } else {
            None
        };
        Ok((records, next_cursor))
    }
}

fn outcome_for(player: &WalletAddress, winner: &WalletAddress) -> MatchOutcome {
    if player == winner {
        MatchOutcome::Win
    } else {
        MatchOutcome::Loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{Amount, GameStakes, GameStatus, GameType};

    fn completed_game(winner: &str) -> GameRecord {
        GameRecord {
            id: Some("g1".to_string()),
            player1: WalletAddress::new("0xaaa"),
            player2: WalletAddress::new("0xbbb"),
            game_type: GameType::NumberMemory,
            start_time: 1_000,
            end_time: Some(2_000),
            stakes: GameStakes {
                player1_stake: Amount::from_major(1.0),
                player2_stake: Amount::from_major(1.0),
            },
            status: GameStatus::Completed,
            winner_id: Some(WalletAddress::new(winner)),
            player1_score: Some(9.0),
            player2_score: Some(4.0),
        }
    }

    #[tokio::test]
    async fn test_fan_out_outcomes_and_shared_match_id() {
        let history = MatchHistory::new(Arc::new(MemoryStore::new()));
        let game = completed_game("0xAAA");
        history
            .add_match_for_players("g1", "m_g1", &game, &WalletAddress::new("0xaaa"))
            .await
            .unwrap();

        let (for_winner, _) = history
            .matches_for_player(&WalletAddress::new("0xaaa"), None, 10)
            .await
            .unwrap();
        let (for_loser, _) = history
            .matches_for_player(&WalletAddress::new("0xbbb"), None, 10)
            .await
            .unwrap();

        assert_eq!(for_winner.len(), 1);
        assert_eq!(for_loser.len(), 1);
        assert_eq!(for_winner[0].1.outcome, MatchOutcome::Win);
        assert_eq!(for_loser[0].1.outcome, MatchOutcome::Loss);
        assert_eq!(for_winner[0].1.match_id, for_loser[0].1.match_id);
        assert_eq!(for_winner[0].1.opponent.as_str(), "0xbbb");
        assert_eq!(for_loser[0].1.opponent.as_str(), "0xaaa");
        assert_eq!(for_winner[0].1.score, Some(9.0));
        assert_eq!(for_loser[0].1.score, Some(4.0));
    }

    #[tokio::test]
    async fn test_global_log_row() {
        let store = Arc::new(MemoryStore::new());
        let history = MatchHistory::new(store.clone());
        let game = completed_game("0xbbb");
        history
            .add_match_for_players("g1", "m_g1", &game, &WalletAddress::new("0xbbb"))
            .await
            .unwrap();

        let rows = store.scan("matchHistory/all", None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1["winner"], "0xbbb");
        assert_eq!(rows[0].1["matchId"], "m_g1");
    }

    #[tokio::test]
    async fn test_pagination_cursor() {
        let history = MatchHistory::new(Arc::new(MemoryStore::new()));
        let player = WalletAddress::new("0xaaa");
        for i in 0..5 {
            let game = completed_game("0xaaa");
            history
                .add_match_for_players(&format!("g{}", i), &format!("m_g{}", i), &game, &player)
                .await
                .unwrap();
        }

        let (page1, cursor) = history.matches_for_player(&player, None, 3).await.unwrap();
        assert_eq!(page1.len(), 3);
        let cursor = cursor.expect("full page yields a cursor");

        let (page2, _) = history
            .matches_for_player(&player, Some(&cursor), 3)
            .await
            .unwrap();
        assert_eq!(page2.len(), 2);

        let keys1: Vec<_> = page1.iter().map(|(k, _)| k).collect();
        assert!(page2.iter().all(|(k, _)| !keys1.contains(&k)));
    }

    #[tokio::test]
    async fn test_pagination_continues_past_undecodable_row() {
        let store = Arc::new(MemoryStore::new());
        let history = MatchHistory::new(store.clone());
        let player = WalletAddress::new("0xaaa");
        for i in 0..4 {
            let game = completed_game("0xaaa");
            history
                .add_match_for_players(&format!("g{}", i), &format!("m_g{}", i), &game, &player)
                .await
                .unwrap();
        }
        // A row that does not decode as a history record.
        store
            .push("matchHistory/0xaaa", serde_json::json!({"garbage": true}))
            .await
            .unwrap();

        // Walk all pages; the corrupt row is skipped but every valid
        // row is still reached.
        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, next) = history
                .matches_for_player(&player, cursor.as_deref(), 2)
                .await
                .unwrap();
            seen.extend(page.into_iter().map(|(_, r)| r.game_id));
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["g0", "g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn test_invalid_cursor_rejected() {
        let history = MatchHistory::new(Arc::new(MemoryStore::new()));
        let err = history
            .matches_for_player(&WalletAddress::new("0xaaa"), Some("not-hex!"), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::errors::CoreError::Store(StoreError::InvalidCursor(_))
        ));
    }
}

//! Matchmaking queue keyed by (game type, stake).
//!
//! Entries are partitioned by the composite key `"<gameType>#<stake>"`
//! so only stake-compatible players can pair. Matched entries are kept
//! in place as an audit trail of the queue; the `waiting -> matched`
//! transition is the only mutation.

use crate::errors::{CoreResult, StoreError};
use crate::storage::KeyValueStore;
use crate::types::{now_millis, Amount, EntryStatus, GameType, MatchmakingEntry, WalletAddress};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const QUEUE_PATH: &str = "matchmakingQueue";
const COMPOSITE_FIELD: &str = "gameTypeStake";
const DEFAULT_CANDIDATE_LIMIT: usize = 10;
const CLAIM_SCAN_PAGE: usize = 64;

/// Composite partition key. Stake formatting is fixed at two decimals,
/// so `1`, `1.0` and `1.00` land in the same partition.
pub fn composite_key(game_type: GameType, stake: Amount) -> String {
    format!("{}#{}", game_type, stake)
}

fn entry_status_path(entry_key: &str) -> String {
    format!("{}/{}/status", QUEUE_PATH, entry_key)
}

#[derive(Clone)]
pub struct MatchmakingQueue {
    store: Arc<dyn KeyValueStore>,
}

impl MatchmakingQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Add a player to the queue. No duplicate check: a player who
    /// enqueues twice owns two entries.
    pub async fn enqueue(
        &self,
        address: &str,
        game_type: GameType,
        stake: Amount,
    ) -> CoreResult<(String, MatchmakingEntry)> {
        let entry = MatchmakingEntry {
            player_address: WalletAddress::new(address),
            game_type,
            stake,
            game_type_stake: composite_key(game_type, stake),
            timestamp: now_millis(),
            status: EntryStatus::Waiting,
        };
        let value = serde_json::to_value(&entry).map_err(StoreError::Serialization)?;
        let key = self.store.push(QUEUE_PATH, value).await?;
        debug!(entry_key = %key, composite = %entry.game_type_stake, "enqueued matchmaking entry");
        Ok((key, entry))
    }

    /// Raw candidate lookup over the composite-key partition, in
    /// storage order. Does not filter `matched` entries or the
    /// caller's own entries; use [`claim_candidate`] for the race-free
    /// pairing path.
    ///
    /// [`claim_candidate`]: MatchmakingQueue::claim_candidate
    pub async fn find_candidates(
        &self,
        game_type: GameType,
        stake: Amount,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(String, MatchmakingEntry)>> {
        let composite = composite_key(game_type, stake);
        let rows = self
            .store
            .query_eq(
                QUEUE_PATH,
                COMPOSITE_FIELD,
                &Value::String(composite),
                limit.unwrap_or(DEFAULT_CANDIDATE_LIMIT),
            )
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match serde_json::from_value::<MatchmakingEntry>(value) {
                Ok(entry) => entries.push((key, entry)),
                Err(e) => {
                    // A malformed entry should not break matchmaking for
                    // everyone else in the partition.
                    warn!(entry_key = %key, error = %e, "skipping undecodable queue entry");
                }
            }
        }
        Ok(entries)
    }

    /// Mark one or two entries as matched in a single atomic
    /// multi-path update.
    pub async fn mark_matched(&self, entry_key: &str, other_key: Option<&str>) -> CoreResult<()> {
        let mut updates = vec![(entry_status_path(entry_key), json!("matched"))];
        if let Some(other) = other_key {
            updates.push((entry_status_path(other), json!("matched")));
        }
        self.store.update(updates).await?;
        Ok(())
    }

    /// Find and claim one compatible waiting opponent atomically.
    ///
    /// Pages through the whole queue in storage order, skips entries
    /// from other partitions, the requester's own entries and anything
    /// no longer `waiting`, and claims a candidate with a conditional
    /// update guarded on `status == "waiting"`. Matched entries are
    /// retained, so the scan must not stop at a fixed prefix of the
    /// partition; a waiting player behind any number of stale entries
    /// is still reachable. Two concurrent claimers racing for the same
    /// entry resolve to one winner; the loser moves on to the next
    /// candidate.
    pub async fn claim_candidate(
        &self,
        game_type: GameType,
        stake: Amount,
        requester: &WalletAddress,
    ) -> CoreResult<Option<(String, MatchmakingEntry)>> {
        let composite = composite_key(game_type, stake);
        let mut cursor: Option<String> = None;
        loop {
            let rows = self
                .store
                .scan(QUEUE_PATH, cursor.as_deref(), CLAIM_SCAN_PAGE)
                .await?;
            let last_page = rows.len() < CLAIM_SCAN_PAGE;
            cursor = rows.last().map(|(k, _)| k.clone());

            for (key, value) in rows {
                let mut entry = match serde_json::from_value::<MatchmakingEntry>(value) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(entry_key = %key, error = %e, "skipping undecodable queue entry");
                        continue;
                    }
                };
                if entry.game_type_stake != composite
                    || entry.status != EntryStatus::Waiting
                    || &entry.player_address == requester
                {
                    continue;
                }
                let claimed = self
                    .store
                    .update_if(
                        &entry_status_path(&key),
                        &json!("waiting"),
                        vec![(entry_status_path(&key), json!("matched"))],
                    )
                    .await?;
                if claimed {
                    entry.status = EntryStatus::Matched;
                    debug!(entry_key = %key, opponent = %entry.player_address, "claimed matchmaking candidate");
                    return Ok(Some((key, entry)));
                }
            }

            if last_page {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn queue() -> MatchmakingQueue {
        MatchmakingQueue::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_composite_key_normalizes_stake() {
        for stake in [1.0, 1.00] {
            assert_eq!(
                composite_key(GameType::NumberMemory, Amount::from_major(stake)),
                "number-memory#1.00"
            );
        }
        assert_eq!(
            composite_key(GameType::NumberMemory, Amount::from_cents(100)),
            "number-memory#1.00"
        );
    }

    #[tokio::test]
    async fn test_enqueue_normalizes_address() {
        let queue = queue();
        let (_, entry) = queue
            .enqueue("0xABC", GameType::Reflex, Amount::from_major(0.5))
            .await
            .unwrap();
        assert_eq!(entry.player_address.as_str(), "0xabc");
        assert_eq!(entry.status, EntryStatus::Waiting);
        assert_eq!(entry.game_type_stake, "reflex#0.50");
    }

    #[tokio::test]
    async fn test_find_candidates_matches_exact_partition() {
        let queue = queue();
        queue
            .enqueue("0xaaa", GameType::NumberMemory, Amount::from_major(1.0))
            .await
            .unwrap();
        queue
            .enqueue("0xbbb", GameType::NumberMemory, Amount::from_major(2.0))
            .await
            .unwrap();
        queue
            .enqueue("0xccc", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();

        let hits = queue
            .find_candidates(GameType::NumberMemory, Amount::from_major(1.00), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.player_address.as_str(), "0xaaa");
    }

    #[tokio::test]
    async fn test_mark_matched_updates_both_entries() {
        let queue = queue();
        let (key_a, _) = queue
            .enqueue("0xaaa", GameType::Pattern, Amount::from_major(1.0))
            .await
            .unwrap();
        let (key_b, _) = queue
            .enqueue("0xbbb", GameType::Pattern, Amount::from_major(1.0))
            .await
            .unwrap();

        queue.mark_matched(&key_a, Some(&key_b)).await.unwrap();

        let hits = queue
            .find_candidates(GameType::Pattern, Amount::from_major(1.0), None)
            .await
            .unwrap();
        assert!(hits.iter().all(|(_, e)| e.status == EntryStatus::Matched));
    }

    #[tokio::test]
    async fn test_claim_skips_own_entry_and_matched() {
        let queue = queue();
        let requester = WalletAddress::new("0xaaa");
        queue
            .enqueue("0xAAA", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        let (key_b, _) = queue
            .enqueue("0xbbb", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        queue.mark_matched(&key_b, None).await.unwrap();

        // Only the requester's own entry and a matched entry remain.
        let claimed = queue
            .claim_candidate(GameType::Reflex, Amount::from_major(1.0), &requester)
            .await
            .unwrap();
        assert!(claimed.is_none());

        queue
            .enqueue("0xccc", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();
        let claimed = queue
            .claim_candidate(GameType::Reflex, Amount::from_major(1.0), &requester)
            .await
            .unwrap();
        let (_, entry) = claimed.unwrap();
        assert_eq!(entry.player_address.as_str(), "0xccc");
        assert_eq!(entry.status, EntryStatus::Matched);
    }

    #[tokio::test]
    async fn test_claim_reaches_waiting_player_behind_stale_entries() {
        let queue = queue();
        let stake = Amount::from_major(1.0);

        // Fill the partition with already-matched entries, more than
        // the default candidate page.
        for i in 0..12 {
            let (key, _) = queue
                .enqueue(&format!("0xstale{}", i), GameType::Pattern, stake)
                .await
                .unwrap();
            queue.mark_matched(&key, None).await.unwrap();
        }
        let (fresh_key, _) = queue
            .enqueue("0xfresh", GameType::Pattern, stake)
            .await
            .unwrap();

        let claimed = queue
            .claim_candidate(GameType::Pattern, stake, &WalletAddress::new("0xrival"))
            .await
            .unwrap()
            .expect("waiting player must be reachable past stale entries");
        assert_eq!(claimed.0, fresh_key);
        assert_eq!(claimed.1.player_address.as_str(), "0xfresh");
    }

    #[tokio::test]
    async fn test_concurrent_claims_get_distinct_opponents() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let queue = MatchmakingQueue::new(store);
        queue
            .enqueue("0xccc", GameType::Reflex, Amount::from_major(1.0))
            .await
            .unwrap();

        let q1 = queue.clone();
        let q2 = queue.clone();
        let a = tokio::spawn(async move {
            q1.claim_candidate(GameType::Reflex, Amount::from_major(1.0), &WalletAddress::new("0xaaa"))
                .await
                .unwrap()
        });
        let b = tokio::spawn(async move {
            q2.claim_candidate(GameType::Reflex, Amount::from_major(1.0), &WalletAddress::new("0xbbb"))
                .await
                .unwrap()
        });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one of the two concurrent claimers may win the single
        // waiting entry.
        assert!(ra.is_some() ^ rb.is_some());
    }
}

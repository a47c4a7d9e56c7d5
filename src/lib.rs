//! Stakeduel - wallet-gated 1v1 skill-game platform core.
//!
//! Matchmaking, game lifecycle, and settlement over a path-addressed
//! key-value store. Two backends ship: an in-memory store for dev and
//! tests, and RocksDB for durable deployments.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod history;
pub mod matchmaking;
pub mod notifications;
pub mod platform_stats;
pub mod players;
pub mod storage;
pub mod types;

pub use config::{StakeduelConfig, StorageBackend};
pub use errors::{CoreError, CoreResult, StoreError, StoreResult};
pub use games::{GameService, SettlementReceipt};
pub use history::MatchHistory;
pub use matchmaking::MatchmakingQueue;
pub use notifications::NotificationStore;
pub use platform_stats::PlatformStatsStore;
pub use players::PlayerStore;
pub use storage::{KeyValueStore, MemoryStore, RocksStore};
pub use types::{
    Amount, GameRecord, GameStatus, GameType, MatchHistoryRecord, MatchOutcome, MatchmakingEntry,
    PlayerProfile, WalletAddress,
};

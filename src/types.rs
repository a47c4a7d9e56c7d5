//! Core entity types shared by the matchmaking queue, game records,
//! player profiles and match history.
//!
//! The backing datastore is shared with a JS front-end, so persisted
//! field names are camelCase and amounts are plain JSON numbers.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Current unix time in milliseconds, the timestamp unit used everywhere
/// in the persisted layout.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wallet address in canonical form: trimmed and lower-cased.
///
/// This is the only address representation in the core; normalization
/// happens once, on construction or deserialization, instead of ad hoc
/// lowercase calls scattered across modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Default display name for players without an explicit username.
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Normalize on read as well, so mixed-case data written by older
        // clients compares equal.
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// Currency amount with exactly two decimal places, stored as integer
/// cents so `1`, `1.0` and `1.00` are the same value and format the same
/// way in composite keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Build from a major-unit value, rounding to 2 decimal places.
    /// Negative inputs clamp to zero; stakes are non-negative.
    pub fn from_major(value: f64) -> Self {
        Self((value.max(0.0) * 100.0).round() as u64)
    }

    pub fn cents(self) -> u64 {
        self.0
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(Self::from_major(raw))
    }
}

/// The five supported mini-games.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GameType {
    #[serde(rename = "number-memory")]
    NumberMemory,
    #[serde(rename = "word-scramble")]
    WordScramble,
    #[serde(rename = "pattern")]
    Pattern,
    #[serde(rename = "reflex")]
    Reflex,
    #[serde(rename = "memory-match")]
    MemoryMatch,
}

impl GameType {
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::NumberMemory => "number-memory",
            GameType::WordScramble => "word-scramble",
            GameType::Pattern => "pattern",
            GameType::Reflex => "reflex",
            GameType::MemoryMatch => "memory-match",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number-memory" => Ok(GameType::NumberMemory),
            "word-scramble" => Ok(GameType::WordScramble),
            "pattern" => Ok(GameType::Pattern),
            "reflex" => Ok(GameType::Reflex),
            "memory-match" => Ok(GameType::MemoryMatch),
            other => Err(format!("unknown game type: {}", other)),
        }
    }
}

/// Matchmaking queue entry status. Transitions only waiting -> matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Matched,
}

/// One waiting player in the matchmaking queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingEntry {
    pub player_address: WalletAddress,
    pub game_type: GameType,
    pub stake: Amount,
    /// Composite partition key, `"<gameType>#<stake 2dp>"`.
    pub game_type_stake: String,
    pub timestamp: i64,
    pub status: EntryStatus,
}

/// Game record status. Transitions active -> completed exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Completed,
}

/// Symmetric wager amounts for both participants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStakes {
    pub player1_stake: Amount,
    pub player2_stake: Amount,
}

/// Authoritative record of one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// The record's own key, back-filled after creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub player1: WalletAddress,
    pub player2: WalletAddress,
    pub game_type: GameType,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub stakes: GameStakes,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<WalletAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player1_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player2_score: Option<f64>,
}

impl GameRecord {
    pub fn is_participant(&self, address: &WalletAddress) -> bool {
        &self.player1 == address || &self.player2 == address
    }
}

/// Per-address aggregate stats, upserted lazily on first touch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub address: WalletAddress,
    pub username: String,
    pub wins: u32,
    pub losses: u32,
    pub total_earnings: Amount,
    pub created_at: i64,
    pub last_active: i64,
}

/// Match outcome from one participant's perspective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

/// Append-only per-player history row. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryRecord {
    pub match_id: String,
    pub game_id: String,
    pub opponent: WalletAddress,
    pub outcome: MatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub stake: Amount,
    pub timestamp: i64,
    pub game_type: GameType,
}

/// Canonical row in the global match log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMatchRecord {
    pub match_id: String,
    pub game_id: String,
    pub player1: WalletAddress,
    pub player2: WalletAddress,
    pub winner: WalletAddress,
    pub timestamp: i64,
    pub game_type: GameType,
}

/// Per-player notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message: String,
    pub timestamp: i64,
    pub is_read: bool,
}

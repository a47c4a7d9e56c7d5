//! Request/response DTOs for the HTTP surface.
//!
//! Bodies and query strings use camelCase to match what the front-end
//! reads straight out of the shared datastore.

use crate::types::{Amount, GameRecord, GameType, MatchHistoryRecord, MatchmakingEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub address: String,
    pub game_type: GameType,
    pub stake: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub entry_key: String,
    pub entry: MatchmakingEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesQuery {
    pub game_type: GameType,
    pub stake: f64,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDto {
    pub entry_key: String,
    pub entry: MatchmakingEntry,
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub candidates: Vec<CandidateDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub address: String,
    pub game_type: GameType,
    pub stake: f64,
    /// The requester's own queue entry, marked matched on success.
    #[serde(default)]
    pub entry_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub claimed: Option<CandidateDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkMatchedRequest {
    pub entry_key: String,
    #[serde(default)]
    pub other_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub player1: String,
    pub player2: String,
    pub game_type: GameType,
    pub stake: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameResponse {
    pub key: String,
    pub game: GameRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishGameRequest {
    pub winner_address: String,
    #[serde(default)]
    pub player1_score: Option<f64>,
    #[serde(default)]
    pub player2_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub key: String,
    pub record: MatchHistoryRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub matches: Vec<HistoryRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub fn stake_amount(stake: f64) -> Amount {
    Amount::from_major(stake)
}

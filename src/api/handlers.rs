//! Request handlers bridging the HTTP surface to the core services.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::{
    games::GameService,
    history::MatchHistory,
    matchmaking::MatchmakingQueue,
    platform_stats::{PlatformStats, PlatformStatsStore},
    players::{PlayerStore, PlayerProfileUpdate},
    types::{PlayerProfile, WalletAddress},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use crate::games::SettlementReceipt;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub queue: MatchmakingQueue,
    pub games: GameService,
    pub players: PlayerStore,
    pub history: MatchHistory,
    pub stats: PlatformStatsStore,
    pub version: String,
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// POST /matchmaking
pub async fn enqueue_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let (entry_key, entry) = state
        .queue
        .enqueue(&req.address, req.game_type, stake_amount(req.stake))
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(EnqueueResponse { entry_key, entry }))
}

/// GET /matchmaking/candidates?gameType=&stake=&limit=
pub async fn candidates_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<CandidatesResponse>, ApiError> {
    let hits = state
        .queue
        .find_candidates(query.game_type, stake_amount(query.stake), query.limit)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(CandidatesResponse {
        candidates: hits
            .into_iter()
            .map(|(entry_key, entry)| CandidateDto { entry_key, entry })
            .collect(),
    }))
}

/// POST /matchmaking/claim
pub async fn claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let requester = WalletAddress::new(&req.address);
    let claimed = state
        .queue
        .claim_candidate(req.game_type, stake_amount(req.stake), &requester)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;

    if let (Some(_), Some(own_key)) = (&claimed, &req.entry_key) {
        state
            .queue
            .mark_matched(own_key, None)
            .await
            .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    }

    Ok(Json(ClaimResponse {
        claimed: claimed.map(|(entry_key, entry)| CandidateDto { entry_key, entry }),
    }))
}

/// POST /matchmaking/match
pub async fn mark_matched_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarkMatchedRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .queue
        .mark_matched(&req.entry_key, req.other_key.as_deref())
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(serde_json::json!({"ok": true})))
}

/// POST /games
pub async fn create_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<CreateGameResponse>, ApiError> {
    let (key, game) = state
        .games
        .create_game(&req.player1, &req.player2, req.game_type, stake_amount(req.stake))
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(CreateGameResponse { key, game }))
}

/// GET /games/:id
pub async fn get_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<crate::types::GameRecord>, ApiError> {
    let game = state
        .games
        .get_game(&game_id)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("game not found: {}", game_id))
        })?;
    Ok(Json(game))
}

/// POST /games/:id/finish
pub async fn finish_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    Json(req): Json<FinishGameRequest>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let receipt = state
        .games
        .finish_game(
            &game_id,
            &req.winner_address,
            req.player1_score,
            req.player2_score,
        )
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(receipt))
}

/// GET /players/:address
pub async fn get_player_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<PlayerProfile>, ApiError> {
    let address = WalletAddress::new(&address);
    let profile = state
        .players
        .get_player(&address)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("player not found: {}", address))
        })?;
    Ok(Json(profile))
}

/// PUT /players/:address
pub async fn upsert_player_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(update): Json<PlayerProfileUpdate>,
) -> Result<Json<PlayerProfile>, ApiError> {
    let address = WalletAddress::new(&address);
    let profile = state
        .players
        .create_or_update_player(&address, update)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(profile))
}

/// GET /players/:address/history?cursor=&limit=
pub async fn player_history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let address = WalletAddress::new(&address);
    let (rows, next_cursor) = state
        .history
        .matches_for_player(&address, query.cursor.as_deref(), query.limit)
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(HistoryResponse {
        matches: rows
            .into_iter()
            .map(|(key, record)| HistoryRow { key, record })
            .collect(),
        next_cursor,
    }))
}

/// GET /stats
pub async fn platform_stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlatformStats>, ApiError> {
    let snapshot = state
        .stats
        .snapshot()
        .await
        .map_err(|e| ApiError::from_core(request_id.0.clone(), e))?;
    Ok(Json(snapshot))
}

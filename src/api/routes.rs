//! Route definitions.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Matchmaking
        .route("/matchmaking", post(enqueue_handler))
        .route("/matchmaking/candidates", get(candidates_handler))
        .route("/matchmaking/claim", post(claim_handler))
        .route("/matchmaking/match", post(mark_matched_handler))
        // Games and settlement
        .route("/games", post(create_game_handler))
        .route("/games/:id", get(get_game_handler))
        .route("/games/:id/finish", post(finish_game_handler))
        // Players
        .route(
            "/players/:address",
            get(get_player_handler).put(upsert_player_handler),
        )
        .route("/players/:address/history", get(player_history_handler))
        // Platform counters
        .route("/stats", get(platform_stats_handler))
        .with_state(state)
}

//! API server setup: middleware stack, listener, graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{
    config::ApiConfig,
    games::GameService,
    history::MatchHistory,
    matchmaking::MatchmakingQueue,
    platform_stats::PlatformStatsStore,
    players::PlayerStore,
    storage::KeyValueStore,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub struct ApiServer {
    config: ApiConfig,
    store: Arc<dyn KeyValueStore>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self { config, store }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        ));

        info!("starting stakeduel API server");
        info!("   listen: http://{}", addr);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   request timeout: {}s", self.config.request_timeout_secs);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            queue: MatchmakingQueue::new(self.store.clone()),
            games: GameService::new(self.store.clone()),
            players: PlayerStore::new(self.store.clone()),
            history: MatchHistory::new(self.store.clone()),
            stats: PlatformStatsStore::new(self.store.clone()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            // Request ID first so every later layer can see it.
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS before timeout so preflights are always answered.
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}

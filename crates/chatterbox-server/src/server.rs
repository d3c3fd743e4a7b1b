//! `ChatServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chatterbox_core::{RoomId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bridge::BroadcastBridge;
use crate::config::ServerConfig;
use crate::directory::{MembershipDirectory, MessageStore};
use crate::health::{self, HealthResponse};
use crate::room::RoomRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{SessionContext, run_room_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Bus bridge (subscriptions, publishing).
    pub bridge: Arc<BroadcastBridge>,
    /// Local room membership.
    pub registry: Arc<RoomRegistry>,
    /// Optional membership check before upgrade.
    pub directory: Option<Arc<dyn MembershipDirectory>>,
    /// Handed to each WebSocket session.
    pub session: SessionContext,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    bridge: Arc<BroadcastBridge>,
    directory: Option<Arc<dyn MembershipDirectory>>,
    store: Option<Arc<dyn MessageStore>>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ChatServer {
    /// Create a server around an existing bridge (and its registry).
    pub fn new(config: ServerConfig, bridge: Arc<BroadcastBridge>) -> Self {
        Self {
            config,
            shutdown: Arc::new(ShutdownCoordinator::new(bridge.clone())),
            bridge,
            directory: None,
            store: None,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Check room membership before accepting a WebSocket.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn MembershipDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Persist chat messages after publishing them.
    #[must_use]
    pub fn with_message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: self.bridge.clone(),
            registry: self.bridge.registry().clone(),
            directory: self.directory.clone(),
            session: SessionContext::new(&self.config, self.bridge.clone(), self.store.clone()),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{room_id}/{user_id}", get(ws_handler))
            .with_state(state)
            .layer(cors_layer(&self.config.cors_origins))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`). The serve task is
    /// handed to the [`ShutdownCoordinator`], which drains it.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server failed");
            }
        });

        self.shutdown.track(handle);
        info!(%addr, "chatterbox server listening");
        Ok(addr)
    }

    /// Get the broadcast bridge.
    pub fn bridge(&self) -> &Arc<BroadcastBridge> {
        &self.bridge
    }

    /// Get the room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        self.bridge.registry()
    }

    /// Get the shutdown coordinator (also stops the bridge).
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "invalid CORS origin, ignoring");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// GET /
async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to Chatterbox API" }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.room_count(),
        state.bridge.subscription_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws/{room_id}/{user_id}
///
/// Membership is checked before the upgrade headers so a refused client gets
/// a plain HTTP status.
async fn ws_handler(
    Path((room_id, user_id)): Path<(RoomId, UserId)>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Some(directory) = &state.directory {
        match directory.lookup_room_members(&room_id).await {
            Ok(members) if members.contains(&user_id) => {}
            Ok(_) => {
                warn!(room_id = %room_id, user_id = %user_id, "rejecting non-member");
                return (StatusCode::FORBIDDEN, "not a member of this room").into_response();
            }
            Err(e) => {
                warn!(room_id = %room_id, user_id = %user_id, error = %e, "membership lookup failed");
                return (StatusCode::SERVICE_UNAVAILABLE, "membership lookup failed").into_response();
            }
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let ctx = state.session.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_room_session(socket, room_id, user_id, ctx))
}

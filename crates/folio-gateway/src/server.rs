//! Gateway HTTP server (axum)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use folio_core::{EnvSource, FailoverRouter, Profile, provider_status};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    /// Read on every request; nothing is cached between requests
    pub env: Arc<dyn EnvSource>,
    pub profile: Option<Arc<Profile>>,
    pub router: Arc<FailoverRouter>,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(env: Arc<dyn EnvSource>, profile: Option<Profile>, router: FailoverRouter) -> Self {
        Self {
            env,
            profile: profile.map(Arc::new),
            router: Arc::new(router),
            start_time: Instant::now(),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
    cors: bool,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self {
            state,
            bind,
            cors: true,
        }
    }

    /// Enable or disable the permissive CORS layer
    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/api/chat", post(crate::chat::chat_handler))
            .route("/api/status", get(status_handler));
        let router = if self.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        };
        router.with_state(self.state.clone())
    }

    /// Serve until `cancel` fires, then drain in-flight requests
    pub async fn run_until(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server (blocks until the process is killed)
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(CancellationToken::new()).await
    }
}

// ── HTTP Handlers ──

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let env = state.env.snapshot();
    let order = state.router.order();

    let mut providers = Map::new();
    for status in provider_status(&env, order) {
        let mut entry = json!({
            "available": status.available,
            "model": status.model,
        });
        if let Some(reason) = status.reason {
            entry["reason"] = Value::String(reason);
        }
        providers.insert(status.provider.id().to_string(), entry);
    }

    axum::Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "fallback_order": order.iter().map(|k| k.id()).collect::<Vec<_>>(),
        "redirect_passthrough": state.router.redirect_passthrough(),
        "profile_loaded": state.profile.is_some(),
        "providers": providers,
    }))
}

//! Process-level HTTP surface: the telephony webhook + WebSocket routes
//! plus health/readiness, wired up with the teacher's axum/tower-http
//! layering (`server/mod.rs`'s CORS + `TraceLayer` + `with_state` shape),
//! generalized from the teacher's auth-gated chat API to this process's
//! unauthenticated-by-design telephony surface (spec §6: "telephony is
//! unauthenticated within the WebSocket but gated by the webhook").

pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{any, get};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::providers::llm::LlmClient;
use crate::providers::stt::SttClient;
use crate::providers::tts::TtsClient;
use crate::session::SessionDeps;
use crate::telephony::{self, TelephonyState};
use crate::tools::ToolRegistry;

/// Build the provider clients + tool registry from configuration and
/// start listening (spec §6 external interfaces). Server state is just
/// the telephony state — spec §6 "Persisted state: None in the core".
pub async fn start(config: Config) -> Result<()> {
    let deps = SessionDeps {
        stt: Arc::new(SttClient::new(config.stt.clone())),
        llm: Arc::new(LlmClient::new(config.llm.clone())),
        tts: Arc::new(TtsClient::new(config.tts.clone())),
        tools: Arc::new(ToolRegistry::with_reservation_demo()),
    };

    let state = TelephonyState { deps, stream_path: config.server.stream_path.clone() };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route(&config.server.webhook_path, any(telephony::incoming_call))
        .route(&config.server.stream_path, get(telephony::stream_upgrade))
        .route("/health", get(http::health_handler))
        .route("/ready", get(http::ready_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, webhook = %config.server.webhook_path, stream = %config.server.stream_path, "voice agent listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

//! HTTP transport for TripForge.
//!
//! `POST /api/v1/ai` takes `{"prompt": TripRequest}` and answers
//! `{"result": TripPlan}`. A body that does not parse is a 400; a planning
//! hard error is a 500. `GET /health` reports status and version.
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use tripforge_core::trip::{TripPlan, TripRequest};
use tripforge_planner::{Provenance, TripPlanner};

/// Response header naming where the plan came from (`model` or `fallback`).
pub const PLAN_SOURCE_HEADER: &str = "x-plan-source";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub planner: Arc<TripPlanner>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(planner: Arc<TripPlanner>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/ai", post(plan_handler))
        .with_state(Arc::new(GatewayState { planner }))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, search backend and planner once and shares them
/// across requests. Runs until Ctrl-C.
pub async fn start(config: tripforge_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = tripforge_providers::router::build_from_config(&config);
    let provider = router.default().ok_or_else(|| {
        format!(
            "no provider registered under '{}'; check default_provider",
            config.default_provider
        )
    })?;
    if !config.has_api_key() {
        warn!(provider = %config.default_provider, "No API key configured; model calls will fail");
    }
    if !config.has_search_credentials() {
        warn!("Search key or engine ID missing; web_search will report no results");
    }

    let search = Arc::new(tripforge_tools::GoogleSearchProvider::from_config(&config.search));
    let planner = Arc::new(TripPlanner::from_config(&config, provider, search)?);

    let app = build_router(planner);

    info!(addr = %addr, provider = %config.default_provider, model = %config.default_model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct PlanRequest {
    prompt: TripRequest,
}

#[derive(Serialize)]
struct PlanResponse {
    result: TripPlan,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn plan_handler(
    State(state): State<SharedState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Json(PlanRequest { prompt }) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected planning request");
        error_response(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;

    let request_id = Uuid::new_v4();
    info!(
        request_id = %request_id,
        user_id = %prompt.user_id,
        from = %prompt.start_position,
        to = %prompt.end_position,
        "Planning request received"
    );

    let outcome = state.planner.run(&prompt).await.map_err(|e| {
        error!(request_id = %request_id, error = %e, "Planning failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let source = match outcome.provenance {
        Provenance::Model => "model",
        Provenance::Fallback(_) => "fallback",
    };
    info!(
        request_id = %request_id,
        source,
        rounds = outcome.rounds,
        searches = outcome.search_calls,
        "Planning request completed"
    );

    Ok((
        [(
            HeaderName::from_static(PLAN_SOURCE_HEADER),
            HeaderValue::from_static(source),
        )],
        Json(PlanResponse {
            result: outcome.plan,
        }),
    )
        .into_response())
}

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info};

use crate::mjpeg;
use crate::servo::{HardwareContext, Orientation, ServoState};
use crate::streaming::{FrameDistributor, FrameStats, PipelineStats, StatsSnapshot};

const FALLBACK_INDEX: &str = include_str!("../site/index.html");
const FALLBACK_SCRIPT: &str = include_str!("../site/script.js");

/// Status sent when an orientation had to be clamped; the page vibrates.
pub const CLAMPED_STATUS: u16 = 210;

/// Web server state
#[derive(Clone)]
pub struct AppState {
    distributor: Arc<FrameDistributor>,
    stats: Arc<PipelineStats>,
    hardware: Arc<HardwareContext>,
    site_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        distributor: Arc<FrameDistributor>,
        stats: Arc<PipelineStats>,
        hardware: HardwareContext,
        site_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            distributor,
            stats,
            hardware: Arc::new(hardware),
            site_dir: Arc::new(site_dir.into()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(state.site_dir.as_path());

    Router::new()
        .route("/", get(index_handler))
        .route("/script.js", get(script_handler))
        .route("/video", get(video_handler))
        .route("/orient", post(orient_handler))
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn run_server(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!("Starting web server on http://{}", listener.local_addr()?);

    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn read_site_file(state: &AppState, name: &str) -> Option<String> {
    let path = state.site_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Failed to load {}: {}, using built-in copy", path.display(), e);
            None
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let html = read_site_file(&state, "index.html")
        .await
        .unwrap_or_else(|| FALLBACK_INDEX.to_string());
    Html(html)
}

async fn script_handler(State(state): State<AppState>) -> Response {
    let script = read_site_file(&state, "script.js")
        .await
        .unwrap_or_else(|| FALLBACK_SCRIPT.to_string());
    ([(header::CONTENT_TYPE, "application/javascript")], script).into_response()
}

/// MJPEG stream. One frame is thrown away before the response starts so a
/// frame held from before the connection is never shown.
async fn video_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let mut subscriber = state.distributor.subscribe(peer.to_string());
    subscriber.skip_stale().await;
    mjpeg::stream_response(subscriber)
}

async fn orient_handler(
    State(state): State<AppState>,
    body: Result<Json<Orientation>, JsonRejection>,
) -> Response {
    let Json(orientation) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected orientation body");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let servo_state: ServoState = match state.hardware.apply(&orientation) {
        Ok(servo_state) => servo_state,
        Err(e) => {
            error!(error = %e, "Failed to move servos");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let status = if servo_state.clamped() {
        debug!(
            alpha = orientation.alpha,
            gamma = orientation.gamma,
            "Orientation outside servo travel"
        );
        StatusCode::from_u16(CLAMPED_STATUS).unwrap_or(StatusCode::OK)
    } else {
        StatusCode::OK
    };

    (status, Json(servo_state)).into_response()
}

/// Health check response
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

#[derive(Serialize)]
struct StatsResponse {
    pipeline: StatsSnapshot,
    distribution: FrameStats,
    servos: bool,
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        pipeline: state.stats.snapshot(),
        distribution: state.distributor.stats(),
        servos: state.hardware.has_servos(),
    })
}

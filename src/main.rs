use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use quotebot::controller::{self, StatusCallback, SESSION_NOT_FOUND};
use quotebot::types::*;
use quotebot::AppState;

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["QUOTEBOT_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting quotebot");

    let state = Arc::new(AppState::new());
    info!("target form: {}", state.config.resolve_target_url());

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/api/jobs", post(start_job_handler))
        .route("/api/jobs/{job_id}", get(job_status_handler))
        .route("/api/jobs/{job_id}", delete(cancel_job_handler))
        .route("/api/jobs/{job_id}/otp", post(submit_otp_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(5080);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/QUOTEBOT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("quotebot listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    // In-flight jobs are cancelled on restart by design; make sure no
    // Chromium process outlives us.
    info!("shutting down — closing live sessions");
    state.sessions.shutdown_all().await;
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "quotebot",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// POST /api/jobs — validate, mint a job id, and kick off the session in the
/// background. Returns 202 immediately; progress is observed via polling.
async fn start_job_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobStatus>), (StatusCode, Json<ErrorResponse>)> {
    if let Err(reason) = request.validate() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse { error: reason }),
        ));
    }

    let job_id = uuid::Uuid::new_v4().to_string();
    let initial = JobStatus::progress(&job_id, JobState::Pending, "job accepted");

    // Retain terminal updates so polling still answers after teardown.
    let callback_state = state.clone();
    let on_update: StatusCallback = Arc::new(move |status: JobStatus| {
        callback_state.record_terminal(status);
    });

    let task_state = state.clone();
    let task_job_id = job_id.clone();
    tokio::spawn(async move {
        controller::start_session(&task_state, &task_job_id, request, on_update).await;
    });

    Ok((StatusCode::ACCEPTED, Json(initial)))
}

/// GET /api/jobs/{job_id} — status projection; 404 on a true miss.
async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatus>, (StatusCode, Json<ErrorResponse>)> {
    match controller::get_status(&state, &job_id).await {
        Some(status) => Ok(Json(status)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no job found for id {}", job_id),
            }),
        )),
    }
}

/// POST /api/jobs/{job_id}/otp — phase two of the two-phase protocol.
async fn submit_otp_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(request): Json<OtpRequest>,
) -> Result<Json<JobStatus>, (StatusCode, Json<ErrorResponse>)> {
    let code = request.code.trim();
    if code.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "otp code must not be empty".to_string(),
            }),
        ));
    }

    let status = controller::submit_otp(&state, &job_id, code).await;
    if status.state == JobState::Failed && status.message != SESSION_NOT_FOUND {
        error!("job {}: OTP verification failed: {}", job_id, status.message);
    }
    // The unknown-job shape is reportable, not a real job outcome — it must
    // not overwrite or create a terminal record.
    if status.message != SESSION_NOT_FOUND {
        state.record_terminal(status.clone());
    }
    Ok(Json(status))
}

/// DELETE /api/jobs/{job_id} — idempotent cancel.
async fn cancel_job_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = controller::cancel_session(&state, &job_id).await;
    Json(CancelResponse { job_id, cancelled })
}

//! HTTP server for the mp3 endpoints
//!
//! Provides POST /mp3 (plus its CORS preflight), /files/{name} and /health.

use crate::error::{ApiError, FetchError};
use crate::fetcher::AudioFetcher;
use crate::types::{HealthResponse, StoreHealth};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use file_artifact_store::{ArtifactStore, EvictionPolicy, InFlight};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};
use video_id::VideoId;

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: ArtifactStore,
    pub eviction: EvictionPolicy,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub in_flight: InFlight<FetchError>,
    /// Base used for returned links instead of the request Host header
    pub public_url: Option<String>,
    pub started_at: DateTime<Utc>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ServerState {
    pub fn new(
        store: ArtifactStore,
        eviction: EvictionPolicy,
        fetcher: Arc<dyn AudioFetcher>,
        public_url: Option<String>,
    ) -> Self {
        Self {
            store,
            eviction,
            fetcher,
            in_flight: InFlight::new(),
            public_url,
            started_at: Utc::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `{host}/files/{id}.{ext}`, newline-terminated
    fn artifact_link(&self, headers: &HeaderMap, id: &VideoId) -> String {
        let base = match &self.public_url {
            Some(url) => url.as_str(),
            None => headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default(),
        };
        format!("{}/files/{}\n", base, self.store.file_name(id.as_str()))
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    // Answers every OPTIONS request, browser preflight or not
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let files = ServeDir::new(state.store.root());

    Router::new()
        .route("/health", get(health))
        .route("/mp3", post(convert).fallback(method_not_allowed))
        .nest_service("/files", files)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;
    let (status, stats) = match state.store.stats().await {
        Ok(stats) => ("ok", stats),
        Err(e) => {
            warn!(error = %e, "Failed to scan store for health check");
            ("degraded", Default::default())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_secs,
        store: StoreHealth {
            artifacts: stats.artifacts,
            total_size: stats.total_size,
            budget_bytes: state.eviction.budget_bytes(),
            hits: state.hits.load(Ordering::Relaxed),
            misses: state.misses.load(Ordering::Relaxed),
            in_flight: state.in_flight.len(),
        },
    })
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Turn a video URL into a hosted mp3 and return its link.
///
/// The body is the raw URL. Cache hits return immediately; misses download
/// into the store and then run an eviction pass in the background.
async fn convert(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<String, ApiError> {
    let body = body.map_err(|e| ApiError::Internal(format!("Error reading request body: {}", e)))?;

    let url = match std::str::from_utf8(&body) {
        Ok(text) => text.trim(),
        Err(_) => return Err(ApiError::BadRequest("Invalid URL")),
    };
    if url.is_empty() {
        return Err(ApiError::BadRequest("URL not provided"));
    }
    if !video_id::is_valid_url(url) {
        return Err(ApiError::BadRequest("Invalid URL"));
    }
    let id = video_id::extract(url).ok_or(ApiError::BadRequest("Bad URL"))?;
    debug!(url, id = %id, "Extracted video id");

    if state.store.exists(id.as_str()).await {
        state.hits.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, "Cache hit");
        return Ok(state.artifact_link(&headers, &id));
    }
    state.misses.fetch_add(1, Ordering::Relaxed);

    let (outcome, _) = state
        .in_flight
        .run(id.as_str(), || {
            produce(Arc::clone(&state), url.to_string(), id.clone())
        })
        .await;
    outcome?;

    Ok(state.artifact_link(&headers, &id))
}

/// Download `url` into the staging area and commit it under `id`
async fn produce(state: SharedState, url: String, id: VideoId) -> Result<(), FetchError> {
    // Another download may have finished between the cache check and now
    if state.store.exists(id.as_str()).await {
        return Ok(());
    }

    let staged = state.store.staging_path(id.as_str());
    if let Err(e) = state.fetcher.fetch(&url, &staged).await {
        state.store.discard_staged(id.as_str()).await;
        return Err(e);
    }

    let path = state.store.commit(id.as_str()).await?;
    info!(id = %id, path = ?path, "Stored new artifact");

    // Runs even if every waiting client has disconnected, and never holds up
    // the responses waiting on this download
    let eviction_state = Arc::clone(&state);
    tokio::spawn(async move {
        let evicted = eviction_state
            .eviction
            .enforce(&eviction_state.store)
            .await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Eviction pass removed artifacts");
        }
    });

    Ok(())
}

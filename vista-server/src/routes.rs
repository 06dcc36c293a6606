use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;
use vista_core::GenerationError;

use crate::{
    encode::image_to_base64_png,
    error::{ApiError, Result},
    state::AppState,
};

pub const STATUS_MESSAGE: &str = "EventVista Image Generator is running";

#[derive(Error, Debug, PartialEq, Eq)]
#[error("prompt must contain at least 1 character")]
pub struct EmptyPrompt;

/// A prompt that is known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Prompt(String);

impl TryFrom<String> for Prompt {
    type Error = EmptyPrompt;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value.is_empty() {
            Err(EmptyPrompt)
        } else {
            Ok(Self(value))
        }
    }
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub prompt: Prompt,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub status: String,
    pub model: String,
}

/// Body of `GET /health`, computed on every call.
///
/// `cuda_available` is true only for a usable CUDA device; Metal builds report false.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cuda_available: bool,
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/generate", post(generate_image_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        status: STATUS_MESSAGE.to_string(),
        model: state.model_name.clone(),
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        cuda_available: vista_core::cuda_available(),
        model_loaded: state.pipeline.pipeline().is_some(),
        load_error: state.pipeline.failure().map(str::to_string),
    })
}

async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>> {
    let Json(request) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let pipeline = state
        .pipeline
        .pipeline()
        .cloned()
        .ok_or(ApiError::ModelNotLoaded)?;

    let permit = match &state.limiter {
        Some(limiter) => Some(
            limiter
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        ),
        None => None,
    };

    info!(prompt = %request.prompt.as_str(), "generating image");
    let prompt = request.prompt.into_inner();
    let params = state.params.clone();

    // The blocking task owns the permit so it is held until inference ends,
    // even if the client goes away first.
    let worker = pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let encoded = worker
            .generate(&prompt, &params)
            .and_then(|img| image_to_base64_png(&img).map_err(GenerationError::from));
        if encoded.is_err() {
            worker.release_cached_memory();
        }
        encoded
    })
    .await;

    match result {
        Ok(Ok(image)) => {
            info!(bytes = image.len(), "image generated");
            Ok(Json(GenerationResponse { image }))
        }
        Ok(Err(GenerationError::OutOfMemory(cause))) => {
            warn!(%cause, "generation ran out of accelerator memory");
            Err(ApiError::OutOfMemory)
        }
        Ok(Err(GenerationError::Failed(cause))) => {
            let correlation_id = Uuid::new_v4();
            error!(%correlation_id, "generation failed: {cause:#}");
            Err(ApiError::Generation { correlation_id })
        }
        Err(join_error) => {
            let correlation_id = Uuid::new_v4();
            error!(%correlation_id, "generation task aborted: {join_error}");
            // A panicking sampler never reached the release inside the task.
            let released =
                tokio::task::spawn_blocking(move || pipeline.release_cached_memory()).await;
            if let Err(e) = released {
                warn!("releasing accelerator memory failed: {e}");
            }
            Err(ApiError::Generation { correlation_id })
        }
    }
}

//! HTTP surface — JSON endpoints over the recognition service.
//!
//! Images travel as base64 (or data URLs) inside JSON bodies, the form
//! the web clients already produce. Every rejection carries a reason
//! class with a distinct user-facing message.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::RgbImage;
use lineup_core::{
    EnrollOptions, ExtractError, RecognitionService, RejectReason, ServiceError,
    SimilarityCandidate, StoreError,
};
use lineup_imaging::{AcquisitionError, NormalizeOptions};
use lineup_store::SqliteDescriptorStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ThresholdPolicy;
use crate::engine::EngineHandle;

pub type Service = RecognitionService<EngineHandle, SqliteDescriptorStore>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub policy: ThresholdPolicy,
    pub normalize: NormalizeOptions,
    pub op_timeout: Duration,
    pub search_limit: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/enroll", post(enroll))
        .route("/v1/verify", post(verify))
        .route("/v1/identify", post(identify))
        .route("/v1/deactivate", post(deactivate))
        .route("/v1/descriptors", get(descriptors))
        .route("/v1/status", get(status))
        .with_state(state)
}

pub enum ApiError {
    Acquisition(AcquisitionError),
    Service(ServiceError),
    Timeout(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Acquisition(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Service(ServiceError::Extract(ExtractError::NoFaceDetected)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no face in photo".to_string())
            }
            ApiError::Service(ServiceError::Store(StoreError::Unavailable(detail))) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("descriptor store unavailable: {detail}"),
            ),
            ApiError::Service(e @ ServiceError::DuplicateIdentity { .. }) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            ApiError::Service(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Timeout(op) => (StatusCode::GATEWAY_TIMEOUT, format!("{op} timed out")),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// User-facing message per rejection class — each class has a different
/// correct user action.
fn reason_message(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::NoFaceDetected => "no face in photo — retake the picture",
        RejectReason::BelowThreshold => "face not recognized — try another sign-in method",
        RejectReason::NoEnrolledDescriptors => "no enrolled face to compare against",
    }
}

/// Decode the transport payload and normalize it to the configured cap.
fn decode_image(payload: &str, opts: NormalizeOptions) -> Result<RgbImage, ApiError> {
    let bytes = lineup_imaging::decode_transport(payload).map_err(ApiError::Acquisition)?;
    let normalized = lineup_imaging::normalize(&bytes, opts).map_err(ApiError::Acquisition)?;
    Ok(normalized.image)
}

/// Bound one service operation by the configured timeout. A timeout is a
/// retryable failure for the caller — never a silent reject.
async fn bounded<T>(
    timeout: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(ApiError::Service),
        Err(_) => Err(ApiError::Timeout(op)),
    }
}

#[derive(Deserialize)]
struct EnrollRequest {
    owner_id: String,
    /// Base64 or data-URL encoded capture.
    image: String,
    #[serde(default)]
    replace: bool,
    source_ref: Option<String>,
    /// Override for the duplicate-guard threshold.
    duplicate_threshold: Option<f32>,
}

#[derive(Serialize)]
struct EnrollResponse {
    descriptor_id: String,
    owner_id: String,
    deactivated: u64,
}

async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let image = decode_image(&req.image, state.normalize)?;
    let opts = EnrollOptions {
        replace: req.replace,
        source_image: req.source_ref,
        duplicate_threshold: Some(req.duplicate_threshold.unwrap_or(state.policy.duplicate)),
    };

    let outcome = bounded(
        state.op_timeout,
        "enroll",
        state.service.enroll(&req.owner_id, image, opts),
    )
    .await?;

    Ok(Json(EnrollResponse {
        descriptor_id: outcome.descriptor_id,
        owner_id: outcome.owner_id,
        deactivated: outcome.deactivated,
    }))
}

#[derive(Deserialize)]
struct VerifyRequest {
    image: String,
    /// Override for the sign-in threshold.
    threshold: Option<f32>,
}

#[derive(Serialize)]
struct VerifyResponse {
    accepted: bool,
    matched_owner: Option<String>,
    similarity: f32,
    reason: Option<RejectReason>,
    message: Option<&'static str>,
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let image = decode_image(&req.image, state.normalize)?;
    let threshold = req.threshold.unwrap_or(state.policy.login);

    let outcome = bounded(
        state.op_timeout,
        "verify",
        state.service.verify(image, threshold, state.search_limit),
    )
    .await?;

    Ok(Json(VerifyResponse {
        accepted: outcome.accepted,
        matched_owner: outcome.matched_owner,
        similarity: outcome.similarity,
        reason: outcome.reason,
        message: outcome.reason.map(reason_message),
    }))
}

#[derive(Deserialize)]
struct IdentifyRequest {
    image: String,
    /// Override for the watchlist threshold.
    threshold: Option<f32>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct IdentifyResponse {
    alert: bool,
    candidates: Vec<SimilarityCandidate>,
}

async fn identify(
    State(state): State<AppState>,
    Json(req): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let image = decode_image(&req.image, state.normalize)?;
    let threshold = req.threshold.unwrap_or(state.policy.watchlist);
    let limit = req.limit.unwrap_or(state.search_limit);

    let candidates = bounded(
        state.op_timeout,
        "identify",
        state.service.identify(image, threshold, limit),
    )
    .await?;

    Ok(Json(IdentifyResponse {
        alert: !candidates.is_empty(),
        candidates,
    }))
}

#[derive(Deserialize)]
struct DeactivateRequest {
    owner_id: String,
}

#[derive(Serialize)]
struct DeactivateResponse {
    deactivated: u64,
}

async fn deactivate(
    State(state): State<AppState>,
    Json(req): Json<DeactivateRequest>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let deactivated = bounded(
        state.op_timeout,
        "deactivate",
        state.service.deactivate(&req.owner_id),
    )
    .await?;
    Ok(Json(DeactivateResponse { deactivated }))
}

#[derive(Serialize)]
struct DescriptorSummary {
    id: String,
    owner_id: String,
    captured_at: String,
    source_image: Option<String>,
}

async fn descriptors(
    State(state): State<AppState>,
) -> Result<Json<Vec<DescriptorSummary>>, ApiError> {
    let roster = bounded(state.op_timeout, "descriptors", state.service.roster()).await?;

    // Vectors never leave the store boundary.
    Ok(Json(
        roster
            .into_iter()
            .map(|record| DescriptorSummary {
                id: record.id,
                owner_id: record.owner_id,
                captured_at: record.captured_at.to_rfc3339(),
                source_image: record.source_image,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    active_descriptors: usize,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let roster = bounded(state.op_timeout, "status", state.service.roster()).await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        active_descriptors: roster.len(),
    }))
}

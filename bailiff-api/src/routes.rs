//! Receiver HTTP surface.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bailiff_envelope::{Bailiff, CaseSubmission, EnvelopeShape, Identity, KeyId};
use bailiff_registry::{ActiveKey, KeySummary, RegisterRequest, Registry};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cases::{CaseId, CaseStore, CaseStoreError, CaseSummary, NewCase};
use crate::error::ApiError;

pub const VERIFIED_HEADER: &str = "x-content-verified";
pub const DIGEST_HEADER: &str = "x-content-digest";
pub const DIGEST_MISMATCH_WARNING: &str = "199 - \"content digest mismatch\"";

const DEFAULT_FILE_NAME: &str = "document.pdf";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub identity: Arc<Identity>,
    pub cases: Arc<dyn CaseStore>,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(VERIFIED_HEADER),
            HeaderName::from_static(DIGEST_HEADER),
            header::WARNING,
            header::CONTENT_DISPOSITION,
        ]);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/crypto/public-key", get(public_key))
        .route("/keys/active", get(active_keys))
        .route("/keys", get(list_keys).post(register_key))
        .route("/keys/:key_id/revoke", post(revoke_key))
        .route("/cases/receive", post(receive_case))
        .route("/cases", get(list_cases))
        .route("/cases/:id", get(get_case))
        .route("/cases/:id/download", get(download_case))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
    pub key_id: KeyId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredResponse {
    pub key_id: KeyId,
    pub device_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedResponse {
    pub key_id: KeyId,
    pub device_name: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedCase {
    pub id: CaseId,
}

/// Body rejections are 400s, except an oversized body keeps its 413.
fn bad_json(rejection: JsonRejection) -> ApiError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(rejection.body_text()),
        _ => ApiError::BadRequest(rejection.body_text()),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.identity.public_pem().to_string(),
        key_id: state.identity.key_id().clone(),
    })
}

async fn active_keys(State(state): State<AppState>) -> Result<Json<Vec<ActiveKey>>, ApiError> {
    Ok(Json(state.registry.active_keys().await?))
}

async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<KeySummary>>, ApiError> {
    Ok(Json(state.registry.all_keys().await?))
}

async fn register_key(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    let Json(req) = body.map_err(bad_json)?;
    let row = state.registry.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse {
            key_id: row.key_id,
            device_name: row.device_name,
        }),
    ))
}

async fn revoke_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<RevokedResponse>, ApiError> {
    let row = state.registry.revoke(&KeyId::new(key_id)).await?;
    Ok(Json(RevokedResponse {
        key_id: row.key_id,
        device_name: row.device_name,
        is_active: row.is_active,
    }))
}

/// Store a submitted envelope as-is. Nothing is decrypted here.
async fn receive_case(
    State(state): State<AppState>,
    body: Result<Json<CaseSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedCase>), ApiError> {
    let Json(submission) = body.map_err(bad_json)?;

    let case_name = submission.case_name.trim().to_string();
    if case_name.is_empty() {
        return Err(ApiError::BadRequest("caseName must not be blank".into()));
    }
    let file_name = match submission.file_name.trim() {
        "" => DEFAULT_FILE_NAME.to_string(),
        name => name.to_string(),
    };

    let envelope = submission.envelope;
    envelope.validate()?;

    let own = state.identity.key_id();
    if envelope.wrapped_keys.shape() == EnvelopeShape::MultiRecipient
        && !envelope.wrapped_keys.key_ids().contains(own)
    {
        warn!(key_id = %own, case_name = %case_name, "envelope carries no wrapped key for this receiver");
    }

    let digest = envelope.content_digest.clone();
    let shape = envelope.wrapped_keys.shape();
    let id = state.cases.insert(NewCase {
        case_name,
        file_name,
        envelope,
    })?;

    info!(case_id = id, shape = shape.as_str(), digest = %digest, "case received");
    Ok((StatusCode::CREATED, Json(CreatedCase { id })))
}

async fn list_cases(State(state): State<AppState>) -> Result<Json<Vec<CaseSummary>>, ApiError> {
    let cases = state.cases.list()?;
    Ok(Json(cases.iter().map(CaseSummary::from).collect()))
}

async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<CaseId>,
) -> Result<Json<CaseSummary>, ApiError> {
    let case = state.cases.get(id)?.ok_or(CaseStoreError::NotFound(id))?;
    Ok(Json(CaseSummary::from(&case)))
}

/// Open a stored envelope with the receiver identity and stream the
/// plaintext. A digest mismatch is reported in headers, never blocked.
async fn download_case(
    State(state): State<AppState>,
    Path(id): Path<CaseId>,
) -> Result<Response, ApiError> {
    let case = state.cases.get(id)?.ok_or(CaseStoreError::NotFound(id))?;
    let doc = Bailiff::new().open(&case.envelope, &state.identity)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            attachment_name(&case.file_name)
        ))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    );
    headers.insert(
        HeaderName::from_static(VERIFIED_HEADER),
        HeaderValue::from_static(if doc.verified { "true" } else { "false" }),
    );
    headers.insert(
        HeaderName::from_static(DIGEST_HEADER),
        HeaderValue::from_str(&doc.computed_digest).map_err(|e| ApiError::BadRequest(e.to_string()))?,
    );
    if doc.verified {
        info!(case_id = id, bytes = doc.plaintext.len(), "case opened");
    } else {
        headers.insert(header::WARNING, HeaderValue::from_static(DIGEST_MISMATCH_WARNING));
        warn!(
            case_id = id,
            expected = %doc.expected_digest,
            computed = %doc.computed_digest,
            "serving case whose content digest does not match"
        );
    }

    Ok((headers, doc.plaintext.to_vec()).into_response())
}

/// Header-safe file name: printable ASCII without quotes or path separators.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | ' ' | '(' | ')' => c,
            _ => '_',
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

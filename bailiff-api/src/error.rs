//! HTTP error mapping. Every failure leaves the server as `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bailiff_envelope::EnvelopeError;
use bailiff_registry::RegistryError;
use serde::Serialize;
use thiserror::Error;

use crate::cases::CaseStoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Cases(#[from] CaseStoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Registry(e) => match e {
                RegistryError::Conflict(_) => StatusCode::CONFLICT,
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::InvalidPublicKey(_) | RegistryError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Envelope(e) => match e {
                EnvelopeError::RecipientNotFound { .. } => StatusCode::FORBIDDEN,
                EnvelopeError::Unwrap | EnvelopeError::Authentication => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EnvelopeError::NoRecipients
                | EnvelopeError::Malformed(_)
                | EnvelopeError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                EnvelopeError::Random => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cases(CaseStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Cases(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

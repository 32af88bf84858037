//! Maps domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use centra_attestation::{AttestationError, TokenError};
use centra_licensing::LicensingError;
use serde::Serialize;

/// The wire-level shape of every error response: `{ "error": "<message>" }`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Newtype wrapper so handlers can return `Result<T, ApiError>` directly.
pub struct ApiError(pub AttestationError);

impl From<AttestationError> for ApiError {
    fn from(source: AttestationError) -> Self {
        Self(source)
    }
}

impl From<LicensingError> for ApiError {
    fn from(source: LicensingError) -> Self {
        Self(AttestationError::Licensing { source, context: None })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self.0, "unhandled attestation error");
        }

        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

fn status_for(err: &AttestationError) -> StatusCode {
    match err {
        AttestationError::ValidationFailed { .. } | AttestationError::KeyMalformed { .. } => {
            StatusCode::BAD_REQUEST
        }
        AttestationError::TokenMismatch { .. }
        | AttestationError::NonceInvalid { .. }
        | AttestationError::SignatureInvalid { .. } => StatusCode::FORBIDDEN,
        AttestationError::Token { source, .. } => match source {
            TokenError::Expired { .. } | TokenError::Invalid { .. } | TokenError::Malformed { .. } => {
                StatusCode::UNAUTHORIZED
            }
        },
        AttestationError::Licensing { source, .. } => match source {
            LicensingError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            LicensingError::LicenseInvalid { .. } | LicensingError::LocalNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            LicensingError::LicenseInactive { .. }
            | LicensingError::LicenseExpired { .. }
            | LicensingError::LimitExhausted { .. } => StatusCode::FORBIDDEN,
            LicensingError::LocalAlreadyExists { .. } => StatusCode::CONFLICT,
            LicensingError::StorageUnavailable { .. } | LicensingError::Internal { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        },
        AttestationError::KeyStore { .. } | AttestationError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

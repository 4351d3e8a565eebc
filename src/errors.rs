use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::instrument::InstrumentError;
use crate::ledger::LedgerError;

/// The crate-wide error taxonomy (spec.md §7). Kinds, not wire names:
/// the HTTP status each maps to is fixed by `status_code`, the body is
/// always `{"detail": "<message>"}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing Authorization header")]
    AuthMissing,
    #[error("malformed Authorization header")]
    AuthMalformed,
    #[error("unknown API key")]
    AuthUnknown,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("instrument unknown")]
    InstrumentUnknown,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    InsufficientFunds(#[from] LedgerError),
    #[error("insufficient liquidity to fill the order")]
    LiquidityInsufficient,
    #[error("order is not cancellable")]
    NotCancellable,
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthMissing => StatusCode::UNAUTHORIZED,
            AppError::AuthMalformed => StatusCode::UNAUTHORIZED,
            AppError::AuthUnknown => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InstrumentUnknown => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientFunds(_) => StatusCode::BAD_REQUEST,
            AppError::LiquidityInsufficient => StatusCode::BAD_REQUEST,
            AppError::NotCancellable => StatusCode::BAD_REQUEST,
            AppError::Instrument(InstrumentError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Instrument(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
        } else {
            tracing::warn!(error = %self, %status, "request rejected");
        }
        (
            status,
            Json(json!(ErrorBody {
                detail: self.to_string(),
            })),
        )
            .into_response()
    }
}

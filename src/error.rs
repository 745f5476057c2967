// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::events::{DecodeError, ReconcileError};
use crate::storage::LedgerDbError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<LedgerDbError> for ApiError {
    fn from(e: LedgerDbError) -> Self {
        match e {
            LedgerDbError::NotFound(what) => ApiError::not_found(format!("Not found: {what}")),
            LedgerDbError::Conflict(what) => ApiError::conflict(what),
            LedgerDbError::InsufficientBalance { .. } | LedgerDbError::LimitExceeded { .. } => {
                ApiError::unprocessable(e.to_string())
            }
            other => ApiError::internal(format!("Ledger error: {other}")),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(e: DecodeError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::AddressNotFound { .. } => ApiError::internal(e.to_string()),
            ReconcileError::Unrecognized(_) | ReconcileError::InvalidEvent(_) => {
                ApiError::bad_request(e.to_string())
            }
            ReconcileError::InsufficientBalance(_) | ReconcileError::ReservedSetting(_) => {
                ApiError::unprocessable(e.to_string())
            }
            ReconcileError::NoHandler(_) => ApiError::internal(e.to_string()),
            ReconcileError::Ledger(inner) => inner.into(),
        }
    }
}

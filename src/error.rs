use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::files::FileError;
use crate::store::StoreError;
use crate::ticket::TransitionError;
use crate::travel::approval::ApprovalError;
use crate::travel::pdf::ReportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Login required")]
    Unauthorized,

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Upload error: {0}")]
    File(#[from] FileError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Approval(ApprovalError::NotAnApprover(_)) => StatusCode::FORBIDDEN,
            AppError::Transition(_) | AppError::Approval(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Report(_) | AppError::File(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Messages to show the user; validation errors keep one entry per field
    pub fn messages(&self) -> Vec<String> {
        match self {
            AppError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<Vec<String>> for AppError {
    fn from(errors: Vec<String>) -> Self {
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        (status, Json(json!({ "status": "error", "errors": self.messages() }))).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::bot_check::VerdictReason;

/// One failed field constraint, shown to the form UI for per-field feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Wire shape for failed requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    /// Human-readable error description
    pub message: String,
    /// Per-field validation issues, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<FieldIssue>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Datos inválidos")]
    MalformedRequest,

    #[error("Datos inválidos")]
    Validation(Vec<FieldIssue>),

    #[error("{}", .0.rejection_message())]
    BotCheckRejected(VerdictReason),

    #[error("{0}")]
    ConfigMissing(&'static str),

    #[error("{0}")]
    EmailProvider(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest | Self::Validation(_) | Self::BotCheckRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ConfigMissing(_)
            | Self::EmailProvider(_)
            | Self::Ledger(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Per-field issues carried by validation failures, when present.
    pub fn issues(&self) -> Option<&[FieldIssue]> {
        match self {
            Self::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            ok: false,
            message: self.to_string(),
            issues: match self {
                Self::Validation(issues) => Some(issues),
                _ => None,
            },
        };

        (status, Json(err)).into_response()
    }
}

//! Error types for the pdfqa server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfqa_core::PdfQaError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::llm::LlmError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM timeout: {0}")]
    LlmTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::InvalidPdf(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Llm(_) => StatusCode::BAD_GATEWAY,
            ServerError::LlmTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "INVALID_REQUEST",
            ServerError::InvalidPdf(_) => "INVALID_PDF",
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServerError::Llm(_) => "LLM_ERROR",
            ServerError::LlmTimeout(_) => "LLM_TIMEOUT",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "{}", self);
        } else {
            warn!(code = self.code(), "{}", self);
        }

        let message = match &self {
            ServerError::InvalidRequest(msg)
            | ServerError::InvalidPdf(msg)
            | ServerError::PayloadTooLarge(msg)
            | ServerError::Llm(msg)
            | ServerError::LlmTimeout(msg)
            | ServerError::Internal(msg) => msg.clone(),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PdfQaError> for ServerError {
    fn from(err: PdfQaError) -> Self {
        match err {
            PdfQaError::ParseError(msg) => ServerError::InvalidPdf(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for ServerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(_) => ServerError::LlmTimeout(err.to_string()),
            other => ServerError::Llm(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::from(PdfQaError::ParseError("bad".into())), 400, "INVALID_PDF"),
            (ServerError::InvalidRequest("x".into()), 400, "INVALID_REQUEST"),
            (ServerError::from(LlmError::Empty), 502, "LLM_ERROR"),
            (
                ServerError::from(LlmError::Status { status: 500, body: "boom".into() }),
                502,
                "LLM_ERROR",
            ),
            (
                ServerError::from(LlmError::Timeout(Duration::from_secs(60))),
                504,
                "LLM_TIMEOUT",
            ),
            (
                ServerError::from(PdfQaError::SerializationError("io".into())),
                500,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
            assert_eq!(err.code(), code);
        }
    }
}

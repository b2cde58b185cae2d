//! API handlers for the pdfqa server
//!
//! - `GET /health`
//! - `POST /process-pdf/`: multipart upload of a PDF and a question

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tracing::debug;

use crate::error::ServerError;
use crate::pipeline::{process_pdf, ProcessRequest};
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfqa-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Process response
#[derive(Serialize)]
pub struct ProcessResponse {
    pub answer: String,
    /// Base64-encoded annotated PDF
    pub processed_pdf: String,
    /// Present (and true) only when masking was requested but skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_skipped: Option<bool>,
}

/// Handler: POST /process-pdf/
pub async fn handle_process_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, ServerError> {
    let mut pdf: Option<Vec<u8>> = None;
    let mut question: Option<String> = None;
    let mut mask: Option<bool> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf_file" => pdf = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            "question" => question = Some(field.text().await.map_err(multipart_error)?),
            "mask_sensitive_data" => {
                let raw = field.text().await.map_err(multipart_error)?;
                mask = Some(parse_form_bool(&raw).ok_or_else(|| {
                    ServerError::InvalidRequest(format!(
                        "mask_sensitive_data must be a boolean, got '{}'",
                        raw.trim()
                    ))
                })?);
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let request = ProcessRequest {
        pdf: pdf.ok_or_else(|| missing("pdf_file"))?,
        question: question.ok_or_else(|| missing("question"))?,
        mask_sensitive_data: mask.ok_or_else(|| missing("mask_sensitive_data"))?,
    };

    let outcome = process_pdf(&state, request).await?;

    Ok(Json(ProcessResponse {
        answer: outcome.answer,
        processed_pdf: STANDARD.encode(&outcome.pdf),
        redaction_skipped: outcome.redaction_skipped.then_some(true),
    }))
}

/// Form booleans as HTML forms and common clients send them
pub fn parse_form_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn missing(field: &str) -> ServerError {
    ServerError::InvalidRequest(format!("missing form field '{}'", field))
}

fn multipart_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(err.body_text())
    } else {
        ServerError::InvalidRequest(err.body_text())
    }
}

//! Request pipeline
//!
//! `Received -> Extracted -> Answered -> (Highlighted) -> (Redacted) ->
//! Serialized -> Done`. The document moves through the stages by value and
//! all PDF work runs on blocking threads. The uploaded bytes are staged to a
//! temp file that lives exactly as long as the request.

use std::fmt;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tokio::task::spawn_blocking;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use pdfqa_core::{
    extract_text, highlight_sentences, parse_answer, parse_sensitive_data, redact_entries, Color,
    ExtractedText, PdfDocument,
};

use crate::error::ServerError;
use crate::llm::{answer_prompt, LlmError, SENSITIVE_DATA_PROMPT};
use crate::state::{AppState, CollaboratorFailurePolicy};

pub const HIGHLIGHT_COLOR: Color = Color::YELLOW;
pub const REDACTION_FILL: Color = Color::BLACK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Extracted,
    Answered,
    Highlighted,
    Redacted,
    Serialized,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Extracted => "extracted",
            Stage::Answered => "answered",
            Stage::Highlighted => "highlighted",
            Stage::Redacted => "redacted",
            Stage::Serialized => "serialized",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ProcessRequest {
    pub pdf: Vec<u8>,
    pub question: String,
    pub mask_sensitive_data: bool,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub answer: String,
    pub pdf: Vec<u8>,
    /// Masking was requested but the sensitive-data call failed
    pub redaction_skipped: bool,
}

pub async fn process_pdf(
    state: &AppState,
    request: ProcessRequest,
) -> Result<ProcessOutcome, ServerError> {
    let span = info_span!("process_pdf", request_id = %Uuid::new_v4());
    run(state, request).instrument(span).await
}

async fn run(state: &AppState, request: ProcessRequest) -> Result<ProcessOutcome, ServerError> {
    let ProcessRequest {
        pdf,
        question,
        mask_sensitive_data,
    } = request;

    if pdf.is_empty() {
        return Err(ServerError::InvalidRequest("uploaded PDF is empty".into()));
    }
    if question.trim().is_empty() {
        return Err(ServerError::InvalidRequest("question is empty".into()));
    }
    info!(
        stage = %Stage::Received,
        bytes = pdf.len(),
        mask = mask_sensitive_data,
        "request received"
    );

    // Dropping `_staged` removes the temp file on every exit path
    let staging_dir = state.staging_dir.clone();
    let (_staged, doc, extracted) =
        blocking(move || stage_and_extract(&pdf, staging_dir.as_deref())).await?;
    info!(
        stage = %Stage::Extracted,
        pages = extracted.page_count(),
        chars = extracted.full_text.len(),
        "text extracted"
    );
    if extracted.is_blank() {
        warn!("document has no extractable text, nothing can be highlighted or redacted");
    }

    let collaborator = state.collaborator.as_ref();
    let qa_prompt = answer_prompt(&question);
    let qa_call = collaborator.complete(&qa_prompt, &extracted.full_text);

    let (qa_result, sensitive_result) = if mask_sensitive_data {
        let sensitive_call = collaborator.complete(SENSITIVE_DATA_PROMPT, &extracted.full_text);
        let (qa, sensitive) = tokio::join!(qa_call, sensitive_call);
        (qa, Some(sensitive))
    } else {
        (qa_call.await, None)
    };

    let parsed = parse_answer(&qa_result?);
    info!(
        stage = %Stage::Answered,
        sentences = parsed.sentences.len(),
        has_excerpt = parsed.excerpt.is_some(),
        "answer parsed"
    );

    let (entries, redaction_skipped) =
        resolve_sensitive(sensitive_result, state.failure_policy)?;

    let sentences = parsed.sentences;
    let pdf = blocking(move || annotate_and_serialize(doc, &sentences, entries.as_deref())).await?;
    info!(stage = %Stage::Serialized, bytes = pdf.len(), "document serialized");

    info!(stage = %Stage::Done, redaction_skipped, "request complete");
    Ok(ProcessOutcome {
        answer: parsed.answer,
        pdf,
        redaction_skipped,
    })
}

/// Apply the failure policy to the sensitive-data call
///
/// Returns the entries to redact (`None` when redaction does not run) and
/// whether redaction was skipped because of a failure.
fn resolve_sensitive(
    result: Option<Result<String, LlmError>>,
    policy: CollaboratorFailurePolicy,
) -> Result<(Option<Vec<String>>, bool), ServerError> {
    match result {
        None => Ok((None, false)),
        Some(Ok(raw)) => Ok((Some(parse_sensitive_data(&raw)), false)),
        Some(Err(err)) => match policy {
            CollaboratorFailurePolicy::FailFast => Err(err.into()),
            CollaboratorFailurePolicy::Degrade => {
                warn!(error = %err, "sensitive-data call failed, returning unredacted document");
                Ok((None, true))
            }
        },
    }
}

fn stage_and_extract(
    bytes: &[u8],
    staging_dir: Option<&Path>,
) -> Result<(NamedTempFile, PdfDocument, ExtractedText), ServerError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pdfqa-").suffix(".pdf");
    let mut staged = match staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| ServerError::Internal(format!("failed to stage upload: {e}")))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| ServerError::Internal(format!("failed to stage upload: {e}")))?;

    let doc = PdfDocument::load(staged.path())?;
    let extracted = extract_text(&doc)?;
    Ok((staged, doc, extracted))
}

fn annotate_and_serialize(
    mut doc: PdfDocument,
    sentences: &[String],
    entries: Option<&[String]>,
) -> Result<Vec<u8>, ServerError> {
    if !sentences.is_empty() {
        let report = highlight_sentences(&mut doc, sentences, HIGHLIGHT_COLOR)?;
        info!(
            stage = %Stage::Highlighted,
            highlights = report.highlights,
            unmatched = report.unmatched.len(),
            "excerpt highlighted"
        );
    }

    if let Some(entries) = entries {
        let report = redact_entries(&mut doc, entries, REDACTION_FILL)?;
        info!(
            stage = %Stage::Redacted,
            entries = entries.len(),
            regions = report.regions,
            glyphs_removed = report.glyphs_removed,
            "sensitive data redacted"
        );
    }

    Ok(doc.finalize()?)
}

/// Run CPU-bound work off the async runtime, keeping the caller's span
async fn blocking<T, F>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sensitive_call_means_no_redaction() {
        let (entries, skipped) = resolve_sensitive(None, CollaboratorFailurePolicy::FailFast).unwrap();
        assert!(entries.is_none());
        assert!(!skipped);
    }

    #[test]
    fn test_sensitive_failure_fails_fast_by_default() {
        let err = resolve_sensitive(Some(Err(LlmError::Empty)), CollaboratorFailurePolicy::default())
            .unwrap_err();
        assert_eq!(err.code(), "LLM_ERROR");
    }

    #[test]
    fn test_sensitive_failure_degrades_when_configured() {
        let (entries, skipped) =
            resolve_sensitive(Some(Err(LlmError::Empty)), CollaboratorFailurePolicy::Degrade)
                .unwrap();
        assert!(entries.is_none());
        assert!(skipped);
    }

    #[test]
    fn test_sensitive_response_is_parsed() {
        let (entries, skipped) = resolve_sensitive(
            Some(Ok("Sensitive Data:\n- a@b.com".into())),
            CollaboratorFailurePolicy::FailFast,
        )
        .unwrap();
        assert_eq!(entries, Some(vec!["a@b.com".to_string()]));
        assert!(!skipped);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Received.to_string(), "received");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}

//! Shared application state

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;

use crate::llm::Collaborator;

/// What to do when the sensitive-data call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CollaboratorFailurePolicy {
    /// Abort the request
    #[default]
    FailFast,
    /// Return the highlighted document unredacted and flag it
    Degrade,
}

/// Immutable per-process state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub collaborator: Arc<dyn Collaborator>,
    pub failure_policy: CollaboratorFailurePolicy,
    /// Where uploads are staged; the system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(collaborator: Arc<dyn Collaborator>, failure_policy: CollaboratorFailurePolicy) -> Self {
        Self {
            collaborator,
            failure_policy,
            staging_dir: None,
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }
}

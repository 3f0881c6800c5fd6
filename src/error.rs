//! Error taxonomy for the data-port pipeline.
//!
//! Errors fall into four families: validation (detected before any
//! persistence attempt), reference resolution (term/attachment/user lookup
//! or creation), persistence (post create-or-update), and remote fetch.
//! None of them cross the batch boundary: the importer converts every
//! failure into an [`ImportIssue`] on the owning row's result.

use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::store::StoreError;

/// Errors raised while porting a single record.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("reference resolution failed: {0}")]
    ReferenceResolution(String),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("remote fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl ImportError {
    pub fn code(&self) -> IssueCode {
        match self {
            ImportError::Validation { .. } => IssueCode::Validation,
            ImportError::ReferenceResolution(_) => IssueCode::ReferenceResolution,
            ImportError::Persistence(_) => IssueCode::Persistence,
            ImportError::Fetch(_) => IssueCode::Fetch,
        }
    }
}

/// Machine-readable classification of an [`ImportIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    Validation,
    ReferenceResolution,
    Persistence,
    Fetch,
}

/// A single field- or record-level problem attached to an import result.
///
/// `field` is `None` for record-level problems (for example a failed post
/// insert); field-localized problems name the offending source column.
#[derive(Debug, Clone, Serialize)]
pub struct ImportIssue {
    pub field: Option<String>,
    pub code: IssueCode,
    pub message: String,
}

impl ImportIssue {
    pub fn new(field: Option<&str>, error: &ImportError) -> Self {
        Self {
            field: field.map(|f| f.to_string()),
            code: error.code(),
            message: error.to_string(),
        }
    }

    /// Field-localized validation issue.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            code: IssueCode::Validation,
            message: message.into(),
        }
    }
}

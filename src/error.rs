//! Error taxonomy shared by every subsystem.
//!
//! # Design Decisions
//! - Validation problems are accumulated, never fail-fast
//! - Storage and archive failures abort the current operation outright
//! - Protected-path rejections carry no detail about the path

use std::fmt;

use thiserror::Error;

use crate::backup::ArchiveError;
use crate::store::StorageError;

/// One problem found while validating a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Input the problem is attached to, if any.
    pub field: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn on(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// All problems found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), CfgError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CfgError::Validation(self))
        }
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors surfaced to the request layer.
#[derive(Debug, Error)]
pub enum CfgError {
    /// Malformed or conflicting input; nothing was committed.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Persisting a map or file failed; the last committed state stands.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The archive could not be opened or is unusable.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("protected path")]
    ProtectedPath,
}

impl From<ValidationErrors> for CfgError {
    fn from(errors: ValidationErrors) -> Self {
        CfgError::Validation(errors)
    }
}

impl From<FieldError> for CfgError {
    fn from(error: FieldError) -> Self {
        CfgError::Validation(error.into())
    }
}

/// Result type for operations exposed to the request layer.
pub type CfgResult<T> = Result<T, CfgError>;

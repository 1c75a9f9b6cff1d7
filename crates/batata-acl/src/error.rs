//! Error types for ACL management and authorization
//!
//! This module defines:
//! - `AclError`: the error taxonomy every ACL operation reports
//! - `StoreError`: errors raised by an `AclStore` implementation
//!
//! Store errors convert into `AclError` with their kind preserved, so callers
//! can tell a missing entity from a validation failure or an unreachable
//! datacenter without inspecting message text.

/// Errors returned by ACL operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("ACL support disabled")]
    Disabled,

    #[error("Bad request: {0}")]
    InvalidRequest(String),

    #[error("ACL not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AclError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AclError::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AclError::NotFound(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        AclError::PermissionDenied(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        AclError::Unavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AclError::NotFound(_))
    }
}

pub type AclResult<T> = Result<T, AclError>;

/// Errors raised by the replicated entity store
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    /// Sentinel: the cluster has already been bootstrapped.
    #[error("ACL bootstrap no longer allowed (reset index: {reset_index})")]
    BootstrapNotAllowed { reset_index: u64 },

    #[error("no path to datacenter '{0}'")]
    Unreachable(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AclError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AclError::NotFound(what),
            StoreError::Invalid(msg) | StoreError::Conflict(msg) => AclError::InvalidRequest(msg),
            e @ StoreError::BootstrapNotAllowed { .. } => AclError::PermissionDenied(e.to_string()),
            e @ StoreError::Unreachable(_) => AclError::Unavailable(e.to_string()),
            StoreError::Backend(msg) => AclError::Internal(msg),
        }
    }
}

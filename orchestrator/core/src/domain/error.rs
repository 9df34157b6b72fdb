// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator error taxonomy.
//!
//! Guard failures (`NotFound`, `PermissionDenied`, `FailedPrecondition`,
//! `ResourceExhausted`) abort before any side effect. Mid-sequence
//! failures trigger the compensating action appropriate to the step
//! reached and then propagate the original error; compensation failures
//! are logged and never mask the original.

use crate::domain::platform::RemoteApiError;
use crate::domain::repository::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RemoteApiError> for OrchestratorError {
    fn from(err: RemoteApiError) -> Self {
        Self::RemoteApi {
            status: err.status,
            message: err.message,
        }
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

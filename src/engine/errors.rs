//! engine::errors
//!
//! The mutation error taxonomy surfaced to callers.
//!
//! Each stage maps the [`ForgeError`] it receives into the variant that
//! means something at that point (a missing ref during resolution becomes
//! `BranchNotFound`, a refused ref update becomes `Conflict`). Anything
//! left over becomes `RemoteStore` with a sub-kind so callers can tell a
//! timeout from an auth failure without parsing messages.

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{BranchName, RepoPath, TypeError};
use crate::forge::ForgeError;

/// Sub-kind of a remote store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The call did not finish in time; the remote effect is unknown.
    Timeout,
    Network,
    Auth,
    RateLimited,
    NotFound,
    Api,
    InvalidResponse,
}

impl RemoteErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Network => "network",
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::RateLimited => "rate_limited",
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::Api => "api",
            RemoteErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from branch mutation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Input was missing or malformed. Raised before any remote call.
    #[error("{0}")]
    Validation(String),

    #[error("branch '{branch}' not found")]
    BranchNotFound { branch: BranchName },

    #[error("'{path}' is a directory")]
    PathIsDirectory { path: RepoPath },

    #[error("branch '{branch}' already exists")]
    RefAlreadyExists { branch: BranchName },

    /// A guarded write lost a race. Re-resolve the branch and retry.
    #[error("branch '{branch}' changed concurrently; re-read and retry")]
    Conflict { branch: BranchName },

    #[error("remote store error ({kind}): {message}")]
    RemoteStore {
        kind: RemoteErrorKind,
        /// HTTP status reported by the store, when known.
        status: Option<u16>,
        message: String,
    },
}

impl MutationError {
    /// Stable tag for error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::Validation(_) => "validation",
            MutationError::BranchNotFound { .. } => "branch_not_found",
            MutationError::PathIsDirectory { .. } => "path_is_directory",
            MutationError::RefAlreadyExists { .. } => "ref_already_exists",
            MutationError::Conflict { .. } => "conflict",
            MutationError::RemoteStore { .. } => "remote_store",
        }
    }

    /// Remote sub-kind, for `RemoteStore` errors.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            MutationError::RemoteStore { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// HTTP status reported by the store, for `RemoteStore` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            MutationError::RemoteStore { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the remote mutation may or may not have landed.
    ///
    /// True only for timeouts. Callers should re-resolve the branch before
    /// deciding to retry.
    pub fn outcome_unknown(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::Timeout)
    }
}

impl From<ForgeError> for MutationError {
    fn from(err: ForgeError) -> Self {
        let status = err.status();
        let kind = match &err {
            ForgeError::Timeout(_) => RemoteErrorKind::Timeout,
            ForgeError::NetworkError(_) => RemoteErrorKind::Network,
            ForgeError::AuthRequired | ForgeError::AuthFailed(_) => RemoteErrorKind::Auth,
            ForgeError::RateLimited => RemoteErrorKind::RateLimited,
            ForgeError::NotFound(_) => RemoteErrorKind::NotFound,
            ForgeError::Rejected(_) | ForgeError::AlreadyExists(_) | ForgeError::ApiError { .. } => {
                RemoteErrorKind::Api
            }
            ForgeError::InvalidResponse(_) => RemoteErrorKind::InvalidResponse,
        };
        MutationError::RemoteStore {
            kind,
            status,
            message: err.to_string(),
        }
    }
}

impl From<TypeError> for MutationError {
    fn from(err: TypeError) -> Self {
        MutationError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn forge_errors_map_to_remote_kinds() {
        let cases = [
            (ForgeError::Timeout(Duration::from_secs(1)), RemoteErrorKind::Timeout),
            (ForgeError::NetworkError("reset".into()), RemoteErrorKind::Network),
            (ForgeError::AuthRequired, RemoteErrorKind::Auth),
            (ForgeError::AuthFailed("bad".into()), RemoteErrorKind::Auth),
            (ForgeError::RateLimited, RemoteErrorKind::RateLimited),
            (ForgeError::NotFound("x".into()), RemoteErrorKind::NotFound),
            (
                ForgeError::ApiError {
                    status: 500,
                    message: "boom".into(),
                },
                RemoteErrorKind::Api,
            ),
            (ForgeError::InvalidResponse("?".into()), RemoteErrorKind::InvalidResponse),
        ];
        for (forge, expected) in cases {
            let err = MutationError::from(forge);
            assert_eq!(err.kind(), "remote_store");
            assert_eq!(err.remote_kind(), Some(expected));
        }
    }

    #[test]
    fn status_is_carried() {
        let err = MutationError::from(ForgeError::ApiError {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(err.status(), Some(502));
        assert_eq!(MutationError::from(ForgeError::RateLimited).status(), Some(429));
    }

    #[test]
    fn only_timeouts_have_unknown_outcome() {
        assert!(MutationError::from(ForgeError::Timeout(Duration::from_millis(5))).outcome_unknown());
        assert!(!MutationError::from(ForgeError::NetworkError("x".into())).outcome_unknown());
        assert!(!MutationError::Conflict {
            branch: BranchName::new("main").unwrap()
        }
        .outcome_unknown());
    }

    #[test]
    fn type_errors_are_validation() {
        let err = MutationError::from(TypeError::InvalidPath("path cannot be empty".into()));
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "invalid path: path cannot be empty");
    }

    #[test]
    fn remote_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RemoteErrorKind::RateLimited).unwrap(),
            "\"rate_limited\""
        );
        assert_eq!(RemoteErrorKind::InvalidResponse.to_string(), "invalid_response");
    }
}

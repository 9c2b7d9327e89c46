//! engine::branch
//!
//! Fork a new branch from an existing branch's tip.
//!
//! There is no existence pre-check on the new name; the store's ref creation
//! is the only arbiter, so two callers racing for one name see exactly one
//! success.

use tracing::{info, instrument};

use super::{Engine, MutationError};
use crate::core::types::{BranchName, Oid, RepoId};
use crate::forge::ForgeError;

/// Request to create `branch` from `from` (or the configured default).
#[derive(Debug, Clone)]
pub struct CreateBranchRequest {
    pub repo: RepoId,
    pub branch: BranchName,
    pub from: Option<BranchName>,
}

/// Result of a created branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub branch: BranchName,
    pub from: BranchName,
    /// Commit the new branch points at.
    pub target: Oid,
}

impl Engine {
    /// Create `refs/heads/<branch>` at the tip of the source branch.
    ///
    /// # Errors
    ///
    /// - `BranchNotFound` if the source branch does not resolve
    /// - `RefAlreadyExists` if the new name is taken
    /// - `RemoteStore` for any other store failure
    #[instrument(
        name = "create_branch",
        skip_all,
        fields(repo = %request.repo, branch = %request.branch)
    )]
    pub async fn create_branch(&self, request: CreateBranchRequest) -> Result<BranchOutcome, MutationError> {
        let CreateBranchRequest { repo, branch, from } = request;
        let from = from.unwrap_or_else(|| self.options.default_source_branch.clone());

        let target = self.resolve_tip(&repo, &from).await?;
        self.call("create_ref", self.store.create_ref(&repo, &branch, &target))
            .await
            .map_err(|e| match e {
                ForgeError::AlreadyExists(_) => MutationError::RefAlreadyExists {
                    branch: branch.clone(),
                },
                other => other.into(),
            })?;

        info!(%from, target = target.short(7), "branch created");
        Ok(BranchOutcome {
            branch,
            from,
            target,
        })
    }
}

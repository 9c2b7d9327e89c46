//! engine::commit
//!
//! Atomic multi-file commit.
//!
//! # Pipeline
//!
//! ```text
//! Baseline --blobs--> StagedBlobs --tree--> ComposedTree --commit--> PendingCommit --CAS--> CommitOutcome
//! ```
//!
//! Each arrow consumes the previous stage, and stage values can only be
//! built by the step before them, so the ref update can only ever publish a
//! commit whose tree layers every requested change on the resolved root
//! tree with the resolved tip as sole parent.
//!
//! Blob writes fan out under `blob_concurrency`. The first failing write
//! ends the stage; dropping the stream cancels writes still in flight and no
//! tree, commit or ref call is made. When the final ref update is refused
//! the objects written so far are left as unreachable orphans.

use std::collections::HashMap;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use super::{Baseline, Engine, MutationError};
use crate::core::types::{BranchName, FileChange, Oid, RepoId, RepoPath};
use crate::forge::{ForgeError, TreeEntry};

/// A validated multi-file commit.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub repo: RepoId,
    pub branch: BranchName,
    pub message: String,
    pub files: Vec<FileChange>,
}

impl CommitRequest {
    /// # Errors
    ///
    /// Returns `Validation` if `message` is blank or `files` is empty.
    pub fn new(
        repo: RepoId,
        branch: BranchName,
        message: impl Into<String>,
        files: Vec<FileChange>,
    ) -> Result<Self, MutationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(MutationError::Validation(
                "commit message cannot be empty".into(),
            ));
        }
        if files.is_empty() {
            return Err(MutationError::Validation(
                "at least one file is required".into(),
            ));
        }
        Ok(Self {
            repo,
            branch,
            message,
            files,
        })
    }
}

/// Result of a published multi-file commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit: Oid,
    pub tree: Oid,
    /// Distinct changed paths, in the order they first appeared.
    pub paths: Vec<RepoPath>,
}

/// Blobs written for every distinct path.
#[derive(Debug)]
pub struct StagedBlobs {
    baseline: Baseline,
    entries: Vec<TreeEntry>,
}

/// A new tree layered on the baseline's root tree.
#[derive(Debug)]
pub struct ComposedTree {
    baseline: Baseline,
    tree: Oid,
    paths: Vec<RepoPath>,
}

/// A written commit not yet reachable from the branch.
#[derive(Debug)]
pub struct PendingCommit {
    baseline: Baseline,
    commit: Oid,
    tree: Oid,
    paths: Vec<RepoPath>,
}

/// Collapse duplicate paths: first-seen order, last content wins.
pub(crate) fn collapse(files: Vec<FileChange>) -> Vec<FileChange> {
    let mut index: HashMap<RepoPath, usize> = HashMap::new();
    let mut out: Vec<FileChange> = Vec::with_capacity(files.len());
    for change in files {
        match index.get(&change.path) {
            Some(&at) => out[at].content = change.content,
            None => {
                index.insert(change.path.clone(), out.len());
                out.push(change);
            }
        }
    }
    out
}

impl Engine {
    /// Write every file in one commit and advance the branch to it.
    ///
    /// # Errors
    ///
    /// - `BranchNotFound` if the branch does not resolve
    /// - `Conflict` if the branch moved after it was resolved
    /// - `RemoteStore` for any other store failure; the branch is unchanged
    ///   unless the error is a timeout on the final ref update
    #[instrument(
        name = "commit_files",
        skip_all,
        fields(repo = %request.repo, branch = %request.branch, files = request.files.len())
    )]
    pub async fn commit_files(&self, request: CommitRequest) -> Result<CommitOutcome, MutationError> {
        let CommitRequest {
            repo,
            branch,
            message,
            files,
        } = request;

        let baseline = self.resolve(&repo, &branch).await?;
        let staged = self.stage_blobs(&repo, baseline, files).await?;
        let composed = self.compose_tree(&repo, staged).await?;
        let pending = self.write_commit(&repo, composed, &message).await?;
        self.publish(&repo, pending).await
    }

    async fn stage_blobs(
        &self,
        repo: &RepoId,
        baseline: Baseline,
        files: Vec<FileChange>,
    ) -> Result<StagedBlobs, MutationError> {
        let changes = collapse(files);
        let limit = self.options.blob_concurrency.max(1);
        debug!(blobs = changes.len(), limit, "writing blobs");

        let entries: Vec<TreeEntry> = stream::iter(changes)
            .map(|change| async move {
                let blob = self
                    .call("create_blob", self.store.create_blob(repo, change.content.as_bytes()))
                    .await?;
                Ok::<_, ForgeError>(TreeEntry::regular(change.path, blob))
            })
            .buffered(limit)
            .try_collect()
            .await
            .map_err(|e| {
                warn!(error = %e, "blob write failed, aborting commit");
                MutationError::from(e)
            })?;

        Ok(StagedBlobs { baseline, entries })
    }

    async fn compose_tree(&self, repo: &RepoId, staged: StagedBlobs) -> Result<ComposedTree, MutationError> {
        let StagedBlobs { baseline, entries } = staged;
        let tree = self
            .call(
                "create_tree",
                self.store.create_tree(repo, &baseline.root_tree, &entries),
            )
            .await?;
        Ok(ComposedTree {
            baseline,
            tree,
            paths: entries.into_iter().map(|e| e.path).collect(),
        })
    }

    async fn write_commit(
        &self,
        repo: &RepoId,
        composed: ComposedTree,
        message: &str,
    ) -> Result<PendingCommit, MutationError> {
        let ComposedTree {
            baseline,
            tree,
            paths,
        } = composed;
        let commit = self
            .call(
                "create_commit",
                self.store
                    .create_commit(repo, &tree, std::slice::from_ref(&baseline.tip), message),
            )
            .await?;
        Ok(PendingCommit {
            baseline,
            commit,
            tree,
            paths,
        })
    }

    async fn publish(&self, repo: &RepoId, pending: PendingCommit) -> Result<CommitOutcome, MutationError> {
        let PendingCommit {
            baseline,
            commit,
            tree,
            paths,
        } = pending;
        let branch = baseline.branch;

        self.call(
            "update_ref",
            self.store.update_ref(repo, &branch, &commit, &baseline.tip),
        )
        .await
        .map_err(|e| match e {
            ForgeError::Rejected(reason) => {
                warn!(%reason, expected = baseline.tip.short(7), "ref update refused");
                MutationError::Conflict {
                    branch: branch.clone(),
                }
            }
            ForgeError::NotFound(_) => MutationError::BranchNotFound {
                branch: branch.clone(),
            },
            other => other.into(),
        })?;

        info!(
            base = baseline.tip.short(7),
            commit = commit.short(7),
            paths = paths.len(),
            "commit published"
        );
        Ok(CommitOutcome {
            commit,
            tree,
            paths,
        })
    }
}

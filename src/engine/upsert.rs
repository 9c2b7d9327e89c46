//! engine::upsert
//!
//! Create-or-update exactly one file on a branch.
//!
//! The file's current blob id is captured first and handed to the store
//! with the write, so the store refuses to overwrite content this call has
//! not seen. Each call produces at most one commit.

use tracing::{info, instrument, warn};

use super::{Engine, MutationError};
use crate::core::types::{BranchName, FileContent, Oid, RepoId, RepoPath};
use crate::forge::{ForgeError, PathObject, WriteFile};

/// A validated single-file write.
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    pub repo: RepoId,
    pub branch: BranchName,
    pub path: RepoPath,
    pub message: String,
    pub content: FileContent,
}

impl UpsertRequest {
    /// # Errors
    ///
    /// Returns `Validation` if `message` is blank.
    pub fn new(
        repo: RepoId,
        branch: BranchName,
        path: RepoPath,
        message: impl Into<String>,
        content: FileContent,
    ) -> Result<Self, MutationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(MutationError::Validation(
                "commit message cannot be empty".into(),
            ));
        }
        Ok(Self {
            repo,
            branch,
            path,
            message,
            content,
        })
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub blob: Oid,
    pub commit: Oid,
    /// Caller-facing URL of the written file.
    pub url: String,
    /// Whether the path existed before this write.
    pub updated: bool,
}

impl Engine {
    /// Create or update one file.
    ///
    /// # Errors
    ///
    /// - `BranchNotFound` if the branch does not resolve
    /// - `PathIsDirectory` if `path` names a directory
    /// - `Conflict` if the file changed between the probe and the write
    /// - `RemoteStore` for any other store failure
    #[instrument(
        name = "upsert_file",
        skip_all,
        fields(repo = %request.repo, branch = %request.branch, path = %request.path)
    )]
    pub async fn upsert_file(&self, request: UpsertRequest) -> Result<UpsertOutcome, MutationError> {
        let UpsertRequest {
            repo,
            branch,
            path,
            message,
            content,
        } = request;

        let base = self.resolve_tip(&repo, &branch).await?;
        let previous_blob = self.probe(&repo, &branch, &path).await?;
        let updated = previous_blob.is_some();

        let write = WriteFile {
            branch: branch.clone(),
            path: path.clone(),
            message,
            content,
            previous_blob,
        };
        let written = self
            .call("write_file", self.store.write_file(&repo, write))
            .await
            .map_err(|e| match e {
                ForgeError::Rejected(reason) => {
                    warn!(%reason, "file changed concurrently");
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
            base = base.short(7),
            commit = written.commit.short(7),
            updated,
            "file written"
        );
        Ok(UpsertOutcome {
            blob: written.blob,
            commit: written.commit,
            url: written.url,
            updated,
        })
    }

    /// Current blob at `path`, `None` when nothing is there yet.
    async fn probe(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        path: &RepoPath,
    ) -> Result<Option<Oid>, MutationError> {
        match self
            .call("read_path", self.store.read_path(repo, path, branch))
            .await
        {
            Ok(PathObject::File { blob }) => Ok(Some(blob)),
            Ok(PathObject::Directory) => Err(MutationError::PathIsDirectory { path: path.clone() }),
            Err(ForgeError::NotFound(_)) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::forge::mock::{MockCall, MockStore};
    use std::sync::Arc;

    fn repo() -> RepoId {
        RepoId::new("acme", "widgets").unwrap()
    }

    fn main_branch() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    fn request(p: &str, body: &str) -> UpsertRequest {
        UpsertRequest::new(
            repo(),
            main_branch(),
            path(p),
            "update",
            FileContent::from_bytes(body.as_bytes().to_vec()).unwrap(),
        )
        .unwrap()
    }

    fn setup() -> (MockStore, Engine) {
        let store = MockStore::new();
        store.seed_branch(
            &repo(),
            &main_branch(),
            [
                (path("README.md"), b"old".to_vec()),
                (path("docs/guide.md"), b"guide".to_vec()),
            ],
        );
        let engine = Engine::new(Arc::new(store.clone()), EngineOptions::new(main_branch()));
        (store, engine)
    }

    #[test]
    fn blank_message_is_rejected() {
        let err = UpsertRequest::new(
            repo(),
            main_branch(),
            path("a"),
            "   ",
            FileContent::from_bytes(b"x".to_vec()).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn updates_existing_file() {
        let (store, engine) = setup();
        let outcome = engine.upsert_file(request("README.md", "new")).await.unwrap();

        assert!(outcome.updated);
        assert_eq!(
            store.file_at(&repo(), &main_branch(), &path("README.md")),
            Some(b"new".to_vec())
        );
        assert_eq!(store.tip(&repo(), &main_branch()), Some(outcome.commit));
    }

    #[tokio::test]
    async fn creates_new_file() {
        let (store, engine) = setup();
        let outcome = engine.upsert_file(request("NEW.md", "fresh")).await.unwrap();

        assert!(!outcome.updated);
        assert_eq!(store.blob(&outcome.blob), Some(b"fresh".to_vec()));
        assert!(store.operations().iter().any(|op| matches!(
            op,
            crate::forge::mock::MockOperation::WriteFile { previous_blob: None, .. }
        )));
    }

    #[tokio::test]
    async fn directory_is_refused_without_writing() {
        let (store, engine) = setup();
        let err = engine.upsert_file(request("docs", "x")).await.unwrap_err();
        assert_eq!(err, MutationError::PathIsDirectory { path: path("docs") });
        assert_eq!(store.count(MockCall::WriteFile), 0);
    }

    #[tokio::test]
    async fn concurrent_edit_is_conflict() {
        let (store, _) = setup();
        let store = store.with_concurrent_write(main_branch(), path("README.md"), "theirs");
        let engine = Engine::new(Arc::new(store.clone()), EngineOptions::new(main_branch()));

        let err = engine.upsert_file(request("README.md", "ours")).await.unwrap_err();
        assert_eq!(err, MutationError::Conflict { branch: main_branch() });
        assert_eq!(
            store.file_at(&repo(), &main_branch(), &path("README.md")),
            Some(b"theirs".to_vec())
        );
    }

    #[tokio::test]
    async fn missing_branch_stops_before_probe() {
        let (store, engine) = setup();
        let mut req = request("README.md", "x");
        req.branch = BranchName::new("ghost").unwrap();

        let err = engine.upsert_file(req).await.unwrap_err();
        assert_eq!(err.kind(), "branch_not_found");
        assert_eq!(store.count(MockCall::ReadPath), 0);
    }
}

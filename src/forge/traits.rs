//! forge::traits
//!
//! The object store capability consumed by the branch mutation engine.
//!
//! # Design
//!
//! The `ObjectStore` trait is async because every primitive is a network
//! call. Implementations are pure transport: they translate one primitive
//! into one remote request and map the outcome into the closed
//! [`ForgeError`] set. The engine switches on those variants and never
//! sees transport status codes.
//!
//! Objects (blobs, trees, commits) are immutable and content-addressed.
//! Branch refs are the only mutable entity and are only moved through
//! [`ObjectStore::update_ref`], which is a compare-and-swap.
//!
//! # Example
//!
//! ```ignore
//! use refgate::forge::{ObjectStore, TreeEntry};
//!
//! async fn touch(store: &dyn ObjectStore, repo: &RepoId, branch: &BranchName) -> Result<(), ForgeError> {
//!     let tip = store.resolve_ref(repo, branch).await?;
//!     let commit = store.get_commit(repo, &tip).await?;
//!     let blob = store.create_blob(repo, b"hello\n").await?;
//!     let path = RepoPath::new("hello.txt").unwrap();
//!     let tree = store
//!         .create_tree(repo, &commit.tree, &[TreeEntry::regular(path, blob)])
//!         .await?;
//!     let new = store
//!         .create_commit(repo, &tree, std::slice::from_ref(&tip), "touch")
//!         .await?;
//!     store.update_ref(repo, branch, &new, &tip).await
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{BranchName, FileContent, FileMode, Oid, RepoId, RepoPath};

/// Errors from object store operations.
///
/// Produced at the client boundary; every transport failure lands in
/// exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForgeError {
    /// No credentials are configured.
    #[error("authentication required")]
    AuthRequired,

    /// Credentials were refused (invalid, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested ref, object, or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A guarded write was refused because the store's current state does
    /// not match the caller's expectation (stale ref tip or prior blob).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The ref being created already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// The call did not complete in time. The remote effect is unknown.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// API returned an unexpected error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The store answered with something that could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ForgeError {
    /// HTTP status carried by the error, when one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::ApiError { status, .. } => Some(*status),
            ForgeError::RateLimited => Some(429),
            _ => None,
        }
    }
}

/// Summary of a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: Oid,
    /// Root tree the commit snapshots.
    pub tree: Oid,
    /// Ordered parent ids.
    pub parents: Vec<Oid>,
    pub message: String,
}

/// What lives at a path on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathObject {
    /// A single file and its blob id.
    File { blob: Oid },
    /// A directory (subtree).
    Directory,
}

/// One entry overlaid onto a base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: RepoPath,
    pub mode: FileMode,
    pub blob: Oid,
}

impl TreeEntry {
    /// A regular-file entry.
    pub fn regular(path: RepoPath, blob: Oid) -> Self {
        Self {
            path,
            mode: FileMode::Regular,
            blob,
        }
    }
}

/// Create-or-update request for a single file on a branch.
#[derive(Debug, Clone)]
pub struct WriteFile {
    pub branch: BranchName,
    pub path: RepoPath,
    pub message: String,
    pub content: FileContent,
    /// Blob the caller last saw at `path`. `None` means the file must not
    /// exist yet; `Some` means the store must still hold exactly this blob.
    pub previous_blob: Option<Oid>,
}

/// Outcome of a single-file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub blob: Oid,
    pub commit: Oid,
    /// Caller-facing URL of the written file.
    pub url: String,
}

/// The object store capability.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every request the gateway serves.
///
/// # Error Handling
///
/// - `NotFound`: the named ref/path/object is absent
/// - `Rejected`: a guarded write lost a race (CAS or prior-blob mismatch)
/// - `AlreadyExists`: ref creation collided with an existing ref
/// - `AuthRequired` / `AuthFailed` / `RateLimited` / `ApiError` /
///   `NetworkError` / `InvalidResponse` / `Timeout`: transport failures
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logs (e.g. "github", "memory").
    fn name(&self) -> &'static str;

    /// Current tip commit of `branch`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the branch does not exist
    async fn resolve_ref(&self, repo: &RepoId, branch: &BranchName) -> Result<Oid, ForgeError>;

    /// Read a commit object.
    async fn get_commit(&self, repo: &RepoId, id: &Oid) -> Result<CommitInfo, ForgeError>;

    /// Look up what lives at `path` on `branch`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing exists at the path
    async fn read_path(
        &self,
        repo: &RepoId,
        path: &RepoPath,
        branch: &BranchName,
    ) -> Result<PathObject, ForgeError>;

    /// Write a blob and return its id.
    async fn create_blob(&self, repo: &RepoId, content: &[u8]) -> Result<Oid, ForgeError>;

    /// Write a tree that inherits every entry of `base_tree` and overlays `entries`.
    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError>;

    /// Write a commit object.
    async fn create_commit(
        &self,
        repo: &RepoId,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, ForgeError>;

    /// Create or update one file on a branch, producing exactly one commit.
    ///
    /// # Errors
    ///
    /// - `Rejected` if `previous_blob` does not match the store's current state
    /// - `NotFound` if the branch does not exist
    async fn write_file(&self, repo: &RepoId, request: WriteFile) -> Result<FileWrite, ForgeError>;

    /// Create `refs/heads/<branch>` pointing at `target`.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the ref is taken
    async fn create_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        target: &Oid,
    ) -> Result<(), ForgeError>;

    /// Move `branch` from `expected` to `new`. Never forced.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the branch no longer points at `expected`
    async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        new: &Oid,
        expected: &Oid,
    ) -> Result<(), ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn forge_error_display() {
        assert_eq!(
            ForgeError::AuthRequired.to_string(),
            "authentication required"
        );
        assert_eq!(
            ForgeError::NotFound("heads/main".into()).to_string(),
            "not found: heads/main"
        );
        assert_eq!(
            ForgeError::Rejected("not a fast forward".into()).to_string(),
            "rejected: not a fast forward"
        );
        assert_eq!(
            ForgeError::Timeout(Duration::from_secs(2)).to_string(),
            "timed out after 2s"
        );
        assert_eq!(
            ForgeError::ApiError {
                status: 502,
                message: "Bad gateway".into()
            }
            .to_string(),
            "API error: 502 - Bad gateway"
        );
    }

    #[test]
    fn status_is_known_only_for_http_failures() {
        assert_eq!(
            ForgeError::ApiError {
                status: 500,
                message: String::new()
            }
            .status(),
            Some(500)
        );
        assert_eq!(ForgeError::RateLimited.status(), Some(429));
        assert_eq!(ForgeError::NetworkError("reset".into()).status(), None);
        assert_eq!(ForgeError::Timeout(Duration::from_secs(1)).status(), None);
    }

    #[test]
    fn regular_entry_uses_regular_mode() {
        let entry = TreeEntry::regular(
            RepoPath::new("a.txt").unwrap(),
            Oid::new("a".repeat(40)).unwrap(),
        );
        assert_eq!(entry.mode, FileMode::Regular);
    }
}

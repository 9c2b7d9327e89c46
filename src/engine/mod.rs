//! engine
//!
//! The branch mutation engine: consistent single- and multi-file commits
//! against a content-addressed object store.
//!
//! # Architecture
//!
//! Every write path starts from a [`Baseline`] produced by the resolver and
//! ends with the single consistency-critical step for its operation:
//!
//! ```text
//! create_branch:  resolve source -> create_ref
//! upsert_file:    resolve -> probe path -> guarded contents write
//! commit_files:   resolve -> blobs (bounded fan-out) -> tree -> commit -> CAS ref update
//! ```
//!
//! # Invariants
//!
//! - A commit is reported only after the ref update that publishes it succeeds
//! - Failures before the ref update leave the branch untouched
//! - Conflicts are surfaced, never retried
//! - Every remote call is bounded by `call_timeout`
//!
//! The engine holds no mutable state. Requests against the same branch are
//! serialized by the store's compare-and-swap alone.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use refgate::core::types::{BranchName, FileChange, FileContent, RepoId, RepoPath};
//! use refgate::engine::{CommitRequest, Engine, EngineOptions};
//! use refgate::forge::mock::MockStore;
//!
//! # tokio_test::block_on(async {
//! let store = MockStore::new();
//! let repo = RepoId::new("octocat", "hello").unwrap();
//! let main = BranchName::new("main").unwrap();
//! store.seed_branch(&repo, &main, []);
//!
//! let engine = Engine::new(Arc::new(store.clone()), EngineOptions::new(main.clone()));
//! let request = CommitRequest::new(
//!     repo.clone(),
//!     main.clone(),
//!     "add notes",
//!     vec![FileChange::new(
//!         RepoPath::new("notes.txt").unwrap(),
//!         FileContent::from_bytes(b"hello".to_vec()).unwrap(),
//!     )],
//! )
//! .unwrap();
//!
//! let outcome = engine.commit_files(request).await.unwrap();
//! assert_eq!(store.tip(&repo, &main), Some(outcome.commit));
//! # });
//! ```

pub mod branch;
pub mod commit;
pub mod errors;
pub mod resolve;
pub mod upsert;

pub use branch::{BranchOutcome, CreateBranchRequest};
pub use commit::{CommitOutcome, CommitRequest, ComposedTree, PendingCommit, StagedBlobs};
pub use errors::{MutationError, RemoteErrorKind};
pub use resolve::Baseline;
pub use upsert::{UpsertOutcome, UpsertRequest};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::{Config, DEFAULT_BLOB_CONCURRENCY, DEFAULT_CALL_TIMEOUT};
use crate::core::types::BranchName;
use crate::forge::{ForgeError, ObjectStore};

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on every remote call.
    pub call_timeout: Duration,
    /// Maximum blob writes in flight per bulk commit.
    pub blob_concurrency: usize,
    /// Source branch for `create_branch` when the caller names none.
    pub default_source_branch: BranchName,
}

impl EngineOptions {
    /// Default timeout and concurrency, forking from `default_source_branch`.
    pub fn new(default_source_branch: BranchName) -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            blob_concurrency: DEFAULT_BLOB_CONCURRENCY,
            default_source_branch,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            blob_concurrency: config.blob_concurrency(),
            default_source_branch: config.default_source_branch().clone(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the blob fan-out. Values below one are raised to one.
    pub fn with_blob_concurrency(mut self, n: usize) -> Self {
        self.blob_concurrency = n.max(1);
        self
    }
}

/// Branch mutation engine over an injected object store.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ObjectStore>,
    options: EngineOptions,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store.name())
            .field("options", &self.options)
            .finish()
    }
}

impl Engine {
    pub fn new(store: Arc<dyn ObjectStore>, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Name of the backing store.
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Run one remote call under the configured timeout.
    ///
    /// An elapsed timer becomes `ForgeError::Timeout`; the call itself is
    /// dropped and its remote effect is unknown.
    async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, ForgeError>>,
    ) -> Result<T, ForgeError> {
        debug!(op, store = self.store.name(), "remote call");
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    timeout = ?self.options.call_timeout,
                    "remote call timed out, outcome unknown"
                );
                Err(ForgeError::Timeout(self.options.call_timeout))
            }
        }
    }
}

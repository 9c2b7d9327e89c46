//! engine::resolve
//!
//! Branch name to baseline snapshot.

use tracing::debug;

use super::{Engine, MutationError};
use crate::core::types::{BranchName, Oid, RepoId};
use crate::forge::ForgeError;

/// A branch's tip and root tree at the moment it was resolved.
///
/// Every write path treats this as its starting point. The branch may move
/// afterwards; guarded writes detect that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub branch: BranchName,
    pub tip: Oid,
    pub root_tree: Oid,
}

impl Engine {
    /// Resolve `branch` to its tip commit and that commit's root tree.
    ///
    /// # Errors
    ///
    /// - `BranchNotFound` if the ref does not exist
    /// - `RemoteStore` for any other store failure
    pub async fn resolve(&self, repo: &RepoId, branch: &BranchName) -> Result<Baseline, MutationError> {
        let tip = self.resolve_tip(repo, branch).await?;
        let commit = self
            .call("get_commit", self.store.get_commit(repo, &tip))
            .await?;

        debug!(%repo, %branch, tip = tip.short(7), tree = commit.tree.short(7), "resolved branch");
        Ok(Baseline {
            branch: branch.clone(),
            tip,
            root_tree: commit.tree,
        })
    }

    /// Resolve only the tip commit of `branch`.
    pub(crate) async fn resolve_tip(&self, repo: &RepoId, branch: &BranchName) -> Result<Oid, MutationError> {
        self.call("resolve_ref", self.store.resolve_ref(repo, branch))
            .await
            .map_err(|e| match e {
                ForgeError::NotFound(_) => MutationError::BranchNotFound {
                    branch: branch.clone(),
                },
                other => other.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOptions, RemoteErrorKind};
    use crate::forge::mock::{FailOn, MockCall, MockStore};
    use crate::core::types::RepoPath;
    use std::sync::Arc;

    fn repo() -> RepoId {
        RepoId::new("acme", "widgets").unwrap()
    }

    fn main_branch() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn engine(store: &MockStore) -> Engine {
        Engine::new(Arc::new(store.clone()), EngineOptions::new(main_branch()))
    }

    #[tokio::test]
    async fn resolves_tip_and_tree() {
        let store = MockStore::new();
        let tip = store.seed_branch(
            &repo(),
            &main_branch(),
            [(RepoPath::new("a.txt").unwrap(), b"a".to_vec())],
        );

        let baseline = engine(&store).resolve(&repo(), &main_branch()).await.unwrap();
        assert_eq!(baseline.tip, tip);
        assert_eq!(baseline.root_tree, store.commit(&tip).unwrap().tree);
        assert_eq!(baseline.branch, main_branch());
    }

    #[tokio::test]
    async fn missing_branch_is_branch_not_found() {
        let store = MockStore::new();
        let err = engine(&store)
            .resolve(&repo(), &BranchName::new("ghost").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MutationError::BranchNotFound {
                branch: BranchName::new("ghost").unwrap()
            }
        );
        assert_eq!(store.count(MockCall::GetCommit), 0);
    }

    #[tokio::test]
    async fn other_failures_are_remote_errors() {
        let store = MockStore::new().fail_on(FailOn::ResolveRef(ForgeError::AuthFailed(
            "Invalid or expired token".into(),
        )));
        let err = engine(&store)
            .resolve(&repo(), &main_branch())
            .await
            .unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Auth));
    }
}

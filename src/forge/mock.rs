//! forge::mock
//!
//! In-memory, content-addressed object store for deterministic testing.
//!
//! # Design
//!
//! Blobs, trees and commits are kept in maps keyed by the SHA-256 of their
//! serialized form, so writing identical content twice yields the same id
//! just like a real store. Objects are shared across repositories; branch
//! refs are scoped per `(repo, branch)`.
//!
//! Trees are flat: a map from full path to entry. A path is a directory when
//! some other entry lives underneath it.
//!
//! Guarded writes behave like GitHub's:
//! - `update_ref` refuses unless the branch still points at `expected`
//! - `write_file` refuses a missing prior blob for an existing file and a
//!   prior blob that no longer matches
//!
//! # Test hooks
//!
//! - [`FailOn`] injects an error into one primitive
//! - [`MockStore::with_concurrent_write`] lands a foreign commit right before
//!   the next guarded write on a branch
//! - [`MockStore::with_latency`] delays every call
//!
//! # Example
//!
//! ```
//! use refgate::core::types::{BranchName, RepoId, RepoPath};
//! use refgate::forge::mock::MockStore;
//! use refgate::forge::ObjectStore;
//!
//! # tokio_test::block_on(async {
//! let store = MockStore::new();
//! let repo = RepoId::new("octocat", "hello").unwrap();
//! let main = BranchName::new("main").unwrap();
//! let readme = RepoPath::new("README.md").unwrap();
//!
//! let tip = store.seed_branch(&repo, &main, [(readme.clone(), b"hi\n".to_vec())]);
//! assert_eq!(store.resolve_ref(&repo, &main).await.unwrap(), tip);
//! assert_eq!(store.file_at(&repo, &main, &readme), Some(b"hi\n".to_vec()));
//! # });
//! ```

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{
    CommitInfo, FileWrite, ForgeError, ObjectStore, PathObject, TreeEntry, WriteFile,
};
use crate::core::types::{BranchName, FileMode, Oid, RepoId, RepoPath};

/// Flat tree: full path to entry.
type Tree = BTreeMap<String, Entry>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    mode: FileMode,
    blob: Oid,
}

/// In-memory object store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

#[derive(Debug)]
struct MockStoreInner {
    blobs: HashMap<Oid, Vec<u8>>,
    trees: HashMap<Oid, Tree>,
    commits: HashMap<Oid, CommitInfo>,
    refs: HashMap<(RepoId, BranchName), Oid>,
    /// Primitive to fail (for testing error paths).
    fail_on: Option<FailOn>,
    /// One-shot foreign commit landed before the next guarded write.
    concurrent_write: Option<ConcurrentWrite>,
    /// Commit produced by the last triggered concurrent write.
    last_concurrent_commit: Option<Oid>,
    latency: Option<Duration>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
    blobs_in_flight: usize,
    max_blobs_in_flight: usize,
}

#[derive(Debug, Clone)]
struct ConcurrentWrite {
    branch: BranchName,
    path: RepoPath,
    content: Vec<u8>,
}

/// Configuration for which primitive should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    ResolveRef(ForgeError),
    GetCommit(ForgeError),
    ReadPath(ForgeError),
    /// Fail every blob write.
    CreateBlob(ForgeError),
    /// Fail only the blob write whose content equals the given bytes.
    CreateBlobWith(Vec<u8>, ForgeError),
    CreateTree(ForgeError),
    CreateCommit(ForgeError),
    WriteFile(ForgeError),
    CreateRef(ForgeError),
    UpdateRef(ForgeError),
}

/// Primitive kinds, for counting recorded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    ResolveRef,
    GetCommit,
    ReadPath,
    CreateBlob,
    CreateTree,
    CreateCommit,
    WriteFile,
    CreateRef,
    UpdateRef,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ResolveRef {
        repo: RepoId,
        branch: BranchName,
    },
    GetCommit {
        id: Oid,
    },
    ReadPath {
        path: RepoPath,
        branch: BranchName,
    },
    CreateBlob {
        len: usize,
    },
    CreateTree {
        base_tree: Oid,
        paths: Vec<RepoPath>,
    },
    CreateCommit {
        tree: Oid,
        parents: Vec<Oid>,
        message: String,
    },
    WriteFile {
        branch: BranchName,
        path: RepoPath,
        previous_blob: Option<Oid>,
    },
    CreateRef {
        branch: BranchName,
        target: Oid,
    },
    UpdateRef {
        branch: BranchName,
        new: Oid,
        expected: Oid,
    },
}

impl MockOperation {
    /// The primitive this operation invoked.
    pub fn call(&self) -> MockCall {
        match self {
            MockOperation::ResolveRef { .. } => MockCall::ResolveRef,
            MockOperation::GetCommit { .. } => MockCall::GetCommit,
            MockOperation::ReadPath { .. } => MockCall::ReadPath,
            MockOperation::CreateBlob { .. } => MockCall::CreateBlob,
            MockOperation::CreateTree { .. } => MockCall::CreateTree,
            MockOperation::CreateCommit { .. } => MockCall::CreateCommit,
            MockOperation::WriteFile { .. } => MockCall::WriteFile,
            MockOperation::CreateRef { .. } => MockCall::CreateRef,
            MockOperation::UpdateRef { .. } => MockCall::UpdateRef,
        }
    }
}

impl MockStore {
    /// Create an empty store holding only the empty tree.
    pub fn new() -> Self {
        let mut trees = HashMap::new();
        trees.insert(tree_id(&Tree::new()), Tree::new());
        Self {
            inner: Arc::new(Mutex::new(MockStoreInner {
                blobs: HashMap::new(),
                trees,
                commits: HashMap::new(),
                refs: HashMap::new(),
                fail_on: None,
                concurrent_write: None,
                last_concurrent_commit: None,
                latency: None,
                operations: Vec::new(),
                blobs_in_flight: 0,
                max_blobs_in_flight: 0,
            })),
        }
    }

    /// Configure a primitive to fail.
    ///
    /// # Example
    ///
    /// ```
    /// use refgate::forge::mock::{FailOn, MockStore};
    /// use refgate::forge::ForgeError;
    ///
    /// let store = MockStore::new()
    ///     .fail_on(FailOn::CreateBlob(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Delay every primitive by `latency` before it takes effect.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Land a foreign commit writing `content` at `path` on `branch`
    /// immediately before the next guarded write (`update_ref` or
    /// `write_file`) targeting that branch. Fires once.
    pub fn with_concurrent_write(
        self,
        branch: BranchName,
        path: RepoPath,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.lock().concurrent_write = Some(ConcurrentWrite {
            branch,
            path,
            content: content.into(),
        });
        self
    }

    /// Commit created by the last concurrent write that fired.
    pub fn last_concurrent_commit(&self) -> Option<Oid> {
        self.lock().last_concurrent_commit.clone()
    }

    /// Create `branch` with a root commit holding exactly `files`.
    ///
    /// Replaces the branch if it already exists. Not recorded as an operation.
    pub fn seed_branch(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        files: impl IntoIterator<Item = (RepoPath, Vec<u8>)>,
    ) -> Oid {
        let mut inner = self.lock();
        let mut tree = Tree::new();
        for (path, content) in files {
            let blob = inner.put_blob(content);
            tree.insert(
                path.to_string(),
                Entry {
                    mode: FileMode::Regular,
                    blob,
                },
            );
        }
        let tree = inner.put_tree(tree);
        let commit = inner.put_commit(tree, Vec::new(), "initial commit".into());
        inner
            .refs
            .insert((repo.clone(), branch.clone()), commit.clone());
        commit
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Count recorded operations of one kind.
    pub fn count(&self, call: MockCall) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| op.call() == call)
            .count()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Highest number of blob writes observed in flight at once.
    pub fn max_blobs_in_flight(&self) -> usize {
        self.lock().max_blobs_in_flight
    }

    /// Current tip of a branch (for test verification).
    pub fn tip(&self, repo: &RepoId, branch: &BranchName) -> Option<Oid> {
        self.lock()
            .refs
            .get(&(repo.clone(), branch.clone()))
            .cloned()
    }

    /// Commit object by id (for test verification).
    pub fn commit(&self, id: &Oid) -> Option<CommitInfo> {
        self.lock().commits.get(id).cloned()
    }

    /// Every file in a tree with its blob id, sorted by path.
    pub fn tree_entries(&self, tree: &Oid) -> Option<Vec<(String, Oid)>> {
        self.lock().trees.get(tree).map(|t| {
            t.iter()
                .map(|(path, entry)| (path.clone(), entry.blob.clone()))
                .collect()
        })
    }

    /// Blob content by id.
    pub fn blob(&self, id: &Oid) -> Option<Vec<u8>> {
        self.lock().blobs.get(id).cloned()
    }

    /// Content of `path` at the tip of `branch`.
    pub fn file_at(&self, repo: &RepoId, branch: &BranchName, path: &RepoPath) -> Option<Vec<u8>> {
        let inner = self.lock();
        let tree = inner.tip_tree(repo, branch)?;
        let entry = tree.get(path.as_str())?;
        inner.blobs.get(&entry.blob).cloned()
    }

    /// Every file at the tip of `branch`, keyed by path.
    pub fn files_at(&self, repo: &RepoId, branch: &BranchName) -> BTreeMap<String, Vec<u8>> {
        let inner = self.lock();
        let Some(tree) = inner.tip_tree(repo, branch) else {
            return BTreeMap::new();
        };
        tree.iter()
            .filter_map(|(path, entry)| {
                inner
                    .blobs
                    .get(&entry.blob)
                    .map(|content| (path.clone(), content.clone()))
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        self.lock().operations.push(op);
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, call: MockCall, blob: Option<&[u8]>) -> Result<(), ForgeError> {
        let inner = self.lock();
        let error = match (&inner.fail_on, call) {
            (Some(FailOn::ResolveRef(e)), MockCall::ResolveRef)
            | (Some(FailOn::GetCommit(e)), MockCall::GetCommit)
            | (Some(FailOn::ReadPath(e)), MockCall::ReadPath)
            | (Some(FailOn::CreateBlob(e)), MockCall::CreateBlob)
            | (Some(FailOn::CreateTree(e)), MockCall::CreateTree)
            | (Some(FailOn::CreateCommit(e)), MockCall::CreateCommit)
            | (Some(FailOn::WriteFile(e)), MockCall::WriteFile)
            | (Some(FailOn::CreateRef(e)), MockCall::CreateRef)
            | (Some(FailOn::UpdateRef(e)), MockCall::UpdateRef) => Some(e.clone()),
            (Some(FailOn::CreateBlobWith(content, e)), MockCall::CreateBlob)
                if blob == Some(content.as_slice()) =>
            {
                Some(e.clone())
            }
            _ => None,
        };
        error.map_or(Ok(()), Err)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreInner {
    fn put_blob(&mut self, content: Vec<u8>) -> Oid {
        let id = hash_object("blob", &content);
        self.blobs.entry(id.clone()).or_insert(content);
        id
    }

    fn put_tree(&mut self, tree: Tree) -> Oid {
        let id = tree_id(&tree);
        self.trees.entry(id.clone()).or_insert(tree);
        id
    }

    fn put_commit(&mut self, tree: Oid, parents: Vec<Oid>, message: String) -> Oid {
        let mut body = format!("tree {tree}\n");
        for parent in &parents {
            body.push_str(&format!("parent {parent}\n"));
        }
        body.push('\n');
        body.push_str(&message);
        let id = hash_object("commit", body.as_bytes());
        self.commits.entry(id.clone()).or_insert(CommitInfo {
            id: id.clone(),
            tree,
            parents,
            message,
        });
        id
    }

    fn tip_tree(&self, repo: &RepoId, branch: &BranchName) -> Option<&Tree> {
        let tip = self.refs.get(&(repo.clone(), branch.clone()))?;
        let commit = self.commits.get(tip)?;
        self.trees.get(&commit.tree)
    }

    fn branch_tip(&self, repo: &RepoId, branch: &BranchName) -> Result<Oid, ForgeError> {
        self.refs
            .get(&(repo.clone(), branch.clone()))
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("{repo}: {}", branch.qualified_ref())))
    }

    /// Commit `path -> content` on top of `base` and move the branch there.
    fn commit_file(
        &mut self,
        repo: &RepoId,
        branch: &BranchName,
        base: &Oid,
        path: &RepoPath,
        content: Vec<u8>,
        message: String,
    ) -> Result<(Oid, Oid), ForgeError> {
        let base_tree = self
            .commits
            .get(base)
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .ok_or_else(|| ForgeError::InvalidResponse(format!("dangling commit {base}")))?;
        let blob = self.put_blob(content);
        let tree = overlay(base_tree, [(path.as_str(), FileMode::Regular, blob.clone())]);
        let tree = self.put_tree(tree);
        let commit = self.put_commit(tree, vec![base.clone()], message);
        self.refs
            .insert((repo.clone(), branch.clone()), commit.clone());
        Ok((blob, commit))
    }

    /// Fire the one-shot concurrent write if it targets `branch`.
    fn trigger_concurrent_write(&mut self, repo: &RepoId, branch: &BranchName) -> Result<(), ForgeError> {
        if !matches!(&self.concurrent_write, Some(w) if &w.branch == branch) {
            return Ok(());
        }
        let Some(write) = self.concurrent_write.take() else {
            return Ok(());
        };
        let tip = self.branch_tip(repo, branch)?;
        let (_, commit) = self.commit_file(
            repo,
            branch,
            &tip,
            &write.path,
            write.content,
            "concurrent write".into(),
        )?;
        self.last_concurrent_commit = Some(commit);
        Ok(())
    }
}

/// Overlay entries onto a base tree. A file replaces any directory at its
/// path and any file sitting at one of its ancestor directories.
fn overlay<'a>(
    mut tree: Tree,
    entries: impl IntoIterator<Item = (&'a str, FileMode, Oid)>,
) -> Tree {
    for (path, mode, blob) in entries {
        let dir_prefix = format!("{path}/");
        tree.retain(|existing, _| !existing.starts_with(&dir_prefix));
        for (idx, _) in path.match_indices('/') {
            tree.remove(&path[..idx]);
        }
        tree.insert(path.to_string(), Entry { mode, blob });
    }
    tree
}

fn path_kind(tree: &Tree, path: &RepoPath) -> Option<PathObject> {
    if let Some(entry) = tree.get(path.as_str()) {
        return Some(PathObject::File {
            blob: entry.blob.clone(),
        });
    }
    let dir_prefix = format!("{path}/");
    tree.range(dir_prefix.clone()..)
        .next()
        .filter(|(p, _)| p.starts_with(&dir_prefix))
        .map(|_| PathObject::Directory)
}

fn tree_id(tree: &Tree) -> Oid {
    let mut body = Vec::new();
    for (path, entry) in tree {
        body.extend_from_slice(entry.mode.as_git_mode().as_bytes());
        body.push(b' ');
        body.extend_from_slice(path.as_bytes());
        body.push(0);
        body.extend_from_slice(entry.blob.as_str().as_bytes());
        body.push(b'\n');
    }
    hash_object("tree", &body)
}

fn hash_object(kind: &str, body: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(format!("{kind} {}\0", body.len()).as_bytes());
    hasher.update(body);
    Oid::from_digest(&hasher.finalize())
}

fn unprocessable(message: String) -> ForgeError {
    ForgeError::ApiError {
        status: 422,
        message,
    }
}

/// Decrements the in-flight blob counter even when the write is cancelled.
struct InFlight<'a>(&'a MockStore);

impl<'a> InFlight<'a> {
    fn enter(store: &'a MockStore) -> Self {
        let mut inner = store.lock();
        inner.blobs_in_flight += 1;
        inner.max_blobs_in_flight = inner.max_blobs_in_flight.max(inner.blobs_in_flight);
        Self(store)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().blobs_in_flight -= 1;
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn resolve_ref(&self, repo: &RepoId, branch: &BranchName) -> Result<Oid, ForgeError> {
        self.record(MockOperation::ResolveRef {
            repo: repo.clone(),
            branch: branch.clone(),
        });
        self.delay().await;
        self.check_fail(MockCall::ResolveRef, None)?;
        self.lock().branch_tip(repo, branch)
    }

    async fn get_commit(&self, _repo: &RepoId, id: &Oid) -> Result<CommitInfo, ForgeError> {
        self.record(MockOperation::GetCommit { id: id.clone() });
        self.delay().await;
        self.check_fail(MockCall::GetCommit, None)?;
        self.lock()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("commit {id}")))
    }

    async fn read_path(
        &self,
        repo: &RepoId,
        path: &RepoPath,
        branch: &BranchName,
    ) -> Result<PathObject, ForgeError> {
        self.record(MockOperation::ReadPath {
            path: path.clone(),
            branch: branch.clone(),
        });
        self.delay().await;
        self.check_fail(MockCall::ReadPath, None)?;

        let inner = self.lock();
        inner.branch_tip(repo, branch)?;
        inner
            .tip_tree(repo, branch)
            .and_then(|tree| path_kind(tree, path))
            .ok_or_else(|| ForgeError::NotFound(format!("{path} on {branch}")))
    }

    async fn create_blob(&self, _repo: &RepoId, content: &[u8]) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateBlob { len: content.len() });
        let _in_flight = InFlight::enter(self);
        self.delay().await;
        self.check_fail(MockCall::CreateBlob, Some(content))?;
        let blob = self.lock().put_blob(content.to_vec());
        Ok(blob)
    }

    async fn create_tree(
        &self,
        _repo: &RepoId,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateTree {
            base_tree: base_tree.clone(),
            paths: entries.iter().map(|e| e.path.clone()).collect(),
        });
        self.delay().await;
        self.check_fail(MockCall::CreateTree, None)?;

        let mut inner = self.lock();
        let base = inner
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| unprocessable(format!("base_tree {base_tree} does not exist")))?;
        if let Some(missing) = entries.iter().find(|e| !inner.blobs.contains_key(&e.blob)) {
            return Err(unprocessable(format!(
                "tree.sha {} is not a valid blob",
                missing.blob
            )));
        }
        let tree = overlay(
            base,
            entries
                .iter()
                .map(|e| (e.path.as_str(), e.mode, e.blob.clone())),
        );
        Ok(inner.put_tree(tree))
    }

    async fn create_commit(
        &self,
        _repo: &RepoId,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, ForgeError> {
        self.record(MockOperation::CreateCommit {
            tree: tree.clone(),
            parents: parents.to_vec(),
            message: message.to_string(),
        });
        self.delay().await;
        self.check_fail(MockCall::CreateCommit, None)?;

        let mut inner = self.lock();
        if !inner.trees.contains_key(tree) {
            return Err(unprocessable(format!("tree {tree} does not exist")));
        }
        if let Some(missing) = parents.iter().find(|p| !inner.commits.contains_key(*p)) {
            return Err(unprocessable(format!("parent {missing} does not exist")));
        }
        Ok(inner.put_commit(tree.clone(), parents.to_vec(), message.to_string()))
    }

    async fn write_file(&self, repo: &RepoId, request: WriteFile) -> Result<FileWrite, ForgeError> {
        self.record(MockOperation::WriteFile {
            branch: request.branch.clone(),
            path: request.path.clone(),
            previous_blob: request.previous_blob.clone(),
        });
        self.delay().await;
        self.check_fail(MockCall::WriteFile, None)?;

        let mut inner = self.lock();
        inner.trigger_concurrent_write(repo, &request.branch)?;
        let tip = inner.branch_tip(repo, &request.branch)?;
        let current = inner
            .tip_tree(repo, &request.branch)
            .and_then(|tree| path_kind(tree, &request.path));

        match (&current, &request.previous_blob) {
            (Some(PathObject::Directory), _) => {
                return Err(unprocessable(format!("{} is a directory", request.path)));
            }
            (Some(PathObject::File { .. }), None) => {
                return Err(ForgeError::Rejected(format!(
                    "\"sha\" wasn't supplied for existing file {}",
                    request.path
                )));
            }
            (Some(PathObject::File { blob }), Some(previous)) if blob != previous => {
                return Err(ForgeError::Rejected(format!(
                    "{} is at {} but {} was expected",
                    request.path,
                    blob.short(7),
                    previous.short(7)
                )));
            }
            (None, Some(previous)) => {
                return Err(ForgeError::Rejected(format!(
                    "{} no longer exists (expected {})",
                    request.path,
                    previous.short(7)
                )));
            }
            _ => {}
        }

        let (blob, commit) = inner.commit_file(
            repo,
            &request.branch,
            &tip,
            &request.path,
            request.content.as_bytes().to_vec(),
            request.message,
        )?;
        Ok(FileWrite {
            url: format!(
                "https://mock.forge/{}/{}/blob/{}/{}",
                repo.owner(),
                repo.name(),
                request.branch,
                request.path
            ),
            blob,
            commit,
        })
    }

    async fn create_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        target: &Oid,
    ) -> Result<(), ForgeError> {
        self.record(MockOperation::CreateRef {
            branch: branch.clone(),
            target: target.clone(),
        });
        self.delay().await;
        self.check_fail(MockCall::CreateRef, None)?;

        let mut inner = self.lock();
        if !inner.commits.contains_key(target) {
            return Err(unprocessable(format!("Object {target} does not exist")));
        }
        let key = (repo.clone(), branch.clone());
        if inner.refs.contains_key(&key) {
            return Err(ForgeError::AlreadyExists("Reference already exists".into()));
        }
        inner.refs.insert(key, target.clone());
        Ok(())
    }

    async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        new: &Oid,
        expected: &Oid,
    ) -> Result<(), ForgeError> {
        self.record(MockOperation::UpdateRef {
            branch: branch.clone(),
            new: new.clone(),
            expected: expected.clone(),
        });
        self.delay().await;
        self.check_fail(MockCall::UpdateRef, None)?;

        let mut inner = self.lock();
        inner.trigger_concurrent_write(repo, branch)?;
        if !inner.commits.contains_key(new) {
            return Err(unprocessable(format!("Object {new} does not exist")));
        }
        let current = inner.branch_tip(repo, branch)?;
        if &current != expected {
            return Err(ForgeError::Rejected(format!(
                "{} is at {}, expected {}",
                branch.qualified_ref(),
                current.short(7),
                expected.short(7)
            )));
        }
        inner
            .refs
            .insert((repo.clone(), branch.clone()), new.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileContent;

    fn repo() -> RepoId {
        RepoId::new("acme", "widgets").unwrap()
    }

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    fn seeded() -> (MockStore, Oid) {
        let store = MockStore::new();
        let tip = store.seed_branch(
            &repo(),
            &branch("main"),
            [
                (path("README.md"), b"readme".to_vec()),
                (path("src/lib.rs"), b"lib".to_vec()),
            ],
        );
        (store, tip)
    }

    #[tokio::test]
    async fn identical_content_shares_an_id() {
        let store = MockStore::new();
        let a = store.create_blob(&repo(), b"same").await.unwrap();
        let b = store.create_blob(&repo(), b"same").await.unwrap();
        let c = store.create_blob(&repo(), b"other").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn read_path_distinguishes_files_and_directories() {
        let (store, _) = seeded();
        let main = branch("main");

        assert!(matches!(
            store.read_path(&repo(), &path("README.md"), &main).await.unwrap(),
            PathObject::File { .. }
        ));
        assert_eq!(
            store.read_path(&repo(), &path("src"), &main).await.unwrap(),
            PathObject::Directory
        );
        assert!(matches!(
            store.read_path(&repo(), &path("missing.txt"), &main).await,
            Err(ForgeError::NotFound(_))
        ));
        assert!(matches!(
            store.read_path(&repo(), &path("sr"), &main).await,
            Err(ForgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_tree_inherits_base() {
        let (store, tip) = seeded();
        let base = store.commit(&tip).unwrap().tree;
        let blob = store.create_blob(&repo(), b"new").await.unwrap();

        let tree = store
            .create_tree(&repo(), &base, &[TreeEntry::regular(path("docs/a.md"), blob)])
            .await
            .unwrap();

        let paths: Vec<String> = store
            .tree_entries(&tree)
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(paths, vec!["README.md", "docs/a.md", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn create_tree_rejects_unknown_blob() {
        let (store, tip) = seeded();
        let base = store.commit(&tip).unwrap().tree;
        let bogus = Oid::new("f".repeat(64)).unwrap();
        let err = store
            .create_tree(&repo(), &base, &[TreeEntry::regular(path("x"), bogus)])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn update_ref_is_compare_and_swap() {
        let (store, tip) = seeded();
        let main = branch("main");
        let tree = store.commit(&tip).unwrap().tree;
        let next = store
            .create_commit(&repo(), &tree, std::slice::from_ref(&tip), "next")
            .await
            .unwrap();

        let stale = Oid::new("0".repeat(64)).unwrap();
        assert!(matches!(
            store.update_ref(&repo(), &main, &next, &stale).await,
            Err(ForgeError::Rejected(_))
        ));
        assert_eq!(store.tip(&repo(), &main), Some(tip.clone()));

        store.update_ref(&repo(), &main, &next, &tip).await.unwrap();
        assert_eq!(store.tip(&repo(), &main), Some(next));
    }

    #[tokio::test]
    async fn create_ref_refuses_existing() {
        let (store, tip) = seeded();
        store
            .create_ref(&repo(), &branch("feature"), &tip)
            .await
            .unwrap();
        assert!(matches!(
            store.create_ref(&repo(), &branch("feature"), &tip).await,
            Err(ForgeError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn write_file_guards_previous_blob() {
        let (store, _) = seeded();
        let main = branch("main");
        let request = |previous_blob| WriteFile {
            branch: main.clone(),
            path: path("README.md"),
            message: "edit".into(),
            content: FileContent::from_bytes(b"v2".to_vec()).unwrap(),
            previous_blob,
        };

        assert!(matches!(
            store.write_file(&repo(), request(None)).await,
            Err(ForgeError::Rejected(_))
        ));

        let current = match store
            .read_path(&repo(), &path("README.md"), &main)
            .await
            .unwrap()
        {
            PathObject::File { blob } => blob,
            PathObject::Directory => panic!("expected a file"),
        };
        let written = store.write_file(&repo(), request(Some(current))).await.unwrap();
        assert_eq!(store.blob(&written.blob), Some(b"v2".to_vec()));
        assert_eq!(store.tip(&repo(), &main), Some(written.commit));
        assert!(written.url.ends_with("/acme/widgets/blob/main/README.md"));
    }

    #[tokio::test]
    async fn concurrent_write_fires_once() {
        let (store, tip) = seeded();
        let main = branch("main");
        let store = store.with_concurrent_write(main.clone(), path("intruder.txt"), "x");
        let tree = store.commit(&tip).unwrap().tree;
        let next = store
            .create_commit(&repo(), &tree, std::slice::from_ref(&tip), "mine")
            .await
            .unwrap();

        assert!(store.update_ref(&repo(), &main, &next, &tip).await.is_err());
        let intruder = store.last_concurrent_commit().unwrap();
        assert_eq!(store.tip(&repo(), &main), Some(intruder.clone()));

        // Second attempt from the fresh tip is not interfered with.
        let again = store
            .create_commit(&repo(), &tree, std::slice::from_ref(&intruder), "mine")
            .await
            .unwrap();
        store
            .update_ref(&repo(), &main, &again, &intruder)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fail_on_selected_blob() {
        let store = MockStore::new().fail_on(FailOn::CreateBlobWith(
            b"bad".to_vec(),
            ForgeError::RateLimited,
        ));
        assert!(store.create_blob(&repo(), b"good").await.is_ok());
        assert_eq!(
            store.create_blob(&repo(), b"bad").await,
            Err(ForgeError::RateLimited)
        );
        assert_eq!(store.count(MockCall::CreateBlob), 2);
    }

    #[test]
    fn overlay_replaces_conflicting_shapes() {
        let blob = hash_object("blob", b"x");
        let base = overlay(
            Tree::new(),
            [
                ("a", FileMode::Regular, blob.clone()),
                ("d/one", FileMode::Regular, blob.clone()),
                ("d/two", FileMode::Regular, blob.clone()),
            ],
        );
        let tree = overlay(
            base,
            [
                ("a/inner", FileMode::Regular, blob.clone()),
                ("d", FileMode::Regular, blob),
            ],
        );
        let keys: Vec<&str> = tree.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a/inner", "d"]);
    }

    #[test]
    fn store_name() {
        assert_eq!(MockStore::new().name(), "memory");
    }
}

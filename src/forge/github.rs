//! forge::github
//!
//! GitHub implementation of [`ObjectStore`] over the REST API.
//!
//! # Design
//!
//! Each primitive maps to one Git Data or Contents endpoint:
//!
//! | Primitive | Endpoint |
//! |---|---|
//! | `resolve_ref` | `GET /repos/{o}/{r}/git/ref/heads/{branch}` |
//! | `get_commit` | `GET /repos/{o}/{r}/git/commits/{sha}` |
//! | `read_path` | `GET /repos/{o}/{r}/contents/{path}?ref={branch}` |
//! | `create_blob` | `POST /repos/{o}/{r}/git/blobs` |
//! | `create_tree` | `POST /repos/{o}/{r}/git/trees` |
//! | `create_commit` | `POST /repos/{o}/{r}/git/commits` |
//! | `write_file` | `PUT /repos/{o}/{r}/contents/{path}` |
//! | `create_ref` | `POST /repos/{o}/{r}/git/refs` |
//! | `update_ref` | `PATCH /repos/{o}/{r}/git/refs/heads/{branch}` |
//!
//! # Ref updates
//!
//! GitHub's non-forced ref update is a fast-forward check, not a strict
//! compare-and-swap. `update_ref` first re-reads the tip and refuses if it
//! differs from the expected value, then issues the update with
//! `force: false`, so a branch that has moved forward is always refused
//! and a branch that was reset is refused unless the reset lands between
//! the two calls.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. No automatic retry.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{
    CommitInfo, FileWrite, ForgeError, ObjectStore, PathObject, TreeEntry, WriteFile,
};
use crate::core::config::{DEFAULT_API_BASE, DEFAULT_USER_AGENT};
use crate::core::types::{BranchName, Oid, RepoId, RepoPath};

/// GitHub REST API version header value.
const API_VERSION: &str = "2022-11-28";

/// Connection settings for [`GitHubStore`].
#[derive(Debug, Clone)]
pub struct GitHubOptions {
    /// API base URL (configurable for GitHub Enterprise).
    pub api_base: String,
    pub user_agent: String,
    /// Transport-level request timeout.
    pub timeout: Duration,
}

impl Default for GitHubOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// GitHub object store.
///
/// One instance serves every repository; the repository is named per call.
pub struct GitHubStore {
    client: Client,
    token: String,
    api_base: Url,
    timeout: Duration,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubStore")
            .field("api_base", &self.api_base.as_str())
            .field("timeout", &self.timeout)
            .field("has_token", &!self.token.is_empty())
            .finish()
    }
}

impl GitHubStore {
    /// Create a store authenticating with `token`.
    ///
    /// # Errors
    ///
    /// - `AuthRequired` if `token` is empty
    /// - `InvalidResponse` if `api_base` is not a valid base URL
    /// - `NetworkError` if the HTTP client cannot be built
    pub fn new(token: impl Into<String>, options: GitHubOptions) -> Result<Self, ForgeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ForgeError::AuthRequired);
        }

        let api_base = Url::parse(options.api_base.trim_end_matches('/')).map_err(|e| {
            ForgeError::InvalidResponse(format!("invalid API base '{}': {e}", options.api_base))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(ForgeError::InvalidResponse(format!(
                "API base '{}' cannot be used as a base URL",
                options.api_base
            )));
        }

        let client = Client::builder()
            .user_agent(options.user_agent)
            .timeout(options.timeout)
            .build()
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            token,
            api_base,
            timeout: options.timeout,
        })
    }

    /// Base URL requests are issued against.
    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    /// Build `/repos/{owner}/{repo}/<segments...>`, percent-encoding each segment.
    fn repo_url<'a>(
        &self,
        repo: &RepoId,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ForgeError> {
        let mut url = self.api_base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ForgeError::InvalidResponse("API base cannot be used as a base URL".into())
            })?;
            path.pop_if_empty()
                .extend(["repos", repo.owner(), repo.name()])
                .extend(segments);
        }
        Ok(url)
    }

    fn ref_url(&self, repo: &RepoId, kind: &str, branch: &BranchName) -> Result<Url, ForgeError> {
        let heads = branch.heads_ref();
        self.repo_url(repo, ["git", kind].into_iter().chain(heads.split('/')))
    }

    fn contents_url(&self, repo: &RepoId, path: &RepoPath) -> Result<Url, ForgeError> {
        self.repo_url(repo, std::iter::once("contents").chain(path.as_str().split('/')))
    }

    /// Send one request and decode the JSON response.
    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ForgeError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self.dispatch(method, url, body).await?;
        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                ForgeError::InvalidResponse(format!(
                    "failed to parse {} response: {e}",
                    status.as_u16()
                ))
            })
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    /// Send one request whose success body is ignored.
    async fn send_unit<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<(), ForgeError>
    where
        B: Serialize + ?Sized,
    {
        let response = self.dispatch(method, url, body).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    async fn dispatch<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Response, ForgeError>
    where
        B: Serialize + ?Sized,
    {
        debug!(method = %method, path = url.path(), "github request");
        let mut request = self.client.request(method, url).headers(self.headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ForgeError::Timeout(self.timeout)
            } else {
                ForgeError::NetworkError(e.to_string())
            }
        })
    }

    async fn error_from_response(&self, response: Response) -> ForgeError {
        let status = response.status();
        let rate_exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };
        classify_error(status, rate_exhausted, message)
    }
}

/// Map a non-success GitHub response into the closed error set.
fn classify_error(status: StatusCode, rate_exhausted: bool, message: String) -> ForgeError {
    let lowered = message.to_ascii_lowercase();
    match status {
        StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
        StatusCode::FORBIDDEN if rate_exhausted || lowered.contains("rate limit") => {
            ForgeError::RateLimited
        }
        StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("Permission denied: {message}")),
        StatusCode::NOT_FOUND => ForgeError::NotFound(message),
        StatusCode::CONFLICT => ForgeError::Rejected(message),
        StatusCode::UNPROCESSABLE_ENTITY if lowered.contains("reference already exists") => {
            ForgeError::AlreadyExists(message)
        }
        StatusCode::UNPROCESSABLE_ENTITY
            if lowered.contains("fast forward")
                || (lowered.contains("sha") && lowered.contains("supplied")) =>
        {
            ForgeError::Rejected(message)
        }
        StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
        _ if status.is_server_error() => ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("GitHub server error: {message}"),
        },
        _ => ForgeError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ObjectStore for GitHubStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn resolve_ref(&self, repo: &RepoId, branch: &BranchName) -> Result<Oid, ForgeError> {
        let url = self.ref_url(repo, "ref", branch)?;
        let found: GitHubRef = self.send::<(), _>(Method::GET, url, None).await?;
        if found.object.kind != "commit" {
            return Err(ForgeError::InvalidResponse(format!(
                "{} points at a {}, not a commit",
                branch.qualified_ref(),
                found.object.kind
            )));
        }
        Ok(found.object.sha)
    }

    async fn get_commit(&self, repo: &RepoId, id: &Oid) -> Result<CommitInfo, ForgeError> {
        let url = self.repo_url(repo, ["git", "commits", id.as_str()])?;
        let commit: GitHubCommit = self.send::<(), _>(Method::GET, url, None).await?;
        Ok(commit.into())
    }

    async fn read_path(
        &self,
        repo: &RepoId,
        path: &RepoPath,
        branch: &BranchName,
    ) -> Result<PathObject, ForgeError> {
        let mut url = self.contents_url(repo, path)?;
        url.query_pairs_mut().append_pair("ref", branch.as_str());

        // A directory listing is a JSON array; a file is an object.
        let listing: serde_json::Value = self.send::<(), _>(Method::GET, url, None).await?;
        if listing.is_array() {
            return Ok(PathObject::Directory);
        }
        let entry: GitHubContentEntry = serde_json::from_value(listing)
            .map_err(|e| ForgeError::InvalidResponse(format!("contents entry: {e}")))?;
        match entry.kind.as_str() {
            "dir" => Ok(PathObject::Directory),
            _ => Ok(PathObject::File { blob: entry.sha }),
        }
    }

    async fn create_blob(&self, repo: &RepoId, content: &[u8]) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, ["git", "blobs"])?;
        let body = CreateBlobBody {
            content: BASE64.encode(content),
            encoding: "base64",
        };
        let created: GitHubSha = self.send(Method::POST, url, Some(&body)).await?;
        Ok(created.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, ["git", "trees"])?;
        let body = CreateTreeBody {
            base_tree: base_tree.as_str(),
            tree: entries
                .iter()
                .map(|e| CreateTreeEntry {
                    path: e.path.as_str(),
                    mode: e.mode.as_git_mode(),
                    kind: "blob",
                    sha: e.blob.as_str(),
                })
                .collect(),
        };
        let created: GitHubSha = self.send(Method::POST, url, Some(&body)).await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoId,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, ["git", "commits"])?;
        let body = CreateCommitBody {
            message,
            tree: tree.as_str(),
            parents: parents.iter().map(Oid::as_str).collect(),
        };
        let created: GitHubSha = self.send(Method::POST, url, Some(&body)).await?;
        Ok(created.sha)
    }

    async fn write_file(&self, repo: &RepoId, request: WriteFile) -> Result<FileWrite, ForgeError> {
        let url = self.contents_url(repo, &request.path)?;
        let body = PutContentsBody {
            message: &request.message,
            content: BASE64.encode(request.content.as_bytes()),
            branch: request.branch.as_str(),
            sha: request.previous_blob.as_ref().map(Oid::as_str),
        };
        let written: GitHubContentsWrite = self.send(Method::PUT, url, Some(&body)).await?;
        let file_url = written
            .content
            .html_url
            .or(written.content.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ForgeError::InvalidResponse(format!(
                    "contents response for '{}' has no file URL",
                    request.path
                ))
            })?;
        Ok(FileWrite {
            url: file_url,
            blob: written.content.sha,
            commit: written.commit.sha,
        })
    }

    async fn create_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        target: &Oid,
    ) -> Result<(), ForgeError> {
        let url = self.repo_url(repo, ["git", "refs"])?;
        let body = CreateRefBody {
            ref_name: branch.qualified_ref(),
            sha: target.as_str(),
        };
        self.send_unit(Method::POST, url, Some(&body)).await
    }

    async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &BranchName,
        new: &Oid,
        expected: &Oid,
    ) -> Result<(), ForgeError> {
        let current = self.resolve_ref(repo, branch).await?;
        if &current != expected {
            return Err(ForgeError::Rejected(format!(
                "{} moved from {} to {}",
                branch.qualified_ref(),
                expected.short(7),
                current.short(7)
            )));
        }

        let url = self.ref_url(repo, "refs", branch)?;
        let body = UpdateRefBody {
            sha: new.as_str(),
            force: false,
        };
        self.send_unit(Method::PATCH, url, Some(&body)).await
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: Vec<CreateTreeEntry<'a>>,
}

#[derive(Serialize)]
struct CreateTreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubSha {
    sha: Oid,
}

#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubRefObject,
}

#[derive(Deserialize)]
struct GitHubRefObject {
    sha: Oid,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: Oid,
    tree: GitHubSha,
    #[serde(default)]
    parents: Vec<GitHubSha>,
    #[serde(default)]
    message: String,
}

impl From<GitHubCommit> for CommitInfo {
    fn from(commit: GitHubCommit) -> Self {
        CommitInfo {
            id: commit.sha,
            tree: commit.tree.sha,
            parents: commit.parents.into_iter().map(|p| p.sha).collect(),
            message: commit.message,
        }
    }
}

#[derive(Deserialize)]
struct GitHubContentEntry {
    #[serde(rename = "type")]
    kind: String,
    sha: Oid,
}

#[derive(Deserialize)]
struct GitHubContentsWrite {
    content: GitHubWrittenContent,
    commit: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubWrittenContent {
    sha: Oid,
    html_url: Option<String>,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(api_base: &str) -> GitHubStore {
        GitHubStore::new(
            "token",
            GitHubOptions {
                api_base: api_base.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn repo() -> RepoId {
        RepoId::new("octocat", "hello-world").unwrap()
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = GitHubStore::new("", GitHubOptions::default()).unwrap_err();
        assert_eq!(err, ForgeError::AuthRequired);
    }

    #[test]
    fn invalid_api_base_is_rejected() {
        let err = GitHubStore::new(
            "token",
            GitHubOptions {
                api_base: "not a url".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidResponse(_)));
    }

    #[test]
    fn repo_url_format() {
        let store = store("https://api.github.com");
        assert_eq!(
            store.repo_url(&repo(), ["git", "blobs"]).unwrap().as_str(),
            "https://api.github.com/repos/octocat/hello-world/git/blobs"
        );
    }

    #[test]
    fn enterprise_base_keeps_prefix() {
        let store = store("https://ghe.example.com/api/v3/");
        assert_eq!(
            store.repo_url(&repo(), ["git", "trees"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/octocat/hello-world/git/trees"
        );
    }

    #[test]
    fn ref_url_keeps_branch_slashes() {
        let store = store("https://api.github.com");
        let branch = BranchName::new("feature/login").unwrap();
        assert_eq!(
            store.ref_url(&repo(), "ref", &branch).unwrap().as_str(),
            "https://api.github.com/repos/octocat/hello-world/git/ref/heads/feature/login"
        );
    }

    #[test]
    fn contents_url_encodes_segments() {
        let store = store("https://api.github.com");
        let path = RepoPath::new("docs/read me#1.md").unwrap();
        assert_eq!(
            store.contents_url(&repo(), &path).unwrap().as_str(),
            "https://api.github.com/repos/octocat/hello-world/contents/docs/read%20me%231.md"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let store = GitHubStore::new("secret_token_abc123", GitHubOptions::default()).unwrap();
        let debug_output = format!("{store:?}");
        assert!(!debug_output.contains("secret_token_abc123"));
        assert!(debug_output.contains("has_token"));
    }

    mod classify {
        use super::*;

        #[test]
        fn auth_and_permissions() {
            assert!(matches!(
                classify_error(StatusCode::UNAUTHORIZED, false, "Bad credentials".into()),
                ForgeError::AuthFailed(_)
            ));
            assert!(matches!(
                classify_error(StatusCode::FORBIDDEN, false, "Resource not accessible".into()),
                ForgeError::AuthFailed(_)
            ));
        }

        #[test]
        fn rate_limits() {
            assert_eq!(
                classify_error(StatusCode::FORBIDDEN, true, "whatever".into()),
                ForgeError::RateLimited
            );
            assert_eq!(
                classify_error(
                    StatusCode::FORBIDDEN,
                    false,
                    "API rate limit exceeded for installation".into()
                ),
                ForgeError::RateLimited
            );
            assert_eq!(
                classify_error(StatusCode::TOO_MANY_REQUESTS, false, String::new()),
                ForgeError::RateLimited
            );
        }

        #[test]
        fn guarded_write_failures() {
            assert!(matches!(
                classify_error(StatusCode::CONFLICT, false, "sha does not match".into()),
                ForgeError::Rejected(_)
            ));
            assert!(matches!(
                classify_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    false,
                    "Update is not a fast forward".into()
                ),
                ForgeError::Rejected(_)
            ));
            assert!(matches!(
                classify_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    false,
                    "Invalid request.\n\n\"sha\" wasn't supplied.".into()
                ),
                ForgeError::Rejected(_)
            ));
            assert!(matches!(
                classify_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    false,
                    "Reference already exists".into()
                ),
                ForgeError::AlreadyExists(_)
            ));
        }

        #[test]
        fn other_failures() {
            assert_eq!(
                classify_error(StatusCode::NOT_FOUND, false, "Not Found".into()),
                ForgeError::NotFound("Not Found".into())
            );
            assert_eq!(
                classify_error(StatusCode::UNPROCESSABLE_ENTITY, false, "Validation Failed".into()),
                ForgeError::ApiError {
                    status: 422,
                    message: "Validation Failed".into()
                }
            );
            assert_eq!(
                classify_error(StatusCode::BAD_GATEWAY, false, "oops".into()),
                ForgeError::ApiError {
                    status: 502,
                    message: "GitHub server error: oops".into()
                }
            );
        }
    }
}

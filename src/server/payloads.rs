//! server::payloads
//!
//! Wire shapes for the HTTP gateway and their conversion into engine
//! requests.
//!
//! Conversion validates every field, so a request that fails here never
//! reaches the object store.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::types::{BranchName, Encoding, FileChange, FileContent, RepoId, RepoPath};
use crate::engine::{
    BranchOutcome, CommitOutcome, CommitRequest, CreateBranchRequest, MutationError,
    RemoteErrorKind, UpsertOutcome, UpsertRequest,
};

#[derive(Debug, Deserialize)]
pub struct CreateBranchBody {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub from: Option<String>,
}

impl CreateBranchBody {
    pub fn into_request(self) -> Result<CreateBranchRequest, MutationError> {
        Ok(CreateBranchRequest {
            repo: RepoId::new(self.owner, self.repo)?,
            branch: BranchName::new(self.branch)?,
            from: self.from.map(BranchName::new).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertFileBody {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub message: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl UpsertFileBody {
    pub fn into_request(self) -> Result<UpsertRequest, MutationError> {
        let encoding = Encoding::parse(self.encoding.as_deref())?;
        UpsertRequest::new(
            RepoId::new(self.owner, self.repo)?,
            BranchName::new(self.branch)?,
            RepoPath::new(self.path)?,
            self.message,
            FileContent::decode(&self.content, encoding)?,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpsertBody {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub message: String,
    pub files: Vec<BulkFile>,
}

impl BulkUpsertBody {
    pub fn into_request(self) -> Result<CommitRequest, MutationError> {
        let files = self
            .files
            .into_iter()
            .enumerate()
            .map(|(i, file)| {
                let change = || -> Result<FileChange, MutationError> {
                    let encoding = Encoding::parse(file.encoding.as_deref())?;
                    Ok(FileChange::new(
                        RepoPath::new(file.path.clone())?,
                        FileContent::decode(&file.content, encoding)?,
                    ))
                };
                change().map_err(|e| MutationError::Validation(format!("files[{i}]: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        CommitRequest::new(
            RepoId::new(self.owner, self.repo)?,
            BranchName::new(self.branch)?,
            self.message,
            files,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateBranchResponse {
    pub ok: bool,
    pub branch: String,
    pub from: String,
}

impl From<BranchOutcome> for CreateBranchResponse {
    fn from(outcome: BranchOutcome) -> Self {
        Self {
            ok: true,
            branch: outcome.branch.into(),
            from: outcome.from.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UpsertFileResponse {
    pub url: String,
    /// Blob id of the written content.
    pub sha: String,
    pub commit: String,
}

impl From<UpsertOutcome> for UpsertFileResponse {
    fn from(outcome: UpsertOutcome) -> Self {
        Self {
            url: outcome.url,
            sha: outcome.blob.into(),
            commit: outcome.commit.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BulkUpsertResponse {
    pub commit: String,
    pub files: Vec<String>,
}

impl From<CommitOutcome> for BulkUpsertResponse {
    fn from(outcome: CommitOutcome) -> Self {
        Self {
            commit: outcome.commit.into(),
            files: outcome.paths.into_iter().map(String::from).collect(),
        }
    }
}

/// Error payload. `error` is always present; the rest is additive.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_kind: Option<RemoteErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// A failed gateway request.
#[derive(Debug)]
pub struct ApiError(pub MutationError);

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: Some(self.0.kind()),
            remote_kind: self.0.remote_kind(),
            status: self.0.status(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// The 401 response for a missing or wrong secret.
pub fn unauthorized() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "Unauthorized".into(),
            kind: None,
            remote_kind: None,
            status: None,
        }),
    )
}

//! core::types
//!
//! Strong types for the values that cross the gateway boundary.
//!
//! # Types
//!
//! - [`RepoId`] - `(owner, name)` pair naming a remote repository
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Content-addressed object identifier
//! - [`RepoPath`] - Validated repository-relative file path
//! - [`FileMode`] - Tree entry mode
//! - [`Encoding`] / [`FileContent`] - Decoded file payload
//!
//! # Validation
//!
//! Every type validates at construction time, so a request that reaches the
//! engine has already been checked and no remote call is issued for
//! malformed input.
//!
//! # Examples
//!
//! ```
//! use refgate::core::types::{BranchName, RepoId, RepoPath};
//!
//! let repo = RepoId::new("octocat", "hello-world").unwrap();
//! let branch = BranchName::new("feature/docs").unwrap();
//! let path = RepoPath::new("docs/index.md").unwrap();
//!
//! assert_eq!(repo.to_string(), "octocat/hello-world");
//! assert_eq!(branch.as_str(), "feature/docs");
//! assert_eq!(path.as_str(), "docs/index.md");
//!
//! assert!(BranchName::new("bad..name").is_err());
//! assert!(RepoPath::new("../escape").is_err());
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository: {0}")]
    InvalidRepo(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("unsupported encoding '{0}', expected 'utf-8' or 'base64'")]
    UnsupportedEncoding(String),
}

/// A remote repository, identified by owner and name.
///
/// Supplied per request; the gateway holds no repository state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Create a validated repository identifier.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepo` if either component is empty or
    /// contains `/` or whitespace.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let owner = owner.into();
        let name = name.into();
        Self::validate_component("owner", &owner)?;
        Self::validate_component("repo", &name)?;
        Ok(Self { owner, name })
    }

    fn validate_component(label: &str, value: &str) -> Result<(), TypeError> {
        if value.is_empty() {
            return Err(TypeError::InvalidRepo(format!("{label} cannot be empty")));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidRepo(format!(
                "{label} '{value}' cannot contain '/' or whitespace"
            )));
        }
        if value == "." || value == ".." {
            return Err(TypeError::InvalidRepo(format!(
                "{label} cannot be '{value}'"
            )));
        }
        Ok(())
    }

    /// Repository owner (user or organization).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A validated Git branch name.
///
/// Branch names follow Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - No path component may start with `.` or end with `.lock`
///
/// # Example
///
/// ```
/// use refgate::core::types::BranchName;
///
/// assert!(BranchName::new("release/1.2").is_ok());
/// assert!(BranchName::new("bot@ci").is_ok());
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("-flag").is_err());
/// assert!(BranchName::new("topic.lock").is_err());
/// assert!(BranchName::new("with space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    const FORBIDDEN_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    const FORBIDDEN_SEQUENCES: [&'static str; 3] = ["..", "@{", "//"];

    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name).map_err(TypeError::InvalidBranchName)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("branch name cannot be empty".into());
        }
        if name == "@" {
            return Err("branch name cannot be '@' (reserved)".into());
        }
        if let Some(first) = name.chars().next().filter(|c| *c == '.' || *c == '-') {
            return Err(format!("branch name cannot start with '{first}'"));
        }
        if name.ends_with(".lock") {
            return Err("branch name cannot end with '.lock'".into());
        }
        if name.ends_with('/') {
            return Err("branch name cannot end with '/'".into());
        }
        if let Some(seq) = Self::FORBIDDEN_SEQUENCES
            .iter()
            .find(|seq| name.contains(*seq))
        {
            return Err(format!("branch name cannot contain '{seq}'"));
        }
        if let Some(c) = Self::FORBIDDEN_CHARS.iter().find(|c| name.contains(**c)) {
            return Err(format!("branch name cannot contain '{c}'"));
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return Err("branch name cannot contain control characters".into());
        }
        for component in name.split('/').filter(|c| !c.is_empty()) {
            if component.starts_with('.') {
                return Err("path component cannot start with '.'".into());
            }
            if component.ends_with(".lock") {
                return Err("path component cannot end with '.lock'".into());
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully qualified ref (`refs/heads/<name>`).
    pub fn qualified_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// The ref path relative to `refs/` (`heads/<name>`).
    pub fn heads_ref(&self) -> String {
        format!("heads/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content-addressed object identifier (SHA-1 or SHA-256 hex).
///
/// Normalized to lowercase so identifiers compare equal regardless of how
/// the remote store cased them.
///
/// ```
/// use refgate::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 or 64 hex characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid("object id must be hexadecimal".into()));
        }
        Ok(Self(oid))
    }

    /// Build an id from a raw SHA-1 (20 byte) or SHA-256 (32 byte) digest.
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        debug_assert!(digest.len() == 20 || digest.len() == 32);
        Self(hex::encode(digest))
    }

    /// Abbreviated form for log lines.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated path relative to the repository root.
///
/// Components are separated by `/`. The path cannot be absolute, cannot end
/// with `/`, and cannot contain empty, `.` or `..` components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a new validated repository path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` describing the first violated rule.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' must be relative to the repository root"
            )));
        }
        if path.ends_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' cannot end with '/'"
            )));
        }
        if path.contains('\0') {
            return Err(TypeError::InvalidPath("path cannot contain NUL".into()));
        }
        if let Some(bad) = path
            .split('/')
            .find(|c| c.is_empty() || *c == "." || *c == "..")
        {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' contains invalid component '{bad}'"
            )));
        }
        Ok(Self(path))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tree entry file mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileMode {
    /// Regular, non-executable file (`100644`).
    #[default]
    Regular,
    /// Executable file (`100755`).
    Executable,
    /// Symbolic link (`120000`).
    Symlink,
}

impl FileMode {
    /// Git's octal mode string.
    pub fn as_git_mode(self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
        }
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_git_mode())
    }
}

/// Declared encoding of inbound file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Content is UTF-8 text, written verbatim.
    #[default]
    Utf8,
    /// Content is standard base64 and is decoded before writing.
    Base64,
}

impl Encoding {
    /// Parse an encoding label. Absent means UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::UnsupportedEncoding` for any label other than
    /// `utf-8`/`utf8` or `base64` (case-insensitive).
    pub fn parse(label: Option<&str>) -> Result<Self, TypeError> {
        match label.map(str::to_ascii_lowercase).as_deref() {
            None | Some("utf-8") | Some("utf8") => Ok(Encoding::Utf8),
            Some("base64") => Ok(Encoding::Base64),
            Some(_) => Err(TypeError::UnsupportedEncoding(
                label.unwrap_or_default().to_string(),
            )),
        }
    }
}

/// Decoded, non-empty file payload.
#[derive(Clone, PartialEq, Eq)]
pub struct FileContent {
    bytes: Vec<u8>,
}

impl FileContent {
    /// Decode inbound content according to `encoding`.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidContent` if the content is empty, or if
    /// base64 content does not decode.
    pub fn decode(raw: &str, encoding: Encoding) -> Result<Self, TypeError> {
        if raw.is_empty() {
            return Err(TypeError::InvalidContent("content cannot be empty".into()));
        }
        let bytes = match encoding {
            Encoding::Utf8 => raw.as_bytes().to_vec(),
            Encoding::Base64 => BASE64
                .decode(raw.trim())
                .map_err(|e| TypeError::InvalidContent(format!("invalid base64: {e}")))?,
        };
        Self::from_bytes(bytes)
    }

    /// Wrap raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidContent` if `bytes` is empty.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TypeError::InvalidContent("content cannot be empty".into()));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// File bodies can be large and sensitive; only the size is printed.
impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One requested file write: a path and its new content.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: RepoPath,
    pub content: FileContent,
}

impl FileChange {
    pub fn new(path: RepoPath, content: FileContent) -> Self {
        Self { path, content }
    }
}

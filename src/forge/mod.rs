//! forge
//!
//! Object store clients for remote version-control hosts.
//!
//! # Architecture
//!
//! The [`ObjectStore`] trait is the capability the engine consumes. It
//! exposes the content-addressed primitives (refs, commits, trees, blobs)
//! plus the host's single-file contents write, and nothing else. The engine
//! receives an `Arc<dyn ObjectStore>` at construction and never names a
//! concrete implementation.
//!
//! # Modules
//!
//! - `traits`: Core `ObjectStore` trait, [`ForgeError`], request/response types
//! - [`github`]: GitHub implementation over the REST Git Data and Contents APIs
//! - [`mock`]: In-memory content-addressed implementation for tests
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use refgate::forge::{github::{GitHubOptions, GitHubStore}, ObjectStore};
//!
//! let store: Arc<dyn ObjectStore> = Arc::new(GitHubStore::new(token, GitHubOptions::default())?);
//! let tip = store.resolve_ref(&repo, &branch).await?;
//! ```

pub mod github;
pub mod mock;
mod traits;

pub use traits::*;

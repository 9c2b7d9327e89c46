//! refgate - An authenticated HTTP gateway for atomic commits to GitHub branches
//!
//! Automated callers (CI jobs, bots) use refgate to create branches and to
//! write one or many files to a branch as a single commit, without cloning
//! the repository.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, wires the gateway)
//! - [`server`] - HTTP routes, shared-secret gate, wire payloads
//! - [`engine`] - Branch mutation engine: resolve, upsert, multi-file commit, branch creation
//! - [`forge`] - Object store capability and its GitHub and in-memory implementations
//! - [`core`] - Domain types and configuration
//!
//! # Correctness Invariants
//!
//! refgate maintains the following invariants:
//!
//! 1. A commit is reported only once the ref update publishing it has succeeded
//! 2. Branch refs only move through a compare-and-swap against the resolved tip
//! 3. Invalid input is rejected before any remote call
//! 4. Concurrent writers are surfaced as conflicts, never silently merged

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod server;

//! Domain model for hosted repositories.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//!
//! # Invariants
//! - Every repository is identified by a validated `RepositoryIdentifier`.
//! - Deletion is a hard delete of both metadata and the physical repository.

pub mod repository;

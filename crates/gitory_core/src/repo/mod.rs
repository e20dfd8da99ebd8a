//! Repository metadata persistence.
//!
//! # Responsibility
//! - Define the metadata store contract used by the manager.
//! - Isolate SQLite query details from orchestration.
//!
//! # Invariants
//! - Store APIs return semantic errors (`DuplicateIdentifier`, `NotFound`) in
//!   addition to DB transport errors.

pub mod repository_repo;

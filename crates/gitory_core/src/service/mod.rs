//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate the metadata store and hosting driver into lifecycle APIs.
//! - Keep API layers decoupled from storage and git details.

pub mod identifier_lock;
pub mod repository_manager;

//! Caseflow storage abstractions.
//!
//! This crate defines the storage contract the engine is written against:
//! - workflow templates (immutable once published)
//! - instances, with an optimistic version guard on every update
//! - assigned tasks and append-only history
//! - the user directory consumed by dispatch
//!
//! Design stance:
//! - Multi-record writes go through [`InstanceStore::commit_transition`],
//!   which applies a whole [`TransitionCommit`] or nothing. The engine
//!   never performs a partial write sequence against separate tables.
//! - The in-memory adapter is the deterministic reference used by tests;
//!   production deployments use the PostgreSQL adapter behind the
//!   `postgres` feature.

#![deny(unsafe_code)]

mod commit;
mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use commit::{HistoryAppend, InstanceWrite, TaskClose, TransitionCommit};
pub use error::{StorageError, StorageResult};
pub use traits::{
    CaseflowStore, HistoryStore, InstanceStore, TaskStore, TemplateStore, UserDirectory,
};

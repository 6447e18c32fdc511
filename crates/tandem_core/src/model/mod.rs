//! Board domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep typed records for everything crossing the storage boundary.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Ordering state (`position`) is plain data here; only the repository
//!   layer may assign it.
//!
//! # See also
//! - docs/architecture/data-model.md

pub mod board;
pub mod column;
pub mod task;

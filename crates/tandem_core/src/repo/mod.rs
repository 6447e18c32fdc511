//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Every mutation runs inside one `BEGIN IMMEDIATE` transaction; a task
//!   row and its ordering key never change outside one.
//! - Repository APIs return semantic errors (`TaskNotFound`,
//!   `ColumnNotFound`) in addition to DB transport errors.
//!
//! # See also
//! - docs/architecture/board-ordering.md

pub mod column_repo;
pub mod task_repo;

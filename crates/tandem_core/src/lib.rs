//! Core domain logic for the Tandem board.
//! This crate is the single source of truth for ordering invariants.

pub mod db;
pub mod fanout;
pub mod logging;
pub mod model;
pub mod position;
pub mod repo;
pub mod service;

pub use fanout::{EventSink, FanoutRegistry, FanoutRegistryError, SinkError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::board::{BoardEvent, BoardEventKind, BoardSnapshot, ColumnTasks};
pub use model::column::Column;
pub use model::task::{Priority, Task, TaskId, TaskValidationError};
pub use position::{allocate, Allocation, FIRST_POSITION, POSITION_GAP};
pub use repo::column_repo::{ColumnRepoError, ColumnRepository, SqliteColumnRepository};
pub use repo::task_repo::{
    MoveOutcome, NewTask, SqliteTaskRepository, TaskPatch, TaskRepoError, TaskRepoResult,
    TaskRepository,
};
pub use service::board_service::{
    BoardService, BoardServiceError, CreateTaskRequest, MoveTaskRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Board snapshot shapes shared by list queries and broadcast payloads.

use crate::model::column::Column;
use crate::model::task::{Task, TaskId};
use serde::{Deserialize, Serialize};

/// One column together with its fully ordered task list.
///
/// Tasks are sorted ascending by `(position, uuid)`; the repository layer
/// guarantees the order, this type only carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTasks {
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// Full board materialization, columns ascending by `display_rank`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub columns: Vec<ColumnTasks>,
}

/// Mutation category carried on every broadcast payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardEventKind {
    TaskCreated,
    TaskMoved,
    TaskUpdated,
    TaskDeleted,
}

/// Broadcast payload emitted after a successful mutation.
///
/// Carries the complete, freshly ordered task lists of every column the
/// mutation touched (one column, or source plus target for a cross-column
/// move). Receivers replace their copy of those columns wholesale instead
/// of patching, which keeps reconnecting clients trivially convergent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardEvent {
    pub kind: BoardEventKind,
    pub task_uuid: TaskId,
    pub columns: Vec<ColumnTasks>,
}

//! Board use-case service.
//!
//! # Responsibility
//! - Provide the task create/move/update/delete/read API for hosts.
//! - Validate and normalize input before it reaches storage.
//! - Emit exactly one broadcast event per successful mutation.
//!
//! # Invariants
//! - Titles are stored trimmed; blank or oversized titles never reach the
//!   repository.
//! - In-place move requests write nothing and broadcast nothing.
//! - A contended write is retried once after a fixed backoff, then
//!   surfaced to the caller.

use crate::fanout::FanoutRegistry;
use crate::model::board::{BoardEvent, BoardEventKind, BoardSnapshot, ColumnTasks};
use crate::model::task::{validate_title, Priority, Task, TaskId, TaskValidationError};
use crate::repo::column_repo::{ColumnRepoError, ColumnRepository};
use crate::repo::task_repo::{normalize_tags, NewTask, TaskPatch, TaskRepoError, TaskRepository};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fixed backoff before the single automatic retry of a contended write.
const CONTENTION_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Service error for board use-cases.
#[derive(Debug)]
pub enum BoardServiceError {
    /// Title failed trim/length rules.
    InvalidTitle(TaskValidationError),
    /// Tag input contains empty values.
    InvalidTag(String),
    /// Target task does not exist.
    TaskNotFound(TaskId),
    /// Referenced column id is not part of the board.
    InvalidColumn(String),
    /// Anchor task cannot order the requested slot.
    InvalidAnchor(TaskId),
    /// Write stayed contended after the automatic retry.
    Contention,
    /// Task persistence failure.
    Repo(TaskRepoError),
    /// Column persistence failure.
    Columns(ColumnRepoError),
}

impl Display for BoardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle(err) => write!(f, "{err}"),
            Self::InvalidTag(value) => write!(f, "invalid tag: `{value}`"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidColumn(column_id) => write!(f, "unknown column: `{column_id}`"),
            Self::InvalidAnchor(id) => write!(f, "invalid anchor task: {id}"),
            Self::Contention => {
                write!(f, "board is busy with another write; try the request again")
            }
            Self::Repo(err) => write!(f, "{err}"),
            Self::Columns(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTitle(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Columns(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskRepoError> for BoardServiceError {
    fn from(value: TaskRepoError) -> Self {
        match value {
            TaskRepoError::TaskNotFound(id) => Self::TaskNotFound(id),
            TaskRepoError::ColumnNotFound(column_id) => Self::InvalidColumn(column_id),
            TaskRepoError::AnchorNotInColumn(id) => Self::InvalidAnchor(id),
            TaskRepoError::UnorderableAnchors { after, .. } => Self::InvalidAnchor(after),
            TaskRepoError::Contention => Self::Contention,
            other => Self::Repo(other),
        }
    }
}

impl From<ColumnRepoError> for BoardServiceError {
    fn from(value: ColumnRepoError) -> Self {
        Self::Columns(value)
    }
}

/// Create payload accepted from hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Defaults to [`Priority::Medium`] when omitted.
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
}

/// Move payload accepted from hosts.
///
/// Omitting `target_column_id` keeps the task in its current column;
/// omitting both anchors appends at the target column tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTaskRequest {
    pub task_uuid: TaskId,
    pub target_column_id: Option<String>,
    pub after: Option<TaskId>,
    pub before: Option<TaskId>,
}

/// Board service facade over repository implementations.
pub struct BoardService<C: ColumnRepository, T: TaskRepository> {
    columns: C,
    tasks: T,
    fanout: Arc<FanoutRegistry>,
}

impl<C: ColumnRepository, T: TaskRepository> BoardService<C, T> {
    /// Creates a service using the provided repositories and sink registry.
    pub fn new(columns: C, tasks: T, fanout: Arc<FanoutRegistry>) -> Self {
        Self {
            columns,
            tasks,
            fanout,
        }
    }

    /// Creates one task at the tail of the requested column.
    pub fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, BoardServiceError> {
        let title = request.title.trim().to_string();
        validate_title(&title).map_err(BoardServiceError::InvalidTitle)?;
        for tag in &request.tags {
            if tag.trim().is_empty() {
                return Err(BoardServiceError::InvalidTag(tag.clone()));
            }
        }

        let draft = NewTask {
            column_id: request.column_id.clone(),
            title,
            description: request.description.clone(),
            priority: request.priority.unwrap_or_default(),
            tags: normalize_tags(&request.tags),
        };
        let task = retry_once_on_contention("create_task", || {
            self.tasks
                .insert_task(&draft)
                .map_err(BoardServiceError::from)
        })?;

        info!(
            "event=task_created module=service task={} code={} column={}",
            task.uuid, task.code, task.column_id
        );
        self.emit_event(BoardEventKind::TaskCreated, task.uuid, &[&task.column_id]);
        Ok(task)
    }

    /// Places one task relative to optional anchors, possibly in another
    /// column. An in-place request returns the current task untouched.
    pub fn move_task(&self, request: &MoveTaskRequest) -> Result<Task, BoardServiceError> {
        let outcome = retry_once_on_contention("move_task", || {
            self.tasks
                .move_task(
                    request.task_uuid,
                    request.target_column_id.as_deref(),
                    request.after,
                    request.before,
                )
                .map_err(BoardServiceError::from)
        })?;

        if !outcome.moved {
            return Ok(outcome.task);
        }

        info!(
            "event=task_moved module=service task={} from={} to={}",
            outcome.task.uuid, outcome.source_column_id, outcome.task.column_id
        );
        if outcome.source_column_id == outcome.task.column_id {
            self.emit_event(
                BoardEventKind::TaskMoved,
                outcome.task.uuid,
                &[&outcome.task.column_id],
            );
        } else {
            self.emit_event(
                BoardEventKind::TaskMoved,
                outcome.task.uuid,
                &[&outcome.source_column_id, &outcome.task.column_id],
            );
        }
        Ok(outcome.task)
    }

    /// Applies a partial field update. An empty patch is a plain read.
    pub fn update_task(&self, uuid: TaskId, patch: TaskPatch) -> Result<Task, BoardServiceError> {
        if patch.is_empty() {
            return self
                .get_task(uuid)?
                .ok_or(BoardServiceError::TaskNotFound(uuid));
        }

        let mut normalized = patch;
        if let Some(title) = normalized.title.take() {
            let title = title.trim().to_string();
            validate_title(&title).map_err(BoardServiceError::InvalidTitle)?;
            normalized.title = Some(title);
        }
        if let Some(tags) = normalized.tags.take() {
            for tag in &tags {
                if tag.trim().is_empty() {
                    return Err(BoardServiceError::InvalidTag(tag.clone()));
                }
            }
            normalized.tags = Some(normalize_tags(&tags));
        }

        let task = retry_once_on_contention("update_task", || {
            self.tasks
                .update_task_fields(uuid, &normalized)
                .map_err(BoardServiceError::from)
        })?;

        info!("event=task_updated module=service task={}", task.uuid);
        self.emit_event(BoardEventKind::TaskUpdated, task.uuid, &[&task.column_id]);
        Ok(task)
    }

    /// Hard-deletes one task and returns its final state.
    pub fn delete_task(&self, uuid: TaskId) -> Result<Task, BoardServiceError> {
        let task = retry_once_on_contention("delete_task", || {
            self.tasks
                .delete_task(uuid)
                .map_err(BoardServiceError::from)
        })?;

        info!(
            "event=task_deleted module=service task={} column={}",
            task.uuid, task.column_id
        );
        self.emit_event(BoardEventKind::TaskDeleted, task.uuid, &[&task.column_id]);
        Ok(task)
    }

    /// Gets one task by stable id.
    pub fn get_task(&self, uuid: TaskId) -> Result<Option<Task>, BoardServiceError> {
        Ok(self.tasks.get_task(uuid)?)
    }

    /// Gets one task by its human-facing code.
    pub fn get_task_by_code(&self, code: &str) -> Result<Option<Task>, BoardServiceError> {
        Ok(self.tasks.get_task_by_code(code)?)
    }

    /// Lists one column's tasks in board order.
    pub fn list_column(&self, column_id: &str) -> Result<Vec<Task>, BoardServiceError> {
        if self.columns.get_column(column_id)?.is_none() {
            return Err(BoardServiceError::InvalidColumn(column_id.to_string()));
        }
        Ok(self.tasks.list_column_tasks(column_id)?)
    }

    /// Materializes the full board, columns ascending by display rank.
    pub fn list_board(&self) -> Result<BoardSnapshot, BoardServiceError> {
        let columns = self.columns.list_columns()?;
        let mut snapshot = Vec::with_capacity(columns.len());
        for column in columns {
            let tasks = self.tasks.list_column_tasks(&column.column_id)?;
            snapshot.push(ColumnTasks { column, tasks });
        }
        Ok(BoardSnapshot { columns: snapshot })
    }

    /// Builds fresh snapshots of the affected columns and fans the event
    /// out. The mutation already committed, so snapshot or delivery
    /// problems are logged and dropped instead of failing the call.
    fn emit_event(&self, kind: BoardEventKind, task_uuid: TaskId, column_ids: &[&str]) {
        let mut columns = Vec::with_capacity(column_ids.len());
        for column_id in column_ids {
            match self.column_snapshot(column_id) {
                Ok(snapshot) => columns.push(snapshot),
                Err(err) => {
                    warn!(
                        "event=fanout_snapshot module=service status=skip column={column_id} error={err}"
                    );
                    return;
                }
            }
        }

        let event = BoardEvent {
            kind,
            task_uuid,
            columns,
        };
        self.fanout.emit(&event);
    }

    fn column_snapshot(&self, column_id: &str) -> Result<ColumnTasks, BoardServiceError> {
        let column = self
            .columns
            .get_column(column_id)?
            .ok_or_else(|| BoardServiceError::InvalidColumn(column_id.to_string()))?;
        let tasks = self.tasks.list_column_tasks(column_id)?;
        Ok(ColumnTasks { column, tasks })
    }
}

fn retry_once_on_contention<T>(
    operation: &'static str,
    mut attempt: impl FnMut() -> Result<T, BoardServiceError>,
) -> Result<T, BoardServiceError> {
    match attempt() {
        Err(BoardServiceError::Contention) => {
            warn!(
                "event=contention_retry module=service op={operation} backoff_ms={}",
                CONTENTION_RETRY_BACKOFF.as_millis()
            );
            thread::sleep(CONTENTION_RETRY_BACKOFF);
            attempt()
        }
        other => other,
    }
}

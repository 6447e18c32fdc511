//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for task CRUD and sparse-position ordering.
//! - Keep SQL details, slot allocation, and rebalancing inside the
//!   repository boundary.
//!
//! # Invariants
//! - Column listing is deterministic: `position ASC, uuid ASC`.
//! - Every mutation (insert, move, field update, delete) runs inside one
//!   `BEGIN IMMEDIATE` transaction; a rebalance triggered by that mutation
//!   joins the same transaction.
//! - Neighbor scans always exclude the task being placed, so a task can be
//!   ordered relative to anchors without tripping over its own row.
//!
//! # See also
//! - docs/architecture/board-ordering.md

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::task::{
    format_task_code, validate_title, Priority, Task, TaskId, TaskValidationError,
};
use crate::position::{allocate, rebalanced_position, Allocation};
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by task repository operations.
pub type TaskRepoResult<T> = Result<T, TaskRepoError>;

/// Errors from task repository operations.
#[derive(Debug)]
pub enum TaskRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target task does not exist.
    TaskNotFound(TaskId),
    /// Referenced column id is not part of the board.
    ColumnNotFound(String),
    /// Anchor task exists but does not reside in the target column.
    AnchorNotInColumn(TaskId),
    /// `before` anchor does not sort after the `after` anchor.
    UnorderableAnchors { after: TaskId, before: TaskId },
    /// Lost a race with another writer; the operation is safe to retry.
    Contention,
    /// Ordering keys stayed exhausted even after a column rebalance.
    PositionSpaceExhausted(String),
    /// Payload failed model validation.
    Validation(TaskValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for TaskRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ColumnNotFound(column_id) => write!(f, "unknown column: `{column_id}`"),
            Self::AnchorNotInColumn(id) => {
                write!(f, "anchor task is not in the target column: {id}")
            }
            Self::UnorderableAnchors { after, before } => write!(
                f,
                "anchors cannot order a slot: `before` task {before} does not sort after task {after}"
            ),
            Self::Contention => write!(f, "write lost a race with another connection"),
            Self::PositionSpaceExhausted(column_id) => write!(
                f,
                "ordering key space exhausted in column `{column_id}` even after rebalance"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "task repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "task repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "task repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid task data: {message}"),
        }
    }
}

impl Error for TaskRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for TaskRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<TaskValidationError> for TaskRepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for TaskRepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_contention_error(&value) {
            return Self::Contention;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// True for errors that signal a lost race with another writer: lock waits
/// that outlived the busy timeout, and `(column_id, position)` uniqueness
/// violations from interleaved slot allocations.
fn is_contention_error(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(inner, message) = err {
        return match inner.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => true,
            rusqlite::ErrorCode::ConstraintViolation => message
                .as_deref()
                .map_or(false, |text| text.contains("tasks.column_id, tasks.position")),
            _ => false,
        };
    }
    false
}

/// Insert payload for one new task.
///
/// The ordering key and the human-facing code are assigned by the
/// repository inside the insert transaction, never by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
}

/// Partial field update for one task.
///
/// `None` leaves a field untouched. For `description`, `Some(None)` clears
/// the stored value. Ordering state (`column_id`, `position`) is never
/// patchable; moves go through [`TaskRepository::move_task`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// True when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
    }
}

/// Result of one move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Task state after the move, or current state for an in-place request.
    pub task: Task,
    /// Column the task lived in when the request started.
    pub source_column_id: String,
    /// False when the request resolved to the task's current slot and no
    /// row was written.
    pub moved: bool,
}

/// Repository interface for task operations.
pub trait TaskRepository {
    /// Inserts one task at the tail of its column and assigns its code.
    fn insert_task(&self, draft: &NewTask) -> TaskRepoResult<Task>;
    /// Loads one task by id.
    fn get_task(&self, uuid: TaskId) -> TaskRepoResult<Option<Task>>;
    /// Loads one task by its human-facing code.
    fn get_task_by_code(&self, code: &str) -> TaskRepoResult<Option<Task>>;
    /// Lists one column's tasks ascending by `(position, uuid)`.
    fn list_column_tasks(&self, column_id: &str) -> TaskRepoResult<Vec<Task>>;
    /// Places one task relative to optional anchor tasks, optionally in
    /// another column. No anchors means append at the target column tail.
    fn move_task(
        &self,
        uuid: TaskId,
        target_column_id: Option<&str>,
        after: Option<TaskId>,
        before: Option<TaskId>,
    ) -> TaskRepoResult<MoveOutcome>;
    /// Applies a partial field update and bumps `updated_at`.
    fn update_task_fields(&self, uuid: TaskId, patch: &TaskPatch) -> TaskRepoResult<Task>;
    /// Hard-deletes one task and returns its final state.
    fn delete_task(&self, uuid: TaskId) -> TaskRepoResult<Task>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> TaskRepoResult<Self> {
        ensure_task_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    code,
    column_id,
    title,
    description,
    priority,
    position,
    created_at,
    updated_at
 FROM tasks";

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert_task(&self, draft: &NewTask) -> TaskRepoResult<Task> {
        validate_title(&draft.title)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !column_exists(&tx, &draft.column_id)? {
            return Err(TaskRepoError::ColumnNotFound(draft.column_id.clone()));
        }

        let uuid = Uuid::new_v4();
        let position = allocate_slot(&tx, &draft.column_id, uuid, None, None)?;
        let code = draw_task_code(&tx)?;
        tx.execute(
            "INSERT INTO tasks (
                uuid,
                code,
                column_id,
                title,
                description,
                priority,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                uuid.to_string(),
                code,
                draft.column_id,
                draft.title,
                draft.description,
                priority_to_db(draft.priority),
                position,
            ],
        )?;
        replace_task_tags(&tx, &uuid.to_string(), &draft.tags)?;

        let task = load_required_task(&tx, uuid)?;
        tx.commit()?;
        Ok(task)
    }

    fn get_task(&self, uuid: TaskId) -> TaskRepoResult<Option<Task>> {
        load_task(self.conn, uuid)
    }

    fn get_task_by_code(&self, code: &str) -> TaskRepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE code = ?1;"))?;
        let mut rows = stmt.query([code])?;
        if let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            let tags = load_task_tags(self.conn, &uuid_text)?;
            return Ok(Some(parse_task_row(row, tags)?));
        }
        Ok(None)
    }

    fn list_column_tasks(&self, column_id: &str) -> TaskRepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE column_id = ?1 ORDER BY position ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([column_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            let tags = load_task_tags(self.conn, &uuid_text)?;
            tasks.push(parse_task_row(row, tags)?);
        }
        Ok(tasks)
    }

    fn move_task(
        &self,
        uuid: TaskId,
        target_column_id: Option<&str>,
        after: Option<TaskId>,
        before: Option<TaskId>,
    ) -> TaskRepoResult<MoveOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let task = load_task(&tx, uuid)?.ok_or(TaskRepoError::TaskNotFound(uuid))?;
        let source_column_id = task.column_id.clone();
        let target_column_id = target_column_id.unwrap_or(&source_column_id).to_string();
        if !column_exists(&tx, &target_column_id)? {
            return Err(TaskRepoError::ColumnNotFound(target_column_id));
        }

        // A task anchored to itself is an in-place request in its own
        // column; anywhere else the anchor fails residency, because the
        // task is not in the target column until the move lands.
        if after == Some(uuid) || before == Some(uuid) {
            if target_column_id == source_column_id {
                tx.commit()?;
                return Ok(MoveOutcome {
                    task,
                    source_column_id,
                    moved: false,
                });
            }
            return Err(TaskRepoError::AnchorNotInColumn(uuid));
        }

        let after_anchor = load_anchor(&tx, after, &target_column_id)?;
        let before_anchor = load_anchor(&tx, before, &target_column_id)?;
        if let (Some(after_task), Some(before_task)) = (&after_anchor, &before_anchor) {
            if before_task.position <= after_task.position {
                return Err(TaskRepoError::UnorderableAnchors {
                    after: after_task.uuid,
                    before: before_task.uuid,
                });
            }
        }

        let (left, right) = resolve_slot_bounds(&tx, &target_column_id, uuid, after, before)?;
        if target_column_id == source_column_id && within_bounds(task.position, left, right) {
            tx.commit()?;
            return Ok(MoveOutcome {
                task,
                source_column_id,
                moved: false,
            });
        }

        let position = allocate_slot(&tx, &target_column_id, uuid, after, before)?;
        tx.execute(
            "UPDATE tasks SET column_id = ?2, position = ?3 WHERE uuid = ?1;",
            params![uuid.to_string(), target_column_id, position],
        )?;

        let task = load_required_task(&tx, uuid)?;
        tx.commit()?;
        Ok(MoveOutcome {
            task,
            source_column_id,
            moved: true,
        })
    }

    fn update_task_fields(&self, uuid: TaskId, patch: &TaskPatch) -> TaskRepoResult<Task> {
        if let Some(title) = patch.title.as_deref() {
            validate_title(title)?;
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut sql = String::from("UPDATE tasks SET updated_at = (strftime('%s', 'now') * 1000)");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(title) = patch.title.as_deref() {
            sql.push_str(", title = ?");
            bind_values.push(Value::Text(title.to_string()));
        }
        if let Some(description) = patch.description.as_ref() {
            sql.push_str(", description = ?");
            bind_values.push(match description {
                Some(text) => Value::Text(text.clone()),
                None => Value::Null,
            });
        }
        if let Some(priority) = patch.priority {
            sql.push_str(", priority = ?");
            bind_values.push(Value::Text(priority_to_db(priority).to_string()));
        }
        sql.push_str(" WHERE uuid = ?;");
        bind_values.push(Value::Text(uuid.to_string()));

        let changed = tx.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(TaskRepoError::TaskNotFound(uuid));
        }

        if let Some(tags) = patch.tags.as_deref() {
            replace_task_tags(&tx, &uuid.to_string(), tags)?;
        }

        let task = load_required_task(&tx, uuid)?;
        tx.commit()?;
        Ok(task)
    }

    fn delete_task(&self, uuid: TaskId) -> TaskRepoResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let task = load_task(&tx, uuid)?.ok_or(TaskRepoError::TaskNotFound(uuid))?;
        // Tag links go with the row via ON DELETE CASCADE.
        tx.execute("DELETE FROM tasks WHERE uuid = ?1;", [uuid.to_string()])?;
        tx.commit()?;
        Ok(task)
    }
}

/// Normalizes one tag value: trimmed, lowercased, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes, deduplicates, and sorts tag values.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        if let Some(value) = normalize_tag(tag) {
            unique.insert(value);
        }
    }
    unique.into_iter().collect()
}

/// Allocates an ordering key between the slot's current neighbors,
/// rebalancing the column and retrying once when the gap is gone.
fn allocate_slot(
    tx: &Transaction<'_>,
    column_id: &str,
    moving: TaskId,
    after: Option<TaskId>,
    before: Option<TaskId>,
) -> TaskRepoResult<i64> {
    let (left, right) = resolve_slot_bounds(tx, column_id, moving, after, before)?;
    if let Allocation::At(position) = allocate(left, right) {
        return Ok(position);
    }

    rebalance_column(tx, column_id)?;
    let (left, right) = resolve_slot_bounds(tx, column_id, moving, after, before)?;
    match allocate(left, right) {
        Allocation::At(position) => Ok(position),
        Allocation::Exhausted => {
            error!("event=position_space_exhausted module=repo column={column_id}");
            Err(TaskRepoError::PositionSpaceExhausted(column_id.to_string()))
        }
    }
}

/// Resolves the `(left, right)` position bounds of the requested slot.
///
/// Anchor positions are re-read on every call so the result stays correct
/// after a rebalance rewrote the column. Scans exclude the moving task;
/// with both anchors present the tightest real neighbor above the `after`
/// anchor wins, which keeps the allocated key collision-free even when the
/// anchors are not adjacent.
fn resolve_slot_bounds(
    conn: &Connection,
    column_id: &str,
    moving: TaskId,
    after: Option<TaskId>,
    before: Option<TaskId>,
) -> TaskRepoResult<(Option<i64>, Option<i64>)> {
    let after_position = match after {
        Some(anchor) => Some(required_position(conn, anchor)?),
        None => None,
    };
    let before_position = match before {
        Some(anchor) => Some(required_position(conn, anchor)?),
        None => None,
    };

    match (after_position, before_position) {
        (None, None) => Ok((max_position(conn, column_id, moving)?, None)),
        (Some(left), _) => Ok((
            Some(left),
            successor_position(conn, column_id, moving, left)?,
        )),
        (None, Some(right)) => Ok((
            predecessor_position(conn, column_id, moving, right)?,
            Some(right),
        )),
    }
}

/// True when `position` already sits strictly inside the bounds. Open
/// bounds (`None`) never constrain.
fn within_bounds(position: i64, left: Option<i64>, right: Option<i64>) -> bool {
    left.map_or(true, |value| position > value) && right.map_or(true, |value| position < value)
}

/// Rewrites every ordering key in one column to `rank * gap`, preserving
/// the current `(position, uuid)` order.
///
/// Runs inside the caller's transaction. The rewrite is a pure function of
/// the order read at entry, so a retried mutation that rebalances again
/// reproduces the same assignment. Rows are first parked on distinct keys
/// far below the allocator band; live keys never live down there, which
/// keeps `UNIQUE(column_id, position)` satisfied between the two passes.
fn rebalance_column(tx: &Transaction<'_>, column_id: &str) -> TaskRepoResult<usize> {
    let mut stmt = tx.prepare(
        "SELECT uuid
         FROM tasks
         WHERE column_id = ?1
         ORDER BY position ASC, uuid ASC;",
    )?;
    let mut rows = stmt.query([column_id])?;
    let mut ordered_ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ordered_ids.push(parse_uuid(&value, "tasks.uuid")?);
    }

    for (rank, uuid) in ordered_ids.iter().enumerate() {
        tx.execute(
            "UPDATE tasks SET position = ?2 WHERE uuid = ?1;",
            params![uuid.to_string(), i64::MIN + rank as i64],
        )?;
    }
    for (rank, uuid) in ordered_ids.iter().enumerate() {
        tx.execute(
            "UPDATE tasks SET position = ?2 WHERE uuid = ?1;",
            params![uuid.to_string(), rebalanced_position(rank as i64)],
        )?;
    }

    info!(
        "event=rebalance module=repo status=ok column={column_id} tasks={}",
        ordered_ids.len()
    );
    Ok(ordered_ids.len())
}

/// Loads and residency-checks one optional anchor task.
fn load_anchor(
    conn: &Connection,
    anchor: Option<TaskId>,
    target_column_id: &str,
) -> TaskRepoResult<Option<Task>> {
    let anchor_uuid = match anchor {
        Some(value) => value,
        None => return Ok(None),
    };
    let anchor_task =
        load_task(conn, anchor_uuid)?.ok_or(TaskRepoError::TaskNotFound(anchor_uuid))?;
    if anchor_task.column_id != target_column_id {
        return Err(TaskRepoError::AnchorNotInColumn(anchor_uuid));
    }
    Ok(Some(anchor_task))
}

fn required_position(conn: &Connection, uuid: TaskId) -> TaskRepoResult<i64> {
    conn.query_row(
        "SELECT position FROM tasks WHERE uuid = ?1;",
        [uuid.to_string()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(TaskRepoError::TaskNotFound(uuid))
}

fn max_position(
    conn: &Connection,
    column_id: &str,
    exclude: TaskId,
) -> TaskRepoResult<Option<i64>> {
    let value: Option<i64> = conn.query_row(
        "SELECT MAX(position)
         FROM tasks
         WHERE column_id = ?1
           AND uuid != ?2;",
        params![column_id, exclude.to_string()],
        |row| row.get(0),
    )?;
    Ok(value)
}

fn successor_position(
    conn: &Connection,
    column_id: &str,
    exclude: TaskId,
    above: i64,
) -> TaskRepoResult<Option<i64>> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT position
             FROM tasks
             WHERE column_id = ?1
               AND uuid != ?2
               AND position > ?3
             ORDER BY position ASC
             LIMIT 1;",
            params![column_id, exclude.to_string(), above],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn predecessor_position(
    conn: &Connection,
    column_id: &str,
    exclude: TaskId,
    below: i64,
) -> TaskRepoResult<Option<i64>> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT position
             FROM tasks
             WHERE column_id = ?1
               AND uuid != ?2
               AND position < ?3
             ORDER BY position DESC
             LIMIT 1;",
            params![column_id, exclude.to_string(), below],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Draws the next task code from the single-row counter. Runs inside the
/// insert transaction, so codes stay gapless under serialized writers.
fn draw_task_code(tx: &Transaction<'_>) -> TaskRepoResult<String> {
    let sequence: i64 = tx.query_row(
        "SELECT next_value FROM task_code_seq WHERE id = 1;",
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE task_code_seq SET next_value = next_value + 1 WHERE id = 1;",
        [],
    )?;
    Ok(format_task_code(sequence))
}

fn replace_task_tags(
    tx: &Transaction<'_>,
    task_uuid: &str,
    tags: &[String],
) -> TaskRepoResult<()> {
    tx.execute("DELETE FROM task_tags WHERE task_uuid = ?1;", [task_uuid])?;
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1);",
            [tag.as_str()],
        )?;
        tx.execute(
            "INSERT INTO task_tags (task_uuid, tag_id)
             SELECT ?1, id
             FROM tags
             WHERE name = ?2 COLLATE NOCASE;",
            params![task_uuid, tag.as_str()],
        )?;
    }
    Ok(())
}

fn load_task_tags(conn: &Connection, task_uuid: &str) -> TaskRepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM task_tags tt
         INNER JOIN tags t ON t.id = tt.tag_id
         WHERE tt.task_uuid = ?1
         ORDER BY t.name COLLATE NOCASE ASC;",
    )?;
    let mut rows = stmt.query([task_uuid])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tags.push(value.to_lowercase());
    }
    Ok(tags)
}

fn load_task(conn: &Connection, uuid: TaskId) -> TaskRepoResult<Option<Task>> {
    let uuid_text = uuid.to_string();
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid_text.as_str()])?;
    if let Some(row) = rows.next()? {
        let tags = load_task_tags(conn, uuid_text.as_str())?;
        return Ok(Some(parse_task_row(row, tags)?));
    }
    Ok(None)
}

fn load_required_task(conn: &Connection, uuid: TaskId) -> TaskRepoResult<Task> {
    load_task(conn, uuid)?.ok_or(TaskRepoError::TaskNotFound(uuid))
}

fn parse_task_row(row: &Row<'_>, tags: Vec<String>) -> TaskRepoResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "tasks.uuid")?;

    let priority_text: String = row.get("priority")?;
    let priority = parse_priority(&priority_text).ok_or_else(|| {
        TaskRepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in tasks.priority"
        ))
    })?;

    let task = Task {
        uuid,
        code: row.get("code")?,
        column_id: row.get("column_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        tags,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    task.validate()?;
    Ok(task)
}

fn priority_to_db(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

fn parse_priority(value: &str) -> Option<Priority> {
    match value {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        _ => None,
    }
}

fn parse_uuid(value: &str, column: &'static str) -> TaskRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| TaskRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn column_exists(conn: &Connection, column_id: &str) -> TaskRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM columns
            WHERE column_id = ?1
        );",
        [column_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_task_connection_ready(conn: &Connection) -> TaskRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(TaskRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["tasks", "columns", "task_code_seq", "tags", "task_tags"] {
        if !table_exists(conn, table)? {
            return Err(TaskRepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "uuid",
        "code",
        "column_id",
        "title",
        "description",
        "priority",
        "position",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "tasks", column)? {
            return Err(TaskRepoError::MissingRequiredColumn {
                table: "tasks",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> TaskRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> TaskRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;
    use crate::position::POSITION_GAP;

    fn ordered_assignment(conn: &Connection, column_id: &str) -> Vec<(String, i64)> {
        let mut stmt = conn
            .prepare(
                "SELECT uuid, position
                 FROM tasks
                 WHERE column_id = ?1
                 ORDER BY position ASC, uuid ASC;",
            )
            .unwrap();
        let mut rows = stmt.query([column_id]).unwrap();
        let mut assignment = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            assignment.push((row.get(0).unwrap(), row.get(1).unwrap()));
        }
        assignment
    }

    #[test]
    fn within_bounds_treats_open_edges_as_unbounded() {
        assert!(within_bounds(5, None, None));
        assert!(within_bounds(5, Some(4), None));
        assert!(within_bounds(5, None, Some(6)));
        assert!(within_bounds(5, Some(4), Some(6)));

        assert!(!within_bounds(5, Some(5), None));
        assert!(!within_bounds(5, None, Some(5)));
        assert!(!within_bounds(3, Some(4), Some(6)));
        assert!(!within_bounds(7, Some(4), Some(6)));
    }

    #[test]
    fn repeated_rebalance_reproduces_the_same_assignment() {
        let conn = open_db_in_memory().unwrap();
        let uuids = [
            "00000000-0000-4000-8000-000000000001",
            "00000000-0000-4000-8000-000000000002",
            "00000000-0000-4000-8000-000000000003",
        ];
        // Three rows on adjacent keys.
        for (rank, uuid) in uuids.iter().enumerate() {
            conn.execute(
                "INSERT INTO tasks (uuid, code, column_id, title, position)
                 VALUES (?1, ?2, 'todo', 'Squeezed row', ?3);",
                params![uuid, format_task_code(rank as i64 + 1), 10 + rank as i64],
            )
            .unwrap();
        }

        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate).unwrap();
        rebalance_column(&tx, "todo").unwrap();
        let first = ordered_assignment(&tx, "todo");
        rebalance_column(&tx, "todo").unwrap();
        let second = ordered_assignment(&tx, "todo");
        tx.commit().unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                (uuids[0].to_string(), 0),
                (uuids[1].to_string(), POSITION_GAP),
                (uuids[2].to_string(), 2 * POSITION_GAP),
            ]
        );
    }

    #[test]
    fn normalize_tags_trims_lowercases_and_dedupes() {
        let raw = vec![
            "  API ".to_string(),
            "api".to_string(),
            "Backend".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(
            normalize_tags(&raw),
            vec!["api".to_string(), "backend".to_string()]
        );
        assert_eq!(normalize_tag("  "), None);
        assert_eq!(normalize_tag(" UrGent "), Some("urgent".to_string()));
    }

    #[test]
    fn priority_round_trips_through_db_strings() {
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(parse_priority(priority_to_db(priority)), Some(priority));
        }
        assert_eq!(parse_priority("urgent"), None);
    }

    #[test]
    fn busy_and_position_conflicts_map_to_contention() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy,
                extended_code: 5,
            },
            Some("database is locked".to_string()),
        );
        assert!(matches!(
            TaskRepoError::from(busy),
            TaskRepoError::Contention
        ));

        let slot_conflict = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: tasks.column_id, tasks.position".to_string()),
        );
        assert!(matches!(
            TaskRepoError::from(slot_conflict),
            TaskRepoError::Contention
        ));
    }

    #[test]
    fn unrelated_constraint_violations_stay_db_errors() {
        let code_conflict = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: tasks.code".to_string()),
        );
        assert!(matches!(
            TaskRepoError::from(code_conflict),
            TaskRepoError::Db(_)
        ));
    }
}

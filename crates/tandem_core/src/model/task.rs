//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record shared by repositories and services.
//! - Provide field-level validation for write paths.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another task.
//! - `code` is assigned once at creation and never changes.
//! - `position` is a signed 64-bit ordering key; only the repository layer
//!   assigns it.
//!
//! # See also
//! - docs/architecture/data-model.md

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every task on the board.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type TaskId = Uuid;

/// Maximum accepted title length in characters, counted after trimming.
pub const MAX_TITLE_CHARS: usize = 255;

/// Prefix of every human-facing task code.
pub const TASK_CODE_PREFIX: &str = "TASK-";

/// Task urgency bucket shown on cards and usable as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait; rendered without accent.
    Low,
    /// Normal flow of work.
    Medium,
    /// Needs attention first.
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Validation failures for task field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Title is empty after trimming.
    TitleBlank,
    /// Title exceeds [`MAX_TITLE_CHARS`] characters.
    TitleTooLong { actual: usize },
    /// Code does not match the `TASK-xxxxx` shape.
    CodeMalformed(String),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TitleBlank => write!(f, "task title must not be blank"),
            Self::TitleTooLong { actual } => write!(
                f,
                "task title must be at most {MAX_TITLE_CHARS} characters, got {actual}"
            ),
            Self::CodeMalformed(code) => write!(f, "malformed task code: `{code}`"),
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical task record.
///
/// One shape serves storage read-back, the ordering API, and broadcast
/// payloads; no untyped rows leave the repository layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable global ID used for linking, moves and auditing.
    pub uuid: TaskId,
    /// Human-facing sequential code (`TASK-00001`), immutable after creation.
    pub code: String,
    /// Owning column slug.
    pub column_id: String,
    /// Card title, 1..=255 characters.
    pub title: String,
    /// Optional long-form body.
    pub description: Option<String>,
    /// Urgency bucket.
    pub priority: Priority,
    /// Normalized lowercase tag set, sorted ascending.
    pub tags: Vec<String>,
    /// Sparse ordering key within `column_id`. Signed, 64-bit, may be
    /// negative after repeated head insertions.
    pub position: i64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Task {
    /// Validates task field invariants.
    ///
    /// Called by repository write paths before SQL mutation and by read
    /// paths after row decoding, so invalid persisted state is rejected
    /// instead of masked.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_title(&self.title)?;
        validate_code(&self.code)?;
        Ok(())
    }
}

/// Checks title bounds: non-blank, at most [`MAX_TITLE_CHARS`] characters.
pub fn validate_title(title: &str) -> Result<(), TaskValidationError> {
    if title.trim().is_empty() {
        return Err(TaskValidationError::TitleBlank);
    }
    let actual = title.chars().count();
    if actual > MAX_TITLE_CHARS {
        return Err(TaskValidationError::TitleTooLong { actual });
    }
    Ok(())
}

/// Checks the `TASK-xxxxx` code shape: fixed prefix plus at least five
/// ASCII digits.
pub fn validate_code(code: &str) -> Result<(), TaskValidationError> {
    let digits = match code.strip_prefix(TASK_CODE_PREFIX) {
        Some(rest) => rest,
        None => return Err(TaskValidationError::CodeMalformed(code.to_string())),
    };
    if digits.len() < 5 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(TaskValidationError::CodeMalformed(code.to_string()));
    }
    Ok(())
}

/// Formats the sequential counter value as a task code.
///
/// Five digits is a display minimum, not a cap; the value keeps growing
/// past `TASK-99999`.
pub fn format_task_code(sequence: i64) -> String {
    format!("{TASK_CODE_PREFIX}{sequence:05}")
}

//! Column domain model.

use serde::{Deserialize, Serialize};

/// Ordered bucket of tasks.
///
/// Columns are created by the seed migration and never deleted in normal
/// operation. `display_rank` orders columns on the board and is unrelated
/// to task positions inside the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Stable slug, e.g. `todo`.
    pub column_id: String,
    /// User-facing label.
    pub display_name: String,
    /// Decorative emoji shown in the column header.
    pub emoji: String,
    /// Accent color as a hex string.
    pub color: String,
    /// Fixed board order key, ascending left to right.
    pub display_rank: i64,
}

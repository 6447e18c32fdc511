//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `tandem_core` wiring.
//! - Drive one deterministic create/move/bisect pass against an in-memory
//!   board for quick local sanity checks.

use std::process::ExitCode;
use std::sync::Arc;
use tandem_core::db::open_db_in_memory;
use tandem_core::{
    BoardService, CreateTaskRequest, FanoutRegistry, MoveTaskRequest, SqliteColumnRepository,
    SqliteTaskRepository, TaskId,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tandem smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("tandem_core version={}", tandem_core::core_version());

    let conn = open_db_in_memory()?;
    let columns = SqliteColumnRepository::try_new(&conn)?;
    let tasks = SqliteTaskRepository::try_new(&conn)?;
    let service = BoardService::new(columns, tasks, Arc::new(FanoutRegistry::new()));

    let first = service.create_task(&create_request("Draft the kickoff agenda"))?;
    let second = service.create_task(&create_request("Collect design feedback"))?;
    println!(
        "created {} position={} and {} position={}",
        first.code, first.position, second.code, second.position
    );

    // Requests that resolve to the current slot write nothing.
    let unchanged = service.move_task(&move_before(first.uuid, second.uuid))?;
    println!(
        "move {} before {} kept position={}",
        unchanged.code, second.code, unchanged.position
    );

    let third = service.create_task(&create_request("Review the API sketch"))?;
    let placed = service.move_task(&move_after(third.uuid, first.uuid))?;
    println!(
        "moved {} between {} and {} position={}",
        placed.code, first.code, second.code, placed.position
    );

    println!("todo column order:");
    for task in service.list_column("todo")? {
        println!("  {} position={} title={}", task.code, task.position, task.title);
    }
    Ok(())
}

fn create_request(title: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        column_id: "todo".to_string(),
        title: title.to_string(),
        description: None,
        priority: None,
        tags: Vec::new(),
    }
}

fn move_after(task_uuid: TaskId, anchor: TaskId) -> MoveTaskRequest {
    MoveTaskRequest {
        task_uuid,
        target_column_id: None,
        after: Some(anchor),
        before: None,
    }
}

fn move_before(task_uuid: TaskId, anchor: TaskId) -> MoveTaskRequest {
    MoveTaskRequest {
        task_uuid,
        target_column_id: None,
        after: None,
        before: Some(anchor),
    }
}

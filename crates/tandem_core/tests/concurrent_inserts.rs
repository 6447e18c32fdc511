use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use rusqlite::Connection;
use tandem_core::db::open_db;
use tandem_core::{
    BoardService, CreateTaskRequest, FanoutRegistry, MoveTaskRequest, SqliteColumnRepository,
    SqliteTaskRepository, Task, TaskId,
};

type Board<'conn> = BoardService<SqliteColumnRepository<'conn>, SqliteTaskRepository<'conn>>;

fn board(conn: &Connection) -> Board<'_> {
    let columns = SqliteColumnRepository::try_new(conn).unwrap();
    let tasks = SqliteTaskRepository::try_new(conn).unwrap();
    BoardService::new(columns, tasks, Arc::new(FanoutRegistry::new()))
}

fn create_in(service: &Board<'_>, column_id: &str, title: &str) -> Task {
    service
        .create_task(&CreateTaskRequest {
            column_id: column_id.to_string(),
            title: title.to_string(),
            description: None,
            priority: None,
            tags: Vec::new(),
        })
        .unwrap()
}

fn seeded_db(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("tandem.db");
    drop(open_db(&path).unwrap());
    path
}

#[test]
fn parallel_creates_from_two_connections_keep_codes_and_positions_unique() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_db(&dir);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = board(&conn);
                barrier.wait();
                for round in 0..5 {
                    create_in(&service, "todo", &format!("Worker {worker} round {round}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let service = board(&conn);
    let tasks = service.list_column("todo").unwrap();
    assert_eq!(tasks.len(), 10);

    for pair in tasks.windows(2) {
        assert!(
            pair[0].position < pair[1].position,
            "positions must stay strictly ordered"
        );
    }

    let codes: BTreeSet<String> = tasks.iter().map(|task| task.code.clone()).collect();
    let expected: BTreeSet<String> = (1..=10).map(|n| format!("TASK-{n:05}")).collect();
    assert_eq!(codes, expected);
}

#[test]
fn parallel_moves_into_the_same_slot_interleave_without_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_db(&dir);

    let (x, y) = {
        let conn = open_db(&path).unwrap();
        let service = board(&conn);
        let x = create_in(&service, "todo", "Left bound");
        let y = create_in(&service, "todo", "Right bound");
        (x, y)
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let anchor = x.uuid;
            thread::spawn(move || -> TaskId {
                let conn = open_db(&path).unwrap();
                let service = board(&conn);
                let task = create_in(&service, "todo", &format!("Squeezer {worker}"));
                barrier.wait();
                service
                    .move_task(&MoveTaskRequest {
                        task_uuid: task.uuid,
                        target_column_id: None,
                        after: Some(anchor),
                        before: None,
                    })
                    .unwrap();
                task.uuid
            })
        })
        .collect();
    let mover_ids: BTreeSet<TaskId> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let conn = open_db(&path).unwrap();
    let service = board(&conn);
    let tasks = service.list_column("todo").unwrap();
    assert_eq!(tasks.len(), 4);
    assert_eq!(tasks[0].uuid, x.uuid);
    assert_eq!(tasks[3].uuid, y.uuid);

    let middle: BTreeSet<TaskId> = tasks[1..3].iter().map(|task| task.uuid).collect();
    assert_eq!(middle, mover_ids);
    for task in &tasks[1..3] {
        assert!(task.position > x.position);
        assert!(task.position < y.position);
    }
    for pair in tasks.windows(2) {
        assert!(pair[0].position < pair[1].position);
    }
}

use std::sync::Arc;

use rusqlite::{params, Connection};
use tandem_core::db::open_db_in_memory;
use tandem_core::{
    BoardService, CreateTaskRequest, FanoutRegistry, MoveTaskRequest, SqliteColumnRepository,
    SqliteTaskRepository, Task, TaskId, TaskRepository, FIRST_POSITION, POSITION_GAP,
};

type Board<'conn> = BoardService<SqliteColumnRepository<'conn>, SqliteTaskRepository<'conn>>;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

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

fn move_request(
    task_uuid: TaskId,
    after: Option<TaskId>,
    before: Option<TaskId>,
) -> MoveTaskRequest {
    MoveTaskRequest {
        task_uuid,
        target_column_id: None,
        after,
        before,
    }
}

fn column_order(service: &Board<'_>, column_id: &str) -> Vec<(TaskId, i64)> {
    service
        .list_column(column_id)
        .unwrap()
        .into_iter()
        .map(|task| (task.uuid, task.position))
        .collect()
}

fn force_position(conn: &Connection, uuid: TaskId, position: i64) {
    conn.execute(
        "UPDATE tasks SET position = ?2 WHERE uuid = ?1;",
        params![uuid.to_string(), position],
    )
    .unwrap();
}

#[test]
fn tail_inserts_step_by_the_position_gap() {
    let conn = setup();
    let service = board(&conn);

    let a = create_in(&service, "todo", "Alpha");
    let b = create_in(&service, "todo", "Beta");
    let c = create_in(&service, "todo", "Gamma");
    assert_eq!(a.position, FIRST_POSITION);
    assert_eq!(b.position, POSITION_GAP);
    assert_eq!(c.position, 2 * POSITION_GAP);

    // Spacing restarts per column.
    let other = create_in(&service, "backlog", "Delta");
    assert_eq!(other.position, FIRST_POSITION);
}

#[test]
fn moving_between_neighbors_takes_the_midpoint() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "todo", "Alpha");
    let b = create_in(&service, "todo", "Beta");
    let c = create_in(&service, "todo", "Gamma");

    let moved = service
        .move_task(&move_request(c.uuid, Some(a.uuid), None))
        .unwrap();
    assert_eq!(moved.position, POSITION_GAP / 2);
    assert_eq!(
        column_order(&service, "todo"),
        vec![
            (a.uuid, FIRST_POSITION),
            (c.uuid, POSITION_GAP / 2),
            (b.uuid, POSITION_GAP)
        ]
    );
}

#[test]
fn moving_before_the_head_extends_downward() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "todo", "Alpha");
    let b = create_in(&service, "todo", "Beta");

    let moved = service
        .move_task(&move_request(b.uuid, None, Some(a.uuid)))
        .unwrap();
    assert_eq!(moved.position, FIRST_POSITION - POSITION_GAP);
    assert_eq!(
        column_order(&service, "todo"),
        vec![(b.uuid, -POSITION_GAP), (a.uuid, FIRST_POSITION)]
    );
}

#[test]
fn no_anchor_move_appends_at_the_tail() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "todo", "Alpha");
    let b = create_in(&service, "todo", "Beta");
    let c = create_in(&service, "todo", "Gamma");

    let moved = service
        .move_task(&move_request(a.uuid, None, None))
        .unwrap();
    assert_eq!(moved.position, 3 * POSITION_GAP);
    assert_eq!(
        column_order(&service, "todo"),
        vec![
            (b.uuid, POSITION_GAP),
            (c.uuid, 2 * POSITION_GAP),
            (a.uuid, 3 * POSITION_GAP)
        ]
    );

    // The task already at the tail stays put.
    let unchanged = service
        .move_task(&move_request(a.uuid, None, None))
        .unwrap();
    assert_eq!(unchanged.position, 3 * POSITION_GAP);
}

#[test]
fn drag_sequence_keeps_neighbors_stable() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "todo", "Write the pitch");
    let b = create_in(&service, "todo", "Review the pitch");

    // Dropping a task back onto its own slot writes nothing.
    let unchanged = service
        .move_task(&move_request(a.uuid, None, Some(b.uuid)))
        .unwrap();
    assert_eq!(unchanged.position, a.position);
    let unchanged = service
        .move_task(&move_request(b.uuid, Some(a.uuid), None))
        .unwrap();
    assert_eq!(unchanged.position, b.position);

    let c = create_in(&service, "todo", "Send the pitch");
    let moved = service
        .move_task(&move_request(c.uuid, Some(a.uuid), Some(b.uuid)))
        .unwrap();
    assert_eq!(moved.position, POSITION_GAP / 2);
    assert_eq!(
        column_order(&service, "todo"),
        vec![
            (a.uuid, FIRST_POSITION),
            (c.uuid, POSITION_GAP / 2),
            (b.uuid, POSITION_GAP)
        ]
    );
}

#[test]
fn moving_the_only_task_in_place_writes_nothing() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "review", "Lonely");

    let tasks = SqliteTaskRepository::try_new(&conn).unwrap();
    let outcome = tasks.move_task(a.uuid, None, None, None).unwrap();
    assert!(!outcome.moved);
    assert_eq!(outcome.task.position, a.position);
    assert_eq!(outcome.source_column_id, "review");
}

#[test]
fn adjacent_positions_trigger_in_transaction_rebalancing() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "todo", "Alpha");
    let b = create_in(&service, "todo", "Beta");
    let c = create_in(&service, "todo", "Gamma");

    // Leave no integer between the first two rows.
    force_position(&conn, b.uuid, 1);

    let moved = service
        .move_task(&move_request(c.uuid, Some(a.uuid), None))
        .unwrap();
    assert_eq!(moved.position, POSITION_GAP / 2);
    assert_eq!(
        column_order(&service, "todo"),
        vec![
            (a.uuid, FIRST_POSITION),
            (c.uuid, POSITION_GAP / 2),
            (b.uuid, POSITION_GAP)
        ]
    );
}

#[test]
fn rebalancing_respaces_rows_in_entry_order() {
    let conn = setup();
    let service = board(&conn);
    let a = create_in(&service, "review", "One");
    let b = create_in(&service, "review", "Two");
    let c = create_in(&service, "review", "Three");
    let d = create_in(&service, "review", "Four");

    // Squeeze the whole column into adjacent slots.
    force_position(&conn, a.uuid, 10);
    force_position(&conn, b.uuid, 11);
    force_position(&conn, c.uuid, 12);
    force_position(&conn, d.uuid, 13);

    let moved = service
        .move_task(&move_request(d.uuid, Some(a.uuid), None))
        .unwrap();
    assert_eq!(moved.position, POSITION_GAP / 2);
    assert_eq!(
        column_order(&service, "review"),
        vec![
            (a.uuid, 0),
            (d.uuid, POSITION_GAP / 2),
            (b.uuid, POSITION_GAP),
            (c.uuid, 2 * POSITION_GAP)
        ]
    );
}

#[test]
fn repeated_front_inserts_survive_gap_exhaustion() {
    let conn = setup();
    let service = board(&conn);
    let first = create_in(&service, "todo", "Anchor");
    let last = create_in(&service, "todo", "Tail");

    // Midpoints halve the gap each round, so this crosses at least one
    // forced rebalance around round twenty.
    for round in 0..25 {
        let task = create_in(&service, "todo", &format!("Insert {round}"));
        let moved = service
            .move_task(&move_request(task.uuid, Some(first.uuid), None))
            .unwrap();

        let ordered = column_order(&service, "todo");
        assert_eq!(ordered[0].0, first.uuid);
        assert_eq!(ordered[1], (task.uuid, moved.position));
    }

    let ordered = column_order(&service, "todo");
    assert_eq!(ordered.len(), 27);
    assert_eq!(ordered[0].0, first.uuid);
    assert_eq!(ordered[ordered.len() - 1].0, last.uuid);
    for pair in ordered.windows(2) {
        assert!(pair[0].1 < pair[1].1, "positions must stay strictly ordered");
    }
}

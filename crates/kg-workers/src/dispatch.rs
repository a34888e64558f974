use kg_automations::TaskType;

/// Spawns a child task and sends its first message, directly within an
/// already-open transaction. Used by executors that fan out to more than
/// one child per poll (the bus's own `Action::Spawn` models exactly one
/// child, so additional children are created the same way the dequeue
/// loop itself would, just inside the caller's own `Outcome::apply`).
/// Spawns a parentless task: used when one executor's output fans into
/// another stage that isn't logically a child of any single calling task
/// (e.g. Directory-Resolution is triggered by whichever file completes its
/// directory last, not "owned" by that one file's analysis task).
pub async fn spawn_root<M: serde::Serialize>(
    txn: &mut sqlx::PgConnection,
    child_id: kg_ids::Id,
    task_type: TaskType,
    msg: &M,
) -> anyhow::Result<()> {
    sqlx::query!(
        "SELECT internal.create_task($1, $2, NULL)",
        child_id as kg_ids::Id,
        task_type as TaskType,
    )
    .execute(&mut *txn)
    .await?;

    let body = serde_json::to_value(msg)?;
    sqlx::query!(
        "SELECT internal.send_to_task($1, $2, $3::JSON);",
        child_id as kg_ids::Id,
        child_id as kg_ids::Id,
        body,
    )
    .execute(&mut *txn)
    .await?;

    Ok(())
}

/// Sends an additional message to an already-created task, as the `scan`
/// CLI subcommand does to feed a run's File-Discovery-Batcher task one
/// event per new or modified path after its initial spawn.
pub async fn send<M: serde::Serialize>(
    conn: &mut sqlx::PgConnection,
    task_id: kg_ids::Id,
    msg: &M,
) -> anyhow::Result<()> {
    let body = serde_json::to_value(msg)?;
    sqlx::query!(
        "SELECT internal.send_to_task($1, $2, $3::JSON);",
        task_id as kg_ids::Id,
        task_id as kg_ids::Id,
        body,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn spawn_child<M: serde::Serialize>(
    txn: &mut sqlx::PgConnection,
    child_id: kg_ids::Id,
    task_type: TaskType,
    parent_id: kg_ids::Id,
    msg: &M,
) -> anyhow::Result<()> {
    sqlx::query!(
        "SELECT internal.create_task($1, $2, $3)",
        child_id as kg_ids::Id,
        task_type as TaskType,
        parent_id as kg_ids::Id,
    )
    .execute(&mut *txn)
    .await?;

    let body = serde_json::to_value(msg)?;
    sqlx::query!(
        "SELECT internal.send_to_task($1, $2, $3::JSON);",
        child_id as kg_ids::Id,
        parent_id as kg_ids::Id,
        body,
    )
    .execute(&mut *txn)
    .await?;

    Ok(())
}

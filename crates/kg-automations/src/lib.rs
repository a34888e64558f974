use anyhow::Context;

mod executors;
mod server;
pub mod task_types;

/// Server holds the set of registered Executors, ordered by TaskType for
/// binary search on dequeue. Built with [`Server::new`] and [`Server::register`].
pub struct Server(Vec<std::sync::Arc<dyn executors::ObjSafe>>);

/// BoxedRaw is a type-erased, already-serialized JSON message.
pub type BoxedRaw = Box<serde_json::value::RawValue>;

/// TaskType is the type of a task, and maps it to a registered Executor.
#[derive(
    Debug,
    serde::Deserialize,
    serde::Serialize,
    sqlx::Type,
    PartialOrd,
    PartialEq,
    Ord,
    Eq,
    Clone,
    Copy,
)]
#[sqlx(transparent)]
pub struct TaskType(pub i16);

/// Action is the effect a task poll resolves to, once any domain-specific
/// persistence in [`Outcome::apply`] has committed within the same
/// transaction. The dequeue loop applies exactly one Action per poll.
#[derive(Debug)]
pub enum Action {
    /// Spawn a new task of the given type as a child of the current task,
    /// and send it a first message. The spawned task id must not exist.
    Spawn(kg_ids::Id, TaskType, BoxedRaw),
    /// Send a message (Some) or an EOF (None) to another, existing task.
    Send(kg_ids::Id, Option<BoxedRaw>),
    /// Send a message to this task's parent. Illegal for a task without one.
    Yield(BoxedRaw),
    /// Sleep for at most the given duration, then poll again. The task may
    /// be woken earlier if a message arrives in its inbox.
    Sleep(std::time::Duration),
    /// Suspend until a message arrives in the inbox.
    Suspend,
    /// Complete and remove the task. If it has a parent, the parent
    /// receives an EOF.
    Done,
}

impl Action {
    pub fn spawn<M: serde::Serialize>(
        spawn_id: kg_ids::Id,
        task_type: TaskType,
        msg: M,
    ) -> anyhow::Result<Self> {
        Ok(Self::Spawn(
            spawn_id,
            task_type,
            serde_json::value::to_raw_value(&msg).context("failed to encode task spawn message")?,
        ))
    }

    pub fn send<M: serde::Serialize>(task_id: kg_ids::Id, msg: Option<M>) -> anyhow::Result<Self> {
        Ok(Self::Send(
            task_id,
            match msg {
                Some(msg) => Some(
                    serde_json::value::to_raw_value(&msg)
                        .context("failed to encode sent message")?,
                ),
                None => None,
            },
        ))
    }

    pub fn yield_<M: serde::Serialize>(msg: M) -> anyhow::Result<Self> {
        Ok(Self::Yield(
            serde_json::value::to_raw_value(&msg).context("failed to encode yielded message")?,
        ))
    }
}

/// Outcome is the type returned by [`Executor::poll`]. Its [`Outcome::apply`]
/// runs inside a single state-store transaction and is where an executor
/// performs its domain-specific writes -- upserting POIs, appending outbox
/// rows, updating resolved relationships -- before resolving to the
/// [`Action`] the job bus should take. No Executor holds this transaction
/// open across an LLM call, a bus call, or a graph-store call: those all
/// happen earlier, during `poll`, before an Outcome is even constructed.
pub trait Outcome: Send + 'static {
    fn apply<'s>(
        self,
        txn: &'s mut sqlx::PgConnection,
    ) -> impl std::future::Future<Output = anyhow::Result<Action>> + Send + 's;
}

/// An Executor whose Outcome *is* its Action needs no extra persistence.
impl Outcome for Action {
    async fn apply(self, _txn: &mut sqlx::PgConnection) -> anyhow::Result<Action> {
        Ok(self)
    }
}

/// Executor is the core trait implemented by handlers of a single task type.
pub trait Executor: Send + Sync + 'static {
    const TASK_TYPE: TaskType;

    type Receive: serde::de::DeserializeOwned + serde::Serialize + Send;
    type State: Default + serde::de::DeserializeOwned + serde::Serialize + Send;
    type Outcome: Outcome;

    fn poll<'s>(
        &'s self,
        pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        parent_id: Option<kg_ids::Id>,
        state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> impl std::future::Future<Output = anyhow::Result<Self::Outcome>> + Send + 's;
}

/// Mint a new, process-unique task id. Each process picks a random shard so
/// that concurrently-running workers never collide without coordinating
/// shard assignment out of band.
pub fn next_task_id() -> kg_ids::Id {
    static ID_GENERATOR: std::sync::LazyLock<std::sync::Mutex<kg_ids::IdGenerator>> =
        std::sync::LazyLock::new(|| {
            use rand::Rng;
            let shard = rand::thread_rng().gen_range(1u16..1024u16);
            std::sync::Mutex::new(kg_ids::IdGenerator::new(shard))
        });

    ID_GENERATOR.lock().unwrap().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_task_id_never_repeats() {
        let a = next_task_id();
        let b = next_task_id();
        assert_ne!(a, b);
    }

    #[test]
    fn action_spawn_encodes_the_message_as_raw_json() {
        let spawn_id = next_task_id();
        let action = Action::spawn(spawn_id, task_types::FILE_ANALYSIS, serde_json::json!({"file_path": "a.rs"})).unwrap();
        let Action::Spawn(id, task_type, raw) = action else {
            panic!("expected Action::Spawn");
        };
        assert_eq!(id, spawn_id);
        assert_eq!(task_type, task_types::FILE_ANALYSIS);
        assert_eq!(raw.get(), r#"{"file_path":"a.rs"}"#);
    }

    #[test]
    fn action_send_with_none_carries_no_payload() {
        let task_id = next_task_id();
        let action = Action::send::<()>(task_id, None).unwrap();
        let Action::Send(id, msg) = action else {
            panic!("expected Action::Send");
        };
        assert_eq!(id, task_id);
        assert!(msg.is_none());
    }
}

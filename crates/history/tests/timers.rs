//! Timer tasks committed through a shard into the memory store.

use std::sync::Arc;

use cadenza_core::{SequenceId, Task, TaskKind, TimeoutType, TimerTaskInfo, WorkflowExecution};
use cadenza_history::{
    ActivityScheduleAttributes, HistoryConfig, MutableState, ShardContext, TimerBuilder,
};
use cadenza_ports::ExecutionStore;
use cadenza_store_memory::MemoryStore;
use pretty_assertions::assert_eq;

struct Harness {
    shard: Arc<ShardContext>,
    execution: WorkflowExecution,
}

impl Harness {
    async fn new(workflow_id: &str) -> Self {
        let store = MemoryStore::new();
        let shard = ShardContext::acquire(
            Arc::new(store.clone()),
            Arc::new(store.execution_store(1)),
            "host-a",
            HistoryConfig::default(),
        )
        .await
        .unwrap();
        let execution = WorkflowExecution::new_run(workflow_id);
        shard
            .create_workflow_execution(
                execution.clone(),
                "queue",
                Vec::new(),
                None,
                3,
                0,
                2,
                Vec::new(),
            )
            .await
            .unwrap();
        Self { shard, execution }
    }

    fn builder(&self) -> TimerBuilder {
        TimerBuilder::new(
            Arc::new(self.shard.sequence_generator()),
            self.shard.config().clone(),
        )
    }

    async fn load(&self) -> MutableState {
        let store = self.shard.execution_store();
        let info = store.get_workflow_execution_info(&self.execution).await.unwrap();
        let state = store.get_workflow_mutable_state(&self.execution).await.unwrap();
        MutableState::from_persisted(info, state)
    }

    /// Commit `ms` as the next event, conditioned on the event it was read at.
    async fn commit(&self, mut ms: MutableState, timer_tasks: Vec<Task>, delete: Option<i64>) {
        let condition = ms.execution_info().next_event_id;
        ms.execution_info_mut().next_event_id += 1;
        let request = ms
            .into_update_request(condition, Vec::new(), timer_tasks, delete)
            .unwrap();
        self.shard.update_workflow_execution(request).await.unwrap();
    }

    async fn timer_stream(&self) -> Vec<TimerTaskInfo> {
        self.shard
            .execution_store()
            .get_timer_index_tasks(SequenceId::MIN, SequenceId::MAX)
            .await
            .unwrap()
    }

    /// Start one user timer per `(timer_id, fire_after_secs)`, one update each.
    async fn start_timers(&self, timers: &[(&str, i64)]) {
        for (started_id, (timer_id, secs)) in (10..).zip(timers) {
            let mut ms = self.load().await;
            let task = self
                .builder()
                .add_user_timer(timer_id, *secs, started_id, &mut ms)
                .unwrap();
            self.commit(ms, task.into_iter().collect(), None).await;
        }
    }
}

#[tokio::test]
async fn only_the_earliest_user_timer_is_persisted() {
    let orders: [&[(&str, i64)]; 3] = [
        &[("a", 10), ("b", 20), ("c", 30), ("d", 40)],
        &[("d", 40), ("c", 30), ("b", 20), ("a", 10)],
        &[("c", 30), ("a", 10), ("d", 40), ("b", 20)],
    ];

    for timers in orders {
        let h = Harness::new("earliest-only").await;
        h.start_timers(timers).await;

        let stream = h.timer_stream().await;
        assert_eq!(stream.len(), 1, "order {timers:?}");
        assert_eq!(stream[0].kind, TaskKind::UserTimer);

        let ms = h.load().await;
        let armed: Vec<&str> = ms
            .pending_timers()
            .values()
            .filter(|ti| ti.has_task())
            .map(|ti| ti.timer_id.as_str())
            .collect();
        assert_eq!(armed, vec!["a"], "order {timers:?}");
        assert_eq!(ms.pending_timers().len(), 4);

        let a = ms.is_timer_running("a").unwrap();
        assert_eq!(stream[0].task_id.raw(), a.task_id);
        assert_eq!(stream[0].event_id, a.started_id);
    }
}

#[tokio::test]
async fn timers_added_in_one_pass_persist_one_task() {
    let orders: [&[(&str, i64)]; 2] = [
        &[("d", 40), ("c", 30), ("b", 20)],
        &[("later", 100), ("soon", 10)],
    ];

    for timers in orders {
        let h = Harness::new("one-pass").await;
        let mut ms = h.load().await;
        let mut builder = h.builder();
        let mut returned = Vec::new();
        for (started_id, (timer_id, secs)) in (10..).zip(timers) {
            returned.extend(
                builder
                    .add_user_timer(timer_id, *secs, started_id, &mut ms)
                    .unwrap(),
            );
        }
        assert_eq!(returned.len(), timers.len(), "order {timers:?}");
        h.commit(ms, returned, None).await;

        let stream = h.timer_stream().await;
        assert_eq!(stream.len(), 1, "order {timers:?}");
        let (earliest, _) = timers[timers.len() - 1];
        let ms = h.load().await;
        assert_eq!(
            stream[0].task_id.raw(),
            ms.is_timer_running(earliest).unwrap().task_id
        );
        assert_eq!(
            ms.pending_timers().values().filter(|ti| ti.has_task()).count(),
            1
        );
    }
}

#[tokio::test]
async fn firing_a_timer_arms_the_next_one() {
    let h = Harness::new("fire-and-refresh").await;
    h.start_timers(&[("first", 5), ("second", 50), ("third", 500)])
        .await;

    let fired = h.timer_stream().await.remove(0);
    let mut ms = h.load().await;
    let mut builder = h.builder();
    builder.load_user_timers(&ms);
    let earliest = builder.all_timers()[0].clone();
    assert_eq!(builder.user_timer(earliest.sequence_id).unwrap().timer_id, "first");
    let far_future = earliest.sequence_id.expiry() + 3_600_000_000_000;
    assert!(builder.is_timer_expired(&earliest, far_future));

    ms.delete_pending_timer("first").unwrap();
    let next = builder.refresh_user_timer_task(&mut ms).unwrap().unwrap();
    h.commit(ms, vec![next.clone()], Some(fired.task_id.raw())).await;

    let stream = h.timer_stream().await;
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].task_id.raw(), next.task_id());

    let ms = h.load().await;
    assert!(ms.is_timer_running("first").is_none());
    assert_eq!(ms.is_timer_running("second").unwrap().task_id, next.task_id());
    assert!(!ms.is_timer_running("third").unwrap().has_task());
}

#[tokio::test]
async fn activity_and_decision_timeouts_share_the_stream() {
    let h = Harness::new("timeouts").await;
    let builder = h.builder();
    let mut ms = h.load().await;

    let decision = builder.add_decision_timeout_task(2, 5).unwrap();
    let schedule_to_start = builder
        .add_schedule_to_start_activity_timeout(
            4,
            &ActivityScheduleAttributes {
                activity_id: "charge-card".into(),
                schedule_to_close_timeout_secs: 60,
                heartbeat_timeout_secs: 15,
                ..ActivityScheduleAttributes::default()
            },
            &mut ms,
        )
        .unwrap()
        .unwrap();
    let schedule_to_close = builder
        .add_schedule_to_close_activity_timeout(4, &ms)
        .unwrap()
        .unwrap();
    h.commit(
        ms,
        vec![decision, schedule_to_start, schedule_to_close],
        None,
    )
    .await;

    let stream = h.timer_stream().await;
    let kinds: Vec<(TaskKind, Option<TimeoutType>)> =
        stream.iter().map(|t| (t.kind, t.timeout_type)).collect();
    assert_eq!(
        kinds,
        vec![
            (TaskKind::DecisionTimeout, None),
            (TaskKind::ActivityTimeout, Some(TimeoutType::ScheduleToStart)),
            (TaskKind::ActivityTimeout, Some(TimeoutType::ScheduleToClose)),
        ]
    );

    let ms = h.load().await;
    let activity = ms.is_activity_running(4).unwrap();
    assert_eq!(activity.activity_id, "charge-card");
    assert_eq!(activity.schedule_to_close_timeout, 60);
    assert_eq!(activity.heartbeat_timeout, 15);
}

#[tokio::test]
async fn sequence_keys_are_unique_across_builders() {
    let h = Harness::new("unique-keys").await;
    let keys: Vec<i64> = (0..50)
        .map(|i| h.builder().add_decision_timeout_task(i, 1).unwrap().task_id())
        .collect();

    let mut sorted = keys.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), keys.len());
}

//! Timer task construction.
//!
//! [`TimerBuilder`] turns timeouts and user timers into persisted timer
//! tasks keyed by [`SequenceId`]. Decision and activity timeouts become a
//! task each. User timers are different: all pending ones live in the
//! execution's mutable state, but only the earliest is backed by a
//! persisted task at any time. When it fires (or is cancelled) the caller
//! deletes it and calls [`TimerBuilder::refresh_user_timer_task`] to arm
//! the next one.

use std::collections::HashMap;
use std::sync::Arc;

use cadenza_core::{
    ActivityInfo, EMPTY_TIMER_TASK_ID, SequenceId, Task, TimeoutType, TimerInfo,
};
use cadenza_ports::PortsError;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::config::HistoryConfig;
use crate::index::{PendingTimerIndex, TimerCandidate};
use crate::mutable_state::MutableState;
use crate::seq::{LocalSeqNumGenerator, SequenceNumberGenerator};

/// Timeouts requested when an activity is scheduled, in seconds.
///
/// Non-positive schedule-to-start, schedule-to-close and start-to-close
/// values fall back to [`HistoryConfig`] defaults. A non-positive heartbeat
/// timeout means no heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityScheduleAttributes {
    /// Caller-assigned activity id.
    pub activity_id: String,
    /// Schedule-to-start timeout.
    pub schedule_to_start_timeout_secs: i32,
    /// Schedule-to-close timeout.
    pub schedule_to_close_timeout_secs: i32,
    /// Start-to-close timeout.
    pub start_to_close_timeout_secs: i32,
    /// Heartbeat timeout.
    pub heartbeat_timeout_secs: i32,
}

/// Builds timer tasks for one mutation of one execution.
pub struct TimerBuilder {
    timers: PendingTimerIndex,
    pending_user_timers: HashMap<SequenceId, TimerInfo>,
    seq_num_gen: Arc<dyn SequenceNumberGenerator>,
    local_seq_num_gen: LocalSeqNumGenerator,
    config: HistoryConfig,
}

impl std::fmt::Debug for TimerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerBuilder")
            .field("timers", &self.timers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TimerBuilder {
    /// Builder drawing persisted keys from `seq_num_gen`.
    pub fn new(seq_num_gen: Arc<dyn SequenceNumberGenerator>, config: HistoryConfig) -> Self {
        Self {
            timers: PendingTimerIndex::new(),
            pending_user_timers: HashMap::new(),
            seq_num_gen,
            local_seq_num_gen: LocalSeqNumGenerator::new(),
            config,
        }
    }

    /// Start-to-close timeout for a scheduled decision.
    pub fn add_decision_timeout_task(
        &self,
        schedule_id: i64,
        start_to_close_timeout_secs: i32,
    ) -> Result<Task, PortsError> {
        let key = self.durable_key(expiry_after(i64::from(start_to_close_timeout_secs))?)?;
        debug!(schedule_id, %key, "Adding decision timeout");
        Ok(Task::DecisionTimeout {
            task_id: key.raw(),
            event_id: schedule_id,
        })
    }

    /// Activity timeout firing after `fire_after_secs`, or `None` if the
    /// timeout is disabled (non-positive).
    pub fn add_activity_timeout_task(
        &self,
        schedule_id: i64,
        timeout_type: TimeoutType,
        fire_after_secs: i32,
    ) -> Result<Option<Task>, PortsError> {
        if fire_after_secs <= 0 {
            return Ok(None);
        }
        let key = self.durable_key(expiry_after(i64::from(fire_after_secs))?)?;
        debug!(schedule_id, %timeout_type, %key, "Adding activity timeout");
        Ok(Some(Task::ActivityTimeout {
            task_id: key.raw(),
            timeout_type,
            event_id: schedule_id,
        }))
    }

    /// Record a newly scheduled activity in `ms` and return its
    /// schedule-to-start timeout.
    pub fn add_schedule_to_start_activity_timeout(
        &self,
        schedule_id: i64,
        attributes: &ActivityScheduleAttributes,
        ms: &mut MutableState,
    ) -> Result<Option<Task>, PortsError> {
        let or_default = |value: i32, default: i32| if value <= 0 { default } else { value };

        let info = ActivityInfo {
            schedule_to_start_timeout: or_default(
                attributes.schedule_to_start_timeout_secs,
                self.config.default_schedule_to_start_timeout_secs,
            ),
            schedule_to_close_timeout: or_default(
                attributes.schedule_to_close_timeout_secs,
                self.config.default_schedule_to_close_timeout_secs,
            ),
            start_to_close_timeout: or_default(
                attributes.start_to_close_timeout_secs,
                self.config.default_start_to_close_timeout_secs,
            ),
            heartbeat_timeout: attributes.heartbeat_timeout_secs,
            ..ActivityInfo::scheduled(schedule_id, attributes.activity_id.clone())
        };

        let task = self.add_activity_timeout_task(
            schedule_id,
            TimeoutType::ScheduleToStart,
            info.schedule_to_start_timeout,
        )?;
        ms.update_pending_activity(info);
        Ok(task)
    }

    /// Schedule-to-close timeout of a pending activity.
    pub fn add_schedule_to_close_activity_timeout(
        &self,
        schedule_id: i64,
        ms: &MutableState,
    ) -> Result<Option<Task>, PortsError> {
        let info = pending_activity(ms, schedule_id)?;
        self.add_activity_timeout_task(
            schedule_id,
            TimeoutType::ScheduleToClose,
            info.schedule_to_close_timeout,
        )
    }

    /// Start-to-close timeout of a pending activity.
    pub fn add_start_to_close_activity_timeout(
        &self,
        schedule_id: i64,
        ms: &MutableState,
    ) -> Result<Option<Task>, PortsError> {
        let info = pending_activity(ms, schedule_id)?;
        self.add_activity_timeout_task(
            schedule_id,
            TimeoutType::StartToClose,
            info.start_to_close_timeout,
        )
    }

    /// Heartbeat timeout of a pending activity, or `None` without heartbeats.
    pub fn add_heartbeat_activity_timeout(
        &self,
        schedule_id: i64,
        ms: &MutableState,
    ) -> Result<Option<Task>, PortsError> {
        let info = pending_activity(ms, schedule_id)?;
        self.add_activity_timeout_task(schedule_id, TimeoutType::Heartbeat, info.heartbeat_timeout)
    }

    /// Start a user timer and arm the earliest pending timer if needed.
    ///
    /// Returns the timer task to persist, which backs the new timer only if
    /// it is now the earliest one. On error `ms` is left as it was.
    pub fn add_user_timer(
        &mut self,
        timer_id: &str,
        fire_after_secs: i64,
        started_id: i64,
        ms: &mut MutableState,
    ) -> Result<Option<Task>, PortsError> {
        if fire_after_secs < 0 {
            return Err(PortsError::invalid_argument(format!(
                "timer {timer_id}: fire_after must not be negative, got {fire_after_secs}"
            )));
        }
        if ms.is_timer_running(timer_id).is_some() {
            return Err(PortsError::duplicate_timer(timer_id));
        }

        let expiry = expiry_after(fire_after_secs)?;
        debug!(timer_id, started_id, %expiry, "Adding user timer");
        ms.update_pending_timer(TimerInfo::new(timer_id, expiry, started_id));

        self.refresh_user_timer_task(ms).inspect_err(|_| {
            ms.forget_pending_timer(timer_id);
        })
    }

    /// Rebuild the index from `ms` and materialize a task for the earliest
    /// pending timer if it has none.
    ///
    /// A task held by any other timer is retired through `ms`: a stored
    /// one is deleted by the update, one minted earlier in this pass is
    /// left out of it. Either way the persisted stream only ever carries
    /// the earliest user timer.
    pub fn refresh_user_timer_task(
        &mut self,
        ms: &mut MutableState,
    ) -> Result<Option<Task>, PortsError> {
        self.load_user_timers(ms);

        let Some(earliest) = self.timers.peek_earliest() else {
            return Ok(None);
        };
        if earliest.task_created {
            return Ok(None);
        }
        let local_key = earliest.sequence_id;
        let Some(task) = self.create_new_task(earliest)? else {
            return Ok(None);
        };

        let Some(mut armed) = self.pending_user_timers.get(&local_key).cloned() else {
            return Err(PortsError::Internal(format!(
                "no pending timer for candidate {local_key}"
            )));
        };

        let superseded: Vec<TimerInfo> = ms
            .pending_timers()
            .values()
            .filter(|ti| ti.has_task() && ti.timer_id != armed.timer_id)
            .cloned()
            .collect();
        for mut ti in superseded {
            debug!(timer_id = %ti.timer_id, task_id = ti.task_id, "Retiring superseded timer task");
            ms.retire_timer_task(ti.task_id)?;
            ti.task_id = EMPTY_TIMER_TASK_ID;
            ms.update_pending_timer(ti);
        }

        armed.task_id = task.task_id();
        ms.record_minted_timer_task(armed.task_id);
        debug!(timer_id = %armed.timer_id, task_id = armed.task_id, "Armed user timer");
        ms.update_pending_timer(armed.clone());
        self.pending_user_timers.insert(local_key, armed);
        if let Some(candidate) = self.timers.earliest_mut() {
            candidate.task_created = true;
        }

        Ok(Some(task))
    }

    /// Replace the index with the pending user timers of `ms`.
    ///
    /// Candidates get process-local tie-breaks, so timers sharing an expiry
    /// bucket are ordered by timer id.
    pub fn load_user_timers(&mut self, ms: &MutableState) {
        self.timers.clear();
        self.pending_user_timers.clear();

        for ti in ms.pending_timers().values() {
            let key = SequenceId::from_time(ti.expiry_time, self.local_seq_num_gen.advance());
            self.timers.insert(TimerCandidate {
                sequence_id: key,
                task: Task::UserTimer {
                    task_id: EMPTY_TIMER_TASK_ID,
                    event_id: ti.started_id,
                },
                task_created: ti.has_task(),
            });
            self.pending_user_timers.insert(key, ti.clone());
        }
    }

    /// Pending timer behind an index key.
    #[must_use]
    pub fn user_timer(&self, key: SequenceId) -> Option<&TimerInfo> {
        self.pending_user_timers.get(&key)
    }

    /// Every loaded candidate, earliest first.
    #[must_use]
    pub fn all_timers(&self) -> &[TimerCandidate] {
        self.timers.all()
    }

    /// Returns `true` if the candidate's expiry bucket is at or before
    /// `reference_nanos`.
    #[must_use]
    pub fn is_timer_expired(&self, candidate: &TimerCandidate, reference_nanos: i64) -> bool {
        candidate.sequence_id.expiry() <= reference_nanos
    }

    fn create_new_task(&self, candidate: &TimerCandidate) -> Result<Option<Task>, PortsError> {
        match candidate.task {
            Task::UserTimer { event_id, .. } => {
                let key = SequenceId::construct(
                    candidate.sequence_id.expiry(),
                    self.seq_num_gen.next_seq()?,
                );
                Ok(Some(Task::UserTimer {
                    task_id: key.raw(),
                    event_id,
                }))
            }
            _ => Ok(None),
        }
    }

    fn durable_key(&self, expiry: DateTime<Utc>) -> Result<SequenceId, PortsError> {
        Ok(SequenceId::from_time(expiry, self.seq_num_gen.next_seq()?))
    }
}

fn pending_activity(ms: &MutableState, schedule_id: i64) -> Result<&ActivityInfo, PortsError> {
    ms.is_activity_running(schedule_id)
        .ok_or_else(|| PortsError::not_found("ActivityInfo", schedule_id.to_string()))
}

fn expiry_after(secs: i64) -> Result<DateTime<Utc>, PortsError> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| PortsError::invalid_argument(format!("timeout of {secs}s is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{WorkflowExecutionInfo, WorkflowState};
    use pretty_assertions::assert_eq;

    fn builder() -> TimerBuilder {
        TimerBuilder::new(Arc::new(LocalSeqNumGenerator::new()), HistoryConfig::default())
    }

    fn state() -> MutableState {
        MutableState::new(WorkflowExecutionInfo {
            workflow_id: "wf".into(),
            run_id: "run".into(),
            task_list: "q".into(),
            history: Vec::new(),
            execution_context: None,
            state: WorkflowState::Running,
            next_event_id: 3,
            last_processed_event: 0,
            decision_pending: false,
            last_updated_timestamp: Utc::now(),
        })
    }

    struct Exhausted;

    impl SequenceNumberGenerator for Exhausted {
        fn next_seq(&self) -> Result<i64, PortsError> {
            Err(PortsError::SequenceExhausted {
                shard_id: 1,
                range_id: 1,
            })
        }
    }

    #[test]
    fn decision_timeout_is_keyed_in_the_future() {
        let before = Utc::now().timestamp_nanos_opt().unwrap();
        let task = builder().add_decision_timeout_task(4, 30).unwrap();

        let Task::DecisionTimeout { task_id, event_id } = task else {
            panic!("unexpected task {task:?}");
        };
        assert_eq!(event_id, 4);
        let key = SequenceId::from_raw(task_id);
        assert_eq!(key.seq(), 1);
        assert!(key.expiry() >= before + 29_000_000_000);
    }

    #[test]
    fn disabled_activity_timeout_yields_nothing() {
        let tb = builder();
        assert!(tb.add_activity_timeout_task(1, TimeoutType::Heartbeat, 0).unwrap().is_none());
        assert!(tb.add_activity_timeout_task(1, TimeoutType::Heartbeat, -5).unwrap().is_none());
    }

    #[test]
    fn schedule_to_start_applies_defaults() {
        let tb = builder();
        let mut ms = state();
        let attributes = ActivityScheduleAttributes {
            activity_id: "act".into(),
            start_to_close_timeout_secs: 42,
            ..ActivityScheduleAttributes::default()
        };

        let task = tb
            .add_schedule_to_start_activity_timeout(7, &attributes, &mut ms)
            .unwrap()
            .unwrap();
        assert!(matches!(
            task,
            Task::ActivityTimeout {
                timeout_type: TimeoutType::ScheduleToStart,
                event_id: 7,
                ..
            }
        ));

        let info = ms.is_activity_running(7).unwrap();
        assert_eq!(info.activity_id, "act");
        assert_eq!(info.schedule_to_start_timeout, 10);
        assert_eq!(info.schedule_to_close_timeout, 10);
        assert_eq!(info.start_to_close_timeout, 42);
        assert_eq!(info.heartbeat_timeout, 0);
        assert!(!info.is_started());
    }

    #[test]
    fn stored_activity_timeouts_are_used() {
        let tb = builder();
        let mut ms = state();
        tb.add_schedule_to_start_activity_timeout(
            2,
            &ActivityScheduleAttributes {
                activity_id: "a".into(),
                heartbeat_timeout_secs: 3,
                ..ActivityScheduleAttributes::default()
            },
            &mut ms,
        )
        .unwrap();

        let heartbeat = tb.add_heartbeat_activity_timeout(2, &ms).unwrap().unwrap();
        assert!(matches!(
            heartbeat,
            Task::ActivityTimeout {
                timeout_type: TimeoutType::Heartbeat,
                ..
            }
        ));
        assert!(tb.add_schedule_to_close_activity_timeout(2, &ms).unwrap().is_some());
        assert!(tb.add_start_to_close_activity_timeout(2, &ms).unwrap().is_some());
    }

    #[test]
    fn timeouts_for_unknown_activity_are_not_found() {
        let tb = builder();
        let ms = state();
        assert!(tb.add_schedule_to_close_activity_timeout(9, &ms).unwrap_err().is_not_found());
        assert!(tb.add_start_to_close_activity_timeout(9, &ms).unwrap_err().is_not_found());
        assert!(tb.add_heartbeat_activity_timeout(9, &ms).unwrap_err().is_not_found());
    }

    #[test]
    fn first_user_timer_is_armed() {
        let mut tb = builder();
        let mut ms = state();

        let task = tb.add_user_timer("t1", 60, 5, &mut ms).unwrap().unwrap();
        assert!(matches!(task, Task::UserTimer { event_id: 5, .. }));

        let ti = ms.is_timer_running("t1").unwrap();
        assert_eq!(ti.task_id, task.task_id());
        assert_eq!(tb.all_timers().len(), 1);
        assert!(tb.all_timers()[0].task_created);
    }

    #[test]
    fn later_timer_is_not_armed() {
        let mut tb = builder();
        let mut ms = state();
        tb.add_user_timer("soon", 10, 5, &mut ms).unwrap().unwrap();

        assert!(tb.add_user_timer("later", 100, 6, &mut ms).unwrap().is_none());
        assert!(!ms.is_timer_running("later").unwrap().has_task());
        assert_eq!(tb.all_timers().len(), 2);
        let earliest = &tb.all_timers()[0];
        assert_eq!(tb.user_timer(earliest.sequence_id).unwrap().timer_id, "soon");
    }

    #[test]
    fn earlier_timer_takes_over_the_task() {
        let mut tb = builder();
        let mut ms = state();
        let first = tb.add_user_timer("later", 100, 5, &mut ms).unwrap().unwrap();

        let second = tb.add_user_timer("soon", 10, 6, &mut ms).unwrap().unwrap();
        assert_ne!(first.task_id(), second.task_id());
        assert!(!ms.is_timer_running("later").unwrap().has_task());
        assert_eq!(ms.is_timer_running("soon").unwrap().task_id, second.task_id());

        let req = ms
            .into_update_request(3, Vec::new(), vec![first, second.clone()], None)
            .unwrap();
        assert_eq!(req.timer_tasks, vec![second]);
        assert_eq!(req.delete_timer_task, None);
    }

    #[test]
    fn decreasing_timers_in_one_pass_keep_one_task() {
        let mut tb = builder();
        let mut ms = state();
        let mut returned = Vec::new();
        for (started_id, (timer_id, secs)) in (5..).zip([("d", 40), ("c", 30), ("b", 20), ("a", 10)]) {
            returned.extend(tb.add_user_timer(timer_id, secs, started_id, &mut ms).unwrap());
        }
        assert_eq!(returned.len(), 4);

        let armed = ms.is_timer_running("a").unwrap().task_id;
        let req = ms.into_update_request(3, Vec::new(), returned, None).unwrap();
        let kept: Vec<i64> = req.timer_tasks.iter().map(Task::task_id).collect();
        assert_eq!(kept, vec![armed]);
        assert_eq!(req.delete_timer_task, None);
        let with_task: Vec<&str> = req
            .upsert_timer_infos
            .iter()
            .filter(|ti| ti.has_task())
            .map(|ti| ti.timer_id.as_str())
            .collect();
        assert_eq!(with_task, vec!["a"]);
    }

    #[test]
    fn stored_task_is_deleted_when_superseded() {
        let mut persisted = cadenza_core::WorkflowMutableState::default();
        persisted.timer_infos.insert(
            "stored".into(),
            TimerInfo {
                task_id: 99,
                ..TimerInfo::new("stored", Utc::now() + TimeDelta::seconds(300), 4)
            },
        );
        let mut ms = MutableState::from_persisted(state().execution_info().clone(), persisted);
        let mut tb = builder();

        let c = tb.add_user_timer("c", 30, 5, &mut ms).unwrap().unwrap();
        let b = tb.add_user_timer("b", 20, 6, &mut ms).unwrap().unwrap();

        let req = ms.into_update_request(3, Vec::new(), vec![c, b.clone()], None).unwrap();
        assert_eq!(req.timer_tasks, vec![b]);
        assert_eq!(req.delete_timer_task, Some(99));
    }

    #[test]
    fn user_timer_validation() {
        let mut tb = builder();
        let mut ms = state();
        assert!(matches!(
            tb.add_user_timer("t", -1, 5, &mut ms),
            Err(PortsError::InvalidArgument(_))
        ));
        tb.add_user_timer("t", 1, 5, &mut ms).unwrap();
        assert!(matches!(
            tb.add_user_timer("t", 1, 6, &mut ms),
            Err(PortsError::DuplicateTimer { .. })
        ));
    }

    #[test]
    fn failed_materialization_leaves_state_untouched() {
        let mut tb = TimerBuilder::new(Arc::new(Exhausted), HistoryConfig::default());
        let mut ms = state();

        let err = tb.add_user_timer("t", 5, 2, &mut ms).unwrap_err();
        assert!(matches!(err, PortsError::SequenceExhausted { .. }));
        assert!(ms.is_timer_running("t").is_none());
        assert!(!ms.has_pending_updates());
    }

    #[test]
    fn refresh_after_delete_arms_next_timer() {
        let mut tb = builder();
        let mut ms = state();
        let first = tb.add_user_timer("a", 1, 5, &mut ms).unwrap().unwrap();
        tb.add_user_timer("b", 50, 6, &mut ms).unwrap();

        ms.delete_pending_timer("a").unwrap();
        let next = tb.refresh_user_timer_task(&mut ms).unwrap().unwrap();
        assert!(matches!(next, Task::UserTimer { event_id: 6, .. }));
        assert_eq!(ms.is_timer_running("b").unwrap().task_id, next.task_id());

        let req = ms
            .into_update_request(3, Vec::new(), vec![first, next.clone()], None)
            .unwrap();
        assert_eq!(req.timer_tasks, vec![next]);
        assert_eq!(req.delete_timer_task, None);
    }

    #[test]
    fn refresh_without_timers_is_a_no_op() {
        let mut tb = builder();
        let mut ms = state();
        assert!(tb.refresh_user_timer_task(&mut ms).unwrap().is_none());
        assert!(tb.all_timers().is_empty());
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut tb = builder();
        let mut ms = state();
        tb.add_user_timer("t", 0, 5, &mut ms).unwrap();
        let candidate = tb.all_timers()[0].clone();
        let expiry = candidate.sequence_id.expiry();

        assert!(tb.is_timer_expired(&candidate, expiry));
        assert!(tb.is_timer_expired(&candidate, expiry + 1));
        assert!(!tb.is_timer_expired(&candidate, expiry - 1));
    }
}

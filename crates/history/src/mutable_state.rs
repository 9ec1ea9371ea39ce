//! In-memory view of one execution's mutable state plus its pending deltas.
//!
//! A [`MutableState`] is read from the store, changed by one decision or
//! timer pass, and turned into a single conditional
//! [`UpdateWorkflowExecutionRequest`]. It is never shared between passes.

use std::collections::{BTreeMap, BTreeSet};

use cadenza_core::{ActivityInfo, Task, TimerInfo, WorkflowExecutionInfo, WorkflowMutableState};
use cadenza_ports::{PortsError, UpdateWorkflowExecutionRequest};

/// Snapshot of an execution with change tracking.
#[derive(Debug, Clone)]
pub struct MutableState {
    execution_info: WorkflowExecutionInfo,
    pending_activities: BTreeMap<i64, ActivityInfo>,
    pending_timers: BTreeMap<String, TimerInfo>,

    updated_activities: BTreeMap<i64, ActivityInfo>,
    deleted_activity: Option<i64>,
    updated_timers: BTreeMap<String, TimerInfo>,
    deleted_timers: BTreeSet<String>,
    retired_timer_task: Option<i64>,
    minted_timer_tasks: BTreeSet<i64>,
    dropped_timer_tasks: BTreeSet<i64>,
}

impl MutableState {
    /// Snapshot of a fresh execution with nothing pending.
    #[must_use]
    pub fn new(execution_info: WorkflowExecutionInfo) -> Self {
        Self::from_persisted(execution_info, WorkflowMutableState::default())
    }

    /// Snapshot of a stored execution.
    #[must_use]
    pub fn from_persisted(execution_info: WorkflowExecutionInfo, state: WorkflowMutableState) -> Self {
        Self {
            execution_info,
            pending_activities: state.activity_infos.into_iter().collect(),
            pending_timers: state.timer_infos.into_iter().collect(),
            updated_activities: BTreeMap::new(),
            deleted_activity: None,
            updated_timers: BTreeMap::new(),
            deleted_timers: BTreeSet::new(),
            retired_timer_task: None,
            minted_timer_tasks: BTreeSet::new(),
            dropped_timer_tasks: BTreeSet::new(),
        }
    }

    /// Execution row.
    #[must_use]
    pub fn execution_info(&self) -> &WorkflowExecutionInfo {
        &self.execution_info
    }

    /// Execution row, mutably.
    pub fn execution_info_mut(&mut self) -> &mut WorkflowExecutionInfo {
        &mut self.execution_info
    }

    /// Pending activities by schedule id.
    #[must_use]
    pub fn pending_activities(&self) -> &BTreeMap<i64, ActivityInfo> {
        &self.pending_activities
    }

    /// Pending user timers by timer id.
    #[must_use]
    pub fn pending_timers(&self) -> &BTreeMap<String, TimerInfo> {
        &self.pending_timers
    }

    /// The pending activity scheduled at `schedule_id`.
    #[must_use]
    pub fn is_activity_running(&self, schedule_id: i64) -> Option<&ActivityInfo> {
        self.pending_activities.get(&schedule_id)
    }

    /// The pending timer `timer_id`.
    #[must_use]
    pub fn is_timer_running(&self, timer_id: &str) -> Option<&TimerInfo> {
        self.pending_timers.get(timer_id)
    }

    /// Insert or replace a pending activity.
    pub fn update_pending_activity(&mut self, info: ActivityInfo) {
        if self.deleted_activity == Some(info.schedule_id) {
            self.deleted_activity = None;
        }
        self.updated_activities.insert(info.schedule_id, info.clone());
        self.pending_activities.insert(info.schedule_id, info);
    }

    /// Remove a pending activity.
    ///
    /// One update carries at most one activity deletion, so a second
    /// deletion before [`into_update_request`](Self::into_update_request)
    /// fails with [`PortsError::InvalidArgument`].
    pub fn delete_pending_activity(&mut self, schedule_id: i64) -> Result<ActivityInfo, PortsError> {
        if let Some(other) = self.deleted_activity.filter(|id| *id != schedule_id) {
            return Err(PortsError::invalid_argument(format!(
                "activity {other} is already being deleted in this update"
            )));
        }
        let info = self
            .pending_activities
            .remove(&schedule_id)
            .ok_or_else(|| PortsError::not_found("ActivityInfo", schedule_id.to_string()))?;
        self.updated_activities.remove(&schedule_id);
        self.deleted_activity = Some(schedule_id);
        Ok(info)
    }

    /// Insert or replace a pending timer.
    pub fn update_pending_timer(&mut self, info: TimerInfo) {
        self.deleted_timers.remove(&info.timer_id);
        self.updated_timers.insert(info.timer_id.clone(), info.clone());
        self.pending_timers.insert(info.timer_id.clone(), info);
    }

    /// Remove a pending timer. A persisted timer task backing it is
    /// deleted by the same update.
    pub fn delete_pending_timer(&mut self, timer_id: &str) -> Result<TimerInfo, PortsError> {
        let info = self
            .pending_timers
            .get(timer_id)
            .cloned()
            .ok_or_else(|| PortsError::not_found("TimerInfo", timer_id))?;
        if info.has_task() {
            self.retire_timer_task(info.task_id)?;
        }
        self.pending_timers.remove(timer_id);
        self.updated_timers.remove(timer_id);
        self.deleted_timers.insert(timer_id.to_owned());
        Ok(info)
    }

    /// Retire a timer task that no longer backs a pending timer.
    ///
    /// A task minted during this pass is dropped from the outgoing timer
    /// tasks. A stored task is deleted by the next update; one update
    /// deletes at most one stored timer task.
    pub fn retire_timer_task(&mut self, task_id: i64) -> Result<(), PortsError> {
        if self.minted_timer_tasks.remove(&task_id) {
            self.dropped_timer_tasks.insert(task_id);
            return Ok(());
        }
        match self.retired_timer_task {
            Some(existing) if existing != task_id => Err(PortsError::invalid_argument(format!(
                "timer task {existing} is already being deleted in this update"
            ))),
            _ => {
                self.retired_timer_task = Some(task_id);
                Ok(())
            }
        }
    }

    /// Record a timer task created during this pass and not yet stored.
    pub(crate) fn record_minted_timer_task(&mut self, task_id: i64) {
        self.minted_timer_tasks.insert(task_id);
    }

    /// Drop a timer inserted during this pass without recording a deletion.
    pub(crate) fn forget_pending_timer(&mut self, timer_id: &str) {
        self.pending_timers.remove(timer_id);
        self.updated_timers.remove(timer_id);
    }

    /// Returns `true` if anything changed since the snapshot was taken.
    #[must_use]
    pub fn has_pending_updates(&self) -> bool {
        !self.updated_activities.is_empty()
            || self.deleted_activity.is_some()
            || !self.updated_timers.is_empty()
            || !self.deleted_timers.is_empty()
            || self.retired_timer_task.is_some()
    }

    /// Turn the snapshot into one conditional update.
    ///
    /// `condition` is the `next_event_id` the snapshot was read at.
    /// `delete_timer_task` names a fired timer task the caller completes;
    /// it must agree with any stored task retired through the snapshot.
    /// Timer tasks minted and then retired during this pass are left out
    /// of `timer_tasks`.
    pub fn into_update_request(
        self,
        condition: i64,
        transfer_tasks: Vec<Task>,
        timer_tasks: Vec<Task>,
        delete_timer_task: Option<i64>,
    ) -> Result<UpdateWorkflowExecutionRequest, PortsError> {
        let delete_timer_task = match (delete_timer_task, self.retired_timer_task) {
            (Some(a), Some(b)) if a != b => {
                return Err(PortsError::invalid_argument(format!(
                    "update can delete one timer task, got {a} and {b}"
                )));
            }
            (a, b) => a.or(b),
        };

        let dropped = self.dropped_timer_tasks;
        let timer_tasks = timer_tasks
            .into_iter()
            .filter(|task| !dropped.contains(&task.task_id()));

        let mut request = UpdateWorkflowExecutionRequest::new(self.execution_info, condition)
            .with_transfer_tasks(transfer_tasks)
            .with_timer_tasks(timer_tasks)
            .with_activity_infos(self.updated_activities.into_values())
            .with_timer_infos(self.updated_timers.into_values())
            .deleting_timers(self.deleted_timers);
        request.delete_activity_info = self.deleted_activity;
        request.delete_timer_task = delete_timer_task;
        request.validate()?;
        Ok(request)
    }
}

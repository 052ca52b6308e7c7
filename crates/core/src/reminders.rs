//! Deadline reminders: eligibility, scheduling, and response actions.
//!
//! Every re-evaluation cancels the task's pending reminder first, so running it
//! any number of times leaves at most one reminder per task id.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::model::{walk_forest, Task, TaskId};
use crate::preferences::Preferences;

pub const REMINDER_CATEGORY_ID: &str = "TASK_REMINDER_CATEGORY";
pub const COMPLETE_ACTION_ID: &str = "COMPLETE_ACTION";
pub const SNOOZE_ACTION_ID: &str = "SNOOZE_ACTION";
pub const REMINDER_TITLE: &str = "Task Reminder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderRequest {
    pub task_id: TaskId,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// OS notification service provided by the environment.
pub trait NotificationCenter {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), NotifyError>;
    fn cancel(&self, task_id: &str) -> Result<(), NotifyError>;
    fn request_permission(&self) -> Result<Permission, NotifyError>;

    /// Moves reminders whose fire time has been reached out of the pending
    /// queue and into the delivered set, returning the newly delivered ones.
    fn deliver_due(&self, _now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        Ok(Vec::new())
    }

    /// Withdraws a delivered reminder that was answered or no longer applies.
    fn dismiss(&self, _task_id: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

impl<T: NotificationCenter + ?Sized> NotificationCenter for &T {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), NotifyError> {
        (**self).schedule(request)
    }

    fn cancel(&self, task_id: &str) -> Result<(), NotifyError> {
        (**self).cancel(task_id)
    }

    fn request_permission(&self) -> Result<Permission, NotifyError> {
        (**self).request_permission()
    }

    fn deliver_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        (**self).deliver_due(now)
    }

    fn dismiss(&self, task_id: &str) -> Result<(), NotifyError> {
        (**self).dismiss(task_id)
    }
}

impl<T: NotificationCenter + ?Sized> NotificationCenter for Rc<T> {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), NotifyError> {
        (**self).schedule(request)
    }

    fn cancel(&self, task_id: &str) -> Result<(), NotifyError> {
        (**self).cancel(task_id)
    }

    fn request_permission(&self) -> Result<Permission, NotifyError> {
        (**self).request_permission()
    }

    fn deliver_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        (**self).deliver_due(now)
    }

    fn dismiss(&self, task_id: &str) -> Result<(), NotifyError> {
        (**self).dismiss(task_id)
    }
}

/// Action chosen on a delivered reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderAction {
    Complete,
    Snooze,
    Other(String),
}

impl ReminderAction {
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier.trim() {
            COMPLETE_ACTION_ID => ReminderAction::Complete,
            SNOOZE_ACTION_ID => ReminderAction::Snooze,
            other if other.eq_ignore_ascii_case("complete") => ReminderAction::Complete,
            other if other.eq_ignore_ascii_case("snooze") => ReminderAction::Snooze,
            other => ReminderAction::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotificationsDisabled,
    NoDeadline,
    Completed,
    FireTimeElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Scheduled(DateTime<Utc>),
    Skipped(SkipReason),
    Failed,
}

/// Decides whether `task` deserves a reminder at `now`, and when it fires.
pub fn plan_reminder(
    task: &Task,
    preferences: &Preferences,
    now: DateTime<Utc>,
) -> Result<ReminderRequest, SkipReason> {
    if !preferences.notifications_enabled {
        return Err(SkipReason::NotificationsDisabled);
    }
    let Some(deadline) = task.deadline else {
        return Err(SkipReason::NoDeadline);
    };
    if task.is_completed {
        return Err(SkipReason::Completed);
    }
    let fire_at = deadline - preferences.effective_lead_time();
    if fire_at <= now {
        return Err(SkipReason::FireTimeElapsed);
    }
    Ok(ReminderRequest {
        task_id: task.id.clone(),
        fire_at: truncate_to_minute(fire_at),
        title: REMINDER_TITLE.to_string(),
        body: task.title.clone(),
        category_id: REMINDER_CATEGORY_ID.to_string(),
    })
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|at| at.with_nanosecond(0))
        .unwrap_or(at)
}

/// Issues schedule/cancel calls; service failures are logged, never returned.
#[derive(Debug)]
pub struct ReminderScheduler<N> {
    center: N,
}

impl<N: NotificationCenter> ReminderScheduler<N> {
    pub fn new(center: N) -> Self {
        Self { center }
    }

    pub fn center(&self) -> &N {
        &self.center
    }

    pub fn request_permission(&self) -> Permission {
        match self.center.request_permission() {
            Ok(Permission::Granted) => {
                info!("notification permission granted");
                Permission::Granted
            }
            Ok(Permission::Denied) => {
                warn!("notification permission denied");
                Permission::Denied
            }
            Err(err) => {
                warn!(error = %err, "failed to request notification permission");
                Permission::Denied
            }
        }
    }

    pub fn reevaluate(
        &self,
        task: &Task,
        preferences: &Preferences,
        now: DateTime<Utc>,
    ) -> ReminderOutcome {
        self.cancel(&task.id);
        match plan_reminder(task, preferences, now) {
            Ok(request) => match self.center.schedule(&request) {
                Ok(()) => {
                    info!(task_id = task.id.as_str(), fire_at = %request.fire_at, "scheduled reminder");
                    self.dismiss(&task.id);
                    ReminderOutcome::Scheduled(request.fire_at)
                }
                Err(err) => {
                    warn!(task_id = task.id.as_str(), error = %err, "failed to schedule reminder");
                    ReminderOutcome::Failed
                }
            },
            // A delivered reminder stays visible until the task is answered or changes.
            Err(SkipReason::FireTimeElapsed) => {
                debug!(task_id = task.id.as_str(), "fire time already passed");
                ReminderOutcome::Skipped(SkipReason::FireTimeElapsed)
            }
            Err(reason) => {
                debug!(task_id = task.id.as_str(), ?reason, "no reminder scheduled");
                self.dismiss(&task.id);
                ReminderOutcome::Skipped(reason)
            }
        }
    }

    /// Hands over every pending reminder whose fire time is at or before `now`.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> Vec<ReminderRequest> {
        match self.center.deliver_due(now) {
            Ok(delivered) => {
                for reminder in &delivered {
                    info!(task_id = reminder.task_id.as_str(), fire_at = %reminder.fire_at, "reminder delivered");
                }
                delivered
            }
            Err(err) => {
                warn!(error = %err, "failed to deliver due reminders");
                Vec::new()
            }
        }
    }

    pub fn dismiss(&self, task_id: &str) {
        if let Err(err) = self.center.dismiss(task_id) {
            warn!(task_id, error = %err, "failed to dismiss delivered reminder");
        }
    }

    /// Re-evaluates `task` and every descendant.
    pub fn reevaluate_subtree(&self, task: &Task, preferences: &Preferences, now: DateTime<Utc>) {
        for node in task.walk() {
            self.reevaluate(node, preferences, now);
        }
    }

    pub fn reevaluate_forest(&self, tasks: &[Task], preferences: &Preferences, now: DateTime<Utc>) {
        for node in walk_forest(tasks) {
            self.reevaluate(node, preferences, now);
        }
    }

    pub fn cancel(&self, task_id: &str) {
        if let Err(err) = self.center.cancel(task_id) {
            warn!(task_id, error = %err, "failed to cancel reminder");
        }
    }

    /// Cancels pending reminders and dismisses delivered ones for the whole subtree.
    pub fn cancel_subtree(&self, task: &Task) {
        for node in task.walk() {
            self.cancel(&node.id);
            self.dismiss(&node.id);
        }
    }
}

/// In-process notification center keeping pending reminders keyed by task id.
#[derive(Debug)]
pub struct MemoryNotificationCenter {
    pending: Mutex<BTreeMap<TaskId, ReminderRequest>>,
    delivered: Mutex<BTreeMap<TaskId, ReminderRequest>>,
    permission: Permission,
}

impl Default for MemoryNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNotificationCenter {
    pub fn new() -> Self {
        Self::with_permission(Permission::Granted)
    }

    pub fn with_permission(permission: Permission) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            delivered: Mutex::new(BTreeMap::new()),
            permission,
        }
    }

    pub fn pending(&self) -> Vec<ReminderRequest> {
        self.pending.lock().values().cloned().collect()
    }

    pub fn pending_for(&self, task_id: &str) -> Option<ReminderRequest> {
        self.pending.lock().get(task_id).cloned()
    }

    pub fn delivered(&self) -> Vec<ReminderRequest> {
        self.delivered.lock().values().cloned().collect()
    }
}

impl NotificationCenter for MemoryNotificationCenter {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), NotifyError> {
        if self.permission == Permission::Denied {
            return Err(NotifyError::PermissionDenied);
        }
        self.pending
            .lock()
            .insert(request.task_id.clone(), request.clone());
        Ok(())
    }

    fn cancel(&self, task_id: &str) -> Result<(), NotifyError> {
        self.pending.lock().remove(task_id);
        Ok(())
    }

    fn request_permission(&self) -> Result<Permission, NotifyError> {
        Ok(self.permission)
    }

    fn deliver_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        let mut pending = self.pending.lock();
        let due: Vec<TaskId> = pending
            .values()
            .filter(|reminder| reminder.fire_at <= now)
            .map(|reminder| reminder.task_id.clone())
            .collect();
        let mut delivered = self.delivered.lock();
        let mut moved = Vec::with_capacity(due.len());
        for task_id in due {
            if let Some(reminder) = pending.remove(&task_id) {
                delivered.insert(task_id, reminder.clone());
                moved.push(reminder);
            }
        }
        Ok(moved)
    }

    fn dismiss(&self, task_id: &str) -> Result<(), NotifyError> {
        self.delivered.lock().remove(task_id);
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::{find_task, find_task_mut, remove_task, Priority, Task, TaskId};
use crate::persistence::{PersistenceBridge, SettingsStore};
use crate::preferences::{LeadTime, Preferences, Session};
use crate::reminders::{NotificationCenter, Permission, ReminderAction, ReminderScheduler};
use crate::sort::{self, SortMode};

/// Change emitted after a store mutation has been applied and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TaskAdded {
        id: TaskId,
        parent_id: Option<TaskId>,
    },
    TaskChanged {
        id: TaskId,
    },
    TaskDeleted {
        id: TaskId,
    },
    EditingChanged {
        id: Option<TaskId>,
    },
    PreferencesChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Completed { found: bool },
    Snoozed,
    Ignored,
}

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Sole owner and mutator of the task forest.
///
/// Every mutation persists the whole forest and re-evaluates reminders for the
/// nodes it touched before returning. Persistence and notification failures are
/// logged by the collaborators and never undo the in-memory change.
pub struct TaskStore<S, N> {
    tasks: Vec<Task>,
    session: Session,
    persistence: PersistenceBridge<S>,
    reminders: ReminderScheduler<N>,
    listeners: Vec<Listener>,
}

impl<S: SettingsStore, N: NotificationCenter> TaskStore<S, N> {
    /// Loads the saved forest and preferences, then reconciles pending reminders.
    ///
    /// Reminders whose fire time passed while nothing was running are handed to
    /// the delivered set first, so the reconcile pass does not drop them.
    pub fn open(settings: S, center: N) -> Self {
        let persistence = PersistenceBridge::new(settings);
        let tasks = persistence.load();
        let preferences = Preferences::load(persistence.settings());
        let store = Self {
            tasks,
            session: Session {
                editing_task_id: None,
                preferences,
            },
            persistence,
            reminders: ReminderScheduler::new(center),
            listeners: Vec::new(),
        };
        store.reminders.deliver_due(Utc::now());
        store.reevaluate_reminders();
        store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn sorted(&self, mode: SortMode) -> Vec<&Task> {
        sort::sorted(&self.tasks, mode)
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        find_task(&self.tasks, id)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn preferences(&self) -> &Preferences {
        &self.session.preferences
    }

    pub fn editing_task_id(&self) -> Option<&str> {
        self.session.editing_task_id.as_deref()
    }

    pub fn settings(&self) -> &S {
        self.persistence.settings()
    }

    pub fn notifications(&self) -> &N {
        self.reminders.center()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn request_notification_permission(&self) -> Permission {
        self.reminders.request_permission()
    }

    /// Appends a root task and puts it into edit mode. Blank titles are ignored.
    pub fn add_root_task(&mut self, title: &str) -> Option<TaskId> {
        let title = title.trim();
        if title.is_empty() {
            debug!("ignoring root task with empty title");
            return None;
        }

        let task = Task::new(title);
        let id = task.id.clone();
        self.reminders
            .reevaluate(&task, &self.session.preferences, Utc::now());
        self.tasks.push(task);
        self.persist();
        debug!(task_id = id.as_str(), "added root task");
        self.emit(StoreEvent::TaskAdded {
            id: id.clone(),
            parent_id: None,
        });
        self.set_editing(Some(id.clone()));
        Some(id)
    }

    /// Appends a placeholder subtask under `parent_id` and puts it into edit mode.
    pub fn add_subtask(&mut self, parent_id: &str) -> Option<TaskId> {
        let subtask = Task::placeholder_subtask();
        let id = subtask.id.clone();
        if !self.apply(parent_id, move |parent| parent.subtasks.push(subtask)) {
            debug!(parent_id, "parent task not found for subtask");
            return None;
        }
        debug!(task_id = id.as_str(), parent_id, "added subtask");
        self.emit(StoreEvent::TaskAdded {
            id: id.clone(),
            parent_id: Some(parent_id.to_string()),
        });
        self.set_editing(Some(id.clone()));
        Some(id)
    }

    /// Applies `mutate` to the first node with `id` in depth-first pre-order.
    ///
    /// Returns `false` and leaves everything untouched when no node matches.
    /// `mutate` must not change the node's `id`.
    pub fn find_and_mutate<F>(&mut self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        if !self.apply(id, mutate) {
            debug!(task_id = id, "task not found");
            return false;
        }
        self.emit(StoreEvent::TaskChanged { id: id.to_string() });
        true
    }

    /// Sets completion on the task and all of its descendants.
    pub fn toggle_completion(&mut self, id: &str, completed: bool) -> bool {
        self.find_and_mutate(id, |task| task.set_completed(completed))
    }

    pub fn set_title(&mut self, id: &str, title: &str) -> bool {
        self.find_and_mutate(id, |task| task.title = title.to_string())
    }

    pub fn set_deadline(&mut self, id: &str, deadline: Option<DateTime<Utc>>) -> bool {
        self.find_and_mutate(id, |task| task.deadline = deadline)
    }

    pub fn set_priority(&mut self, id: &str, priority: Priority) -> bool {
        self.find_and_mutate(id, |task| task.priority = priority)
    }

    /// Blank notes clear the field.
    pub fn set_notes(&mut self, id: &str, notes: Option<&str>) -> bool {
        let notes = notes
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string);
        self.find_and_mutate(id, |task| task.notes = notes)
    }

    /// Removes the node `id` and its subtree from wherever it sits in the forest.
    pub fn delete_task(&mut self, id: &str) -> bool {
        let mut removed = Vec::new();
        self.tasks = remove_task(std::mem::take(&mut self.tasks), id, &mut removed);
        if removed.is_empty() {
            debug!(task_id = id, "task not found for delete");
            return false;
        }

        for task in &removed {
            self.reminders.cancel_subtree(task);
        }
        self.persist();
        debug!(task_id = id, "deleted task");
        self.emit(StoreEvent::TaskDeleted { id: id.to_string() });

        let editing_removed = self.session.editing_task_id.as_deref().is_some_and(|editing| {
            removed
                .iter()
                .any(|task| task.walk().iter().any(|node| node.id == editing))
        });
        if editing_removed {
            self.set_editing(None);
        }
        true
    }

    pub fn begin_edit(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        self.set_editing(Some(id.to_string()));
        true
    }

    /// Leaves edit mode after a submit or cancel.
    pub fn end_edit(&mut self) {
        if self.session.editing_task_id.is_some() {
            self.set_editing(None);
        }
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.update_preferences(|prefs| prefs.notifications_enabled = enabled);
    }

    pub fn set_lead_time(&mut self, lead_time: LeadTime) {
        self.update_preferences(|prefs| prefs.lead_time = lead_time);
    }

    pub fn set_custom_lead_minutes(&mut self, minutes: impl Into<String>) {
        let minutes = minutes.into();
        self.update_preferences(|prefs| prefs.custom_lead_minutes = minutes);
    }

    /// Runs the cancel-then-maybe-schedule pass over every node in the forest.
    pub fn reevaluate_reminders(&self) {
        self.reminders
            .reevaluate_forest(&self.tasks, &self.session.preferences, Utc::now());
    }

    /// Routes an action chosen on a delivered reminder back into the forest.
    pub fn handle_reminder_response(
        &mut self,
        task_id: &str,
        action_identifier: &str,
    ) -> ResponseOutcome {
        match ReminderAction::from_identifier(action_identifier) {
            ReminderAction::Complete => {
                let found = self.toggle_completion(task_id, true);
                self.reminders.dismiss(task_id);
                info!(task_id, found, "task marked complete from reminder");
                ResponseOutcome::Completed { found }
            }
            ReminderAction::Snooze => {
                // Snoozing acknowledges the reminder without rescheduling it.
                self.reminders.dismiss(task_id);
                info!(task_id, "snooze selected on reminder");
                ResponseOutcome::Snoozed
            }
            ReminderAction::Other(action) => {
                debug!(task_id, action = action.as_str(), "ignoring reminder response");
                ResponseOutcome::Ignored
            }
        }
    }

    fn apply<F>(&mut self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        let Some(task) = find_task_mut(&mut self.tasks, id) else {
            return false;
        };
        mutate(task);
        debug_assert_eq!(task.id, id, "task ids are immutable");
        self.reminders
            .reevaluate_subtree(task, &self.session.preferences, Utc::now());
        self.persist();
        true
    }

    fn update_preferences<F>(&mut self, update: F)
    where
        F: FnOnce(&mut Preferences),
    {
        update(&mut self.session.preferences);
        self.session.preferences.save(self.persistence.settings());
        self.reevaluate_reminders();
        self.emit(StoreEvent::PreferencesChanged);
    }

    fn set_editing(&mut self, id: Option<TaskId>) {
        self.session.editing_task_id = id.clone();
        self.emit(StoreEvent::EditingChanged { id });
    }

    fn persist(&self) {
        self.persistence.save(&self.tasks);
    }

    fn emit(&mut self, event: StoreEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ParseError;

pub type TaskId = String;

/// Title given to subtasks created from the row "+" button before the user renames them.
pub const PLACEHOLDER_SUBTASK_TITLE: &str = "New Subtask";

pub fn new_task_id() -> TaskId {
    Ulid::new().to_string()
}

/// Display tint shared by priorities and deadline urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Neutral,
    Green,
    Yellow,
    Red,
}

impl Tint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tint::Neutral => "neutral",
            Tint::Green => "green",
            Tint::Yellow => "yellow",
            Tint::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Rank used for sorting: high sorts first.
    pub fn sort_rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn tint(&self) -> Tint {
        match self {
            Priority::Low => Tint::Green,
            Priority::Medium => Tint::Yellow,
            Priority::High => Tint::Red,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "med" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ParseError::Priority(other.to_string())),
        }
    }
}

impl ValueEnum for Priority {
    fn value_variants<'a>() -> &'a [Self] {
        &Priority::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// One node of the task forest.
///
/// The serialized shape is `{id, title, isCompleted, deadline?, priority, notes?,
/// subtasks, creationDate?}`. Records written before `creationDate` existed decode
/// with the field absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(new_task_id(), title)
    }

    pub fn with_id(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_completed: false,
            deadline: None,
            priority: Priority::default(),
            notes: None,
            subtasks: Vec::new(),
            creation_date: Some(Utc::now()),
        }
    }

    pub fn placeholder_subtask() -> Self {
        Self::new(PLACEHOLDER_SUBTASK_TITLE)
    }

    /// Sets completion on this node and every descendant.
    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
        for subtask in &mut self.subtasks {
            subtask.set_completed(completed);
        }
    }

    pub fn has_notes(&self) -> bool {
        self.notes.as_deref().is_some_and(|notes| !notes.is_empty())
    }

    /// Pre-order walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&Task> {
        let mut nodes = vec![self];
        for subtask in &self.subtasks {
            nodes.extend(subtask.walk());
        }
        nodes
    }

    pub fn deadline_tint(&self, now: DateTime<Utc>) -> Tint {
        match self.deadline {
            None => Tint::Neutral,
            Some(deadline) if deadline < now => Tint::Red,
            Some(deadline) if deadline - now < Duration::days(3) => Tint::Yellow,
            Some(_) => Tint::Green,
        }
    }
}

/// Pre-order walk over a whole forest.
pub fn walk_forest(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().flat_map(Task::walk).collect()
}

pub fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    for task in tasks {
        if task.id == id {
            return Some(task);
        }
        if let Some(found) = find_task(&task.subtasks, id) {
            return Some(found);
        }
    }
    None
}

pub fn find_task_mut<'a>(tasks: &'a mut [Task], id: &str) -> Option<&'a mut Task> {
    for task in tasks.iter_mut() {
        if task.id == id {
            return Some(task);
        }
        if let Some(found) = find_task_mut(&mut task.subtasks, id) {
            return Some(found);
        }
    }
    None
}

/// Rebuilds `tasks` without the node `id`, at any depth. Removed nodes are pushed
/// onto `removed` with their subtrees intact.
pub fn remove_task(tasks: Vec<Task>, id: &str, removed: &mut Vec<Task>) -> Vec<Task> {
    let mut kept = Vec::with_capacity(tasks.len());
    for mut task in tasks {
        if task.id == id {
            removed.push(task);
            continue;
        }
        task.subtasks = remove_task(std::mem::take(&mut task.subtasks), id, removed);
        kept.push(task);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn tree() -> Vec<Task> {
        let mut root = Task::with_id("root", "Plan trip");
        let mut flights = Task::with_id("flights", "Book flights");
        flights.subtasks.push(Task::with_id("seats", "Pick seats"));
        root.subtasks.push(flights);
        root.subtasks.push(Task::with_id("hotel", "Book hotel"));
        vec![root, Task::with_id("other", "Water plants")]
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(Priority::High.sort_rank() < Priority::Medium.sort_rank());
        assert!(Priority::Medium.sort_rank() < Priority::Low.sort_rank());
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!("MED".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::High.tint(), Tint::Red);
    }

    #[test]
    fn set_completed_cascades_both_ways() {
        let mut forest = tree();
        forest[0].set_completed(true);
        assert!(forest[0].walk().iter().all(|task| task.is_completed));
        assert!(!forest[1].is_completed);

        forest[0].set_completed(false);
        assert!(forest[0].walk().iter().all(|task| !task.is_completed));
    }

    #[test]
    fn walk_is_pre_order() {
        let forest = tree();
        let ids: Vec<&str> = walk_forest(&forest).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "flights", "seats", "hotel", "other"]);
    }

    #[test]
    fn remove_task_keeps_sibling_order() {
        let mut removed = Vec::new();
        let forest = remove_task(tree(), "flights", &mut removed);
        let ids: Vec<&str> = walk_forest(&forest).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "hotel", "other"]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].subtasks[0].id, "seats");
    }

    #[test]
    fn decodes_record_without_creation_date() {
        let raw = r#"{"id":"a","title":"Legacy","isCompleted":false,"priority":"high","subtasks":[]}"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.creation_date, None);
        assert_eq!(task.priority, Priority::High);
        assert!(!task.has_notes());
    }

    #[test]
    fn deadline_tint_tracks_urgency() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut task = Task::with_id("t", "Taxes");
        assert_eq!(task.deadline_tint(now), Tint::Neutral);
        task.deadline = Some(now - Duration::hours(1));
        assert_eq!(task.deadline_tint(now), Tint::Red);
        task.deadline = Some(now + Duration::days(2));
        assert_eq!(task.deadline_tint(now), Tint::Yellow);
        task.deadline = Some(now + Duration::days(5));
        assert_eq!(task.deadline_tint(now), Tint::Green);
    }
}

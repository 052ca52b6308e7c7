//! Display ordering for root tasks. Subtasks always keep insertion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::model::Task;

/// Deadlines this close together count as equal in smart mode.
const SMART_DEADLINE_TOLERANCE_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Smart,
    Deadline,
    Priority,
}

impl SortMode {
    pub const ALL: [SortMode; 3] = [SortMode::Smart, SortMode::Deadline, SortMode::Priority];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Smart => "smart",
            SortMode::Deadline => "deadline",
            SortMode::Priority => "priority",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortMode::Smart => "Smart",
            SortMode::Deadline => "Deadline",
            SortMode::Priority => "Priority",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smart" => Ok(SortMode::Smart),
            "deadline" | "due" => Ok(SortMode::Deadline),
            "priority" => Ok(SortMode::Priority),
            other => Err(ParseError::SortMode(other.to_string())),
        }
    }
}

impl ValueEnum for SortMode {
    fn value_variants<'a>() -> &'a [Self] {
        &SortMode::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Returns the root tasks in display order without touching the forest.
pub fn sorted(tasks: &[Task], mode: SortMode) -> Vec<&Task> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    match mode {
        SortMode::Smart => {
            let buckets = DeadlineBuckets::from_tasks(tasks);
            ordered.sort_by(|a, b| compare_smart(a, b, &buckets));
        }
        SortMode::Deadline => ordered.sort_by(|a, b| compare_deadline(a, b)),
        SortMode::Priority => ordered.sort_by(|a, b| compare_priority(a, b)),
    }
    ordered
}

/// Groups deadlines that lie within the tolerance of a bucket's earliest member.
///
/// Comparing bucket indexes instead of raw deadlines keeps the smart ordering a
/// total order even when several deadlines chain together one second apart.
struct DeadlineBuckets {
    index: BTreeMap<DateTime<Utc>, usize>,
}

impl DeadlineBuckets {
    fn from_tasks(tasks: &[Task]) -> Self {
        let tolerance = Duration::seconds(SMART_DEADLINE_TOLERANCE_SECS);
        let mut deadlines: Vec<DateTime<Utc>> = tasks.iter().filter_map(|t| t.deadline).collect();
        deadlines.sort();
        deadlines.dedup();

        let mut index = BTreeMap::new();
        let mut bucket = 0usize;
        let mut anchor: Option<DateTime<Utc>> = None;
        for deadline in deadlines {
            match anchor {
                Some(start) if deadline - start <= tolerance => {}
                Some(_) => {
                    bucket += 1;
                    anchor = Some(deadline);
                }
                None => anchor = Some(deadline),
            }
            index.insert(deadline, bucket);
        }
        Self { index }
    }

    fn bucket(&self, deadline: &DateTime<Utc>) -> usize {
        self.index.get(deadline).copied().unwrap_or_default()
    }
}

fn compare_smart(a: &Task, b: &Task, buckets: &DeadlineBuckets) -> Ordering {
    a.is_completed
        .cmp(&b.is_completed)
        .then_with(|| match (&a.deadline, &b.deadline) {
            (Some(da), Some(db)) => buckets.bucket(da).cmp(&buckets.bucket(db)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| newest_first(a, b))
}

fn compare_deadline(a: &Task, b: &Task) -> Ordering {
    match (&a.deadline, &b.deadline) {
        (Some(da), Some(db)) => da.cmp(db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| newest_first(a, b))
}

fn compare_priority(a: &Task, b: &Task) -> Ordering {
    a.priority
        .sort_rank()
        .cmp(&b.priority.sort_rank())
        .then_with(|| newest_first(a, b))
}

/// Missing creation dates count as the earliest possible instant.
fn newest_first(a: &Task, b: &Task) -> Ordering {
    b.creation_date.cmp(&a.creation_date)
}

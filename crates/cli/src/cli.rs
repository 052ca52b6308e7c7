use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::Priority;
use gentask_core::sort::SortMode;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gentask",
    version,
    about = "Nested tasks with deadlines, priorities, and reminders.",
    after_help = "Examples:\n  gentask add Renew passport\n  gentask edit 01J... --deadline fri --priority high\n  gentask list --sort deadline\n  gentask lead-time custom --minutes 20"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Show the task tree (default command)
    List(ListArgs),
    /// Add a root task
    Add(AddArgs),
    /// Add a subtask under an existing task
    Subtask(SubtaskArgs),
    /// Mark a task and all of its subtasks complete
    Done(TaskIdArgs),
    /// Mark a task and all of its subtasks incomplete
    Undone(TaskIdArgs),
    /// Delete one or more tasks (with their subtasks) by id
    Delete(DeleteArgs),
    /// Change a task's title, notes, priority, or deadline
    Edit(EditArgs),
    /// Turn deadline reminders on or off
    Notify(NotifyArgs),
    /// Choose how long before a deadline reminders fire
    LeadTime(LeadTimeArgs),
    /// Show reminder preferences
    Settings,
    /// List scheduled reminders
    Reminders(RemindersArgs),
    /// Answer a delivered reminder (complete or snooze)
    Respond(RespondArgs),
}

impl Default for CliCommand {
    fn default() -> Self {
        CliCommand::List(ListArgs::default())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Ordering applied to root tasks; subtasks keep insertion order
    #[arg(long, value_enum, default_value_t = SortMode::Smart)]
    pub sort: SortMode,

    /// Print the sorted forest as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,
}

impl AddArgs {
    pub fn title(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Args, Debug, Clone)]
pub struct SubtaskArgs {
    /// Id of the parent task
    #[arg(value_name = "PARENT_ID")]
    pub parent_id: String,

    /// Title replacing the "New Subtask" placeholder
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TaskIdArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// One or more task ids to delete
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// Free-form notes; pass an empty string to clear
    #[arg(long)]
    pub notes: Option<String>,

    #[arg(long, value_enum)]
    pub priority: Option<Priority>,

    /// Deadline (now, today, tomorrow, fri, +90m, +2h, +3d, 2025-01-31, 2025-01-31 17:00, 17:00)
    #[arg(long, value_name = "SPEC", conflicts_with = "clear_deadline")]
    pub deadline: Option<String>,

    /// Remove the deadline
    #[arg(long)]
    pub clear_deadline: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

#[derive(Args, Debug, Clone)]
pub struct NotifyArgs {
    #[arg(value_enum)]
    pub state: Switch,
}

#[derive(Args, Debug, Clone)]
pub struct LeadTimeArgs {
    /// 5, 10, 30, 60 (minutes), 1h, or custom
    #[arg(value_name = "CHOICE")]
    pub choice: String,

    /// Minutes used by the custom choice
    #[arg(long, value_name = "MINUTES")]
    pub minutes: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemindersArgs {
    /// Only show reminders whose fire time has passed
    #[arg(long)]
    pub due: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RespondArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    /// complete | snooze (or COMPLETE_ACTION / SNOOZE_ACTION)
    #[arg(value_name = "ACTION")]
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_edit_flags() {
        let cli = Cli::try_parse_from([
            "gentask", "edit", "abc", "--priority", "high", "--deadline", "+2h",
        ])
        .unwrap();
        match cli.command {
            Some(CliCommand::Edit(args)) => {
                assert_eq!(args.id, "abc");
                assert_eq!(args.priority, Some(Priority::High));
                assert_eq!(args.deadline.as_deref(), Some("+2h"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn deadline_and_clear_conflict() {
        let parsed = Cli::try_parse_from([
            "gentask", "edit", "abc", "--deadline", "today", "--clear-deadline",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["gentask", "list", "--sort", "priority", "--log", "debug"])
            .unwrap();
        assert_eq!(cli.log_filter.as_deref(), Some("debug"));
        match cli.command {
            Some(CliCommand::List(args)) => assert_eq!(args.sort, SortMode::Priority),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

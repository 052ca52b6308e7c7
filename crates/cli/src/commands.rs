use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use gentask_core::parser::parse_deadline;
use gentask_core::preferences::{take_first_launch, LeadTime};
use gentask_core::reminders::ReminderRequest;
use gentask_core::{Database, ResponseOutcome, Task, TaskStore};
use tracing::debug;

use crate::cli::{
    AddArgs, CliCommand, DeleteArgs, EditArgs, LeadTimeArgs, ListArgs, NotifyArgs, RemindersArgs,
    RespondArgs, SubtaskArgs, Switch,
};
use crate::config::AppConfig;

type Store<'a> = TaskStore<&'a Database, &'a Database>;

const WELCOME: &str = "Welcome to gentask!\n\
    Add a task with `gentask add <title>` and see everything with `gentask list`.\n\
    Reminders fire 10 minutes before a deadline; change that with `gentask lead-time`.";

pub fn execute<W: Write>(config: &AppConfig, command: CliCommand, mut writer: W) -> Result<()> {
    let db = Database::initialize(config)?;
    if take_first_launch(&db) {
        writeln!(writer, "{WELCOME}\n")?;
    }
    let mut store = TaskStore::open(&db, &db);
    debug!(?command, data_dir = %config.data_dir().display(), "executing command");

    match command {
        CliCommand::List(args) => handle_list(&store, &args, &mut writer),
        CliCommand::Add(args) => handle_add(&mut store, &args, &mut writer),
        CliCommand::Subtask(args) => handle_subtask(&mut store, &args, &mut writer),
        CliCommand::Done(args) => handle_completion(&mut store, &args.id, true, &mut writer),
        CliCommand::Undone(args) => handle_completion(&mut store, &args.id, false, &mut writer),
        CliCommand::Delete(args) => handle_delete(&mut store, &db, &args, &mut writer),
        CliCommand::Edit(args) => handle_edit(&mut store, &args, &mut writer),
        CliCommand::Notify(args) => handle_notify(&mut store, &args, &mut writer),
        CliCommand::LeadTime(args) => handle_lead_time(&mut store, &args, &mut writer),
        CliCommand::Settings => handle_settings(&store, &mut writer),
        CliCommand::Reminders(args) => handle_reminders(&db, &args, &mut writer),
        CliCommand::Respond(args) => handle_respond(&mut store, &args, &mut writer),
    }
}

fn handle_list<W: Write>(store: &Store<'_>, args: &ListArgs, mut writer: W) -> Result<()> {
    let roots = store.sorted(args.sort);
    if args.json {
        serde_json::to_writer_pretty(&mut writer, &roots).context("Failed to encode tasks")?;
        writeln!(writer)?;
        return Ok(());
    }
    if roots.is_empty() {
        writeln!(writer, "No tasks yet.")?;
        return Ok(());
    }
    let now = Utc::now();
    for task in roots {
        write_tree(&mut writer, task, 0, now)?;
    }
    Ok(())
}

fn write_tree<W: Write>(writer: &mut W, task: &Task, depth: usize, now: DateTime<Utc>) -> Result<()> {
    writeln!(writer, "{}{}", "    ".repeat(depth), TaskLine { task, now })?;
    for subtask in &task.subtasks {
        write_tree(writer, subtask, depth + 1, now)?;
    }
    Ok(())
}

fn handle_add<W: Write>(store: &mut Store<'_>, args: &AddArgs, mut writer: W) -> Result<()> {
    match store.add_root_task(&args.title()) {
        Some(id) => {
            store.end_edit();
            writeln!(writer, "Added {id}: {}", args.title().trim())?;
        }
        None => writeln!(writer, "Task title cannot be empty")?,
    }
    Ok(())
}

fn handle_subtask<W: Write>(store: &mut Store<'_>, args: &SubtaskArgs, mut writer: W) -> Result<()> {
    let Some(id) = store.add_subtask(&args.parent_id) else {
        writeln!(writer, "Not found: {}", args.parent_id)?;
        return Ok(());
    };
    if let Some(title) = args.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        store.set_title(&id, title);
    }
    store.end_edit();
    let title = store.find(&id).map(|task| task.title.clone()).unwrap_or_default();
    writeln!(writer, "Added {id} under {}: {title}", args.parent_id)?;
    Ok(())
}

fn handle_completion<W: Write>(
    store: &mut Store<'_>,
    id: &str,
    completed: bool,
    mut writer: W,
) -> Result<()> {
    if !store.toggle_completion(id, completed) {
        writeln!(writer, "Not found: {id}")?;
        return Ok(());
    }
    let verb = if completed { "Completed" } else { "Reopened" };
    let title = store.find(id).map(|task| task.title.as_str()).unwrap_or_default();
    writeln!(writer, "{verb} {title}")?;
    Ok(())
}

fn handle_delete<W: Write>(
    store: &mut Store<'_>,
    db: &Database,
    args: &DeleteArgs,
    mut writer: W,
) -> Result<()> {
    let mut reminder_ids: Vec<String> = db
        .pending_reminders()?
        .into_iter()
        .chain(db.delivered_reminders()?)
        .map(|reminder| reminder.task_id)
        .collect();

    let mut report = DeleteReport::default();
    for id in &args.ids {
        let Some(doomed) = store
            .find(id)
            .map(|task| task.walk().iter().map(|node| node.id.clone()).collect::<Vec<_>>())
        else {
            report.missing.push(id.clone());
            continue;
        };
        if !store.delete_task(id) {
            report.missing.push(id.clone());
            continue;
        }
        report.tasks += 1;
        report.subtasks += doomed.len() - 1;
        let before = reminder_ids.len();
        reminder_ids.retain(|task_id| !doomed.contains(task_id));
        report.reminders += before - reminder_ids.len();
    }
    debug!(
        tasks = report.tasks,
        subtasks = report.subtasks,
        reminders = report.reminders,
        "deleted tasks"
    );
    write!(writer, "{report}")?;
    Ok(())
}

fn handle_edit<W: Write>(store: &mut Store<'_>, args: &EditArgs, mut writer: W) -> Result<()> {
    if store.find(&args.id).is_none() {
        writeln!(writer, "Not found: {}", args.id)?;
        return Ok(());
    }

    let deadline = match args.deadline.as_deref() {
        Some(spec) => Some(parse_deadline(spec)?),
        None => None,
    };

    let mut changes = Vec::new();
    if let Some(title) = args.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        store.set_title(&args.id, title);
        changes.push("title");
    }
    if let Some(notes) = args.notes.as_deref() {
        store.set_notes(&args.id, Some(notes));
        changes.push("notes");
    }
    if let Some(priority) = args.priority {
        store.set_priority(&args.id, priority);
        changes.push("priority");
    }
    if let Some(deadline) = deadline {
        store.set_deadline(&args.id, Some(deadline));
        changes.push("deadline");
    } else if args.clear_deadline {
        store.set_deadline(&args.id, None);
        changes.push("deadline");
    }

    if changes.is_empty() {
        writeln!(writer, "Nothing to change for {}", args.id)?;
    } else {
        writeln!(writer, "Updated {} ({})", args.id, changes.join(", "))?;
    }
    Ok(())
}

fn handle_notify<W: Write>(store: &mut Store<'_>, args: &NotifyArgs, mut writer: W) -> Result<()> {
    let enabled = args.state == Switch::On;
    if enabled {
        store.request_notification_permission();
    }
    store.set_notifications_enabled(enabled);
    writeln!(
        writer,
        "Reminders {}",
        if enabled { "enabled" } else { "disabled" }
    )?;
    Ok(())
}

fn handle_lead_time<W: Write>(
    store: &mut Store<'_>,
    args: &LeadTimeArgs,
    mut writer: W,
) -> Result<()> {
    let lead_time: LeadTime = args.choice.parse()?;
    if let Some(minutes) = &args.minutes {
        store.set_custom_lead_minutes(minutes.trim());
    }
    store.set_lead_time(lead_time);
    writeln!(
        writer,
        "Reminders fire {} minutes before deadlines",
        store.preferences().effective_lead_time().num_minutes()
    )?;
    Ok(())
}

fn handle_settings<W: Write>(store: &Store<'_>, mut writer: W) -> Result<()> {
    let prefs = store.preferences();
    writeln!(
        writer,
        "Reminders: {}",
        if prefs.notifications_enabled { "on" } else { "off" }
    )?;
    writeln!(writer, "Lead time: {}", prefs.lead_time)?;
    if prefs.lead_time == LeadTime::Custom {
        writeln!(writer, "Custom minutes: {}", prefs.custom_lead_minutes)?;
    }
    writeln!(
        writer,
        "Effective lead time: {} min",
        prefs.effective_lead_time().num_minutes()
    )?;
    Ok(())
}

fn handle_reminders<W: Write>(db: &Database, args: &RemindersArgs, mut writer: W) -> Result<()> {
    let reminders = if args.due {
        db.due_reminders(Utc::now())?
    } else {
        db.pending_reminders()?
    };
    if reminders.is_empty() {
        writeln!(writer, "No reminders scheduled.")?;
        return Ok(());
    }
    for reminder in &reminders {
        writeln!(writer, "{}", ReminderLine(reminder))?;
    }
    Ok(())
}

fn handle_respond<W: Write>(store: &mut Store<'_>, args: &RespondArgs, mut writer: W) -> Result<()> {
    match store.handle_reminder_response(&args.id, &args.action) {
        ResponseOutcome::Completed { found: true } => writeln!(writer, "Completed {}", args.id)?,
        ResponseOutcome::Completed { found: false } => writeln!(writer, "Not found: {}", args.id)?,
        ResponseOutcome::Snoozed => writeln!(writer, "Snoozed {}", args.id)?,
        ResponseOutcome::Ignored => writeln!(writer, "Ignored action '{}'", args.action)?,
    }
    Ok(())
}

pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    let local = dt.with_timezone(&Local);
    local.format("%a %b %d %H:%M").to_string()
}

struct TaskLine<'a> {
    task: &'a Task,
    now: DateTime<Utc>,
}

impl fmt::Display for TaskLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = self.task;
        let checkbox = if task.is_completed { "[x]" } else { "[ ]" };
        write!(f, "{checkbox} {} ({})", task.title, task.priority)?;
        if let Some(deadline) = task.deadline {
            write!(
                f,
                " due {} [{}]",
                format_datetime(deadline),
                task.deadline_tint(self.now).as_str()
            )?;
        }
        if task.has_notes() {
            write!(f, " +notes")?;
        }
        write!(f, "  {}", task.id)
    }
}

struct ReminderLine<'a>(&'a ReminderRequest);

impl fmt::Display for ReminderLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}",
            format_datetime(self.0.fire_at),
            self.0.task_id,
            self.0.body
        )
    }
}

/// What a `delete` run removed, counting whole subtrees.
#[derive(Debug, Default)]
struct DeleteReport {
    tasks: usize,
    subtasks: usize,
    reminders: usize,
    missing: Vec<String>,
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tasks == 0 {
            writeln!(f, "Nothing deleted")?;
        } else {
            write!(f, "Deleted {}", counted(self.tasks, "task"))?;
            let mut extras = Vec::new();
            if self.subtasks > 0 {
                extras.push(counted(self.subtasks, "subtask"));
            }
            if self.reminders > 0 {
                extras.push(format!("{} cancelled", counted(self.reminders, "reminder")));
            }
            if !extras.is_empty() {
                write!(f, " ({})", extras.join(", "))?;
            }
            writeln!(f)?;
        }
        if !self.missing.is_empty() {
            writeln!(f, "Not found: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

fn counted(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TaskIdArgs;
    use gentask_core::model::Priority;
    use gentask_core::reminders::{REMINDER_CATEGORY_ID, REMINDER_TITLE};
    use gentask_core::NotificationCenter;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_config() -> (AppConfig, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf());
        (config, dir)
    }

    fn run(config: &AppConfig, command: CliCommand) -> String {
        let mut output = Vec::new();
        execute(config, command, &mut output).expect("execute command");
        String::from_utf8(output).expect("utf8")
    }

    fn add(config: &AppConfig, title: &str) -> String {
        run(config, CliCommand::Add(AddArgs { text: vec![title.into()] }));
        let db = Database::initialize(config).expect("db");
        let store = TaskStore::open(&db, &db);
        store
            .tasks()
            .iter()
            .find(|task| task.title == title)
            .map(|task| task.id.clone())
            .expect("task added")
    }

    #[test]
    fn first_run_prints_welcome_once() {
        let (config, _dir) = temp_config();
        let first = run(&config, CliCommand::default());
        let second = run(&config, CliCommand::default());
        assert!(first.starts_with("Welcome to gentask!"));
        assert!(first.contains("No tasks yet."));
        assert_eq!(second, "No tasks yet.\n");
    }

    #[test]
    fn add_subtask_and_list_render_tree() {
        let (config, _dir) = temp_config();
        let parent = add(&config, "Plan party");
        let output = run(
            &config,
            CliCommand::Subtask(SubtaskArgs {
                parent_id: parent.clone(),
                title: Some("Order cake".into()),
            }),
        );
        assert!(output.contains(&format!("under {parent}: Order cake")));

        let listing = run(&config, CliCommand::default());
        let lines: Vec<&str> = listing.lines().collect();
        assert!(lines[0].starts_with("[ ] Plan party (medium)"));
        assert!(lines[1].starts_with("    [ ] Order cake (medium)"));
    }

    #[test]
    fn done_cascades_and_delete_reports_missing() {
        let (config, _dir) = temp_config();
        let parent = add(&config, "Move house");
        run(
            &config,
            CliCommand::Subtask(SubtaskArgs {
                parent_id: parent.clone(),
                title: None,
            }),
        );

        let output = run(&config, CliCommand::Done(TaskIdArgs { id: parent.clone() }));
        assert!(output.contains("Completed Move house"));
        let listing = run(&config, CliCommand::default());
        assert_eq!(listing.matches("[x]").count(), 2);

        let output = run(
            &config,
            CliCommand::Delete(DeleteArgs {
                ids: vec![parent, "missing".into()],
            }),
        );
        assert_eq!(output, "Deleted 1 task (1 subtask)\nNot found: missing\n");
    }

    #[test]
    fn delete_counts_cancelled_reminders_across_the_subtree() {
        let (config, _dir) = temp_config();
        let parent = add(&config, "Conference");
        run(
            &config,
            CliCommand::Subtask(SubtaskArgs {
                parent_id: parent.clone(),
                title: Some("Book hotel".into()),
            }),
        );
        let child = {
            let db = Database::initialize(&config).expect("db");
            let store = TaskStore::open(&db, &db);
            store.find(&parent).expect("parent").subtasks[0].id.clone()
        };
        for id in [&parent, &child] {
            run(
                &config,
                CliCommand::Edit(EditArgs {
                    id: id.clone(),
                    deadline: Some("+2d".into()),
                    ..EditArgs::default()
                }),
            );
        }

        let output = run(&config, CliCommand::Delete(DeleteArgs { ids: vec![parent] }));
        assert_eq!(output, "Deleted 1 task (1 subtask, 2 reminders cancelled)\n");
        let output = run(&config, CliCommand::Delete(DeleteArgs { ids: vec![child] }));
        assert!(output.starts_with("Nothing deleted\nNot found: "));
    }

    #[test]
    fn reminders_that_came_due_stay_listed_until_answered() {
        let (config, _dir) = temp_config();
        let id = add(&config, "Call the bank");
        run(
            &config,
            CliCommand::Edit(EditArgs {
                id: id.clone(),
                deadline: Some("+5m".into()),
                ..EditArgs::default()
            }),
        );
        {
            let db = Database::initialize(&config).expect("db");
            db.schedule(&ReminderRequest {
                task_id: id.clone(),
                fire_at: Utc::now() - chrono::Duration::minutes(5),
                title: REMINDER_TITLE.into(),
                body: "Call the bank".into(),
                category_id: REMINDER_CATEGORY_ID.into(),
            })
            .expect("queue reminder");
        }

        for _ in 0..2 {
            let due = run(&config, CliCommand::Reminders(RemindersArgs { due: true }));
            assert!(due.contains(&id), "missing due reminder in {due:?}");
            assert!(due.contains("Call the bank"));
        }

        let output = run(
            &config,
            CliCommand::Respond(RespondArgs {
                id: id.clone(),
                action: "snooze".into(),
            }),
        );
        assert_eq!(output, format!("Snoozed {id}\n"));
        let due = run(&config, CliCommand::Reminders(RemindersArgs { due: true }));
        assert_eq!(due, "No reminders scheduled.\n");
    }

    #[test]
    fn edit_schedules_reminder_and_respond_completes() {
        let (config, _dir) = temp_config();
        let id = add(&config, "File taxes");
        let output = run(
            &config,
            CliCommand::Edit(EditArgs {
                id: id.clone(),
                deadline: Some("+3h".into()),
                priority: Some(Priority::High),
                notes: Some("Bring W-2".into()),
                ..EditArgs::default()
            }),
        );
        assert!(output.contains("Updated"));
        assert!(output.contains("notes, priority, deadline"));

        let reminders = run(&config, CliCommand::Reminders(RemindersArgs::default()));
        assert!(reminders.contains(&id));
        assert!(reminders.contains("File taxes"));
        let due = run(&config, CliCommand::Reminders(RemindersArgs { due: true }));
        assert_eq!(due, "No reminders scheduled.\n");

        let output = run(
            &config,
            CliCommand::Respond(RespondArgs {
                id: id.clone(),
                action: "complete".into(),
            }),
        );
        assert_eq!(output, format!("Completed {id}\n"));
        let reminders = run(&config, CliCommand::Reminders(RemindersArgs::default()));
        assert_eq!(reminders, "No reminders scheduled.\n");
    }

    #[test]
    fn lead_time_and_notify_update_settings() {
        let (config, _dir) = temp_config();
        let output = run(
            &config,
            CliCommand::LeadTime(LeadTimeArgs {
                choice: "custom".into(),
                minutes: Some("25".into()),
            }),
        );
        assert!(output.ends_with("Reminders fire 25 minutes before deadlines\n"));

        run(&config, CliCommand::Notify(NotifyArgs { state: Switch::Off }));
        let settings = run(&config, CliCommand::Settings);
        assert!(settings.contains("Reminders: off"));
        assert!(settings.contains("Lead time: Custom"));
        assert!(settings.contains("Custom minutes: 25"));
    }

    #[test]
    fn rejects_unknown_deadline_spec() {
        let (config, _dir) = temp_config();
        let id = add(&config, "Vague");
        let mut output = Vec::new();
        let result = execute(
            &config,
            CliCommand::Edit(EditArgs {
                id,
                deadline: Some("eventually".into()),
                ..EditArgs::default()
            }),
            &mut output,
        );
        assert!(result.is_err());
    }
}

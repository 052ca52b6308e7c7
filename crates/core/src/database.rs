use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::config::AppConfig;
use crate::error::{NotifyError, StorageError};
use crate::persistence::SettingsStore;
use crate::reminders::{NotificationCenter, Permission, ReminderRequest};

const PERMISSION_KEY: &str = "notificationPermission";

/// SQLite file backing both the settings store and the local reminder queue.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let conn = Connection::open(config.db_path()).with_context(|| {
            format!("Failed to open database at {}", config.db_path().display())
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to configure SQLite WAL mode")?;

        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Every scheduled reminder, earliest first.
    pub fn pending_reminders(&self) -> Result<Vec<ReminderRequest>, NotifyError> {
        self.query_reminders(
            "SELECT task_id, fire_at, title, body, category_id FROM reminders ORDER BY fire_at, task_id",
        )
    }

    /// Reminders that fired and have not been answered yet.
    pub fn delivered_reminders(&self) -> Result<Vec<ReminderRequest>, NotifyError> {
        self.query_reminders(
            "SELECT task_id, fire_at, title, body, category_id FROM delivered ORDER BY fire_at, task_id",
        )
    }

    /// Delivered reminders plus queued ones whose fire time has been reached at `now`.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        let mut due = self.delivered_reminders()?;
        due.extend(
            self.pending_reminders()?
                .into_iter()
                .filter(|reminder| reminder.fire_at <= now),
        );
        due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.task_id.cmp(&b.task_id)));
        Ok(due)
    }

    fn query_reminders(&self, sql: &str) -> Result<Vec<ReminderRequest>, NotifyError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut reminders = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(reminder) = map_reminder(row)? {
                reminders.push(reminder);
            }
        }
        Ok(reminders)
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS reminders (
                    task_id TEXT PRIMARY KEY,
                    fire_at TEXT NOT NULL,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    category_id TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_reminders_fire_at ON reminders(fire_at);
                 CREATE TABLE IF NOT EXISTS delivered (
                    task_id TEXT PRIMARY KEY,
                    fire_at TEXT NOT NULL,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    category_id TEXT NOT NULL,
                    delivered_at TEXT NOT NULL
                 );
                ",
            )
            .context("Failed to apply database migrations")?;
        Ok(())
    }
}

impl SettingsStore for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = :key",
                named_params![":key": key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (:key, :value, :updated)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            named_params![
                ":key": key,
                ":value": value,
                ":updated": Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl NotificationCenter for Database {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), NotifyError> {
        self.conn.execute(
            "INSERT INTO reminders (task_id, fire_at, title, body, category_id)
             VALUES (:task_id, :fire_at, :title, :body, :category_id)
             ON CONFLICT(task_id) DO UPDATE SET fire_at = excluded.fire_at, title = excluded.title,
                body = excluded.body, category_id = excluded.category_id",
            named_params![
                ":task_id": request.task_id,
                ":fire_at": request.fire_at.to_rfc3339(),
                ":title": request.title,
                ":body": request.body,
                ":category_id": request.category_id,
            ],
        )?;
        Ok(())
    }

    fn cancel(&self, task_id: &str) -> Result<(), NotifyError> {
        self.conn.execute(
            "DELETE FROM reminders WHERE task_id = :task_id",
            named_params![":task_id": task_id],
        )?;
        Ok(())
    }

    /// A local queue needs no OS prompt; the grant is recorded for diagnostics.
    fn request_permission(&self) -> Result<Permission, NotifyError> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (:key, :value, :updated)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            named_params![
                ":key": PERMISSION_KEY,
                ":value": b"\"granted\"".as_slice(),
                ":updated": Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(Permission::Granted)
    }

    fn deliver_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRequest>, NotifyError> {
        let due: Vec<ReminderRequest> = self
            .pending_reminders()?
            .into_iter()
            .filter(|reminder| reminder.fire_at <= now)
            .collect();
        if due.is_empty() {
            return Ok(due);
        }

        let tx = self.conn.unchecked_transaction()?;
        for reminder in &due {
            tx.execute(
                "INSERT INTO delivered (task_id, fire_at, title, body, category_id, delivered_at)
                 VALUES (:task_id, :fire_at, :title, :body, :category_id, :delivered_at)
                 ON CONFLICT(task_id) DO UPDATE SET fire_at = excluded.fire_at, title = excluded.title,
                    body = excluded.body, category_id = excluded.category_id,
                    delivered_at = excluded.delivered_at",
                named_params![
                    ":task_id": reminder.task_id,
                    ":fire_at": reminder.fire_at.to_rfc3339(),
                    ":title": reminder.title,
                    ":body": reminder.body,
                    ":category_id": reminder.category_id,
                    ":delivered_at": now.to_rfc3339(),
                ],
            )?;
            tx.execute(
                "DELETE FROM reminders WHERE task_id = :task_id",
                named_params![":task_id": reminder.task_id],
            )?;
        }
        tx.commit()?;
        Ok(due)
    }

    fn dismiss(&self, task_id: &str) -> Result<(), NotifyError> {
        self.conn.execute(
            "DELETE FROM delivered WHERE task_id = :task_id",
            named_params![":task_id": task_id],
        )?;
        Ok(())
    }
}

fn map_reminder(row: &Row<'_>) -> Result<Option<ReminderRequest>, NotifyError> {
    let task_id: String = row.get(0)?;
    let fire_at: String = row.get(1)?;
    let Some(fire_at) = parse_datetime(&fire_at) else {
        tracing::warn!(task_id = task_id.as_str(), "skipping reminder with unreadable fire time");
        return Ok(None);
    };
    Ok(Some(ReminderRequest {
        task_id,
        fire_at,
        title: row.get(2)?,
        body: row.get(3)?,
        category_id: row.get(4)?,
    }))
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::persistence::{PersistenceBridge, TASKS_KEY};
    use crate::reminders::REMINDER_CATEGORY_ID;
    use crate::services::TaskStore;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_config() -> (AppConfig, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::from_data_dir(dir.path().to_path_buf());
        (config, dir)
    }

    fn reminder(task_id: &str, fire_at: DateTime<Utc>) -> ReminderRequest {
        ReminderRequest {
            task_id: task_id.into(),
            fire_at,
            title: "Task Reminder".into(),
            body: format!("Body for {task_id}"),
            category_id: REMINDER_CATEGORY_ID.into(),
        }
    }

    #[test]
    fn settings_upsert_and_read_back() {
        let db = Database::in_memory().expect("db");
        assert_eq!(db.get("missing").unwrap(), None);
        db.set("key", b"one").unwrap();
        db.set("key", b"two").unwrap();
        assert_eq!(db.get("key").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn forest_survives_reopening_the_file() {
        let (config, _dir) = temp_config();
        let mut task = Task::with_id("a", "Renew passport");
        task.subtasks.push(Task::with_id("b", "Take photo"));
        let forest = vec![task];

        {
            let db = Database::initialize(&config).expect("init db");
            assert!(PersistenceBridge::new(&db).save(&forest));
        }

        let db = Database::initialize(&config).expect("reopen db");
        assert!(db.get(TASKS_KEY).unwrap().is_some());
        assert_eq!(PersistenceBridge::new(&db).load(), forest);
    }

    #[test]
    fn reminders_are_keyed_by_task() {
        let db = Database::in_memory().expect("db");
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();

        db.schedule(&reminder("late", base + Duration::hours(2))).unwrap();
        db.schedule(&reminder("early", base)).unwrap();
        db.schedule(&reminder("early", base + Duration::minutes(30))).unwrap();

        let pending = db.pending_reminders().unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(pending[0].fire_at, base + Duration::minutes(30));

        let due = db.due_reminders(base + Duration::hours(1)).unwrap();
        assert_eq!(due.len(), 1);

        db.cancel("early").unwrap();
        db.cancel("never-scheduled").unwrap();
        assert_eq!(db.pending_reminders().unwrap().len(), 1);
    }

    #[test]
    fn opening_the_store_keeps_reminders_that_came_due() {
        let db = Database::in_memory().expect("db");
        let mut task = Task::new("Call the bank");
        task.deadline = Some(Utc::now() + Duration::minutes(5));
        assert!(PersistenceBridge::new(&db).save(std::slice::from_ref(&task)));
        db.schedule(&reminder(&task.id, Utc::now() - Duration::minutes(5)))
            .unwrap();

        let mut store = TaskStore::open(&db, &db);
        assert!(db.pending_reminders().unwrap().is_empty());
        let due = db.due_reminders(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task_id, task.id);
        assert_eq!(db.delivered_reminders().unwrap(), due);

        // A second launch must not lose the delivered reminder either.
        drop(store);
        store = TaskStore::open(&db, &db);
        assert_eq!(db.due_reminders(Utc::now()).unwrap().len(), 1);

        store.handle_reminder_response(&task.id, "complete");
        assert!(db.due_reminders(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn dismiss_only_touches_the_delivered_set() {
        let db = Database::in_memory().expect("db");
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        db.schedule(&reminder("fired", base)).unwrap();
        db.schedule(&reminder("queued", base + Duration::hours(1))).unwrap();

        let delivered = db.deliver_due(base + Duration::minutes(1)).unwrap();
        assert_eq!(delivered, vec![reminder("fired", base)]);
        assert!(db.deliver_due(base + Duration::minutes(1)).unwrap().is_empty());

        db.dismiss("queued").unwrap();
        assert_eq!(db.pending_reminders().unwrap().len(), 1);
        db.dismiss("fired").unwrap();
        assert!(db.delivered_reminders().unwrap().is_empty());
    }

    #[test]
    fn permission_is_granted_locally() {
        let db = Database::in_memory().expect("db");
        assert_eq!(db.request_permission().unwrap(), Permission::Granted);
        assert_eq!(db.get(PERMISSION_KEY).unwrap(), Some(b"\"granted\"".to_vec()));
    }
}

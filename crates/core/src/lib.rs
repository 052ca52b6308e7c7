//! Task forest, display ordering, deadline reminders, and persistence for gentask.

pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod parser;
pub mod persistence;
pub mod preferences;
pub mod reminders;
pub mod services;
pub mod sort;

pub use config::AppConfig;
pub use database::Database;
pub use error::{NotifyError, ParseError, StorageError};
pub use model::*;
pub use persistence::{MemorySettings, PersistenceBridge, SettingsStore};
pub use preferences::{LeadTime, Preferences, Session};
pub use reminders::{MemoryNotificationCenter, NotificationCenter, ReminderRequest, ReminderScheduler};
pub use services::{ResponseOutcome, StoreEvent, TaskStore};
pub use sort::SortMode;

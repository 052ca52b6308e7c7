//! User preferences and the per-process session context.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ParseError, StorageError};
use crate::model::TaskId;
use crate::parser::parse_lead_time;
use crate::persistence::SettingsStore;

pub const NOTIFICATIONS_ENABLED_KEY: &str = "notificationsEnabled";
pub const LEAD_TIME_KEY: &str = "notificationLeadTime";
pub const CUSTOM_LEAD_MINUTES_KEY: &str = "customLeadTimeMinutes";
pub const HAS_LAUNCHED_BEFORE_KEY: &str = "hasLaunchedBefore";

/// Lead time used when the custom minute count is missing or unusable.
pub const FALLBACK_CUSTOM_MINUTES: u32 = 15;

/// How long before a deadline a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadTime {
    Minutes(u32),
    /// Resolved through the user-entered custom minute count.
    Custom,
}

impl LeadTime {
    pub const PRESETS: [LeadTime; 5] = [
        LeadTime::Minutes(5),
        LeadTime::Minutes(10),
        LeadTime::Minutes(30),
        LeadTime::Minutes(60),
        LeadTime::Custom,
    ];

    pub fn label(&self) -> String {
        match self {
            LeadTime::Minutes(60) => "1 hour".to_string(),
            LeadTime::Minutes(minutes) => format!("{minutes} min"),
            LeadTime::Custom => "Custom".to_string(),
        }
    }
}

impl Default for LeadTime {
    fn default() -> Self {
        LeadTime::Minutes(10)
    }
}

impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for LeadTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_lead_time(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub notifications_enabled: bool,
    pub lead_time: LeadTime,
    /// Raw text as entered; only interpreted when `lead_time` is `Custom`.
    pub custom_lead_minutes: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            lead_time: LeadTime::default(),
            custom_lead_minutes: FALLBACK_CUSTOM_MINUTES.to_string(),
        }
    }
}

impl Preferences {
    pub fn effective_lead_time(&self) -> Duration {
        let minutes = match self.lead_time {
            LeadTime::Minutes(minutes) => minutes,
            LeadTime::Custom => self
                .custom_lead_minutes
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .unwrap_or(FALLBACK_CUSTOM_MINUTES),
        };
        Duration::minutes(i64::from(minutes))
    }

    /// Reads each preference independently, falling back to its default.
    pub fn load<S: SettingsStore>(settings: &S) -> Self {
        let defaults = Self::default();
        Self {
            notifications_enabled: read_or(
                settings,
                NOTIFICATIONS_ENABLED_KEY,
                defaults.notifications_enabled,
            ),
            lead_time: read_or(settings, LEAD_TIME_KEY, defaults.lead_time),
            custom_lead_minutes: read_or(
                settings,
                CUSTOM_LEAD_MINUTES_KEY,
                defaults.custom_lead_minutes,
            ),
        }
    }

    pub fn save<S: SettingsStore>(&self, settings: &S) -> bool {
        let result = write(settings, NOTIFICATIONS_ENABLED_KEY, &self.notifications_enabled)
            .and_then(|_| write(settings, LEAD_TIME_KEY, &self.lead_time))
            .and_then(|_| write(settings, CUSTOM_LEAD_MINUTES_KEY, &self.custom_lead_minutes));
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to save preferences");
                false
            }
        }
    }
}

/// Process-wide mutable context shared by the store and its collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Task currently in inline-edit mode. Never persisted.
    pub editing_task_id: Option<TaskId>,
    pub preferences: Preferences,
}

/// Returns `true` exactly once per settings store: on the first launch.
pub fn take_first_launch<S: SettingsStore>(settings: &S) -> bool {
    if read_or(settings, HAS_LAUNCHED_BEFORE_KEY, false) {
        return false;
    }
    if let Err(err) = write(settings, HAS_LAUNCHED_BEFORE_KEY, &true) {
        warn!(error = %err, "failed to record first launch");
    }
    true
}

fn read_or<S: SettingsStore, T: DeserializeOwned>(settings: &S, key: &str, default: T) -> T {
    match settings.get(key) {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(source) => {
                let err = StorageError::Decode {
                    key: key.to_string(),
                    source,
                };
                warn!(error = %err, "using default preference");
                default
            }
        },
        Ok(None) => default,
        Err(err) => {
            warn!(key, error = %err, "failed to read preference");
            default
        }
    }
}

fn write<S: SettingsStore, T: Serialize>(settings: &S, key: &str, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    settings.set(key, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemorySettings;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("20", 20)]
    #[case(" 7 ", 7)]
    #[case("", 15)]
    #[case("abc", 15)]
    #[case("0", 15)]
    #[case("-5", 15)]
    fn custom_lead_time_falls_back_to_fifteen(#[case] raw: &str, #[case] minutes: i64) {
        let prefs = Preferences {
            lead_time: LeadTime::Custom,
            custom_lead_minutes: raw.to_string(),
            ..Preferences::default()
        };
        assert_eq!(prefs.effective_lead_time(), Duration::minutes(minutes));
    }

    #[test]
    fn defaults_match_first_run() {
        let prefs = Preferences::load(&MemorySettings::new());
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.notifications_enabled);
        assert_eq!(prefs.effective_lead_time(), Duration::minutes(10));
    }

    #[test]
    fn save_and_load_round_trip() {
        let settings = MemorySettings::new();
        let prefs = Preferences {
            notifications_enabled: false,
            lead_time: LeadTime::Custom,
            custom_lead_minutes: "45".into(),
        };
        assert!(prefs.save(&settings));
        assert_eq!(Preferences::load(&settings), prefs);
    }

    #[test]
    fn unreadable_value_uses_default_for_that_key_only() {
        let settings = MemorySettings::new();
        settings.set(LEAD_TIME_KEY, b"???").unwrap();
        settings.set(NOTIFICATIONS_ENABLED_KEY, b"false").unwrap();
        let prefs = Preferences::load(&settings);
        assert_eq!(prefs.lead_time, LeadTime::default());
        assert!(!prefs.notifications_enabled);
    }

    #[test]
    fn first_launch_is_reported_once() {
        let settings = MemorySettings::new();
        assert!(take_first_launch(&settings));
        assert!(!take_first_launch(&settings));
    }

    #[test]
    fn labels_presets() {
        let labels: Vec<String> = LeadTime::PRESETS.iter().map(LeadTime::label).collect();
        assert_eq!(labels, vec!["5 min", "10 min", "30 min", "1 hour", "Custom"]);
    }
}

use chrono::{prelude::*, Duration};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;
use crate::preferences::LeadTime;

static RELATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+(\d{1,6})(m|min|h|d|w)$").expect("valid regex"));
static LEAD_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,5})\s*(m|min|mins|minutes|h|hr|hour|hours)?$").expect("valid regex"));

/// Hour used for date-only deadline specs.
const DEFAULT_DEADLINE_HOUR: u32 = 9;

pub fn parse_deadline(spec: &str) -> Result<DateTime<Utc>, ParseError> {
    parse_deadline_at(spec, Local::now())
}

/// Resolves a deadline spec relative to `now_local`.
pub fn parse_deadline_at<Tz: TimeZone>(
    spec: &str,
    now_local: DateTime<Tz>,
) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    let unrecognized = || ParseError::Date(trimmed.to_string());
    let lower = trimmed.to_ascii_lowercase();
    let tz = now_local.timezone();

    match lower.as_str() {
        "now" => return Ok(now_local.with_timezone(&Utc)),
        "today" => return at_default_hour(&tz, now_local.date_naive()).ok_or_else(unrecognized),
        "tomorrow" => {
            let date = now_local.date_naive() + Duration::days(1);
            return at_default_hour(&tz, date).ok_or_else(unrecognized);
        }
        _ => {}
    }

    if let Some(caps) = RELATIVE_RE.captures(&lower) {
        let value: i64 = caps[1].parse().map_err(|_| unrecognized())?;
        let offset = match &caps[2] {
            "m" | "min" => Duration::minutes(value),
            "h" => Duration::hours(value),
            "d" => Duration::days(value),
            _ => Duration::weeks(value),
        };
        return Ok((now_local + offset).with_timezone(&Utc));
    }

    if let Some(weekday) = parse_weekday(&lower) {
        let mut days_ahead = (weekday.num_days_from_monday() as i64
            - now_local.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if days_ahead == 0 {
            days_ahead = 7;
        }
        let date = now_local.date_naive() + Duration::days(days_ahead);
        return at_default_hour(&tz, date).ok_or_else(unrecognized);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return resolve_local(&tz, naive).ok_or_else(unrecognized);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return at_default_hour(&tz, date).ok_or_else(unrecognized);
    }

    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M") {
        return resolve_local(&tz, now_local.date_naive().and_time(time)).ok_or_else(unrecognized);
    }

    Err(unrecognized())
}

/// Parses a lead-time choice: `5`, `10m`, `1h`, `custom`.
pub fn parse_lead_time(spec: &str) -> Result<LeadTime, ParseError> {
    let lower = spec.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return Err(ParseError::Empty);
    }
    if lower == "custom" {
        return Ok(LeadTime::Custom);
    }
    let caps = LEAD_TIME_RE
        .captures(&lower)
        .ok_or_else(|| ParseError::LeadTime(spec.trim().to_string()))?;
    let value: u32 = caps[1]
        .parse()
        .map_err(|_| ParseError::LeadTime(spec.trim().to_string()))?;
    let minutes = match caps.get(2).map(|unit| unit.as_str()) {
        Some("h" | "hr" | "hour" | "hours") => value.saturating_mul(60),
        _ => value,
    };
    if minutes == 0 {
        return Err(ParseError::LeadTime(spec.trim().to_string()));
    }
    Ok(LeadTime::Minutes(minutes))
}

fn at_default_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(DEFAULT_DEADLINE_HOUR, 0, 0)?;
    resolve_local(tz, naive)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_weekday(label: &str) -> Option<Weekday> {
    match label {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

//! Blocked days on the tenant's booking calendar.
//!
//! Toggling is not idempotent on the server (it flips whatever is stored), so
//! a toggle is sent once and never retried automatically.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

use crate::autosave::OptimisticSet;
use crate::client::{ApiClient, Method, RequestOptions};
use crate::config::ClientConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedDay {
    #[serde(deserialize_with = "de_calendar_date")]
    pub blocked_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    #[serde(deserialize_with = "de_calendar_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToggleRequest<'a> {
    date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Postgres dates come back either as `YYYY-MM-DD` or as the server's local
/// midnight written as an instant. Instants are read as local calendar dates.
fn parse_calendar_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    calendar_date_in(raw, &Local)
}

fn calendar_date_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<NaiveDate, chrono::ParseError> {
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(instant) => Ok(instant.with_timezone(tz).date_naive()),
        // Timestamps without an offset already carry the local date.
        Err(err) => match raw.get(..10) {
            Some(day) if raw.len() > 10 => NaiveDate::parse_from_str(day, "%Y-%m-%d"),
            _ => Err(err),
        },
    }
}

fn de_calendar_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_calendar_date(&raw).map_err(serde::de::Error::custom)
}

/// Schedule endpoints, all bounded by the schedule timeout.
#[derive(Debug, Clone)]
pub struct ScheduleApi {
    client: ApiClient,
    timeout: Duration,
}

impl ScheduleApi {
    pub fn new(client: ApiClient, config: &ClientConfig) -> Self {
        Self {
            client,
            timeout: config.schedule_timeout(),
        }
    }

    /// Blocked days between `start` and `end`, both inclusive.
    pub async fn blocked_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BlockedDay>, ApiError> {
        if end < start {
            return Err(ApiError::Validation(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        let endpoint = format!(
            "/api/schedule/blocked-days?startDate={}&endDate={}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        self.client
            .request(&endpoint, RequestOptions::get().with_timeout(self.timeout))
            .await
    }

    /// Flip the blocked state of `date` on the server.
    pub async fn toggle_blocked_day(
        &self,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<ToggleOutcome, ApiError> {
        let body = ToggleRequest {
            date: date.format("%Y-%m-%d").to_string(),
            reason,
        };
        let options = RequestOptions::json(Method::POST, &body)?.with_timeout(self.timeout);
        self.client
            .request("/api/schedule/blocked-days/toggle", options)
            .await
    }
}

/// Calendar view of blocked days with optimistic toggling.
pub struct BlockedDaysCalendar {
    api: ScheduleApi,
    days: OptimisticSet<NaiveDate>,
}

impl BlockedDaysCalendar {
    pub fn new(api: ScheduleApi) -> Self {
        Self {
            api,
            days: OptimisticSet::default(),
        }
    }

    /// Fetch a range and adopt it unless a toggle is still in flight.
    ///
    /// Returns whether the snapshot was applied.
    pub async fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<bool, ApiError> {
        let days = self.api.blocked_days(start, end).await?;
        Ok(self.days.sync_from_server(days.into_iter().map(|d| d.blocked_date)))
    }

    pub fn is_blocked(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    pub fn blocked(&self) -> BTreeSet<NaiveDate> {
        self.days.snapshot()
    }

    /// Block or unblock `date` immediately; revert if the server rejects it.
    pub async fn toggle(
        &self,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<ToggleOutcome, ApiError> {
        let outcome = self
            .days
            .toggle(date, |_| self.api.toggle_blocked_day(date, reason))
            .await?;

        // The server flips its own state; trust its answer if ours was stale.
        let server_blocked = outcome.action == ToggleAction::Added;
        if self.days.contains(&date) != server_blocked {
            log::warn!(
                "Schedule: {} was {:?} on the server, adopting server state",
                date,
                outcome.action
            );
            self.days.set_membership(date, server_blocked);
        }
        Ok(outcome)
    }
}

//! # Calendar Integration
//!
//! Event types and the `CalendarClient` seam for the user's primary calendar.
//! Every call is scoped to one calendar and authenticated with an OAuth access
//! token obtained through an `AccessTokenSource`.

pub mod google;
pub mod token;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use google::GoogleCalendarClient;
pub use token::{AccessTokenSource, CachedAccessToken, RefreshTokenExchange, StaticAccessToken};

/// Start or end of an event. All-day events use `date`, timed ones `date_time`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    /// True when this time falls on the given calendar day
    pub fn is_on(&self, day: NaiveDate) -> bool {
        if self.date == Some(day) {
            return true;
        }
        let prefix = day.format("%Y-%m-%d").to_string();
        self.date_time
            .as_deref()
            .map(|dt| dt.starts_with(&prefix))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtendedProperties {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub private: BTreeMap<String, String>,
}

/// A calendar event, used both for responses and as a request body.
/// Absent fields are omitted so a partially filled event works as a patch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<ExtendedProperties>,
}

impl CalendarEvent {
    pub fn private_property(&self, key: &str) -> Option<&str> {
        self.extended_properties
            .as_ref()
            .and_then(|p| p.private.get(key))
            .map(String::as_str)
    }
}

/// Bounds of an instance lookup, as RFC 3339 strings
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub min: String,
    pub max: String,
}

impl TimeRange {
    /// The whole UTC day
    pub fn day(date: NaiveDate) -> Self {
        let day = date.format("%Y-%m-%d");
        Self {
            min: format!("{}T00:00:00Z", day),
            max: format!("{}T23:59:59Z", day),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// The event was already deleted
    #[error("calendar event is gone")]
    Gone,
    #[error("calendar event not found")]
    NotFound,
    #[error("calendar API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("calendar request failed: {0}")]
    Transport(String),
    #[error("could not obtain calendar access token: {0}")]
    Token(String),
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError>;

    /// Replace an event entirely
    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError>;

    /// Change only the fields present in `patch`
    async fn patch_event(&self, event_id: &str, patch: &CalendarEvent) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, CalendarError>;

    /// Instances of a recurring event, optionally limited to a time range
    async fn list_instances(
        &self,
        event_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;
}

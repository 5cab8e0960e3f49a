//! # Calendar Sync
//!
//! Translation of todo items into calendar events, and the best-effort
//! operations that keep a synced item's event up to date.
//!
//! A todo is synced while it carries a `calendarEventId`. Completion is shown
//! on the event as a title prefix and recorded in a private extended property;
//! the property decides whether the prefix is present, so completing and then
//! reopening returns any title to exactly what it was.
//!
//! Every operation here swallows calendar failures after logging them. The
//! caller's local write always goes ahead.

use chrono::NaiveDate;
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::integrations::calendar::{
    CalendarClient, CalendarError, CalendarEvent, EventTime, ExtendedProperties, TimeRange,
};
use shared::{TaskFrequency, TodoItem};

pub const COMPLETION_MARKER: &str = "✔ ";
pub const COMPLETED_PROPERTY: &str = "completed";

pub fn mark_completed(title: &str) -> String {
    format!("{}{}", COMPLETION_MARKER, title)
}

/// Strip a single leading completion marker
pub fn mark_reopened(title: &str) -> String {
    title.strip_prefix(COMPLETION_MARKER).unwrap_or(title).to_string()
}

pub fn apply_completion(title: &str, completed: bool) -> String {
    if completed {
        mark_completed(title)
    } else {
        mark_reopened(title)
    }
}

/// Whether an event currently shows as completed. Events without the private
/// property fall back to the title prefix.
pub fn is_completed(event: &CalendarEvent) -> bool {
    match event.private_property(COMPLETED_PROPERTY) {
        Some(flag) => flag == "true",
        None => event
            .summary
            .as_deref()
            .map(|s| s.starts_with(COMPLETION_MARKER))
            .unwrap_or(false),
    }
}

fn completion_properties(completed: bool) -> ExtendedProperties {
    let mut private = BTreeMap::new();
    private.insert(COMPLETED_PROPERTY.to_string(), completed.to_string());
    ExtendedProperties { private }
}

/// The patch that moves `event` into the requested state, or `None` if it is already there
pub fn completion_patch(event: &CalendarEvent, completed: bool) -> Option<CalendarEvent> {
    if is_completed(event) == completed {
        return None;
    }
    let title = event.summary.as_deref().unwrap_or_default();
    Some(CalendarEvent {
        summary: Some(apply_completion(title, completed)),
        extended_properties: Some(completion_properties(completed)),
        ..Default::default()
    })
}

/// `RRULE` for a recurring task. `repeat_until` wins over `occurrences`.
pub fn recurrence_rule(
    frequency: Option<TaskFrequency>,
    repeat_until: Option<NaiveDate>,
    occurrences: Option<u32>,
) -> Option<String> {
    let freq = match frequency? {
        TaskFrequency::OneTime => return None,
        TaskFrequency::Daily => "DAILY",
        TaskFrequency::Weekly => "WEEKLY",
        TaskFrequency::Monthly => "MONTHLY",
    };

    let mut rule = format!("RRULE:FREQ={}", freq);
    if let Some(until) = repeat_until {
        rule.push_str(&format!(";UNTIL={}", until.format("%Y%m%d")));
    } else if let Some(count) = occurrences.filter(|n| *n > 0) {
        rule.push_str(&format!(";COUNT={}", count));
    }
    Some(rule)
}

/// All-day event for a todo on its due date, or on `today` when it has none.
/// The end date is exclusive, so a one-day event ends the following day.
pub fn event_for_todo(todo: &TodoItem, today: NaiveDate) -> CalendarEvent {
    let day = todo.due_date.unwrap_or(today);
    let end = day.succ_opt().unwrap_or(day);
    let recurrence = recurrence_rule(todo.frequency, todo.repeat_until, todo.occurrences).map(|r| vec![r]);

    CalendarEvent {
        summary: Some(if todo.completed {
            mark_completed(&todo.title)
        } else {
            todo.title.clone()
        }),
        description: todo.description.clone().filter(|d| !d.is_empty()),
        start: Some(EventTime::all_day(day)),
        end: Some(EventTime::all_day(end)),
        recurrence,
        extended_properties: Some(completion_properties(todo.completed)),
        ..Default::default()
    }
}

/// Calendar side effects of todo mutations. Without a configured client every
/// operation is a logged no-op.
#[derive(Clone)]
pub struct CalendarSyncService {
    client: Option<Arc<dyn CalendarClient>>,
}

impl CalendarSyncService {
    pub fn new(client: Arc<dyn CalendarClient>) -> Self {
        Self { client: Some(client) }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Option<&Arc<dyn CalendarClient>> {
        if self.client.is_none() {
            warn!("Calendar is not configured; skipping calendar sync");
        }
        self.client.as_ref()
    }

    /// Create the todo's event, or replace it when the todo is already synced.
    /// Returns the event id on success.
    pub async fn sync_task(&self, todo: &TodoItem, today: NaiveDate) -> Option<String> {
        let client = self.client()?;
        let event = event_for_todo(todo, today);

        let result = match &todo.calendar_event_id {
            Some(id) => client.update_event(id, &event).await,
            None => client.create_event(&event).await,
        };
        match result {
            Ok(saved) => {
                info!("Synced todo {} to calendar event {:?}", todo.id, saved.id);
                saved.id.or_else(|| todo.calendar_event_id.clone())
            }
            Err(e) => {
                warn!("Failed to create/update calendar event for todo {}: {}", todo.id, e);
                None
            }
        }
    }

    /// Delete an event. An event that is already gone counts as deleted.
    pub async fn remove_event(&self, event_id: &str) -> bool {
        let Some(client) = self.client() else {
            return false;
        };
        match client.delete_event(event_id).await {
            Ok(()) => true,
            Err(CalendarError::Gone) => {
                info!("Calendar event {} was already deleted", event_id);
                true
            }
            Err(e) => {
                warn!("Failed to delete calendar event {}: {}", event_id, e);
                false
            }
        }
    }

    /// Reflect a todo's completion on its event: the instance on `due` (or
    /// `today`) when one exists, otherwise the master event.
    pub async fn update_completion(
        &self,
        event_id: &str,
        due: Option<NaiveDate>,
        completed: bool,
        today: NaiveDate,
    ) -> bool {
        let Some(client) = self.client() else {
            return false;
        };
        let day = due.unwrap_or(today);
        match self.patch_completion(client.as_ref(), event_id, day, completed).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to update calendar event completion status for {}: {}", event_id, e);
                false
            }
        }
    }

    async fn patch_completion(
        &self,
        client: &dyn CalendarClient,
        event_id: &str,
        day: NaiveDate,
        completed: bool,
    ) -> Result<(), CalendarError> {
        let instances = client.list_instances(event_id, Some(TimeRange::day(day))).await?;
        let target = match find_instance_on(instances, day) {
            Some(instance) => instance,
            None => client.get_event(event_id).await?,
        };

        let target_id = target.id.clone().unwrap_or_else(|| event_id.to_string());
        if let Some(patch) = completion_patch(&target, completed) {
            client.patch_event(&target_id, &patch).await?;
        }
        Ok(())
    }

    /// Mark the occurrence on `day` complete. Does nothing if there is none.
    pub async fn mark_occurrence_complete(&self, event_id: &str, day: NaiveDate) -> bool {
        let Some(client) = self.client() else {
            return false;
        };
        match self.patch_occurrence(client.as_ref(), event_id, day).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to mark calendar occurrence complete: {}", e);
                false
            }
        }
    }

    async fn patch_occurrence(
        &self,
        client: &dyn CalendarClient,
        event_id: &str,
        day: NaiveDate,
    ) -> Result<bool, CalendarError> {
        let instances = client.list_instances(event_id, Some(TimeRange::day(day))).await?;
        let Some(instance) = find_instance_on(instances, day) else {
            info!("No occurrence of {} on {}", event_id, day);
            return Ok(false);
        };
        if let (Some(id), Some(patch)) = (instance.id.as_deref(), completion_patch(&instance, true)) {
            client.patch_event(id, &patch).await?;
        }
        Ok(true)
    }

    /// Mark every occurrence of a recurring event complete. Returns the number patched.
    pub async fn mark_all_occurrences_complete(&self, event_id: &str) -> usize {
        let Some(client) = self.client() else {
            return 0;
        };
        let instances = match client.list_instances(event_id, None).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Failed to mark all calendar occurrences complete: {}", e);
                return 0;
            }
        };

        let mut patched = 0;
        for instance in instances {
            let (Some(id), Some(patch)) = (instance.id.as_deref(), completion_patch(&instance, true)) else {
                continue;
            };
            if let Err(e) = client.patch_event(id, &patch).await {
                warn!("Failed to mark all calendar occurrences complete: {}", e);
                break;
            }
            patched += 1;
        }
        patched
    }
}

fn find_instance_on(instances: Vec<CalendarEvent>, day: NaiveDate) -> Option<CalendarEvent> {
    instances
        .into_iter()
        .find(|ev| ev.start.as_ref().map(|s| s.is_on(day)).unwrap_or(false))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory calendar recording every call
    #[derive(Default)]
    pub(crate) struct FakeCalendar {
        pub events: Mutex<HashMap<String, CalendarEvent>>,
        pub instances: Mutex<HashMap<String, Vec<CalendarEvent>>>,
        pub calls: Mutex<Vec<String>>,
        pub delete_error: Mutex<Option<u16>>,
        pub fail_all: Mutex<bool>,
    }

    impl FakeCalendar {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn event(&self, id: &str) -> Option<CalendarEvent> {
            self.events.lock().unwrap().get(id).cloned()
        }

        fn record(&self, call: String) -> Result<(), CalendarError> {
            self.calls.lock().unwrap().push(call);
            if *self.fail_all.lock().unwrap() {
                return Err(CalendarError::Api { status: 500, message: "down".into() });
            }
            Ok(())
        }

        fn apply_patch(&self, id: &str, patch: &CalendarEvent) -> CalendarEvent {
            let mut events = self.events.lock().unwrap();
            let mut instances = self.instances.lock().unwrap();
            let target = events.get_mut(id).or_else(|| {
                instances
                    .values_mut()
                    .flat_map(|v| v.iter_mut())
                    .find(|e| e.id.as_deref() == Some(id))
            });
            match target {
                Some(ev) => {
                    if patch.summary.is_some() {
                        ev.summary = patch.summary.clone();
                    }
                    if patch.extended_properties.is_some() {
                        ev.extended_properties = patch.extended_properties.clone();
                    }
                    ev.clone()
                }
                None => patch.clone(),
            }
        }
    }

    #[async_trait]
    impl CalendarClient for FakeCalendar {
        async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
            self.record("create".into())?;
            let mut events = self.events.lock().unwrap();
            let id = format!("evt-{}", events.len() + 1);
            let mut saved = event.clone();
            saved.id = Some(id.clone());
            events.insert(id, saved.clone());
            Ok(saved)
        }

        async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
            self.record(format!("update {}", event_id))?;
            let mut saved = event.clone();
            saved.id = Some(event_id.to_string());
            self.events.lock().unwrap().insert(event_id.to_string(), saved.clone());
            Ok(saved)
        }

        async fn patch_event(&self, event_id: &str, patch: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
            self.record(format!("patch {}", event_id))?;
            Ok(self.apply_patch(event_id, patch))
        }

        async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
            self.record(format!("delete {}", event_id))?;
            match *self.delete_error.lock().unwrap() {
                Some(410) => return Err(CalendarError::Gone),
                Some(status) => return Err(CalendarError::Api { status, message: "nope".into() }),
                None => {}
            }
            self.events.lock().unwrap().remove(event_id);
            Ok(())
        }

        async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, CalendarError> {
            self.record(format!("get {}", event_id))?;
            self.event(event_id).ok_or(CalendarError::NotFound)
        }

        async fn list_instances(
            &self,
            event_id: &str,
            range: Option<TimeRange>,
        ) -> Result<Vec<CalendarEvent>, CalendarError> {
            self.record(format!("instances {} {}", event_id, range.map(|r| r.min).unwrap_or_default()))?;
            Ok(self.instances.lock().unwrap().get(event_id).cloned().unwrap_or_default())
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn todo(title: &str) -> TodoItem {
        serde_json::from_value(serde_json::json!({ "id": "t1", "userId": "u", "title": title })).unwrap()
    }

    fn instance(id: &str, date: NaiveDate, summary: &str) -> CalendarEvent {
        CalendarEvent {
            id: Some(id.to_string()),
            summary: Some(summary.to_string()),
            start: Some(EventTime::all_day(date)),
            recurring_event_id: Some("evt-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_marker_round_trip_for_any_title() {
        for title in ["Pay rent", "", "✔ already ticked", "✔✔"] {
            assert_eq!(mark_reopened(&mark_completed(title)), title);
        }
        assert_eq!(mark_completed("Gym"), "✔ Gym");
        assert_eq!(mark_reopened("Gym"), "Gym");
    }

    #[test]
    fn test_completion_patch_toggles_back_to_original() {
        let original = CalendarEvent {
            summary: Some("✔ starts with marker".into()),
            extended_properties: Some(completion_properties(false)),
            ..Default::default()
        };
        let done = completion_patch(&original, true).unwrap();
        assert_eq!(done.summary.as_deref(), Some("✔ ✔ starts with marker"));
        assert_eq!(done.private_property(COMPLETED_PROPERTY), Some("true"));
        assert!(completion_patch(&done, true).is_none());

        let reopened = completion_patch(&done, false).unwrap();
        assert_eq!(reopened.summary, original.summary);
    }

    #[test]
    fn test_legacy_event_uses_title_prefix() {
        let legacy = CalendarEvent {
            summary: Some("✔ Gym".into()),
            ..Default::default()
        };
        assert!(is_completed(&legacy));
        assert!(completion_patch(&legacy, true).is_none());
        assert_eq!(
            completion_patch(&legacy, false).unwrap().summary.as_deref(),
            Some("Gym")
        );
    }

    #[test]
    fn test_recurrence_rule() {
        let until = Some(day(2024, 12, 31));
        assert_eq!(recurrence_rule(Some(TaskFrequency::OneTime), until, Some(3)), None);
        assert_eq!(recurrence_rule(None, None, None), None);
        assert_eq!(
            recurrence_rule(Some(TaskFrequency::Daily), None, None).as_deref(),
            Some("RRULE:FREQ=DAILY")
        );
        assert_eq!(
            recurrence_rule(Some(TaskFrequency::Weekly), None, Some(5)).as_deref(),
            Some("RRULE:FREQ=WEEKLY;COUNT=5")
        );
        assert_eq!(
            recurrence_rule(Some(TaskFrequency::Monthly), until, Some(5)).as_deref(),
            Some("RRULE:FREQ=MONTHLY;UNTIL=20241231")
        );
        assert_eq!(
            recurrence_rule(Some(TaskFrequency::Daily), None, Some(0)).as_deref(),
            Some("RRULE:FREQ=DAILY")
        );
    }

    #[test]
    fn test_event_for_todo_defaults_to_today() {
        let today = day(2024, 5, 1);
        let mut item = todo("Water plants");
        item.frequency = Some(TaskFrequency::Weekly);
        item.occurrences = Some(4);

        let event = event_for_todo(&item, today);
        assert_eq!(event.summary.as_deref(), Some("Water plants"));
        assert_eq!(event.start, Some(EventTime::all_day(today)));
        assert_eq!(event.end, Some(EventTime::all_day(day(2024, 5, 2))));
        assert_eq!(event.recurrence, Some(vec!["RRULE:FREQ=WEEKLY;COUNT=4".to_string()]));
        assert_eq!(event.private_property(COMPLETED_PROPERTY), Some("false"));

        item.due_date = Some(day(2024, 6, 9));
        assert_eq!(event_for_todo(&item, today).start, Some(EventTime::all_day(day(2024, 6, 9))));
    }

    #[tokio::test]
    async fn test_sync_task_creates_then_updates() {
        let calendar = Arc::new(FakeCalendar::default());
        let sync = CalendarSyncService::new(calendar.clone());
        let today = day(2024, 5, 1);

        let mut item = todo("Call bank");
        let id = sync.sync_task(&item, today).await.unwrap();
        assert_eq!(id, "evt-1");

        item.calendar_event_id = Some(id.clone());
        item.title = "Call bank again".into();
        assert_eq!(sync.sync_task(&item, today).await.as_deref(), Some("evt-1"));
        assert_eq!(calendar.calls(), vec!["create", "update evt-1"]);
        assert_eq!(
            calendar.event("evt-1").unwrap().summary.as_deref(),
            Some("Call bank again")
        );
    }

    #[tokio::test]
    async fn test_remove_event_treats_gone_as_success() {
        let calendar = Arc::new(FakeCalendar::default());
        let sync = CalendarSyncService::new(calendar.clone());

        *calendar.delete_error.lock().unwrap() = Some(410);
        assert!(sync.remove_event("evt-9").await);

        *calendar.delete_error.lock().unwrap() = Some(500);
        assert!(!sync.remove_event("evt-9").await);
    }

    #[tokio::test]
    async fn test_completion_patches_matching_instance() {
        let calendar = Arc::new(FakeCalendar::default());
        let due = day(2024, 5, 8);
        calendar.instances.lock().unwrap().insert(
            "evt-1".into(),
            vec![instance("evt-1_0501", day(2024, 5, 1), "Gym"), instance("evt-1_0508", due, "Gym")],
        );
        let sync = CalendarSyncService::new(calendar.clone());

        assert!(sync.update_completion("evt-1", Some(due), true, day(2024, 5, 1)).await);
        let calls = calendar.calls();
        assert_eq!(calls[0], "instances evt-1 2024-05-08T00:00:00Z");
        assert_eq!(calls[1], "patch evt-1_0508");
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_completion_falls_back_to_master_event() {
        let calendar = Arc::new(FakeCalendar::default());
        calendar.events.lock().unwrap().insert(
            "evt-1".into(),
            CalendarEvent {
                id: Some("evt-1".into()),
                summary: Some("Renew passport".into()),
                ..Default::default()
            },
        );
        let sync = CalendarSyncService::new(calendar.clone());
        let today = day(2024, 5, 1);

        assert!(sync.update_completion("evt-1", None, true, today).await);
        assert_eq!(
            calendar.calls(),
            vec!["instances evt-1 2024-05-01T00:00:00Z", "get evt-1", "patch evt-1"]
        );
        assert_eq!(
            calendar.event("evt-1").unwrap().summary.as_deref(),
            Some("✔ Renew passport")
        );

        assert!(sync.update_completion("evt-1", None, false, today).await);
        assert_eq!(
            calendar.event("evt-1").unwrap().summary.as_deref(),
            Some("Renew passport")
        );
    }

    #[tokio::test]
    async fn test_mark_all_occurrences_skips_completed() {
        let calendar = Arc::new(FakeCalendar::default());
        calendar.instances.lock().unwrap().insert(
            "evt-1".into(),
            vec![
                instance("a", day(2024, 5, 1), "✔ Gym"),
                instance("b", day(2024, 5, 8), "Gym"),
                instance("c", day(2024, 5, 15), "Gym"),
            ],
        );
        let sync = CalendarSyncService::new(calendar.clone());

        assert_eq!(sync.mark_all_occurrences_complete("evt-1").await, 2);
        assert!(sync.mark_occurrence_complete("evt-1", day(2024, 5, 8)).await);
        assert!(!sync.mark_occurrence_complete("evt-1", day(2024, 6, 8)).await);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let calendar = Arc::new(FakeCalendar::default());
        *calendar.fail_all.lock().unwrap() = true;
        let sync = CalendarSyncService::new(calendar.clone());
        let today = day(2024, 5, 1);

        assert_eq!(sync.sync_task(&todo("x"), today).await, None);
        assert!(!sync.update_completion("evt-1", None, true, today).await);
        assert_eq!(sync.mark_all_occurrences_complete("evt-1").await, 0);

        let disabled = CalendarSyncService::disabled();
        assert_eq!(disabled.sync_task(&todo("x"), today).await, None);
        assert!(!disabled.remove_event("evt-1").await);
    }
}

//! # Todo Service
//!
//! The todo list, with optional calendar sync for each item.
//!
//! ## Key Responsibilities
//! - Validate and persist todos for the signed-in user
//! - Create, replace, or delete the item's calendar event as it is edited
//! - Reflect completion on the calendar, per occurrence for recurring items
//!
//! The local write always happens first and always counts; calendar work that
//! follows it is best-effort.

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use log::{info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::auth_service::AuthState;
use crate::domain::calendar_sync::CalendarSyncService;
use crate::domain::validation::{check_due_date, require_text, ValidationError};
use crate::storage::Repository;
use shared::{SaveTodoRequest, TodoItem};

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct TodoService {
    todos: Repository<TodoItem>,
    auth: AuthState,
    calendar: CalendarSyncService,
    today: Clock,
}

impl TodoService {
    pub fn new(todos: Repository<TodoItem>, auth: AuthState, calendar: CalendarSyncService) -> Self {
        Self {
            todos,
            auth,
            calendar,
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replace the source of "today" used for due-date checks and event dates
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// The user's todos, open items first, otherwise in store order
    pub async fn list(&self) -> Result<Vec<TodoItem>> {
        let user = self.auth.require_user()?;
        let mut todos = self.todos.list_for_user(&user.uid).await?;
        todos.sort_by_key(|t| t.completed);
        Ok(todos)
    }

    pub async fn get(&self, id: &str) -> Result<TodoItem> {
        let user = self.auth.require_user()?;
        self.todos.get_for_user(&user.uid, id).await
    }

    pub async fn add(&self, request: SaveTodoRequest) -> Result<TodoItem> {
        info!("Adding todo {:?}", request.title);
        let user = self.auth.require_user()?;
        let today = self.today();
        validate(&request, today)?;

        let mut todo = TodoItem {
            id: String::new(),
            user_id: user.uid,
            completed: false,
            calendar_event_id: None,
            created_at: Some(Utc::now()),
            ..apply(TodoItem::default(), request)
        };
        todo.id = self.todos.create(&todo).await?;

        if todo.wants_calendar() {
            if let Some(event_id) = self.calendar.sync_task(&todo, today).await {
                self.store_event_id(&todo.id, Some(&event_id)).await;
                todo.calendar_event_id = Some(event_id);
            }
        }
        Ok(todo)
    }

    /// Save an edit. Keeping `addToCalendar` re-syncs the event; clearing
    /// it on a synced item deletes the event.
    pub async fn edit(&self, id: &str, request: SaveTodoRequest) -> Result<TodoItem> {
        info!("Editing todo {}", id);
        let existing = self.get(id).await?;
        let today = self.today();
        validate(&request, today)?;

        let mut todo = apply(existing, request);
        self.todos.update(id, &todo).await?;

        if todo.wants_calendar() {
            if let Some(event_id) = self.calendar.sync_task(&todo, today).await {
                if todo.calendar_event_id.as_deref() != Some(event_id.as_str()) {
                    self.store_event_id(id, Some(&event_id)).await;
                    todo.calendar_event_id = Some(event_id);
                }
            }
        } else if let Some(event_id) = todo.calendar_event_id.clone() {
            if self.calendar.remove_event(&event_id).await {
                self.store_event_id(id, None).await;
                todo.calendar_event_id = None;
            }
        }
        Ok(todo)
    }

    /// Flip completion and mirror it on the calendar event if there is one
    pub async fn toggle(&self, id: &str) -> Result<TodoItem> {
        let mut todo = self.get(id).await?;
        todo.completed = !todo.completed;
        info!("Marking todo {} completed={}", id, todo.completed);
        self.set_completed(id, todo.completed).await?;

        if let Some(event_id) = &todo.calendar_event_id {
            self.calendar
                .update_completion(event_id, todo.due_date, todo.completed, self.today())
                .await;
        }
        Ok(todo)
    }

    /// Delete the calendar event (best-effort), then the todo
    pub async fn remove(&self, id: &str) -> Result<()> {
        info!("Removing todo {}", id);
        let todo = self.get(id).await?;
        if let Some(event_id) = &todo.calendar_event_id {
            self.calendar.remove_event(event_id).await;
        }
        self.todos.delete(id).await
    }

    /// Complete the todo and every occurrence of its calendar event.
    /// Returns the number of occurrences patched.
    pub async fn complete_all(&self, id: &str) -> Result<usize> {
        info!("Completing all occurrences of todo {}", id);
        let todo = self.get(id).await?;
        self.set_completed(id, true).await?;

        let patched = match &todo.calendar_event_id {
            Some(event_id) => self.calendar.mark_all_occurrences_complete(event_id).await,
            None => 0,
        };
        Ok(patched)
    }

    /// Complete the calendar occurrence of the todo on `day`. Returns whether
    /// an occurrence was found and marked.
    pub async fn complete_occurrence(&self, id: &str, day: NaiveDate) -> Result<bool> {
        info!("Completing occurrence of todo {} on {}", id, day);
        let todo = self.get(id).await?;
        let Some(event_id) = &todo.calendar_event_id else {
            warn!("Todo {} has no calendar event", id);
            return Ok(false);
        };
        Ok(self.calendar.mark_occurrence_complete(event_id, day).await)
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("completed".to_string(), Value::Bool(completed));
        self.todos.update_fields(id, fields).await
    }

    /// Record (or clear) the event id. The event already exists remotely, so
    /// a failure here is only logged.
    async fn store_event_id(&self, id: &str, event_id: Option<&str>) {
        let mut fields = Map::new();
        fields.insert(
            "calendarEventId".to_string(),
            event_id.map_or(Value::Null, |e| Value::String(e.to_string())),
        );
        if let Err(e) = self.todos.update_fields(id, fields).await {
            warn!("Failed to store calendar event id for todo {}: {:#}", id, e);
        }
    }
}

fn validate(request: &SaveTodoRequest, today: NaiveDate) -> Result<(), ValidationError> {
    require_text("title", &request.title)?;
    check_due_date(request.due_date, today)?;
    let recurring = request.frequency.map(|f| f.is_recurring()).unwrap_or(false);
    if recurring && request.occurrences == Some(0) {
        return Err(ValidationError::ZeroOccurrences);
    }
    Ok(())
}

/// Copy the form fields onto `todo`, leaving identity and state untouched
fn apply(todo: TodoItem, request: SaveTodoRequest) -> TodoItem {
    let recurring = request.frequency.map(|f| f.is_recurring()).unwrap_or(false);
    TodoItem {
        title: request.title.trim().to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        due_date: request.due_date,
        frequency: request.frequency,
        add_to_calendar: Some(request.add_to_calendar),
        repeat_until: request.repeat_until.filter(|_| recurring),
        occurrences: request.occurrences.filter(|_| recurring),
        ..todo
    }
}

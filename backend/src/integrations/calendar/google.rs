//! Google Calendar v3 REST client.

use async_trait::async_trait;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::token::AccessTokenSource;
use super::{CalendarClient, CalendarError, CalendarEvent, TimeRange};

pub const DEFAULT_CALENDAR_URL: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancesPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    next_page_token: Option<String>,
}

impl GoogleCalendarClient {
    pub fn new(base_url: &str, tokens: Arc<dyn AccessTokenSource>) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            calendar_id: "primary".to_string(),
            tokens,
        })
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), event_id)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, CalendarError> {
        let token = self.tokens.access_token().await?;
        let response = builder
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CalendarError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status.as_u16() {
            410 => Err(CalendarError::Gone),
            404 => Err(CalendarError::NotFound),
            code => {
                if code == 401 {
                    self.tokens.invalidate().await;
                }
                let message = response.text().await.unwrap_or_default();
                error!("Calendar API error {}: {}", code, message);
                Err(CalendarError::Api { status: code, message })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, CalendarError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CalendarError::Transport(e.to_string()))
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn create_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        debug!("Creating calendar event {:?}", event.summary);
        self.send_json(self.http.post(self.events_url()).json(event)).await
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        debug!("Updating calendar event {}", event_id);
        self.send_json(self.http.put(self.event_url(event_id)).json(event)).await
    }

    async fn patch_event(&self, event_id: &str, patch: &CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        debug!("Patching calendar event {}", event_id);
        self.send_json(self.http.patch(self.event_url(event_id)).json(patch)).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        debug!("Deleting calendar event {}", event_id);
        self.send(self.http.delete(self.event_url(event_id))).await?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, CalendarError> {
        self.send_json(self.http.get(self.event_url(event_id))).await
    }

    async fn list_instances(
        &self,
        event_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = format!("{}/instances", self.event_url(event_id));
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url);
            if let Some(range) = &range {
                request = request.query(&[("timeMin", range.min.as_str()), ("timeMax", range.max.as_str())]);
            }
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: InstancesPage = self.send_json(request).await?;
            instances.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(instances)
    }
}

//! Google Calendar event source.
//!
//! Reads the calendar list and each calendar's expanded event instances via
//! the Calendar v3 REST API, following `nextPageToken` until exhausted.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::credentials::{StoredToken, SERVICE_NAME};
use crate::error::{AuthError, SourceError};
use crate::storage::config::{GoogleConfig, MAX_PAGE_SIZE};
use crate::tracking::{CalendarInfo, CalendarSource, RawEvent};

/// Shown for calendars without a title.
const UNKNOWN_CALENDAR: &str = "Unknown";

/// Google Calendar implementation of [`CalendarSource`].
pub struct GoogleCalendarSource {
    client: Client,
    base_url: Url,
    token: Option<StoredToken>,
    page_size: u32,
}

impl GoogleCalendarSource {
    /// Build a source against `config.api_base_url`.
    ///
    /// A missing or expired `token` is reported by
    /// [`check_auth`](CalendarSource::check_auth), not here.
    pub fn new(config: &GoogleConfig, token: Option<StoredToken>) -> Result<Self, SourceError> {
        let base_url = Url::parse(&config.api_base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token,
            page_size: MAX_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// `base` plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::Malformed(format!("cannot extend {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value, SourceError> {
        let token = self
            .token
            .as_ref()
            .ok_or(SourceError::Unauthorized { status: 401 })?;

        debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))
    }

    /// Collect `items` from every page of a list endpoint.
    ///
    /// A `nextPageToken` that was already followed is reported as malformed.
    async fn get_all_pages(&self, base: Url) -> Result<Vec<Value>, SourceError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let mut url = base.clone();
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let mut body = self.get_json(url).await?;
            match body.get_mut("items").map(Value::take) {
                Some(Value::Array(mut page)) => items.append(&mut page),
                Some(Value::Null) | None => {}
                Some(_) => return Err(SourceError::Malformed("items is not an array".into())),
            }

            match body["nextPageToken"].as_str() {
                None | Some("") => return Ok(items),
                Some(next) if !seen_tokens.insert(next.to_string()) => {
                    return Err(SourceError::Malformed(format!(
                        "nextPageToken {next:?} repeated"
                    )));
                }
                Some(next) => page_token = Some(next.to_string()),
            }
        }
    }
}

/// Pull `error.message` out of a Google error body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

fn to_calendar(item: &Value) -> Option<CalendarInfo> {
    let id = item["id"].as_str()?;
    Some(CalendarInfo {
        id: id.to_string(),
        name: item["summary"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_CALENDAR)
            .to_string(),
    })
}

/// `dateTime` for timed events, `date` for all-day ones.
fn event_time(value: &Value) -> Option<String> {
    value["dateTime"]
        .as_str()
        .or_else(|| value["date"].as_str())
        .map(String::from)
}

fn to_raw_event(item: &Value, calendar: &CalendarInfo) -> RawEvent {
    RawEvent {
        id: item["id"].as_str().unwrap_or_default().to_string(),
        summary: item["summary"].as_str().unwrap_or_default().to_string(),
        start: event_time(&item["start"]),
        end: event_time(&item["end"]),
        all_day: item["start"]["dateTime"].as_str().is_none(),
        calendar_id: calendar.id.clone(),
        calendar_name: calendar.name.clone(),
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    fn check_auth(&self) -> Result<(), AuthError> {
        match &self.token {
            None => Err(AuthError::NotAuthenticated {
                service: SERVICE_NAME.to_string(),
            }),
            Some(token) if token.is_expired() => Err(AuthError::TokenExpired {
                service: SERVICE_NAME.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, SourceError> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let items = self.get_all_pages(url).await?;
        Ok(items.iter().filter_map(to_calendar).collect())
    }

    async fn list_events(
        &self,
        calendar: &CalendarInfo,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let mut url = self.endpoint(&["calendars", calendar.id.as_str(), "events"])?;
        url.query_pairs_mut()
            .append_pair("timeMin", &time_min.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("timeMax", &time_max.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime")
            .append_pair("maxResults", &self.page_size.to_string());

        let items = self.get_all_pages(url).await?;
        debug!(calendar_id = %calendar.id, count = items.len(), "events fetched");
        Ok(items.iter().map(|item| to_raw_event(item, calendar)).collect())
    }
}

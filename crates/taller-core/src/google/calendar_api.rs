//! Google Calendar API v3 Client

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::{extract_array, path_segment};
use crate::common::Error;

pub struct CalendarApi {
    client: GoogleClient,
    base_url: String,
}

super::google_api_wrapper!(CalendarApi);

impl CalendarApi {
    /// Create a timed event and return its `htmlLink`.
    ///
    /// `start` and `end` are RFC 3339 date-times interpreted in `timezone`
    /// when they carry no offset.
    pub async fn create_event(
        &self,
        calendar_id: &str,
        summary: &str,
        start: &str,
        end: &str,
        timezone: &str,
    ) -> Result<String, Error> {
        info!(%calendar_id, %summary, "Creating calendar event");

        let event = json!({
            "summary": summary,
            "start": { "dateTime": start, "timeZone": timezone },
            "end": { "dateTime": end, "timeZone": timezone },
        });

        let url = format!("{}/calendars/{}/events", self.base_url, path_segment(calendar_id));
        let created = self.client.post(&url, &event).await?;

        let link = created
            .get("htmlLink")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Upstream("Created event has no htmlLink".to_string()))?;

        debug!(id = ?created.get("id"), "Event created");
        Ok(link.to_string())
    }

    /// List single-occurrence events starting within `days` days of `now`,
    /// earliest first.
    ///
    /// Google's `timeMin` also admits events already in progress, so the
    /// response is filtered again on start time. All-day events start at
    /// midnight UTC of their date.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Value>, Error> {
        info!(%calendar_id, days, "Listing calendar events");

        let window_end = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_add_signed(span))
            .ok_or_else(|| Error::Validation(format!("days={} is out of range", days)))?;
        let query = [
            ("timeMin", now.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ("timeMax", window_end.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];

        let url = format!("{}/calendars/{}/events", self.base_url, path_segment(calendar_id));
        let response = self.client.get(&url, &query).await?;

        let events = within_window(extract_array(&response, "items"), now, window_end);
        debug!("Retrieved {} events", events.len());
        Ok(events)
    }
}

/// When an event starts: a timed start, or an all-day date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventStart {
    At(DateTime<Utc>),
    AllDay(NaiveDate),
}

impl EventStart {
    fn of(event: &Value) -> Option<Self> {
        let start = event.get("start")?;
        if let Some(raw) = start.get("dateTime").and_then(|v| v.as_str()) {
            return DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| EventStart::At(dt.with_timezone(&Utc)));
        }
        start
            .get("date")
            .and_then(|v| v.as_str())
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .map(EventStart::AllDay)
    }

    fn in_window(self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        let at = self.instant();
        from <= at && at <= to
    }

    /// All-day events start at midnight UTC of their date.
    fn instant(self) -> DateTime<Utc> {
        match self {
            EventStart::At(at) => at,
            EventStart::AllDay(date) => date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        }
    }
}

/// Keep events whose start lies in `[from, to]`, stably sorted by start.
/// Events without a readable start are dropped.
fn within_window(events: Vec<Value>, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Value> {
    let mut kept: Vec<(DateTime<Utc>, Value)> = events
        .into_iter()
        .filter_map(|event| {
            let start = EventStart::of(&event)?;
            start.in_window(from, to).then(|| (start.instant(), event))
        })
        .collect();

    kept.sort_by_key(|(key, _)| *key);
    kept.into_iter().map(|(_, event)| event).collect()
}

use crate::powerbi::client::{PowerBiClient, PowerBiError};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Guards against a service that never reports `lastResultSet`.
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivityEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityEventsPage {
    #[serde(default)]
    activity_event_entities: Vec<ActivityEvent>,
    #[serde(default)]
    continuation_uri: Option<String>,
    #[serde(default)]
    last_result_set: bool,
}

#[derive(Debug, Clone)]
pub struct ActivityQuery {
    pub start: DateTime<Utc>,
    /// Defaults to the last millisecond of the start's UTC day; the API rejects windows spanning days.
    pub end: Option<DateTime<Utc>>,
    /// Activity name, e.g. `ViewReport`.
    pub activity: Option<String>,
    pub user_id: Option<String>,
}

impl ActivityQuery {
    pub fn starting(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            activity: None,
            user_id: None,
        }
    }

    /// The `[start, end]` window; an explicit end must fall on the start's UTC day.
    pub fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), PowerBiError> {
        let Some(end) = self.end else {
            let last_ms = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
            return Ok((self.start, self.start.date_naive().and_time(last_ms).and_utc()));
        };

        if end < self.start {
            return Err(PowerBiError::InvalidArgument(format!(
                "activity window end {} is before start {}",
                end.to_rfc3339(),
                self.start.to_rfc3339()
            )));
        }
        if end.date_naive() != self.start.date_naive() {
            return Err(PowerBiError::InvalidArgument(format!(
                "activity window must stay within one UTC day, got {} to {}",
                self.start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok((self.start, end))
    }

    pub fn filter(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(activity) = &self.activity {
            clauses.push(format!("Activity eq '{}'", activity));
        }
        if let Some(user_id) = &self.user_id {
            clauses.push(format!("UserId eq '{}'", user_id));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" and "))
        }
    }

    fn path(&self) -> Result<String, PowerBiError> {
        let (start, end) = self.window()?;
        let mut path = format!(
            "activityevents?startDateTime={}&endDateTime={}",
            urlencoding::encode(&quoted_timestamp(start)),
            urlencoding::encode(&quoted_timestamp(end))
        );
        if let Some(filter) = self.filter() {
            path.push_str(&format!("&$filter={}", urlencoding::encode(&filter)));
        }
        Ok(path)
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date_time(value: &str) -> Result<DateTime<Utc>, PowerBiError> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::default()).and_utc())
        .map_err(|_| {
            PowerBiError::InvalidArgument(format!(
                "expected YYYY-MM-DD or an RFC 3339 timestamp, got '{}'",
                value
            ))
        })
}

fn quoted_timestamp(at: DateTime<Utc>) -> String {
    format!("'{}'", at.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
}

/// Parse one response body: a JSON page, or newline-delimited events.
fn parse_page(body: &str) -> Result<ActivityEventsPage, PowerBiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(ActivityEventsPage {
            last_result_set: true,
            ..ActivityEventsPage::default()
        });
    }

    // A single object is a page when it carries any page field, even with no events.
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed)
        && ["activityEventEntities", "continuationUri", "lastResultSet"]
            .iter()
            .any(|key| object.contains_key(*key))
    {
        return Ok(serde_json::from_value(Value::Object(object))?);
    }

    let events = trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<ActivityEvent>, _>>()?;
    Ok(ActivityEventsPage {
        activity_event_entities: events,
        continuation_uri: None,
        last_result_set: true,
    })
}

/// Audit events for one UTC day, following continuation links to the end.
pub async fn get_activity_events(
    client: &PowerBiClient,
    query: &ActivityQuery,
) -> Result<Vec<ActivityEvent>, PowerBiError> {
    let mut events = Vec::new();
    let mut url = client.admin_url(&query.path()?);

    for page_number in 1..=MAX_PAGES {
        let body = client.get_text(&url).await?;
        let page = parse_page(&body)?;
        log::debug!(
            "Activity page {}: {} events",
            page_number,
            page.activity_event_entities.len()
        );
        events.extend(page.activity_event_entities);

        match page.continuation_uri {
            Some(next) if !page.last_result_set => url = next,
            _ => return Ok(events),
        }
    }

    log::warn!(
        "Stopped following activity continuation after {} pages",
        MAX_PAGES
    );
    Ok(events)
}

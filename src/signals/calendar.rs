use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::CONFIG;
use crate::utils::http::get_http_client;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars/";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MAX_EVENTS: u32 = 3;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The `authorized_user` token file written by Google's installed-app flow.
#[derive(Debug, Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
}

/// `timeMin`/`timeMax` bounds for the requested day.
pub fn day_window(date: NaiveDate) -> (String, String) {
    let day = date.format("%Y-%m-%d");
    (
        format!("{day}T14:00:00.000000Z"),
        format!("{day}T23:59:59.999999Z"),
    )
}

/// Titles worth putting in the prompt, in calendar order.
pub fn usable_summaries(events: &[CalendarEvent], ignored_recurring_ids: &[String]) -> Vec<String> {
    events
        .iter()
        .filter(|event| {
            event
                .recurring_event_id
                .as_ref()
                .map(|id| !ignored_recurring_ids.iter().any(|ignored| ignored == id))
                .unwrap_or(true)
        })
        .filter_map(|event| event.summary.as_deref())
        .map(str::trim)
        .filter(|summary| !summary.is_empty())
        .map(str::to_string)
        .collect()
}

fn events_url(calendar_id: &str, date: NaiveDate) -> Result<Url> {
    let mut url = Url::parse(CALENDAR_API_BASE)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Calendar API base URL cannot take path segments"))?
        .pop_if_empty()
        .push(calendar_id)
        .push("events");

    let (time_min, time_max) = day_window(date);
    let query = serde_urlencoded::to_string([
        ("timeMin", time_min),
        ("timeMax", time_max),
        ("maxResults", MAX_EVENTS.to_string()),
        ("singleEvents", "true".to_string()),
        ("orderBy", "startTime".to_string()),
    ])?;
    url.set_query(Some(&query));
    Ok(url)
}

fn read_authorized_user(path: &Path) -> Result<AuthorizedUser> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calendar token {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Calendar token {} is not an authorized-user file", path.display()))
}

async fn refresh_access_token(user: &AuthorizedUser) -> Result<String> {
    let response = get_http_client()
        .post(&user.token_uri)
        .form(&[
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "Token refresh failed with status {}",
            response.status()
        ));
    }
    Ok(response.json::<TokenResponse>().await?.access_token)
}

async fn fetch_events(date: NaiveDate) -> Result<Vec<CalendarEvent>> {
    let user = read_authorized_user(&CONFIG.google_token_path)?;
    let access_token = refresh_access_token(&user).await?;
    let url = events_url(&CONFIG.google_calendar_id, date)?;

    let response = get_http_client()
        .get(url)
        .bearer_auth(access_token)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Calendar API returned {}: {}", status, body.trim()));
    }
    Ok(response.json::<EventsPage>().await?.items)
}

/// Event titles for the day; unavailable calendars yield nothing.
pub async fn event_summaries(date: NaiveDate) -> Vec<String> {
    match fetch_events(date).await {
        Ok(events) => {
            let summaries = usable_summaries(&events, &CONFIG.calendar_ignored_recurring_ids);
            if summaries.is_empty() {
                info!("No upcoming events found for calendar.");
            } else {
                info!("Upcoming events found for calendar: {}", summaries.join("; "));
            }
            summaries
        }
        Err(err) => {
            warn!("Skipping calendar: {:#}", err);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(summary: Option<&str>, recurring: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            summary: summary.map(str::to_string),
            recurring_event_id: recurring.map(str::to_string),
        }
    }

    #[test]
    fn builds_events_url_with_encoded_calendar_id() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 25).unwrap();
        let url = events_url("family#holiday@group.v.calendar.google.com", date).unwrap();
        assert_eq!(
            url.path(),
            "/calendar/v3/calendars/family%23holiday@group.v.calendar.google.com/events"
        );
        let query = url.query().unwrap();
        assert!(query.contains("timeMin=2023-11-25T14%3A00%3A00.000000Z"));
        assert!(query.contains("maxResults=3"));
        assert!(query.contains("orderBy=startTime"));
    }

    #[test]
    fn skips_ignored_and_untitled_events() {
        let events = vec![
            event(Some("Dentist"), None),
            event(Some("Trash day"), Some("weekly-trash")),
            event(None, None),
            event(Some("  "), None),
            event(Some(" Book club "), Some("monthly-books")),
        ];
        let summaries = usable_summaries(&events, &["weekly-trash".to_string()]);
        assert_eq!(summaries, vec!["Dentist", "Book club"]);
    }

    #[test]
    fn parses_events_page() {
        let page: EventsPage = serde_json::from_str(
            r#"{"items":[{"summary":"Launch","recurringEventId":"abc","start":{"date":"2023-11-25"}}]}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].recurring_event_id.as_deref(), Some("abc"));

        let empty: EventsPage = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn token_file_defaults_token_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"client_id":"id","client_secret":"secret","refresh_token":"refresh"}"#,
        )
        .unwrap();
        let user = read_authorized_user(&path).unwrap();
        assert_eq!(user.token_uri, DEFAULT_TOKEN_URI);

        assert!(read_authorized_user(&dir.path().join("missing.json")).is_err());
    }
}

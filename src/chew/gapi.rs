//! Google Calendar (gapi) event mapping.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::model::event::{make_attendee_info, make_identity_info};
use crate::model::{AttendeeInfo, BodyType, CalendarEvent, IdentityInfo, ResponseStatus};

use super::content::process_event_content;
use super::links::{conference_info, ConferenceHints, ConferenceSolution, LinkConfig};
use super::{EventChewer, EventContext};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub html_link: Option<String>,
    pub start: Option<GapiTime>,
    pub end: Option<GapiTime>,
    pub creator: Option<GapiPerson>,
    pub organizer: Option<GapiPerson>,
    pub attendees: Vec<GapiAttendee>,
    pub conference_data: Option<GapiConferenceData>,
}

/// Either a timed (`dateTime`) or all-day (`date`) boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiPerson {
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "self")]
    pub is_self: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiAttendee {
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "self")]
    pub is_self: bool,
    pub organizer: bool,
    pub resource: bool,
    pub optional: bool,
    pub response_status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiConferenceData {
    pub conference_solution: Option<GapiConferenceSolution>,
    pub entry_points: Vec<GapiEntryPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapiConferenceSolution {
    pub name: String,
    pub icon_uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GapiEntryPoint {
    pub uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct GapiChewer {
    pub links: LinkConfig,
}

impl GapiChewer {
    pub fn new(links: LinkConfig) -> Self {
        Self { links }
    }
}

fn chew_identity(raw: Option<&GapiPerson>) -> IdentityInfo {
    match raw {
        Some(p) => make_identity_info(p.display_name.clone(), p.email.clone(), p.is_self),
        None => IdentityInfo::default(),
    }
}

fn chew_attendee(raw: &GapiAttendee) -> AttendeeInfo {
    let identity = make_identity_info(raw.display_name.clone(), raw.email.clone(), raw.is_self);
    let status = raw
        .response_status
        .as_deref()
        .map_or(ResponseStatus::NeedsAction, ResponseStatus::from_gapi);
    AttendeeInfo {
        is_organizer: raw.organizer,
        is_resource: raw.resource,
        is_optional: raw.optional,
        ..make_attendee_info(identity, status, raw.comment.clone())
    }
}

/// Descriptions arrive as lightly-escaped HTML.
fn clean_description(raw: &str) -> String {
    raw.trim()
        .replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("<wbr>", "")
}

/// `(start, end, is_all_day)` in epoch milliseconds.
fn event_times(event: &GapiEvent) -> Result<(i64, i64, bool)> {
    let (Some(start), Some(end)) = (&event.start, &event.end) else {
        return Err(SyncError::InvalidDate(format!("event {} has no start/end", event.id)));
    };

    match (&start.date_time, &end.date_time) {
        (Some(s), Some(e)) => Ok((parse_date_time(s)?, parse_date_time(e)?, false)),
        _ => {
            let s = start.date.as_deref().ok_or_else(|| missing_date(&event.id))?;
            let e = end.date.as_deref().ok_or_else(|| missing_date(&event.id))?;
            Ok((parse_all_day(s)?, parse_all_day(e)?, true))
        }
    }
}

fn missing_date(id: &str) -> SyncError {
    SyncError::InvalidDate(format!("all-day event {id} has no date"))
}

fn parse_date_time(raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| SyncError::InvalidDate(raw.to_string()))
}

/// All-day dates are midnight UTC.
fn parse_all_day(raw: &str) -> Result<i64> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| SyncError::InvalidDate(raw.to_string()))
}

impl EventChewer for GapiChewer {
    type Payload = GapiEvent;

    const PROVIDER: &'static str = "gapi";

    fn native_id<'p>(&self, payload: &'p GapiEvent) -> &'p str {
        &payload.id
    }

    fn is_cancelled(&self, payload: &GapiEvent) -> bool {
        payload.status.as_deref() == Some("cancelled")
    }

    fn chew_event(&self, event: &GapiEvent, ctx: &EventContext<'_>) -> Result<CalendarEvent> {
        let (start_date, end_date, is_all_day) = event_times(event)?;

        let mut body_reps = Vec::new();
        let mut snippet = None;
        let mut authored_body_size = 0;
        let mut links = Vec::new();
        if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
            let description = clean_description(description);
            let processed = process_event_content(&description, BodyType::Html, &self.links);
            snippet = processed.snippet;
            authored_body_size = processed.authored_body_size;
            links = processed.links;
            body_reps.push(processed.body);
        }

        let location = event.location.clone().unwrap_or_default();
        let hints = ConferenceHints {
            solution: event.conference_data.as_ref().and_then(|data| {
                data.conference_solution.as_ref().map(|solution| ConferenceSolution {
                    name: solution.name.clone(),
                    icon_uri: solution.icon_uri.clone(),
                    entry_point_uris: data.entry_points.iter().map(|e| e.uri.clone()).collect(),
                })
            }),
            online_meeting_url: None,
            location: (!location.is_empty()).then(|| location.clone()),
        };
        let conference = conference_info(&hints, &links, &self.links);

        Ok(CalendarEvent {
            id: ctx.id.clone(),
            date: start_date,
            start_date,
            end_date,
            is_all_day,
            creator: chew_identity(event.creator.as_ref()),
            organizer: chew_identity(event.organizer.as_ref()),
            attendees: event.attendees.iter().map(chew_attendee).collect(),
            location,
            flags: ctx.flags.clone(),
            folder_ids: [ctx.folder_id.to_string()].into(),
            subject: event.summary.clone(),
            snippet,
            body_reps,
            authored_body_size,
            conference,
            links,
            url: event.html_link.clone(),
        })
    }
}

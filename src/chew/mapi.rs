//! Microsoft Graph (mapi) calendar event mapping.
//!
//! A recurring series arrives as its occurrences plus a synthetic root
//! payload keyed by the series id. The root carries fields (organizer, body,
//! ...) the occurrences omit, so it is used as a template for them.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Result, SyncError};
use crate::model::event::{make_attendee_info, make_identity_info};
use crate::model::{AttendeeInfo, BodyType, CalendarEvent, IdentityInfo, ResponseStatus};

use super::content::process_event_content;
use super::links::{conference_info, ConferenceHints, LinkConfig};
use super::{EventChewer, EventContext};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiEvent {
    pub id: String,
    pub is_cancelled: bool,
    pub is_all_day: bool,
    pub subject: Option<String>,
    pub body: Option<MapiBody>,
    pub start: Option<MapiTime>,
    pub end: Option<MapiTime>,
    pub organizer: Option<MapiRecipient>,
    pub location: Option<MapiLocation>,
    pub attendees: Vec<MapiAttendee>,
    pub online_meeting: Option<MapiOnlineMeeting>,
    pub web_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiBody {
    pub content: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiTime {
    pub date_time: String,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiRecipient {
    pub email_address: MapiEmailAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapiEmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiLocation {
    pub display_name: Option<String>,
    /// A plain string or a structured physical address.
    pub address: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiAttendee {
    pub email_address: MapiEmailAddress,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<MapiResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapiResponse {
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapiOnlineMeeting {
    pub join_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MapiChewer {
    pub links: LinkConfig,
}

impl MapiChewer {
    pub fn new(links: LinkConfig) -> Self {
        Self { links }
    }
}

fn chew_identity(raw: Option<&MapiRecipient>) -> IdentityInfo {
    match raw {
        Some(r) => make_identity_info(
            r.email_address.name.clone(),
            r.email_address.address.clone(),
            false,
        ),
        None => IdentityInfo::default(),
    }
}

fn chew_attendee(raw: &MapiAttendee, organizer: &IdentityInfo) -> AttendeeInfo {
    let email = &raw.email_address;
    let identity = make_identity_info(email.name.clone(), email.address.clone(), false);
    let status = raw
        .status
        .as_ref()
        .and_then(|s| s.response.as_deref())
        .map_or(ResponseStatus::NeedsAction, ResponseStatus::from_mapi);
    let kind = raw.kind.as_deref();
    AttendeeInfo {
        is_organizer: email.address == organizer.email && email.name == organizer.display_name,
        is_resource: kind == Some("resource"),
        is_optional: kind == Some("optional"),
        ..make_attendee_info(identity, status, None)
    }
}

/// Graph date-times carry no offset; they are treated as UTC.
fn parse_naive_utc(time: Option<&MapiTime>, id: &str) -> Result<i64> {
    let raw = time
        .map(|t| t.date_time.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::InvalidDate(format!("event {id} has no start/end")))?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|_| SyncError::InvalidDate(raw.to_string()))
}

fn render_address(address: Option<&Value>) -> String {
    match address {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(fields)) => ["street", "city", "state", "postalCode", "countryOrRegion"]
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

/// `"<displayName>@<address>"`, or just the name when there is no address.
fn render_location(location: Option<&MapiLocation>) -> String {
    let Some(location) = location else {
        return String::new();
    };
    let name = location.display_name.clone().unwrap_or_default();
    let address = render_address(location.address.as_ref());
    if address.is_empty() {
        name
    } else {
        format!("{name}@{address}")
    }
}

impl EventChewer for MapiChewer {
    type Payload = MapiEvent;

    const PROVIDER: &'static str = "mapi";

    fn native_id<'p>(&self, payload: &'p MapiEvent) -> &'p str {
        &payload.id
    }

    fn is_cancelled(&self, payload: &MapiEvent) -> bool {
        payload.is_cancelled
    }

    fn take_recurrence_root(
        &self,
        recurring_id: Option<&str>,
        events: &mut BTreeMap<String, Value>,
    ) -> Option<Map<String, Value>> {
        if events.len() <= 1 {
            return None;
        }
        let root = events.remove(recurring_id?)?;
        trace!(series = ?recurring_id, "Using series root as occurrence template");
        match root {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    fn chew_event(&self, event: &MapiEvent, ctx: &EventContext<'_>) -> Result<CalendarEvent> {
        let mut body_reps = Vec::new();
        let mut snippet = None;
        let mut authored_body_size = 0;
        let mut links = Vec::new();
        if let Some(body) = &event.body {
            if let Some(content) = body.content.as_deref().filter(|c| !c.is_empty()) {
                let kind = body
                    .content_type
                    .as_deref()
                    .map_or(BodyType::Html, BodyType::from_content_type);
                let processed = process_event_content(content, kind, &self.links);
                snippet = processed.snippet;
                authored_body_size = processed.authored_body_size;
                links = processed.links;
                body_reps.push(processed.body);
            }
        }

        let start_date = parse_naive_utc(event.start.as_ref(), &event.id)?;
        let end_date = parse_naive_utc(event.end.as_ref(), &event.id)?;

        let organizer = chew_identity(event.organizer.as_ref());
        let attendees = event
            .attendees
            .iter()
            .map(|who| chew_attendee(who, &organizer))
            .collect();

        let hints = ConferenceHints {
            solution: None,
            online_meeting_url: event
                .online_meeting
                .as_ref()
                .and_then(|m| m.join_url.clone()),
            location: event
                .location
                .as_ref()
                .and_then(|l| l.display_name.clone())
                .filter(|l| !l.is_empty()),
        };
        let conference = conference_info(&hints, &links, &self.links);

        Ok(CalendarEvent {
            id: ctx.id.clone(),
            date: start_date,
            start_date,
            end_date,
            is_all_day: event.is_all_day,
            creator: organizer.clone(),
            organizer,
            attendees,
            location: render_location(event.location.as_ref()),
            flags: ctx.flags.clone(),
            folder_ids: [ctx.folder_id.to_string()].into(),
            subject: event.subject.clone(),
            snippet,
            body_reps,
            authored_body_size,
            conference,
            links,
            url: event.web_link.clone(),
        })
    }
}

//! Provider-agnostic calendar event records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A calendar participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityInfo {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_self: bool,
}

/// An attendee's answer to the invitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    #[default]
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Organizer,
}

impl ResponseStatus {
    /// Google Calendar `responseStatus` values.
    pub fn from_gapi(raw: &str) -> Self {
        match raw {
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            "tentative" => Self::Tentative,
            _ => Self::NeedsAction,
        }
    }

    /// Microsoft Graph `status.response` values.
    pub fn from_mapi(raw: &str) -> Self {
        match raw {
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            "tentativelyAccepted" => Self::Tentative,
            "organizer" => Self::Organizer,
            _ => Self::NeedsAction,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendeeInfo {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_self: bool,
    pub is_organizer: bool,
    pub is_resource: bool,
    pub response_status: ResponseStatus,
    pub comment: Option<String>,
    pub is_optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkType {
    Conferencing,
}

/// A hyperlink found in an event description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
}

/// How to join the meeting, if it has an online component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceInfo {
    pub name: String,
    pub icon: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    #[default]
    Html,
    Plain,
}

impl BodyType {
    /// Interpret a provider content type (`"html"`, `"text"`, `"text/plain"`).
    pub fn from_content_type(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "text" | "plain" | "text/plain" => Self::Plain,
            _ => Self::Html,
        }
    }
}

/// A fully downloaded body representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyPart {
    #[serde(rename = "type")]
    pub body_type: BodyType,
    pub size_estimate: usize,
    pub amount_downloaded: usize,
    pub is_downloaded: bool,
    /// Rendered content.
    pub content: String,
    pub authored_body_size: usize,
}

/// The canonical stored form of a calendar event.
///
/// Only `flags` can be changed locally; everything else is rebuilt from the
/// provider on every sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarEvent {
    pub id: String,
    /// Sort date; the start date.
    pub date: i64,
    pub start_date: i64,
    pub end_date: i64,
    pub is_all_day: bool,
    pub creator: IdentityInfo,
    pub organizer: IdentityInfo,
    pub attendees: Vec<AttendeeInfo>,
    pub location: String,
    pub flags: Vec<String>,
    pub folder_ids: BTreeSet<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_reps: Vec<BodyPart>,
    pub authored_body_size: usize,
    pub conference: Option<ConferenceInfo>,
    pub links: Vec<LinkInfo>,
    pub url: Option<String>,
}

impl CalendarEvent {
    pub fn is_starred(&self) -> bool {
        self.flags.iter().any(|f| f == "\\Flagged" || f == "starred")
    }
}

pub fn make_identity_info(
    display_name: Option<String>,
    email: Option<String>,
    is_self: bool,
) -> IdentityInfo {
    IdentityInfo {
        email,
        display_name,
        is_self,
    }
}

/// Attendee record layered on an identity.
pub fn make_attendee_info(
    identity: IdentityInfo,
    response_status: ResponseStatus,
    comment: Option<String>,
) -> AttendeeInfo {
    AttendeeInfo {
        email: identity.email,
        display_name: identity.display_name,
        is_self: identity.is_self,
        response_status,
        comment: comment.filter(|c| !c.is_empty()),
        ..Default::default()
    }
}

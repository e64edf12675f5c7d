//! Core data model: identifiers, calendar events, messages, sync windows.

pub mod address;
pub mod event;
pub mod ids;
pub mod message;
pub mod range;

pub use address::AddressPair;
pub use event::{
    AttendeeInfo, BodyPart, BodyType, CalendarEvent, ConferenceInfo, IdentityInfo, LinkInfo,
    LinkType, ResponseStatus,
};
pub use message::{AttachmentPart, FlagChanges, IssuedIds, MessageInfo};
pub use range::SyncRange;

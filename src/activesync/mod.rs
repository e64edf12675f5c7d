//! ActiveSync protocol adapter: folder change enumeration over an abstract
//! connection.

pub mod codepages;
pub mod enum_folder_changes;
pub mod parse_changed_message;
pub mod parse_full_message;
pub mod wbxml;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::model::{FlagChanges, MessageInfo};

pub use enum_folder_changes::{
    enumerate_folder_changes, EnumFolderChangesArgs, FolderChangesResult,
};
pub use parse_changed_message::parse_changed_message;
pub use parse_full_message::parse_full_message;
pub use wbxml::{Element, Writer};

/// Negotiated protocol version, e.g. `12.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ProtocolVersion {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || SyncError::parse("protocol version", format!("{s:?}"));
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        Ok(Self {
            major: major.parse().map_err(|_| bad())?,
            minor: minor.parse().map_err(|_| bad())?,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The transport: sends a command document and returns the decoded response.
#[async_trait]
pub trait Connection: Send + Sync {
    fn current_version(&self) -> ProtocolVersion;

    /// `Ok(None)` for an empty response body.
    async fn post_command(&self, request: Element) -> Result<Option<Element>>;
}

/// Receives folder changes while a Sync response is walked.
pub trait FolderChangeSink {
    fn add(&mut self, server_id: &str, message: MessageInfo);
    fn change(&mut self, server_id: &str, changes: FlagChanges);
    fn remove(&mut self, server_id: &str);
}

/// A recorded folder change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FolderChange {
    Add {
        server_id: String,
        message: Box<MessageInfo>,
    },
    Change {
        server_id: String,
        changes: FlagChanges,
    },
    Remove {
        server_id: String,
    },
}

impl FolderChange {
    pub fn server_id(&self) -> &str {
        match self {
            Self::Add { server_id, .. }
            | Self::Change { server_id, .. }
            | Self::Remove { server_id } => server_id,
        }
    }
}

/// Collects changes in the order they were seen.
///
/// `Vec::remove(usize)` shadows [`FolderChangeSink::remove`] in method
/// syntax; call it as `FolderChangeSink::remove(&mut sink, id)`.
impl FolderChangeSink for Vec<FolderChange> {
    fn add(&mut self, server_id: &str, message: MessageInfo) {
        self.push(FolderChange::Add {
            server_id: server_id.to_string(),
            message: Box::new(message),
        });
    }

    fn change(&mut self, server_id: &str, changes: FlagChanges) {
        self.push(FolderChange::Change {
            server_id: server_id.to_string(),
            changes,
        });
    }

    fn remove(&mut self, server_id: &str) {
        self.push(FolderChange::Remove {
            server_id: server_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_order() {
        let v: ProtocolVersion = "12.1".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(12, 1));
        assert!(ProtocolVersion::new(12, 0) < v);
        assert!("2.5".parse::<ProtocolVersion>().unwrap() < ProtocolVersion::new(12, 0));
        assert_eq!("14".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::new(14, 0));
        assert!("twelve".parse::<ProtocolVersion>().is_err());
        assert_eq!(v.to_string(), "12.1");
    }

    #[test]
    fn test_vec_sink_keeps_order() {
        let mut sink: Vec<FolderChange> = Vec::new();
        FolderChangeSink::remove(&mut sink, "a");
        sink.change("b", FlagChanges::default());
        let ids: Vec<&str> = sink.iter().map(FolderChange::server_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

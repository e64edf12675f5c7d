//! Message records produced by the ActiveSync adapter.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::address::AddressPair;
use super::event::BodyType;

pub const FLAG_SEEN: &str = "\\Seen";
pub const FLAG_FLAGGED: &str = "\\Flagged";

/// Identifiers handed out for one new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedIds {
    pub message_id: String,
    pub umid: String,
    pub folder_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPart {
    /// Position-derived id, a64 encoded.
    pub rel_id: String,
    pub name: Option<String>,
    pub content_id: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    /// Server-side file reference.
    pub part: Option<String>,
    pub size_estimate: Option<u64>,
}

/// A body we know about but have not downloaded yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyStub {
    #[serde(rename = "type")]
    pub body_type: BodyType,
    pub size_estimate: u64,
    pub amount_downloaded: u64,
    pub is_downloaded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: String,
    pub umid: String,
    /// The Message-ID header; ActiveSync only reveals it with the full MIME
    /// body, so it starts out empty.
    pub guid: String,
    pub author: Option<AddressPair>,
    pub to: Option<Vec<AddressPair>>,
    pub cc: Option<Vec<AddressPair>>,
    pub reply_to: Option<Vec<AddressPair>>,
    pub date: Option<i64>,
    pub flags: Vec<String>,
    pub folder_ids: BTreeSet<String>,
    pub has_attachments: bool,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub attachments: Vec<AttachmentPart>,
    pub related_parts: Vec<AttachmentPart>,
    pub body_reps: Vec<BodyStub>,
}

/// Flag deltas reported by a `Change` command. `None` means no change in
/// that direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagChanges {
    pub add: Option<Vec<String>>,
    pub remove: Option<Vec<String>>,
}

impl FlagChanges {
    pub fn set(&mut self, flag: &str, on: bool) {
        let target = if on { &mut self.add } else { &mut self.remove };
        target.get_or_insert_with(Vec::new).push(flag.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_none() && self.remove.is_none()
    }

    /// Apply to a flag list, keeping it free of duplicates.
    pub fn apply_to(&self, flags: &mut Vec<String>) {
        if let Some(remove) = &self.remove {
            flags.retain(|f| !remove.contains(f));
        }
        for flag in self.add.iter().flatten() {
            if !flags.contains(flag) {
                flags.push(flag.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_changes_apply() {
        let mut changes = FlagChanges::default();
        assert!(changes.is_empty());
        changes.set(FLAG_SEEN, true);
        changes.set(FLAG_FLAGGED, false);

        let mut flags = vec![FLAG_FLAGGED.to_string()];
        changes.apply_to(&mut flags);
        assert_eq!(flags, vec![FLAG_SEEN.to_string()]);

        changes.apply_to(&mut flags);
        assert_eq!(flags.len(), 1);
    }
}

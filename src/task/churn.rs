//! Conversation rollups over a conversation's events.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::CalendarEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationInfo {
    pub id: String,
    /// Latest event start.
    pub date: i64,
    /// Rows the conversation occupies in a list view.
    pub height: usize,
    pub subject: Option<String>,
    pub message_count: usize,
    pub folder_ids: BTreeSet<String>,
    pub has_starred: bool,
}

/// Recompute the rollup of `conv_id` from its surviving events.
///
/// The subject comes from the earliest event that has one, falling back to
/// the previous rollup's subject.
pub fn churn_conversation(
    conv_id: &str,
    old: Option<&ConversationInfo>,
    all_events: &[CalendarEvent],
) -> ConversationInfo {
    let date = all_events.iter().map(|e| e.start_date).max().unwrap_or_default();

    let mut by_start: Vec<&CalendarEvent> = all_events.iter().collect();
    by_start.sort_by_key(|e| e.start_date);
    let subject = by_start
        .iter()
        .find_map(|e| e.subject.clone())
        .or_else(|| old.and_then(|o| o.subject.clone()));

    let folder_ids = all_events
        .iter()
        .flat_map(|e| e.folder_ids.iter().cloned())
        .collect();

    ConversationInfo {
        id: conv_id.to_string(),
        date,
        height: all_events.len(),
        subject,
        message_count: all_events.len(),
        folder_ids,
        has_starred: all_events.iter().any(CalendarEvent::is_starred),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(start: i64, subject: Option<&str>, flags: &[&str]) -> CalendarEvent {
        CalendarEvent {
            id: format!("e{start}"),
            start_date: start,
            end_date: start + 1,
            subject: subject.map(str::to_string),
            flags: flags.iter().map(|f| f.to_string()).collect(),
            folder_ids: ["f".to_string()].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rollup() {
        let events = vec![
            ev(300, Some("Later"), &[]),
            ev(100, None, &["starred"]),
            ev(200, Some("Earliest named"), &[]),
        ];
        let conv = churn_conversation("c", None, &events);
        assert_eq!(conv.date, 300);
        assert_eq!(conv.subject.as_deref(), Some("Earliest named"));
        assert_eq!(conv.message_count, 3);
        assert!(conv.has_starred);
        assert_eq!(conv.folder_ids.len(), 1);
    }

    #[test]
    fn test_subject_falls_back_to_old() {
        let old = ConversationInfo {
            subject: Some("Series".into()),
            ..Default::default()
        };
        let conv = churn_conversation("c", Some(&old), &[ev(1, None, &[])]);
        assert_eq!(conv.subject.as_deref(), Some("Series"));
        assert!(!conv.has_starred);
    }
}

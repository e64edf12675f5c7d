//! In-memory implementation of the task boundary.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::model::ids::conv_id_from_message_id;
use crate::model::CalendarEvent;

use super::{ConversationInfo, FinishTask, FromDb, MutateRequest, TaskContext};

/// Change notification for live views.
#[derive(Debug, Clone, PartialEq)]
pub enum DbChange {
    Conversation { id: String, removed: bool },
    Message { id: String, removed: bool },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub conversations: BTreeMap<String, ConversationInfo>,
    /// Keyed by message id; ids sort with their conversation.
    pub messages: BTreeMap<String, CalendarEvent>,
}

pub struct MemoryDb {
    state: Mutex<Snapshot>,
    changes: broadcast::Sender<DbChange>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::from_snapshot(Snapshot::default())
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(snapshot),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DbChange> {
        self.changes.subscribe()
    }

    pub fn insert_events(&self, events: impl IntoIterator<Item = CalendarEvent>) {
        let mut state = self.lock();
        for event in events {
            state.messages.insert(event.id.clone(), event);
        }
    }

    pub fn insert_conversation(&self, info: ConversationInfo) {
        self.lock().conversations.insert(info.id.clone(), info);
    }

    pub fn conversation(&self, conv_id: &str) -> Option<ConversationInfo> {
        self.lock().conversations.get(conv_id).cloned()
    }

    /// Events of one conversation, in id order.
    pub fn events_for(&self, conv_id: &str) -> Vec<CalendarEvent> {
        events_in(&self.lock(), conv_id)
    }

    /// Copy of everything stored.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            conversations: state.conversations.clone(),
            messages: state.messages.clone(),
        }
    }

    fn notify(&self, change: DbChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn events_in(state: &Snapshot, conv_id: &str) -> Vec<CalendarEvent> {
    state
        .messages
        .iter()
        .filter(|(id, _)| conv_id_from_message_id(id).is_ok_and(|c| c == conv_id))
        .map(|(_, e)| e.clone())
        .collect()
}

#[async_trait]
impl TaskContext for MemoryDb {
    async fn begin_mutate(&self, request: MutateRequest) -> Result<FromDb> {
        let state = self.lock();
        let mut from_db = FromDb::default();
        for conv_id in request.conversations {
            if let Some(info) = state.conversations.get(&conv_id) {
                from_db.conversations.insert(conv_id, info.clone());
            }
        }
        for conv_id in request.messages_by_conversation {
            let events = events_in(&state, &conv_id);
            from_db.messages_by_conversation.insert(conv_id, events);
        }
        Ok(from_db)
    }

    async fn finish_task(&self, finish: FinishTask) -> Result<()> {
        let FinishTask {
            mutations,
            new_data,
        } = finish;
        let mut changes = Vec::new();
        {
            let mut state = self.lock();
            for (id, info) in mutations.conversations {
                let removed = info.is_none();
                match info {
                    Some(info) => state.conversations.insert(id.clone(), info),
                    None => state.conversations.remove(&id),
                };
                changes.push(DbChange::Conversation { id, removed });
            }
            for (id, event) in mutations.messages {
                let removed = event.is_none();
                match event {
                    Some(event) => state.messages.insert(id.clone(), event),
                    None => state.messages.remove(&id),
                };
                changes.push(DbChange::Message { id, removed });
            }
            for info in new_data.conversations {
                changes.push(DbChange::Conversation {
                    id: info.id.clone(),
                    removed: false,
                });
                state.conversations.insert(info.id.clone(), info);
            }
            for event in new_data.messages {
                changes.push(DbChange::Message {
                    id: event.id.clone(),
                    removed: false,
                });
                state.messages.insert(event.id.clone(), event);
            }
        }

        debug!(changes = changes.len(), "Task finished");
        for change in changes {
            self.notify(change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Mutations, NewData};

    fn event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tombstones_delete() {
        let db = MemoryDb::new();
        db.insert_events([event("0\0\0c\0a"), event("0\0\0c\0b"), event("0\0\0other\0x")]);
        let mut rx = db.subscribe();

        let from_db = db
            .begin_mutate(MutateRequest::for_conversation("0\0\0c"))
            .await
            .unwrap();
        assert_eq!(from_db.messages_by_conversation["0\0\0c"].len(), 2);
        assert!(from_db.conversations.is_empty());

        db.finish_task(FinishTask {
            mutations: Mutations {
                messages: [("0\0\0c\0a".to_string(), None)].into(),
                ..Default::default()
            },
            new_data: NewData {
                messages: vec![event("0\0\0c\0z")],
                ..Default::default()
            },
        })
        .await
        .unwrap();

        let ids: Vec<String> = db.events_for("0\0\0c").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["0\0\0c\0b".to_string(), "0\0\0c\0z".to_string()]);
        assert_eq!(
            rx.recv().await.unwrap(),
            DbChange::Message {
                id: "0\0\0c\0a".into(),
                removed: true
            }
        );
    }
}

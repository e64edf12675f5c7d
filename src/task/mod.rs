//! The task / mutation boundary.
//!
//! Sync tasks read prior state with [`TaskContext::begin_mutate`] and publish
//! their results with [`TaskContext::finish_task`]. The database behind the
//! contract is external; [`MemoryDb`] is an in-process implementation.

pub mod cal_sync_conv;
pub mod churn;
pub mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::CalendarEvent;

pub use cal_sync_conv::{
    CalProvider, CalSyncConv, CalSyncConvRequest, PlannedTask, SyncConvOutcome,
};
pub use churn::{churn_conversation, ConversationInfo};
pub use memory::{DbChange, MemoryDb};

/// What a task wants to read (and implicitly lock) before mutating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutateRequest {
    pub conversations: Vec<String>,
    pub messages_by_conversation: Vec<String>,
}

impl MutateRequest {
    /// The conversation record and all its messages.
    pub fn for_conversation(conv_id: &str) -> Self {
        Self {
            conversations: vec![conv_id.to_string()],
            messages_by_conversation: vec![conv_id.to_string()],
        }
    }
}

/// Snapshot returned by `begin_mutate`. A requested conversation that does
/// not exist yet is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromDb {
    pub conversations: HashMap<String, ConversationInfo>,
    pub messages_by_conversation: HashMap<String, Vec<CalendarEvent>>,
}

/// Changes to existing records. `None` deletes the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mutations {
    pub conversations: BTreeMap<String, Option<ConversationInfo>>,
    pub messages: BTreeMap<String, Option<CalendarEvent>>,
}

/// Records that did not exist before.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewData {
    pub conversations: Vec<ConversationInfo>,
    pub messages: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishTask {
    pub mutations: Mutations,
    pub new_data: NewData,
}

/// The database's read/mutate contract as seen by one task.
#[async_trait]
pub trait TaskContext: Send + Sync {
    async fn begin_mutate(&self, request: MutateRequest) -> Result<FromDb>;

    async fn finish_task(&self, finish: FinishTask) -> Result<()>;
}

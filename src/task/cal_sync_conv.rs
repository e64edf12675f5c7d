//! Synchronize one calendar conversation (a recurring series or a one-off
//! event) from a provider event batch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::chew::links::LinkConfig;
use crate::chew::{chew_event_bundle, ChewArgs, ChewResult, GapiChewer, MapiChewer};
use crate::error::{Result, SyncError};
use crate::model::SyncRange;

use super::{churn_conversation, ConversationInfo, FinishTask, MutateRequest, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalProvider {
    Gapi,
    Mapi,
}

impl fmt::Display for CalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gapi => "gapi",
            Self::Mapi => "mapi",
        })
    }
}

impl FromStr for CalProvider {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gapi" => Ok(Self::Gapi),
            "mapi" => Ok(Self::Mapi),
            other => Err(SyncError::parse("provider", format!("unknown provider {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalSyncConvRequest {
    pub provider: CalProvider,
    pub conv_id: String,
    pub folder_id: String,
    #[serde(default)]
    pub recurring_id: Option<String>,
    pub range: SyncRange,
    pub event_map: BTreeMap<String, Value>,
}

/// A request annotated for the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub request: CalSyncConvRequest,
    /// No two tasks sharing one of these run at the same time.
    pub exclusive_resources: Vec<String>,
    pub priority_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConvOutcome {
    pub chewed: ChewResult,
    /// `None` when no events remain.
    pub conversation: Option<ConversationInfo>,
    pub conversation_existed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CalSyncConv {
    links: LinkConfig,
}

impl CalSyncConv {
    pub fn new(links: LinkConfig) -> Self {
        Self { links }
    }

    pub fn plan(&self, request: CalSyncConvRequest) -> PlannedTask {
        let exclusive_resources = vec![format!("conv:{}", request.conv_id)];
        let priority_tags = vec![format!("view:conv:{}", request.conv_id)];
        PlannedTask {
            request,
            exclusive_resources,
            priority_tags,
        }
    }

    /// Read the conversation, reconcile, and publish the result.
    pub async fn execute(
        &self,
        ctx: &dyn TaskContext,
        request: CalSyncConvRequest,
    ) -> Result<SyncConvOutcome> {
        let CalSyncConvRequest {
            provider,
            conv_id,
            folder_id,
            recurring_id,
            range,
            event_map,
        } = request;

        let mut from_db = ctx
            .begin_mutate(MutateRequest::for_conversation(&conv_id))
            .await?;
        let old_conv = from_db.conversations.remove(&conv_id);
        let old_events = from_db
            .messages_by_conversation
            .remove(&conv_id)
            .unwrap_or_default();
        debug!(
            %provider,
            old_events = old_events.len(),
            payloads = event_map.len(),
            "Syncing conversation"
        );

        let args = ChewArgs {
            conv_id: conv_id.clone(),
            folder_id,
            recurring_id,
            range,
            event_map,
            old_events,
        };
        let chewed = match provider {
            CalProvider::Gapi => chew_event_bundle(&GapiChewer::new(self.links.clone()), args)?,
            CalProvider::Mapi => chew_event_bundle(&MapiChewer::new(self.links.clone()), args)?,
        };

        // A conversation without events should not exist.
        let conversation = (!chewed.all_events.is_empty())
            .then(|| churn_conversation(&conv_id, old_conv.as_ref(), &chewed.all_events));

        let mut finish = FinishTask::default();
        if old_conv.is_some() {
            finish
                .mutations
                .conversations
                .insert(conv_id.clone(), conversation.clone());
        } else if let Some(info) = &conversation {
            finish.new_data.conversations.push(info.clone());
        }
        finish.mutations.messages = chewed.modified_event_map.clone();
        finish.new_data.messages = chewed.new_events.clone();
        ctx.finish_task(finish).await?;

        info!(
            %provider,
            new = chewed.new_events.len(),
            modified = chewed.modified_event_map.len(),
            remaining = chewed.all_events.len(),
            "Conversation synced"
        );
        Ok(SyncConvOutcome {
            chewed,
            conversation,
            conversation_existed: old_conv.is_some(),
        })
    }
}

//! Incremental Sync of one folder's contents.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, SyncError};
use crate::model::IssuedIds;

use super::codepages::air_sync as sync;
use super::parse_changed_message::parse_changed_message;
use super::parse_full_message::parse_full_message;
use super::wbxml::{Element, EventParser, PathStep, Tag, Writer};
use super::{Connection, FolderChangeSink, ProtocolVersion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumFolderChangesArgs {
    /// A sync key believed to be valid for this folder.
    pub folder_sync_key: String,
    pub folder_server_id: String,
    /// The filter type the sync key was established with.
    pub filter_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderChangesResult {
    /// The caller must establish a new sync key before trying again.
    pub invalid_sync_key: bool,
    pub sync_key: String,
    pub more_available: bool,
    /// The server sent an empty response.
    pub no_changes: bool,
}

struct Walk<'s> {
    status: Option<String>,
    sync_key: Option<String>,
    more_available: bool,
    added: usize,
    changed: usize,
    removed: usize,
    issue_ids: &'s mut dyn FnMut() -> IssuedIds,
    sink: &'s mut dyn FolderChangeSink,
}

/// Ask the server for everything that changed in a folder since
/// `args.folder_sync_key`.
///
/// Changes are pushed into `sink` as the response is walked. `issue_ids` is
/// called once per added message to mint its identifiers. Messages that fail
/// to parse are logged and skipped. An invalid sync key is reported in the
/// result; any other failing status is an error.
pub async fn enumerate_folder_changes(
    conn: &dyn Connection,
    args: &EnumFolderChangesArgs,
    issue_ids: &mut dyn FnMut() -> IssuedIds,
    sink: &mut dyn FolderChangeSink,
) -> Result<FolderChangesResult> {
    let request = build_request(conn.current_version(), args)?;
    let Some(response) = conn.post_command(request).await? else {
        info!(folder = %args.folder_server_id, "Sync complete, empty response");
        return Ok(FolderChangesResult {
            invalid_sync_key: false,
            sync_key: args.folder_sync_key.clone(),
            more_available: false,
            no_changes: true,
        });
    };

    let mut walk = Walk {
        status: None,
        sync_key: None,
        more_available: false,
        added: 0,
        changed: 0,
        removed: 0,
        issue_ids,
        sink,
    };
    let mut parser = response_parser();
    if let Err(e) = parser.run(&response, &mut walk) {
        error!(error = %e, "Error walking Sync response");
        if e.is_critical() {
            return Err(e);
        }
        return Err(SyncError::Protocol {
            status: "unknown".into(),
        });
    }

    match walk.status.as_deref() {
        Some(sync::status::SUCCESS) => {
            info!(
                folder = %args.folder_server_id,
                added = walk.added,
                changed = walk.changed,
                removed = walk.removed,
                "Sync complete"
            );
            let sync_key = walk.sync_key.unwrap_or_else(|| {
                warn!("Successful Sync response without a SyncKey, keeping the old one");
                args.folder_sync_key.clone()
            });
            Ok(FolderChangesResult {
                invalid_sync_key: false,
                sync_key,
                more_available: walk.more_available,
                no_changes: false,
            })
        }
        Some(sync::status::INVALID_SYNC_KEY) => Ok(FolderChangesResult {
            invalid_sync_key: true,
            sync_key: "0".into(),
            more_available: walk.more_available,
            no_changes: false,
        }),
        other => {
            let status = other.unwrap_or("unknown").to_string();
            error!(%status, "Sync error");
            Err(SyncError::Protocol { status })
        }
    }
}

fn build_request(version: ProtocolVersion, args: &EnumFolderChangesArgs) -> Result<Element> {
    let mut w = Writer::new();
    w.stag(sync::SYNC).stag(sync::COLLECTIONS).stag(sync::COLLECTION);

    if version < ProtocolVersion::new(12, 1) {
        w.tag_text(sync::CLASS, "Email");
    }

    w.tag_text(sync::SYNC_KEY, args.folder_sync_key.as_str())
        .tag_text(sync::COLLECTION_ID, args.folder_server_id.as_str())
        .tag(sync::GET_CHANGES)
        .stag(sync::OPTIONS)
        .tag_text(sync::FILTER_TYPE, args.filter_type.as_str());

    // Older servers include the body unless told otherwise.
    if version <= ProtocolVersion::new(12, 0) {
        w.tag_text(sync::MIME_SUPPORT, sync::mime_support::NEVER)
            .tag_text(sync::TRUNCATION, sync::mime_truncation::TRUNCATE_ALL);
    }

    w.etag().etag().etag().etag();
    w.finish()
}

fn under_collection(rest: &[PathStep]) -> Vec<PathStep> {
    let mut path: Vec<PathStep> = [sync::SYNC, sync::COLLECTIONS, sync::COLLECTION]
        .into_iter()
        .map(PathStep::from)
        .collect();
    path.extend_from_slice(rest);
    path
}

fn server_id(node: &Element) -> Result<Option<&str>> {
    match node.find(sync::SERVER_ID) {
        Some(el) => el.required_text().map(Some),
        None => Ok(None),
    }
}

fn response_parser<'s>() -> EventParser<'static, Walk<'s>> {
    let mut parser = EventParser::new();
    let commands = PathStep::Tag(sync::COMMANDS);

    parser.add_listener(under_collection(&[sync::SYNC_KEY.into()]), |w: &mut Walk<'s>, node| {
        w.sync_key = Some(node.required_text()?.to_string());
        Ok(())
    });
    parser.add_listener(under_collection(&[sync::STATUS.into()]), |w: &mut Walk<'s>, node| {
        w.status = Some(node.required_text()?.to_string());
        Ok(())
    });
    parser.add_listener(under_collection(&[sync::MORE_AVAILABLE.into()]), |w: &mut Walk<'s>, _| {
        w.more_available = true;
        Ok(())
    });

    parser.add_listener(
        under_collection(&[commands.clone(), sync::ADD.into()]),
        |w: &mut Walk<'s>, node| {
            let server_id = server_id(node)?;
            let data = node.find(sync::APPLICATION_DATA);
            let (Some(server_id), Some(data)) = (server_id, data) else {
                return Ok(());
            };
            match parse_full_message(data, (w.issue_ids)()) {
                Ok(message) => {
                    w.added += 1;
                    w.sink.add(server_id, message);
                }
                Err(e) if e.is_critical() => return Err(e),
                Err(e) => warn!(server_id, error = %e, "Failed to parse a full message, skipping"),
            }
            Ok(())
        },
    );

    parser.add_listener(
        under_collection(&[commands.clone(), sync::CHANGE.into()]),
        |w: &mut Walk<'s>, node| {
            let server_id = server_id(node)?;
            let Some(data) = node.find(sync::APPLICATION_DATA) else {
                return Ok(());
            };
            let changes = match parse_changed_message(data) {
                Ok(changes) => changes,
                Err(e) if e.is_critical() => return Err(e),
                Err(e) => {
                    warn!(?server_id, error = %e, "Failed to parse a change, skipping");
                    return Ok(());
                }
            };
            if let Some(server_id) = server_id {
                w.changed += 1;
                w.sink.change(server_id, changes);
            }
            Ok(())
        },
    );

    let deletes: [Tag; 2] = [sync::DELETE, sync::SOFT_DELETE];
    parser.add_listener(
        under_collection(&[commands, PathStep::AnyOf(deletes.to_vec())]),
        |w: &mut Walk<'s>, node| {
            if let Some(server_id) = server_id(node)? {
                w.removed += 1;
                w.sink.remove(server_id);
            }
            Ok(())
        },
    );

    parser
}

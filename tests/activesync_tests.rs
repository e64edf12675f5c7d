//! Integration tests for ActiveSync folder change enumeration against a
//! scripted connection.

use std::sync::Mutex;

use async_trait::async_trait;

use workshop::activesync::codepages::{air_sync as sync, air_sync_base as asb, email as em};
use workshop::activesync::wbxml::Element;
use workshop::activesync::{
    enumerate_folder_changes, Connection, EnumFolderChangesArgs, FolderChange, ProtocolVersion,
};
use workshop::error::{Result, SyncError};
use workshop::model::message::{FLAG_FLAGGED, FLAG_SEEN};
use workshop::model::IssuedIds;

/// Replies with a canned response and records what was sent.
struct ScriptedConnection {
    version: ProtocolVersion,
    response: Option<Element>,
    sent: Mutex<Vec<Element>>,
}

impl ScriptedConnection {
    fn new(version: &str, response: Option<Element>) -> Self {
        Self {
            version: version.parse().unwrap(),
            response,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn current_version(&self) -> ProtocolVersion {
        self.version
    }

    async fn post_command(&self, request: Element) -> Result<Option<Element>> {
        self.sent.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

fn args() -> EnumFolderChangesArgs {
    EnumFolderChangesArgs {
        folder_sync_key: "100".into(),
        folder_server_id: "5".into(),
        filter_type: sync::filter_type::ONE_MONTH_BACK.into(),
    }
}

fn text(tag: u16, value: &str) -> Element {
    Element::with_text(tag, value)
}

fn response(status: &str, commands: Vec<Element>, more: bool) -> Element {
    let mut collection = Element::new(sync::COLLECTION)
        .child(text(sync::SYNC_KEY, "101"))
        .child(text(sync::COLLECTION_ID, "5"))
        .child(text(sync::STATUS, status));
    if more {
        collection = collection.child(Element::new(sync::MORE_AVAILABLE));
    }
    let mut cmds = Element::new(sync::COMMANDS);
    for cmd in commands {
        cmds = cmds.child(cmd);
    }
    Element::new(sync::SYNC).child(Element::new(sync::COLLECTIONS).child(collection.child(cmds)))
}

fn add(server_id: &str, subject: &str) -> Element {
    Element::new(sync::ADD)
        .child(text(sync::SERVER_ID, server_id))
        .child(
            Element::new(sync::APPLICATION_DATA)
                .child(text(em::SUBJECT, subject))
                .child(text(em::FROM, "Ann <ann@example.com>"))
                .child(text(em::DATE_RECEIVED, "2024-03-10T09:00:00.000Z"))
                .child(text(em::READ, "0"))
                .child(
                    Element::new(asb::BODY)
                        .child(text(asb::TYPE, "1"))
                        .child(text(asb::ESTIMATED_DATA_SIZE, "512")),
                ),
        )
}

fn change(server_id: &str) -> Element {
    Element::new(sync::CHANGE)
        .child(text(sync::SERVER_ID, server_id))
        .child(
            Element::new(sync::APPLICATION_DATA)
                .child(text(em::READ, "1"))
                .child(Element::new(em::FLAG).child(text(em::FLAG_STATUS, "0"))),
        )
}

fn delete(tag: u16, server_id: &str) -> Element {
    Element::new(tag).child(text(sync::SERVER_ID, server_id))
}

/// Hands out sequential ids the way the account layer would.
fn id_issuer() -> impl FnMut() -> IssuedIds {
    let mut next = 0;
    move || {
        next += 1;
        IssuedIds {
            message_id: format!("0\0\05\0m{next}"),
            umid: format!("0\0u{next}"),
            folder_id: "0\05".into(),
        }
    }
}

// ─── Test 1: Changes are emitted in document order ──────────────────

#[tokio::test]
async fn test_emits_add_change_remove_in_order() {
    let conn = ScriptedConnection::new(
        "14.1",
        Some(response(
            "1",
            vec![
                add("5:1", "First"),
                change("5:0"),
                delete(sync::DELETE, "5:9"),
                add("5:2", "Second"),
                delete(sync::SOFT_DELETE, "5:8"),
            ],
            true,
        )),
    );
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let result = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap();

    assert!(!result.invalid_sync_key);
    assert!(!result.no_changes);
    assert!(result.more_available);
    assert_eq!(result.sync_key, "101");

    let order: Vec<&str> = sink.iter().map(FolderChange::server_id).collect();
    assert_eq!(order, vec!["5:1", "5:0", "5:9", "5:2", "5:8"]);

    match &sink[0] {
        FolderChange::Add { message, .. } => {
            assert_eq!(message.id, "0\0\05\0m1");
            assert_eq!(message.subject.as_deref(), Some("First"));
            assert_eq!(message.author.as_ref().unwrap().address, "ann@example.com");
            assert!(message.flags.is_empty());
            assert_eq!(message.body_reps[0].size_estimate, 512);
        }
        other => panic!("expected add, got {other:?}"),
    }
    match &sink[1] {
        FolderChange::Change { changes, .. } => {
            assert_eq!(changes.add, Some(vec![FLAG_SEEN.to_string()]));
            assert_eq!(changes.remove, Some(vec![FLAG_FLAGGED.to_string()]));
        }
        other => panic!("expected change, got {other:?}"),
    }
    assert!(matches!(&sink[3], FolderChange::Add { message, .. } if message.id == "0\0\05\0m2"));
    assert!(matches!(&sink[4], FolderChange::Remove { .. }));
}

// ─── Test 2: Empty response means nothing changed ──────────────────

#[tokio::test]
async fn test_empty_response_is_no_changes() {
    let conn = ScriptedConnection::new("14.1", None);
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let result = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap();
    assert!(result.no_changes);
    assert!(!result.invalid_sync_key);
    assert!(!result.more_available);
    assert_eq!(result.sync_key, "100");
    assert!(sink.is_empty());
}

// ─── Test 3: Invalid sync key is reported, not raised ───────────────

#[tokio::test]
async fn test_invalid_sync_key() {
    let conn = ScriptedConnection::new("14.1", Some(response("3", vec![], false)));
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let result = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap();
    assert!(result.invalid_sync_key);
    assert_eq!(result.sync_key, "0");
    assert!(!result.no_changes);
}

// ─── Test 4: Other statuses are protocol errors ─────────────────────

#[tokio::test]
async fn test_other_status_is_an_error() {
    let conn = ScriptedConnection::new("14.1", Some(response("12", vec![], false)));
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let err = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol { ref status } if status == "12"));
}

// ─── Test 5: A malformed item is skipped, the rest still arrive ─────

#[tokio::test]
async fn test_unparseable_add_is_skipped() {
    let broken = Element::new(sync::ADD)
        .child(text(sync::SERVER_ID, "5:bad"))
        .child(Element::new(sync::APPLICATION_DATA).child(text(em::DATE_RECEIVED, "someday")));
    let conn = ScriptedConnection::new(
        "14.1",
        Some(response("1", vec![broken, add("5:ok", "Fine")], false)),
    );
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let result = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap();
    assert_eq!(result.sync_key, "101");
    let order: Vec<&str> = sink.iter().map(FolderChange::server_id).collect();
    assert_eq!(order, vec!["5:ok"]);
}

// ─── Test 6: Structurally broken response fails the whole sync ──────

#[tokio::test]
async fn test_broken_response_is_unknown_error() {
    // A Status element without a value cannot be walked.
    let bad = Element::new(sync::SYNC).child(
        Element::new(sync::COLLECTIONS)
            .child(Element::new(sync::COLLECTION).child(Element::new(sync::STATUS))),
    );
    let conn = ScriptedConnection::new("14.1", Some(bad));
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();

    let err = enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol { ref status } if status == "unknown"));
}

// ─── Test 7: Request shape depends on the protocol version ──────────

#[tokio::test]
async fn test_legacy_request_shape() {
    let conn = ScriptedConnection::new("2.5", None);
    let mut sink: Vec<FolderChange> = Vec::new();
    let mut issue = id_issuer();
    enumerate_folder_changes(&conn, &args(), &mut issue, &mut sink)
        .await
        .unwrap();

    let sent = conn.sent.lock().unwrap();
    let collection = sent[0]
        .find(sync::COLLECTIONS)
        .and_then(|c| c.find(sync::COLLECTION))
        .unwrap();
    assert_eq!(collection.find(sync::CLASS).and_then(Element::text), Some("Email"));
    assert_eq!(collection.find(sync::COLLECTION_ID).and_then(Element::text), Some("5"));
    let options = collection.find(sync::OPTIONS).unwrap();
    assert_eq!(options.find(sync::FILTER_TYPE).and_then(Element::text), Some("5"));
    assert!(options.find(sync::MIME_SUPPORT).is_some());
    assert!(options.find(sync::TRUNCATION).is_some());
}

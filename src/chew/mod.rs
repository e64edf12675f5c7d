//! Calendar event reconciliation ("chewing").
//!
//! [`chew_event_bundle`] merges the provider's current view of one
//! conversation's events into the previously stored events, producing the
//! new / modified / deleted sets for the task boundary. Providers plug in
//! through [`EventChewer`], which only maps native payloads onto
//! [`CalendarEvent`].

pub mod content;
pub mod gapi;
pub mod links;
pub mod mapi;

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::model::ids::{conv_id_component_from_conv_id, make_message_id};
use crate::model::{CalendarEvent, SyncRange};

pub use gapi::GapiChewer;
pub use mapi::MapiChewer;

/// Everything one reconciliation pass needs.
#[derive(Debug, Clone, Default)]
pub struct ChewArgs {
    pub conv_id: String,
    pub folder_id: String,
    /// Native id of the series root, for providers that send one.
    pub recurring_id: Option<String>,
    pub range: SyncRange,
    /// Native id → provider payload.
    pub event_map: BTreeMap<String, Value>,
    /// Previously stored events of the conversation.
    pub old_events: Vec<CalendarEvent>,
}

/// Per-event inputs the shared core computes for the provider mapping.
#[derive(Debug, Clone)]
pub struct EventContext<'a> {
    pub id: String,
    pub folder_id: &'a str,
    /// Carried over from the prior record; never derived from the payload.
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChewResult {
    pub new_events: Vec<CalendarEvent>,
    /// `None` is a tombstone.
    pub modified_event_map: BTreeMap<String, Option<CalendarEvent>>,
    /// Surviving events, for conversation rollups.
    pub all_events: Vec<CalendarEvent>,
}

/// Maps one provider's payloads onto canonical events.
pub trait EventChewer {
    type Payload: DeserializeOwned;

    const PROVIDER: &'static str;

    fn native_id<'p>(&self, payload: &'p Self::Payload) -> &'p str;

    fn is_cancelled(&self, payload: &Self::Payload) -> bool;

    fn make_event_id(&self, conv_id: &str, native_id: &str) -> Result<String> {
        make_message_id(conv_id, native_id)
    }

    /// Build the canonical record. `ctx.flags` must be copied verbatim.
    fn chew_event(&self, payload: &Self::Payload, ctx: &EventContext<'_>) -> Result<CalendarEvent>;

    /// Remove a synthetic series root from `events`, if the provider uses one.
    fn take_recurrence_root(
        &self,
        _recurring_id: Option<&str>,
        _events: &mut BTreeMap<String, Value>,
    ) -> Option<Map<String, Value>> {
        None
    }

    /// Fill keys missing from `occurrence` with the root's values. The
    /// occurrence's own values always win.
    fn apply_recurrence_root(&self, root: &Map<String, Value>, occurrence: &mut Value) {
        if let Value::Object(fields) = occurrence {
            for (key, value) in root {
                if !fields.contains_key(key) {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Working state of one pass.
#[derive(Default)]
struct Bundle {
    result: ChewResult,
    /// Position in `all_events` of every old event still in the window.
    kept: HashMap<String, usize>,
    /// Flags of old events dropped for falling out of the window.
    evicted_flags: HashMap<String, Vec<String>>,
}

/// Reconcile `args.event_map` against `args.old_events`.
///
/// Per-payload failures are logged and the payload skipped, except for
/// [`SyncError::Critical`], which aborts the pass. A malformed `conv_id`
/// fails before any payload is looked at.
pub fn chew_event_bundle<C: EventChewer>(chewer: &C, args: ChewArgs) -> Result<ChewResult> {
    let ChewArgs {
        conv_id,
        folder_id,
        recurring_id,
        range,
        mut event_map,
        old_events,
    } = args;
    // A bad conversation id would fail every payload; refuse the whole pass.
    conv_id_component_from_conv_id(&conv_id)?;
    let mut bundle = Bundle::default();

    // Old events that no longer fit the window are deleted.
    for old in old_events {
        if range.event_outside(old.start_date, old.end_date) {
            trace!(event = %old.id, "Event left the sync window");
            bundle
                .result
                .modified_event_map
                .insert(old.id.clone(), None);
            bundle.evicted_flags.insert(old.id, old.flags);
        } else {
            bundle
                .kept
                .insert(old.id.clone(), bundle.result.all_events.len());
            bundle.result.all_events.push(old);
        }
    }

    let root = chewer.take_recurrence_root(recurring_id.as_deref(), &mut event_map);

    for (native_key, mut raw) in event_map {
        if let Some(root) = &root {
            chewer.apply_recurrence_root(root, &mut raw);
        }
        match chew_one(chewer, &mut bundle, &conv_id, &folder_id, &native_key, raw) {
            Ok(()) => {}
            Err(e) if e.is_critical() => return Err(e),
            Err(e) => {
                warn!(
                    provider = C::PROVIDER,
                    event = %native_key,
                    error = %e,
                    "Skipping event that failed to chew"
                );
            }
        }
    }

    let Bundle { mut result, .. } = bundle;
    let modified = &result.modified_event_map;
    result
        .all_events
        .retain(|e| !matches!(modified.get(&e.id), Some(None)));

    debug!(
        provider = C::PROVIDER,
        conv_id = %conv_id.escape_default(),
        new = result.new_events.len(),
        modified = result.modified_event_map.len(),
        all = result.all_events.len(),
        "Chewed event bundle"
    );
    Ok(result)
}

fn chew_one<C: EventChewer>(
    chewer: &C,
    bundle: &mut Bundle,
    conv_id: &str,
    folder_id: &str,
    native_key: &str,
    raw: Value,
) -> Result<()> {
    let payload: C::Payload =
        serde_json::from_value(raw).map_err(|e| SyncError::parse(native_key, e.to_string()))?;
    let id = chewer.make_event_id(conv_id, chewer.native_id(&payload))?;

    if chewer.is_cancelled(&payload) {
        debug!(provider = C::PROVIDER, event = %native_key, "Event cancelled");
        bundle.result.modified_event_map.insert(id, None);
        return Ok(());
    }

    let kept_at = bundle.kept.get(&id).copied();
    let flags = match kept_at {
        Some(i) => bundle.result.all_events[i].flags.clone(),
        None => bundle.evicted_flags.get(&id).cloned().unwrap_or_default(),
    };
    let ctx = EventContext {
        id: id.clone(),
        folder_id,
        flags,
    };
    let event = chewer.chew_event(&payload, &ctx)?;
    let result = &mut bundle.result;

    if let Some(i) = kept_at {
        result.modified_event_map.insert(id, Some(event.clone()));
        result.all_events[i] = event;
    } else if matches!(result.modified_event_map.get(&id), Some(None)) {
        // Back inside the window after the old copy was evicted above.
        trace!(event = %native_key, "Event re-entered the sync window");
        result.modified_event_map.insert(id, Some(event.clone()));
        result.all_events.push(event);
    } else {
        result.new_events.push(event.clone());
        result.all_events.push(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    /// Minimal provider: `{id, start, end, title?, gone?, explode?}`.
    struct Toy;

    #[derive(Deserialize)]
    struct ToyEvent {
        id: String,
        #[serde(default)]
        start: i64,
        #[serde(default)]
        end: i64,
        title: Option<String>,
        #[serde(default)]
        gone: bool,
        #[serde(default)]
        explode: bool,
    }

    impl EventChewer for Toy {
        type Payload = ToyEvent;
        const PROVIDER: &'static str = "toy";

        fn native_id<'p>(&self, payload: &'p ToyEvent) -> &'p str {
            &payload.id
        }

        fn is_cancelled(&self, payload: &ToyEvent) -> bool {
            payload.gone
        }

        fn chew_event(&self, p: &ToyEvent, ctx: &EventContext<'_>) -> Result<CalendarEvent> {
            if p.explode {
                return Err(SyncError::Critical("response is garbage".into()));
            }
            Ok(CalendarEvent {
                id: ctx.id.clone(),
                date: p.start,
                start_date: p.start,
                end_date: p.end,
                subject: p.title.clone(),
                flags: ctx.flags.clone(),
                folder_ids: [ctx.folder_id.to_string()].into(),
                ..Default::default()
            })
        }
    }

    const CONV: &str = "0\0\0series";

    fn eid(native: &str) -> String {
        make_message_id(CONV, native).unwrap()
    }

    fn old(native: &str, start: i64, end: i64, flags: &[&str]) -> CalendarEvent {
        CalendarEvent {
            id: eid(native),
            start_date: start,
            end_date: end,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn args(old_events: Vec<CalendarEvent>, payloads: Vec<Value>, range: SyncRange) -> ChewArgs {
        ChewArgs {
            conv_id: CONV.into(),
            folder_id: "0\0cal".into(),
            recurring_id: None,
            range,
            event_map: payloads
                .into_iter()
                .map(|p| (p["id"].as_str().unwrap().to_string(), p))
                .collect(),
            old_events,
        }
    }

    #[test]
    fn test_modified_event_keeps_flags_and_replaces_in_place() {
        let out = chew_event_bundle(
            &Toy,
            args(
                vec![old("e1", 100, 110, &["starred"])],
                vec![json!({"id": "e1", "start": 100, "end": 110, "title": "Updated"})],
                SyncRange::new(99, 111),
            ),
        )
        .unwrap();

        assert!(out.new_events.is_empty());
        let rec = out.modified_event_map[&eid("e1")].as_ref().unwrap();
        assert_eq!(rec.subject.as_deref(), Some("Updated"));
        assert_eq!(rec.flags, vec!["starred"]);
        assert_eq!(out.all_events.len(), 1);
        assert_eq!(out.all_events[0].subject.as_deref(), Some("Updated"));
    }

    #[test]
    fn test_window_eviction_and_resurrection() {
        let out = chew_event_bundle(
            &Toy,
            args(
                vec![
                    old("gone", 10, 20, &[]),
                    old("back", 30, 40, &["\\Flagged"]),
                ],
                vec![json!({"id": "back", "start": 500, "end": 510})],
                SyncRange::new(400, 600),
            ),
        )
        .unwrap();

        assert_eq!(out.modified_event_map[&eid("gone")], None);
        let back = out.modified_event_map[&eid("back")].as_ref().unwrap();
        assert_eq!(back.start_date, 500);
        assert_eq!(back.flags, vec!["\\Flagged"]);
        assert!(out.new_events.is_empty());
        let ids: Vec<&str> = out.all_events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![eid("back").as_str()]);
    }

    #[test]
    fn test_cancelled_and_new_events() {
        let out = chew_event_bundle(
            &Toy,
            args(
                vec![old("e1", 100, 110, &[])],
                vec![
                    json!({"id": "e1", "gone": true}),
                    json!({"id": "e2", "start": 105, "end": 106}),
                ],
                SyncRange::new(0, 1000),
            ),
        )
        .unwrap();

        assert_eq!(out.modified_event_map.len(), 1);
        assert_eq!(out.modified_event_map[&eid("e1")], None);
        assert_eq!(out.new_events.len(), 1);
        assert_eq!(out.all_events.len(), 1);
        assert_eq!(out.all_events[0].id, eid("e2"));
    }

    #[test]
    fn test_bad_payload_skipped() {
        let out = chew_event_bundle(
            &Toy,
            args(
                vec![],
                vec![
                    json!({"id": "ok", "start": 1, "end": 2}),
                    json!({"id": "bad", "start": "not a number"}),
                    json!({"id": "nul\u{0}id"}),
                ],
                SyncRange::new(0, 10),
            ),
        )
        .unwrap();
        assert_eq!(out.new_events.len(), 1);
        assert_eq!(out.all_events.len(), 1);
    }

    #[test]
    fn test_critical_error_aborts() {
        let err = chew_event_bundle(
            &Toy,
            args(
                vec![],
                vec![
                    json!({"id": "a", "start": 1, "end": 2}),
                    json!({"id": "b", "explode": true}),
                ],
                SyncRange::new(0, 10),
            ),
        )
        .unwrap_err();
        assert!(err.is_critical());
    }

    #[test]
    fn test_malformed_conv_id_fails_the_pass() {
        let mut bad = args(
            vec![],
            vec![json!({"id": "e1", "start": 1, "end": 2})],
            SyncRange::new(0, i64::MAX),
        );
        bad.conv_id = "c1".into();
        let err = chew_event_bundle(&Toy, bad).unwrap_err();
        assert!(matches!(err, SyncError::MalformedId { ref id, .. } if id == "c1"));
    }

    #[test]
    fn test_root_backfill_never_overrides() {
        let mut occurrence = json!({"id": "o1", "title": "Own"});
        let root = json!({"id": "root", "title": "Series", "start": 5})
            .as_object()
            .cloned()
            .unwrap();
        Toy.apply_recurrence_root(&root, &mut occurrence);
        assert_eq!(occurrence, json!({"id": "o1", "title": "Own", "start": 5}));
    }
}

//! Live, windowed list views ("tables of contents") and their registry.
//!
//! A TOC is a continuously-updated ordered projection the display layer
//! polls with [`Toc::data_for_slice_range`] and observes through
//! [`TocEvent`]s. [`BaseToc`] carries the state every TOC shares; concrete
//! TOCs embed it and implement [`Toc`].

pub mod registry;
pub mod static_toc;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::resource::{OnForgotten, Refed, RefedResource};

pub use registry::{NamespaceProvider, StaticEntry, TocManager};
pub use static_toc::StaticToc;

/// Free-form summary state of a TOC (sync status, counts, ...).
pub type TocMeta = Map<String, Value>;

/// Position in a TOC's ordering key space.
pub type OrderingKey = usize;

/// Identifier of an item inside a TOC.
pub type ItemId = usize;

/// Notification delivered to TOC observers.
#[derive(Debug, Clone, PartialEq)]
pub enum TocEvent {
    /// At least one `tocMeta` key changed. Carries the full meta, not a diff.
    MetaChange(TocMeta),
    /// An event the display proxy should batch and relay verbatim.
    Broadcast { name: String, data: Value },
}

/// Handle returned by [`BaseToc::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&TocEvent) + Send + Sync>;

/// Contributes summary state to a TOC while it is active.
pub trait MetaHelper: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn activate(&self, toc: &BaseToc);

    fn deactivate(&self, toc: &BaseToc);
}

/// One constituent of a TOC refresh.
#[async_trait]
pub trait RefreshHelper: Send + Sync {
    async fn refresh(&self, why: &str) -> Result<()>;
}

/// Construction options shared by all TOCs.
#[derive(Default)]
pub struct TocOptions {
    pub meta_helpers: Vec<Arc<dyn MetaHelper>>,
    pub refresh_helpers: Vec<Arc<dyn RefreshHelper>>,
    pub on_forgotten: Option<OnForgotten>,
}

/// State and behavior common to every TOC.
pub struct BaseToc {
    refs: RefedResource,
    meta_helpers: Vec<Arc<dyn MetaHelper>>,
    refresh_helpers: Vec<Arc<dyn RefreshHelper>>,
    toc_meta: Mutex<TocMeta>,
    ever_activated: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl BaseToc {
    pub fn new(options: TocOptions) -> Self {
        Self {
            refs: RefedResource::new(options.on_forgotten),
            meta_helpers: options.meta_helpers,
            refresh_helpers: options.refresh_helpers,
            toc_meta: Mutex::new(TocMeta::new()),
            ever_activated: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn refed(&self) -> &RefedResource {
        &self.refs
    }

    pub fn ever_activated(&self) -> bool {
        self.ever_activated.load(Ordering::SeqCst)
    }

    /// Snapshot of the current meta state.
    pub fn toc_meta(&self) -> TocMeta {
        self.lock_meta().clone()
    }

    /// Activate meta helpers in registration order, then run the concrete
    /// TOC's own activation.
    pub async fn activate<Fut>(&self, activate_toc: Fut) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        self.ever_activated.store(true, Ordering::SeqCst);
        for helper in &self.meta_helpers {
            debug!(helper = helper.name(), "Activating meta helper");
            helper.activate(self);
        }
        activate_toc.await
    }

    /// Deactivate meta helpers (only if we were ever activated), then run the
    /// concrete TOC's own deactivation.
    pub fn deactivate<F>(&self, deactivate_toc: F)
    where
        F: FnOnce(),
    {
        if self.ever_activated() {
            for helper in &self.meta_helpers {
                helper.deactivate(self);
            }
        }
        deactivate_toc();
    }

    /// Merge `changes` into the meta state, notifying observers once if any
    /// value actually changed.
    pub fn apply_toc_meta_changes(&self, changes: TocMeta) {
        let snapshot = {
            let mut meta = self.lock_meta();
            let mut something_changed = false;
            for (key, value) in changes {
                if meta.get(&key) != Some(&value) {
                    meta.insert(key, value);
                    something_changed = true;
                }
            }
            if !something_changed {
                return;
            }
            meta.clone()
        };
        debug!(keys = snapshot.len(), "tocMeta changed");
        self.emit(&TocEvent::MetaChange(snapshot));
    }

    pub fn broadcast_event(&self, name: impl Into<String>, data: Value) {
        self.emit(&TocEvent::Broadcast {
            name: name.into(),
            data,
        });
    }

    /// Run every refresh helper concurrently. Succeeds only if all succeed;
    /// the first failure is returned.
    pub async fn refresh(&self, why: &str) -> Result<()> {
        let pending: Vec<BoxFuture<'_, Result<()>>> = self
            .refresh_helpers
            .iter()
            .map(|helper| helper.refresh(why))
            .collect();
        futures::future::try_join_all(pending).await?;
        Ok(())
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TocEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the listener was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn emit(&self, event: &TocEvent) {
        // Listeners may subscribe/unsubscribe from inside a callback.
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn lock_meta(&self) -> MutexGuard<'_, TocMeta> {
        self.toc_meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-item payload sent to the display layer for a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceState {
    pub item: Value,
    pub overlays: Option<Value>,
    pub match_info: Option<Value>,
}

/// Answer to a slice request.
///
/// Synchronous TOCs leave `pending_reads`/`read_future` empty; paged TOCs
/// list the ids still being loaded and a future that resolves once they are.
pub struct SliceData {
    pub ids: Vec<ItemId>,
    pub state: BTreeMap<ItemId, SliceState>,
    pub pending_reads: Option<Vec<ItemId>>,
    pub read_future: Option<BoxFuture<'static, Result<()>>>,
    pub new_valid_data_set: BTreeSet<ItemId>,
}

/// The windowed-list contract polled by the display layer.
pub trait Toc: Refed {
    fn base(&self) -> &BaseToc;

    fn toc_type(&self) -> &'static str;

    fn overlay_namespace(&self) -> Option<&str> {
        None
    }

    fn height_aware(&self) -> bool {
        false
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn total_height(&self) -> usize;

    fn top_ordering_key(&self) -> OrderingKey;

    fn ordering_key_for_index(&self, index: usize) -> OrderingKey;

    fn find_index_for_ordering_key(&self, key: OrderingKey) -> usize;

    /// Ids for `[begin_inclusive, end_exclusive)` plus the state for any id
    /// not already in `already_known`.
    fn data_for_slice_range(
        &self,
        begin_inclusive: usize,
        end_exclusive: usize,
        already_known: &BTreeSet<ItemId>,
    ) -> SliceData;
}

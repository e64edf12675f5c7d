//! Owning contexts for refed resources.
//!
//! A [`NamedContext`] acquires resources on behalf of one display-layer handle
//! and releases everything it acquired when it is cleaned up. A
//! [`BridgeContext`] tracks the named contexts of one bridge so that derived
//! (child) contexts are cleaned up together with their parent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::resource::{ContextId, Refed};

type Releaser = Box<dyn FnOnce(ContextId) -> Result<()> + Send>;

pub struct NamedContext {
    id: ContextId,
    name: String,
    active: AtomicBool,
    stuff_to_release: Mutex<Vec<Releaser>>,
    children: Mutex<Vec<String>>,
}

impl NamedContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ContextId::next(),
            name: name.into(),
            active: AtomicBool::new(true),
            stuff_to_release: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Acquire `resource` and remember to release it at cleanup.
    pub async fn acquire<T>(&self, resource: Arc<T>) -> Result<Arc<T>>
    where
        T: Refed + ?Sized + 'static,
    {
        if !self.is_active() {
            return Err(SyncError::ContextClosed(self.name.clone()));
        }

        resource.acquire(self.id).await?;
        let held = Arc::clone(&resource);
        self.lock_release()
            .push(Box::new(move |ctx| held.release(ctx)));
        Ok(resource)
    }

    /// Schedule `func` to run at cleanup time.
    pub fn run_at_cleanup<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock_release().push(Box::new(move |_| {
            func();
            Ok(())
        }));
    }

    /// Release everything acquired through this context. Failures are logged
    /// and do not stop the remaining releases.
    pub fn cleanup(&self) {
        self.active.store(false, Ordering::SeqCst);
        let releasers: Vec<Releaser> = self.lock_release().drain(..).collect();
        debug!(context = %self.name, count = releasers.len(), "Cleaning up context");
        for release in releasers {
            if let Err(e) = release(self.id) {
                warn!(context = %self.name, error = %e, "Problem releasing resource");
            }
        }
    }

    fn lock_release(&self) -> MutexGuard<'_, Vec<Releaser>> {
        self.stuff_to_release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks the named contexts belonging to one bridge.
pub struct BridgeContext {
    name: String,
    named_contexts: Mutex<HashMap<String, Arc<NamedContext>>>,
}

impl BridgeContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            named_contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a context. A `parent` cleans this context up with itself.
    pub fn create_named_context(
        &self,
        name: impl Into<String>,
        parent: Option<&NamedContext>,
    ) -> Arc<NamedContext> {
        let ctx = Arc::new(NamedContext::new(name));
        self.lock_contexts()
            .insert(ctx.name().to_string(), Arc::clone(&ctx));
        if let Some(parent) = parent {
            parent
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ctx.name().to_string());
        }
        ctx
    }

    pub fn get_named_context_or_err(&self, name: &str) -> Result<Arc<NamedContext>> {
        self.maybe_get_named_context(name)
            .ok_or_else(|| SyncError::NoSuchContext(name.to_string()))
    }

    pub fn maybe_get_named_context(&self, name: &str) -> Option<Arc<NamedContext>> {
        self.lock_contexts().get(name).cloned()
    }

    /// Clean up a context and its children. Unknown names are ignored.
    pub fn cleanup_named_context(&self, name: &str) {
        let Some(ctx) = self.maybe_get_named_context(name) else {
            return;
        };
        let children: Vec<String> = ctx
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for child in &children {
            self.cleanup_named_context(child);
        }
        self.lock_contexts().remove(name);
        ctx.cleanup();
    }

    pub fn cleanup_all(&self) {
        let all: Vec<Arc<NamedContext>> = self.lock_contexts().drain().map(|(_, c)| c).collect();
        for ctx in all {
            ctx.cleanup();
        }
    }

    fn lock_contexts(&self) -> MutexGuard<'_, HashMap<String, Arc<NamedContext>>> {
        self.named_contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::{StaticToc, Toc, TocOptions};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn toc() -> Arc<StaticToc> {
        Arc::new(StaticToc::new(vec![json!(1)], TocOptions::default()))
    }

    #[tokio::test]
    async fn test_cleanup_releases_acquired() {
        let ctx = NamedContext::new("view1");
        let t = ctx.acquire(toc()).await.unwrap();
        assert_eq!(t.base().refed().consumer_count(), 1);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_cb = ran.clone();
        ctx.run_at_cleanup(move || {
            ran_cb.fetch_add(1, Ordering::SeqCst);
        });

        ctx.cleanup();
        assert_eq!(t.base().refed().consumer_count(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(matches!(
            ctx.acquire(toc()).await,
            Err(SyncError::ContextClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_parent_cleanup_cascades() {
        let bridge = BridgeContext::new("bridge");
        let parent = bridge.create_named_context("conv", None);
        let child = bridge.create_named_context("conv-derived", Some(&parent));
        let t = child.acquire(toc()).await.unwrap();

        bridge.cleanup_named_context("conv");
        assert!(bridge.maybe_get_named_context("conv").is_none());
        assert!(bridge.maybe_get_named_context("conv-derived").is_none());
        assert_eq!(t.base().refed().consumer_count(), 0);

        // Idempotent.
        bridge.cleanup_named_context("conv");
        assert!(bridge.get_named_context_or_err("conv").is_err());
    }
}

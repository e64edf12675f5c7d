//! Reference-counted resource lifecycle.
//!
//! A [`RefedResource`] is embedded in anything that is lazily activated when
//! first referenced and torn down when the last reference goes away (TOCs,
//! account handles, ...). Owners are identified by [`ContextId`]; each owner
//! may hold at most one reference.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{Result, SyncError};

/// Identity of an owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl ContextId {
    /// Issue a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Callback fired once when the reference count drops to zero.
pub type OnForgotten = Box<dyn FnOnce() + Send>;

#[derive(Debug, Default)]
struct RefState {
    consumers: Vec<ContextId>,
    valid: bool,
}

/// Reference-count bookkeeping shared by every refed resource.
pub struct RefedResource {
    state: Mutex<RefState>,
    /// Held for the duration of an activation; later acquirers queue here.
    activation: tokio::sync::Mutex<()>,
    on_forgotten: Mutex<Option<OnForgotten>>,
}

impl fmt::Debug for RefedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RefedResource")
            .field("consumers", &state.consumers)
            .field("valid", &state.valid)
            .finish()
    }
}

impl RefedResource {
    pub fn new(on_forgotten: Option<OnForgotten>) -> Self {
        Self {
            state: Mutex::new(RefState::default()),
            activation: tokio::sync::Mutex::new(()),
            on_forgotten: Mutex::new(on_forgotten),
        }
    }

    /// Number of contexts currently holding a reference.
    pub fn consumer_count(&self) -> usize {
        self.lock_state().consumers.len()
    }

    /// Whether activation has completed for the current referenced period.
    pub fn is_valid(&self) -> bool {
        self.lock_state().valid
    }

    /// Whether `ctx` holds a reference.
    pub fn is_held_by(&self, ctx: ContextId) -> bool {
        self.lock_state().consumers.contains(&ctx)
    }

    /// Add a reference for `ctx`, running `activate` if the resource is not
    /// yet valid.
    ///
    /// Acquirers that arrive while an activation is in flight wait for it to
    /// finish instead of starting their own. If activation fails, the
    /// reference taken by `ctx` is rolled back.
    pub async fn acquire_with<F, Fut>(&self, ctx: ContextId, activate: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        {
            let mut state = self.lock_state();
            if state.consumers.contains(&ctx) {
                return Err(SyncError::AlreadyReferenced(ctx.0));
            }
            state.consumers.push(ctx);
            trace!(%ctx, refs = state.consumers.len(), "Acquired reference");
            if state.valid {
                return Ok(());
            }
        }

        let _gate = self.activation.lock().await;
        let already_valid = self.lock_state().valid;
        if already_valid {
            return Ok(());
        }

        debug!(%ctx, "Activating resource");
        match activate().await {
            Ok(()) => {
                self.lock_state().valid = true;
                Ok(())
            }
            Err(e) => {
                self.lock_state().consumers.retain(|c| *c != ctx);
                Err(e)
            }
        }
    }

    /// Drop the reference held by `ctx`. On the last release, `deactivate`
    /// runs and then the one-shot forgotten callback.
    pub fn release_with<F>(&self, ctx: ContextId, deactivate: F) -> Result<()>
    where
        F: FnOnce(),
    {
        let now_unreferenced = {
            let mut state = self.lock_state();
            let idx = state
                .consumers
                .iter()
                .position(|c| *c == ctx)
                .ok_or(SyncError::NotReferenced(ctx.0))?;
            state.consumers.remove(idx);
            trace!(%ctx, refs = state.consumers.len(), "Released reference");
            if state.consumers.is_empty() {
                state.valid = false;
                true
            } else {
                false
            }
        };

        if now_unreferenced {
            debug!(%ctx, "Deactivating resource");
            deactivate();
            let forgotten = self
                .on_forgotten
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(callback) = forgotten {
                callback();
            }
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, RefState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A resource whose lifetime is governed by context references.
#[async_trait]
pub trait Refed: Send + Sync {
    /// The embedded reference-count state.
    fn refed(&self) -> &RefedResource;

    /// Runs on the transition from zero references to one.
    async fn activate(&self) -> Result<()>;

    /// Runs on the transition back to zero references.
    fn deactivate(&self);

    /// Acquire a reference owned by `ctx`.
    async fn acquire(&self, ctx: ContextId) -> Result<()> {
        self.refed().acquire_with(ctx, || self.activate()).await
    }

    /// Release the reference owned by `ctx`.
    fn release(&self, ctx: ContextId) -> Result<()> {
        self.refed().release_with(ctx, || self.deactivate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Counting {
        refs: RefedResource,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
    }

    impl Counting {
        fn new(forgotten: Arc<AtomicUsize>) -> Self {
            Self {
                refs: RefedResource::new(Some(Box::new(move || {
                    forgotten.fetch_add(1, Ordering::SeqCst);
                }))),
                activations: AtomicUsize::new(0),
                deactivations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Refed for Counting {
        fn refed(&self) -> &RefedResource {
            &self.refs
        }

        async fn activate(&self) -> Result<()> {
            tokio::task::yield_now().await;
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_concurrent_acquire_activates_once() {
        let forgotten = Arc::new(AtomicUsize::new(0));
        let res = Counting::new(forgotten.clone());
        let (a, b, c) = (ContextId::next(), ContextId::next(), ContextId::next());

        let (ra, rb, rc) = tokio::join!(res.acquire(a), res.acquire(b), res.acquire(c));
        ra.unwrap();
        rb.unwrap();
        rc.unwrap();
        assert_eq!(res.activations.load(Ordering::SeqCst), 1);
        assert!(res.refs.is_valid());
        assert_eq!(res.refs.consumer_count(), 3);

        res.release(b).unwrap();
        res.release(a).unwrap();
        assert_eq!(res.deactivations.load(Ordering::SeqCst), 0);
        res.release(c).unwrap();
        assert_eq!(res.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(forgotten.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_acquire_rejected() {
        let res = Counting::new(Arc::new(AtomicUsize::new(0)));
        let ctx = ContextId::next();
        res.acquire(ctx).await.unwrap();
        let err = res.acquire(ctx).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyReferenced(_)));
        assert_eq!(res.refs.consumer_count(), 1);
    }

    #[tokio::test]
    async fn test_release_without_acquire_rejected() {
        let res = Counting::new(Arc::new(AtomicUsize::new(0)));
        let err = res.release(ContextId::next()).unwrap_err();
        assert!(matches!(err, SyncError::NotReferenced(_)));
        assert_eq!(res.deactivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forgotten_fires_only_once_across_cycles() {
        let forgotten = Arc::new(AtomicUsize::new(0));
        let res = Counting::new(forgotten.clone());
        let ctx = ContextId::next();

        for _ in 0..3 {
            res.acquire(ctx).await.unwrap();
            res.release(ctx).unwrap();
        }

        assert_eq!(res.activations.load(Ordering::SeqCst), 3);
        assert_eq!(res.deactivations.load(Ordering::SeqCst), 3);
        assert_eq!(forgotten.load(Ordering::SeqCst), 1);
    }

    struct FailingActivation {
        refs: RefedResource,
    }

    #[async_trait]
    impl Refed for FailingActivation {
        fn refed(&self) -> &RefedResource {
            &self.refs
        }

        async fn activate(&self) -> Result<()> {
            Err(SyncError::Activation("backing store unavailable".into()))
        }

        fn deactivate(&self) {}
    }

    #[tokio::test]
    async fn test_failed_activation_rolls_back_reference() {
        let res = FailingActivation {
            refs: RefedResource::new(None),
        };
        let ctx = ContextId::next();
        assert!(res.acquire(ctx).await.is_err());
        assert_eq!(res.refs.consumer_count(), 0);
        assert!(!res.refs.is_held_by(ctx));
    }
}

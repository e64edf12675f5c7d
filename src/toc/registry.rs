//! Registry routing `(namespace, name)` pairs to TOC instances.
//!
//! Static namespaces are backed by fixed item arrays (or factories); array
//! backed TOCs are cached while live so every context looking at the same
//! name shares one instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use crate::context::NamedContext;
use crate::error::{Result, SyncError};

use super::{StaticToc, Toc, TocOptions};

/// Builds an (unacquired) TOC for a static namespace entry.
pub type TocFactory = Arc<dyn Fn() -> Arc<dyn Toc> + Send + Sync>;

/// Builds an (unacquired) TOC for any name in a dynamic namespace.
pub type DynamicFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Toc>> + Send + Sync>;

/// One named entry of a static namespace.
#[derive(Clone)]
pub enum StaticEntry {
    Items(Vec<Value>),
    Factory(TocFactory),
}

pub enum NamespaceProvider {
    Static(HashMap<String, StaticEntry>),
    Dynamic(DynamicFactory),
}

type CacheKey = (String, String);
type TocCache = Arc<Mutex<HashMap<CacheKey, Weak<StaticToc>>>>;

#[derive(Default)]
pub struct TocManager {
    providers: Mutex<HashMap<String, Arc<NamespaceProvider>>>,
    cache: TocCache,
}

impl TocManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for `namespace`.
    pub fn register_namespace_provider(
        &self,
        namespace: impl Into<String>,
        provider: NamespaceProvider,
    ) {
        let namespace = namespace.into();
        debug!(%namespace, "Registering TOC namespace");
        self.lock_providers().insert(namespace, Arc::new(provider));
    }

    /// Register a static namespace from a JSON object of `name -> [items]`.
    pub fn register_namespace_value(
        &self,
        namespace: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        let namespace = namespace.into();
        let Value::Object(map) = value else {
            return Err(SyncError::BadProvider(namespace));
        };

        let mut entries = HashMap::with_capacity(map.len());
        for (name, items) in map {
            match items {
                Value::Array(items) => {
                    entries.insert(name, StaticEntry::Items(items));
                }
                _ => return Err(SyncError::BadProvider(namespace)),
            }
        }

        self.register_namespace_provider(namespace, NamespaceProvider::Static(entries));
        Ok(())
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_providers().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve `(namespace, name)` to a TOC and acquire it on behalf of `ctx`.
    pub async fn acquire_extension_toc(
        &self,
        ctx: &NamedContext,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<dyn Toc>> {
        let provider = self
            .lock_providers()
            .get(namespace)
            .cloned()
            .ok_or_else(|| SyncError::UnknownNamespace(namespace.to_string()))?;

        let toc: Arc<dyn Toc> = match provider.as_ref() {
            NamespaceProvider::Dynamic(factory) => factory(name)?,
            NamespaceProvider::Static(entries) => match entries.get(name) {
                Some(StaticEntry::Items(items)) => self.cached_static_toc(namespace, name, items),
                Some(StaticEntry::Factory(factory)) => factory(),
                None => {
                    return Err(SyncError::UnknownTocName {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    })
                }
            },
        };

        ctx.acquire(toc).await
    }

    /// Whether a live TOC is cached for `(namespace, name)`.
    pub fn is_cached(&self, namespace: &str, name: &str) -> bool {
        lock_cache(&self.cache)
            .get(&(namespace.to_string(), name.to_string()))
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn cached_static_toc(&self, namespace: &str, name: &str, items: &[Value]) -> Arc<dyn Toc> {
        let key = (namespace.to_string(), name.to_string());
        let mut cache = lock_cache(&self.cache);
        if let Some(live) = cache.get(&key).and_then(Weak::upgrade) {
            trace!(%namespace, %name, "Reusing cached static TOC");
            return live;
        }

        let evict_from = Arc::clone(&self.cache);
        let evict_key = key.clone();
        let toc = Arc::new_cyclic(|me: &Weak<StaticToc>| {
            let me = me.clone();
            let on_forgotten = Box::new(move || {
                let mut cache = lock_cache(&evict_from);
                if cache
                    .get(&evict_key)
                    .is_some_and(|cached| Weak::ptr_eq(cached, &me))
                {
                    trace!(namespace = %evict_key.0, name = %evict_key.1, "Evicting static TOC");
                    cache.remove(&evict_key);
                }
            });
            StaticToc::new(
                items.to_vec(),
                TocOptions {
                    on_forgotten: Some(on_forgotten),
                    ..Default::default()
                },
            )
        });
        cache.insert(key, Arc::downgrade(&toc));
        toc
    }

    fn lock_providers(&self) -> MutexGuard<'_, HashMap<String, Arc<NamespaceProvider>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_cache(cache: &TocCache) -> MutexGuard<'_, HashMap<CacheKey, Weak<StaticToc>>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

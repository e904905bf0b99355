use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::config::{DependVarFn, MemoConfig};
use crate::error::MemoError;
use crate::fs;
use crate::key::{self, CacheKey, CallArgs, ParamSpec, ResolvedCall};

/// Why a cached entry was discarded before a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// The caller passed the force flag.
    Forced,
    /// No entry exists for the derived key.
    Missing,
    /// The function-scoped entry outlived the configured timeout.
    Expired,
    /// The watched dependency variable changed since the last call.
    DependencyChanged,
    /// The dependency path was modified after the last successful
    /// computation.
    PathTouched,
}

/// In-memory table for one wrapped function.
///
/// `created_at` is one clock for the whole function, not per key:
/// recomputing any key resets the staleness clock governing every key.
pub(crate) struct MemoStore<T> {
    entries: HashMap<CacheKey, T>,
    pub(crate) created_at: Option<SystemTime>,
    captured_var: Option<Value>,
}

impl<T> MemoStore<T> {
    pub(crate) fn new() -> Self {
        MemoStore {
            entries: HashMap::new(),
            created_at: None,
            captured_var: None,
        }
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<&T> {
        self.entries.get(key)
    }

    pub(crate) fn put(&mut self, key: CacheKey, value: T, now: SystemTime) {
        self.entries.insert(key, value);
        self.created_at = Some(now);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Re-samples the dependency variable, reporting whether it changed.
    ///
    /// The captured value refreshes on every call, whatever the
    /// comparison says.
    fn sample_depend_var(&mut self, depend_var: &Option<DependVarFn>) -> bool {
        let Some(sample) = depend_var.as_ref().map(|f| f()) else {
            return false;
        };
        let changed = self.captured_var.as_ref() != Some(&sample);
        self.captured_var = Some(sample);
        changed
    }
}

/// The per-call signals the invalidation decision is made from.
pub(crate) struct PolicyInputs<'a> {
    pub(crate) force: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) depend_var: &'a Option<DependVarFn>,
    /// Modification time of the dependency path, when one is configured
    /// and readable.
    pub(crate) depend_mtime: Option<SystemTime>,
}

/// Decides whether the cached entry for `key` may be served.
///
/// Any positive signal forces recomputation. The dependency variable is
/// sampled unconditionally so the captured value stays current even on
/// forced calls. The dependency-path check is skipped until a successful
/// computation has been recorded.
pub(crate) fn invalidation<T>(
    store: &mut MemoStore<T>,
    key: &CacheKey,
    inputs: PolicyInputs<'_>,
    now: SystemTime,
) -> Option<Invalidation> {
    let var_changed = store.sample_depend_var(inputs.depend_var);

    if inputs.force {
        return Some(Invalidation::Forced);
    }
    if store.get(key).is_none() {
        return Some(Invalidation::Missing);
    }
    if let (Some(timeout), Some(created_at)) = (inputs.timeout, store.created_at) {
        let age = now.duration_since(created_at).unwrap_or_default();
        if age > timeout {
            return Some(Invalidation::Expired);
        }
    }
    if var_changed {
        return Some(Invalidation::DependencyChanged);
    }
    if let (Some(mtime), Some(created_at)) = (inputs.depend_mtime, store.created_at) {
        if mtime > created_at {
            return Some(Invalidation::PathTouched);
        }
    }

    None
}

/// A memoized function: a wrapped body plus one cache table.
///
/// Installing a wrapper produces this handle; whoever installs it owns
/// the cache, and every caller sharing the handle shares the table. The
/// table is unbounded and lives as long as the handle — there is no
/// eviction, only overwriting on recompute.
pub struct Memoized<T, F> {
    name: String,
    params: Vec<ParamSpec>,
    config: MemoConfig,
    inner: Mutex<Inner<T, F>>,
}

struct Inner<T, F> {
    body: F,
    store: MemoStore<T>,
}

impl<T, F> std::fmt::Debug for Memoized<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.lock().map(|i| i.store.len()).unwrap_or_default();
        f.debug_struct("Memoized")
            .field("name", &self.name)
            .field("entries", &entries)
            .finish()
    }
}

impl<T, F> Memoized<T, F> {
    /// Installs a wrapper around `body`.
    ///
    /// `params` declares the body's parameters in order; `name` labels
    /// the cache in diagnostics and key metadata.
    pub fn new<E>(
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        config: MemoConfig,
        body: F,
    ) -> Self
    where
        F: FnMut(&ResolvedCall) -> Result<T, E>,
    {
        Memoized {
            name: name.into(),
            params,
            config,
            inner: Mutex::new(Inner {
                body,
                store: MemoStore::new(),
            }),
        }
    }

    /// The name this wrapper was installed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the wrapped function through the cache.
    ///
    /// The wrapper's mutex is held across the whole call, so concurrent
    /// identical calls cannot both invoke the body.
    pub fn call<E>(&self, args: CallArgs) -> Result<T, MemoError<E>>
    where
        T: Clone,
        F: FnMut(&ResolvedCall) -> Result<T, E>,
    {
        let call = key::resolve(&self.params, &args)?;
        let cache_key = key::derive_key(&self.name, &self.config.key, &self.config.args_filter, &call)?;
        let now = SystemTime::now();

        let depend_mtime = match (&self.config.depend_path, call.first()) {
            (Some(depend_path), Some(first)) => fs::mtime(&depend_path(first)),
            _ => None,
        };

        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;

        let inputs = PolicyInputs {
            force: call.force(),
            timeout: self.config.timeout,
            depend_var: &self.config.depend_var,
            depend_mtime,
        };
        let reason = invalidation(&mut inner.store, &cache_key, inputs, now);

        if reason.is_none() {
            if let Some(value) = inner.store.get(&cache_key) {
                tracing::trace!(cache = %self.name, key = %cache_key, "serving memoized value");
                return Ok(value.clone());
            }
        }

        let reason = reason.unwrap_or(Invalidation::Missing);
        tracing::trace!(cache = %self.name, key = %cache_key, ?reason, "recomputing");

        let value = (inner.body)(&call).map_err(MemoError::Computation)?;
        inner.store.put(cache_key, value.clone(), SystemTime::now());

        Ok(value)
    }
}

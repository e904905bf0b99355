//! File persistence for per-instance memoized methods.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{DependVarFn, FileCacheOptions};
use crate::error::MemoError;
use crate::fs;
use crate::key::{CacheKey, CacheKeyBuilder, InstanceId};
use crate::memory::{self, Invalidation, MemoStore, PolicyInputs};

/// Gives the durable layer a location to persist one method's results.
///
/// Implemented by objects whose methods are wrapped with
/// [`memoize_to_file`](crate::memoize_to_file).
pub trait CacheFileOwner {
    /// Template for this instance's cache files, with `{}` standing in
    /// for the method name. `None` disables persistence for this
    /// instance.
    fn cache_file_template(&self) -> Option<String>;

    /// Stable identity of this instance.
    fn instance_id(&self) -> InstanceId;
}

/// Maps the owning object to the source path its cached method depends
/// on.
pub type OwnerPathFn<O> = Box<dyn Fn(&O) -> PathBuf + Send + Sync>;

/// A memoized method with per-instance file persistence.
///
/// The in-memory layer is keyed by (instance identity, method name); the
/// durable layer stores one serialized value per instance at the path the
/// owner's template produces. A missing or unreadable file is an ordinary
/// miss, and a failed write never fails the call.
pub struct FileMemoized<O, T, F> {
    method: String,
    options: FileCacheOptions,
    timeout: Option<Duration>,
    depend_var: Option<DependVarFn>,
    depend_path: Option<OwnerPathFn<O>>,
    inner: Mutex<Inner<T, F>>,
}

struct Inner<T, F> {
    body: F,
    store: MemoStore<T>,
}

impl<O, T, F> std::fmt::Debug for FileMemoized<O, T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.lock().map(|i| i.store.len()).unwrap_or_default();
        f.debug_struct("FileMemoized")
            .field("method", &self.method)
            .field("entries", &entries)
            .finish()
    }
}

impl<O, T, F> FileMemoized<O, T, F> {
    /// Installs a file-backed wrapper around `body`.
    ///
    /// `method` is the name filled into the owner's cache-path template.
    pub fn new<E>(method: impl Into<String>, options: FileCacheOptions, body: F) -> Self
    where
        F: FnMut(&O) -> Result<T, E>,
    {
        FileMemoized {
            method: method.into(),
            options,
            timeout: None,
            depend_var: None,
            depend_path: None,
            inner: Mutex::new(Inner {
                body,
                store: MemoStore::new(),
            }),
        }
    }

    /// Ages out the in-memory entry after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Watches a dependency variable; a change forces recomputation.
    pub fn with_depend_var(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.depend_var = Some(Box::new(f));
        self
    }

    /// Watches the source path `f` resolves from the owner; a source
    /// newer than what is cached forces recomputation.
    pub fn with_depend_path(mut self, f: impl Fn(&O) -> PathBuf + Send + Sync + 'static) -> Self {
        self.depend_path = Some(Box::new(f));
        self
    }

    /// The method name this wrapper was installed under.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Invokes the wrapped method through both cache layers.
    ///
    /// Order of preference: the in-memory entry, then the cache file,
    /// then the body. A file that is missing, unreadable, older than
    /// `min_mtime`, or older than the source path is skipped.
    pub fn call<E>(&self, owner: &O, force: bool) -> Result<T, MemoError<E>>
    where
        O: CacheFileOwner,
        T: Clone + Serialize + DeserializeOwned,
        F: FnMut(&O) -> Result<T, E>,
    {
        let instance = owner.instance_id();
        let cache_key = method_key(&self.method, instance);
        let now = SystemTime::now();

        // One stat answers existence and mtime for the whole call.
        let cache_file = owner
            .cache_file_template()
            .map(|template| cache_file_path(&template, &self.method));
        let file_mtime = cache_file.as_deref().and_then(fs::mtime);
        let source_mtime = self
            .depend_path
            .as_ref()
            .map(|f| f(owner))
            .and_then(|path| fs::mtime(&path));

        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;

        let inputs = PolicyInputs {
            force,
            timeout: self.timeout,
            depend_var: &self.depend_var,
            depend_mtime: source_mtime,
        };
        let reason = memory::invalidation(&mut inner.store, &cache_key, inputs, now);

        if reason.is_none() {
            if let Some(value) = inner.store.get(&cache_key) {
                tracing::trace!(cache = %self.method, %instance, "serving memoized value");
                return Ok(value.clone());
            }
        }

        // The cache file only covers a plain miss; every other reason
        // means what is on disk is just as stale as what was in memory.
        let reason = reason.unwrap_or(Invalidation::Missing);
        if reason == Invalidation::Missing {
            if let (Some(path), Some(file_mtime)) = (&cache_file, file_mtime) {
                let too_old = self
                    .options
                    .min_mtime
                    .is_some_and(|cutoff| file_mtime < cutoff);
                let source_newer = source_mtime.is_some_and(|mtime| mtime > file_mtime);
                if !too_old && !source_newer {
                    match fs::read_value::<T>(path) {
                        Ok(value) => {
                            tracing::trace!(
                                cache = %self.method,
                                %instance,
                                path = %path.display(),
                                "loaded memoized value from file",
                            );
                            inner.store.put(cache_key, value.clone(), now);
                            return Ok(value);
                        }
                        Err(e) => {
                            tracing::debug!(
                                error = &e as &dyn std::error::Error,
                                path = %path.display(),
                                "discarding unreadable cache file",
                            );
                        }
                    }
                }
            }
        }

        tracing::trace!(cache = %self.method, %instance, ?reason, "recomputing");
        let value = (inner.body)(owner).map_err(MemoError::Computation)?;
        inner.store.put(cache_key, value.clone(), SystemTime::now());

        if let Some(path) = &cache_file {
            // A failed write must not fail the call.
            if let Err(e) = fs::write_value(&value, path, self.options.create_dir) {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    path = %path.display(),
                    "failed to persist memoized value",
                );
            }
        }

        Ok(value)
    }
}

/// The in-memory key for one method on one instance.
fn method_key(method: &str, instance: InstanceId) -> CacheKey {
    let mut builder = CacheKeyBuilder::new(method);
    builder.write_instance(instance);
    builder.build()
}

/// Fills the owner's template with the method name.
fn cache_file_path(template: &str, method: &str) -> PathBuf {
    PathBuf::from(template.replacen("{}", method, 1))
}

//! # Memoization for pipeline tooling
//!
//! Pipeline tooling leans on a lot of expensive calls — directory scans,
//! metadata lookups, derived values — that are asked for far more often
//! than they change. This crate wraps such calls with caching so they are
//! computed once and then served from memory, and optionally from disk.
//!
//! ## Cache layers
//!
//! A wrapped call goes through up to three layers:
//!
//! - An in-memory table keyed by the call's arguments. One table per
//!   wrapping, unbounded, alive as long as the handle.
//! - An invalidation policy that runs before every lookup: an explicit
//!   `force`, a configured timeout, a watched dependency variable, or a
//!   watched dependency path can each discard what is cached.
//! - For the file-backed preset, one serialized value per object instance
//!   on disk. A missing or unreadable cache file is an ordinary miss, and
//!   a failed write never fails the call — the freshly computed value is
//!   returned either way.
//!
//! ## Cache keys
//!
//! [`CacheKey`]s are SHA-256 hashes over stable, human-readable metadata
//! text recording everything that contributed to the key; the text stays
//! attached for debugging via [`CacheKey::metadata`]. What goes into the
//! key is selected by [`KeyMode`]: all resolved arguments (the default),
//! one named argument, the identity of the object the call runs on, or
//! nothing at all.
//!
//! Because a wrapper cannot introspect the body it is given, the declared
//! parameters are supplied as [`ParamSpec`]s when installing it, and each
//! call carries its values in a [`CallArgs`]. Parameters resolve the way
//! a call site would: positional values first, then keywords, then
//! declared defaults. The keywords `force` and `verbose` are reserved on
//! every wrapping and never become key components.
//!
//! ## Errors
//!
//! A wrapped call behaves exactly like the unwrapped one, apart from
//! possible extra latency on a miss and the `force` option. Body errors
//! propagate unchanged inside [`MemoError::Computation`]; the only errors
//! the cache itself adds are [`UsageError`]s for calls that do not fit
//! the wrapper's configuration. Failures of the durable layer are
//! recovered internally and reported through `tracing` only.
//!
//! ## Presets
//!
//! - [`memoize`]: argument-keyed memoization, no expiry, no dependency
//!   signals (all configurable through [`MemoConfig`]).
//! - [`memoize_per_instance`]: one slot per object identity, for
//!   self-only methods.
//! - [`memoize_to_file`]: per-instance memoization plus file persistence,
//!   for owners implementing [`CacheFileOwner`].
//!
//! ```
//! use pipecache::{memoize, CallArgs, ParamSpec};
//!
//! let scan = memoize(
//!     "scan",
//!     vec![ParamSpec::required("root"), ParamSpec::optional("depth", 1)],
//!     |call| Ok::<_, std::convert::Infallible>(format!("scanned {}", call.get("root").unwrap())),
//! );
//!
//! let first = scan.call(CallArgs::new().positional("/assets")).unwrap();
//! let again = scan.call(CallArgs::new().positional("/assets")).unwrap();
//! assert_eq!(first, again);
//! ```

mod config;
mod durable;
mod error;
mod fs;
mod key;
mod memory;

#[cfg(test)]
mod test;

pub use config::{DependPathFn, DependVarFn, FileCacheOptions, KeyMode, MemoConfig};
pub use durable::{CacheFileOwner, FileMemoized, OwnerPathFn};
pub use error::{MemoError, ReadError, UsageError, WriteError};
pub use fs::{read_value, write_value};
pub use key::{CacheKey, CacheKeyBuilder, CallArgs, InstanceId, ParamSpec, ResolvedCall};
pub use memory::{Invalidation, Memoized};

pub use serde_json::Value;

/// Wraps `body` with argument-keyed memoization.
///
/// The default preset: keys are derived from all resolved arguments, and
/// nothing expires.
pub fn memoize<T, E, F>(name: impl Into<String>, params: Vec<ParamSpec>, body: F) -> Memoized<T, F>
where
    F: FnMut(&ResolvedCall) -> Result<T, E>,
{
    Memoized::new(name, params, MemoConfig::default(), body)
}

/// Wraps `body` with one cache slot per object identity.
///
/// For self-only methods: calls must attach an [`InstanceId`] via
/// [`CallArgs::instance`].
pub fn memoize_per_instance<T, E, F>(name: impl Into<String>, body: F) -> Memoized<T, F>
where
    F: FnMut(&ResolvedCall) -> Result<T, E>,
{
    let config = MemoConfig {
        key: KeyMode::Instance,
        ..Default::default()
    };
    Memoized::new(name, Vec::new(), config, body)
}

/// Wraps `body` with per-instance memoization plus file persistence.
///
/// The owner's [`cache_file_template`](CacheFileOwner::cache_file_template)
/// decides where (and whether) results are persisted.
pub fn memoize_to_file<O, T, E, F>(
    method: impl Into<String>,
    options: FileCacheOptions,
    body: F,
) -> FileMemoized<O, T, F>
where
    F: FnMut(&O) -> Result<T, E>,
{
    FileMemoized::new(method, options, body)
}

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde_json::Value;

/// Samples the watched dependency variable.
///
/// Re-evaluated on every call; a result differing from the previously
/// captured one forces recomputation.
pub type DependVarFn = Box<dyn Fn() -> Value + Send + Sync>;

/// Maps a call's first resolved argument to the filesystem path it
/// depends on.
pub type DependPathFn = Box<dyn Fn(&Value) -> PathBuf + Send + Sync>;

/// Selects what a wrapped call's cache key is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyMode {
    /// The ordered (name, value) pairs of all remaining parameters.
    #[default]
    Args,
    /// A single named parameter's resolved value.
    Named(String),
    /// The identity of the object the call runs on.
    Instance,
    /// One shared slot for the whole function, whatever the arguments.
    Constant,
}

/// Configuration recognized when installing a wrapper.
///
/// The default wraps with argument-keyed memoization and no expiry or
/// dependency signals; set individual fields to opt into more.
#[derive(Default)]
pub struct MemoConfig {
    /// What the cache key is derived from.
    pub key: KeyMode,
    /// Age after which the function-scoped entry is stale.
    pub timeout: Option<Duration>,
    /// Parameter names excluded from [`KeyMode::Args`] keys, in addition
    /// to the reserved `force` and `verbose`.
    pub args_filter: Vec<String>,
    /// Watched dependency variable; a change forces recomputation.
    pub depend_var: Option<DependVarFn>,
    /// Watched dependency path; an mtime newer than the last successful
    /// computation forces recomputation.
    pub depend_path: Option<DependPathFn>,
}

/// Options for the file-backed preset.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCacheOptions {
    /// Create the cache file's parent directory before writing.
    pub create_dir: bool,
    /// Cache files with an mtime older than this are stale.
    ///
    /// The manual lever for "invalidate everything persisted before
    /// format change X".
    pub min_mtime: Option<SystemTime>,
}

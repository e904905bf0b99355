use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A call that does not fit the wrapper's configuration.
///
/// These are raised synchronously at call time, before the wrapped body
/// runs, and are never recovered internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// A keyword argument that matches no declared parameter.
    #[error("unexpected keyword argument `{0}`")]
    UnexpectedKeyword(String),
    /// More positional values than declared parameters.
    #[error("expected at most {expected} positional arguments, got {got}")]
    TooManyPositional { expected: usize, got: usize },
    /// A parameter supplied both positionally and by keyword.
    #[error("got multiple values for argument `{0}`")]
    DuplicateArgument(String),
    /// A required parameter with no supplied value and no default.
    #[error("missing required argument `{0}`")]
    MissingArgument(String),
    /// The configured key parameter does not exist on this wrapper.
    #[error("no parameter `{0}` to use as cache key")]
    UnknownKeyParameter(String),
    /// A mapping resolved as a key component.
    ///
    /// Mappings are rejected outright: a caller mutating one after the
    /// call would silently alias distinct invocations.
    #[error("mapping used as key component `{0}`")]
    MappingAsKey(String),
}

/// An error reading a persisted cache value.
///
/// The durable layer recovers from all of these by recomputing; they are
/// never surfaced to a caller.
#[derive(Debug, Error)]
pub enum ReadError {
    /// There is no file at the resolved path.
    #[error("missing path `{}`", .0.display())]
    MissingPath(PathBuf),
    /// The file exists but its contents do not deserialize.
    #[error("malformed cache file")]
    Malformed(#[source] serde_json::Error),
    /// The file could not be read at all.
    #[error("failed to read cache file")]
    Io(#[from] io::Error),
}

/// An error writing a persisted cache value.
///
/// The durable layer logs and discards these; the freshly computed value
/// is still returned to the caller.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The cache file's parent directory could not be created.
    #[error("failed to create cache directory `{}`", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The cache file could not be written or persisted.
    #[error("failed to write cache file `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The value could not be serialized.
    #[error("failed to serialize cache value")]
    Serialize(#[source] serde_json::Error),
}

/// The error envelope of a wrapped call.
///
/// A wrapped call behaves exactly like the unwrapped one, except that it
/// can additionally report a cache misconfiguration.
#[derive(Debug, Error)]
pub enum MemoError<E> {
    /// The call did not fit the wrapper's configuration.
    #[error("cache usage: {0}")]
    Usage(#[from] UsageError),
    /// The wrapped computation itself failed.
    #[error(transparent)]
    Computation(E),
}

impl<E> MemoError<E> {
    /// Returns the underlying computation error, if that is what this is.
    pub fn into_computation(self) -> Option<E> {
        match self {
            MemoError::Usage(_) => None,
            MemoError::Computation(e) => Some(e),
        }
    }
}

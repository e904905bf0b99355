use std::fmt::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::KeyMode;
use crate::error::UsageError;

/// Keyword names recognized on every call and excluded from every key.
const RESERVED_KEYWORDS: &[&str] = &["force", "verbose"];

/// Declares one parameter of a wrapped function.
///
/// The wrapper cannot introspect the body it is given, so the declared
/// parameter list is supplied explicitly when installing it, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    default: Option<Value>,
}

impl ParamSpec {
    /// A parameter that every call must supply.
    pub fn required(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            default: None,
        }
    }

    /// A parameter that falls back to `default` when a call omits it.
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        ParamSpec {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    /// The parameter's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identity of a host object participating in per-instance caching.
///
/// Stands in for object identity: the embedding application creates one
/// id per live object and passes it with every call on that object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Returns a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The positional and keyword values of one call on a wrapped function.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
    instance: Option<InstanceId>,
    force: bool,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional value.
    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends a keyword value.
    ///
    /// The reserved names `force` and `verbose` are accepted on any call
    /// and never become key components.
    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }

    /// Attaches the identity of the object this call runs on.
    pub fn instance(mut self, id: InstanceId) -> Self {
        self.instance = Some(id);
        self
    }

    /// Bypasses the cache for this call.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// A call with every declared parameter resolved to its effective value.
///
/// This is what the wrapped body receives.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    values: Vec<(String, Value)>,
    instance: Option<InstanceId>,
    force: bool,
    verbose: bool,
}

impl ResolvedCall {
    /// The resolved value of the named parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The first declared parameter's resolved value.
    pub fn first(&self) -> Option<&Value> {
        self.values.first().map(|(_, v)| v)
    }

    /// The identity attached to this call, if any.
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Whether this call bypasses the cache.
    pub fn force(&self) -> bool {
        self.force
    }

    /// Whether this call asked for diagnostic output.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Resolves a call against the declared parameter list.
///
/// Each parameter takes its positional value if enough positional values
/// were supplied, else its keyword value, else its declared default.
pub(crate) fn resolve(params: &[ParamSpec], args: &CallArgs) -> Result<ResolvedCall, UsageError> {
    if args.positional.len() > params.len() {
        return Err(UsageError::TooManyPositional {
            expected: params.len(),
            got: args.positional.len(),
        });
    }

    let mut force = args.force;
    let mut verbose = false;
    let mut consumed = vec![false; args.keywords.len()];
    let mut values = Vec::with_capacity(params.len());

    for (i, param) in params.iter().enumerate() {
        let keyword = args.keywords.iter().position(|(n, _)| n == &param.name);
        if let Some(ki) = keyword {
            consumed[ki] = true;
        }

        let value = if let Some(value) = args.positional.get(i) {
            if keyword.is_some() {
                return Err(UsageError::DuplicateArgument(param.name.clone()));
            }
            value.clone()
        } else if let Some(ki) = keyword {
            args.keywords[ki].1.clone()
        } else if let Some(default) = &param.default {
            default.clone()
        } else {
            return Err(UsageError::MissingArgument(param.name.clone()));
        };

        values.push((param.name.clone(), value));
    }

    for (i, (name, value)) in args.keywords.iter().enumerate() {
        if consumed[i] {
            continue;
        }
        match name.as_str() {
            "force" => force = force || matches!(value, Value::Bool(true)),
            "verbose" => verbose = matches!(value, Value::Bool(true)),
            _ => return Err(UsageError::UnexpectedKeyword(name.clone())),
        }
    }

    Ok(ResolvedCall {
        values,
        instance: args.instance,
        force,
        verbose,
    })
}

/// Computes the cache key for a resolved call.
pub(crate) fn derive_key(
    name: &str,
    mode: &KeyMode,
    args_filter: &[String],
    call: &ResolvedCall,
) -> Result<CacheKey, UsageError> {
    let mut builder = CacheKeyBuilder::new(name);

    match mode {
        KeyMode::Constant => builder.write_shared(),
        KeyMode::Instance => {
            let id = call
                .instance()
                .ok_or_else(|| UsageError::MissingArgument("instance".into()))?;
            builder.write_instance(id);
        }
        KeyMode::Named(param) => {
            let value = call
                .get(param)
                .ok_or_else(|| UsageError::UnknownKeyParameter(param.clone()))?;
            builder.write_arg(param, value)?;
        }
        KeyMode::Args => {
            for (n, v) in &call.values {
                if RESERVED_KEYWORDS.contains(&n.as_str()) || args_filter.iter().any(|f| f == n) {
                    continue;
                }
                builder.write_arg(n, v)?;
            }
        }
    }

    Ok(builder.build())
}

/// Canonical representation of one invocation, used to index the caches.
///
/// The key is a SHA-256 hash over stable, human-readable metadata text
/// recording everything that contributed to it. Equality and hashing go
/// through the hash; the metadata stays attached for diagnostics.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// The human-readable metadata this key hashes.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }
}

/// Builds [`CacheKey`]s from stable metadata text.
///
/// Accepts human-readable, but most importantly **stable**, input through
/// the [`Write`](std::fmt::Write) interface and the helpers below; the
/// accumulated text is then hashed to form the key.
pub struct CacheKeyBuilder {
    metadata: String,
}

impl CacheKeyBuilder {
    pub(crate) fn new(name: &str) -> Self {
        CacheKeyBuilder {
            metadata: format!("memo: {name}\n\n"),
        }
    }

    /// Writes one (parameter, value) component into the key.
    pub(crate) fn write_arg(&mut self, name: &str, value: &Value) -> Result<(), UsageError> {
        if value.is_object() {
            return Err(UsageError::MappingAsKey(name.to_owned()));
        }
        writeln!(self.metadata, "{name}: {value}").unwrap();
        Ok(())
    }

    pub(crate) fn write_instance(&mut self, id: InstanceId) {
        writeln!(self.metadata, "instance: {id}").unwrap();
    }

    pub(crate) fn write_shared(&mut self) {
        self.metadata.push_str("shared\n");
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let hash = Sha256::digest(&self.metadata);
        let hash = <[u8; 32]>::try_from(hash).expect("sha256 outputs 32 bytes");

        CacheKey {
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The error type loaders return. Any `std::error::Error + Send + Sync` can be
/// converted into it with `?` or `.into()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while parsing a textual cache spec such as
/// `"maximumSize=256,refreshAfterWrite=3s,expireAfterWrite=4s"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
  /// An option between two commas was empty.
  #[error("empty option in cache spec '{spec}'")]
  EmptyOption { spec: String },
  /// An option did not have the `key=value` shape.
  #[error("option '{option}' is not of the form key=value")]
  MissingValue { option: String },
  /// The key is not a recognized cache option.
  #[error("unknown cache option '{key}'")]
  UnknownKey { key: String },
  /// The same option was given twice.
  #[error("cache option '{key}' was specified more than once")]
  DuplicateKey { key: String },
  /// An integer option could not be parsed.
  #[error("value '{value}' for '{key}' is not a valid non-negative integer")]
  InvalidInteger { key: String, value: String },
  /// A duration option could not be parsed.
  #[error("value '{value}' for '{key}' is not a valid duration: {reason}")]
  InvalidDuration {
    key: String,
    value: String,
    reason: String,
  },
}

/// Errors that can occur when building a cache.
///
/// All configuration problems are reported here, at creation time, and never
/// on the request path.
#[derive(Debug, Error)]
pub enum BuildError {
  /// No `maximum_size` was configured. Unbounded loading caches are refused.
  #[error("maximum size must be configured for a loading cache")]
  MissingMaximumSize,
  /// The cache was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// `refresh_after_write` was zero.
  #[error("refresh after write must be greater than zero")]
  ZeroRefresh,
  /// `refresh_after_write` was not strictly less than `expire_after_write`,
  /// so a refresh could never fire before the entry expires.
  #[error("refresh after write ({refresh:?}) must be less than expire after write ({expire:?})")]
  RefreshNotBeforeExpiry { refresh: Duration, expire: Duration },
  /// The reload timeout was zero.
  #[error("reload timeout must be greater than zero")]
  ZeroReloadTimeout,
  /// The stats reporting interval was zero.
  #[error("stats interval must be greater than zero")]
  ZeroStatsInterval,
  /// A reload pool was configured with zero workers.
  #[error("reload pool must have at least one worker")]
  ZeroWorkers,
  /// A reload pool was configured without room for queued reloads.
  #[error("reload pool backlog must be greater than zero")]
  ZeroBacklog,
  /// No loader was supplied to the builder.
  #[error("a loading cache requires a loader")]
  MissingLoader,
  /// The textual cache spec could not be parsed.
  #[error("invalid cache spec: {0}")]
  InvalidSpec(#[from] SpecError),
  /// A worker or background thread could not be started.
  #[error("failed to spawn cache thread: {0}")]
  Spawn(#[from] io::Error),
}

/// The failure a caller of `get` observes when a value could not be loaded.
///
/// It is cheap to clone so that every caller waiting on the same single-flight
/// load receives the same error.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
  /// The loader reported that there is no cacheable value for the key.
  #[error("loader returned no value for the requested key")]
  Absent,
  /// The loader failed.
  #[error("loader failed: {0}")]
  Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
  /// The thread running the load unwound before producing a result.
  #[error("load was aborted before completing")]
  Aborted,
}

impl From<BoxError> for LoadError {
  fn from(err: BoxError) -> Self {
    LoadError::Failed(Arc::from(err))
  }
}

//! A concurrent, capacity-bounded loading cache that refreshes itself.
//!
//! # Features
//! - **Single-flight loads**: concurrent misses on one key run the loader once;
//!   every waiter receives the same value or error.
//! - **Refresh ahead**: entries past `refresh_after_write` are served stale
//!   while a bounded worker pool reloads them in the background.
//! - **Expiry**: hard TTL (`expire_after_write`) and idle TTL
//!   (`expire_after_access`), enforced on read and by a background janitor.
//! - **Bounded size**: approximate LRU eviction across independently locked
//!   shards.
//! - **Statistics**: lock-free counters, reported periodically through a
//!   pluggable [`StatsSink`] (structured `tracing` events by default).
//! - **Declarative config**: caches are described by a [`CacheSpec`] string
//!   such as `"maximumSize=256,refreshAfterWrite=3s,expireAfterWrite=4s"`,
//!   or deserialized with the optional `serde` feature.

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod factory;
pub mod handles;
pub mod loader;
pub mod metrics;
pub mod pool;
pub mod spec;

mod key;

// Internal, crate-only modules
mod entry;
mod policy;
mod reload;
mod shared;
mod store;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use error::{BoxError, BuildError, LoadError, SpecError};
pub use factory::{new_loading_cache, new_loading_cache_with_pool, IntoCacheBuilder};
pub use handles::LoadingCache;
pub use loader::CacheLoader;
pub use metrics::StatsSnapshot;
pub use pool::ReloadPool;
pub use reload::DEFAULT_RELOAD_TIMEOUT;
pub use spec::CacheSpec;
pub use task::reporter::{StatsSink, TracingStatsSink, DEFAULT_STATS_INTERVAL};

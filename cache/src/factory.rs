//! One-call construction of loading caches from a cache spec.
//!
//! ```no_run
//! use fibre_loading_cache::{new_loading_cache, BoxError, LoadingCache};
//!
//! let cache: LoadingCache<u64, String> = new_loading_cache(
//!   "user-names",
//!   "maximumSize=256,refreshAfterWrite=1m,expireAfterWrite=10m",
//!   |id: &u64| -> Result<Option<String>, BoxError> { Ok(Some(format!("user-{id}"))) },
//! )
//! .unwrap();
//! assert_eq!(*cache.get(&7).unwrap(), "user-7");
//! ```

use crate::builder::CacheBuilder;
use crate::error::BuildError;
use crate::handles::LoadingCache;
use crate::loader::CacheLoader;
use crate::pool::ReloadPool;
use crate::spec::CacheSpec;

use std::hash::{BuildHasher, Hash};

/// Anything a factory can turn into a configured [`CacheBuilder`]: a textual
/// spec, a parsed [`CacheSpec`], or a builder itself.
pub trait IntoCacheBuilder<K, V, H> {
  fn into_cache_builder(self) -> Result<CacheBuilder<K, V, H>, BuildError>;
}

impl<K, V> IntoCacheBuilder<K, V, ahash::RandomState> for &str {
  fn into_cache_builder(self) -> Result<CacheBuilder<K, V, ahash::RandomState>, BuildError> {
    Ok(CacheBuilder::parse(self)?)
  }
}

impl<K, V> IntoCacheBuilder<K, V, ahash::RandomState> for String {
  fn into_cache_builder(self) -> Result<CacheBuilder<K, V, ahash::RandomState>, BuildError> {
    self.as_str().into_cache_builder()
  }
}

impl<K, V> IntoCacheBuilder<K, V, ahash::RandomState> for CacheSpec {
  fn into_cache_builder(self) -> Result<CacheBuilder<K, V, ahash::RandomState>, BuildError> {
    Ok(CacheBuilder::from_spec(self))
  }
}

impl<K, V, H> IntoCacheBuilder<K, V, H> for CacheBuilder<K, V, H> {
  fn into_cache_builder(self) -> Result<CacheBuilder<K, V, H>, BuildError> {
    Ok(self)
  }
}

/// Creates a loading cache named `service_name` whose background reloads run
/// on the process-wide shared pool (unless `spec` is a builder that already
/// chose a pool).
pub fn new_loading_cache<K, V, H, S, L>(
  service_name: &str,
  spec: S,
  loader: L,
) -> Result<LoadingCache<K, V, H>, BuildError>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
  S: IntoCacheBuilder<K, V, H>,
  L: CacheLoader<K, V>,
{
  spec
    .into_cache_builder()?
    .service_name(service_name)
    .loader(loader)
    .build()
}

/// Creates a loading cache whose background reloads run on `pool`.
///
/// The pool is not owned by the cache: it can serve several caches and stays
/// up when this one is dropped.
pub fn new_loading_cache_with_pool<K, V, H, S, L>(
  service_name: &str,
  spec: S,
  loader: L,
  pool: ReloadPool,
) -> Result<LoadingCache<K, V, H>, BuildError>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
  S: IntoCacheBuilder<K, V, H>,
  L: CacheLoader<K, V>,
{
  spec
    .into_cache_builder()?
    .service_name(service_name)
    .loader(loader)
    .reload_pool(pool)
    .build()
}

//! Declarative cache configuration.
//!
//! A [`CacheSpec`] can be parsed from a compact string of comma separated
//! `key=value` options:
//!
//! ```
//! use fibre_loading_cache::CacheSpec;
//!
//! let spec: CacheSpec = "maximumSize=256,concurrencyLevel=16,refreshAfterWrite=1m,expireAfterWrite=1d"
//!   .parse()
//!   .unwrap();
//! assert_eq!(spec.maximum_size, Some(256));
//! ```
//!
//! With the `serde` feature it can also be deserialized from any structured
//! format; durations are written in the same `humantime` syntax.

use crate::error::{BuildError, SpecError};

use std::str::FromStr;
use std::time::Duration;

/// Immutable description of a loading cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheSpec {
  /// Initial capacity hint for the entry table.
  #[cfg_attr(feature = "serde", serde(alias = "initialCapacity"))]
  pub initial_capacity: Option<usize>,
  /// Maximum number of entries. Required.
  #[cfg_attr(feature = "serde", serde(alias = "maximumSize"))]
  pub maximum_size: Option<u64>,
  /// Expected number of concurrent writers, used to size the shard count.
  #[cfg_attr(
    feature = "serde",
    serde(alias = "concurrencyShards", alias = "concurrencyLevel", alias = "concurrency_level")
  )]
  pub concurrency_shards: Option<usize>,
  /// Hard TTL: an entry older than this is never served.
  #[cfg_attr(
    feature = "serde",
    serde(alias = "expireAfterWrite", deserialize_with = "de::duration")
  )]
  pub expire_after_write: Option<Duration>,
  /// Soft TTL: an entry older than this is served while it is reloaded.
  #[cfg_attr(
    feature = "serde",
    serde(alias = "refreshAfterWrite", deserialize_with = "de::duration")
  )]
  pub refresh_after_write: Option<Duration>,
  /// Idle TTL: an entry not read or written for this long is evicted.
  #[cfg_attr(
    feature = "serde",
    serde(alias = "expireAfterAccess", deserialize_with = "de::duration")
  )]
  pub expire_after_access: Option<Duration>,
}

impl CacheSpec {
  /// Parses a textual cache spec. Equivalent to `spec.parse()`.
  pub fn parse(spec: &str) -> Result<Self, SpecError> {
    spec.parse()
  }

  /// Checks the cross-field rules that make a spec usable.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.maximum_size.is_none() {
      return Err(BuildError::MissingMaximumSize);
    }
    if self.concurrency_shards == Some(0) {
      return Err(BuildError::ZeroShards);
    }
    if let Some(refresh) = self.refresh_after_write {
      if refresh.is_zero() {
        return Err(BuildError::ZeroRefresh);
      }
      if let Some(expire) = self.expire_after_write {
        if refresh >= expire {
          return Err(BuildError::RefreshNotBeforeExpiry { refresh, expire });
        }
      }
    }
    Ok(())
  }
}

impl FromStr for CacheSpec {
  type Err = SpecError;

  fn from_str(spec: &str) -> Result<Self, Self::Err> {
    let mut parsed = CacheSpec::default();
    if spec.trim().is_empty() {
      return Ok(parsed);
    }

    for option in spec.split(',') {
      let option = option.trim();
      if option.is_empty() {
        return Err(SpecError::EmptyOption {
          spec: spec.to_string(),
        });
      }
      let (key, value) = option
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| SpecError::MissingValue {
          option: option.to_string(),
        })?;

      match key {
        "initialCapacity" => set(&mut parsed.initial_capacity, key, integer(key, value)?)?,
        "maximumSize" => set(&mut parsed.maximum_size, key, integer(key, value)?)?,
        "concurrencyLevel" | "concurrencyShards" => {
          set(&mut parsed.concurrency_shards, key, integer(key, value)?)?
        }
        "expireAfterWrite" => set(&mut parsed.expire_after_write, key, duration(key, value)?)?,
        "refreshAfterWrite" => set(&mut parsed.refresh_after_write, key, duration(key, value)?)?,
        "expireAfterAccess" => set(&mut parsed.expire_after_access, key, duration(key, value)?)?,
        _ => {
          return Err(SpecError::UnknownKey {
            key: key.to_string(),
          })
        }
      }
    }
    Ok(parsed)
  }
}

fn set<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), SpecError> {
  if slot.is_some() {
    return Err(SpecError::DuplicateKey {
      key: key.to_string(),
    });
  }
  *slot = Some(value);
  Ok(())
}

fn integer<T: FromStr>(key: &str, value: &str) -> Result<T, SpecError> {
  value.parse().map_err(|_| SpecError::InvalidInteger {
    key: key.to_string(),
    value: value.to_string(),
  })
}

fn duration(key: &str, value: &str) -> Result<Duration, SpecError> {
  humantime::parse_duration(value).map_err(|err| SpecError::InvalidDuration {
    key: key.to_string(),
    value: value.to_string(),
    reason: err.to_string(),
  })
}

#[cfg(feature = "serde")]
mod de {
  use serde::{de::Error, Deserialize, Deserializer};
  use std::time::Duration;

  pub(super) fn duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw
      .map(|value| humantime::parse_duration(value.trim()).map_err(D::Error::custom))
      .transpose()
  }
}

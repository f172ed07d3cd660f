/// Builds a composite cache key by joining the `Display` form of each part
/// with `:`.
///
/// ```
/// use fibre_loading_cache::cache_key;
///
/// assert_eq!(cache_key!("user", 42, "profile"), "user:42:profile");
/// assert_eq!(cache_key!(7), "7");
/// ```
///
/// At least one part is required; `cache_key!()` does not compile.
#[macro_export]
macro_rules! cache_key {
  ($first:expr $(, $rest:expr)* $(,)?) => {
    [
      ::std::string::ToString::to_string(&$first),
      $(::std::string::ToString::to_string(&$rest),)*
    ]
    .join(":")
  };
}

#[cfg(test)]
mod tests {
  #[test]
  fn joins_parts_with_colons() {
    let region = "eu";
    assert_eq!(cache_key!(region, 3, 'x', 1.5), "eu:3:x:1.5");
    assert_eq!(cache_key!("only",), "only");
  }
}

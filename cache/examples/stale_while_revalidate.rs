use fibre_loading_cache::{BoxError, CacheLoader, LoadingCache};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Data {
  version: usize,
  content: String,
}

struct VersionedLoader {
  counter: Arc<AtomicUsize>,
}

impl CacheLoader<String, Data> for VersionedLoader {
  fn load(&self, key: &String) -> Result<Option<Data>, BoxError> {
    let version = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
    println!("[Loader] Loading version {} for key '{}'...", version, key);
    thread::sleep(Duration::from_millis(500)); // Simulate slow load
    Ok(Some(Data {
      version,
      content: format!("Content for {} - version {}", key, version),
    }))
  }
}

fn main() {
  let load_counter = Arc::new(AtomicUsize::new(0));

  let cache: LoadingCache<String, Data> = fibre_loading_cache::new_loading_cache(
    "stale-demo",
    "maximumSize=100,refreshAfterWrite=2s,expireAfterWrite=10s",
    VersionedLoader {
      counter: load_counter.clone(),
    },
  )
  .unwrap();

  let key = "my-data".to_string();

  println!("--- Step 1: Initial Load ---");
  let value1 = cache.get(&key).unwrap();
  println!("Received: {:?}", *value1);
  assert_eq!(value1.version, 1);

  println!("\n--- Step 2: Cache Hit (Fresh) ---");
  let value2 = cache.get(&key).unwrap();
  println!("Received: {:?}", *value2);
  assert_eq!(load_counter.load(Ordering::Relaxed), 1);

  println!("\n--- Step 3: Wait past the refresh interval (3 seconds) ---");
  thread::sleep(Duration::from_secs(3));

  println!("\n--- Step 4: Stale Read ---");
  let value3 = cache.get(&key).unwrap();
  println!("IMMEDIATELY Received (stale): {:?}", *value3);
  assert_eq!(value3.version, 1, "Should return stale version 1 immediately");

  println!("\n--- Step 5: Wait for Background Reload to Complete ---");
  thread::sleep(Duration::from_secs(1)); // Wait for loader's sleep
  assert_eq!(load_counter.load(Ordering::Relaxed), 2);

  println!("\n--- Step 6: Final Read (Fresh) ---");
  let value4 = cache.get(&key).unwrap();
  println!("Received (reloaded): {:?}", *value4);
  assert_eq!(value4.version, 2, "Should now have the reloaded version 2");

  println!("\nCache stats: {:#?}", cache.stats());
}

use std::{collections::HashMap, hash::Hash};

use generational_arena::{Arena, Index};

#[derive(Debug)]
pub(crate) struct Node<K> {
  pub(crate) key: K,
  // Last time the key was written or read, in nanoseconds since the cache epoch.
  pub(crate) touched_at: u64,
  pub(crate) next: Option<Index>,
  pub(crate) prev: Option<Index>,
}

/// A recency-ordered list of keys for one store shard.
///
/// The head is the most recently touched key, the tail the least recently
/// touched one. Nodes live in an arena and are found through `lookup`, so
/// every operation is O(1).
#[derive(Debug)]
pub(crate) struct LruList<K> {
  // Arena stores all nodes contiguously.
  pub(crate) nodes: Arena<Node<K>>,
  // HashMap for O(1) lookup of a key to its node index in the arena.
  pub(crate) lookup: HashMap<K, Index>,
  pub(crate) head: Option<Index>,
  pub(crate) tail: Option<Index>,
}

impl<K: Eq + Hash + Clone> LruList<K> {
  #[cfg(test)]
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      nodes: Arena::with_capacity(capacity.max(1)),
      lookup: HashMap::with_capacity(capacity),
      head: None,
      tail: None,
    }
  }

  // Unlinks a node from the list without removing it from the arena.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_node_idx = node.prev;
    let next_node_idx = node.next;

    if let Some(prev_idx) = prev_node_idx {
      self.nodes[prev_idx].next = next_node_idx;
    } else {
      self.head = next_node_idx;
    }

    if let Some(next_idx) = next_node_idx {
      self.nodes[next_idx].prev = prev_node_idx;
    } else {
      self.tail = prev_node_idx;
    }
  }

  // Pushes an arena node to the front (making it the new head).
  fn push_front_node(&mut self, index: Index) {
    let old_head_idx = self.head;
    self.nodes[index].next = old_head_idx;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head_idx {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.lookup.len()
  }

  #[cfg(test)]
  pub fn contains(&self, key: &K) -> bool {
    self.lookup.contains_key(key)
  }

  /// Inserts `key` at the head, or moves it there if already tracked.
  pub fn push_front(&mut self, key: K, now: u64) {
    if self.lookup.contains_key(&key) {
      self.touch(&key, now);
      return;
    }
    let index = self.nodes.insert(Node {
      key: key.clone(),
      touched_at: now,
      next: None,
      prev: None,
    });
    self.lookup.insert(key, index);
    self.push_front_node(index);
  }

  /// Marks `key` as the most recently used. Unknown keys are ignored.
  pub fn touch(&mut self, key: &K, now: u64) {
    if let Some(&index) = self.lookup.get(key) {
      self.nodes[index].touched_at = now;
      if self.head != Some(index) {
        self.unlink(index);
        self.push_front_node(index);
      }
    }
  }

  /// Returns the least recently used key and when it was last touched.
  pub fn peek_back(&self) -> Option<(&K, u64)> {
    self
      .tail
      .and_then(|index| self.nodes.get(index))
      .map(|node| (&node.key, node.touched_at))
  }

  pub fn remove(&mut self, key: &K) -> bool {
    match self.lookup.remove(key) {
      Some(index) => {
        self.unlink(index);
        self.nodes.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
  }

  // A helper for tests, to get the order of keys from head to tail.
  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<K> {
    let mut keys = Vec::new();
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}

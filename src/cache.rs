// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! A scan-resistant cache with two generations: entries start in the
//! recent queue and graduate to the frequent queue when touched again. A
//! ghost list of recently evicted keys lets a re-appearing key skip the
//! recent queue entirely, so one pass over many cold keys cannot flush
//! the frequently used ones.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// Portion of the capacity reserved for entries seen only once, and the
// portion of evicted keys remembered for re-admission.
const RECENT_RATIO: f64 = 0.25;
const GHOST_RATIO: f64 = 0.50;

/// An LRU list over `u64` keys. The order deque runs oldest first;
/// touching a key moves it to the back.
struct LruQueue<V> {
    map: HashMap<u64, V>,
    order: VecDeque<u64>,
}

impl<V> LruQueue<V> {
    fn new() -> LruQueue<V> {
        LruQueue {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, key: u64, value: V) {
        if self.map.insert(key, value).is_some() {
            self.touch(key);
        } else {
            self.order.push_back(key);
        }
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
            self.order.push_back(key);
        }
    }

    fn remove(&mut self, key: u64) -> Option<V> {
        let value = self.map.remove(&key)?;
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        Some(value)
    }

    fn pop_oldest(&mut self) -> Option<(u64, V)> {
        let key = self.order.pop_front()?;
        let value = self.map.remove(&key).unwrap();
        Some((key, value))
    }

    fn peek(&self, key: u64) -> Option<&V> {
        self.map.get(&key)
    }

    fn contains(&self, key: u64) -> bool {
        self.map.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

struct TwoQueueInner<V> {
    size: usize,
    recent_size: usize,
    ghost_size: usize,
    recent: LruQueue<V>,
    frequent: LruQueue<V>,
    ghost: LruQueue<()>,
}

impl<V> TwoQueueInner<V> {
    // Makes room for one insertion. `ghost_hit` biases the eviction
    // towards the frequent queue, since the incoming entry was itself
    // recently evicted.
    fn ensure_space(&mut self, ghost_hit: bool) {
        if self.recent.len() + self.frequent.len() < self.size {
            return;
        }
        let recent_len = self.recent.len();
        if recent_len > 0 && (recent_len > self.recent_size || (recent_len == self.recent_size && !ghost_hit))
        {
            let (key, _) = self.recent.pop_oldest().unwrap();
            self.ghost.insert(key, ());
            if self.ghost.len() > self.ghost_size {
                self.ghost.pop_oldest();
            }
            return;
        }
        self.frequent.pop_oldest();
    }
}

/// The two-queue cache itself. Values are cloned out on read; callers
/// hand in cheaply clonable values (the hot spot cache stores `Arc`ed
/// stats) and treat them as read-only.
pub struct TwoQueueCache<V> {
    inner: Mutex<TwoQueueInner<V>>,
}

impl<V: Clone> TwoQueueCache<V> {
    pub fn new(size: usize) -> TwoQueueCache<V> {
        assert!(size > 0);
        TwoQueueCache {
            inner: Mutex::new(TwoQueueInner {
                size,
                recent_size: (size as f64 * RECENT_RATIO) as usize,
                ghost_size: (size as f64 * GHOST_RATIO) as usize,
                recent: LruQueue::new(),
                frequent: LruQueue::new(),
                ghost: LruQueue::new(),
            }),
        }
    }

    pub fn put(&self, key: u64, value: V) {
        let mut inner = self.inner.lock().unwrap();
        if inner.frequent.contains(key) {
            inner.frequent.insert(key, value);
            return;
        }
        // A second appearance within the recent queue graduates the key.
        if inner.recent.remove(key).is_some() {
            inner.frequent.insert(key, value);
            return;
        }
        if inner.ghost.contains(key) {
            inner.ensure_space(true);
            inner.ghost.remove(key);
            inner.frequent.insert(key, value);
            return;
        }
        inner.ensure_space(false);
        inner.recent.insert(key, value);
    }

    /// Reads a value without refreshing its recency.
    pub fn peek(&self, key: u64) -> Option<V> {
        let inner = self.inner.lock().unwrap();
        inner
            .frequent
            .peek(key)
            .or_else(|| inner.recent.peek(key))
            .cloned()
    }

    pub fn remove(&self, key: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.frequent.remove(key).is_some() {
            return;
        }
        if inner.recent.remove(key).is_some() {
            return;
        }
        inner.ghost.remove(key);
    }

    /// Snapshots all live entries. Order is unspecified.
    pub fn elems(&self) -> Vec<(u64, V)> {
        let inner = self.inner.lock().unwrap();
        let mut elems = Vec::with_capacity(inner.frequent.len() + inner.recent.len());
        for queue in [&inner.frequent, &inner.recent] {
            for (key, value) in &queue.map {
                elems.push((*key, value.clone()));
            }
        }
        elems
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.recent.len() + inner.frequent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

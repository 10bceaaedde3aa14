use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::queue::Queue;
use crate::rng::random_word_id;

pub type QueueHandle = Arc<Mutex<Queue>>;

/// Process-wide table of active queues keyed by id.
pub struct QueueRegistry {
    active: RwLock<HashMap<String, QueueHandle>>,
    /// Ids handed out to queues that have not started yet.
    reserved: Mutex<HashSet<String>>,
    total_created: AtomicU64,
    rng_state: Mutex<u32>,
}

impl QueueRegistry {
    pub fn new(seed: u32) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
            total_created: AtomicU64::new(0),
            rng_state: Mutex::new(seed),
        }
    }

    /// Returns `(id, debug_id)`, unique among active queues and queues
    /// created but not yet started. The id stays reserved until `insert` or
    /// `release`.
    pub fn generate_id(&self, prefix: &str) -> (String, String) {
        self.total_created.fetch_add(1, Ordering::Relaxed);
        let prefix = if prefix.is_empty() { "queue" } else { prefix };
        let mut reserved = self.reserved.lock();
        loop {
            let words = {
                let mut state = self.rng_state.lock();
                random_word_id(&mut state)
            };
            let id = format!("{}_{}", prefix, words);
            if !reserved.contains(&id) && !self.active.read().contains_key(&id) {
                reserved.insert(id.clone());
                return (id, words);
            }
        }
    }

    pub fn insert(&self, id: &str, handle: QueueHandle) {
        self.active.write().insert(id.to_string(), handle);
        self.reserved.lock().remove(id);
    }

    /// Gives back the id of a queue that will never start.
    pub fn release(&self, id: &str) {
        self.reserved.lock().remove(id);
    }

    /// Swaps the queue stored under `id`, used when an instant queue is
    /// promoted to a timed one.
    pub fn replace(&self, id: &str, handle: QueueHandle) -> Option<QueueHandle> {
        self.active.write().insert(id.to_string(), handle)
    }

    /// Removes `id` only while it still maps to `handle`.
    pub fn remove(&self, id: &str, handle: &QueueHandle) -> bool {
        let mut active = self.active.write();
        match active.get(id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                active.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<QueueHandle> {
        self.active.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.read().contains_key(id)
    }

    /// Handles of all active queues, sorted by id.
    pub fn snapshot(&self) -> Vec<(String, QueueHandle)> {
        let mut handles = self
            .active
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect::<Vec<_>>();
        handles.sort_by(|left, right| left.0.cmp(&right.0));
        handles
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    pub fn total_created(&self) -> u64 {
        self.total_created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueOptions;
    use qs_core::QueueSpeed;

    fn handle(id: &str) -> QueueHandle {
        Arc::new(Mutex::new(Queue::new(
            id.to_string(),
            id.to_string(),
            None,
            Vec::new(),
            QueueSpeed::Instant,
            QueueOptions::default(),
        )))
    }

    #[test]
    fn generated_ids_carry_prefix_and_count() {
        let registry = QueueRegistry::new(11);
        let (id, debug_id) = registry.generate_id("greeting");
        assert_eq!(id, format!("greeting_{}", debug_id));
        let (fallback, _) = registry.generate_id("");
        assert!(fallback.starts_with("queue_"));
        assert_eq!(registry.total_created(), 2);
    }

    #[test]
    fn generated_ids_stay_reserved_until_started_or_released() {
        let (first, _) = QueueRegistry::new(5).generate_id("main");

        let registry = QueueRegistry::new(5);
        registry.reserved.lock().insert(first.clone());
        let (second, _) = registry.generate_id("main");
        assert_ne!(second, first);
        assert!(registry.reserved.lock().contains(&second));

        registry.insert(&second, handle(&second));
        assert!(!registry.reserved.lock().contains(&second));
        registry.release(&first);
        assert!(registry.reserved.lock().is_empty());
    }

    #[test]
    fn remove_only_drops_the_same_instance() {
        let registry = QueueRegistry::new(1);
        let first = handle("a");
        let second = handle("a");
        registry.insert("a", Arc::clone(&first));
        registry.replace("a", Arc::clone(&second));
        assert!(!registry.remove("a", &first));
        assert!(registry.contains("a"));
        assert!(registry.remove("a", &second));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_sorted() {
        let registry = QueueRegistry::new(1);
        registry.insert("b", handle("b"));
        registry.insert("a", handle("a"));
        let ids = registry
            .snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

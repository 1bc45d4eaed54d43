//! Transform result cache
//!
//! Entries are keyed by pointer identity, transform name and parameter
//! bag. The cache itself never judges staleness: callers compare the
//! effective horizon (max of document and transform modification times)
//! against the entry time. Invalid entries are simply overwritten on the
//! next access, never proactively swept.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::document::Pointer;
use crate::transform::Params;
use crate::xml::Element;

/// Cache key: (pointer identity, transform name, parameter bag)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pointer: u64,
    transform: String,
    params: Params,
}

impl CacheKey {
    pub fn new(pointer: &Pointer, transform: impl Into<String>, params: &Params) -> Self {
        CacheKey {
            pointer: pointer.id(),
            transform: transform.into(),
            params: params.clone(),
        }
    }
}

/// A cached transform result and the time it was stored
#[derive(Clone)]
pub struct CacheEntry {
    pub element: Arc<Element>,
    pub text: Arc<str>,
    pub time: DateTime<Utc>,
}

/// Counters since creation
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

// One gate per in-flight computation; waiters block on it and re-check
// the cache once the owner finishes.
#[derive(Default)]
struct Gate {
    done: Mutex<bool>,
    ready: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.ready.wait(done).unwrap();
        }
    }

    fn open(&self) {
        *self.done.lock().unwrap() = true;
        self.ready.notify_all();
    }
}

/// Process-wide transform result cache shared across request threads
#[derive(Default)]
pub struct TransformCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    inflight: Mutex<HashMap<CacheKey, Arc<Gate>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TransformCache {
    pub fn new() -> Self {
        TransformCache::default()
    }

    /// Raw lookup. Validity is the caller's decision.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Store a result with the current time as the entry time,
    /// overwriting whatever was there.
    pub fn put(&self, key: CacheKey, element: Element, text: String) -> CacheEntry {
        let entry = CacheEntry {
            element: Arc::new(element),
            text: Arc::from(text),
            time: Utc::now(),
        };
        self.entries.write().unwrap().insert(key, entry.clone());
        entry
    }

    fn lookup_valid(&self, key: &CacheKey, horizon: DateTime<Utc>) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .filter(|entry| horizon <= entry.time)
            .cloned()
    }

    /// Return a valid entry or compute one. Concurrent misses on the
    /// same key wait for the first computation instead of repeating it;
    /// a failed computation releases the key so a waiter retries.
    pub fn get_or_compute<F>(
        &self,
        key: &CacheKey,
        horizon: DateTime<Utc>,
        compute: F,
    ) -> Result<CacheEntry>
    where
        F: FnOnce() -> Result<(Element, String)>,
    {
        loop {
            if let Some(entry) = self.lookup_valid(key, horizon) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry);
            }
            let waiting = {
                let mut inflight = self.inflight.lock().unwrap();
                match inflight.entry(key.clone()) {
                    Entry::Occupied(gate) => Some(Arc::clone(gate.get())),
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(Gate::default()));
                        None
                    }
                }
            };
            match waiting {
                Some(gate) => gate.wait(),
                None => break,
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "cache miss for transform '{}' on pointer {}; computing",
            key.transform,
            key.pointer
        );
        let result = compute();
        let gate = self.inflight.lock().unwrap().remove(key);
        // Publish before opening the gate so waiters see the entry.
        let outcome = result.map(|(element, text)| self.put(key.clone(), element, text));
        if let Some(gate) = gate {
            gate.open();
        }
        outcome
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().unwrap().len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

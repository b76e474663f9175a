//! In-process memo of completed range fetches.
//!
//! Keyed by `(code, start_date)`, bounded, least-recently-used eviction. The
//! memo is an optimization only: a miss always falls through to the network,
//! and a different start date is a different key.

use crate::domain::InstrumentSeries;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Default number of retained range results.
pub const DEFAULT_CAPACITY: usize = 32;

type MemoKey = (String, NaiveDate);

#[derive(Debug)]
struct MemoEntry {
    series: Arc<InstrumentSeries>,
    last_used: u64,
}

#[derive(Debug)]
struct MemoInner {
    map: HashMap<MemoKey, MemoEntry>,
    capacity: usize,
    clock: u64,
}

impl MemoInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, key: &MemoKey) -> Option<Arc<InstrumentSeries>> {
        let now = self.tick();
        self.map.get_mut(key).map(|entry| {
            entry.last_used = now;
            Arc::clone(&entry.series)
        })
    }

    fn put(&mut self, key: MemoKey, series: Arc<InstrumentSeries>) {
        if self.capacity == 0 {
            return;
        }
        let now = self.tick();
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            self.evict_oldest();
        }
        self.map.insert(
            key,
            MemoEntry {
                series,
                last_used: now,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
        }
    }
}

/// Thread-safe LRU memo of range fetch results.
#[derive(Debug, Clone)]
pub struct FetchMemo {
    inner: Arc<Mutex<MemoInner>>,
}

impl FetchMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoInner {
                map: HashMap::new(),
                capacity,
                clock: 0,
            })),
        }
    }

    /// A memo that never retains anything.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn get(&self, code: &str, start: NaiveDate) -> Option<Arc<InstrumentSeries>> {
        let key = (code.to_string(), start);
        self.lock().get(&key)
    }

    pub fn put(&self, code: &str, start: NaiveDate, series: Arc<InstrumentSeries>) {
        self.lock().put((code.to_string(), start), series);
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoInner> {
        // A poisoned memo only ever holds complete entries.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FetchMemo {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

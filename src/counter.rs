//! Monotonic counters with published mirrors.
//!
//! The engine thread owns the working value of every counter and is its
//! only writer. External observers read a published `AtomicU64` mirror
//! that the engine refreshes every 100 breaths or at an explicit commit,
//! so the hot path pays a plain `Cell` increment and nothing else.
//!
//! Mirrors are registered in a process-wide registry keyed by path
//! (`engine/breaths`, `links/<spec>/txdrop`, `apps/<name>/<counter>`).

use lazy_static::lazy_static;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, Arc<AtomicU64>>> = Mutex::new(HashMap::new());
}

/// A single monotonic counter: engine-private working value plus a
/// published mirror registered under `path`.
#[derive(Debug)]
pub struct Counter {
    path: String,
    value: Cell<u64>,
    mirror: Arc<AtomicU64>,
}

impl Counter {
    /// Create and register a counter at `path`, starting at zero.
    pub fn new(path: impl Into<String>) -> Counter {
        let path = path.into();
        let mirror = Arc::new(AtomicU64::new(0));
        REGISTRY.lock().unwrap().insert(path.clone(), mirror.clone());
        Counter {
            path,
            value: Cell::new(0),
            mirror,
        }
    }

    /// Add `n` to the working value.
    pub fn add(&self, n: u64) {
        self.value.set(self.value.get() + n);
    }

    /// Overwrite the working value. Used for counters mirrored from
    /// another source (the packet arena statistics).
    pub fn set(&self, v: u64) {
        self.value.set(v);
    }

    /// Read the working value.
    pub fn read(&self) -> u64 {
        self.value.get()
    }

    /// Publish the working value to the mirror.
    pub fn commit(&self) {
        self.mirror.store(self.value.get(), Ordering::Relaxed);
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        REGISTRY.lock().unwrap().remove(&self.path);
    }
}

/// Look up a published mirror by path. Observers on other threads may hold
/// the returned handle and read it at any time.
pub fn published(path: &str) -> Option<Arc<AtomicU64>> {
    REGISTRY.lock().unwrap().get(path).cloned()
}

/// All currently registered counter paths, sorted.
pub fn paths() -> Vec<String> {
    let mut v: Vec<String> = REGISTRY.lock().unwrap().keys().cloned().collect();
    v.sort();
    v
}

/// A group of counters sharing a path prefix, with a `created` timestamp.
/// Frames back per-link and per-app counter sets; dropping the frame
/// unregisters every mirror.
#[derive(Debug)]
pub struct Frame {
    counters: Vec<(&'static str, Counter)>,
}

impl Frame {
    /// Create a frame at `prefix` with one counter per name, plus a
    /// `created` counter holding the wall-clock creation time in seconds.
    pub fn new(prefix: &str, names: &[&'static str]) -> Frame {
        let mut counters = Vec::with_capacity(names.len() + 1);
        let created = Counter::new(format!("{}/created", prefix));
        created.set(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );
        counters.push(("created", created));
        for name in names {
            counters.push((name, Counter::new(format!("{}/{}", prefix, name))));
        }
        Frame { counters }
    }

    /// Counter by name within the frame.
    pub fn get(&self, name: &str) -> Option<&Counter> {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// Publish every counter in the frame.
    pub fn commit(&self) {
        for (_, c) in &self.counters {
            c.commit();
        }
    }
}

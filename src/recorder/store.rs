//! Shared correlation state between the event pipeline and the control API

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A process attributed to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Thread group id as seen by the kernel program.
    pub pid: u32,
    /// Command name, at most 64 bytes.
    pub comm: String,
}

/// Session count plus the two correlation maps.
///
/// Every method takes `&self`; callers never hold a lock across calls.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    sessions: AtomicU64,
    /// container id → profile waiting for that container's next event
    pending: Mutex<HashMap<String, String>>,
    /// profile → processes recorded for it
    profiles: Mutex<HashMap<String, Vec<ProcessRecord>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CorrelationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding start requests.
    pub fn session_count(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_sessions(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement without going below zero; returns the new count.
    pub(crate) fn decrement_sessions(&self) -> u64 {
        match self
            .sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub(crate) fn reset_sessions(&self) {
        self.sessions.store(0, Ordering::SeqCst);
    }

    /// Remember that `container_id` should be recorded as `profile`.
    pub fn set_pending(&self, container_id: &str, profile: &str) {
        lock(&self.pending).insert(container_id.to_string(), profile.to_string());
    }

    /// Whether a profile is waiting for `container_id`.
    pub fn has_pending(&self, container_id: &str) -> bool {
        lock(&self.pending).contains_key(container_id)
    }

    /// Load-and-delete the pending profile of `container_id`.
    pub fn take_pending(&self, container_id: &str) -> Option<String> {
        lock(&self.pending).remove(container_id)
    }

    /// Number of pending container associations.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Append a process to `profile`, creating the list if needed.
    pub fn append(&self, profile: &str, record: ProcessRecord) {
        lock(&self.profiles)
            .entry(profile.to_string())
            .or_default()
            .push(record);
    }

    /// Whether any process has been recorded for `profile`.
    pub fn has_profile(&self, profile: &str) -> bool {
        lock(&self.profiles).contains_key(profile)
    }

    /// Number of processes recorded for `profile` so far.
    pub fn record_count(&self, profile: &str) -> usize {
        lock(&self.profiles).get(profile).map_or(0, Vec::len)
    }

    /// Number of profiles with recorded processes.
    pub fn profile_len(&self) -> usize {
        lock(&self.profiles).len()
    }

    /// Load-and-delete the process list of `profile`.
    ///
    /// An append racing this call lands in a fresh list that a later call
    /// returns.
    pub fn take_profile(&self, profile: &str) -> Option<Vec<ProcessRecord>> {
        lock(&self.profiles).remove(profile)
    }

    #[cfg(test)]
    pub(crate) fn insert_profile(&self, profile: &str, records: Vec<ProcessRecord>) {
        lock(&self.profiles).insert(profile.to_string(), records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, comm: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            comm: comm.to_string(),
        }
    }

    #[test]
    fn test_session_count_never_goes_negative() {
        let store = CorrelationStore::new();
        assert_eq!(store.decrement_sessions(), 0);
        assert_eq!(store.increment_sessions(), 1);
        assert_eq!(store.increment_sessions(), 2);
        assert_eq!(store.decrement_sessions(), 1);
        assert_eq!(store.decrement_sessions(), 0);
        assert_eq!(store.decrement_sessions(), 0);
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_pending_is_consumed_once() {
        let store = CorrelationStore::new();
        store.set_pending("abc", "foo");
        assert!(store.has_pending("abc"));
        assert_eq!(store.take_pending("abc").as_deref(), Some("foo"));
        assert_eq!(store.take_pending("abc"), None);
        assert!(!store.has_pending("abc"));
    }

    #[test]
    fn test_profile_is_consumed_once() {
        let store = CorrelationStore::new();
        store.append("foo", record(1, "app"));
        store.append("foo", record(2, "worker"));

        assert_eq!(
            store.take_profile("foo"),
            Some(vec![record(1, "app"), record(2, "worker")])
        );
        assert_eq!(store.take_profile("foo"), None);

        store.append("foo", record(3, "app"));
        assert_eq!(store.take_profile("foo"), Some(vec![record(3, "app")]));
    }

    #[test]
    fn test_concurrent_appends() {
        let store = std::sync::Arc::new(CorrelationStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.append("foo", record(t * 100 + i, "app"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.take_profile("foo").map(|r| r.len()), Some(800));
    }
}

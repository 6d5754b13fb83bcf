//! The session accessor bound onto a context.
//!
//! A [`SessionHandle`] owns the live [`SessionRecord`] for one dispatch.
//! Once the session middleware has persisted the record it seals the
//! handle; later mutations still apply but log a warning, because they will
//! never reach the store. Such writes usually come from a unit that kept
//! working after its continuation chain was broken.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SessionResult;
use crate::record::{SceneSession, SessionRecord};

/// Mutable access to one session record.
#[derive(Debug)]
pub struct SessionHandle {
    property: String,
    key: String,
    record: Mutex<SessionRecord>,
    sealed: AtomicBool,
    late_writes: AtomicUsize,
}

impl SessionHandle {
    pub fn new(property: impl Into<String>, key: impl Into<String>, record: SessionRecord) -> Self {
        Self {
            property: property.into(),
            key: key.into(),
            record: Mutex::new(record),
            sealed: AtomicBool::new(false),
            late_writes: AtomicUsize::new(0),
        }
    }

    /// The context property this handle is bound under.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The store key of the record.
    pub fn key(&self) -> &str {
        &self.key
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// Runs `f` with shared access to the record.
    pub fn read<R>(&self, f: impl FnOnce(&SessionRecord) -> R) -> R {
        f(&self.record.lock())
    }

    /// Returns a copy of the record.
    pub fn snapshot(&self) -> SessionRecord {
        self.record.lock().clone()
    }

    /// Returns an application field.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.record.lock().data.get(key).cloned()
    }

    /// Returns an application field deserialized as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Returns a copy of the application data.
    pub fn data(&self) -> Map<String, Value> {
        self.record.lock().data.clone()
    }

    /// Returns a copy of the scene bookkeeping.
    pub fn scenes(&self) -> Option<SceneSession> {
        self.record.lock().scenes.clone()
    }

    // ─── Writes ──────────────────────────────────────────────────────────────

    /// Runs `f` with mutable access to the record.
    pub fn write<R>(&self, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        if self.sealed.load(Ordering::Acquire) {
            self.late_writes.fetch_add(1, Ordering::Relaxed);
            warn!(
                property = %self.property,
                key = %self.key,
                "session mutated after it was saved; this change will not be persisted"
            );
        }
        f(&mut self.record.lock())
    }

    /// Sets an application field, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.write(|record| record.data.insert(key.into(), value))
    }

    /// Serializes `value` into an application field.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> SessionResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Removes an application field.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write(|record| record.data.remove(key))
    }

    /// Replaces the scene bookkeeping.
    pub fn set_scenes(&self, scenes: Option<SceneSession>) {
        self.write(|record| record.scenes = scenes);
    }

    /// Empties the record.
    pub fn clear(&self) {
        self.write(|record| *record = SessionRecord::default());
    }

    // ─── Sealing ─────────────────────────────────────────────────────────────

    /// Marks the record as persisted and returns what should be stored.
    pub(crate) fn seal(&self) -> SessionRecord {
        let record = self.record.lock();
        self.sealed.store(true, Ordering::Release);
        record.clone()
    }

    /// Returns `true` once the record has been persisted.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Returns how many mutations happened after sealing.
    pub fn late_writes(&self) -> usize {
        self.late_writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_fields() {
        let handle = SessionHandle::new("session", "1:1", SessionRecord::default());
        handle.set_as("visits", &3_u32).unwrap();
        assert_eq!(handle.get_as::<u32>("visits").unwrap(), Some(3));
        assert_eq!(handle.get_as::<u32>("missing").unwrap(), None);
        assert!(handle.get_as::<String>("visits").is_err());
    }

    #[test]
    fn test_writes_after_seal_are_counted_but_applied() {
        let handle = SessionHandle::new("session", "1:1", SessionRecord::default());
        handle.set("a", json!(1));
        let saved = handle.seal();
        assert_eq!(saved.data["a"], json!(1));
        assert_eq!(handle.late_writes(), 0);

        handle.set("a", json!(2));
        assert!(handle.is_sealed());
        assert_eq!(handle.late_writes(), 1);
        assert_eq!(handle.get("a"), Some(json!(2)));
    }
}

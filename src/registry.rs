use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Opaque token returned by every `register` operation,
/// used as the removal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Allocates the next unique [RegistrationId]
    pub fn next() -> Self {
        Self(NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered collection of registered consumers, protected by its own lock.
/// Iteration for fan-out goes through [Registry::entries], which clones
/// the list so listener invocation never happens under the lock.
pub struct Registry<T: Clone> {
    entries: Mutex<Vec<(RegistrationId, T)>>,
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Appends a new entry, preserving registration order.
    pub fn add(&self, value: T) -> RegistrationId {
        let id = RegistrationId::next();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        entries.push((id, value));
        id
    }

    /// Removes the first entry matching `id`. No-op when absent.
    pub fn remove(&self, id: RegistrationId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(position) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
            entries.remove(position);
        }
    }

    /// Snapshot copy of the current entries, in registration order.
    pub fn entries(&self) -> Vec<(RegistrationId, T)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    pub fn is_empty(&self) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.is_empty()
    }
}

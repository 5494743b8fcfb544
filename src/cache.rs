//! The in-memory contact cache
//!
//! One instance lives for the whole backend lifetime. A single mutex
//! serialises every read and write; no upstream I/O ever happens while it is
//! held. Besides the entries themselves the cache tracks the `total` the
//! upstream last reported: once `total` matches the number of entries, the
//! cache is *complete* and can answer negative lookups without any network
//! traffic.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::contact::{Contact, ContactId, Event, EventAction, RefreshFlags};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<ContactId, Contact>,
    /// `None` until the upstream has reported how many contacts exist
    total: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ContactCache {
    inner: Mutex<State>,
}

impl ContactCache {
    /// A cold cache: empty, with an unknown total
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ContactId) -> Option<Contact> {
        self.inner.lock().unwrap().entries.get(id).cloned()
    }

    pub fn put(&self, contact: Contact) {
        self.inner
            .lock()
            .unwrap()
            .entries
            .insert(contact.id.clone(), contact);
    }

    pub fn delete(&self, id: &ContactId) {
        self.inner.lock().unwrap().entries.remove(id);
    }

    /// True iff the cache is known to contain every contact that exists upstream
    pub fn complete(&self) -> bool {
        let state = self.inner.lock().unwrap();
        state.total == Some(state.entries.len())
    }

    pub fn total(&self) -> Option<usize> {
        self.inner.lock().unwrap().total
    }

    /// Record the total the upstream reported (used by the list reconcile path)
    pub fn set_total(&self, total: usize) {
        self.inner.lock().unwrap().total = Some(total);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic full replace, for use after a list reconciliation
    pub fn replace_all(&self, entries: HashMap<ContactId, Contact>, total: usize) {
        let mut state = self.inner.lock().unwrap();
        state.entries = entries;
        state.total = Some(total);
    }

    /// Back to the cold state: no entries, unknown total
    pub fn clear(&self) {
        let mut state = self.inner.lock().unwrap();
        state.entries.clear();
        state.total = None;
    }

    /// Run `f` over the entries under the lock, but only when the cache is
    /// complete.
    ///
    /// This is the list fast path: holding the lock for the whole pass
    /// guarantees the enumeration never observes a partially-applied event.
    /// `f` must not block.
    pub fn with_entries_if_complete<R>(
        &self,
        f: impl FnOnce(&HashMap<ContactId, Contact>) -> R,
    ) -> Option<R> {
        let state = self.inner.lock().unwrap();
        if state.total != Some(state.entries.len()) {
            return None;
        }
        Some(f(&state.entries))
    }

    /// Patch the cache with one upstream event, atomically.
    ///
    /// The lock is held for the full duration, so observers see either all of
    /// an event or none of it. A contacts-refresh drops everything and ignores
    /// any per-contact changes riding in the same event: the upstream is
    /// telling us to resync from scratch, so incremental deltas no longer
    /// apply.
    pub fn apply_event(&self, event: &Event) {
        let mut state = self.inner.lock().unwrap();

        if event.refresh.contains(RefreshFlags::CONTACTS) {
            log::debug!(
                "Contacts refresh event: dropping {} cached entries",
                state.entries.len()
            );
            state.entries.clear();
            state.total = None;
            return;
        }

        for change in &event.contacts {
            match change.action {
                EventAction::Create | EventAction::Update => {
                    let contact = match &change.contact {
                        Some(contact) => contact.clone(),
                        None => {
                            log::warn!(
                                "Event for contact {} carries no contact payload, ignoring it",
                                change.id
                            );
                            continue;
                        }
                    };
                    state.entries.insert(change.id.clone(), contact);
                    if change.action == EventAction::Create {
                        // Only the event path adjusts the total; CardDAV
                        // writes leave the accounting to this echo
                        if let Some(total) = state.total {
                            state.total = Some(total + 1);
                        }
                    }
                }
                EventAction::Delete => {
                    state.entries.remove(&change.id);
                    if let Some(total) = state.total {
                        state.total = Some(total.saturating_sub(1));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Timestamp;

    fn contact(id: &str) -> Contact {
        Contact {
            id: ContactId::from(id),
            modify_time: Timestamp(1),
            size: 10,
            cards: Vec::new(),
        }
    }

    #[test]
    fn cold_cache_is_not_complete() {
        let cache = ContactCache::new();
        assert!(!cache.complete());
        assert_eq!(cache.total(), None);
        assert!(cache.get(&ContactId::from("nope")).is_none());
    }

    #[test]
    fn replace_all_makes_the_cache_complete() {
        let cache = ContactCache::new();
        let mut entries = HashMap::new();
        entries.insert(ContactId::from("a"), contact("a"));
        entries.insert(ContactId::from("b"), contact("b"));
        cache.replace_all(entries, 2);
        assert!(cache.complete());

        // A total larger than the entries means some are still missing
        cache.set_total(3);
        assert!(!cache.complete());
    }

    #[test]
    fn clear_resets_to_unknown() {
        let cache = ContactCache::new();
        cache.put(contact("a"));
        cache.set_total(1);
        assert!(cache.complete());

        cache.clear();
        assert!(!cache.complete());
        assert_eq!(cache.total(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn fast_path_only_runs_when_complete() {
        let cache = ContactCache::new();
        cache.put(contact("a"));
        assert!(cache.with_entries_if_complete(|e| e.len()).is_none());

        cache.set_total(1);
        assert_eq!(cache.with_entries_if_complete(|e| e.len()), Some(1));
    }
}

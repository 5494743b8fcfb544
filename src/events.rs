//! The event applier: a background consumer of the upstream mutation stream
//!
//! Events are applied strictly in arrival order, one cache lock acquisition
//! per event (see [`ContactCache::apply_event`]). CardDAV writes are *not*
//! serialised with incoming events: a put may complete and later be echoed
//! back as an update event that harmlessly overwrites the same entry, which is
//! fine because the upstream record is authoritative.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::ContactCache;
use crate::contact::Event;

/// Consume `events` until the stream closes, patching `cache` in place.
///
/// Returns cleanly (leaving the cache as-is) when the sender side is dropped.
/// Callers usually `tokio::spawn` this future next to the backend.
pub async fn drive(cache: Arc<ContactCache>, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        log::debug!(
            "Applying event: refresh={:?}, {} contact change(s)",
            event.refresh,
            event.contacts.len()
        );
        cache.apply_event(&event);
    }
    log::debug!("Event stream closed, stopping the applier");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{
        Contact, ContactEvent, ContactId, EventAction, RefreshFlags, Timestamp,
    };

    fn contact(id: &str) -> Contact {
        Contact {
            id: ContactId::from(id),
            modify_time: Timestamp(7),
            size: 1,
            cards: Vec::new(),
        }
    }

    fn change(action: EventAction, id: &str, with_payload: bool) -> ContactEvent {
        ContactEvent {
            id: ContactId::from(id),
            action,
            contact: if with_payload { Some(contact(id)) } else { None },
        }
    }

    #[test]
    fn create_update_delete_adjust_the_cache() {
        let cache = ContactCache::new();
        cache.set_total(0);

        cache.apply_event(&Event {
            refresh: RefreshFlags::empty(),
            contacts: vec![
                change(EventAction::Create, "a", true),
                change(EventAction::Create, "b", true),
            ],
        });
        assert_eq!(cache.total(), Some(2));
        assert!(cache.complete());

        cache.apply_event(&Event {
            refresh: RefreshFlags::empty(),
            contacts: vec![
                change(EventAction::Update, "a", true),
                change(EventAction::Delete, "b", false),
            ],
        });
        assert_eq!(cache.total(), Some(1));
        assert!(cache.get(&ContactId::from("b")).is_none());
        assert!(cache.complete());
    }

    #[test]
    fn unknown_total_stays_unknown_across_changes() {
        let cache = ContactCache::new();
        cache.apply_event(&Event {
            refresh: RefreshFlags::empty(),
            contacts: vec![change(EventAction::Create, "a", true)],
        });
        assert_eq!(cache.total(), None);
        assert!(!cache.complete());
    }

    #[test]
    fn refresh_discards_changes_in_the_same_event() {
        let cache = ContactCache::new();
        cache.put(contact("old"));
        cache.set_total(1);

        cache.apply_event(&Event {
            refresh: RefreshFlags::CONTACTS,
            contacts: vec![
                change(EventAction::Update, "x", true),
                change(EventAction::Update, "y", true),
                change(EventAction::Update, "z", true),
            ],
        });

        assert!(cache.is_empty());
        assert_eq!(cache.total(), None);
        assert!(!cache.complete());
    }

    #[tokio::test]
    async fn applier_terminates_when_the_stream_closes() {
        let cache = Arc::new(ContactCache::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let applier = tokio::spawn(drive(Arc::clone(&cache), rx));

        tx.send(Event {
            refresh: RefreshFlags::empty(),
            contacts: vec![change(EventAction::Create, "a", true)],
        })
        .unwrap();
        drop(tx);

        applier.await.unwrap();
        assert!(cache.get(&ContactId::from("a")).is_some());
    }
}

//! The CardDAV backend: a single address book bridging to the upstream
//! contacts API through the cache
//!
//! Reads prefer the cache and fall back to the network; the first full listing
//! warms the cache, and once `total` matches it the backend answers every read
//! (including negative lookups) without touching the upstream. Writes go
//! straight upstream and patch the cache with the outcome; the event stream is
//! what keeps the accounting honest over time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cache::ContactCache;
use crate::config;
use crate::contact::{Contact, ContactId, Event};
use crate::crypto::CardCrypto;
use crate::dav::{
    self, AddressBook, AddressBookQuery, AddressDataRequest, AddressObject, PutOptions,
};
use crate::error::Error;
use crate::events;
use crate::path::{self, ADDRESS_BOOK_PATH};
use crate::traits::{AddressBookBackend, ContactsApi};
use crate::transform;
use crate::vcard::Vcard;

pub struct CardDavBackend<A: ContactsApi> {
    api: A,
    keyring: Arc<dyn CardCrypto>,
    cache: Arc<ContactCache>,
}

impl<A: ContactsApi> CardDavBackend<A> {
    /// A backend over a cold cache.
    ///
    /// Writes never adjust the cached `total` themselves; without an attached
    /// event stream it drifts after a put or delete, which costs an extra
    /// reconcile on the next listing. Wire [`Self::attach_events`] to keep
    /// the accounting exact.
    pub fn new(api: A, keyring: Arc<dyn CardCrypto>) -> Self {
        Self {
            api,
            keyring,
            cache: Arc::new(ContactCache::new()),
        }
    }

    /// The cache this backend reads through. Mostly useful to hand to
    /// [`events::drive`] when wiring the event stream by hand.
    pub fn cache(&self) -> Arc<ContactCache> {
        Arc::clone(&self.cache)
    }

    /// Spawn the event applier for this backend's cache. The task ends when
    /// the sender side of `events` is dropped.
    pub fn attach_events(
        &self,
        events: mpsc::UnboundedReceiver<Event>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(events::drive(self.cache(), events))
    }

    fn render(&self, contact: &Contact, req: &AddressDataRequest) -> Result<AddressObject, Error> {
        transform::to_address_object(contact, self.keyring.as_ref(), req)
    }
}

#[async_trait]
impl<A: ContactsApi> AddressBookBackend for CardDavBackend<A> {
    async fn current_user_principal(&self) -> Result<String, Error> {
        Ok("/".to_string())
    }

    async fn address_book_home_set(&self) -> Result<String, Error> {
        Ok("/contacts".to_string())
    }

    async fn address_book(&self) -> Result<AddressBook, Error> {
        Ok(AddressBook {
            path: ADDRESS_BOOK_PATH.to_string(),
            name: config::ADDRESS_BOOK_NAME.lock().unwrap().clone(),
            description: config::ADDRESS_BOOK_DESCRIPTION.lock().unwrap().clone(),
            max_resource_size: config::MAX_RESOURCE_SIZE,
        })
    }

    async fn get_address_object(
        &self,
        path: &str,
        req: &AddressDataRequest,
    ) -> Result<AddressObject, Error> {
        let id = path::parse_path(path)?;

        let contact = match self.cache.get(&id) {
            Some(contact) => contact,
            None => {
                if self.cache.complete() {
                    // Every existing contact is cached, so this id does not exist
                    return Err(Error::NotFound);
                }
                let contact = self
                    .api
                    .get_contact(&id)
                    .await
                    .map_err(|source| Error::upstream("GetAddressObject", source))?;
                self.cache.put(contact.clone());
                contact
            }
        };

        self.render(&contact, req)
    }

    async fn list_address_objects(
        &self,
        req: &AddressDataRequest,
    ) -> Result<Vec<AddressObject>, Error> {
        if let Some(result) = self.cache.with_entries_if_complete(|entries| {
            log::debug!("Listing {} contacts from the cache", entries.len());
            entries
                .values()
                .map(|contact| self.render(contact, req))
                .collect::<Result<Vec<AddressObject>, Error>>()
        }) {
            return result;
        }

        // Cold or partial cache: reconcile with the upstream. The id listing
        // gives us the total and the metadata, the export pages the cards.
        let (total, contacts) = self
            .api
            .list_contacts(0, 0)
            .await
            .map_err(|source| Error::upstream("ListAddressObjects", source))?;
        self.cache.set_total(total);

        let mut listed: HashMap<ContactId, Contact> = contacts
            .into_iter()
            .map(|contact| (contact.id.clone(), contact))
            .collect();

        let mut objects = Vec::with_capacity(total);
        let mut page = 0;
        loop {
            let (_, exports) = self
                .api
                .list_contacts_export(page, 0)
                .await
                .map_err(|source| Error::upstream("ListAddressObjects", source))?;
            let page_was_empty = exports.is_empty();

            for export in exports {
                let mut contact = match listed.remove(&export.id) {
                    Some(contact) => contact,
                    None => {
                        // Raced with a concurrent change; the event stream
                        // will bring this contact in eventually
                        log::debug!("Contact {} exported but not listed, skipping it", export.id);
                        continue;
                    }
                };
                contact.cards = export.cards;
                self.cache.put(contact.clone());
                objects.push(self.render(&contact, req)?);
            }

            if objects.len() >= total || page_was_empty {
                break;
            }
            page += 1;
        }

        Ok(objects)
    }

    async fn query_address_objects(
        &self,
        query: &AddressBookQuery,
    ) -> Result<Vec<AddressObject>, Error> {
        let req = match &query.data_request {
            Some(req) => req.clone(),
            None => AddressDataRequest::all(),
        };

        let all = self.list_address_objects(&req).await?;
        Ok(dav::filter(query, all))
    }

    async fn put_address_object(
        &self,
        path: &str,
        card: Vcard,
        _opts: &PutOptions,
    ) -> Result<String, Error> {
        let id = path::parse_path(path)?;
        let import = transform::format_card(card, self.keyring.as_ref())?;

        // A probe through the regular read path tells update and create apart
        let probe = AddressDataRequest::default();
        let mut contact = if self.get_address_object(path, &probe).await.is_ok() {
            self.api
                .update_contact(&id, &import)
                .await
                .map_err(|source| Error::upstream("PutAddressObject", source))?
        } else {
            let mut responses = self
                .api
                .create_contacts(vec![import.clone()])
                .await
                .map_err(|source| Error::upstream("PutAddressObject", source))?;
            if responses.len() != 1 {
                return Err(Error::ProtocolInvariant {
                    op: "PutAddressObject",
                });
            }
            let response = responses.remove(0);
            if let Some(err) = response.err() {
                return Err(Error::upstream("PutAddressObject", err.into()));
            }
            response.contact.ok_or(Error::ProtocolInvariant {
                op: "PutAddressObject",
            })?
        };

        // The server does not echo the card bodies back
        contact.cards = import.cards;

        // `total` is left alone: the event echoing this write adjusts it
        self.cache.put(contact.clone());
        Ok(path::format_path(&contact.id))
    }

    async fn delete_address_object(&self, path: &str) -> Result<(), Error> {
        let id = path::parse_path(path)?;

        let mut responses = self
            .api
            .delete_contacts(std::slice::from_ref(&id))
            .await
            .map_err(|source| Error::upstream("DeleteAddressObject", source))?;
        if responses.len() != 1 {
            return Err(Error::ProtocolInvariant {
                op: "DeleteAddressObject",
            });
        }
        let response = responses.remove(0);

        // Evict unconditionally; on a per-id error the upstream is the
        // authority either way
        self.cache.delete(&id);

        match response.err() {
            Some(err) => Err(Error::upstream("DeleteAddressObject", err.into())),
            None => Ok(()),
        }
    }
}

//! A mocked upstream contacts API, so tests can exercise the backend without
//! a server
//!
//! Besides storing contacts it counts calls (so tests can assert that a cache
//! hit produced zero network traffic) and can be told to fail on demand, in
//! the same `(successes, failures)` style as the rest of the mocking support.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::contact::{
    Card, Contact, ContactExport, ContactId, ContactImport, ContactResponse, DeleteResponse,
    Timestamp, CODE_SUCCESS,
};
use crate::error::ApiError;
use crate::traits::ContactsApi;

/// Proton-style "no such contact" code the mock answers for unknown ids
const CODE_NOT_FOUND: u32 = 2501;

const DEFAULT_PAGE_SIZE: usize = 50;

/// This stores some behaviour tweaks, that describe how a mocked instance will
/// behave during a given test
///
/// So that a function fails _n_ times after _m_ initial successes, set
/// `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    pub get_contact_behaviour: (u32, u32),
    pub list_contacts_behaviour: (u32, u32),
    pub list_contacts_export_behaviour: (u32, u32),
    pub create_contacts_behaviour: (u32, u32),
    pub update_contact_behaviour: (u32, u32),
    pub delete_contacts_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All operations will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            get_contact_behaviour: (0, n_fails),
            list_contacts_behaviour: (0, n_fails),
            list_contacts_export_behaviour: (0, n_fails),
            create_contacts_behaviour: (0, n_fails),
            update_contact_behaviour: (0, n_fails),
            delete_contacts_behaviour: (0, n_fails),
        }
    }

    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    fn can(&mut self, which: Which) -> Result<(), ApiError> {
        if self.is_suspended {
            return Ok(());
        }
        let (value, descr) = match which {
            Which::Get => (&mut self.get_contact_behaviour, "get_contact"),
            Which::List => (&mut self.list_contacts_behaviour, "list_contacts"),
            Which::Export => (
                &mut self.list_contacts_export_behaviour,
                "list_contacts_export",
            ),
            Which::Create => (&mut self.create_contacts_behaviour, "create_contacts"),
            Which::Update => (&mut self.update_contact_behaviour, "update_contact"),
            Which::Delete => (&mut self.delete_contacts_behaviour, "delete_contacts"),
        };
        decrement(value, descr)
    }
}

#[derive(Clone, Copy)]
enum Which {
    Get,
    List,
    Export,
    Create,
    Update,
    Delete,
}

/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and
/// decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str) -> Result<(), ApiError> {
    if value.0 > 0 {
        value.0 -= 1;
        Ok(())
    } else if value.1 > 0 {
        value.1 -= 1;
        log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
        Err(format!(
            "Mocked behaviour requires this {} to fail this time ({:?})",
            descr, value
        )
        .into())
    } else {
        Ok(())
    }
}

/// How many times each API operation has been invoked
#[derive(Default, Clone, Debug, PartialEq)]
pub struct CallCounts {
    pub get_contact: u32,
    pub list_contacts: u32,
    pub list_contacts_export: u32,
    pub create_contacts: u32,
    pub update_contact: u32,
    pub delete_contacts: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.get_contact
            + self.list_contacts
            + self.list_contacts_export
            + self.create_contacts
            + self.update_contact
            + self.delete_contacts
    }
}

struct MockState {
    // BTreeMap so that listing and paging are deterministic
    contacts: BTreeMap<ContactId, Contact>,
    next_modify_time: i64,
    export_page_size: usize,
    behaviour: MockBehaviour,
    calls: CallCounts,
}

/// An in-memory [`ContactsApi`] that mocks the remote server
pub struct MockContactsApi {
    state: Mutex<MockState>,
}

impl MockContactsApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                contacts: BTreeMap::new(),
                next_modify_time: 1_000,
                export_page_size: DEFAULT_PAGE_SIZE,
                behaviour: MockBehaviour::default(),
                calls: CallCounts::default(),
            }),
        }
    }

    /// The page size used when a request asks for the server default
    pub fn set_export_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().export_page_size = page_size.max(1);
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.state.lock().unwrap().behaviour = behaviour;
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    /// Put a contact with these cards directly into the mocked server,
    /// bypassing the API. Returns the assigned id.
    pub fn seed_contact(&self, cards: Vec<Card>) -> ContactId {
        let mut state = self.state.lock().unwrap();
        let id = ContactId::from(uuid::Uuid::new_v4().to_hyphenated().to_string());
        let contact = state.new_contact(id.clone(), cards);
        state.contacts.insert(id.clone(), contact);
        id
    }

    /// A clone of the contact as the server holds it (cards included)
    pub fn stored(&self, id: &ContactId) -> Option<Contact> {
        self.state.lock().unwrap().contacts.get(id).cloned()
    }
}

impl Default for MockContactsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn new_contact(&mut self, id: ContactId, cards: Vec<Card>) -> Contact {
        let modify_time = self.next_modify_time;
        self.next_modify_time += 1;
        let size = cards.iter().map(|c| c.data.len() as i64).sum();
        Contact {
            id,
            modify_time: Timestamp(modify_time),
            size,
            cards,
        }
    }
}

/// The card bodies are never echoed back by the real server on writes
fn without_cards(contact: &Contact) -> Contact {
    Contact {
        cards: Vec::new(),
        ..contact.clone()
    }
}

#[async_trait]
impl ContactsApi for MockContactsApi {
    async fn get_contact(&self, id: &ContactId) -> Result<Contact, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_contact += 1;
        state.behaviour.can(Which::Get)?;
        state
            .contacts
            .get(id)
            .cloned()
            .ok_or_else(|| format!("no contact with id {}", id).into())
    }

    async fn list_contacts(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<Contact>), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_contacts += 1;
        state.behaviour.can(Which::List)?;

        let total = state.contacts.len();
        let metadata: Vec<Contact> = state.contacts.values().map(without_cards).collect();
        let page_items = if page_size == 0 {
            // Server default: everything fits in the first page
            if page == 0 {
                metadata
            } else {
                Vec::new()
            }
        } else {
            metadata
                .into_iter()
                .skip(page * page_size)
                .take(page_size)
                .collect()
        };
        Ok((total, page_items))
    }

    async fn list_contacts_export(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<ContactExport>), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_contacts_export += 1;
        state.behaviour.can(Which::Export)?;

        let effective = if page_size == 0 {
            state.export_page_size
        } else {
            page_size
        };
        let total = state.contacts.len();
        let exports = state
            .contacts
            .values()
            .skip(page * effective)
            .take(effective)
            .map(|contact| ContactExport {
                id: contact.id.clone(),
                cards: contact.cards.clone(),
            })
            .collect();
        Ok((total, exports))
    }

    async fn create_contacts(
        &self,
        imports: Vec<ContactImport>,
    ) -> Result<Vec<ContactResponse>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_contacts += 1;
        state.behaviour.can(Which::Create)?;

        let mut responses = Vec::with_capacity(imports.len());
        for import in imports {
            let id = ContactId::from(uuid::Uuid::new_v4().to_hyphenated().to_string());
            let contact = state.new_contact(id.clone(), import.cards);
            let echoed = without_cards(&contact);
            state.contacts.insert(id, contact);
            responses.push(ContactResponse {
                code: CODE_SUCCESS,
                contact: Some(echoed),
                error: None,
            });
        }
        Ok(responses)
    }

    async fn update_contact(
        &self,
        id: &ContactId,
        import: &ContactImport,
    ) -> Result<Contact, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.update_contact += 1;
        state.behaviour.can(Which::Update)?;

        if !state.contacts.contains_key(id) {
            return Err(format!("no contact with id {}", id).into());
        }
        let contact = state.new_contact(id.clone(), import.cards.clone());
        let echoed = without_cards(&contact);
        state.contacts.insert(id.clone(), contact);
        Ok(echoed)
    }

    async fn delete_contacts(&self, ids: &[ContactId]) -> Result<Vec<DeleteResponse>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.delete_contacts += 1;
        state.behaviour.can(Which::Delete)?;

        Ok(ids
            .iter()
            .map(|id| match state.contacts.remove(id) {
                Some(_) => DeleteResponse {
                    code: CODE_SUCCESS,
                    error: None,
                },
                None => DeleteResponse {
                    code: CODE_NOT_FOUND,
                    error: Some(format!("no contact with id {}", id)),
                },
            })
            .collect())
    }
}

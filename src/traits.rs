//! The trait contracts at the bridge's two seams: the CardDAV server in
//! front of it, and the upstream contacts API behind it

use async_trait::async_trait;

use crate::contact::{
    Contact, ContactExport, ContactId, ContactImport, ContactResponse, DeleteResponse,
};
use crate::dav::{AddressBook, AddressBookQuery, AddressDataRequest, AddressObject, PutOptions};
use crate::error::{ApiError, Error};
use crate::vcard::Vcard;

/// The upstream contacts API, as the bridge consumes it.
///
/// Implemented by [`Client`](crate::client::Client) for the real server and by
/// the mock API for tests. Batch operations return one response per request
/// entry, in order.
#[async_trait]
pub trait ContactsApi: Send + Sync {
    /// Fetch one contact with its cards populated
    async fn get_contact(&self, id: &ContactId) -> Result<Contact, ApiError>;

    /// List contact metadata (no cards). `page_size == 0` means the server default.
    /// Returns the total number of contacts that exist, alongside the page.
    async fn list_contacts(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<Contact>), ApiError>;

    /// List contacts with their cards populated. Same paging rules as
    /// [`Self::list_contacts`].
    async fn list_contacts_export(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<ContactExport>), ApiError>;

    async fn create_contacts(
        &self,
        imports: Vec<ContactImport>,
    ) -> Result<Vec<ContactResponse>, ApiError>;

    async fn update_contact(
        &self,
        id: &ContactId,
        import: &ContactImport,
    ) -> Result<Contact, ApiError>;

    async fn delete_contacts(&self, ids: &[ContactId]) -> Result<Vec<DeleteResponse>, ApiError>;
}

/// The CardDAV backend capability the WebDAV layer drives.
///
/// Methods take `&self`: one backend instance is shared across concurrent
/// request handlers.
#[async_trait]
pub trait AddressBookBackend {
    async fn current_user_principal(&self) -> Result<String, Error>;

    async fn address_book_home_set(&self) -> Result<String, Error>;

    async fn address_book(&self) -> Result<AddressBook, Error>;

    async fn get_address_object(
        &self,
        path: &str,
        req: &AddressDataRequest,
    ) -> Result<AddressObject, Error>;

    async fn list_address_objects(
        &self,
        req: &AddressDataRequest,
    ) -> Result<Vec<AddressObject>, Error>;

    async fn query_address_objects(
        &self,
        query: &AddressBookQuery,
    ) -> Result<Vec<AddressObject>, Error>;

    /// Store a card; returns the path of the stored object, which may differ
    /// from the requested one when the server assigns the id
    async fn put_address_object(
        &self,
        path: &str,
        card: Vcard,
        opts: &PutOptions,
    ) -> Result<String, Error>;

    async fn delete_address_object(&self, path: &str) -> Result<(), Error>;
}

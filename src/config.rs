//! Support for library configuration options

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

/// Display name of the single address book exposed at `/contacts/default`.
/// Feel free to override it when initing this library.
pub static ADDRESS_BOOK_NAME: Lazy<Arc<Mutex<String>>> =
    Lazy::new(|| Arc::new(Mutex::new("ProtonMail".to_string())));

/// Description of the single address book.
/// Feel free to override it when initing this library.
pub static ADDRESS_BOOK_DESCRIPTION: Lazy<Arc<Mutex<String>>> =
    Lazy::new(|| Arc::new(Mutex::new("ProtonMail contacts".to_string())));

/// The largest address object the address book advertises (bytes)
pub const MAX_RESOURCE_SIZE: i64 = 100 * 1024;

/// Part of the ProdID string that describes the organization (example of a ProdID string: `-//ABC Corporation//My Product//EN`).
/// Feel free to override it when initing this library.
pub static ORG_NAME: Lazy<Arc<Mutex<String>>> =
    Lazy::new(|| Arc::new(Mutex::new("My organization".to_string())));

/// Part of the ProdID string that describes the product name (example of a ProdID string: `-//ABC Corporation//My Product//EN`).
/// Feel free to override it when initing this library.
pub static PRODUCT_NAME: Lazy<Arc<Mutex<String>>> =
    Lazy::new(|| Arc::new(Mutex::new("CardBridge".to_string())));

/// The ProdID a caller can stamp into cards it builds. The bridge itself
/// never fabricates one: cards keep the ProdID the client supplied, if any.
pub fn default_prod_id() -> String {
    let org = ORG_NAME.lock().unwrap();
    let product = PRODUCT_NAME.lock().unwrap();
    format!("-//{}//{}//EN", *org, *product)
}

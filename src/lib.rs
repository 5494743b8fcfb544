//! This crate bridges an upstream ProtonMail-style contacts API to CardDAV.
//!
//! The upstream HTTP client lives in the [`client`] module, that can be used as a stand-alone module.
//!
//! Because every read would otherwise hit the network (and decrypt every card again), this crate keeps a write-through contact cache in the [`cache`] module, kept in sync by the upstream event stream (see [`events`]). \
//! The [`backend::CardDavBackend`] merges these two sources into the single address book a WebDAV frontend serves. \
//! Contacts travel encrypted: the [`transform`] module splits and merges cards around the [`crypto::CardCrypto`] seam.

pub mod traits;

pub mod backend;
pub use backend::CardDavBackend;
pub mod contact;
pub use contact::{Card, CardKind, Contact, ContactId, Event, Timestamp};
pub mod dav;
pub mod vcard;
pub use vcard::Vcard;
pub mod crypto;
pub mod error;
pub use error::Error;
pub mod path;
pub mod transform;

pub mod client;
pub mod cache;
pub mod events;
pub mod resource;

pub mod config;

#[cfg(any(test, feature = "mock_remote_api"))]
pub mod mock_api;

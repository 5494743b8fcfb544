//! CardDAV surface types
//!
//! The WebDAV request parsing and response serialisation belong to the
//! protocol library sitting in front of the backend; these are the types that
//! cross that boundary, plus the address-book-query filter the protocol
//! library applies after a query.

use chrono::{DateTime, Utc};

use crate::vcard::Vcard;

/// Collection-level metadata for the (single) address book.
#[derive(Clone, Debug, PartialEq)]
pub struct AddressBook {
    pub path: String,
    pub name: String,
    pub description: String,
    pub max_resource_size: i64,
}

/// A single contact rendered as a vCard at a CardDAV URL.
#[derive(Clone, Debug, PartialEq)]
pub struct AddressObject {
    pub path: String,
    pub mod_time: DateTime<Utc>,
    pub etag: String,
    pub card: Vcard,
}

/// Which vCard properties the client asked for.
#[derive(Clone, Debug, Default)]
pub struct AddressDataRequest {
    pub all_prop: bool,
    pub props: Vec<String>,
}

impl AddressDataRequest {
    pub fn all() -> Self {
        Self {
            all_prop: true,
            props: Vec::new(),
        }
    }
}

/// One `prop-filter` of an address-book query.
#[derive(Clone, Debug, Default)]
pub struct PropFilter {
    pub name: String,
    /// Matches objects that do *not* carry the property
    pub is_not_defined: bool,
    /// Case-insensitive substring match over the property values
    pub text_match: Option<String>,
}

/// An address-book query: a data request plus conjunctive prop-filters.
#[derive(Clone, Debug, Default)]
pub struct AddressBookQuery {
    pub data_request: Option<AddressDataRequest>,
    pub prop_filters: Vec<PropFilter>,
}

/// Options of a put; conditional matches are accepted but not honoured yet,
/// the upstream store has no compare-and-swap to map them onto.
#[derive(Clone, Copy, Debug, Default)]
pub struct PutOptions;

/// The CardDAV-level filter applied after `query_address_objects` gathered the
/// candidate set (server-side pushdown is out of scope).
pub fn filter(query: &AddressBookQuery, objects: Vec<AddressObject>) -> Vec<AddressObject> {
    if query.prop_filters.is_empty() {
        return objects;
    }
    objects
        .into_iter()
        .filter(|object| query.prop_filters.iter().all(|f| matches(f, object)))
        .collect()
}

fn matches(prop_filter: &PropFilter, object: &AddressObject) -> bool {
    let fields = object.card.get(&prop_filter.name);
    let defined = fields.map(|f| !f.is_empty()).unwrap_or(false);

    if prop_filter.is_not_defined {
        return !defined;
    }
    if !defined {
        return false;
    }
    match &prop_filter.text_match {
        None => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            fields
                .into_iter()
                .flatten()
                .any(|field| field.value.to_lowercase().contains(&needle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcard::{Field, FORMATTED_NAME};

    fn object(name: &str) -> AddressObject {
        let mut card = Vcard::new();
        card.normalize_v4();
        card.add(FORMATTED_NAME, Field::new(name));
        AddressObject {
            path: format!("/contacts/default/{}.vcf", name),
            mod_time: Utc::now(),
            etag: "0".to_string(),
            card,
        }
    }

    #[test]
    fn text_match_is_case_insensitive() {
        let query = AddressBookQuery {
            data_request: None,
            prop_filters: vec![PropFilter {
                name: FORMATTED_NAME.to_string(),
                is_not_defined: false,
                text_match: Some("ada".to_string()),
            }],
        };
        let kept = filter(&query, vec![object("Ada"), object("Grace")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].card.value(FORMATTED_NAME), Some("Ada"));
    }

    #[test]
    fn is_not_defined_inverts() {
        let query = AddressBookQuery {
            data_request: None,
            prop_filters: vec![PropFilter {
                name: "TEL".to_string(),
                is_not_defined: true,
                text_match: None,
            }],
        };
        let kept = filter(&query, vec![object("Ada")]);
        assert_eq!(kept.len(), 1);
    }
}

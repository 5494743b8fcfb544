//! Converting between the single merged vCard the client sees and the
//! split-card representation the upstream store holds
//!
//! The split is an on-the-wire contract: identity and routing properties go
//! into a cleartext-signed card the upstream can index without user keys,
//! everything else goes into a card encrypted to the owner. `VERSION` is kept
//! in both so each card decodes as a complete vCard on its own.

use std::collections::HashSet;
use std::io::{self, BufReader};

use crate::contact::{Contact, ContactImport, Timestamp};
use crate::crypto::{CardCrypto, CryptoError};
use crate::dav::{AddressDataRequest, AddressObject};
use crate::error::Error;
use crate::path::format_path;
use crate::vcard::{self, Vcard};

/// The properties stored in the cleartext-signed card
const SIGNED_CARD_PROPS: [&str; 5] = [
    vcard::VERSION,
    vcard::PRODID,
    vcard::FORMATTED_NAME,
    vcard::UID,
    vcard::EMAIL,
];

/// Encode a client card into the upstream import shape: normalise to v4,
/// group the emails, split into {signed, encrypted} and protect each part.
pub fn format_card(mut card: Vcard, keyring: &dyn CardCrypto) -> Result<ContactImport, Error> {
    card.normalize_v4();
    assign_email_groups(&mut card);

    let mut to_encrypt = card;
    let mut to_sign = Vcard::new();
    for name in &SIGNED_CARD_PROPS {
        if *name == vcard::VERSION {
            // VERSION stays in both halves
            if let Some(fields) = to_encrypt.get(name) {
                for field in fields {
                    to_sign.add(name, field.clone());
                }
            }
        } else if let Some(fields) = to_encrypt.remove(name) {
            for field in fields {
                to_sign.add(name, field);
            }
        }
    }

    let mut import = ContactImport::default();
    if !to_sign.is_empty() {
        let body = vcard::encode(&to_sign);
        import.cards.push(keyring.sign_cleartext(&body)?);
    }
    if !to_encrypt.is_empty() {
        let body = vcard::encode(&to_encrypt);
        import.cards.push(keyring.encrypt_and_sign(&body)?);
    }
    Ok(import)
}

/// Emails need a group label so the upstream can attach per-address metadata;
/// label the ones the client left bare as `item1`, `item2`, ...
fn assign_email_groups(card: &mut Vcard) {
    if let Some(emails) = card.get_mut(vcard::EMAIL) {
        let mut next = 1;
        for email in emails {
            if email.group.is_none() {
                email.group = Some(format!("item{}", next));
                next += 1;
            }
        }
    }
}

/// Decode every card of an upstream contact, merge them into the single
/// client-facing vCard and wrap it as an address object.
pub fn to_address_object(
    contact: &Contact,
    keyring: &dyn CardCrypto,
    req: &AddressDataRequest,
) -> Result<AddressObject, Error> {
    let mut merged = Vcard::new();

    for stored in &contact.cards {
        let mut opened = keyring.open(stored)?;

        let decoded = {
            let mut reader = BufReader::new(&mut opened.unverified_body);
            let decoded = vcard::decode(&mut reader)?;
            // The signature verdict only settles once the payload hits EOF;
            // a parser that stops at END:VCARD must not shortcut this
            io::copy(&mut reader, &mut io::sink())
                .map_err(|err| CryptoError::Decrypt(err.to_string()))?;
            decoded
        };
        opened.finish()?;

        for (name, fields) in decoded.iter() {
            if name == vcard::VERSION && merged.get(vcard::VERSION).is_some() {
                // Every stored card carries VERSION; the merged view needs it once
                continue;
            }
            for field in fields {
                merged.add(name, field.clone());
            }
        }
    }

    if !req.all_prop && !req.props.is_empty() {
        prune(&mut merged, &req.props);
    }

    Ok(AddressObject {
        path: format_path(&contact.id),
        mod_time: contact.modify_time.to_date_time(),
        etag: etag(contact.modify_time, contact.size),
        card: merged,
    })
}

/// An etag that changes whenever `(modifyTime, size)` changes
pub fn etag(modify_time: Timestamp, size: i64) -> String {
    format!("{:x}{:x}", modify_time, size)
}

fn prune(card: &mut Vcard, keep: &[String]) {
    let keep: HashSet<String> = keep.iter().map(|name| name.to_uppercase()).collect();
    for name in card.names() {
        if name != vcard::VERSION && !keep.contains(&name) {
            card.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{Card, CardKind, ContactId};
    use crate::crypto::MockKeyring;
    use crate::vcard::{Field, EMAIL, FORMATTED_NAME, PRODID, UID, V4, VERSION};

    fn sample_card() -> Vcard {
        let mut card = Vcard::new();
        card.add(FORMATTED_NAME, Field::new("Ada Lovelace"));
        card.add(UID, Field::new("urn:uuid:1234"));
        card.add(EMAIL, Field::new("a@x.example"));
        let mut second = Field::new("work@x.example");
        second.group = Some("work".to_string());
        card.add(EMAIL, second);
        card.add("NOTE", Field::new("polynomials"));
        card
    }

    fn contact_with(cards: Vec<Card>) -> Contact {
        Contact {
            id: ContactId::from("abc"),
            modify_time: Timestamp(0x1234),
            size: 0x56,
            cards,
        }
    }

    #[test]
    fn split_puts_identity_in_the_signed_card_only() {
        let keyring = MockKeyring::new("key1");
        let import = format_card(sample_card(), &keyring).unwrap();

        assert_eq!(import.cards.len(), 2);
        assert_eq!(import.cards[0].kind, CardKind::Signed);
        assert_eq!(import.cards[1].kind, CardKind::EncryptedAndSigned);

        // Signed half: identity props, nothing else
        let signed = vcard::decode(import.cards[0].data.as_bytes()).unwrap();
        assert_eq!(signed.value(VERSION), Some(V4));
        assert_eq!(signed.value(FORMATTED_NAME), Some("Ada Lovelace"));
        assert_eq!(signed.get(EMAIL).unwrap().len(), 2);
        assert!(signed.get("NOTE").is_none());

        // Encrypted half: the rest, VERSION pinned in, identity removed
        let mut opened = keyring.open(&import.cards[1]).unwrap();
        let encrypted = vcard::decode(BufReader::new(&mut opened.unverified_body)).unwrap();
        assert_eq!(encrypted.value(VERSION), Some(V4));
        assert_eq!(encrypted.value("NOTE"), Some("polynomials"));
        assert!(encrypted.get(FORMATTED_NAME).is_none());
        assert!(encrypted.get(UID).is_none());
        assert!(encrypted.get(EMAIL).is_none());
    }

    #[test]
    fn bare_emails_are_grouped_in_encounter_order() {
        let mut card = sample_card();
        card.add(EMAIL, Field::new("third@x.example"));
        let keyring = MockKeyring::new("key1");
        let import = format_card(card, &keyring).unwrap();

        let signed = vcard::decode(import.cards[0].data.as_bytes()).unwrap();
        let groups: Vec<Option<String>> = signed
            .get(EMAIL)
            .unwrap()
            .iter()
            .map(|f| f.group.clone())
            .collect();
        assert_eq!(
            groups,
            vec![
                Some("item1".to_string()),
                Some("work".to_string()),
                Some("item2".to_string()),
            ]
        );
    }

    #[test]
    fn format_then_merge_round_trips() {
        let keyring = MockKeyring::new("key1");
        let import = format_card(sample_card(), &keyring).unwrap();
        let contact = contact_with(import.cards);

        let object =
            to_address_object(&contact, &keyring, &AddressDataRequest::all()).unwrap();

        // The merged view equals the input after v4 normalisation and grouping
        let mut expected = sample_card();
        expected.normalize_v4();
        assign_email_groups(&mut expected);
        assert_eq!(object.card, expected);

        assert_eq!(object.path, "/contacts/default/abc.vcf");
        assert_eq!(object.etag, "123456");
    }

    #[test]
    fn tampered_card_fails_the_whole_read() {
        let keyring = MockKeyring::new("key1");
        let mut import = format_card(sample_card(), &keyring).unwrap();
        import.cards[0].data = import.cards[0].data.replace("Ada", "Eve");
        let contact = contact_with(import.cards);

        let result = to_address_object(&contact, &keyring, &AddressDataRequest::all());
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    #[test]
    fn data_request_prunes_the_merged_card() {
        let keyring = MockKeyring::new("key1");
        let import = format_card(sample_card(), &keyring).unwrap();
        let contact = contact_with(import.cards);

        let req = AddressDataRequest {
            all_prop: false,
            props: vec!["FN".to_string()],
        };
        let object = to_address_object(&contact, &keyring, &req).unwrap();
        assert_eq!(object.card.value(FORMATTED_NAME), Some("Ada Lovelace"));
        assert_eq!(object.card.value(VERSION), Some(V4));
        assert!(object.card.get("NOTE").is_none());
        assert!(object.card.get(EMAIL).is_none());
    }

    #[test]
    fn client_supplied_prodid_lands_in_the_signed_card() {
        let mut card = sample_card();
        card.add(PRODID, Field::new(crate::config::default_prod_id()));
        let keyring = MockKeyring::new("key1");
        let import = format_card(card, &keyring).unwrap();

        let expected = crate::config::default_prod_id();
        let signed = vcard::decode(import.cards[0].data.as_bytes()).unwrap();
        assert_eq!(signed.value(PRODID), Some(expected.as_str()));

        let mut opened = keyring.open(&import.cards[1]).unwrap();
        let encrypted = vcard::decode(BufReader::new(&mut opened.unverified_body)).unwrap();
        assert!(encrypted.get(PRODID).is_none());
    }

    #[test]
    fn etag_tracks_modify_time_and_size() {
        assert_eq!(etag(Timestamp(0xab), 0xcd), "abcd");
        assert_ne!(etag(Timestamp(1), 2), etag(Timestamp(1), 3));
        assert_ne!(etag(Timestamp(1), 2), etag(Timestamp(2), 2));
    }
}

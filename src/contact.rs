//! Upstream contact records and the event types that mutate them

use std::convert::TryFrom;
use std::fmt::{Display, Formatter, LowerHex};

use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The opaque identifier the upstream store assigns to a contact.
///
/// It is only ever compared and echoed back to the server, never interpreted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for ContactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl From<&str> for ContactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
impl Display for ContactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// A Unix timestamp (in seconds), as the upstream API reports modification times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn to_date_time(self) -> DateTime<Utc> {
        match Utc.timestamp_opt(self.0, 0) {
            chrono::LocalResult::Single(dt) => dt,
            // Out-of-range timestamps degrade to the epoch rather than failing a whole read
            _ => Utc.timestamp_opt(0, 0).unwrap(),
        }
    }
}
impl LowerHex for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        LowerHex::fmt(&self.0, f)
    }
}

/// How a single upstream card is protected.
///
/// The bridge only ever *produces* `Signed` and `EncryptedAndSigned` cards, but it
/// accepts all four kinds the wire format defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CardKind {
    Cleartext,
    Encrypted,
    Signed,
    EncryptedAndSigned,
}

impl From<CardKind> for u8 {
    fn from(kind: CardKind) -> u8 {
        match kind {
            CardKind::Cleartext => 0,
            CardKind::Encrypted => 1,
            CardKind::Signed => 2,
            CardKind::EncryptedAndSigned => 3,
        }
    }
}
impl TryFrom<u8> for CardKind {
    type Error = String;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CardKind::Cleartext),
            1 => Ok(CardKind::Encrypted),
            2 => Ok(CardKind::Signed),
            3 => Ok(CardKind::EncryptedAndSigned),
            other => Err(format!("invalid card type {}", other)),
        }
    }
}

/// One stored card body: cleartext or ciphertext, with an optional detached signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "Type")]
    pub kind: CardKind,
    #[serde(rename = "Data")]
    pub data: String,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A contact record as the upstream store holds it.
///
/// `cards` is empty in id-listing responses; export responses and single-contact
/// fetches populate it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "ID")]
    pub id: ContactId,
    #[serde(rename = "ModifyTime", default)]
    pub modify_time: Timestamp,
    #[serde(rename = "Size", default)]
    pub size: i64,
    #[serde(rename = "Cards", default)]
    pub cards: Vec<Card>,
}

/// The wire shape for a create/update payload: the split cards, in {signed, encrypted} order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactImport {
    #[serde(rename = "Cards")]
    pub cards: Vec<Card>,
}

/// One entry of a `list-contacts-export` page: an id with its populated cards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactExport {
    #[serde(rename = "ID")]
    pub id: ContactId,
    #[serde(rename = "Cards", default)]
    pub cards: Vec<Card>,
}

/// Proton-style response code signalling success.
pub const CODE_SUCCESS: u32 = 1000;

/// Per-contact outcome of a batched create.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactResponse {
    #[serde(rename = "Code", default)]
    pub code: u32,
    #[serde(rename = "Contact", default)]
    pub contact: Option<Contact>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

impl ContactResponse {
    /// The per-contact error, if the server rejected this entry of the batch
    pub fn err(&self) -> Option<String> {
        response_err(self.code, self.error.as_deref())
    }
}

/// Per-id outcome of a batched delete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(rename = "Code", default)]
    pub code: u32,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

impl DeleteResponse {
    pub fn err(&self) -> Option<String> {
        response_err(self.code, self.error.as_deref())
    }
}

fn response_err(code: u32, error: Option<&str>) -> Option<String> {
    if code == CODE_SUCCESS {
        return None;
    }
    Some(match error {
        Some(msg) => format!("upstream error {}: {}", code, msg),
        None => format!("upstream error {}", code),
    })
}

bitflags! {
    /// Coarse "throw your state away" signals carried by an event
    pub struct RefreshFlags: u8 {
        const MAIL = 1;
        /// All contact state must be discarded and re-fetched
        const CONTACTS = 2;
    }
}

// On the wire the refresh mask is a bare integer, so the bitflags derive
// (which would emit a `bits` field) cannot be used here.
impl Serialize for RefreshFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}
impl<'de> Deserialize<'de> for RefreshFlags {
    fn deserialize<D>(deserializer: D) -> Result<RefreshFlags, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(RefreshFlags::from_bits_truncate(bits))
    }
}

impl Default for RefreshFlags {
    fn default() -> Self {
        RefreshFlags::empty()
    }
}

/// What happened to one contact, as reported by the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventAction {
    Delete,
    Create,
    Update,
}

impl From<EventAction> for u8 {
    fn from(action: EventAction) -> u8 {
        match action {
            EventAction::Delete => 0,
            EventAction::Create => 1,
            EventAction::Update => 2,
        }
    }
}
impl TryFrom<u8> for EventAction {
    type Error = String;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventAction::Delete),
            1 => Ok(EventAction::Create),
            2 => Ok(EventAction::Update),
            other => Err(format!("invalid event action {}", other)),
        }
    }
}

/// A per-contact change within an event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactEvent {
    #[serde(rename = "ID")]
    pub id: ContactId,
    #[serde(rename = "Action")]
    pub action: EventAction,
    /// Absent for deletions
    #[serde(rename = "Contact", default)]
    pub contact: Option<Contact>,
}

/// One element of the upstream mutation stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Refresh", default)]
    pub refresh: RefreshFlags,
    #[serde(rename = "Contacts", default)]
    pub contacts: Vec<ContactEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_kind_wire_values() {
        let card: Card = serde_json::from_str(r#"{"Type": 2, "Data": "BEGIN:VCARD", "Signature": "sig"}"#).unwrap();
        assert_eq!(card.kind, CardKind::Signed);

        let json = serde_json::to_string(&Card {
            kind: CardKind::EncryptedAndSigned,
            data: "x".to_string(),
            signature: None,
        })
        .unwrap();
        assert!(json.contains("\"Type\":3"));
        assert!(!json.contains("Signature"));
    }

    #[test]
    fn refresh_flags_wire_values() {
        let event: Event = serde_json::from_str(r#"{"Refresh": 255, "Contacts": []}"#).unwrap();
        assert!(event.refresh.contains(RefreshFlags::CONTACTS));

        let event: Event = serde_json::from_str(r#"{"Refresh": 1}"#).unwrap();
        assert!(!event.refresh.contains(RefreshFlags::CONTACTS));
    }

    #[test]
    fn contact_without_cards() {
        let contact: Contact =
            serde_json::from_str(r#"{"ID": "abc", "ModifyTime": 1234, "Size": 42}"#).unwrap();
        assert_eq!(contact.id, ContactId::from("abc"));
        assert!(contact.cards.is_empty());
    }
}

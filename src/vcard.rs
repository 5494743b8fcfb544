//! The merged vCard model, and a codec to and from its text representation
//!
//! The client-facing view of a contact is a single vCard: an unordered multimap
//! from property name to one-or-more fields. Parsing is delegated to the
//! [`ical`] crate; encoding is done here.

use std::collections::HashMap;
use std::io::BufRead;

use thiserror::Error;

pub const VERSION: &str = "VERSION";
pub const PRODID: &str = "PRODID";
pub const FORMATTED_NAME: &str = "FN";
pub const UID: &str = "UID";
pub const EMAIL: &str = "EMAIL";

/// The vCard version every card is normalised to on the wire
pub const V4: &str = "4.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no vCard found in the payload")]
    Empty,
    #[error("unable to parse vCard data: {0}")]
    Parse(String),
}

/// One value of a vCard property, with its optional group label and parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Field {
    /// The `item1.`-style group label, without the trailing dot
    pub group: Option<String>,
    pub params: Vec<(String, Vec<String>)>,
    pub value: String,
}

impl Field {
    pub fn new<S: ToString>(value: S) -> Self {
        Self {
            group: None,
            params: Vec::new(),
            value: value.to_string(),
        }
    }
}

/// An unordered property multimap, the client view of a contact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vcard {
    props: HashMap<String, Vec<Field>>,
}

impl Vcard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Append a field under `name` (property names are case-insensitive and stored uppercased)
    pub fn add<S: AsRef<str>>(&mut self, name: S, field: Field) {
        self.props
            .entry(name.as_ref().to_uppercase())
            .or_insert_with(Vec::new)
            .push(field);
    }

    /// Replace every field of `name` by a single one
    pub fn set<S: AsRef<str>>(&mut self, name: S, field: Field) {
        self.props
            .insert(name.as_ref().to_uppercase(), vec![field]);
    }

    pub fn get(&self, name: &str) -> Option<&Vec<Field>> {
        self.props.get(&name.to_uppercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<Field>> {
        self.props.get_mut(&name.to_uppercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Field>> {
        self.props.remove(&name.to_uppercase())
    }

    /// The first value of `name`, if any
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|fields| fields.first())
            .map(|f| f.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Field>)> {
        self.props.iter()
    }

    /// The property names currently present, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.props.keys().cloned().collect();
        names.sort();
        names
    }

    /// Force the card to advertise vCard 4.0
    pub fn normalize_v4(&mut self) {
        self.set(VERSION, Field::new(V4));
    }
}

/// Decode a single vCard out of a byte stream
pub fn decode<R: BufRead>(reader: R) -> Result<Vcard, CodecError> {
    let mut parser = ical::VcardParser::new(reader);
    let parsed = match parser.next() {
        None => return Err(CodecError::Empty),
        Some(Err(err)) => return Err(CodecError::Parse(err.to_string())),
        Some(Ok(contact)) => contact,
    };

    let mut card = Vcard::new();
    for prop in parsed.properties {
        // The parser keeps the `item1.EMAIL` group prefix glued to the name
        let (group, name) = match prop.name.split_once('.') {
            Some((group, name)) => (Some(group.to_string()), name.to_string()),
            None => (None, prop.name),
        };
        card.add(
            name,
            Field {
                group,
                params: prop.params.unwrap_or_default(),
                value: prop.value.unwrap_or_default(),
            },
        );
    }
    Ok(card)
}

/// Encode a vCard to its text representation (CRLF line endings).
///
/// `VERSION` is emitted first as RFC 6350 requires; the remaining properties are
/// emitted in name order so that the output is deterministic.
pub fn encode(card: &Vcard) -> String {
    let mut out = String::from("BEGIN:VCARD\r\n");

    if let Some(fields) = card.get(VERSION) {
        for field in fields.iter().take(1) {
            encode_field(&mut out, VERSION, field);
        }
    }
    for name in card.names() {
        if name == VERSION {
            continue;
        }
        if let Some(fields) = card.get(&name) {
            for field in fields {
                encode_field(&mut out, &name, field);
            }
        }
    }

    out.push_str("END:VCARD\r\n");
    out
}

fn encode_field(out: &mut String, name: &str, field: &Field) {
    let mut line = String::new();
    if let Some(group) = &field.group {
        line.push_str(group);
        line.push('.');
    }
    line.push_str(name);
    for (param, values) in &field.params {
        line.push(';');
        line.push_str(param);
        line.push('=');
        let values: Vec<String> = values.iter().map(|v| quote_param_value(v)).collect();
        line.push_str(&values.join(","));
    }
    line.push(':');
    line.push_str(&field.value);
    fold(&line, out);
}

/// Parameter values containing separators must be quoted (RFC 6350 §3.3)
fn quote_param_value(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ';' | ',' | ':')) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Content lines are limited to 75 octets; longer ones continue on the next
/// line after a single space (RFC 6350 §3.2)
fn fold(line: &str, out: &mut String) {
    const LIMIT: usize = 75;
    let mut width = 0;
    for c in line.chars() {
        let octets = c.len_utf8();
        if width + octets > LIMIT {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += octets;
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_multimap() {
        let text = "BEGIN:VCARD\r\nVERSION:4.0\r\nFN:Ada Lovelace\r\nEMAIL:a@x.example\r\nitem2.EMAIL;TYPE=work:b@x.example\r\nEND:VCARD\r\n";
        let card = decode(text.as_bytes()).unwrap();

        assert_eq!(card.value(VERSION), Some(V4));
        assert_eq!(card.value(FORMATTED_NAME), Some("Ada Lovelace"));

        let emails = card.get(EMAIL).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].group, None);
        assert_eq!(emails[1].group.as_deref(), Some("item2"));
        assert_eq!(emails[1].params, vec![("TYPE".to_string(), vec!["work".to_string()])]);
    }

    #[test]
    fn decode_empty_payload() {
        assert!(matches!(decode("".as_bytes()), Err(CodecError::Empty)));
    }

    #[test]
    fn encode_then_decode_preserves_fields() {
        let mut card = Vcard::new();
        card.normalize_v4();
        card.add(FORMATTED_NAME, Field::new("Grace Hopper"));
        let mut email = Field::new("g@navy.example");
        email.group = Some("item1".to_string());
        email.params = vec![("TYPE".to_string(), vec!["home".to_string()])];
        card.add(EMAIL, email);

        let text = encode(&card);
        // VERSION must come right after BEGIN
        assert!(text.starts_with("BEGIN:VCARD\r\nVERSION:4.0\r\n"));
        assert!(text.contains("item1.EMAIL;TYPE=home:g@navy.example\r\n"));

        let back = decode(text.as_bytes()).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn long_lines_are_folded() {
        let mut card = Vcard::new();
        card.normalize_v4();
        card.add("NOTE", Field::new("word ".repeat(50)));

        let text = encode(&card);
        for line in text.split("\r\n") {
            assert!(line.len() <= 75, "line too long: {:?}", line);
        }

        // The parser unfolds, so the value survives intact
        let back = decode(text.as_bytes()).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn param_values_with_separators_are_quoted() {
        let mut card = Vcard::new();
        card.normalize_v4();
        let mut email = Field::new("g@navy.example");
        email.params = vec![("TYPE".to_string(), vec!["work,internet".to_string()])];
        card.add(EMAIL, email);

        let text = encode(&card);
        assert!(text.contains("EMAIL;TYPE=\"work,internet\":g@navy.example\r\n"));
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut card = Vcard::new();
        card.add("fn", Field::new("someone"));
        assert_eq!(card.value("FN"), Some("someone"));
    }
}

//! Mapping between the single address-book path namespace and contact ids

use crate::contact::ContactId;
use crate::error::Error;

/// The directory every address object lives in
pub const ADDRESS_BOOK_PATH: &str = "/contacts/default";

const OBJECT_DIR: &str = "/contacts/default/";
const OBJECT_EXT: &str = ".vcf";

/// The CardDAV path of the contact with this id
pub fn format_path(id: &ContactId) -> String {
    format!("{}{}{}", OBJECT_DIR, id, OBJECT_EXT)
}

/// Extract the contact id out of an address-object path.
///
/// Anything outside `/contacts/default/*.vcf` is `NotFound`. The id itself is
/// not validated further: the upstream store is the authority on which ids exist.
pub fn parse_path(path: &str) -> Result<ContactId, Error> {
    let filename = path.strip_prefix(OBJECT_DIR).ok_or(Error::NotFound)?;
    if filename.contains('/') {
        return Err(Error::NotFound);
    }
    let id = filename.strip_suffix(OBJECT_EXT).ok_or(Error::NotFound)?;
    Ok(ContactId::from(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let id = ContactId::from("a_bc-123");
        assert_eq!(parse_path(&format_path(&id)).unwrap(), id);
    }

    #[test]
    fn rejects_foreign_paths() {
        assert!(parse_path("/contacts/other/abc.vcf").is_err());
        assert!(parse_path("/contacts/default/abc.ics").is_err());
        assert!(parse_path("/contacts/default/sub/abc.vcf").is_err());
        assert!(parse_path("/abc.vcf").is_err());
    }
}

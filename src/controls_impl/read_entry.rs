//! Pre-/Post-Read (RFC 4527): request the target entry's state immediately before or
//! after an Add/Delete/Modify/ModifyDN, returned as a response control carrying a
//! `SearchResultEntry`.

use lber::structure::StructureTag;

use crate::controls::{MakeCritical, Oid, RawControl};

pub const PRE_READ_OID: &str = "1.3.6.1.1.13.1";
pub const POST_READ_OID: &str = "1.3.6.1.1.13.2";

/// Request form: which attributes to return (empty means "all user attributes").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreReadEntry {
    pub attrs: Vec<String>,
    crit: bool,
}

impl Oid for PreReadEntry {
    const OID: &'static str = PRE_READ_OID;
}

impl MakeCritical for PreReadEntry {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl PreReadEntry {
    pub fn new(attrs: Vec<String>) -> PreReadEntry {
        PreReadEntry { attrs, crit: false }
    }

    pub fn into_raw(self) -> RawControl {
        let val = crate::search::encode_attribute_selector(&self.attrs);
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(val) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostReadEntry {
    pub attrs: Vec<String>,
    crit: bool,
}

impl Oid for PostReadEntry {
    const OID: &'static str = POST_READ_OID;
}

impl MakeCritical for PostReadEntry {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl PostReadEntry {
    pub fn new(attrs: Vec<String>) -> PostReadEntry {
        PostReadEntry { attrs, crit: false }
    }

    pub fn into_raw(self) -> RawControl {
        let val = crate::search::encode_attribute_selector(&self.attrs);
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(val) }
    }
}

/// Parse a Pre-/Post-Read response control's value, an embedded `SearchResultEntry`,
/// into a [`crate::search::SearchEntry`].
pub fn parse_read_entry_response(val: &[u8]) -> Option<crate::search::SearchEntry> {
    use lber::common::TagClass;
    let (_, tag) = lber::parse::parse_tag(val).ok()?;
    let wrapped = StructureTag { class: TagClass::Application, id: 4, payload: tag.payload };
    crate::search::SearchEntry::from_tag(wrapped)
}

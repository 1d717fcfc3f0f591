use super::ASNTag;
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// Octet-string value: the workhorse of LDAP encoding, used for DNs, attribute
/// names/values, and any other byte-string content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OctetString {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<u8>,
}

impl ASNTag for OctetString {
    fn into_structure(self) -> StructureTag {
        StructureTag { id: self.id, class: self.class, payload: PL::P(self.inner) }
    }
}

impl Default for OctetString {
    fn default() -> Self {
        OctetString { id: Types::OctetString as u64, class: TagClass::Universal, inner: Vec::new() }
    }
}

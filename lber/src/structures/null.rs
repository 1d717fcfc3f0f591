use super::ASNTag;
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// Null value, used for the LDAP Unbind request and other argument-less PDUs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Null {
    pub id: u64,
    pub class: TagClass,
    pub inner: (),
}

impl ASNTag for Null {
    fn into_structure(self) -> StructureTag {
        StructureTag { id: self.id, class: self.class, payload: PL::P(Vec::new()) }
    }
}

impl Default for Null {
    fn default() -> Self {
        Null { id: Types::Null as u64, class: TagClass::Universal, inner: () }
    }
}

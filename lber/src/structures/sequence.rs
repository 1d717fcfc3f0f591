use super::{ASNTag, Tag};
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// An ordered SEQUENCE of tags (or SEQUENCE OF), the building block of every LDAP PDU.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<Tag>,
}

impl ASNTag for Sequence {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(self.inner.into_iter().map(|t| t.into_structure()).collect()),
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence { id: Types::Sequence as u64, class: TagClass::Universal, inner: Vec::new() }
    }
}

/// An unordered SET OF tags, used for attribute value sets.
#[derive(Clone, Debug, PartialEq)]
pub struct Set {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<Tag>,
}

impl ASNTag for Set {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(self.inner.into_iter().map(|t| t.into_structure()).collect()),
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Set { id: Types::Set as u64, class: TagClass::Universal, inner: Vec::new() }
    }
}

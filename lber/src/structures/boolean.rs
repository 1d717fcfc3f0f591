use super::ASNTag;
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// Boolean value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boolean {
    pub id: u64,
    pub class: TagClass,
    pub inner: bool,
}

impl ASNTag for Boolean {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(vec![if self.inner { 0xff } else { 0x00 }]),
        }
    }
}

impl Default for Boolean {
    fn default() -> Self {
        Boolean { id: Types::Boolean as u64, class: TagClass::Universal, inner: false }
    }
}

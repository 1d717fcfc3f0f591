use super::{ASNTag, Tag};
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};

/// An explicitly tagged value: a constructed wrapper carrying exactly one inner tag,
/// used for context-specific tags whose content isn't itself a SEQUENCE (e.g. the LDAP
/// filter's NOT choice).
#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitTag {
    pub id: u64,
    pub class: TagClass,
    pub inner: Box<Tag>,
}

impl ASNTag for ExplicitTag {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(vec![(*self.inner).into_structure()]),
        }
    }
}

impl Default for ExplicitTag {
    fn default() -> Self {
        ExplicitTag {
            id: 0,
            class: TagClass::Context,
            inner: Box::new(Tag::Null(super::Null::default())),
        }
    }
}

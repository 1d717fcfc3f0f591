//! Typed constructors for the handful of BER/ASN.1 types LDAP uses, and the [`Tag`]
//! sum type that lets callers build a PDU as ordinary Rust values before encoding it.

mod boolean;
mod explicit;
mod integer;
mod null;
mod octetstring;
mod sequence;

pub use boolean::Boolean;
pub use explicit::ExplicitTag;
pub use integer::{Enumerated, Integer};
pub use null::Null;
pub use octetstring::OctetString;
pub use sequence::{Sequence, Set};

use crate::structure::StructureTag;

/// Anything that can be turned into a decoded-shape [`StructureTag`] tree for encoding.
pub trait ASNTag {
    fn into_structure(self) -> StructureTag;
}

/// A request- or response-shaped value under construction, prior to encoding.
///
/// `Tag` mirrors [`StructureTag`] but is meant to be built directly from application
/// code (`Tag::Sequence(Sequence { inner: vec![...], ..Default::default() })`) rather
/// than produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Boolean(Boolean),
    Integer(Integer),
    Enumerated(Enumerated),
    OctetString(OctetString),
    Null(Null),
    Sequence(Sequence),
    Set(Set),
    ExplicitTag(ExplicitTag),
    /// A tag already in decoded form, passed through unchanged. Used when re-emitting
    /// a PDU fragment (e.g. a control value) received from the wire.
    StructureTag(StructureTag),
}

impl ASNTag for Tag {
    fn into_structure(self) -> StructureTag {
        match self {
            Tag::Boolean(t) => t.into_structure(),
            Tag::Integer(t) => t.into_structure(),
            Tag::Enumerated(t) => t.into_structure(),
            Tag::OctetString(t) => t.into_structure(),
            Tag::Null(t) => t.into_structure(),
            Tag::Sequence(t) => t.into_structure(),
            Tag::Set(t) => t.into_structure(),
            Tag::ExplicitTag(t) => t.into_structure(),
            Tag::StructureTag(t) => t,
        }
    }
}

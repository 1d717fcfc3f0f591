//! The parsed form of a single BER TLV: [`StructureTag`].

use thiserror::Error;

use crate::common::TagClass;

/// The reason a byte stream failed to decode as a well-formed BER value, together with
/// the byte offset (from the start of the buffer handed to the parser) at which the
/// problem was detected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("BER decode error at offset {offset}: {reason}")]
pub struct DecodeError {
    pub reason: String,
    pub offset: usize,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>, offset: usize) -> Self {
        DecodeError { reason: reason.into(), offset }
    }
}

/// The payload of a tag: either raw content octets (primitive) or a sequence of
/// nested tags (constructed).
#[derive(Clone, Debug, PartialEq)]
pub enum PL {
    P(Vec<u8>),
    C(Vec<StructureTag>),
}

/// A fully decoded BER TLV, with its class/tag-number identifier and payload.
///
/// This is the universal currency of the codec: every LDAP PDU, control, and attribute
/// value round-trips through a tree of `StructureTag`s on its way to or from the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureTag {
    pub class: TagClass,
    pub id: u64,
    pub payload: PL,
}

impl StructureTag {
    /// Keep the tag only if its class matches; otherwise discard it.
    pub fn match_class(self, class: TagClass) -> Option<StructureTag> {
        if self.class == class {
            Some(self)
        } else {
            None
        }
    }

    /// Keep the tag only if its tag number matches; otherwise discard it.
    pub fn match_id(self, id: u64) -> Option<StructureTag> {
        if self.id == id {
            Some(self)
        } else {
            None
        }
    }

    /// Unwrap a constructed tag's children, discarding the tag if it was primitive.
    pub fn expect_constructed(self) -> Option<Vec<StructureTag>> {
        match self.payload {
            PL::C(v) => Some(v),
            PL::P(_) => None,
        }
    }

    /// Unwrap a primitive tag's content octets, discarding the tag if it was constructed.
    pub fn expect_primitive(self) -> Option<Vec<u8>> {
        match self.payload {
            PL::P(v) => Some(v),
            PL::C(_) => None,
        }
    }
}

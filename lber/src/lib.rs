//! A minimal ASN.1 BER encoder/decoder for the subset used by LDAP (RFC 4511 §5.1).
//!
//! Only definite-length primitive and constructed values are supported; indefinite-length
//! encodings are rejected by the parser, as required by the LDAP profile of BER.

pub mod common;
pub mod structure;
pub mod structures;
pub mod universal;
pub mod parse;
pub mod write;

pub use common::{TagClass, TagStructure};
pub use structure::{DecodeError, StructureTag, PL};
pub use structures::{
    ASNTag, Boolean, Enumerated, ExplicitTag, Integer, Null, OctetString, Sequence, Set, Tag,
};
pub use universal::Types;
pub use parse::{parse_tag, parse_uint};

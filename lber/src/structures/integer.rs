use byteorder::{BigEndian, WriteBytesExt};

use super::ASNTag;
use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// Integer value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Integer {
    pub id: u64,
    pub class: TagClass,
    pub inner: i64,
}

/// Integer with a different universal tag (used for enumerations such as the LDAP
/// result-code field and search scope).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enumerated {
    pub id: u64,
    pub class: TagClass,
    pub inner: i64,
}

fn minimal_be_octets(inner: i64) -> Vec<u8> {
    let mut count = 1u8;
    let mut rem: i64 = if inner >= 0 { inner } else { !inner };
    while rem >= 0x80 {
        rem >>= 8;
        count += 1;
    }
    let mut out = Vec::with_capacity(count as usize);
    out.write_int::<BigEndian>(inner, count as usize).expect("fits by construction");
    out
}

fn i_e_into_structure(id: u64, class: TagClass, inner: i64) -> StructureTag {
    StructureTag { id, class, payload: PL::P(minimal_be_octets(inner)) }
}

impl ASNTag for Integer {
    fn into_structure(self) -> StructureTag {
        i_e_into_structure(self.id, self.class, self.inner)
    }
}

impl ASNTag for Enumerated {
    fn into_structure(self) -> StructureTag {
        i_e_into_structure(self.id, self.class, self.inner)
    }
}

impl Default for Integer {
    fn default() -> Integer {
        Integer { id: Types::Integer as u64, class: TagClass::Universal, inner: 0 }
    }
}

impl Default for Enumerated {
    fn default() -> Enumerated {
        Enumerated { id: Types::Enumerated as u64, class: TagClass::Universal, inner: 0 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_not_unnecessary_octets() {
        let result = i_e_into_structure(2, TagClass::Universal, 127);
        assert_eq!(result.payload, PL::P(vec![127]));
    }

    #[test]
    fn test_not_positive_getting_negative() {
        // 128 doesn't fit an 8-bit signed number; an extra octet is required.
        let result = i_e_into_structure(2, TagClass::Universal, 128);
        assert_eq!(result.payload, PL::P(vec![0, 128]));
    }

    #[test]
    fn test_negative_one() {
        let result = i_e_into_structure(2, TagClass::Universal, -1);
        assert_eq!(result.payload, PL::P(vec![0xff]));
    }
}

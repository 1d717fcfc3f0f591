//! The BER reader: turns a byte slice into a [`StructureTag`] tree.
//!
//! Decoding is definite-length only; an indefinite-length encoding (a BER feature LDAP
//! never uses) is rejected with [`DecodeError`]. Lengths above [`MAX_BER_LENGTH`] are
//! rejected the same way, guarding against a malicious or corrupt peer claiming an
//! enormous content length.

use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::common::{TagClass, TagStructure};
use crate::structure::{DecodeError, StructureTag, PL};

/// The default ceiling on a single BER value's content length (16 MiB).
pub const MAX_BER_LENGTH: u64 = 16 * 1024 * 1024;

type NomResult<'a, T> = IResult<&'a [u8], T>;

fn tag_class_bits(b: u8) -> TagClass {
    TagClass::from_u8(b >> 6).expect("two bits always map to a valid TagClass")
}

fn tag_structure_bit(b: u8) -> TagStructure {
    if b & 0x20 != 0 {
        TagStructure::Constructed
    } else {
        TagStructure::Primitive
    }
}

/// Parse the identifier octet(s): class, primitive/constructed bit, and tag number,
/// including the high-tag-number (base-128) continuation form.
pub(crate) fn parse_type_header(input: &[u8]) -> NomResult<(TagClass, TagStructure, u64)> {
    let (input, first) = be_u8(input)?;
    let class = tag_class_bits(first);
    let structure = tag_structure_bit(first);
    let low = first & 0x1f;
    if low < 0x1f {
        return Ok((input, (class, structure, low as u64)));
    }
    let mut id: u64 = 0;
    let mut rest = input;
    loop {
        let (r, b) = be_u8(rest)?;
        id = (id << 7) | (b & 0x7f) as u64;
        rest = r;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((rest, (class, structure, id)))
}

/// Parse a BER length: short form (single byte, top bit clear) or long form (top bit
/// set, low 7 bits give the byte count of a following big-endian length value).
/// The indefinite-length marker (`0x80` alone) is rejected.
pub(crate) fn parse_length(input: &[u8]) -> NomResult<u64> {
    let (input, first) = be_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as u64));
    }
    let count = first & 0x7f;
    if count == 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (input, bytes) = take(count as usize)(input)?;
    let (_, len) = parse_uint(bytes)?;
    Ok((input, len))
}

/// Interpret a byte slice as a big-endian unsigned integer. Used both for BER long-form
/// lengths and for decoding `INTEGER`/`ENUMERATED` content octets as unsigned values.
pub fn parse_uint(i: &[u8]) -> NomResult<u64> {
    let v = i.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
    Ok((&i[i.len()..], v))
}

/// Interpret a byte slice as a big-endian two's-complement signed integer, per the
/// BER/DER encoding of `INTEGER` and `ENUMERATED`.
pub fn parse_int(i: &[u8]) -> NomResult<i64> {
    if i.is_empty() {
        return Ok((i, 0));
    }
    let negative = i[0] & 0x80 != 0;
    let mut v: i64 = if negative { -1 } else { 0 };
    for &byte in i {
        v = (v << 8) | byte as i64;
    }
    Ok((&i[i.len()..], v))
}

/// Parse one complete BER TLV, recursing into constructed payloads.
pub fn parse_tag(i: &[u8]) -> NomResult<StructureTag> {
    parse_tag_bounded(i, MAX_BER_LENGTH)
}

fn parse_tag_bounded(i: &[u8], max_len: u64) -> NomResult<StructureTag> {
    let (i, (class, structure, id)) = parse_type_header(i)?;
    let (i, len) = parse_length(i)?;
    if len > max_len {
        return Err(nom::Err::Failure(nom::error::Error::new(
            i,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (i, content) = take(len as usize)(i)?;
    let payload = match structure {
        TagStructure::Primitive => PL::P(content.to_vec()),
        TagStructure::Constructed => {
            let mut rest = content;
            let mut children = Vec::new();
            while !rest.is_empty() {
                let (r, child) = parse_tag_bounded(rest, max_len)?;
                rest = r;
                children.push(child);
            }
            PL::C(children)
        }
    };
    Ok((i, StructureTag { class, id, payload }))
}

/// Decode exactly one BER TLV from `input`, translating any parse failure into a
/// [`DecodeError`] carrying the offset at which decoding stopped making progress.
pub fn decode_one(input: &[u8]) -> Result<(&[u8], StructureTag), DecodeError> {
    decode_one_bounded(input, MAX_BER_LENGTH)
}

/// As [`decode_one`], but with an explicit content-length ceiling.
pub fn decode_one_bounded(input: &[u8], max_len: u64) -> Result<(&[u8], StructureTag), DecodeError> {
    match parse_tag_bounded(input, max_len) {
        Ok((rest, tag)) => Ok((rest, tag)),
        Err(nom::Err::Incomplete(_)) => {
            Err(DecodeError::new("incomplete BER value", input.len()))
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = input.len() - e.input.len();
            Err(DecodeError::new(format!("{:?}", e.code), offset))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::TagClass;
    use crate::structure::PL;

    #[test]
    fn test_primitive() {
        let bytes: Vec<u8> = vec![2, 2, 255, 127];
        let result_tag = StructureTag {
            class: TagClass::Universal,
            id: 2,
            payload: PL::P(vec![255, 127]),
        };
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        assert_eq!(tag, result_tag);
    }

    #[test]
    fn test_constructed() {
        let bytes: Vec<u8> = vec![
            48, 14, 12, 12, 72, 101, 108, 108, 111, 32, 87, 111, 114, 108, 100, 33,
        ];
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        assert_eq!(tag.class, TagClass::Universal);
        assert_eq!(tag.id, 16);
        let children = tag.expect_constructed().expect("constructed");
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].clone().expect_primitive().expect("octets"),
            b"Hello World!".to_vec()
        );
    }

    #[test]
    fn test_long_length() {
        let mut bytes = vec![0x30u8, 0x81, 0x10];
        bytes.extend(vec![4u8, 14, b'h', b'e', b'l', b'l', b'o', b' ', b'w', b'o', b'r', b'l', b'd', b'!', b'!', b'!']);
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        assert_eq!(tag.class, TagClass::Universal);
        assert_eq!(tag.id, 16);
    }

    #[test]
    fn test_indefinite_like_zero_count_rejected() {
        let bytes: Vec<u8> = vec![0x30, 0x80];
        assert!(parse_tag(&bytes).is_err());
    }

    #[test]
    fn test_length_too_large_rejected() {
        let mut bytes = vec![0x04u8, 0x84, 0xFF, 0xFF, 0xFF, 0xFF];
        bytes.extend(std::iter::repeat(0u8).take(4));
        assert!(decode_one(&bytes).is_err());
    }

    #[test]
    fn test_high_tag_number_form() {
        // class=Context(2), constructed, tag number 31 (encoded in high-tag-number form)
        let bytes: Vec<u8> = vec![0xBF, 0x1F, 0x00];
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        assert_eq!(tag.class, TagClass::Context);
        assert_eq!(tag.id, 31);
    }

    #[test]
    fn test_parse_uint_roundtrip() {
        let (_, v) = parse_uint(&[0x01, 0x00]).expect("parses");
        assert_eq!(v, 256);
    }

    #[test]
    fn test_parse_int_negative() {
        let (_, v) = parse_int(&[0xFF]).expect("parses");
        assert_eq!(v, -1);
        let (_, v) = parse_int(&[0x00, 0x80]).expect("parses");
        assert_eq!(v, 128);
    }
}

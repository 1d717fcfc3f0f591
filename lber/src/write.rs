//! The BER writer: a buffer that supports opening a constructed tag, writing children
//! into it, and closing it once its total length is known — the "length back-patching"
//! the codec needs, since a SEQUENCE's length precedes its content on the wire but isn't
//! known until every child has been written.

use crate::common::TagClass;
use crate::structures::ASNTag;

fn write_identifier(buf: &mut Vec<u8>, class: TagClass, constructed: bool, id: u64) {
    let pc_bit = if constructed { 0x20 } else { 0x00 };
    if id < 0x1f {
        buf.push((class.as_u8() << 6) | pc_bit | id as u8);
        return;
    }
    buf.push((class.as_u8() << 6) | pc_bit | 0x1f);
    // base-128, most significant group first, continuation bit set on all but the last
    let mut groups = Vec::new();
    let mut v = id;
    loop {
        groups.push((v & 0x7f) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for (i, g) in groups.iter().rev().enumerate() {
        let last = i == groups.len() - 1;
        buf.push(if last { *g } else { g | 0x80 });
    }
}

fn write_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
        return;
    }
    let mut be = Vec::new();
    let mut v = len as u64;
    while v > 0 {
        be.push((v & 0xff) as u8);
        v >>= 8;
    }
    be.reverse();
    buf.push(0x80 | be.len() as u8);
    buf.extend_from_slice(&be);
}

/// A streaming BER encoder. Primitive values are written directly; constructed values
/// are opened with [`Writer::begin_constructed`], filled in by further calls, and closed
/// with [`Writer::end_constructed`], which measures the content just written and splices
/// its length in front of it.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
    marks: Vec<usize>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: Vec::new(), marks: Vec::new() }
    }

    pub fn write_primitive(&mut self, class: TagClass, id: u64, content: &[u8]) {
        write_identifier(&mut self.buf, class, false, id);
        write_length(&mut self.buf, content.len());
        self.buf.extend_from_slice(content);
    }

    pub fn begin_constructed(&mut self, class: TagClass, id: u64) {
        write_identifier(&mut self.buf, class, true, id);
        self.marks.push(self.buf.len());
    }

    /// Close the most recently opened constructed tag, back-patching its length.
    ///
    /// # Panics
    /// Panics if there is no matching `begin_constructed` call outstanding.
    pub fn end_constructed(&mut self) {
        let start = self.marks.pop().expect("end_constructed without begin_constructed");
        let len = self.buf.len() - start;
        let mut len_bytes = Vec::new();
        write_length(&mut len_bytes, len);
        self.buf.splice(start..start, len_bytes);
    }

    pub fn into_vec(self) -> Vec<u8> {
        assert!(self.marks.is_empty(), "unclosed constructed tag");
        self.buf
    }
}

/// Write a fully-built [`StructureTag`](crate::structure::StructureTag) tree into `buf`,
/// appending its encoded bytes.
pub fn encode_into<T: ASNTag>(buf: &mut Vec<u8>, tag: T) {
    let structure = tag.into_structure();
    encode_structure_tag(buf, &structure);
}

fn encode_structure_tag(buf: &mut Vec<u8>, tag: &crate::structure::StructureTag) {
    use crate::structure::PL;
    match &tag.payload {
        PL::P(content) => {
            write_identifier(buf, tag.class, false, tag.id);
            write_length(buf, content.len());
            buf.extend_from_slice(content);
        }
        PL::C(children) => {
            let mut inner = Vec::new();
            for child in children {
                encode_structure_tag(&mut inner, child);
            }
            write_identifier(buf, tag.class, true, tag.id);
            write_length(buf, inner.len());
            buf.extend_from_slice(&inner);
        }
    }
}

/// Encode a fully-built tag tree into a fresh `Vec<u8>`.
pub fn encode<T: ASNTag>(tag: T) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(&mut buf, tag);
    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::parse_tag;
    use crate::structures::{Integer, OctetString, Sequence, Tag};

    #[test]
    fn test_writer_backpatches_length() {
        let mut w = Writer::new();
        w.begin_constructed(TagClass::Universal, 16);
        w.write_primitive(TagClass::Universal, 4, b"hello world!!!");
        w.end_constructed();
        let bytes = w.into_vec();
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        let children = tag.expect_constructed().expect("constructed");
        assert_eq!(children[0].clone().expect_primitive().unwrap(), b"hello world!!!".to_vec());
    }

    #[test]
    fn test_encode_roundtrips_through_parse_tag() {
        let seq = Tag::Sequence(Sequence {
            inner: vec![
                Tag::Integer(Integer { inner: 3, ..Default::default() }),
                Tag::OctetString(OctetString { inner: b"cn=test".to_vec(), ..Default::default() }),
            ],
            ..Default::default()
        });
        let bytes = encode(seq);
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        let children = tag.expect_constructed().expect("constructed");
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_nested_constructed_backpatch() {
        let mut w = Writer::new();
        w.begin_constructed(TagClass::Universal, 16);
        w.begin_constructed(TagClass::Universal, 17);
        w.write_primitive(TagClass::Universal, 4, b"a");
        w.write_primitive(TagClass::Universal, 4, b"b");
        w.end_constructed();
        w.write_primitive(TagClass::Universal, 2, &[7]);
        w.end_constructed();
        let bytes = w.into_vec();
        let (rest, tag) = parse_tag(&bytes).expect("parses");
        assert!(rest.is_empty());
        let top = tag.expect_constructed().unwrap();
        assert_eq!(top.len(), 2);
        let set = top[0].clone().expect_constructed().unwrap();
        assert_eq!(set.len(), 2);
    }
}

//! The wire codec: a `tokio_util::codec` [`Decoder`]/[`Encoder`] pair that turns a byte
//! stream into a sequence of `LDAPMessage` TLVs and back, plus the thin structural
//! wrapper, [`LdapMessage`], used by both the client dispatcher (C7) and the server's
//! per-connection reader loop (C9) to pull apart `messageID`/`protocolOp`/`controls`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use lber::common::TagClass;
use lber::parse::decode_one_bounded;
use lber::structure::{DecodeError, StructureTag};
use lber::structures::ASNTag;

use crate::controls::{parse_controls, Control};

/// One decoded `LDAPMessage` (RFC 4511 §4.1.1): its `messageID`, the `protocolOp`
/// left in raw [`StructureTag`] form (each operation module knows how to interpret its
/// own APPLICATION tag), and any controls.
#[derive(Clone, Debug)]
pub struct LdapMessage {
    pub id: i32,
    pub op: StructureTag,
    pub controls: Vec<Control>,
}

impl LdapMessage {
    /// Split a decoded `LDAPMessage` SEQUENCE into its components.
    pub fn from_structure(tag: StructureTag) -> Result<LdapMessage, DecodeError> {
        let mut children = tag
            .expect_constructed()
            .ok_or_else(|| DecodeError::new("LDAPMessage must be constructed", 0))?
            .into_iter();
        let id_tag = children
            .next()
            .ok_or_else(|| DecodeError::new("LDAPMessage missing messageID", 0))?;
        let id_bytes = id_tag
            .expect_primitive()
            .ok_or_else(|| DecodeError::new("messageID must be primitive", 0))?;
        let (_, id) = lber::parse::parse_int(&id_bytes)
            .map_err(|_| DecodeError::new("malformed messageID", 0))?;
        let op = children
            .next()
            .ok_or_else(|| DecodeError::new("LDAPMessage missing protocolOp", 0))?;
        let mut controls = Vec::new();
        if let Some(ctrl_tag) = children.next() {
            if ctrl_tag.class == TagClass::Context && ctrl_tag.id == 0 {
                controls = parse_controls(ctrl_tag);
            }
        }
        Ok(LdapMessage { id: id as i32, op, controls })
    }
}

/// Decodes a byte stream into successive top-level BER TLVs (each one a complete
/// `LDAPMessage`), and encodes pre-serialized messages back onto the wire unchanged.
///
/// Framing relies entirely on BER's definite-length encoding: the decoder peeks at the
/// identifier and length octets of the next value and only consumes it once enough
/// bytes have arrived, so it composes correctly with TCP's byte-stream (no message
/// boundary) semantics.
#[derive(Default)]
pub struct LdapCodec {
    max_message_len: u64,
}

impl LdapCodec {
    pub fn new() -> LdapCodec {
        LdapCodec { max_message_len: lber::parse::MAX_BER_LENGTH }
    }

    pub fn with_max_message_len(max_message_len: u64) -> LdapCodec {
        LdapCodec { max_message_len }
    }
}

impl Decoder for LdapCodec {
    type Item = StructureTag;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StructureTag>, DecodeError> {
        if src.is_empty() {
            return Ok(None);
        }
        match decode_one_bounded(src, self.max_message_len) {
            Ok((rest, tag)) => {
                let consumed = src.len() - rest.len();
                src.advance(consumed);
                Ok(Some(tag))
            }
            Err(e) if e.reason == "incomplete BER value" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Encoder<Vec<u8>> for LdapCodec {
    type Error = DecodeError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), DecodeError> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use lber::common::TagClass;
    use lber::structure::PL;
    use lber::structures::{Integer, OctetString, Sequence, Tag};
    use lber::write::encode;

    fn bind_message_bytes(id: i32) -> Vec<u8> {
        let msg = Tag::Sequence(Sequence {
            inner: vec![
                Tag::Integer(Integer { inner: id as i64, ..Default::default() }),
                Tag::StructureTag(StructureTag {
                    class: TagClass::Application,
                    id: 0,
                    payload: PL::C(vec![
                        Tag::Integer(Integer { inner: 3, ..Default::default() }).into_structure(),
                        Tag::OctetString(OctetString { inner: Vec::new(), ..Default::default() }).into_structure(),
                    ]),
                }),
            ],
            ..Default::default()
        });
        encode(msg)
    }

    #[test]
    fn decodes_one_full_message() {
        let bytes = bind_message_bytes(1);
        let mut buf = BytesMut::from(&bytes[..]);
        let mut codec = LdapCodec::new();
        let tag = codec.decode(&mut buf).unwrap().expect("decoded");
        let msg = LdapMessage::from_structure(tag).unwrap();
        assert_eq!(msg.id, 1);
        assert_eq!(msg.op.class, TagClass::Application);
        assert_eq!(msg.op.id, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_partial_message() {
        let bytes = bind_message_bytes(2);
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        let mut codec = LdapCodec::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decodes_two_messages_back_to_back() {
        let mut bytes = bind_message_bytes(1);
        bytes.extend(bind_message_bytes(2));
        let mut buf = BytesMut::from(&bytes[..]);
        let mut codec = LdapCodec::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(LdapMessage::from_structure(first).unwrap().id, 1);
        assert_eq!(LdapMessage::from_structure(second).unwrap().id, 2);
    }
}

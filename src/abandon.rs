//! Abandon request encoding (RFC 4511 §4.11). There is no response.

use lber::common::TagClass;
use lber::structure::{DecodeError, StructureTag};
use lber::structures::{ASNTag, Integer};

/// Build the APPLICATION(16) primitive `AbandonRequest` tag: the `messageID` of the
/// operation to abandon.
pub fn abandon_request(message_id: i32) -> StructureTag {
    Integer { id: 16, class: TagClass::Application, inner: message_id as i64 }.into_structure()
}

/// Decode an APPLICATION(16) `AbandonRequest` tag, for use by the server's reader loop.
pub fn decode_abandon_request(tag: StructureTag) -> std::result::Result<i32, DecodeError> {
    let bytes = tag.expect_primitive().ok_or_else(|| DecodeError::new("AbandonRequest not primitive", 0))?;
    let (_, v) = lber::parse::parse_int(&bytes).map_err(|_| DecodeError::new("malformed messageID", 0))?;
    Ok(v as i32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn abandon_request_carries_message_id() {
        let tag = abandon_request(7);
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 16);
        let (_, v) = lber::parse::parse_int(&tag.expect_primitive().unwrap()).unwrap();
        assert_eq!(v, 7);
    }
}

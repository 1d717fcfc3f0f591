//! Compare request/response encoding (RFC 4511 §4.10).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};
use lber::structures::{ASNTag, OctetString, Tag};

use crate::controls::Control;
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(14) `CompareRequest` tag.
pub fn compare_request(dn: &str, attr: &str, value: &[u8]) -> StructureTag {
    StructureTag {
        class: TagClass::Application,
        id: 14,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: dn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            StructureTag {
                class: TagClass::Universal,
                id: 16,
                payload: PL::C(vec![
                    Tag::OctetString(OctetString { inner: attr.as_bytes().to_vec(), ..Default::default() }).into_structure(),
                    Tag::OctetString(OctetString { inner: value.to_vec(), ..Default::default() }).into_structure(),
                ]),
            },
        ]),
    }
}

/// Decode an APPLICATION(15) `CompareResponse` tag. The result code itself (5 or 6)
/// carries the true/false outcome; see [`crate::result::CompareResult`].
pub fn decode_compare_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// Decode an APPLICATION(14) `CompareRequest` tag, for use by the server's reader loop.
pub fn decode_compare_request(tag: StructureTag) -> std::result::Result<(String, String, Vec<u8>), DecodeError> {
    let mut children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("CompareRequest not constructed", 0))?
        .into_iter();
    let dn = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing entry", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 entry", 0))?;
    let mut ava = children
        .next()
        .and_then(|t| t.expect_constructed())
        .ok_or_else(|| DecodeError::new("missing ava", 0))?
        .into_iter();
    let attr = String::from_utf8(
        ava.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing desc", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 desc", 0))?;
    let value = ava.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing value", 0))?;
    Ok((dn, attr, value))
}

/// Build the APPLICATION(15) `CompareResponse` tag, for the server's reader loop.
pub fn encode_compare_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(15, result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compare_request_shape() {
        let tag = compare_request("cn=Alice,dc=example,dc=com", "sn", b"Smith");
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 14);
    }
}

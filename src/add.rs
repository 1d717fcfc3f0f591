//! Add request/response encoding (RFC 4511 §4.7).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};
use lber::structures::{ASNTag, OctetString, Sequence, Tag};

use crate::controls::Control;
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(8) `AddRequest` tag for `dn`, with `attrs` given as
/// `(name, values)` pairs in the order they should appear on the wire.
pub fn add_request(dn: &str, attrs: &[(String, Vec<Vec<u8>>)]) -> StructureTag {
    let attr_children: Vec<StructureTag> = attrs
        .iter()
        .map(|(name, values)| StructureTag {
            class: TagClass::Universal,
            id: 16,
            payload: PL::C(vec![
                Tag::OctetString(OctetString { inner: name.clone().into_bytes(), ..Default::default() }).into_structure(),
                StructureTag {
                    class: TagClass::Universal,
                    id: 17,
                    payload: PL::C(values
                        .iter()
                        .map(|v| Tag::OctetString(OctetString { inner: v.clone(), ..Default::default() }).into_structure())
                        .collect()),
                },
            ]),
        })
        .collect();
    StructureTag {
        class: TagClass::Application,
        id: 8,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: dn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(attr_children) },
        ]),
    }
}

/// Decode an APPLICATION(9) `AddResponse` tag.
pub fn decode_add_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// Build the APPLICATION(9) `AddResponse` tag, for the server's reader loop.
pub fn encode_add_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(9, result)
}

/// Decode an APPLICATION(8) `AddRequest` tag, for use by the server's reader loop.
pub fn decode_add_request(tag: StructureTag) -> std::result::Result<(String, Vec<(String, Vec<Vec<u8>>)>), DecodeError> {
    let mut children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("AddRequest not constructed", 0))?
        .into_iter();
    let dn = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing entry", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 entry", 0))?;
    let attrs = children.next().and_then(|t| t.expect_constructed()).unwrap_or_default();
    let mut out = Vec::new();
    for attr in attrs {
        let mut parts = attr
            .expect_constructed()
            .ok_or_else(|| DecodeError::new("attribute not constructed", 0))?
            .into_iter();
        let name = String::from_utf8(
            parts.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing type", 0))?,
        )
        .map_err(|_| DecodeError::new("non-UTF8 type", 0))?;
        let values = parts
            .next()
            .and_then(|t| t.expect_constructed())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.expect_primitive())
            .collect();
        out.push((name, values));
    }
    Ok((dn, out))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_request_shape() {
        let tag = add_request("cn=Alice,dc=example,dc=com", &[("cn".to_owned(), vec![b"Alice".to_vec()])]);
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 8);
        let children = tag.expect_constructed().unwrap();
        assert_eq!(children.len(), 2);
    }
}

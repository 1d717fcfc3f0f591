//! Modify request/response encoding (RFC 4511 §4.6).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};
use lber::structures::{ASNTag, Enumerated, OctetString, Sequence, Tag};

use crate::controls::Control;
use crate::entry::{ModOp, Modification};
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(6) `ModifyRequest` tag.
pub fn modify_request(dn: &str, mods: &[Modification]) -> StructureTag {
    let changes: Vec<StructureTag> = mods
        .iter()
        .map(|m| StructureTag {
            class: TagClass::Universal,
            id: 16,
            payload: PL::C(vec![
                Tag::Enumerated(Enumerated { inner: m.op as i64, ..Default::default() }).into_structure(),
                StructureTag {
                    class: TagClass::Universal,
                    id: 16,
                    payload: PL::C(vec![
                        Tag::OctetString(OctetString { inner: m.attr.clone().into_bytes(), ..Default::default() }).into_structure(),
                        StructureTag {
                            class: TagClass::Universal,
                            id: 17,
                            payload: PL::C(m.values
                                .iter()
                                .map(|v| Tag::OctetString(OctetString { inner: v.clone(), ..Default::default() }).into_structure())
                                .collect()),
                        },
                    ]),
                },
            ]),
        })
        .collect();
    StructureTag {
        class: TagClass::Application,
        id: 6,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: dn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(changes) },
        ]),
    }
}

/// Decode an APPLICATION(6) `ModifyRequest` tag, for use by the server's reader loop.
pub fn decode_modify_request(tag: StructureTag) -> std::result::Result<(String, Vec<Modification>), DecodeError> {
    let mut children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("ModifyRequest not constructed", 0))?
        .into_iter();
    let dn = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing object", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 object", 0))?;
    let changes = children.next().and_then(|t| t.expect_constructed()).unwrap_or_default();
    let mut mods = Vec::new();
    for change in changes {
        let mut parts = change
            .expect_constructed()
            .ok_or_else(|| DecodeError::new("change not constructed", 0))?
            .into_iter();
        let op_bytes = parts.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing operation", 0))?;
        let (_, op_i) = lber::parse::parse_int(&op_bytes).map_err(|_| DecodeError::new("malformed operation", 0))?;
        let op = ModOp::from_i64(op_i).ok_or_else(|| DecodeError::new("invalid modify operation", 0))?;
        let mut mod_parts = parts
            .next()
            .and_then(|t| t.expect_constructed())
            .ok_or_else(|| DecodeError::new("missing modification", 0))?
            .into_iter();
        let attr = String::from_utf8(
            mod_parts.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing type", 0))?,
        )
        .map_err(|_| DecodeError::new("non-UTF8 type", 0))?;
        let values = mod_parts
            .next()
            .and_then(|t| t.expect_constructed())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.expect_primitive())
            .collect();
        mods.push(Modification { op, attr, values });
    }
    Ok((dn, mods))
}

/// Decode an APPLICATION(7) `ModifyResponse` tag.
pub fn decode_modify_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// Build the APPLICATION(7) `ModifyResponse` tag, for the server's reader loop.
pub fn encode_modify_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(7, result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modify_request_round_trips() {
        let mods = vec![
            Modification { op: ModOp::Replace, attr: "cn".to_owned(), values: vec![b"Alice".to_vec()] },
            Modification { op: ModOp::Delete, attr: "description".to_owned(), values: Vec::new() },
        ];
        let tag = modify_request("cn=Alice,dc=example,dc=com", &mods);
        let (dn, decoded) = decode_modify_request(tag).unwrap();
        assert_eq!(dn, "cn=Alice,dc=example,dc=com");
        assert_eq!(decoded, mods);
    }
}

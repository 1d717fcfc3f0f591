//! Extended operation request/response encoding (RFC 4511 §4.12). [`crate::exop`] and
//! [`crate::exop_impl`] hold the typed wrappers and OID constants; this module builds
//! and tears down the generic `ExtendedRequest`/`ExtendedResponse` PDUs both the client
//! dispatcher (C7) and the server's extended-op registry (C11) need.

use lber::common::TagClass;
use lber::structure::{DecodeError, StructureTag, PL};

use crate::controls::Control;
use crate::exop::Exop;
use crate::result::{decode_ldap_result, ExopResult};

/// Build the APPLICATION(23) `ExtendedRequest` tag.
pub fn encode_extended_request(exop: &Exop) -> StructureTag {
    let mut children = Vec::new();
    if let Some(name) = &exop.name {
        children.push(StructureTag { class: TagClass::Context, id: 0, payload: PL::P(name.clone().into_bytes()) });
    }
    if let Some(val) = &exop.val {
        children.push(StructureTag { class: TagClass::Context, id: 1, payload: PL::P(val.clone()) });
    }
    StructureTag { class: TagClass::Application, id: 23, payload: PL::C(children) }
}

/// Decode an APPLICATION(24) `ExtendedResponse` tag into an [`ExopResult`], separating
/// the `COMPONENTS OF LDAPResult` prefix from the optional `responseName`/`response`.
pub fn decode_extended_response(tag: StructureTag, controls: Vec<Control>) -> ExopResult {
    let children = tag.expect_constructed().unwrap_or_default();
    let mut name = None;
    let mut val = None;
    let mut result_children = Vec::new();
    for child in children {
        match (child.class, child.id) {
            (TagClass::Context, 10) => name = child.expect_primitive().map(|b| String::from_utf8_lossy(&b).into_owned()),
            (TagClass::Context, 11) => val = child.expect_primitive(),
            _ => result_children.push(child),
        }
    }
    let result_tag = StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(result_children) };
    let result = decode_ldap_result(result_tag, controls);
    ExopResult(Exop { name, val }, result)
}

/// Decode an APPLICATION(23) `ExtendedRequest` tag, for the server's dispatch-by-OID path.
pub fn decode_extended_request(tag: StructureTag) -> std::result::Result<Exop, DecodeError> {
    let children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("ExtendedRequest must be constructed", 0))?;
    let mut name = None;
    let mut val = None;
    for child in children {
        match (child.class, child.id) {
            (TagClass::Context, 0) => name = child.expect_primitive().map(|b| String::from_utf8_lossy(&b).into_owned()),
            (TagClass::Context, 1) => val = child.expect_primitive(),
            _ => {}
        }
    }
    Ok(Exop { name, val })
}

/// Build the APPLICATION(24) `ExtendedResponse` tag, for the server's dispatch-by-OID path.
pub fn encode_extended_response(result: &crate::result::LdapResult, exop: &Exop) -> StructureTag {
    use lber::structures::{ASNTag, Integer, OctetString, Tag};

    let mut inner = vec![
        Tag::Integer(Integer { inner: result.rc as i64, ..Default::default() }).into_structure(),
        Tag::OctetString(OctetString { inner: result.matched.clone().into_bytes(), ..Default::default() }).into_structure(),
        Tag::OctetString(OctetString { inner: result.text.clone().into_bytes(), ..Default::default() }).into_structure(),
    ];
    if let Some(name) = &exop.name {
        inner.push(StructureTag { class: TagClass::Context, id: 10, payload: PL::P(name.clone().into_bytes()) });
    }
    if let Some(val) = &exop.val {
        inner.push(StructureTag { class: TagClass::Context, id: 11, payload: PL::P(val.clone()) });
    }
    StructureTag { class: TagClass::Application, id: 24, payload: PL::C(inner) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extended_request_round_trips() {
        let exop = Exop { name: Some("1.2.3".to_owned()), val: Some(b"hi".to_vec()) };
        let tag = encode_extended_request(&exop);
        let decoded = decode_extended_request(tag).unwrap();
        assert_eq!(decoded, exop);
    }

    #[test]
    fn extended_response_round_trips() {
        let result = crate::result::LdapResult::success_result(crate::result::ResultCode::Success);
        let exop = Exop { name: Some("1.2.3".to_owned()), val: None };
        let tag = encode_extended_response(&result, &exop);
        let decoded = decode_extended_response(tag, vec![]);
        assert!(decoded.1.is_success());
        assert_eq!(decoded.0.name, exop.name);
    }
}

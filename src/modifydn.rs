//! ModifyDN request/response encoding (RFC 4511 §4.9).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};
use lber::structures::{ASNTag, Boolean, OctetString, Tag};

use crate::controls::Control;
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(12) `ModDNRequest` tag.
pub fn modifydn_request(dn: &str, new_rdn: &str, delete_old_rdn: bool, new_superior: Option<&str>) -> StructureTag {
    let mut children = vec![
        Tag::OctetString(OctetString { inner: dn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
        Tag::OctetString(OctetString { inner: new_rdn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
        Tag::Boolean(Boolean { inner: delete_old_rdn, ..Default::default() }).into_structure(),
    ];
    if let Some(sup) = new_superior {
        children.push(StructureTag { class: TagClass::Context, id: 0, payload: PL::P(sup.as_bytes().to_vec()) });
    }
    StructureTag { class: TagClass::Application, id: 12, payload: PL::C(children) }
}

/// Decode an APPLICATION(13) `ModDNResponse` tag.
pub fn decode_modifydn_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// Decode an APPLICATION(12) `ModDNRequest` tag, for use by the server's reader loop.
pub struct ModDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

pub fn decode_modifydn_request(tag: StructureTag) -> std::result::Result<ModDnRequest, DecodeError> {
    let mut children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("ModDNRequest not constructed", 0))?
        .into_iter();
    let dn = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing entry", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 entry", 0))?;
    let new_rdn = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing newrdn", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 newrdn", 0))?;
    let delete_old_bytes = children
        .next()
        .and_then(|t| t.expect_primitive())
        .ok_or_else(|| DecodeError::new("missing deleteoldrdn", 0))?;
    let delete_old_rdn = delete_old_bytes.first().map(|b| *b != 0).unwrap_or(false);
    let new_superior = match children.next() {
        Some(t) if t.class == TagClass::Context && t.id == 0 => {
            let bytes = t.expect_primitive().ok_or_else(|| DecodeError::new("newsuperior not primitive", 0))?;
            Some(String::from_utf8(bytes).map_err(|_| DecodeError::new("non-UTF8 newsuperior", 0))?)
        }
        _ => None,
    };
    Ok(ModDnRequest { dn, new_rdn, delete_old_rdn, new_superior })
}

/// Build the APPLICATION(13) `ModDNResponse` tag, for the server's reader loop.
pub fn encode_modifydn_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(13, result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modifydn_request_with_new_superior() {
        let tag = modifydn_request("cn=Alice,dc=example,dc=com", "cn=Alicia", true, Some("ou=people,dc=example,dc=com"));
        let children = tag.expect_constructed().unwrap();
        assert_eq!(children.len(), 4);
        assert_eq!(children[3].class, TagClass::Context);
        assert_eq!(children[3].id, 0);
    }

    #[test]
    fn modifydn_request_without_new_superior() {
        let tag = modifydn_request("cn=Alice,dc=example,dc=com", "cn=Alicia", false, None);
        let children = tag.expect_constructed().unwrap();
        assert_eq!(children.len(), 3);
    }
}

//! Bind request/response encoding (RFC 4511 §4.2).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};
use lber::structures::{ASNTag, Integer, OctetString, Sequence, Tag};

use crate::controls::Control;
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(0) tag for a simple bind.
pub fn simple_bind_request(dn: &str, password: &str) -> StructureTag {
    StructureTag {
        class: TagClass::Application,
        id: 0,
        payload: PL::C(vec![
            Tag::Integer(Integer { inner: 3, ..Default::default() }).into_structure(),
            Tag::OctetString(OctetString { inner: dn.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Context, id: 0, payload: PL::P(password.as_bytes().to_vec()) },
        ]),
    }
}

/// Build the APPLICATION(0) tag for a SASL EXTERNAL bind: an empty DN and mechanism
/// name `"EXTERNAL"`, relying on the transport (TLS client certificate) for identity.
pub fn sasl_external_bind_request(authzid: Option<&str>) -> StructureTag {
    let creds = authzid.map(|a| a.as_bytes().to_vec());
    let mut sasl_inner = vec![
        Tag::OctetString(OctetString { inner: b"EXTERNAL".to_vec(), ..Default::default() }).into_structure(),
    ];
    if let Some(c) = creds {
        sasl_inner.push(Tag::OctetString(OctetString { inner: c, ..Default::default() }).into_structure());
    }
    StructureTag {
        class: TagClass::Application,
        id: 0,
        payload: PL::C(vec![
            Tag::Integer(Integer { inner: 3, ..Default::default() }).into_structure(),
            Tag::OctetString(OctetString { inner: Vec::new(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Context, id: 3, payload: PL::C(sasl_inner) },
        ]),
    }
}

/// Decode an APPLICATION(1) `BindResponse` tag into an [`LdapResult`]. The optional
/// `serverSaslCreds` field is dropped; callers needing SASL credential exchange should
/// use a lower-level API (out of scope for this client, see Non-goals).
pub fn decode_bind_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// What the server's reader loop needs out of an APPLICATION(0) `BindRequest`: simple
/// binds carry a password, SASL binds carry a mechanism name and optional credentials.
pub enum BindCredentials {
    Simple(String),
    Sasl { mechanism: String, credentials: Option<Vec<u8>> },
}

pub struct BindRequest {
    pub version: i64,
    pub name: String,
    pub credentials: BindCredentials,
}

/// Decode an APPLICATION(0) `BindRequest` tag, for use by the server's reader loop.
pub fn decode_bind_request(tag: StructureTag) -> std::result::Result<BindRequest, DecodeError> {
    let mut children = tag
        .expect_constructed()
        .ok_or_else(|| DecodeError::new("BindRequest not constructed", 0))?
        .into_iter();
    let version_bytes = children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing version", 0))?;
    let (_, version) = lber::parse::parse_int(&version_bytes).map_err(|_| DecodeError::new("malformed version", 0))?;
    let name = String::from_utf8(
        children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing name", 0))?,
    )
    .map_err(|_| DecodeError::new("non-UTF8 name", 0))?;
    let auth = children.next().ok_or_else(|| DecodeError::new("missing authentication", 0))?;
    let credentials = match (auth.class, auth.id) {
        (TagClass::Context, 0) => {
            let bytes = auth.expect_primitive().ok_or_else(|| DecodeError::new("simple creds not primitive", 0))?;
            BindCredentials::Simple(String::from_utf8(bytes).map_err(|_| DecodeError::new("non-UTF8 password", 0))?)
        }
        (TagClass::Context, 3) => {
            let mut parts = auth.expect_constructed().ok_or_else(|| DecodeError::new("sasl creds not constructed", 0))?.into_iter();
            let mechanism = String::from_utf8(
                parts.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing mechanism", 0))?,
            )
            .map_err(|_| DecodeError::new("non-UTF8 mechanism", 0))?;
            let credentials = parts.next().and_then(|t| t.expect_primitive());
            BindCredentials::Sasl { mechanism, credentials }
        }
        _ => return Err(DecodeError::new("unrecognized authentication choice", 0)),
    };
    Ok(BindRequest { version, name, credentials })
}

/// Build the APPLICATION(1) `BindResponse` tag, for the server's reader loop. This
/// server never negotiates a SASL mechanism that returns `serverSaslCreds`, so that
/// optional field is always omitted.
pub fn encode_bind_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(1, result)
}

#[cfg(test)]
mod test {
    use super::*;
    use lber::structure::PL;

    #[test]
    fn simple_bind_request_has_expected_shape() {
        let tag = simple_bind_request("cn=admin,dc=example,dc=com", "secret");
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 0);
        let children = tag.expect_constructed().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].class, TagClass::Context);
        assert_eq!(children[2].id, 0);
        match &children[2].payload {
            PL::P(pw) => assert_eq!(pw, b"secret"),
            _ => panic!("expected primitive"),
        }
    }
}

//! Delete request/response encoding (RFC 4511 §4.8).

use lber::common::TagClass;
use lber::structure::{DecodeError, PL, StructureTag};

use crate::controls::Control;
use crate::result::{decode_ldap_result, encode_ldap_result, LdapResult};

/// Build the APPLICATION(10) primitive `DelRequest` tag: just the target DN.
pub fn delete_request(dn: &str) -> StructureTag {
    StructureTag { class: TagClass::Application, id: 10, payload: PL::P(dn.as_bytes().to_vec()) }
}

/// Decode an APPLICATION(11) `DelResponse` tag.
pub fn decode_delete_response(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    decode_ldap_result(tag, controls)
}

/// Decode an APPLICATION(10) `DelRequest` tag, for use by the server's reader loop.
pub fn decode_delete_request(tag: StructureTag) -> std::result::Result<String, DecodeError> {
    let bytes = tag.expect_primitive().ok_or_else(|| DecodeError::new("DelRequest not primitive", 0))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::new("non-UTF8 DN", 0))
}

/// Build the APPLICATION(11) `DelResponse` tag, for the server's reader loop.
pub fn encode_delete_response(result: &LdapResult) -> StructureTag {
    encode_ldap_result(11, result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delete_request_is_primitive_octet_string() {
        let tag = delete_request("cn=Alice,dc=example,dc=com");
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 10);
        assert_eq!(tag.expect_primitive().unwrap(), b"cn=Alice,dc=example,dc=com".to_vec());
    }
}

//! Password Modify (RFC 3062): change a user's password, optionally having the server
//! generate one.

use lber::structures::{ASNTag, Sequence, Tag};
use lber::write::encode;

use crate::exop::Request;

pub const PASSWORD_MODIFY_OID: &str = "1.3.6.1.4.1.4203.1.11.1";

/// Request value fields are all OPTIONAL per RFC 3062 §1: an empty `user_identity`
/// targets the bound identity, and an empty `new_password` asks the server to
/// generate one (returned in the response).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasswordModify {
    pub user_identity: Option<String>,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

impl Request for PasswordModify {
    fn oid(&self) -> &'static str {
        PASSWORD_MODIFY_OID
    }

    fn into_value(self) -> Option<Vec<u8>> {
        let mut inner = Vec::new();
        if let Some(id) = self.user_identity {
            inner.push(Tag::StructureTag(lber::structure::StructureTag {
                class: lber::common::TagClass::Context,
                id: 0,
                payload: lber::structure::PL::P(id.into_bytes()),
            }));
        }
        if let Some(old) = self.old_password {
            inner.push(Tag::StructureTag(lber::structure::StructureTag {
                class: lber::common::TagClass::Context,
                id: 1,
                payload: lber::structure::PL::P(old.into_bytes()),
            }));
        }
        if let Some(new) = self.new_password {
            inner.push(Tag::StructureTag(lber::structure::StructureTag {
                class: lber::common::TagClass::Context,
                id: 2,
                payload: lber::structure::PL::P(new.into_bytes()),
            }));
        }
        if inner.is_empty() {
            None
        } else {
            Some(encode(Tag::Sequence(Sequence { inner, ..Default::default() })))
        }
    }
}

/// The response value, if present, carries a server-generated password (RFC 3062 §3).
pub fn parse_response(val: Option<Vec<u8>>) -> Option<String> {
    let val = val?;
    let (_, tag) = lber::parse::parse_tag(&val).ok()?;
    let children = tag.expect_constructed()?;
    let genpasswd = children.into_iter().find(|c| c.id == 0)?;
    let bytes = genpasswd.expect_primitive()?;
    String::from_utf8(bytes).ok()
}

/// Build the response value for a server-generated password, for the server's
/// extended-op dispatch; `None` when the caller supplied their own `new_password`.
pub fn encode_response(generated: Option<String>) -> Option<Vec<u8>> {
    let generated = generated?;
    let inner = vec![Tag::StructureTag(lber::structure::StructureTag {
        class: lber::common::TagClass::Context,
        id: 0,
        payload: lber::structure::PL::P(generated.into_bytes()),
    })];
    Some(encode(Tag::Sequence(Sequence { inner, ..Default::default() })))
}

/// Pull the optional `userIdentity`/`oldPasswd`/`newPasswd` fields back out of a
/// `PasswdModifyRequestValue`, for the server's extended-op dispatch. A request with no
/// value at all (every field omitted) decodes to all-`None`.
pub fn decode_request(val: Option<&[u8]>) -> (Option<String>, Option<String>, Option<String>) {
    let mut user_identity = None;
    let mut old_password = None;
    let mut new_password = None;
    let val = match val {
        Some(v) => v,
        None => return (user_identity, old_password, new_password),
    };
    let children = match lber::parse::parse_tag(val).ok().and_then(|(_, t)| t.expect_constructed()) {
        Some(c) => c,
        None => return (user_identity, old_password, new_password),
    };
    for child in children {
        let id = child.id;
        let s = child.expect_primitive().and_then(|b| String::from_utf8(b).ok());
        match id {
            0 => user_identity = s,
            1 => old_password = s,
            2 => new_password = s,
            _ => {}
        }
    }
    (user_identity, old_password, new_password)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_request_has_no_value() {
        let req = PasswordModify::default();
        assert!(req.into_value().is_none());
    }

    #[test]
    fn request_with_new_password_encodes() {
        let req = PasswordModify { user_identity: Some("uid=alice".to_owned()), old_password: None, new_password: Some("hunter2".to_owned()) };
        assert!(req.into_value().is_some());
    }
}

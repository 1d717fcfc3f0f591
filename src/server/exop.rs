//! Extended operation registry (C11): the OID catalogue advertised in the root DSE,
//! and dispatch-by-OID wiring an incoming `ExtendedRequest` to the directory engine and
//! the typed [`crate::exop_impl`] codecs the client side (C7) already shares.

use std::collections::HashMap;

use crate::dn::Dn;
use crate::exop::Exop;
use crate::exop_impl::{cancel, passmod, starttls, whoami};
use crate::result::{LdapResult, ResultCode};
use crate::server::directory::Directory;

/// Every extended operation OID this server answers, advertised in the root DSE's
/// `supportedExtension` attribute.
pub const SUPPORTED_EXTENSION_OIDS: &[&str] =
    &[whoami::WHOAMI_OID, starttls::START_TLS_OID, cancel::CANCEL_OID, passmod::PASSWORD_MODIFY_OID];

/// What the reader loop should do once an extended operation has produced its response.
pub enum ExopOutcome {
    /// Send the response and keep reading requests as before.
    Respond,
    /// Send the response, then (only once it succeeds) renegotiate the transport as TLS.
    StartTls,
}

/// Dispatch a decoded `ExtendedRequest` by OID. `vars` is the connection's free-form
/// state map, consulted here to reject a second StartTLS on an already-upgraded
/// connection.
pub fn dispatch(
    directory: &Directory,
    bound: Option<&Dn>,
    vars: &mut HashMap<String, String>,
    exop: Exop,
) -> (ExopOutcome, LdapResult, Exop) {
    let oid = match exop.name.as_deref() {
        Some(oid) => oid,
        None => {
            return (
                ExopOutcome::Respond,
                LdapResult::error(ResultCode::ProtocolError, "extended request carries no requestName"),
                Exop::default(),
            )
        }
    };
    match oid {
        whoami::WHOAMI_OID => {
            let authzid = directory.handle_whoami(bound);
            (ExopOutcome::Respond, LdapResult::success_result(ResultCode::Success), Exop { name: None, val: authzid.map(String::into_bytes) })
        }
        starttls::START_TLS_OID => {
            if vars.contains_key("tls") {
                return (
                    ExopOutcome::Respond,
                    LdapResult::error(ResultCode::OperationsError, "TLS is already established on this connection"),
                    Exop::default(),
                );
            }
            vars.insert("tls".to_owned(), "true".to_owned());
            (ExopOutcome::StartTls, LdapResult::success_result(ResultCode::Success), Exop::default())
        }
        cancel::CANCEL_OID => {
            // This engine runs one request to completion before reading the next
            // (see server::listener), so by the time a Cancel arrives the targeted
            // operation has either already finished or never existed.
            let result = match exop.val.as_deref().and_then(cancel::decode_request) {
                Some(_target_id) => LdapResult::error(ResultCode::NoSuchOperation, "no operation outstanding to cancel"),
                None => LdapResult::error(ResultCode::ProtocolError, "malformed cancelRequestValue"),
            };
            (ExopOutcome::Respond, result, Exop::default())
        }
        passmod::PASSWORD_MODIFY_OID => {
            let (user_identity, old_password, new_password) = passmod::decode_request(exop.val.as_deref());
            match directory.handle_password_modify(user_identity, old_password, new_password, bound) {
                Ok((result, generated)) => (ExopOutcome::Respond, result, Exop { name: None, val: passmod::encode_response(generated) }),
                Err(result) => (ExopOutcome::Respond, result, Exop::default()),
            }
        }
        other => (
            ExopOutcome::Respond,
            LdapResult::error(ResultCode::UnavailableCriticalExtension, format!("unsupported extended operation {other}")),
            Exop::default(),
        ),
    }
}

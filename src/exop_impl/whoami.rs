//! "Who am I?" (RFC 4532): ask the server to confirm the authorization identity of the
//! current connection.

use crate::exop::Request;

pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WhoAmI;

impl Request for WhoAmI {
    fn oid(&self) -> &'static str {
        WHOAMI_OID
    }

    fn into_value(self) -> Option<Vec<u8>> {
        None
    }
}

/// The response value is the authzId string itself (RFC 4532 §2), with no additional
/// framing.
pub fn parse_response(val: Option<Vec<u8>>) -> Option<String> {
    val.map(|v| String::from_utf8_lossy(&v).into_owned())
}

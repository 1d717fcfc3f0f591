//! Extended operations (RFC 4511 §4.12): the generic request/response envelope, plus
//! typed wrappers for the well-known extensions this crate recognizes.
//!
//! [`crate::exop_impl`] holds the OID constants and value encoding/decoding.

pub use crate::exop_impl::cancel::Cancel;
pub use crate::exop_impl::passmod::PasswordModify;
pub use crate::exop_impl::starttls::StartTls;
pub use crate::exop_impl::whoami::WhoAmI;

/// The generic, untyped form of an extended request or response: an OID and an opaque
/// value. Every [`crate::result::ExopResult`] carries one of these.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exop {
    pub name: Option<String>,
    pub val: Option<Vec<u8>>,
}

/// Implemented by every typed extended-operation request so the client dispatcher can
/// turn it into the generic form before encoding.
pub trait Request {
    fn oid(&self) -> &'static str;
    fn into_value(self) -> Option<Vec<u8>>;
}

impl Exop {
    pub fn from_request(req: impl Request) -> Exop {
        Exop { name: Some(req.oid().to_owned()), val: req.into_value() }
    }
}

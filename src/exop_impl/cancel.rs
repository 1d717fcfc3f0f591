//! The Cancel extended operation (RFC 3909): ask the server to stop processing an
//! outstanding request identified by its `messageID`, receiving a proper `LDAPResult`
//! back instead of Abandon's fire-and-forget silence.

use lber::structures::{ASNTag, Integer, Tag};
use lber::write::encode;

use crate::exop::Request;

pub const CANCEL_OID: &str = "1.3.6.1.1.8";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancel {
    pub message_id: i32,
}

impl Cancel {
    pub fn new(message_id: i32) -> Cancel {
        Cancel { message_id }
    }
}

impl Request for Cancel {
    fn oid(&self) -> &'static str {
        CANCEL_OID
    }

    fn into_value(self) -> Option<Vec<u8>> {
        let tag = Tag::Integer(Integer { inner: self.message_id as i64, ..Default::default() });
        Some(encode(tag))
    }
}

/// Pull the target `messageID` back out of a `cancelRequestValue` (for the server's
/// extended-op dispatch).
pub fn decode_request(val: &[u8]) -> Option<i32> {
    let (_, n) = lber::parse::parse_int(val).ok()?;
    Some(n as i32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_message_id() {
        let val = Cancel::new(7).into_value().unwrap();
        assert_eq!(decode_request(&val), Some(7));
    }
}

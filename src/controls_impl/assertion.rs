//! Assertion control (RFC 4528): the operation only proceeds if `filter` matches the
//! target entry's current state, giving a compare-and-swap primitive over Modify/Delete.

use crate::controls::{MakeCritical, Oid, RawControl};
use crate::filter::Filter;
use crate::result::Result;

pub const ASSERTION_OID: &str = "1.3.6.1.4.1.4203.1.10.1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionControl {
    pub filter: Filter,
    crit: bool,
}

impl Oid for AssertionControl {
    const OID: &'static str = ASSERTION_OID;
}

impl MakeCritical for AssertionControl {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl AssertionControl {
    pub fn new(filter_str: &str) -> Result<AssertionControl> {
        Ok(AssertionControl { filter: Filter::parse(filter_str)?, crit: true })
    }

    /// The assertion control's value is the BER encoding of the filter itself (RFC 4528
    /// §3), reusing [`crate::search::encode_filter`].
    pub fn into_raw(self) -> RawControl {
        let val = crate::search::encode_filter(&self.filter);
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(val) }
    }
}

/// Parse an assertion control's value back into the [`Filter`] it carries, for the
/// server's control preprocessing (C11).
pub fn parse(val: &[u8]) -> Option<Filter> {
    let (_, tag) = lber::parse::parse_tag(val).ok()?;
    crate::search::decode_filter_tag(tag).ok()
}

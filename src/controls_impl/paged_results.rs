//! Simple Paged Results (RFC 2696).

use lber::structures::{ASNTag, Integer, OctetString, Sequence, Tag};
use lber::write::encode;

use crate::controls::{MakeCritical, Oid, RawControl};

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// Requests that search results be returned in pages of at most `size` entries; `cookie`
/// is opaque server state echoed back from the previous page's response control (empty
/// for the first request).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PagedResults {
    pub size: i32,
    pub cookie: Vec<u8>,
    crit: bool,
}

impl Oid for PagedResults {
    const OID: &'static str = PAGED_RESULTS_OID;
}

impl MakeCritical for PagedResults {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl PagedResults {
    pub fn new(size: i32) -> PagedResults {
        PagedResults { size, cookie: Vec::new(), crit: false }
    }

    pub fn with_cookie(mut self, cookie: Vec<u8>) -> PagedResults {
        self.cookie = cookie;
        self
    }

    pub fn into_raw(self) -> RawControl {
        let val = encode(Tag::Sequence(Sequence {
            inner: vec![
                Tag::Integer(Integer { inner: self.size as i64, ..Default::default() }),
                Tag::OctetString(OctetString { inner: self.cookie, ..Default::default() }),
            ],
            ..Default::default()
        }));
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(val) }
    }

    pub fn parse(val: &[u8]) -> Option<PagedResults> {
        let (_, tag) = lber::parse::parse_tag(val).ok()?;
        let mut children = tag.expect_constructed()?.into_iter();
        let (_, size) = lber::parse::parse_int(&children.next()?.expect_primitive()?).ok()?;
        let cookie = children.next()?.expect_primitive()?;
        Some(PagedResults { size: size as i32, cookie, crit: false })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_raw() {
        let pr = PagedResults::new(50).with_cookie(vec![1, 2, 3]);
        let raw = pr.clone().into_raw();
        let parsed = PagedResults::parse(&raw.val.unwrap()).unwrap();
        assert_eq!(parsed.size, 50);
        assert_eq!(parsed.cookie, vec![1, 2, 3]);
    }
}

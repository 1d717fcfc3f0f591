//! Matched Values (RFC 3876): restrict which attribute values a SearchResultEntry
//! includes to those matching a filter, independent of the filter that selected entries.

use crate::controls::{MakeCritical, Oid, RawControl};
use crate::filter::Filter;
use crate::result::Result;

pub const MATCHED_VALUES_OID: &str = "1.2.826.0.1.3344810.2.3";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedValues {
    pub filters: Vec<Filter>,
    crit: bool,
}

impl Oid for MatchedValues {
    const OID: &'static str = MATCHED_VALUES_OID;
}

impl MakeCritical for MatchedValues {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl MatchedValues {
    pub fn new(filter_strs: &[&str]) -> Result<MatchedValues> {
        let filters = filter_strs.iter().map(|s| Filter::parse(s)).collect::<Result<Vec<_>>>()?;
        Ok(MatchedValues { filters, crit: false })
    }

    pub fn into_raw(self) -> RawControl {
        use lber::structures::{Sequence, Tag};
        use lber::write::encode;
        let inner = self
            .filters
            .into_iter()
            .map(|f| Tag::StructureTag(crate::search::encode_filter_tag(&f)))
            .collect();
        let val = encode(Tag::Sequence(Sequence { inner, ..Default::default() }));
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(val) }
    }
}

//! ManageDsaIT (RFC 3296): tells the server to treat referral/alias entries as
//! ordinary entries rather than following or dereferencing them.

use crate::controls::{MakeCritical, Oid, RawControl};

pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManageDsaIt {
    crit: bool,
}

impl Oid for ManageDsaIt {
    const OID: &'static str = MANAGE_DSA_IT_OID;
}

impl MakeCritical for ManageDsaIt {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl ManageDsaIt {
    pub fn new() -> ManageDsaIt {
        ManageDsaIt::default()
    }

    pub fn into_raw(self) -> RawControl {
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: None }
    }
}

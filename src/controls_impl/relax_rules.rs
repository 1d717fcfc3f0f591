//! Relax Rules (draft-zeilenga-ldap-relax): ask the server to relax certain schema and
//! operational-attribute constraints for this operation only.

use crate::controls::{MakeCritical, Oid, RawControl};

pub const RELAX_RULES_OID: &str = "1.3.6.1.4.1.4203.666.5.12";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelaxRules {
    crit: bool,
}

impl Oid for RelaxRules {
    const OID: &'static str = RELAX_RULES_OID;
}

impl MakeCritical for RelaxRules {
    fn critical(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

impl RelaxRules {
    pub fn new() -> RelaxRules {
        RelaxRules::default()
    }

    pub fn into_raw(self) -> RawControl {
        RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: None }
    }
}

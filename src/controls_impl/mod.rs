//! OID constants and BER construction/parsing for each control this crate recognizes.
//! [`crate::controls`] is the public face; this module is the implementation detail
//! behind it, one submodule per control, mirroring the RFC that defines it.

pub mod assertion;
pub mod manage_dsa_it;
pub mod matched_values;
pub mod paged_results;
pub mod proxy_auth;
pub mod read_entry;
pub mod relax_rules;

use crate::controls::{MakeCritical, Oid, RawControl};

/// RFC 4511 §4.4.2.1: request to delete an entire subtree in one Delete operation.
pub const SUBTREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";
/// RFC 3672 §3: request that subentries be included in a Search's scope.
pub const SUBENTRIES_OID: &str = "1.3.6.1.4.1.4203.1.10.2";
/// RFC draft-zeilenga-ldap-allop: relax the Modify operation's "no-op is an error" rule.
pub const PERMISSIVE_MODIFY_OID: &str = "1.2.840.113556.1.4.1413";
/// Proprietary to this core: ignore the `NO-USER-MODIFICATION` flag on attribute types
/// named in an Add request, allowing a caller to set operational attributes directly.
pub const IGNORE_NO_USER_MODIFICATION_OID: &str = "1.3.6.1.4.1.30221.2.5.5";

/// A control whose only content is its OID and criticality flag, sent with no value.
macro_rules! marker_control {
    ($name:ident, $oid:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name {
            crit: bool,
        }

        impl Oid for $name {
            const OID: &'static str = $oid;
        }

        impl MakeCritical for $name {
            fn critical(mut self, crit: bool) -> Self {
                self.crit = crit;
                self
            }
        }

        impl $name {
            pub fn new() -> $name {
                Self::default()
            }

            pub fn into_raw(self) -> RawControl {
                RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: None }
            }
        }
    };
}

marker_control!(SubtreeDelete, SUBTREE_DELETE_OID, "Subtree Delete control (RFC 4511 §4.4.2.1).");
marker_control!(Subentries, SUBENTRIES_OID, "Subentries control (RFC 3672 §3).");
marker_control!(PermissiveModify, PERMISSIVE_MODIFY_OID, "Permissive Modify control.");
marker_control!(
    IgnoreNoUserModification,
    IGNORE_NO_USER_MODIFICATION_OID,
    "Ask the server to accept values for NO-USER-MODIFICATION attribute types in an Add request."
);

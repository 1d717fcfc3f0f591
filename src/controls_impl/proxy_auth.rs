//! Proxied Authorization (RFC 4370): perform the operation as if bound as `authzid`
//! instead of the connection's actual bind identity. RFC 4370 obsoletes the earlier
//! draft's OID with a new one but implementations still encounter both on the wire, so
//! both are recognized.

use crate::controls::{MakeCritical, Oid, RawControl};

/// The original (draft-weltman) Proxied Authorization control OID.
pub const PROXY_AUTH_V1_OID: &str = "2.16.840.1.113730.3.4.18";
/// The RFC 4370 Proxied Authorization control OID.
pub const PROXY_AUTH_V2_OID: &str = "1.3.6.1.1.12";

macro_rules! proxy_auth_variant {
    ($name:ident, $oid:expr) => {
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name {
            pub authzid: String,
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
            /// `authzid` is an authzId string (RFC 4513 §5.2.1.8), e.g.
            /// `"dn:uid=alice,..."` or `"u:alice"`. Always sent critical: a server that
            /// doesn't recognize it must refuse the operation rather than silently
            /// ignore it.
            pub fn new(authzid: impl Into<String>) -> $name {
                $name { authzid: authzid.into(), crit: true }
            }

            pub fn into_raw(self) -> RawControl {
                RawControl { ctype: Self::OID.to_owned(), crit: self.crit, val: Some(self.authzid.into_bytes()) }
            }

            pub fn parse(val: &[u8]) -> $name {
                $name { authzid: String::from_utf8_lossy(val).into_owned(), crit: true }
            }
        }
    };
}

proxy_auth_variant!(ProxyAuthV1, PROXY_AUTH_V1_OID);
proxy_auth_variant!(ProxyAuthV2, PROXY_AUTH_V2_OID);

/// Back-compat alias: RFC 4370's OID is the one new code should prefer.
pub type ProxyAuth = ProxyAuthV2;
pub const PROXY_AUTH_OID: &str = PROXY_AUTH_V2_OID;

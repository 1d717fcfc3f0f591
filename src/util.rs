//! Small escaping helpers applications need when building DN or filter strings from
//! untrusted input, re-exported at the crate root for convenience.

use std::borrow::Cow;

/// Escape a string for safe inclusion as an RDN attribute value in a DN, per RFC 4514
/// §2.4. See [`crate::dn::escape_value`] for the rules applied.
pub fn dn_escape(s: impl AsRef<str>) -> Cow<'static, str> {
    Cow::Owned(crate::dn::escape_value(s.as_ref()))
}

/// Escape a string for safe inclusion as an assertion value in an RFC 4515 filter.
/// See [`crate::filter::escape`] for the rules applied.
pub fn ldap_escape(s: impl AsRef<str>) -> Cow<'static, str> {
    Cow::Owned(crate::filter::escape(s.as_ref().as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dn_escape_handles_leading_space() {
        assert_eq!(dn_escape(" leading"), "\\ leading");
    }

    #[test]
    fn ldap_escape_handles_parentheses() {
        assert_eq!(ldap_escape("(admin)"), "\\28admin\\29");
    }
}

//! Matching rules (RFC 4517) used by filter evaluation, schema validation, and Modify's
//! attribute-value-exists checks.
//!
//! Each rule is a pair of functions, equality and (where meaningful) ordering, keyed by
//! name so that [`crate::schema::Schema`] can look one up for a given attribute type.

/// A named equality/ordering matching rule over two octet strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchingRule {
    CaseIgnore,
    CaseExact,
    OctetString,
    DistinguishedName,
    GeneralizedTime,
    Integer,
    TelephoneNumber,
    Boolean,
}

impl MatchingRule {
    pub fn by_name(name: &str) -> Option<MatchingRule> {
        match name {
            "caseIgnoreMatch" | "caseIgnoreSubstringsMatch" => Some(MatchingRule::CaseIgnore),
            "caseExactMatch" | "caseExactSubstringsMatch" => Some(MatchingRule::CaseExact),
            "octetStringMatch" => Some(MatchingRule::OctetString),
            "distinguishedNameMatch" => Some(MatchingRule::DistinguishedName),
            "generalizedTimeMatch" | "generalizedTimeOrderingMatch" => Some(MatchingRule::GeneralizedTime),
            "integerMatch" | "integerOrderingMatch" => Some(MatchingRule::Integer),
            "telephoneNumberMatch" => Some(MatchingRule::TelephoneNumber),
            "booleanMatch" => Some(MatchingRule::Boolean),
            _ => None,
        }
    }

    /// Equality comparison between an attribute value and an assertion value, both
    /// given as raw octets (the wire representation used throughout this crate).
    pub fn equal(self, value: &[u8], assertion: &[u8]) -> bool {
        match self {
            MatchingRule::CaseIgnore => fold_case(value) == fold_case(assertion),
            MatchingRule::CaseExact => value == assertion,
            MatchingRule::OctetString => value == assertion,
            MatchingRule::Boolean => fold_case(value) == fold_case(assertion),
            MatchingRule::DistinguishedName => match (
                crate::dn::Dn::parse(&String::from_utf8_lossy(value)),
                crate::dn::Dn::parse(&String::from_utf8_lossy(assertion)),
            ) {
                (Ok(a), Ok(b)) => a.matches(&b),
                _ => value == assertion,
            },
            MatchingRule::GeneralizedTime => {
                match (parse_generalized_time(value), parse_generalized_time(assertion)) {
                    (Some(a), Some(b)) => a == b,
                    None => value == assertion,
                }
            }
            MatchingRule::Integer => {
                match (parse_i64(value), parse_i64(assertion)) {
                    (Some(a), Some(b)) => a == b,
                    _ => value == assertion,
                }
            }
            MatchingRule::TelephoneNumber => normalize_phone(value) == normalize_phone(assertion),
        }
    }

    /// Ordering comparison (`<=`/`>=` filters). Returns `None` if the rule has no
    /// natural ordering (e.g. `caseIgnoreMatch` falls back to lexicographic order on
    /// folded octets, which RFC 4517 does not actually define — callers needing strict
    /// RFC conformance should restrict ordering filters to `integerOrderingMatch` and
    /// `generalizedTimeOrderingMatch` attribute types).
    pub fn compare(self, value: &[u8], assertion: &[u8]) -> Option<std::cmp::Ordering> {
        match self {
            MatchingRule::Integer => {
                let a = parse_i64(value)?;
                let b = parse_i64(assertion)?;
                Some(a.cmp(&b))
            }
            MatchingRule::GeneralizedTime => {
                let a = parse_generalized_time(value)?;
                let b = parse_generalized_time(assertion)?;
                Some(a.cmp(&b))
            }
            _ => Some(fold_case(value).cmp(&fold_case(assertion))),
        }
    }

    /// Substring match: `initial`, each of `any` in order, and `final_` (any may be
    /// empty/omitted) per RFC 4511 §4.5.1.7.2.
    pub fn substrings(self, value: &[u8], initial: Option<&[u8]>, any: &[&[u8]], final_: Option<&[u8]>) -> bool {
        let hay = fold_case(value);
        let mut pos = 0usize;
        if let Some(init) = initial {
            let needle = fold_case(init);
            if !hay[pos..].starts_with(&needle[..]) {
                return false;
            }
            pos += needle.len();
        }
        for part in any {
            let needle = fold_case(part);
            if needle.is_empty() {
                continue;
            }
            match find_subslice(&hay[pos..], &needle) {
                Some(off) => pos += off + needle.len(),
                None => return false,
            }
        }
        if let Some(fin) = final_ {
            let needle = fold_case(fin);
            if !hay[pos..].ends_with(&needle[..]) {
                return false;
            }
        }
        true
    }
}

fn find_subslice(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Fold ASCII case and collapse runs of whitespace to a single space, the
/// `caseIgnoreMatch` transformation (a simplification of RFC 4518 string prep adequate
/// for the attribute syntaxes this crate supports).
fn fold_case(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut last_was_space = false;
    for &b in s {
        let lower = b.to_ascii_lowercase();
        if lower == b' ' {
            if !last_was_space && !out.is_empty() {
                out.push(b' ');
            }
            last_was_space = true;
        } else {
            out.push(lower);
            last_was_space = false;
        }
    }
    while out.last() == Some(&b' ') {
        out.pop();
    }
    out
}

fn parse_i64(v: &[u8]) -> Option<i64> {
    std::str::from_utf8(v).ok()?.trim().parse().ok()
}

fn normalize_phone(v: &[u8]) -> Vec<u8> {
    v.iter().filter(|b| !matches!(b, b' ' | b'-')).copied().collect()
}

/// Parse a `GeneralizedTime` value (RFC 4517 §3.3.13), ignoring fractional seconds and
/// treating all offsets as a minute count east of UTC for comparison purposes.
fn parse_generalized_time(v: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(v).ok()?;
    if s.len() < 10 {
        return None;
    }
    let digits = &s[..10];
    let base: i64 = digits.parse().ok()?;
    let rest = &s[10..];
    let (hm, tz_part) = if let Some(idx) = rest.find(['Z', '+', '-']) {
        (&rest[..idx], &rest[idx..])
    } else {
        (rest, "")
    };
    let mut minutes = base * 24 * 60;
    let hm_digits: String = hm.chars().take_while(|c| c.is_ascii_digit()).collect();
    if hm_digits.len() >= 2 {
        minutes += hm_digits[..2].parse::<i64>().unwrap_or(0) * 60;
    }
    if hm_digits.len() >= 4 {
        minutes += hm_digits[2..4].parse::<i64>().unwrap_or(0);
    }
    if let Some(sign) = tz_part.chars().next() {
        if sign == '+' || sign == '-' {
            let off: i64 = tz_part[1..].chars().take(4).collect::<String>().parse().unwrap_or(0);
            let off_min = (off / 100) * 60 + off % 100;
            minutes += if sign == '+' { -off_min } else { off_min };
        }
    }
    Some(minutes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn case_ignore_folds_whitespace_and_case() {
        let r = MatchingRule::CaseIgnore;
        assert!(r.equal(b"Hello   World", b"hello world"));
    }

    #[test]
    fn integer_match_numeric_not_lexicographic() {
        let r = MatchingRule::Integer;
        assert!(r.equal(b"007", b"7"));
        assert_eq!(r.compare(b"10", b"9"), Some(std::cmp::Ordering::Greater));
    }

    #[test]
    fn telephone_number_ignores_space_and_hyphen() {
        let r = MatchingRule::TelephoneNumber;
        assert!(r.equal(b"+1 555-0100", b"+15550100"));
    }

    #[test]
    fn substrings_initial_any_final() {
        let r = MatchingRule::CaseIgnore;
        assert!(r.substrings(b"Hello Big World", Some(b"hello"), &[b"big"], Some(b"world")));
        assert!(!r.substrings(b"Hello Big World", Some(b"hello"), &[b"nope"], Some(b"world")));
    }

    #[test]
    fn generalized_time_match_ignores_offset_rendering() {
        let r = MatchingRule::GeneralizedTime;
        assert!(r.equal(b"20230101120000Z", b"20230101120000Z"));
        assert!(r.equal(b"20230101130000+0100", b"20230101120000Z"));
    }

    #[test]
    fn distinguished_name_match_ignores_attr_case() {
        let r = MatchingRule::DistinguishedName;
        assert!(r.equal(b"CN=Alice,DC=example,DC=com", b"cn=Alice,dc=example,dc=com"));
    }
}

//! Search filter parsing (RFC 4515) and evaluation (C2).
//!
//! [`Filter`] is the in-memory AST; [`Filter::parse`] builds one from an RFC 4515
//! string, and [`Filter::matches`] evaluates it against an [`Entry`] using three-valued
//! logic (`TRUE`/`FALSE`/`Undefined`), per RFC 4511 §4.5.1.7.

use std::borrow::Cow;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::{map, opt, recognize, value};
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{delimited, preceded, separated_pair, tuple};
use nom::IResult;

use crate::entry::Entry;
use crate::matching::MatchingRule;
use crate::result::{LdapError, Result};
use crate::schema::Schema;

/// Tag numbers for each `Filter` CHOICE, as assigned by RFC 4511 §4.5.1.
pub const AND_FILT: u64 = 0;
pub const OR_FILT: u64 = 1;
pub const NOT_FILT: u64 = 2;
pub const EQ_MATCH: u64 = 3;
pub const SUBSTR_MATCH: u64 = 4;
pub const GTE_MATCH: u64 = 5;
pub const LTE_MATCH: u64 = 6;
pub const PRES_MATCH: u64 = 7;
pub const APPROX_MATCH: u64 = 8;
pub const EXT_MATCH: u64 = 9;

/// Tag numbers within a `SubstringFilter`'s `substrings` SEQUENCE OF CHOICE.
pub const SUB_INITIAL: u64 = 0;
pub const SUB_ANY: u64 = 1;
pub const SUB_FINAL: u64 = 2;

/// One substring-filter component, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubstringComponent {
    Initial(Vec<u8>),
    Any(Vec<u8>),
    Final(Vec<u8>),
}

/// An `extensibleMatch` assertion (RFC 4511 §4.5.1.7.7).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MatchingRuleAssertion {
    pub rule: Option<String>,
    pub attr: Option<String>,
    pub value: Vec<u8>,
    pub dn_attributes: bool,
}

/// A parsed search filter, structurally identical to RFC 4511's `Filter` CHOICE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    EqualityMatch(String, Vec<u8>),
    Substrings(String, Vec<SubstringComponent>),
    GreaterOrEqual(String, Vec<u8>),
    LessOrEqual(String, Vec<u8>),
    Present(String),
    ApproxMatch(String, Vec<u8>),
    ExtensibleMatch(MatchingRuleAssertion),
}

/// Three-valued logic result of evaluating a filter against an entry (RFC 4511 §4.5.1.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterResult {
    True,
    False,
    Undefined,
}

impl FilterResult {
    fn not(self) -> FilterResult {
        match self {
            FilterResult::True => FilterResult::False,
            FilterResult::False => FilterResult::True,
            FilterResult::Undefined => FilterResult::Undefined,
        }
    }

    fn from_bool(b: bool) -> FilterResult {
        if b {
            FilterResult::True
        } else {
            FilterResult::False
        }
    }
}

impl Filter {
    pub fn parse(s: &str) -> Result<Filter> {
        match filtexpr(s) {
            Ok(("", f)) => Ok(f),
            Ok((rest, _)) => Err(LdapError::InvalidFilter(format!("trailing input: {:?}", rest))),
            Err(e) => Err(LdapError::InvalidFilter(format!("{:?}", e))),
        }
    }

    /// Evaluate this filter against `entry` per RFC 4511 §4.5.1.7's inductive rules,
    /// using `schema` to resolve each attribute's equality matching rule.
    pub fn matches(&self, entry: &Entry, schema: &Schema) -> FilterResult {
        match self {
            Filter::And(fs) => and_semantics(fs.iter().map(|f| f.matches(entry, schema))),
            Filter::Or(fs) => or_semantics(fs.iter().map(|f| f.matches(entry, schema))),
            Filter::Not(f) => f.matches(entry, schema).not(),
            Filter::Present(attr) => FilterResult::from_bool(entry.has_attribute(attr)),
            Filter::EqualityMatch(attr, val) => match entry.get(attr) {
                Some(values) => FilterResult::from_bool(values.contains(schema.equality_rule(attr), val)),
                None => FilterResult::Undefined,
            },
            Filter::ApproxMatch(attr, val) => match entry.get(attr) {
                // No approximate-matching (soundex-like) rule is implemented; fall back
                // to equality, which is a conformant (if imprecise) approximation.
                Some(values) => FilterResult::from_bool(values.contains(schema.equality_rule(attr), val)),
                None => FilterResult::Undefined,
            },
            Filter::GreaterOrEqual(attr, val) => compare_filter(entry, schema, attr, val, |o| {
                o != std::cmp::Ordering::Less
            }),
            Filter::LessOrEqual(attr, val) => compare_filter(entry, schema, attr, val, |o| {
                o != std::cmp::Ordering::Greater
            }),
            Filter::Substrings(attr, comps) => match entry.get(attr) {
                Some(values) => {
                    let rule = schema.equality_rule(attr);
                    let mut initial = None;
                    let mut any = Vec::new();
                    let mut final_ = None;
                    for c in comps {
                        match c {
                            SubstringComponent::Initial(v) => initial = Some(v.as_slice()),
                            SubstringComponent::Any(v) => any.push(v.as_slice()),
                            SubstringComponent::Final(v) => final_ = Some(v.as_slice()),
                        }
                    }
                    FilterResult::from_bool(
                        values.0.iter().any(|v| rule.substrings(v, initial, &any, final_)),
                    )
                }
                None => FilterResult::Undefined,
            },
            Filter::ExtensibleMatch(mra) => extensible_match(entry, schema, mra),
        }
    }
}

fn compare_filter(
    entry: &Entry,
    schema: &Schema,
    attr: &str,
    val: &[u8],
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> FilterResult {
    match entry.get(attr) {
        Some(values) => {
            let rule = schema.equality_rule(attr);
            FilterResult::from_bool(values.0.iter().any(|v| {
                rule.compare(v, val).map(&accept).unwrap_or(false)
            }))
        }
        None => FilterResult::Undefined,
    }
}

fn extensible_match(entry: &Entry, schema: &Schema, mra: &MatchingRuleAssertion) -> FilterResult {
    let rule = mra
        .rule
        .as_deref()
        .and_then(MatchingRule::by_name)
        .or_else(|| mra.attr.as_deref().map(|a| schema.equality_rule(a)))
        .unwrap_or(MatchingRule::CaseIgnore);
    let matched = match &mra.attr {
        Some(attr) => entry.get(attr).map(|values| values.contains(rule, &mra.value)),
        None => Some(entry.attributes().any(|(_, values)| values.contains(rule, &mra.value))),
    };
    match matched {
        Some(b) => FilterResult::from_bool(b),
        None => FilterResult::Undefined,
    }
}

/// AND: `TRUE` iff all operands `TRUE`; `FALSE` if any operand `FALSE`; else `Undefined`.
/// The empty AND (`(&)`) is `TRUE` (an absolute filter per RFC 4526).
fn and_semantics(results: impl Iterator<Item = FilterResult>) -> FilterResult {
    let mut any_undefined = false;
    for r in results {
        match r {
            FilterResult::False => return FilterResult::False,
            FilterResult::Undefined => any_undefined = true,
            FilterResult::True => {}
        }
    }
    if any_undefined {
        FilterResult::Undefined
    } else {
        FilterResult::True
    }
}

/// OR: `TRUE` if any operand `TRUE`; `FALSE` iff all operands `FALSE`; else `Undefined`.
/// The empty OR (`(|)`) is `FALSE`.
fn or_semantics(results: impl Iterator<Item = FilterResult>) -> FilterResult {
    let mut any_undefined = false;
    for r in results {
        match r {
            FilterResult::True => return FilterResult::True,
            FilterResult::Undefined => any_undefined = true,
            FilterResult::False => {}
        }
    }
    if any_undefined {
        FilterResult::Undefined
    } else {
        FilterResult::False
    }
}

// --- RFC 4515 grammar, nom7 ---

fn is_alnum_hyphen(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn descr(i: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            nom::character::complete::satisfy(|c| c.is_ascii_alphabetic()),
            take_while(is_alnum_hyphen),
        ))),
        |s: &str| s.to_string(),
    )(i)
}

fn numericoid(i: &str) -> IResult<&str, String> {
    map(
        recognize(separated_list1(char('.'), take_while1(|c: char| c.is_ascii_digit()))),
        |s: &str| s.to_string(),
    )(i)
}

fn option(i: &str) -> IResult<&str, &str> {
    recognize(many1(nom::character::complete::satisfy(is_alnum_hyphen)))(i)
}

fn attributedescription(i: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((alt((descr, numericoid)), many0(preceded(char(';'), option))))),
        |s: &str| s.to_string(),
    )(i)
}

fn is_value_char(c: char) -> bool {
    !matches!(c, '(' | ')' | '*' | '\\' | '\0')
}

fn unescape(raw: &str) -> Vec<u8> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            if let Ok(h) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(h);
                i += 3;
                continue;
            }
        }
        // copy one UTF-8 char's worth of bytes
        let ch_len = raw[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.extend_from_slice(&bytes[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn raw_value(i: &str) -> IResult<&str, &str> {
    recognize(many0(alt((
        recognize(tuple((char('\\'), nom::character::complete::satisfy(|c: char| c.is_ascii_hexdigit()), nom::character::complete::satisfy(|c: char| c.is_ascii_hexdigit())))),
        take_while1(is_value_char),
    ))))(i)
}

fn value(i: &str) -> IResult<&str, Vec<u8>> {
    map(raw_value, unescape)(i)
}

fn eq(i: &str) -> IResult<&str, (String, Vec<u8>)> {
    separated_pair(attributedescription, char('='), value)(i)
}

fn substring_value(i: &str) -> IResult<&str, Vec<Vec<u8>>> {
    separated_list1(char('*'), map(raw_value, unescape))(i)
}

fn substr_or_eq(i: &str) -> IResult<&str, Filter> {
    let (i, (attr, _)) = tuple((attributedescription, char('=')))(i)?;
    let (i, parts) = substring_value(i)?;
    if parts.len() == 1 {
        return Ok((i, Filter::EqualityMatch(attr, parts.into_iter().next().unwrap())));
    }
    let last = parts.len() - 1;
    let mut comps = Vec::new();
    for (idx, part) in parts.into_iter().enumerate() {
        if idx == 0 {
            if !part.is_empty() {
                comps.push(SubstringComponent::Initial(part));
            }
        } else if idx == last {
            if !part.is_empty() {
                comps.push(SubstringComponent::Final(part));
            }
        } else if !part.is_empty() {
            comps.push(SubstringComponent::Any(part));
        }
    }
    Ok((i, Filter::Substrings(attr, comps)))
}

fn present(i: &str) -> IResult<&str, Filter> {
    map(separated_pair(attributedescription, tag("="), char('*')), |(attr, _)| Filter::Present(attr))(i)
}

fn non_eq_op(i: &str) -> IResult<&str, (String, &str, Vec<u8>)> {
    let (i, attr) = attributedescription(i)?;
    let (i, op) = alt((tag(">="), tag("<="), tag("~=")))(i)?;
    let (i, v) = value(i)?;
    Ok((i, (attr, op, v)))
}

fn non_eq(i: &str) -> IResult<&str, Filter> {
    map(non_eq_op, |(attr, op, v)| match op {
        ">=" => Filter::GreaterOrEqual(attr, v),
        "<=" => Filter::LessOrEqual(attr, v),
        _ => Filter::ApproxMatch(attr, v),
    })(i)
}

fn extensible(i: &str) -> IResult<&str, Filter> {
    let (i, attr) = opt(attributedescription)(i)?;
    let (i, dn_attrs) = map(opt(tag(":dn")), |o| o.is_some())(i)?;
    let (i, rule) = opt(preceded(char(':'), alt((descr, numericoid))))(i)?;
    let (i, _) = tag(":=")(i)?;
    let (i, v) = value(i)?;
    Ok((
        i,
        Filter::ExtensibleMatch(MatchingRuleAssertion {
            rule,
            attr,
            value: v,
            dn_attributes: dn_attrs,
        }),
    ))
}

fn item(i: &str) -> IResult<&str, Filter> {
    alt((present, non_eq, extensible, substr_or_eq))(i)
}

fn filtercomp(i: &str) -> IResult<&str, Filter> {
    alt((
        map(preceded(char('&'), filterlist), Filter::And),
        map(preceded(char('|'), filterlist), Filter::Or),
        map(preceded(char('!'), filter), |f| Filter::Not(Box::new(f))),
        item,
    ))(i)
}

fn filterlist(i: &str) -> IResult<&str, Vec<Filter>> {
    many1(filter)(i)
}

fn filter(i: &str) -> IResult<&str, Filter> {
    delimited(char('('), filtercomp, char(')'))(i)
}

fn filtexpr(i: &str) -> IResult<&str, Filter> {
    filter(i)
}

/// Escape an assertion value for inclusion in an RFC 4515 filter string: `*`, `(`, `)`,
/// `\`, and NUL become `\XX` hex escapes.
pub fn escape(s: impl AsRef<[u8]>) -> String {
    let bytes = s.as_ref();
    let needs = bytes.iter().any(|b| matches!(b, b'*' | b'(' | b')' | b'\\' | 0));
    if !needs {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'*' | b'(' | b')' | b'\\' | 0 => out.push_str(&format!("\\{:02x}", b)),
            _ => out.push(b as char),
        }
    }
    out
}

/// Cow-friendly variant mirroring [`escape`], for callers that want to avoid an
/// allocation on the common case of a value needing no escaping.
pub fn escape_cow(s: &str) -> Cow<'_, str> {
    if s.bytes().any(|b| matches!(b, b'*' | b'(' | b')' | b'\\' | 0)) {
        Cow::Owned(escape(s))
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dn::Dn;
    use crate::entry::Entry;
    use crate::matching::MatchingRule;

    fn alice() -> Entry {
        let mut e = Entry::new(Dn::parse("cn=Alice,dc=example,dc=com").unwrap());
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.add_values("sn", vec![b"Smith".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e
    }

    #[test]
    fn parses_equality() {
        let f = Filter::parse("(cn=Alice)").unwrap();
        assert_eq!(f, Filter::EqualityMatch("cn".to_owned(), b"Alice".to_vec()));
    }

    #[test]
    fn parses_and_or_not() {
        let f = Filter::parse("(&(cn=Alice)(|(sn=Smith)(!(sn=Jones))))").unwrap();
        match f {
            Filter::And(v) => assert_eq!(v.len(), 2),
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn parses_substrings() {
        let f = Filter::parse("(cn=Al*ce)").unwrap();
        match f {
            Filter::Substrings(attr, comps) => {
                assert_eq!(attr, "cn");
                assert_eq!(comps, vec![SubstringComponent::Initial(b"Al".to_vec()), SubstringComponent::Final(b"ce".to_vec())]);
            }
            _ => panic!("expected Substrings"),
        }
    }

    #[test]
    fn parses_hex_escape_in_value() {
        let f = Filter::parse(r"(cn=Lu\c4\8di\c4\87)").unwrap();
        assert_eq!(f, Filter::EqualityMatch("cn".to_owned(), "Lučić".as_bytes().to_vec()));
    }

    #[test]
    fn parses_extensible_match() {
        let f = Filter::parse("(cn:caseExactMatch:=Alice)").unwrap();
        match f {
            Filter::ExtensibleMatch(mra) => {
                assert_eq!(mra.attr.as_deref(), Some("cn"));
                assert_eq!(mra.rule.as_deref(), Some("caseExactMatch"));
            }
            _ => panic!("expected ExtensibleMatch"),
        }
    }

    #[test]
    fn matches_entry_true() {
        let schema = Schema::default_schema();
        let f = Filter::parse("(&(cn=Alice)(sn=Smith))").unwrap();
        assert_eq!(f.matches(&alice(), &schema), FilterResult::True);
    }

    #[test]
    fn undefined_on_missing_attribute() {
        let schema = Schema::default_schema();
        let f = Filter::parse("(givenName=Alice)").unwrap();
        assert_eq!(f.matches(&alice(), &schema), FilterResult::Undefined);
    }

    #[test]
    fn and_short_circuits_on_false_even_with_undefined() {
        let schema = Schema::default_schema();
        let f = Filter::parse("(&(sn=Jones)(givenName=Alice))").unwrap();
        assert_eq!(f.matches(&alice(), &schema), FilterResult::False);
    }

    #[test]
    fn or_is_undefined_without_any_true() {
        let schema = Schema::default_schema();
        let f = Filter::parse("(|(sn=Jones)(givenName=Alice))").unwrap();
        assert_eq!(f.matches(&alice(), &schema), FilterResult::Undefined);
    }

    #[test]
    fn empty_and_is_absolute_true() {
        let schema = Schema::default_schema();
        let f = Filter::And(Vec::new());
        assert_eq!(f.matches(&alice(), &schema), FilterResult::True);
    }

    #[test]
    fn escape_round_trips_special_chars() {
        let escaped = escape("a*b(c)d\\e");
        let f = Filter::parse(&format!("(cn={})", escaped)).unwrap();
        assert_eq!(f, Filter::EqualityMatch("cn".to_owned(), b"a*b(c)d\\e".to_vec()));
    }
}

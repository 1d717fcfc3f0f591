//! Distinguished Name parsing and canonicalization (RFC 4514).
//!
//! A [`Dn`] is a sequence of [`Rdn`]s, most significant first, matching the wire and
//! string order (`"uid=alice,ou=people,dc=example,dc=com"` — `uid=alice` is the leaf).

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, take_while1};
use nom::character::complete::{char, none_of, one_of};
use nom::combinator::{map, opt, recognize, value};
use nom::multi::{many0, separated_list1};
use nom::sequence::{preceded, separated_pair, tuple};
use nom::IResult;

use crate::result::{LdapError, Result};

/// A single `attribute=value` pair within an RDN. Multi-valued RDNs (`a=1+b=2`) are
/// represented as a `Vec<Ava>` in [`Rdn`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ava {
    pub attr: String,
    pub value: String,
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// A Relative Distinguished Name: one or more [`Ava`]s joined by `+`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rdn(pub Vec<Ava>);

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", parts.join("+"))
    }
}

impl Rdn {
    /// Case-insensitive (attribute name) and ordinal-insensitive (AVA order within the
    /// RDN) comparison, per RFC 4517 distinguishedNameMatch.
    fn matches(&self, other: &Rdn) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        let norm = |r: &Rdn| -> Vec<(String, String)> {
            let mut v: Vec<(String, String)> = r
                .0
                .iter()
                .map(|a| (a.attr.to_ascii_lowercase(), a.value.clone()))
                .collect();
            v.sort();
            v
        };
        norm(self) == norm(other)
    }
}

/// A parsed Distinguished Name: an ordered list of RDNs, leaf (most specific) first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Dn(pub Vec<Rdn>);

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl Dn {
    /// Parse a DN string per RFC 4514.
    pub fn parse(s: &str) -> Result<Dn> {
        if s.is_empty() {
            return Ok(Dn(Vec::new()));
        }
        match dn(s) {
            Ok(("", dn)) => Ok(dn),
            Ok((rest, _)) => Err(LdapError::InvalidDn(format!("trailing input: {:?}", rest))),
            Err(e) => Err(LdapError::InvalidDn(format!("{:?}", e))),
        }
    }

    /// The canonical string form: lower-cased attribute names, each AVA re-escaped,
    /// components in wire order. Two DNs that are `distinguishedNameMatch`-equal produce
    /// the same canonical form only once RDN-internal AVA ordering is also normalized by
    /// the caller; this method canonicalizes representation, not semantic equality (use
    /// [`Dn::matches`] for that).
    pub fn canonical(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|r| {
                let avas: Vec<String> = r
                    .0
                    .iter()
                    .map(|a| format!("{}={}", a.attr.to_ascii_lowercase(), escape_value(&a.value)))
                    .collect();
                avas.join("+")
            })
            .collect();
        parts.join(",")
    }

    /// RFC 4517 `distinguishedNameMatch`: equal regardless of attribute-name case, AVA
    /// order within an RDN, or insignificant whitespace already stripped by the parser.
    pub fn matches(&self, other: &Dn) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.matches(b))
    }

    /// True if `self` is `other`, or a descendant of it (i.e. `other` is a proper or
    /// improper suffix of `self`'s RDN sequence).
    pub fn is_descendant_of(&self, other: &Dn) -> bool {
        if other.0.len() > self.0.len() {
            return false;
        }
        let offset = self.0.len() - other.0.len();
        self.0[offset..]
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.matches(b))
    }

    /// The DN of the immediate superior entry, or `None` for the root DSE / a single-RDN DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Dn(self.0[1..].to_vec()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// This DN's own (leaf) RDN, or `None` for the root DSE.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.0.first()
    }
}

fn is_leadchar(c: char) -> bool {
    !matches!(c, ' ' | '#' | ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' | '\0')
}

fn is_stringchar(c: char) -> bool {
    !matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' | '\0')
}

fn string_value(i: &str) -> IResult<&str, String> {
    map(
        many0(alt((
            map(
                escaped_transform(
                    take_while1(is_stringchar),
                    '\\',
                    alt((
                        value("\\".to_string(), char('\\')),
                        value(",".to_string(), char(',')),
                        value("+".to_string(), char('+')),
                        value("\"".to_string(), char('"')),
                        value("<".to_string(), char('<')),
                        value(">".to_string(), char('>')),
                        value(";".to_string(), char(';')),
                        value("=".to_string(), char('=')),
                        map(recognize(tuple((one_of("0123456789abcdefABCDEF"), one_of("0123456789abcdefABCDEF")))), |h: &str| {
                            let byte = u8::from_str_radix(h, 16).unwrap_or(b'?');
                            (byte as char).to_string()
                        }),
                    )),
                ),
                |s: String| s,
            ),
            map(none_of(","), |c: char| c.to_string()),
        ))),
        |v| v.concat(),
    )
}

fn attr_type_name(i: &str) -> IResult<&str, String> {
    map(
        recognize(tuple((
            nom::character::complete::satisfy(|c| c.is_ascii_alphabetic()),
            nom::multi::many0(nom::character::complete::satisfy(|c| c.is_ascii_alphanumeric() || c == '-')),
        ))),
        |s: &str| s.to_string(),
    )(i)
}

fn attr_type_oid(i: &str) -> IResult<&str, String> {
    map(
        recognize(separated_list1(char('.'), take_while1(|c: char| c.is_ascii_digit()))),
        |s: &str| s.to_string(),
    )(i)
}

fn attr_type(i: &str) -> IResult<&str, String> {
    alt((attr_type_name, attr_type_oid))(i)
}

fn hexpair(i: &str) -> IResult<&str, char> {
    map(
        recognize(tuple((one_of("0123456789abcdefABCDEF"), one_of("0123456789abcdefABCDEF")))),
        |h: &str| (u8::from_str_radix(h, 16).unwrap_or(b'?')) as char,
    )(i)
}

fn hexstring_value(i: &str) -> IResult<&str, String> {
    preceded(char('#'), map(many0(hexpair), |v| v.into_iter().collect()))(i)
}

fn quoted_value(i: &str) -> IResult<&str, String> {
    let (i, _) = char('"')(i)?;
    let (i, s) = recognize(many0(none_of("\"")))(i)?;
    let (i, _) = char('"')(i)?;
    Ok((i, s.to_string()))
}

fn ava(i: &str) -> IResult<&str, Ava> {
    map(
        separated_pair(attr_type, char('='), alt((hexstring_value, quoted_value, string_value))),
        |(attr, value)| Ava { attr, value },
    )(i)
}

fn rdn(i: &str) -> IResult<&str, Rdn> {
    map(separated_list1(char('+'), ava), Rdn)(i)
}

fn dn(i: &str) -> IResult<&str, Dn> {
    map(separated_list1(char(','), preceded(opt(char(' ')), rdn)), Dn)(i)
}

/// Escape a single attribute value for use in a DN string, per RFC 4514 §2.4.
pub fn escape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    for (idx, &c) in chars.iter().enumerate() {
        let leading_space = idx == 0 && c == ' ';
        let leading_hash = idx == 0 && c == '#';
        let trailing_space = idx == chars.len() - 1 && c == ' ';
        if leading_space || leading_hash || trailing_space {
            out.push('\\');
            out.push(c);
        } else if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
            out.push(c);
        } else if c == '\0' {
            out.push_str("\\00");
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_dn() {
        let dn = Dn::parse("uid=alice,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(dn.0.len(), 4);
        assert_eq!(dn.0[0].0[0].attr, "uid");
        assert_eq!(dn.0[0].0[0].value, "alice");
    }

    #[test]
    fn parses_multivalued_rdn() {
        let dn = Dn::parse("cn=alice+uid=a1,dc=example,dc=com").unwrap();
        assert_eq!(dn.0[0].0.len(), 2);
    }

    #[test]
    fn parses_escaped_comma() {
        let dn = Dn::parse("cn=Smith\\, J.,dc=example,dc=com").unwrap();
        assert_eq!(dn.0[0].0[0].value, "Smith, J.");
    }

    #[test]
    fn parses_hex_escape() {
        let dn = Dn::parse("cn=Lu\\c4\\8di\\c4\\87,dc=example,dc=com").unwrap();
        assert_eq!(dn.0[0].0[0].value, "Lučić");
    }

    #[test]
    fn empty_dn_is_root_dse() {
        let dn = Dn::parse("").unwrap();
        assert!(dn.is_empty());
    }

    #[test]
    fn case_insensitive_attr_match() {
        let a = Dn::parse("CN=Alice,DC=example,DC=com").unwrap();
        let b = Dn::parse("cn=Alice,dc=example,dc=com").unwrap();
        assert!(a.matches(&b));
    }

    #[test]
    fn descendant_relationship() {
        let child = Dn::parse("uid=alice,ou=people,dc=example,dc=com").unwrap();
        let base = Dn::parse("dc=example,dc=com").unwrap();
        assert!(child.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&child));
        assert!(base.is_descendant_of(&base));
    }

    #[test]
    fn parent_of_single_rdn_is_none() {
        let dn = Dn::parse("dc=com").unwrap();
        assert!(dn.parent().is_none());
    }

    #[test]
    fn canonical_form_lowercases_attribute_names() {
        let dn = Dn::parse("CN=Alice,DC=Example,DC=Com").unwrap();
        assert_eq!(dn.canonical(), "cn=Alice,dc=Example,dc=Com");
    }

    #[test]
    fn roundtrips_through_display() {
        let dn = Dn::parse("uid=alice,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(dn.to_string(), "uid=alice,ou=people,dc=example,dc=com");
    }
}

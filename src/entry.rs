//! The attribute/entry data model (C3): an [`Entry`] is a DN plus an ordered map of
//! attribute name to an insertion-ordered set of octet-string values.

use std::collections::BTreeMap;

use crate::dn::Dn;
use crate::matching::MatchingRule;
use crate::result::{LdapError, Result, ResultCode};
use crate::schema::Schema;

/// One attribute's values, preserving insertion order (so LDIF round-trips and search
/// responses are deterministic) while still supporting value-exists/-absent checks
/// under the attribute's equality matching rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeValues(pub Vec<Vec<u8>>);

impl AttributeValues {
    pub fn contains(&self, rule: MatchingRule, value: &[u8]) -> bool {
        self.0.iter().any(|v| rule.equal(v, value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn op_error(code: ResultCode, text: impl Into<String>) -> LdapError {
    LdapError::Operation(code, text.into())
}

/// A directory entry: its DN plus attributes, keyed case-insensitively on attribute
/// name (the stored key preserves the case first seen, per RFC 4512 §2.5.1).
#[derive(Clone, Debug, Default)]
pub struct Entry {
    pub dn: Dn,
    attrs: BTreeMap<String, (String, AttributeValues)>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Entry {
    pub fn new(dn: Dn) -> Entry {
        Entry { dn, attrs: BTreeMap::new() }
    }

    /// Iterate attributes in the original-case form they were inserted with.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValues)> {
        self.attrs.values().map(|(name, values)| (name.as_str(), values))
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValues> {
        self.attrs.get(&fold(name)).map(|(_, v)| v)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attrs.contains_key(&fold(name))
    }

    /// True if `name` is one of the attributes that make up this entry's own RDN; such
    /// attributes may not be stripped down to zero values by a Modify (RFC 4511 §4.6,
    /// `notAllowedOnRDN`) short of a ModifyDN.
    pub fn is_rdn_attribute(&self, name: &str) -> bool {
        self.dn.rdn().map(|rdn| rdn.0.iter().any(|ava| fold(&ava.attr) == fold(name))).unwrap_or(false)
    }

    /// Add values to an attribute, creating it if absent. Returns an error if any value
    /// being added already exists under the attribute's equality rule (RFC 4511
    /// §4.6, `attributeOrValueExists`).
    pub fn add_values(&mut self, name: &str, values: Vec<Vec<u8>>, rule: MatchingRule) -> Result<()> {
        let key = fold(name);
        let entry = self.attrs.entry(key).or_insert_with(|| (name.to_owned(), AttributeValues::default()));
        for v in &values {
            if entry.1.contains(rule, v) {
                return Err(op_error(
                    ResultCode::AttributeOrValueExists,
                    format!("attribute {} already has the given value", name),
                ));
            }
        }
        entry.1 .0.extend(values);
        Ok(())
    }

    /// Merge values into an attribute, silently skipping any that already exist, rather
    /// than erroring as [`Self::add_values`] does. Used by change-record replay and
    /// other bulk-load paths where duplicates are expected and harmless.
    pub fn merge_values(&mut self, name: &str, values: Vec<Vec<u8>>, rule: MatchingRule) {
        let key = fold(name);
        let entry = self.attrs.entry(key).or_insert_with(|| (name.to_owned(), AttributeValues::default()));
        for v in values {
            if !entry.1.contains(rule, &v) {
                entry.1 .0.push(v);
            }
        }
    }

    /// Delete specific values (or, if `values` is empty, the whole attribute). Returns
    /// an error if a requested value is not present, unless `lenient` is set (RFC 4511
    /// §4.6's permissive-modify relaxation), in which case a missing value is a no-op.
    pub fn delete_values(&mut self, name: &str, values: Vec<Vec<u8>>, rule: MatchingRule, lenient: bool) -> Result<()> {
        let key = fold(name);
        if values.is_empty() {
            if self.attrs.remove(&key).is_none() && !lenient {
                return Err(op_error(ResultCode::NoSuchAttribute, format!("no such attribute: {}", name)));
            }
            return Ok(());
        }
        let entry = match self.attrs.get_mut(&key) {
            Some(e) => e,
            None if lenient => return Ok(()),
            None => return Err(op_error(ResultCode::NoSuchAttribute, format!("no such attribute: {}", name))),
        };
        for v in &values {
            if !entry.1.contains(rule, v) && !lenient {
                return Err(op_error(
                    ResultCode::NoSuchAttribute,
                    format!("value not present on attribute {}", name),
                ));
            }
        }
        entry.1 .0.retain(|existing| !values.iter().any(|v| rule.equal(existing, v)));
        if entry.1.is_empty() {
            self.attrs.remove(&key);
        }
        Ok(())
    }

    /// Replace an attribute's values wholesale (empty `values` removes the attribute).
    pub fn replace_values(&mut self, name: &str, values: Vec<Vec<u8>>) {
        let key = fold(name);
        if values.is_empty() {
            self.attrs.remove(&key);
        } else {
            self.attrs.insert(key, (name.to_owned(), AttributeValues(values)));
        }
    }

    /// Increment a single-valued integer attribute by `delta` (RFC 4525): the attribute
    /// must already carry exactly one value that parses as an `INTEGER`.
    pub fn increment_value(&mut self, name: &str, delta: i64) -> Result<()> {
        let key = fold(name);
        let entry = self
            .attrs
            .get_mut(&key)
            .ok_or_else(|| op_error(ResultCode::NoSuchAttribute, format!("no such attribute: {}", name)))?;
        if entry.1.len() != 1 {
            return Err(op_error(
                ResultCode::ConstraintViolation,
                format!("increment requires a single-valued attribute: {}", name),
            ));
        }
        let current: i64 = std::str::from_utf8(&entry.1 .0[0])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| op_error(ResultCode::ConstraintViolation, format!("{} is not an integer", name)))?;
        entry.1 .0[0] = (current + delta).to_string().into_bytes();
        Ok(())
    }

    /// Apply an ordered list of [`Modification`]s transactionally: all-or-nothing. RDN
    /// attributes may not be deleted or replaced down to zero values (`notAllowedOnRDN`)
    /// unless `lenient` is set, which also relaxes Delete's "value must be present" and
    /// "attribute must exist" checks (the Permissive Modify control, RFC
    /// draft-zeilenga-ldap-allop).
    pub fn apply_modifications(&mut self, mods: &[Modification], schema: &Schema, lenient: bool) -> Result<()> {
        let mut trial = self.clone();
        for m in mods {
            let rule = schema.equality_rule(&m.attr);
            match &m.op {
                ModOp::Add => trial.add_values(&m.attr, m.values.clone(), rule)?,
                ModOp::Delete => {
                    if trial.is_rdn_attribute(&m.attr) {
                        let would_remove_all = m.values.is_empty()
                            || trial
                                .get(&m.attr)
                                .map(|existing| existing.len() <= m.values.len())
                                .unwrap_or(true);
                        if would_remove_all {
                            return Err(op_error(
                                ResultCode::NotAllowedOnRdn,
                                format!("cannot remove RDN attribute {}", m.attr),
                            ));
                        }
                    }
                    trial.delete_values(&m.attr, m.values.clone(), rule, lenient)?
                }
                ModOp::Replace => {
                    if trial.is_rdn_attribute(&m.attr) && m.values.is_empty() {
                        return Err(op_error(
                            ResultCode::NotAllowedOnRdn,
                            format!("cannot remove RDN attribute {}", m.attr),
                        ));
                    }
                    trial.replace_values(&m.attr, m.values.clone())
                }
                ModOp::Increment => {
                    let delta: i64 = m
                        .values
                        .first()
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| op_error(ResultCode::ConstraintViolation, "increment requires an integer delta"))?;
                    trial.increment_value(&m.attr, delta)?
                }
            }
        }
        *self = trial;
        Ok(())
    }

    /// Compute the Modify list that transforms `from` into `to`: adds for attributes or
    /// values present only in `to`, deletes for those present only in `from`, skipping
    /// the RDN attributes when `ignore_rdn` is set (so a caller diffing an entry against
    /// an LDIF template doesn't generate a rename). If `reversible` is set, the returned
    /// list always uses explicit value lists (never a bare "delete whole attribute"), so
    /// applying it to `to` and then its computed inverse to `from` round-trips exactly.
    pub fn diff(from: &Entry, to: &Entry, ignore_rdn: bool, reversible: bool) -> Vec<Modification> {
        let mut mods = Vec::new();
        let from_attrs: BTreeMap<&str, &AttributeValues> = from.attrs.values().map(|(n, v)| (n.as_str(), v)).collect();
        let to_attrs: BTreeMap<&str, &AttributeValues> = to.attrs.values().map(|(n, v)| (n.as_str(), v)).collect();
        for (&name, &to_values) in &to_attrs {
            if ignore_rdn && to.is_rdn_attribute(name) {
                continue;
            }
            match from_attrs.get(name) {
                Some(&from_values) if from_values == to_values => {}
                Some(from_values) => {
                    let added: Vec<Vec<u8>> = to_values.0.iter().filter(|v| !from_values.0.contains(v)).cloned().collect();
                    let removed: Vec<Vec<u8>> = from_values.0.iter().filter(|v| !to_values.0.contains(v)).cloned().collect();
                    if !removed.is_empty() {
                        mods.push(Modification { op: ModOp::Delete, attr: name.to_owned(), values: removed });
                    }
                    if !added.is_empty() {
                        mods.push(Modification { op: ModOp::Add, attr: name.to_owned(), values: added });
                    }
                }
                None => mods.push(Modification { op: ModOp::Add, attr: name.to_owned(), values: to_values.0.clone() }),
            }
        }
        for (&name, &from_values) in &from_attrs {
            if ignore_rdn && from.is_rdn_attribute(name) {
                continue;
            }
            if !to_attrs.contains_key(name) {
                let values = if reversible { from_values.0.clone() } else { Vec::new() };
                mods.push(Modification { op: ModOp::Delete, attr: name.to_owned(), values });
            }
        }
        mods
    }
}

/// One Modify operation change (RFC 4511 §4.6, extended with `Increment` per RFC 4525).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attr: String,
    pub values: Vec<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add = 0,
    Delete = 1,
    Replace = 2,
    Increment = 3,
}

impl ModOp {
    pub fn from_i64(v: i64) -> Option<ModOp> {
        match v {
            0 => Some(ModOp::Add),
            1 => Some(ModOp::Delete),
            2 => Some(ModOp::Replace),
            3 => Some(ModOp::Increment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Entry {
        Entry::new(Dn::parse("uid=alice,dc=example,dc=com").unwrap())
    }

    #[test]
    fn add_then_get_preserves_case_of_first_insert() {
        let mut e = entry();
        e.add_values("CN", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert_eq!(e.attributes().next().unwrap().0, "CN");
        assert_eq!(e.get("cn").unwrap().0, vec![b"Alice".to_vec()]);
    }

    #[test]
    fn add_duplicate_value_rejected() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        let err = e.add_values("cn", vec![b"alice".to_vec()], MatchingRule::CaseIgnore).unwrap_err();
        assert!(matches!(err, LdapError::Operation(ResultCode::AttributeOrValueExists, _)));
    }

    #[test]
    fn delete_missing_value_rejected() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert!(e.delete_values("cn", vec![b"Bob".to_vec()], MatchingRule::CaseIgnore, false).is_err());
    }

    #[test]
    fn delete_missing_value_is_noop_when_lenient() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert!(e.delete_values("cn", vec![b"Bob".to_vec()], MatchingRule::CaseIgnore, true).is_ok());
        assert!(e.has_attribute("cn"));
    }

    #[test]
    fn delete_whole_attribute() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.delete_values("cn", Vec::new(), MatchingRule::CaseIgnore, false).unwrap();
        assert!(!e.has_attribute("cn"));
    }

    #[test]
    fn replace_with_empty_removes_attribute() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.replace_values("cn", Vec::new());
        assert!(!e.has_attribute("cn"));
    }

    #[test]
    fn modifications_are_all_or_nothing() {
        let mut e = entry();
        e.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        let schema = Schema::default_schema();
        let mods = vec![
            Modification { op: ModOp::Add, attr: "sn".to_owned(), values: vec![b"Smith".to_vec()] },
            Modification { op: ModOp::Delete, attr: "cn".to_owned(), values: vec![b"nonexistent".to_vec()] },
        ];
        assert!(e.apply_modifications(&mods, &schema, false).is_err());
        assert!(!e.has_attribute("sn"));
        assert!(e.has_attribute("cn"));
    }

    #[test]
    fn cannot_delete_rdn_attribute_down_to_zero() {
        let mut e = entry();
        e.add_values("uid", vec![b"alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        let schema = Schema::default_schema();
        let mods = vec![Modification { op: ModOp::Delete, attr: "uid".to_owned(), values: Vec::new() }];
        let err = e.apply_modifications(&mods, &schema, false).unwrap_err();
        assert!(matches!(err, LdapError::Operation(ResultCode::NotAllowedOnRdn, _)));
    }

    #[test]
    fn increment_adds_delta_to_single_integer_value() {
        let mut e = entry();
        e.add_values("employeeNumber", vec![b"5".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.increment_value("employeeNumber", 3).unwrap();
        assert_eq!(e.get("employeeNumber").unwrap().0, vec![b"8".to_vec()]);
    }

    #[test]
    fn diff_produces_add_and_delete_for_changed_attribute() {
        let mut a = entry();
        a.add_values("cn", vec![b"Alice".to_vec()], MatchingRule::CaseIgnore).unwrap();
        let mut b = entry();
        b.add_values("cn", vec![b"Alicia".to_vec()], MatchingRule::CaseIgnore).unwrap();
        let mods = Entry::diff(&a, &b, false, false);
        assert!(mods.iter().any(|m| m.op == ModOp::Delete && m.attr == "cn"));
        assert!(mods.iter().any(|m| m.op == ModOp::Add && m.attr == "cn"));
    }

    #[test]
    fn diff_ignores_rdn_attribute_when_asked() {
        let a = entry();
        let b = Entry::new(Dn::parse("uid=bob,dc=example,dc=com").unwrap());
        let mods = Entry::diff(&a, &b, true, false);
        assert!(!mods.iter().any(|m| m.attr.eq_ignore_ascii_case("uid")));
    }
}

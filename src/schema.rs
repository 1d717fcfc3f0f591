//! Minimal schema model and entry validator (C5): attribute types and object classes
//! sufficient to validate entries built and exercised by the rest of this crate, plus
//! the [`Schema::entry_is_valid`] check the in-memory directory engine runs before
//! committing an Add or Modify.

use std::collections::HashMap;

use crate::entry::Entry;
use crate::matching::MatchingRule;
use crate::result::{LdapError, Result, ResultCode};

fn violation(text: impl Into<String>) -> LdapError {
    LdapError::Operation(ResultCode::ObjectClassViolation, text.into())
}

/// One attribute type definition (RFC 4512 §4.1.2, trimmed to the fields this crate
/// actually consults).
#[derive(Clone, Debug)]
pub struct AttributeType {
    pub name: String,
    pub oid: String,
    pub equality: MatchingRule,
    pub single_valued: bool,
    pub no_user_modification: bool,
    pub superior: Option<String>,
}

/// Whether an object class describes a complete entry, a mixin, or neither may stand
/// alone (RFC 4512 §4.1.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

/// One object class definition.
#[derive(Clone, Debug)]
pub struct ObjectClass {
    pub name: String,
    pub oid: String,
    pub kind: ObjectClassKind,
    pub superior: Vec<String>,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

/// A schema: the set of attribute types and object classes the directory engine
/// enforces. Lookups are case-insensitive on name, per RFC 4512.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    attribute_types: HashMap<String, AttributeType>,
    object_classes: HashMap<String, ObjectClass>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn add_attribute_type(&mut self, at: AttributeType) {
        self.attribute_types.insert(at.name.to_ascii_lowercase(), at);
    }

    pub fn add_object_class(&mut self, oc: ObjectClass) {
        self.object_classes.insert(oc.name.to_ascii_lowercase(), oc);
    }

    pub fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        self.attribute_types.get(&name.to_ascii_lowercase())
    }

    pub fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.object_classes.get(&name.to_ascii_lowercase())
    }

    /// The equality matching rule to use for an attribute, falling back to
    /// `caseIgnoreMatch` for attributes not present in the schema (e.g. at the
    /// protocol layer, before a directory-wide schema is wired in).
    pub fn equality_rule(&self, attr: &str) -> MatchingRule {
        self.attribute_type(attr).map(|at| at.equality).unwrap_or(MatchingRule::CaseIgnore)
    }

    /// All object classes reachable via `superior` from the named class, the class
    /// itself included.
    fn class_chain<'a>(&'a self, name: &str, out: &mut Vec<&'a ObjectClass>) {
        if let Some(oc) = self.object_class(name) {
            if out.iter().any(|o| o.name.eq_ignore_ascii_case(&oc.name)) {
                return;
            }
            out.push(oc);
            for sup in &oc.superior {
                self.class_chain(sup, out);
            }
        }
    }

    /// Every attribute name (`must` union `may`, `objectClass` included) permitted by
    /// the named object class and its superiors, for the `@ClassName` search attribute
    /// selector (RFC 4511 §4.5.1.8 as extended by the `1.3.6.1.4.1.4203.1.5.2` feature).
    pub fn attrs_for_class(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        self.class_chain(name, &mut chain);
        let mut out: Vec<String> = vec!["objectClass".to_owned()];
        for oc in &chain {
            out.extend(oc.must.iter().cloned());
            out.extend(oc.may.iter().cloned());
        }
        out
    }

    /// Expand an Add request's `objectClass` values to include every transitive
    /// superior class not already named, preserving the given order and appending
    /// newly-discovered superiors afterward (spec.md §4.10 ADD step 6). Unknown class
    /// names are passed through unchanged; they are rejected later by
    /// [`Schema::entry_is_valid`].
    pub fn expand_superiors(&self, names: &[String]) -> Vec<String> {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut out: Vec<String> = Vec::new();
        for name in names {
            if seen.insert(name.to_ascii_lowercase()) {
                out.push(name.clone());
            }
        }
        let mut idx = 0;
        while idx < out.len() {
            if let Some(oc) = self.object_class(&out[idx]) {
                for sup in oc.superior.clone() {
                    if seen.insert(sup.to_ascii_lowercase()) {
                        out.push(sup);
                    }
                }
            }
            idx += 1;
        }
        out
    }

    /// Validate an entry against this schema: every `objectClass` value must be known;
    /// every `must` attribute of every named class (and its superiors) must be present;
    /// no attribute outside the union of `must`/`may` across all named classes (and
    /// operational attributes `objectClass` itself) may appear; `single_valued`
    /// attributes must carry exactly one value; `no_user_modification` attributes are
    /// not checked here (enforced by the caller at the operation layer, since validity
    /// depends on who is modifying, not just the resulting entry shape).
    pub fn entry_is_valid(&self, entry: &Entry) -> Result<()> {
        let classes = entry.get("objectClass").ok_or_else(|| violation("no objectClass attribute"))?;
        if classes.is_empty() {
            return Err(violation("empty objectClass"));
        }
        let mut chain: Vec<&ObjectClass> = Vec::new();
        for c in &classes.0 {
            let name = String::from_utf8_lossy(c).into_owned();
            if self.object_class(&name).is_none() {
                return Err(violation(format!("unknown object class {}", name)));
            }
            self.class_chain(&name, &mut chain);
        }
        let mut must: Vec<&str> = Vec::new();
        let mut may: Vec<&str> = vec!["objectClass"];
        for oc in &chain {
            must.extend(oc.must.iter().map(String::as_str));
            may.extend(oc.may.iter().map(String::as_str));
        }
        for attr in &must {
            if !entry.has_attribute(attr) {
                return Err(violation(format!("missing required attribute {}", attr)));
            }
        }
        for (name, values) in entry.attributes() {
            let allowed = must.iter().any(|a| a.eq_ignore_ascii_case(name))
                || may.iter().any(|a| a.eq_ignore_ascii_case(name));
            if !allowed {
                return Err(violation(format!("attribute {} not permitted by entry's object classes", name)));
            }
            if let Some(at) = self.attribute_type(name) {
                if at.single_valued && values.len() > 1 {
                    return Err(LdapError::Operation(
                        ResultCode::ConstraintViolation,
                        format!("{} is single-valued", name),
                    ));
                }
            }
        }
        Ok(())
    }

    /// A small built-in schema covering `top`, `person`, `organizationalPerson`,
    /// `inetOrgPerson`, `organizationalUnit`, `domain`, `groupOfNames`, and `extensibleObject`,
    /// with the attribute types they require. Used as the default when the in-memory
    /// server is started without a schema file (none is defined by this engine — see
    /// Non-goals).
    pub fn default_schema() -> Schema {
        let mut s = Schema::new();
        let at = |name: &str, oid: &str, eq: MatchingRule, single: bool| AttributeType {
            name: name.to_owned(),
            oid: oid.to_owned(),
            equality: eq,
            single_valued: single,
            no_user_modification: false,
            superior: None,
        };
        s.add_attribute_type(at("objectClass", "2.5.4.0", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("cn", "2.5.4.3", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("sn", "2.5.4.4", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("uid", "0.9.2342.19200300.100.1.1", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("mail", "0.9.2342.19200300.100.1.3", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("o", "2.5.4.10", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("ou", "2.5.4.11", MatchingRule::CaseIgnore, false));
        s.add_attribute_type(at("dc", "0.9.2342.19200300.100.1.25", MatchingRule::CaseIgnore, true));
        s.add_attribute_type(at("member", "2.5.4.31", MatchingRule::DistinguishedName, false));
        s.add_attribute_type(at("description", "2.5.4.13", MatchingRule::CaseIgnore, false));
        s.add_attribute_type({
            let mut a = at("userPassword", "2.5.4.35", MatchingRule::OctetString, false);
            a.no_user_modification = false;
            a
        });
        s.add_attribute_type(at("telephoneNumber", "2.5.4.20", MatchingRule::TelephoneNumber, false));
        s.add_attribute_type({
            let mut a = at("createTimestamp", "2.5.18.1", MatchingRule::GeneralizedTime, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type({
            let mut a = at("modifyTimestamp", "2.5.18.2", MatchingRule::GeneralizedTime, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type({
            let mut a = at("entryUUID", "1.3.6.1.1.16.4", MatchingRule::OctetString, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type(at("ref", "2.16.840.1.113730.3.1.34", MatchingRule::OctetString, false));
        s.add_attribute_type({
            let mut a = at("entryDN", "1.3.6.1.1.20", MatchingRule::DistinguishedName, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type({
            let mut a = at("creatorsName", "2.5.18.3", MatchingRule::DistinguishedName, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type({
            let mut a = at("modifiersName", "2.5.18.4", MatchingRule::DistinguishedName, true);
            a.no_user_modification = true;
            a
        });
        s.add_attribute_type({
            let mut a = at("subschemaSubentry", "2.5.18.10", MatchingRule::DistinguishedName, true);
            a.no_user_modification = true;
            a
        });

        s.add_object_class(ObjectClass {
            name: "top".to_owned(),
            oid: "2.5.6.0".to_owned(),
            kind: ObjectClassKind::Abstract,
            superior: Vec::new(),
            must: vec!["objectClass".to_owned()],
            may: Vec::new(),
        });
        s.add_object_class(ObjectClass {
            name: "person".to_owned(),
            oid: "2.5.6.6".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["top".to_owned()],
            must: vec!["cn".to_owned(), "sn".to_owned()],
            may: vec!["description".to_owned(), "userPassword".to_owned(), "telephoneNumber".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "organizationalPerson".to_owned(),
            oid: "2.5.6.7".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["person".to_owned()],
            must: Vec::new(),
            may: vec!["ou".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "inetOrgPerson".to_owned(),
            oid: "2.16.840.1.113730.3.2.2".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["organizationalPerson".to_owned()],
            must: Vec::new(),
            may: vec!["mail".to_owned(), "uid".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "organizationalUnit".to_owned(),
            oid: "2.5.6.5".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["top".to_owned()],
            must: vec!["ou".to_owned()],
            may: vec!["description".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "domain".to_owned(),
            oid: "0.9.2342.19200300.100.4.13".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["top".to_owned()],
            must: vec!["dc".to_owned()],
            may: vec!["description".to_owned(), "o".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "groupOfNames".to_owned(),
            oid: "2.5.6.9".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["top".to_owned()],
            must: vec!["cn".to_owned(), "member".to_owned()],
            may: vec!["description".to_owned()],
        });
        s.add_object_class(ObjectClass {
            name: "extensibleObject".to_owned(),
            oid: "1.3.6.1.4.1.1466.101.120.111".to_owned(),
            kind: ObjectClassKind::Auxiliary,
            superior: vec!["top".to_owned()],
            must: Vec::new(),
            may: Vec::new(),
        });
        s.add_object_class(ObjectClass {
            name: "referral".to_owned(),
            oid: "2.16.840.1.113730.3.2.6".to_owned(),
            kind: ObjectClassKind::Structural,
            superior: vec!["top".to_owned()],
            must: vec!["ref".to_owned()],
            may: Vec::new(),
        });
        s.add_object_class(ObjectClass {
            name: "subschema".to_owned(),
            oid: "2.5.20.1".to_owned(),
            kind: ObjectClassKind::Auxiliary,
            superior: vec!["top".to_owned()],
            must: Vec::new(),
            may: Vec::new(),
        });
        s.add_object_class(ObjectClass {
            name: "ldapSubEntry".to_owned(),
            oid: "1.3.6.1.4.1.1466.101.120.102".to_owned(),
            kind: ObjectClassKind::Auxiliary,
            superior: vec!["top".to_owned()],
            must: Vec::new(),
            may: Vec::new(),
        });
        s.add_object_class(ObjectClass {
            name: "inheritableLDAPSubEntry".to_owned(),
            oid: "2.16.840.1.113719.2.142.6.1.1".to_owned(),
            kind: ObjectClassKind::Auxiliary,
            superior: vec!["ldapSubEntry".to_owned()],
            must: Vec::new(),
            may: Vec::new(),
        });
        s
    }

    /// Render every attribute type as an RFC 4512 §4.1.2 `AttributeTypeDescription`
    /// string, for the subschema subentry's `attributeTypes` values.
    pub fn attribute_type_descriptions(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .attribute_types
            .values()
            .map(|at| {
                let mut s = format!("( {} NAME '{}'", at.oid, at.name);
                if let Some(sup) = &at.superior {
                    s.push_str(&format!(" SUP {}", sup));
                }
                if at.single_valued {
                    s.push_str(" SINGLE-VALUE");
                }
                if at.no_user_modification {
                    s.push_str(" NO-USER-MODIFICATION");
                }
                s.push_str(" )");
                s
            })
            .collect();
        out.sort();
        out
    }

    /// Render every object class as an RFC 4512 §4.1.1 `ObjectClassDescription`
    /// string, for the subschema subentry's `objectClasses` values.
    pub fn object_class_descriptions(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .object_classes
            .values()
            .map(|oc| {
                let kind = match oc.kind {
                    ObjectClassKind::Abstract => "ABSTRACT",
                    ObjectClassKind::Structural => "STRUCTURAL",
                    ObjectClassKind::Auxiliary => "AUXILIARY",
                };
                let mut s = format!("( {} NAME '{}'", oc.oid, oc.name);
                if !oc.superior.is_empty() {
                    s.push_str(&format!(" SUP {}", oc.superior.join("$")));
                }
                s.push(' ');
                s.push_str(kind);
                if !oc.must.is_empty() {
                    s.push_str(&format!(" MUST ( {} )", oc.must.join(" $ ")));
                }
                if !oc.may.is_empty() {
                    s.push_str(&format!(" MAY ( {} )", oc.may.join(" $ ")));
                }
                s.push_str(" )");
                s
            })
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dn::Dn;
    use crate::entry::Entry;

    fn person_entry() -> Entry {
        let mut e = Entry::new(Dn::parse("cn=Alice Smith,dc=example,dc=com").unwrap());
        e.add_values("objectClass", vec![b"top".to_vec(), b"person".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.add_values("cn", vec![b"Alice Smith".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.add_values("sn", vec![b"Smith".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e
    }

    #[test]
    fn valid_person_passes() {
        let schema = Schema::default_schema();
        assert!(schema.entry_is_valid(&person_entry()).is_ok());
    }

    #[test]
    fn missing_must_attribute_rejected() {
        let schema = Schema::default_schema();
        let mut e = person_entry();
        e.replace_values("sn", Vec::new());
        assert!(schema.entry_is_valid(&e).is_err());
    }

    #[test]
    fn unknown_object_class_rejected() {
        let schema = Schema::default_schema();
        let mut e = person_entry();
        e.replace_values("objectClass", vec![b"top".to_vec(), b"bogusClass".to_vec()]);
        assert!(schema.entry_is_valid(&e).is_err());
    }

    #[test]
    fn disallowed_attribute_rejected() {
        let schema = Schema::default_schema();
        let mut e = person_entry();
        e.add_values("dc", vec![b"example".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert!(schema.entry_is_valid(&e).is_err());
    }

    #[test]
    fn single_valued_violation_rejected() {
        let schema = Schema::default_schema();
        let mut e = Entry::new(Dn::parse("dc=example,dc=com").unwrap());
        e.add_values("objectClass", vec![b"top".to_vec(), b"domain".to_vec()], MatchingRule::CaseIgnore).unwrap();
        e.add_values("dc", vec![b"example".to_vec(), b"other".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert!(schema.entry_is_valid(&e).is_err());
    }

    #[test]
    fn inherited_may_attributes_allowed() {
        let schema = Schema::default_schema();
        let mut e = person_entry();
        e.replace_values("objectClass", vec![b"top".to_vec(), b"person".to_vec(), b"organizationalPerson".to_vec(), b"inetOrgPerson".to_vec()]);
        e.add_values("mail", vec![b"alice@example.com".to_vec()], MatchingRule::CaseIgnore).unwrap();
        assert!(schema.entry_is_valid(&e).is_ok());
    }
}

//! The in-memory request handler (C10): the entry store plus one method per LDAP
//! operation, executed against it under a single exclusive lock held for the duration
//! of each top-level operation (the concurrency model described in spec.md §5 — one
//! operation's view of the store is never interleaved with another's).

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use lber::structures::Tag;

use crate::dn::{Dn, Rdn};
use crate::entry::{AttributeValues, Entry, ModOp, Modification};
use crate::filter::{Filter, FilterResult};
use crate::matching::MatchingRule;
use crate::result::{LdapResult, ResultCode};
use crate::schema::Schema;
use crate::search::{ResultEntry, Scope, SearchEntry, SearchRequest};

use super::changelog::{changelog_dn, add_attrs, ChangeLog, ChangeType};
use super::controls::PreprocessedControls;
use super::rootdse::{root_dse, schema_dn, subschema_entry};

fn now_generalized_time() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%SZ").to_string()
}

fn is_referral_entry(entry: &Entry) -> bool {
    entry
        .get("objectClass")
        .map(|v| v.0.iter().any(|c| c.eq_ignore_ascii_case(b"referral")))
        .unwrap_or(false)
}

fn is_subentry(entry: &Entry) -> bool {
    entry
        .get("objectClass")
        .map(|v| v.0.iter().any(|c| c.eq_ignore_ascii_case(b"ldapSubEntry")))
        .unwrap_or(false)
}

fn entry_attrs(entry: &Entry) -> Vec<(String, Vec<Vec<u8>>)> {
    entry.attributes().map(|(n, v)| (n.to_owned(), v.0.clone())).collect()
}

/// The state a bind leaves on a connection: who it authenticated as, `None` meaning
/// anonymous. Connection-scoped; the listener owns the actual storage.
pub type BoundIdentity = Option<Dn>;

/// The in-memory directory engine: one entry store, shared schema, and change log,
/// guarded by a single lock so every operation runs against a consistent snapshot.
pub struct Directory {
    entries: Mutex<BTreeMap<String, Entry>>,
    base_dns: Vec<Dn>,
    schema: Schema,
    changelog: Mutex<ChangeLog>,
    vendor_name: String,
    vendor_version: String,
}

impl Directory {
    pub fn new(base_dns: Vec<Dn>, schema: Schema) -> Directory {
        Directory {
            entries: Mutex::new(BTreeMap::new()),
            base_dns,
            schema,
            changelog: Mutex::new(ChangeLog::new(0)),
            vendor_name: "ldap-core".to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    pub fn with_changelog_capacity(mut self, max_entries: usize) -> Directory {
        self.changelog = Mutex::new(ChangeLog::new(max_entries));
        self
    }

    pub fn with_vendor(mut self, name: impl Into<String>, version: impl Into<String>) -> Directory {
        self.vendor_name = name.into();
        self.vendor_version = version.into();
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Insert an entry directly into the store, bypassing validation, operational
    /// attribute generation, and the change log. For bootstrapping a directory from an
    /// LDIF dump at startup.
    pub fn seed_entry(&self, entry: Entry) {
        self.entries.lock().unwrap().insert(entry.dn.canonical(), entry);
    }

    fn lookup<'a>(entries: &'a BTreeMap<String, Entry>, dn: &Dn) -> Option<&'a Entry> {
        entries.get(&dn.canonical())
    }

    fn deepest_existing_ancestor(entries: &BTreeMap<String, Entry>, dn: &Dn) -> String {
        let mut cur = dn.parent();
        while let Some(d) = cur {
            if entries.contains_key(&d.canonical()) {
                return d.to_string();
            }
            cur = d.parent();
        }
        String::new()
    }

    /// Walk from `dn` up to (and including) the root looking for an existing entry
    /// that is itself a referral, stopping at the first one found (the one closest to
    /// `dn`). Returns its DN and `ref` values.
    fn find_referral_ancestor(entries: &BTreeMap<String, Entry>, dn: &Dn) -> Option<(Dn, AttributeValues)> {
        let mut cur = Some(dn.clone());
        while let Some(d) = cur {
            if let Some(e) = entries.get(&d.canonical()) {
                if is_referral_entry(e) {
                    if let Some(refs) = e.get("ref") {
                        return Some((d, refs.clone()));
                    }
                }
            }
            cur = d.parent();
        }
        None
    }

    fn referral_result(entry_dn: &Dn, target_dn: &Dn, refs: &AttributeValues) -> LdapResult {
        LdapResult::referral(rewrite_referral_urls(entry_dn, target_dn, refs))
    }

    fn reject_special_subtree(dn: &Dn) -> Result<(), LdapResult> {
        if dn.is_empty() {
            return Err(LdapResult::error(ResultCode::UnwillingToPerform, "the root DSE may not be modified"));
        }
        if dn.matches(&schema_dn()) || dn.is_descendant_of(&schema_dn()) {
            return Err(LdapResult::error(ResultCode::UnwillingToPerform, "the subschema subentry may not be modified"));
        }
        if dn.matches(&changelog_dn()) || dn.is_descendant_of(&changelog_dn()) {
            return Err(LdapResult::error(ResultCode::UnwillingToPerform, "the change log may not be modified"));
        }
        Ok(())
    }

    /// Same three special-subtree checks `handle_add` needs, but with the result codes
    /// spec.md §4.10 ADD mandates: a null-DN add or an add under the subschema
    /// subentry already has something there, so `ENTRY_ALREADY_EXISTS` rather than
    /// `UNWILLING_TO_PERFORM` (only the change log keeps the latter).
    fn reject_special_subtree_for_add(dn: &Dn) -> Result<(), LdapResult> {
        if dn.is_empty() {
            return Err(LdapResult::error(ResultCode::EntryAlreadyExists, "the root DSE already exists"));
        }
        if dn.matches(&schema_dn()) || dn.is_descendant_of(&schema_dn()) {
            return Err(LdapResult::error(ResultCode::EntryAlreadyExists, "the subschema subentry already exists"));
        }
        if dn.matches(&changelog_dn()) || dn.is_descendant_of(&changelog_dn()) {
            return Err(LdapResult::error(ResultCode::UnwillingToPerform, "the change log may not be modified"));
        }
        Ok(())
    }

    fn effective_actor<'a>(bound: Option<&'a Dn>, ctrls: &'a PreprocessedControls) -> Option<&'a Dn> {
        if ctrls.proxied_auth_present {
            ctrls.proxied_auth_dn.as_ref()
        } else {
            bound
        }
    }

    /// RFC 4511 §4.7 Add.
    pub fn handle_add(
        &self,
        dn: Dn,
        attrs: Vec<(String, Vec<Vec<u8>>)>,
        bound: Option<&Dn>,
        ctrls: &PreprocessedControls,
    ) -> LdapResult {
        if let Err(e) = Self::reject_special_subtree_for_add(&dn) {
            return e;
        }
        let mut entries = self.entries.lock().unwrap();
        if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &dn) {
            if !ctrls.manage_dsa_it {
                return Self::referral_result(&ref_dn, &dn, &refs);
            }
        }
        if entries.contains_key(&dn.canonical()) {
            return LdapResult::error(ResultCode::EntryAlreadyExists, format!("{} already exists", dn));
        }
        let mut entry = Entry::new(dn.clone());
        for (name, values) in attrs {
            let rule = self.schema.equality_rule(&name);
            if let Some(at) = self.schema.attribute_type(&name) {
                if at.no_user_modification && !ctrls.ignore_no_user_modification {
                    return LdapResult::error(
                        ResultCode::ConstraintViolation,
                        format!("{} is not user-modifiable", name),
                    );
                }
            }
            if let Err(e) = entry.add_values(&name, values, rule) {
                return e.into_result();
            }
        }
        // Step 5: force the RDN's own attribute/value pair into the entry, even if the
        // client's attribute list omitted it.
        if let Some(rdn) = dn.rdn().cloned() {
            for ava in &rdn.0 {
                let rule = self.schema.equality_rule(&ava.attr);
                if entry.get(&ava.attr).map(|v| !v.contains(rule, ava.value.as_bytes())).unwrap_or(true) {
                    let _ = entry.add_values(&ava.attr, vec![ava.value.clone().into_bytes()], rule);
                }
            }
        }
        // Step 6: fill in all transitive superior object classes.
        if let Some(classes) = entry.get("objectClass").cloned() {
            let names: Vec<String> = classes.0.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect();
            let expanded = self.schema.expand_superiors(&names);
            entry.replace_values("objectClass", expanded.into_iter().map(String::into_bytes).collect());
        }
        // Step 7: validate against schema.
        if let Err(e) = self.schema.entry_is_valid(&entry) {
            return e.into_result();
        }
        // Step 8: resolve proxied-auth to an effective actor.
        let actor = Self::effective_actor(bound, ctrls);
        // Step 9: assertion control.
        if let Some(assertion) = &ctrls.assertion {
            if !matches!(assertion.matches(&entry, &self.schema), FilterResult::True) {
                return LdapResult::error(ResultCode::AssertionFailed, "assertion control filter did not match");
            }
        }
        // Step 10: operational attributes.
        if !entry.has_attribute("entryUUID") {
            let _ = entry.add_values("entryUUID", vec![uuid::Uuid::new_v4().to_string().into_bytes()], MatchingRule::OctetString);
        }
        let now = now_generalized_time();
        let _ = entry.add_values("createTimestamp", vec![now.clone().into_bytes()], MatchingRule::GeneralizedTime);
        let _ = entry.add_values("modifyTimestamp", vec![now.into_bytes()], MatchingRule::GeneralizedTime);
        if let Some(actor) = actor {
            let _ = entry.add_values("creatorsName", vec![actor.to_string().into_bytes()], MatchingRule::DistinguishedName);
            let _ = entry.add_values("modifiersName", vec![actor.to_string().into_bytes()], MatchingRule::DistinguishedName);
        }
        // Step 11: post-read response control, computed against the entry as it would
        // be stored.
        let post_read = ctrls.post_read.as_ref().map(|attrs| select_attributes(&entry, attrs, &self.schema));
        // Step 12: the parent entry must exist, unless this DN is itself a configured base.
        if let Some(parent) = dn.parent() {
            if Self::lookup(&entries, &parent).is_none() && !self.base_dns.iter().any(|b| b.matches(&parent)) {
                if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &parent) {
                    if !ctrls.manage_dsa_it {
                        return Self::referral_result(&ref_dn, &dn, &refs);
                    }
                }
                return LdapResult {
                    rc: ResultCode::NoSuchObject.code(),
                    matched: Self::deepest_existing_ancestor(&entries, &dn),
                    text: "parent entry does not exist".to_owned(),
                    ..Default::default()
                };
            }
        }
        // Step 13: insert, log, succeed.
        let change_attrs = add_attrs(&entry);
        entries.insert(dn.canonical(), entry);
        drop(entries);
        self.changelog.lock().unwrap().record(dn, ChangeType::Add { attrs: change_attrs });
        let mut result = LdapResult::success_result(ResultCode::Success);
        if let Some(se) = post_read {
            push_read_entry_control(&mut result, crate::controls_impl::read_entry::POST_READ_OID, se);
        }
        result
    }

    /// RFC 4511 §4.8 Delete.
    pub fn handle_delete(&self, dn: Dn, ctrls: &PreprocessedControls) -> LdapResult {
        if let Err(e) = Self::reject_special_subtree(&dn) {
            return e;
        }
        let mut entries = self.entries.lock().unwrap();
        let target = match Self::lookup(&entries, &dn) {
            Some(e) => e.clone(),
            None => {
                if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &dn) {
                    if !ctrls.manage_dsa_it {
                        return Self::referral_result(&ref_dn, &dn, &refs);
                    }
                }
                return LdapResult {
                    rc: ResultCode::NoSuchObject.code(),
                    matched: Self::deepest_existing_ancestor(&entries, &dn),
                    ..Default::default()
                };
            }
        };
        if let Some(assertion) = &ctrls.assertion {
            if !matches!(assertion.matches(&target, &self.schema), FilterResult::True) {
                return LdapResult::error(ResultCode::AssertionFailed, "assertion control filter did not match");
            }
        }
        // Bottom-up: deepest descendants first, so each removal generates its own
        // change-log entry before the ancestor that contained it disappears (spec.md
        // §4.10 delete, §8 property 7).
        let mut children: Vec<Dn> = entries
            .keys()
            .filter_map(|k| Dn::parse(k).ok())
            .filter(|d| d.is_descendant_of(&dn) && !d.matches(&dn))
            .collect();
        if !children.is_empty() && !ctrls.subtree_delete {
            return LdapResult::error(ResultCode::NotAllowedOnNonLeaf, "entry has subordinates");
        }
        children.sort_by_key(|d| std::cmp::Reverse(d.0.len()));
        let deleted = entries.get(&dn.canonical()).cloned();
        let mut log = self.changelog.lock().unwrap();
        for child_dn in &children {
            if let Some(child) = entries.remove(&child_dn.canonical()) {
                log.record(child_dn.clone(), ChangeType::Delete { deleted_entry_attrs: entry_attrs(&child) });
            }
        }
        entries.remove(&dn.canonical());
        log.record(dn.clone(), ChangeType::Delete { deleted_entry_attrs: deleted.as_ref().map(entry_attrs).unwrap_or_default() });
        drop(log);
        drop(entries);
        let mut result = LdapResult::success_result(ResultCode::Success);
        if let (Some(attrs), Some(pre)) = (&ctrls.pre_read, deleted) {
            let se = select_attributes(&pre, attrs, &self.schema);
            push_read_entry_control(&mut result, crate::controls_impl::read_entry::PRE_READ_OID, se);
        }
        result
    }

    /// RFC 4511 §4.6 Modify.
    pub fn handle_modify(
        &self,
        dn: Dn,
        mods: Vec<Modification>,
        bound: Option<&Dn>,
        ctrls: &PreprocessedControls,
    ) -> LdapResult {
        if let Err(e) = Self::reject_special_subtree(&dn) {
            return e;
        }
        let actor = Self::effective_actor(bound, ctrls);
        let mut entries = self.entries.lock().unwrap();
        let existing = match Self::lookup(&entries, &dn) {
            Some(e) => e.clone(),
            None => {
                if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &dn) {
                    if !ctrls.manage_dsa_it {
                        return Self::referral_result(&ref_dn, &dn, &refs);
                    }
                }
                return LdapResult {
                    rc: ResultCode::NoSuchObject.code(),
                    matched: Self::deepest_existing_ancestor(&entries, &dn),
                    ..Default::default()
                };
            }
        };
        if let Some(assertion) = &ctrls.assertion {
            if !matches!(assertion.matches(&existing, &self.schema), FilterResult::True) {
                return LdapResult::error(ResultCode::AssertionFailed, "assertion control filter did not match");
            }
        }
        for m in &mods {
            if let Some(at) = self.schema.attribute_type(&m.attr) {
                if at.no_user_modification && !ctrls.ignore_no_user_modification {
                    return LdapResult::error(ResultCode::ConstraintViolation, format!("{} is not user-modifiable", m.attr));
                }
            }
        }
        let mut updated = existing.clone();
        if let Err(e) = updated.apply_modifications(&mods, &self.schema, ctrls.permissive_modify) {
            return e.into_result();
        }
        let now = now_generalized_time();
        updated.replace_values("modifyTimestamp", vec![now.into_bytes()]);
        if let Some(actor) = actor {
            updated.replace_values("modifiersName", vec![actor.to_string().into_bytes()]);
        }
        if let Err(e) = self.schema.entry_is_valid(&updated) {
            return e.into_result();
        }
        entries.insert(dn.canonical(), updated.clone());
        drop(entries);
        self.changelog.lock().unwrap().record(dn, ChangeType::Modify { mods });
        let mut result = LdapResult::success_result(ResultCode::Success);
        if let Some(attrs) = &ctrls.pre_read {
            let se = select_attributes(&existing, attrs, &self.schema);
            push_read_entry_control(&mut result, crate::controls_impl::read_entry::PRE_READ_OID, se);
        }
        if let Some(attrs) = &ctrls.post_read {
            let se = select_attributes(&updated, attrs, &self.schema);
            push_read_entry_control(&mut result, crate::controls_impl::read_entry::POST_READ_OID, se);
        }
        result
    }

    /// RFC 4511 §4.9 ModifyDN.
    pub fn handle_modifydn(
        &self,
        dn: Dn,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
        ctrls: &PreprocessedControls,
    ) -> LdapResult {
        if let Err(e) = Self::reject_special_subtree(&dn) {
            return e;
        }
        let mut entries = self.entries.lock().unwrap();
        let existing = match Self::lookup(&entries, &dn) {
            Some(e) => e.clone(),
            None => {
                return LdapResult {
                    rc: ResultCode::NoSuchObject.code(),
                    matched: Self::deepest_existing_ancestor(&entries, &dn),
                    ..Default::default()
                };
            }
        };
        let children: Vec<String> = entries
            .keys()
            .filter(|k| Dn::parse(k).map(|d| d.is_descendant_of(&dn) && !d.matches(&dn)).unwrap_or(false))
            .cloned()
            .collect();
        let new_rdn_parsed = match Dn::parse(&new_rdn) {
            Ok(d) if d.0.len() == 1 => d.0.into_iter().next().unwrap(),
            _ => return LdapResult::error(ResultCode::InvalidDnSyntax, "malformed newrdn"),
        };
        let superior = match &new_superior {
            Some(s) => match Dn::parse(s) {
                Ok(d) => d,
                Err(_) => return LdapResult::error(ResultCode::InvalidDnSyntax, "malformed newSuperior"),
            },
            None => dn.parent().unwrap_or_default(),
        };
        let mut new_dn_rdns = vec![new_rdn_parsed.clone()];
        new_dn_rdns.extend(superior.0.clone());
        let new_dn = Dn(new_dn_rdns);
        if entries.contains_key(&new_dn.canonical()) {
            return LdapResult::error(ResultCode::EntryAlreadyExists, format!("{} already exists", new_dn));
        }
        if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &new_dn) {
            if !ctrls.manage_dsa_it {
                return Self::referral_result(&ref_dn, &new_dn, &refs);
            }
        }
        let suffix_len = dn.0.len();
        let rename = |old_dn: &Dn, tail: &[Rdn]| -> Dn {
            let mut rdns = vec![new_rdn_parsed.clone()];
            rdns.extend(tail.to_vec());
            rdns.extend(superior.0.clone());
            let _ = old_dn;
            Dn(rdns)
        };
        entries.remove(&dn.canonical());
        let mut renamed = existing;
        renamed.dn = new_dn.clone();
        if delete_old_rdn {
            for ava in &dn.rdn().cloned().unwrap_or_default().0 {
                if let Some(values) = renamed.get(&ava.attr).cloned() {
                    let remaining: Vec<Vec<u8>> = values.0.into_iter().filter(|v| v != ava.value.as_bytes()).collect();
                    renamed.replace_values(&ava.attr, remaining);
                }
            }
        }
        for ava in &new_rdn_parsed.0 {
            let rule = self.schema.equality_rule(&ava.attr);
            if renamed.get(&ava.attr).map(|v| !v.contains(rule, ava.value.as_bytes())).unwrap_or(true) {
                let _ = renamed.add_values(&ava.attr, vec![ava.value.clone().into_bytes()], rule);
            }
        }
        entries.insert(new_dn.canonical(), renamed);
        for child_key in children {
            if let Some(mut child) = entries.remove(&child_key) {
                let child_dn = child.dn.clone();
                let tail = &child_dn.0[..child_dn.0.len() - suffix_len];
                let new_child_dn = rename(&child_dn, tail);
                child.dn = new_child_dn.clone();
                entries.insert(new_child_dn.canonical(), child);
            }
        }
        drop(entries);
        self.changelog.lock().unwrap().record(dn, ChangeType::ModDn { new_rdn, delete_old_rdn, new_superior });
        LdapResult::success_result(ResultCode::Success)
    }

    /// RFC 4511 §4.10 Compare.
    pub fn handle_compare(&self, dn: Dn, attr: String, value: Vec<u8>, ctrls: &PreprocessedControls) -> LdapResult {
        let entries = self.entries.lock().unwrap();
        let entry = match Self::lookup(&entries, &dn) {
            Some(e) => e,
            None => {
                if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &dn) {
                    if !ctrls.manage_dsa_it {
                        return Self::referral_result(&ref_dn, &dn, &refs);
                    }
                }
                return LdapResult {
                    rc: ResultCode::NoSuchObject.code(),
                    matched: Self::deepest_existing_ancestor(&entries, &dn),
                    ..Default::default()
                };
            }
        };
        let rule = self.schema.equality_rule(&attr);
        let matched = entry.get(&attr).map(|v| v.contains(rule, &value)).unwrap_or(false);
        LdapResult::success_result(if matched { ResultCode::CompareTrue } else { ResultCode::CompareFalse })
    }

    /// RFC 4511 §4.2 Bind. Returns the resulting bind identity alongside the result;
    /// `Ok(None)` on success means the connection is now anonymous.
    pub fn handle_bind(&self, request: crate::bind::BindRequest) -> (LdapResult, BoundIdentity) {
        if request.version != 3 {
            return (LdapResult::error(ResultCode::ProtocolError, "only LDAPv3 is supported"), None);
        }
        match request.credentials {
            crate::bind::BindCredentials::Simple(password) => {
                if request.name.is_empty() {
                    return (LdapResult::success_result(ResultCode::Success), None);
                }
                let dn = match Dn::parse(&request.name) {
                    Ok(d) => d,
                    Err(_) => return (LdapResult::error(ResultCode::InvalidDnSyntax, "malformed bind DN"), None),
                };
                let entries = self.entries.lock().unwrap();
                let entry = match Self::lookup(&entries, &dn) {
                    Some(e) => e,
                    None => return (LdapResult::error(ResultCode::InvalidCredentials, "no such entry"), None),
                };
                let matches = entry
                    .get("userPassword")
                    .map(|v| v.contains(MatchingRule::OctetString, password.as_bytes()))
                    .unwrap_or(false);
                if matches {
                    (LdapResult::success_result(ResultCode::Success), Some(dn))
                } else {
                    (LdapResult::error(ResultCode::InvalidCredentials, "bind failed"), None)
                }
            }
            crate::bind::BindCredentials::Sasl { mechanism, credentials } => {
                if mechanism != "EXTERNAL" {
                    return (LdapResult::error(ResultCode::AuthMethodNotSupported, "only SASL EXTERNAL is supported"), None);
                }
                let authzid = credentials.and_then(|c| String::from_utf8(c).ok());
                match authzid.as_deref().and_then(|s| s.strip_prefix("dn:")) {
                    Some(dn_str) if !dn_str.is_empty() => match Dn::parse(dn_str) {
                        Ok(dn) if Self::lookup(&self.entries.lock().unwrap(), &dn).is_some() => {
                            (LdapResult::success_result(ResultCode::Success), Some(dn))
                        }
                        _ => (LdapResult::error(ResultCode::InvalidCredentials, "no such entry"), None),
                    },
                    _ => (LdapResult::error(ResultCode::UnwillingToPerform, "EXTERNAL bind requires an authzid in this engine"), None),
                }
            }
        }
    }

    /// RFC 4511 §4.5 Search.
    pub fn handle_search(&self, req: SearchRequest, ctrls: &PreprocessedControls) -> (Vec<ResultEntry>, LdapResult) {
        let base = match Dn::parse(&req.base) {
            Ok(d) => d,
            Err(_) => return (Vec::new(), LdapResult::error(ResultCode::InvalidDnSyntax, "malformed base")),
        };
        if base.is_empty() {
            if !matches!(req.scope, Scope::Base) {
                return (Vec::new(), LdapResult::error(ResultCode::UnwillingToPerform, "only a base-scope search of the root DSE is supported"));
            }
            let entry = root_dse(&self.base_dns, &self.changelog.lock().unwrap(), &self.vendor_name, &self.vendor_version);
            return (vec![ResultEntry::Entry(select_search_attrs(&entry, &req.attributes, &self.schema))], LdapResult::success_result(ResultCode::Success));
        }
        if base.matches(&schema_dn()) {
            if !matches!(req.scope, Scope::Base) {
                return (Vec::new(), LdapResult::error(ResultCode::UnwillingToPerform, "only a base-scope search of the subschema subentry is supported"));
            }
            let entry = subschema_entry(&self.schema);
            return (vec![ResultEntry::Entry(select_search_attrs(&entry, &req.attributes, &self.schema))], LdapResult::success_result(ResultCode::Success));
        }
        if base.matches(&changelog_dn()) {
            let log = self.changelog.lock().unwrap();
            let out: Vec<ResultEntry> = log
                .iter()
                .map(|c| ResultEntry::Entry(select_search_attrs(&c.to_search_entry(), &req.attributes, &self.schema)))
                .collect();
            return (out, LdapResult::success_result(ResultCode::Success));
        }
        let entries = self.entries.lock().unwrap();
        if Self::lookup(&entries, &base).is_none() {
            if let Some((ref_dn, refs)) = Self::find_referral_ancestor(&entries, &base) {
                if !ctrls.manage_dsa_it {
                    return (Vec::new(), Self::referral_result(&ref_dn, &base, &refs));
                }
            }
            return (
                Vec::new(),
                LdapResult { rc: ResultCode::NoSuchObject.code(), matched: Self::deepest_existing_ancestor(&entries, &base), ..Default::default() },
            );
        }
        let mut out = Vec::new();
        let size_limit = if req.size_limit > 0 { req.size_limit as usize } else { usize::MAX };
        let mut truncated = false;
        for entry in entries.values() {
            let in_scope = match req.scope {
                Scope::Base => entry.dn.matches(&base),
                Scope::OneLevel => entry.dn.parent().map(|p| p.matches(&base)).unwrap_or(false),
                Scope::Subtree => entry.dn.is_descendant_of(&base),
            };
            if !in_scope {
                continue;
            }
            if is_subentry(entry) && !ctrls.subentries {
                continue;
            }
            if is_referral_entry(entry) && !entry.dn.matches(&base) && !ctrls.manage_dsa_it {
                if let Some(refs) = entry.get("ref") {
                    out.push(ResultEntry::Referral(
                        rewrite_referral_urls(&entry.dn, &entry.dn, refs).into_iter().collect(),
                    ));
                }
                continue;
            }
            if !matches!(req.filter.matches(entry, &self.schema), FilterResult::True) {
                continue;
            }
            if out.len() >= size_limit {
                truncated = true;
                break;
            }
            let se = SearchEntry::from(entry);
            out.push(ResultEntry::Entry(select_search_attrs(&se, &req.attributes, &self.schema)));
        }
        let result = if truncated {
            LdapResult::error(ResultCode::SizeLimitExceeded, "size limit exceeded")
        } else {
            LdapResult::success_result(ResultCode::Success)
        };
        (out, result)
    }

    /// WhoAmI (RFC 4532): the authzId form of the current bind identity.
    pub fn handle_whoami(&self, bound: Option<&Dn>) -> Option<String> {
        bound.map(|dn| format!("dn:{}", dn))
    }

    /// Password Modify (RFC 3062).
    pub fn handle_password_modify(
        &self,
        user_identity: Option<String>,
        old_password: Option<String>,
        new_password: Option<String>,
        bound: Option<&Dn>,
    ) -> Result<(LdapResult, Option<String>), LdapResult> {
        let target = match user_identity {
            Some(id) => Dn::parse(&id).map_err(|_| LdapResult::error(ResultCode::InvalidDnSyntax, "malformed userIdentity"))?,
            None => match bound {
                Some(dn) => dn.clone(),
                None => return Err(LdapResult::error(ResultCode::UnwillingToPerform, "no target identity: not bound and no userIdentity given")),
            },
        };
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(&target.canonical())
            .ok_or_else(|| LdapResult::error(ResultCode::NoSuchObject, "no such entry"))?;
        if let Some(old) = &old_password {
            let ok = entry.get("userPassword").map(|v| v.contains(MatchingRule::OctetString, old.as_bytes())).unwrap_or(false);
            if !ok {
                return Err(LdapResult::error(ResultCode::InvalidCredentials, "old password did not match"));
            }
        }
        let generated = new_password.is_none();
        let new_password = new_password.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        entry.replace_values("userPassword", vec![new_password.clone().into_bytes()]);
        Ok((LdapResult::success_result(ResultCode::Success), if generated { Some(new_password) } else { None }))
    }
}

/// Encode a Pre-/Post-Read response control carrying `entry`'s full state (RFC 4527
/// §3.1: the controlValue is a BER-encoded `SearchResultEntry`, envelope and controls
/// excluded) and push it onto `result`.
fn push_read_entry_control(result: &mut LdapResult, oid: &str, entry: SearchEntry) {
    let ctype = if oid == crate::controls_impl::read_entry::PRE_READ_OID {
        crate::controls::ControlType::PreReadEntry
    } else {
        crate::controls::ControlType::PostReadEntry
    };
    let tag = crate::search::encode_search_entry(&entry, &[]);
    let val = lber::write::encode(Tag::StructureTag(tag));
    result.ctrls.push(crate::controls::Control(
        Some(ctype),
        crate::controls::RawControl { ctype: oid.to_owned(), crit: false, val: Some(val) },
    ));
}

fn select_attributes(entry: &Entry, requested: &[String], schema: &Schema) -> SearchEntry {
    select_search_attrs(&SearchEntry::from(entry), requested, schema)
}

/// An attribute type is "operational" for selection purposes (RFC 4511 §4.5.1.8) iff
/// the schema marks it `NO-USER-MODIFICATION`; every attribute the directory engine
/// itself stamps onto entries (`entryUUID`, `createTimestamp`, ...) is defined that way
/// in [`Schema::default_schema`].
fn is_operational(schema: &Schema, name: &str) -> bool {
    schema.attribute_type(name).map(|at| at.no_user_modification).unwrap_or(false)
}

fn attr_base_and_opts(name: &str) -> (&str, Vec<&str>) {
    let mut parts = name.split(';');
    let base = parts.next().unwrap_or(name);
    (base, parts.collect())
}

/// Whether a stored attribute description (possibly carrying options, e.g. `cn;lang-en`)
/// is selected by one requested AttributeSelector: a bare name or OID matches the base
/// name regardless of options; options on the selector narrow the match to attributes
/// carrying (at least) those options.
fn attr_selected(schema: &Schema, stored_name: &str, selector: &str) -> bool {
    let (sel_base, sel_opts) = attr_base_and_opts(selector);
    let (store_base, store_opts) = attr_base_and_opts(stored_name);
    let base_matches = store_base.eq_ignore_ascii_case(sel_base)
        || schema.attribute_type(store_base).map(|at| at.oid == sel_base).unwrap_or(false);
    if !base_matches {
        return false;
    }
    sel_opts.iter().all(|o| store_opts.iter().any(|so| so.eq_ignore_ascii_case(o)))
}

/// Trim a `SearchEntry`'s attributes down to a requested-attributes list, honoring the
/// selectors of RFC 4511 §4.5.1.8 plus the `@ClassName` extension (feature
/// `1.3.6.1.4.1.4203.1.5.2`): `*` (all user attributes), `+` (all operational
/// attributes), `1.1` (no attributes), `@ClassName`, bare attribute names/OIDs, and
/// options (`name;option`).
fn select_search_attrs(entry: &SearchEntry, requested: &[String], schema: &Schema) -> SearchEntry {
    if requested.iter().any(|a| a == "1.1") {
        return SearchEntry { dn: entry.dn.clone(), attrs: Vec::new() };
    }
    let include_all_user = requested.is_empty() || requested.iter().any(|a| a == "*");
    let include_all_operational = requested.iter().any(|a| a == "+");
    let class_attrs: HashSet<String> = requested
        .iter()
        .filter_map(|a| a.strip_prefix('@'))
        .flat_map(|c| schema.attrs_for_class(c))
        .map(|s| s.to_ascii_lowercase())
        .collect();
    let named: Vec<&str> = requested
        .iter()
        .filter(|a| a.as_str() != "*" && a.as_str() != "+" && !a.starts_with('@'))
        .map(String::as_str)
        .collect();
    let attrs = entry
        .attrs
        .iter()
        .filter(|(name, _)| {
            let operational = is_operational(schema, name);
            (include_all_user && !operational)
                || (include_all_operational && operational)
                || class_attrs.contains(&attr_base_and_opts(name).0.to_ascii_lowercase())
                || named.iter().any(|sel| attr_selected(schema, name, sel))
        })
        .cloned()
        .collect();
    SearchEntry { dn: entry.dn.clone(), attrs }
}

/// RFC 4516-ish referral rewriting: retain the RDNs of `target_dn` below `entry_dn`
/// and prepend them to each ref URL's own DN, per spec.md §4.10.1.
fn rewrite_referral_urls(entry_dn: &Dn, target_dn: &Dn, refs: &AttributeValues) -> HashSet<String> {
    let suffix_len = target_dn.0.len().saturating_sub(entry_dn.0.len());
    let suffix = &target_dn.0[..suffix_len];
    refs.0
        .iter()
        .filter_map(|v| String::from_utf8(v.clone()).ok())
        .map(|url| {
            let Some(idx) = url.find("://") else { return url };
            let after = &url[idx + 3..];
            let (hostport, rest) = after.split_once('/').unwrap_or((after, ""));
            let base = Dn::parse(rest).unwrap_or_default();
            let mut rdns = suffix.to_vec();
            rdns.extend(base.0);
            format!("{}{}/{}", &url[..idx + 3], hostport, Dn(rdns))
        })
        .collect()
}

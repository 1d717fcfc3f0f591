//! Request/response controls (RFC 4511 §4.1.11), both the wire-level [`RawControl`] and
//! the typed wrappers client and server code build and match on.
//!
//! This module is the public surface; [`crate::controls_impl`] holds the OID constants
//! and the per-control BER construction/parsing that both the client operation modules
//! and the server's control registry (C11) call into.

use lber::common::TagClass;
use lber::structure::{StructureTag, PL};
use lber::structures::{ASNTag, Boolean, OctetString, Sequence, Tag};

pub use crate::controls_impl::assertion::AssertionControl;
pub use crate::controls_impl::manage_dsa_it::ManageDsaIt;
pub use crate::controls_impl::matched_values::MatchedValues;
pub use crate::controls_impl::paged_results::PagedResults;
pub use crate::controls_impl::proxy_auth::{ProxyAuth, ProxyAuthV1, ProxyAuthV2};
pub use crate::controls_impl::read_entry::{PostReadEntry, PreReadEntry};
pub use crate::controls_impl::relax_rules::RelaxRules;
pub use crate::controls_impl::{IgnoreNoUserModification, PermissiveModify, Subentries, SubtreeDelete};

/// The untyped wire form of a control: its OID, criticality flag, and optional opaque
/// value. Every control, typed or not, round-trips through this shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawControl {
    pub ctype: String,
    pub crit: bool,
    pub val: Option<Vec<u8>>,
}

/// A control paired with its recognized typed form, when this crate knows how to parse
/// the OID; otherwise `None` and callers fall back to [`Control::raw`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Control(pub Option<ControlType>, pub RawControl);

impl Control {
    pub fn raw(&self) -> &RawControl {
        &self.1
    }
}

/// The control types this crate recognizes on decode. Unrecognized OIDs still decode
/// successfully into a `Control(None, raw)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlType {
    PagedResults,
    ManageDsaIt,
    RelaxRules,
    Assertion,
    ProxyAuthV1,
    ProxyAuthV2,
    PreReadEntry,
    PostReadEntry,
    MatchedValues,
    SubtreeDelete,
    Subentries,
    PermissiveModify,
    IgnoreNoUserModification,
}

/// Implemented by every typed control so it can flip its own criticality before being
/// sent, mirroring the builder-style API of the per-operation request methods.
pub trait MakeCritical {
    fn critical(self, crit: bool) -> Self;
}

/// The control's registered OID (RFC 4511 §4.1.11, and the individual RFCs below).
pub trait Oid {
    const OID: &'static str;
}

pub(crate) fn construct_control(oid: &str, crit: bool, val: Option<Vec<u8>>) -> StructureTag {
    let mut inner = vec![
        Tag::OctetString(OctetString { inner: oid.as_bytes().to_vec(), ..Default::default() }).into_structure(),
    ];
    if crit {
        inner.push(Tag::Boolean(Boolean { inner: true, ..Default::default() }).into_structure());
    }
    if let Some(v) = val {
        inner.push(Tag::OctetString(OctetString { inner: v, ..Default::default() }).into_structure());
    }
    Tag::Sequence(Sequence { inner: Vec::new(), ..Default::default() }).into_structure_with(inner)
}

/// Serialize a list of controls into the `[0] Controls` context tag that follows the
/// `protocolOp` in an `LDAPMessage`, or `None` if the list is empty (the field is
/// OPTIONAL and is simply omitted rather than encoded empty).
pub fn encode_controls(ctrls: &[RawControl]) -> Option<StructureTag> {
    if ctrls.is_empty() {
        return None;
    }
    let children: Vec<StructureTag> = ctrls
        .iter()
        .map(|c| construct_control(&c.ctype, c.crit, c.val.clone()))
        .collect();
    Some(StructureTag { class: TagClass::Context, id: 0, payload: PL::C(children) })
}

/// Parse the `[0] Controls` context tag into a list of [`Control`]s, recognizing the
/// OIDs this crate knows about.
pub fn parse_controls(tag: StructureTag) -> Vec<Control> {
    let children = match tag.expect_constructed() {
        Some(c) => c,
        None => return Vec::new(),
    };
    children.into_iter().filter_map(parse_one_control).collect()
}

fn parse_one_control(tag: StructureTag) -> Option<Control> {
    let mut parts = tag.expect_constructed()?.into_iter();
    let oid = String::from_utf8(parts.next()?.expect_primitive()?).ok()?;
    let mut crit = false;
    let mut val = None;
    for part in parts {
        match part.id {
            1 if part.class == TagClass::Universal => {
                let bytes = part.expect_primitive()?;
                crit = bytes.first().map(|b| *b != 0).unwrap_or(false);
            }
            4 if part.class == TagClass::Universal => {
                val = part.expect_primitive();
            }
            _ => {}
        }
    }
    let ctype = recognize_oid(&oid);
    Some(Control(ctype, RawControl { ctype: oid, crit, val }))
}

fn recognize_oid(oid: &str) -> Option<ControlType> {
    use crate::controls_impl::*;
    Some(match oid {
        paged_results::PAGED_RESULTS_OID => ControlType::PagedResults,
        manage_dsa_it::MANAGE_DSA_IT_OID => ControlType::ManageDsaIt,
        relax_rules::RELAX_RULES_OID => ControlType::RelaxRules,
        assertion::ASSERTION_OID => ControlType::Assertion,
        proxy_auth::PROXY_AUTH_V1_OID => ControlType::ProxyAuthV1,
        proxy_auth::PROXY_AUTH_V2_OID => ControlType::ProxyAuthV2,
        read_entry::PRE_READ_OID => ControlType::PreReadEntry,
        read_entry::POST_READ_OID => ControlType::PostReadEntry,
        matched_values::MATCHED_VALUES_OID => ControlType::MatchedValues,
        SUBTREE_DELETE_OID => ControlType::SubtreeDelete,
        SUBENTRIES_OID => ControlType::Subentries,
        PERMISSIVE_MODIFY_OID => ControlType::PermissiveModify,
        IGNORE_NO_USER_MODIFICATION_OID => ControlType::IgnoreNoUserModification,
        _ => return None,
    })
}

/// A helper extending [`ASNTag::into_structure`] for constructing a SEQUENCE whose
/// children are already fully built, since `construct_control` needs an empty
/// `Sequence` shell to carry its class/id defaults without repeating them.
trait IntoStructureWith {
    fn into_structure_with(self, children: Vec<StructureTag>) -> StructureTag;
}

impl IntoStructureWith for StructureTag {
    fn into_structure_with(self, children: Vec<StructureTag>) -> StructureTag {
        StructureTag { class: self.class, id: self.id, payload: PL::C(children) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_a_critical_control_with_value() {
        let raw = RawControl { ctype: "1.2.3.4".to_owned(), crit: true, val: Some(b"hi".to_vec()) };
        let tag = construct_control(&raw.ctype, raw.crit, raw.val.clone());
        let parsed = parse_one_control(tag).unwrap();
        assert_eq!(parsed.1, raw);
    }

    #[test]
    fn unrecognized_oid_parses_untyped() {
        let tag = construct_control("1.2.3.4.5", false, None);
        let ctrl = parse_one_control(tag).unwrap();
        assert!(ctrl.0.is_none());
    }

    #[test]
    fn recognized_oid_parses_typed() {
        let tag = construct_control(crate::controls_impl::paged_results::PAGED_RESULTS_OID, false, Some(vec![1, 2, 3]));
        let ctrl = parse_one_control(tag).unwrap();
        assert_eq!(ctrl.0, Some(ControlType::PagedResults));
    }

    #[test]
    fn empty_control_list_encodes_to_none() {
        assert!(encode_controls(&[]).is_none());
    }
}

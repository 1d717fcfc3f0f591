//! Request-control preprocessing (C11, RFC 4511 §4.1.11): turn the raw controls that
//! rode in on a request into the flags and values [`crate::server::directory::Directory`]
//! consults while executing the operation, failing up front on any critical control this
//! server doesn't implement.

use crate::controls::{Control, ControlType};
use crate::controls_impl;
use crate::dn::Dn;
use crate::filter::Filter;
use crate::result::{LdapResult, ResultCode};

/// The subset of RFC 4511 §4.1.11 / RFC 4527 / RFC 3672 / RFC 4370 controls this engine
/// interprets, decoded once per request so the directory's operation handlers don't each
/// re-walk the raw control list.
#[derive(Clone, Debug, Default)]
pub struct PreprocessedControls {
    pub manage_dsa_it: bool,
    pub assertion: Option<Filter>,
    /// `Some(true)` once a Proxied Authorization control was present; its resolved
    /// identity lives in `proxied_auth_dn` (`None` there means the authzid resolved to
    /// anonymous, e.g. `authzid:""`, not that the control was absent).
    pub proxied_auth_present: bool,
    pub proxied_auth_dn: Option<Dn>,
    pub pre_read: Option<Vec<String>>,
    pub post_read: Option<Vec<String>>,
    pub subtree_delete: bool,
    pub subentries: bool,
    pub permissive_modify: bool,
    pub ignore_no_user_modification: bool,
}

/// Interpret a request's controls, or fail with `unavailableCriticalExtension` if a
/// critical control is present that this server doesn't recognize or can't honor.
pub fn preprocess(controls: &[Control]) -> Result<PreprocessedControls, LdapResult> {
    let mut out = PreprocessedControls::default();
    for ctrl in controls {
        let raw = ctrl.raw();
        match &ctrl.0 {
            Some(ControlType::ManageDsaIt) => out.manage_dsa_it = true,
            Some(ControlType::Assertion) => {
                let filter = raw.val.as_deref().and_then(controls_impl::assertion::parse);
                match filter {
                    Some(f) => out.assertion = Some(f),
                    None if raw.crit => return Err(critical_extension(&raw.ctype)),
                    None => {}
                }
            }
            Some(ControlType::ProxyAuthV1) | Some(ControlType::ProxyAuthV2) => {
                let authzid = raw.val.as_deref().map(|v| String::from_utf8_lossy(v).into_owned());
                match authzid.as_deref() {
                    Some("") => out.proxied_auth_present = true,
                    Some(s) => match parse_authzid(s) {
                        Some(dn) => {
                            out.proxied_auth_present = true;
                            out.proxied_auth_dn = Some(dn);
                        }
                        None => return Err(LdapResult::error(ResultCode::AuthorizationDenied, "proxied authorization identity did not resolve")),
                    },
                    None if raw.crit => return Err(critical_extension(&raw.ctype)),
                    None => {}
                }
            }
            Some(ControlType::PreReadEntry) => {
                let attrs = raw.val.as_deref().map(crate::search::decode_attribute_selector).unwrap_or_default();
                out.pre_read = Some(attrs);
            }
            Some(ControlType::PostReadEntry) => {
                let attrs = raw.val.as_deref().map(crate::search::decode_attribute_selector).unwrap_or_default();
                out.post_read = Some(attrs);
            }
            Some(ControlType::SubtreeDelete) => out.subtree_delete = true,
            Some(ControlType::Subentries) => out.subentries = true,
            Some(ControlType::PermissiveModify) => out.permissive_modify = true,
            Some(ControlType::IgnoreNoUserModification) => out.ignore_no_user_modification = true,
            Some(ControlType::PagedResults) | Some(ControlType::MatchedValues) | Some(ControlType::RelaxRules) => {
                if raw.crit {
                    return Err(critical_extension(&raw.ctype));
                }
            }
            None if raw.crit => return Err(critical_extension(&raw.ctype)),
            None => {}
        }
    }
    Ok(out)
}

fn critical_extension(oid: &str) -> LdapResult {
    LdapResult::error(ResultCode::UnavailableCriticalExtension, format!("unsupported critical control {}", oid))
}

/// Resolve an authzId (RFC 4513 §5.2.1.8) to a [`Dn`]: `"dn:<DN>"` parses directly,
/// `"dn:"` (empty) means anonymous and is rejected here (callers should treat a `None`
/// as "control present but didn't resolve"), and `"u:<id>"` has no mapping in this
/// engine (no user directory outside the DIT itself) and likewise fails to resolve.
fn parse_authzid(s: &str) -> Option<Dn> {
    let rest = s.strip_prefix("dn:")?;
    if rest.is_empty() {
        return None;
    }
    Dn::parse(rest).ok()
}

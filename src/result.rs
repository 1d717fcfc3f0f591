//! Operation result structures and helpers.
//!
//! Most LDAP operations return a [`LdapResult`]. This module contains its definition, the
//! result-code-to-reason mapping of RFC 4511 Appendix A, and a single error type,
//! [`LdapError`], used throughout the crate in place of the deep exception hierarchies of
//! older LDAP SDKs (see spec.md §9, "Deep inheritance of exception and message types").

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use lber::common::TagClass;
use lber::structure::{DecodeError, StructureTag, PL};
use lber::structures::{ASNTag, Integer, OctetString, Tag};

use crate::controls::Control;
use crate::exop::Exop;

/// Crate-wide result alias: every fallible public operation returns `Result<T>`.
pub type Result<T> = std::result::Result<T, LdapError>;

/// Numeric LDAP result codes (RFC 4511 Appendix A.1), named for use in matching and in
/// constructing [`LdapResult`] values from the server engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultCode {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    CompareFalse = 5,
    CompareTrue = 6,
    AuthMethodNotSupported = 7,
    StrongerAuthRequired = 8,
    Referral = 10,
    AdminLimitExceeded = 11,
    UnavailableCriticalExtension = 12,
    ConfidentialityRequired = 13,
    SaslBindInProgress = 14,
    NoSuchAttribute = 16,
    UndefinedAttributeType = 17,
    InappropriateMatching = 18,
    ConstraintViolation = 19,
    AttributeOrValueExists = 20,
    InvalidAttributeSyntax = 21,
    NoSuchObject = 32,
    AliasProblem = 33,
    InvalidDnSyntax = 34,
    AliasDereferencingProblem = 36,
    InappropriateAuthentication = 48,
    InvalidCredentials = 49,
    InsufficientAccessRights = 50,
    Busy = 51,
    Unavailable = 52,
    UnwillingToPerform = 53,
    LoopDetect = 54,
    NamingViolation = 64,
    ObjectClassViolation = 65,
    NotAllowedOnNonLeaf = 66,
    NotAllowedOnRdn = 67,
    EntryAlreadyExists = 68,
    ObjectClassModsProhibited = 69,
    AffectsMultipleDsas = 71,
    Other = 80,
    AssertionFailed = 122,
    AuthorizationDenied = 123,
    /// RFC 3909 §3.1: the targeted operation was abandoned in response to Cancel.
    Canceled = 118,
    /// RFC 3909 §3.1: no operation with the given `messageID` is outstanding.
    NoSuchOperation = 119,
    /// RFC 3909 §3.1: the targeted operation has already progressed too far to cancel.
    TooLate = 120,
    /// RFC 3909 §3.1: the targeted operation cannot be canceled (e.g. it is itself
    /// Cancel, Bind, or Unbind).
    CannotCancel = 121,
    /// Local-only: transport went away while an operation was outstanding.
    ServerDown = 81,
    /// Local-only: a PDU could not be decoded; the connection is terminated.
    LocalError = 82,
    /// Local-only: the library itself failed to establish a connection.
    ConnectError = 91,
}

impl ResultCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn reason(code: u32) -> &'static str {
        match code {
            0 => "success",
            1 => "operationsError",
            2 => "protocolError",
            3 => "timeLimitExceeded",
            4 => "sizeLimitExceeded",
            5 => "compareFalse",
            6 => "compareTrue",
            7 => "authMethodNotSupported",
            8 => "strongerAuthRequired",
            10 => "referral",
            11 => "adminLimitExceeded",
            12 => "unavailableCriticalExtension",
            13 => "confidentialityRequired",
            14 => "saslBindInProgress",
            16 => "noSuchAttribute",
            17 => "undefinedAttributeType",
            18 => "inappropriateMatching",
            19 => "constraintViolation",
            20 => "attributeOrValueExists",
            21 => "invalidAttributeSyntax",
            32 => "noSuchObject",
            33 => "aliasProblem",
            34 => "invalidDNSyntax",
            36 => "aliasDereferencingProblem",
            48 => "inappropriateAuthentication",
            49 => "invalidCredentials",
            50 => "insufficientAccessRights",
            51 => "busy",
            52 => "unavailable",
            53 => "unwillingToPerform",
            54 => "loopDetect",
            64 => "namingViolation",
            65 => "objectClassViolation",
            66 => "notAllowedOnNonLeaf",
            67 => "notAllowedOnRDN",
            68 => "entryAlreadyExists",
            69 => "objectClassModsProhibited",
            71 => "affectsMultipleDSAs",
            80 => "other",
            81 => "serverDown",
            82 => "localError",
            91 => "connectError",
            122 => "assertionFailed",
            123 => "authorizationDenied",
            88 => "abandoned",
            118 => "canceled",
            119 => "noSuchOperation",
            120 => "tooLate",
            121 => "cannotCancel",
            _ => "unknown",
        }
    }
}

/// Common components of an LDAP operation result (RFC 4511 §4.1.9).
///
/// This structure faithfully replicates the components dictated by the standard, and is
/// distinctly C-like with its reliance on a numeric code to indicate outcome. Helper
/// methods [`success()`](#method.success) and [`non_error()`](#method.non_error) adapt it
/// to ergonomic `Result`-based error handling when simple condition checking suffices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LdapResult {
    /// Result code. Zero indicates success; see [`ResultCode`] for named values.
    pub rc: u32,
    /// Matched component DN, populated for `NO_SUCH_OBJECT` with the deepest existing
    /// ancestor of the target, empty otherwise.
    pub matched: String,
    /// Additional diagnostic text. Per spec.md §8, property 8, never empty on a
    /// non-success result.
    pub text: String,
    /// Referral URLs, present when `rc == REFERRAL`.
    pub refs: Vec<HashSet<String>>,
    /// Response controls. Missing and empty controls are both the empty vector.
    pub ctrls: Vec<Control>,
}

impl fmt::Display for LdapResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rc={} ({}), dn: \"{}\", text: \"{}\"",
            self.rc,
            ResultCode::reason(self.rc),
            self.matched,
            self.text
        )
    }
}

impl LdapResult {
    pub fn success_result(code: ResultCode) -> LdapResult {
        LdapResult { rc: code.code(), ..Default::default() }
    }

    pub fn error(code: ResultCode, text: impl Into<String>) -> LdapResult {
        LdapResult { rc: code.code(), text: text.into(), ..Default::default() }
    }

    pub fn not_found(matched: impl Into<String>) -> LdapResult {
        LdapResult {
            rc: ResultCode::NoSuchObject.code(),
            matched: matched.into(),
            text: "no such object".to_owned(),
            ..Default::default()
        }
    }

    pub fn referral(urls: HashSet<String>) -> LdapResult {
        LdapResult { rc: ResultCode::Referral.code(), refs: vec![urls], ..Default::default() }
    }

    pub fn is_success(&self) -> bool {
        self.rc == ResultCode::Success.code()
    }

    /// If the result code is zero, return the instance itself wrapped in `Ok()`,
    /// otherwise translate it into an [`LdapError::Result`].
    pub fn success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(LdapError::Result(self))
        }
    }

    /// As [`Self::success`], but also accepts a referral (rc == 10) as non-error.
    pub fn non_error(self) -> Result<Self> {
        if self.is_success() || self.rc == ResultCode::Referral.code() {
            Ok(self)
        } else {
            Err(LdapError::Result(self))
        }
    }
}

/// Wrapper for the result of a Search operation returning all entries at once.
#[derive(Clone, Debug, Default)]
pub struct SearchResult(pub Vec<crate::search::ResultEntry>, pub LdapResult);

impl SearchResult {
    pub fn success(self) -> Result<(Vec<crate::search::ResultEntry>, LdapResult)> {
        if self.1.is_success() {
            Ok((self.0, self.1))
        } else {
            Err(LdapError::Result(self.1))
        }
    }

    pub fn non_error(self) -> Result<(Vec<crate::search::ResultEntry>, LdapResult)> {
        if self.1.is_success() || self.1.rc == ResultCode::Referral.code() {
            Ok((self.0, self.1))
        } else {
            Err(LdapError::Result(self.1))
        }
    }
}

/// Wrapper for the result of a Compare operation, whose two non-error outcomes
/// (`compareTrue`/`compareFalse`) don't fit the success/error dichotomy.
#[derive(Clone, Debug)]
pub struct CompareResult(pub LdapResult);

impl CompareResult {
    pub fn equal(self) -> Result<bool> {
        match self.0.rc {
            5 => Ok(false),
            6 => Ok(true),
            _ => Err(LdapError::Result(self.0)),
        }
    }

    pub fn non_error(self) -> Result<LdapResult> {
        if matches!(self.0.rc, 5 | 6 | 10) {
            Ok(self.0)
        } else {
            Err(LdapError::Result(self.0))
        }
    }
}

/// Wrapper for the result of an Extended operation, carrying the parsed response OID
/// and value alongside the common result components.
#[derive(Clone, Debug)]
pub struct ExopResult(pub Exop, pub LdapResult);

impl ExopResult {
    pub fn success(self) -> Result<(Exop, LdapResult)> {
        if self.1.is_success() {
            Ok((self.0, self.1))
        } else {
            Err(LdapError::Result(self.1))
        }
    }
}

/// The single error type returned by every fallible public operation in this crate.
///
/// This replaces the deep, SDK-specific exception hierarchies of older LDAP libraries
/// (spec.md §9) with one flat, matchable enum.
#[derive(Debug, Error)]
pub enum LdapError {
    /// An operation completed with a non-success [`LdapResult`].
    #[error("{0}")]
    Result(LdapResult),
    /// The underlying transport failed; all outstanding requests on the connection have
    /// been failed with `SERVER_DOWN`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A PDU could not be decoded; the connection has been closed.
    #[error("protocol decode error: {0}")]
    Decode(#[from] DecodeError),
    /// A DN string did not conform to RFC 4514.
    #[error("invalid DN syntax: {0}")]
    InvalidDn(String),
    /// A filter string did not conform to RFC 4515.
    #[error("invalid filter syntax: {0}")]
    InvalidFilter(String),
    /// An LDAP URL could not be parsed.
    #[error("invalid LDAP URL: {0}")]
    InvalidUrl(String),
    /// The connection was closed, or an operation was attempted on one already closed.
    #[error("connection closed")]
    ConnectionClosed,
    /// A request was abandoned by the caller before a response arrived.
    #[error("operation abandoned")]
    Abandoned,
    /// A caller-specified timeout elapsed before a response arrived.
    #[error("operation timed out")]
    Timeout,
    /// An `AsRef<[u8]>`-empty value set was supplied where at least one value is required
    /// (e.g. an Add attribute, or a non-deleting Modify).
    #[error("empty value set for {0}")]
    EmptyValueSet(&'static str),
    /// An in-memory directory-engine operation (add/delete/modify/...) failed with a
    /// specific [`ResultCode`], carrying enough detail for the server's reader loop to
    /// build the matching response PDU without re-parsing an error string.
    #[error("{1}")]
    Operation(ResultCode, String),
}

impl LdapError {
    /// Build a `SERVER_DOWN` result for every handle whose connection just failed.
    pub fn server_down(io: std::io::Error) -> LdapResult {
        LdapResult::error(ResultCode::ServerDown, io.to_string())
    }

    /// Translate this error into the [`LdapResult`] the server's reader loop should send
    /// back as the operation's response, for the [`LdapError::Operation`] variant raised
    /// by the entry/schema layer; any other variant maps to `operationsError`.
    pub fn into_result(self) -> LdapResult {
        match self {
            LdapError::Operation(code, text) => LdapResult::error(code, text),
            LdapError::Result(r) => r,
            other => LdapResult::error(ResultCode::OperationsError, other.to_string()),
        }
    }
}

/// Decode the common `COMPONENTS OF LDAPResult` prefix shared by every response PDU
/// (RFC 4511 §4.1.9): resultCode, matchedDN, diagnosticMessage, and an optional
/// referral SEQUENCE, followed by any controls already split out by the caller.
pub fn decode_ldap_result(tag: StructureTag, controls: Vec<Control>) -> LdapResult {
    let mut children = tag.expect_constructed().unwrap_or_default().into_iter();
    let rc = children
        .next()
        .and_then(|t| t.expect_primitive())
        .and_then(|b| lber::parse::parse_int(&b).ok())
        .map(|(_, v)| v as u32)
        .unwrap_or(ResultCode::OperationsError.code());
    let matched = children
        .next()
        .and_then(|t| t.expect_primitive())
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();
    let text = children
        .next()
        .and_then(|t| t.expect_primitive())
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();
    let mut refs = Vec::new();
    if let Some(next) = children.next() {
        if next.class == lber::common::TagClass::Context && next.id == 3 {
            let urls: HashSet<String> = next
                .expect_constructed()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|t| t.expect_primitive())
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .collect();
            refs.push(urls);
        }
    }
    LdapResult { rc, matched, text, refs, ctrls: controls }
}

/// Build the `COMPONENTS OF LDAPResult` prefix of a response PDU under the given
/// APPLICATION tag number, for the server's reader loop to use when answering any
/// operation other than Extended (which has its own name/value suffix; see
/// [`crate::extended::encode_extended_response`]).
pub fn encode_ldap_result(app_id: u64, result: &LdapResult) -> StructureTag {
    let mut inner = vec![
        Tag::Integer(Integer { inner: result.rc as i64, ..Default::default() }).into_structure(),
        Tag::OctetString(OctetString { inner: result.matched.clone().into_bytes(), ..Default::default() }).into_structure(),
        Tag::OctetString(OctetString { inner: result.text.clone().into_bytes(), ..Default::default() }).into_structure(),
    ];
    if let Some(urls) = result.refs.first() {
        let children: Vec<StructureTag> = urls
            .iter()
            .map(|u| Tag::OctetString(OctetString { inner: u.clone().into_bytes(), ..Default::default() }).into_structure())
            .collect();
        inner.push(StructureTag { class: TagClass::Context, id: 3, payload: PL::C(children) });
    }
    StructureTag { class: TagClass::Application, id: app_id, payload: PL::C(inner) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_ldap_result_round_trips_through_decode() {
        let result = LdapResult::error(ResultCode::NoSuchObject, "no such object");
        let tag = encode_ldap_result(9, &result);
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 9);
        let decoded = decode_ldap_result(tag, vec![]);
        assert_eq!(decoded.rc, result.rc);
        assert_eq!(decoded.text, result.text);
    }

    #[test]
    fn encode_ldap_result_carries_referral() {
        let mut urls = HashSet::new();
        urls.insert("ldap://other.example.com/dc=example,dc=com".to_owned());
        let result = LdapResult::referral(urls.clone());
        let tag = encode_ldap_result(5, &result);
        let decoded = decode_ldap_result(tag, vec![]);
        assert_eq!(decoded.refs, vec![urls]);
    }
}

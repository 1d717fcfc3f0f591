//! Search request/response types (RFC 4511 §4.5), filter BER encoding, and the
//! bounded-queue streaming entry source (C8).

use lber::common::TagClass;
use lber::structure::{DecodeError, StructureTag, PL};
use lber::structures::{ASNTag, Boolean, Integer, OctetString, Sequence, Tag};
use lber::write::encode;

use crate::filter::{Filter, MatchingRuleAssertion, SubstringComponent};
use crate::filter::{
    AND_FILT, APPROX_MATCH, EQ_MATCH, EXT_MATCH, GTE_MATCH, LTE_MATCH, NOT_FILT, OR_FILT, PRES_MATCH,
    SUBSTR_MATCH, SUB_ANY, SUB_FINAL, SUB_INITIAL,
};
use crate::result::{LdapError, LdapResult, Result};

/// Search scope (RFC 4511 §4.5.1.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Base = 0,
    OneLevel = 1,
    Subtree = 2,
}

impl Scope {
    pub fn from_i64(v: i64) -> Option<Scope> {
        match v {
            0 => Some(Scope::Base),
            1 => Some(Scope::OneLevel),
            2 => Some(Scope::Subtree),
            _ => None,
        }
    }
}

/// Alias dereferencing policy (RFC 4511 §4.5.1.3). This engine has no alias entries
/// (see Non-goals), so the value is accepted and echoed but never changes behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObject = 2,
    Always = 3,
}

impl DerefAliases {
    pub fn from_i64(v: i64) -> Option<DerefAliases> {
        match v {
            0 => Some(DerefAliases::Never),
            1 => Some(DerefAliases::InSearching),
            2 => Some(DerefAliases::FindingBaseObject),
            3 => Some(DerefAliases::Always),
            _ => None,
        }
    }
}

/// A fully decoded `SearchRequest`.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub deref: DerefAliases,
    pub size_limit: i32,
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

/// One entry or referral in a search response, prior to the terminating `LdapResult`.
#[derive(Clone, Debug)]
pub enum ResultEntry {
    Entry(SearchEntry),
    Referral(Vec<String>),
}

/// A decoded `SearchResultEntry`: its DN and its attributes, in wire order.
#[derive(Clone, Debug, Default)]
pub struct SearchEntry {
    pub dn: String,
    pub attrs: Vec<(String, Vec<Vec<u8>>)>,
}

impl SearchEntry {
    pub fn from_tag(tag: StructureTag) -> Option<SearchEntry> {
        let mut children = tag.expect_constructed()?.into_iter();
        let dn = String::from_utf8(children.next()?.expect_primitive()?).ok()?;
        let attr_seq = children.next()?.expect_constructed().unwrap_or_default();
        let mut attrs = Vec::new();
        for pair in attr_seq {
            let mut parts = pair.expect_constructed()?.into_iter();
            let name = String::from_utf8(parts.next()?.expect_primitive()?).ok()?;
            let vals = parts
                .next()?
                .expect_constructed()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| v.expect_primitive())
                .collect();
            attrs.push((name, vals));
        }
        Some(SearchEntry { dn, attrs })
    }

    pub fn to_entry(&self, schema: &crate::schema::Schema) -> Result<crate::entry::Entry> {
        let dn = crate::dn::Dn::parse(&self.dn)?;
        let mut entry = crate::entry::Entry::new(dn);
        for (name, vals) in &self.attrs {
            let rule = schema.equality_rule(name);
            entry.add_values(name, vals.clone(), rule)?;
        }
        Ok(entry)
    }
}

impl From<&crate::entry::Entry> for SearchEntry {
    fn from(entry: &crate::entry::Entry) -> SearchEntry {
        SearchEntry {
            dn: entry.dn.to_string(),
            attrs: entry.attributes().map(|(n, v)| (n.to_owned(), v.0.clone())).collect(),
        }
    }
}

/// Build the APPLICATION(4) `SearchResultEntry` tag for `entry`, selecting only
/// `attributes` (empty means all user attributes).
pub fn encode_search_entry(entry: &SearchEntry, attributes: &[String]) -> StructureTag {
    let select_all = attributes.is_empty();
    let attr_children: Vec<StructureTag> = entry
        .attrs
        .iter()
        .filter(|(name, _)| select_all || attributes.iter().any(|a| a.eq_ignore_ascii_case(name)))
        .map(|(name, vals)| {
            StructureTag {
                class: TagClass::Universal,
                id: 16,
                payload: PL::C(vec![
                    Tag::OctetString(OctetString { inner: name.clone().into_bytes(), ..Default::default() }).into_structure(),
                    StructureTag {
                        class: TagClass::Universal,
                        id: 17,
                        payload: PL::C(vals
                            .iter()
                            .map(|v| Tag::OctetString(OctetString { inner: v.clone(), ..Default::default() }).into_structure())
                            .collect()),
                    },
                ]),
            }
        })
        .collect();
    StructureTag {
        class: TagClass::Application,
        id: 4,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: entry.dn.clone().into_bytes(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(attr_children) },
        ]),
    }
}

/// Build the APPLICATION(5) `SearchResultDone` tag terminating a search response
/// sequence, for the server's reader loop.
pub fn encode_search_result_done(result: &LdapResult) -> StructureTag {
    crate::result::encode_ldap_result(5, result)
}

/// Build the APPLICATION(19) `SearchResultReference` tag for one continuation
/// reference, for the server's reader loop.
pub fn encode_search_reference(urls: &[String]) -> StructureTag {
    StructureTag {
        class: TagClass::Application,
        id: 19,
        payload: PL::C(
            urls.iter()
                .map(|u| Tag::OctetString(OctetString { inner: u.clone().into_bytes(), ..Default::default() }).into_structure())
                .collect(),
        ),
    }
}

/// Encode the attribute selector list used both by a Search request's `attributes`
/// field and by the Pre-/Post-Read controls' value.
pub fn encode_attribute_selector(attrs: &[String]) -> Vec<u8> {
    let inner = attrs
        .iter()
        .map(|a| Tag::OctetString(OctetString { inner: a.clone().into_bytes(), ..Default::default() }))
        .collect();
    encode(Tag::Sequence(Sequence { inner, ..Default::default() }))
}

/// Decode an attribute selector list back out of a Pre-/Post-Read control's value (the
/// inverse of [`encode_attribute_selector`]), for the server's control preprocessing.
pub fn decode_attribute_selector(val: &[u8]) -> Vec<String> {
    let Ok((_, tag)) = lber::parse::parse_tag(val) else { return Vec::new() };
    tag.expect_constructed()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.expect_primitive())
        .filter_map(|b| String::from_utf8(b).ok())
        .collect()
}

/// Build a standalone BER encoding of a filter (used by the Assertion control, whose
/// value IS a `Filter`, RFC 4528 §3).
pub fn encode_filter(filter: &Filter) -> Vec<u8> {
    let mut buf = Vec::new();
    lber::write::encode_into(&mut buf, Tag::StructureTag(encode_filter_tag(filter)));
    buf
}

/// Build the context-tagged `StructureTag` for one `Filter` CHOICE arm.
pub fn encode_filter_tag(filter: &Filter) -> StructureTag {
    match filter {
        Filter::And(fs) => StructureTag {
            class: TagClass::Context,
            id: AND_FILT,
            payload: PL::C(fs.iter().map(encode_filter_tag).collect()),
        },
        Filter::Or(fs) => StructureTag {
            class: TagClass::Context,
            id: OR_FILT,
            payload: PL::C(fs.iter().map(encode_filter_tag).collect()),
        },
        Filter::Not(f) => StructureTag {
            class: TagClass::Context,
            id: NOT_FILT,
            payload: PL::C(vec![encode_filter_tag(f)]),
        },
        Filter::EqualityMatch(attr, val) => av_pair_tag(EQ_MATCH, attr, val),
        Filter::GreaterOrEqual(attr, val) => av_pair_tag(GTE_MATCH, attr, val),
        Filter::LessOrEqual(attr, val) => av_pair_tag(LTE_MATCH, attr, val),
        Filter::ApproxMatch(attr, val) => av_pair_tag(APPROX_MATCH, attr, val),
        Filter::Present(attr) => StructureTag {
            class: TagClass::Context,
            id: PRES_MATCH,
            payload: PL::P(attr.clone().into_bytes()),
        },
        Filter::Substrings(attr, comps) => substrings_tag(attr, comps),
        Filter::ExtensibleMatch(mra) => extensible_tag(mra),
    }
}

fn av_pair_tag(id: u64, attr: &str, val: &[u8]) -> StructureTag {
    StructureTag {
        class: TagClass::Context,
        id,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: attr.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            Tag::OctetString(OctetString { inner: val.to_vec(), ..Default::default() }).into_structure(),
        ]),
    }
}

fn substrings_tag(attr: &str, comps: &[SubstringComponent]) -> StructureTag {
    let children: Vec<StructureTag> = comps
        .iter()
        .map(|c| {
            let (id, v) = match c {
                SubstringComponent::Initial(v) => (SUB_INITIAL, v),
                SubstringComponent::Any(v) => (SUB_ANY, v),
                SubstringComponent::Final(v) => (SUB_FINAL, v),
            };
            StructureTag { class: TagClass::Context, id, payload: PL::P(v.clone()) }
        })
        .collect();
    StructureTag {
        class: TagClass::Context,
        id: SUBSTR_MATCH,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: attr.as_bytes().to_vec(), ..Default::default() }).into_structure(),
            StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(children) },
        ]),
    }
}

fn extensible_tag(mra: &MatchingRuleAssertion) -> StructureTag {
    let mut children = Vec::new();
    if let Some(rule) = &mra.rule {
        children.push(StructureTag { class: TagClass::Context, id: 1, payload: PL::P(rule.clone().into_bytes()) });
    }
    if let Some(attr) = &mra.attr {
        children.push(StructureTag { class: TagClass::Context, id: 2, payload: PL::P(attr.clone().into_bytes()) });
    }
    children.push(StructureTag { class: TagClass::Context, id: 3, payload: PL::P(mra.value.clone()) });
    if mra.dn_attributes {
        children.push(StructureTag {
            class: TagClass::Context,
            id: 4,
            payload: PL::P(vec![0xff]),
        });
    }
    StructureTag { class: TagClass::Context, id: EXT_MATCH, payload: PL::C(children) }
}

/// Decode a `Filter` CHOICE tag back into [`Filter`].
pub fn decode_filter_tag(tag: StructureTag) -> std::result::Result<Filter, DecodeError> {
    let id = tag.id;
    let err = |msg: &str| DecodeError::new(format!("malformed filter: {}", msg), 0);
    match id {
        AND_FILT => Ok(Filter::And(
            tag.expect_constructed().ok_or_else(|| err("AND not constructed"))?
                .into_iter()
                .map(decode_filter_tag)
                .collect::<std::result::Result<_, _>>()?,
        )),
        OR_FILT => Ok(Filter::Or(
            tag.expect_constructed().ok_or_else(|| err("OR not constructed"))?
                .into_iter()
                .map(decode_filter_tag)
                .collect::<std::result::Result<_, _>>()?,
        )),
        NOT_FILT => {
            let mut children = tag.expect_constructed().ok_or_else(|| err("NOT not constructed"))?.into_iter();
            let inner = children.next().ok_or_else(|| err("NOT missing operand"))?;
            Ok(Filter::Not(Box::new(decode_filter_tag(inner)?)))
        }
        PRES_MATCH => {
            let attr = tag.expect_primitive().ok_or_else(|| err("present not primitive"))?;
            Ok(Filter::Present(String::from_utf8(attr).map_err(|_| err("non-UTF8 attr"))?))
        }
        EQ_MATCH | GTE_MATCH | LTE_MATCH | APPROX_MATCH => {
            let (attr, val) = av_pair(tag)?;
            Ok(match id {
                EQ_MATCH => Filter::EqualityMatch(attr, val),
                GTE_MATCH => Filter::GreaterOrEqual(attr, val),
                LTE_MATCH => Filter::LessOrEqual(attr, val),
                _ => Filter::ApproxMatch(attr, val),
            })
        }
        SUBSTR_MATCH => decode_substrings(tag),
        EXT_MATCH => decode_extensible(tag),
        _ => Err(err("unknown filter choice")),
    }
}

fn av_pair(tag: StructureTag) -> std::result::Result<(String, Vec<u8>), DecodeError> {
    let mut children = tag.expect_constructed().ok_or_else(|| DecodeError::new("av pair not constructed", 0))?.into_iter();
    let attr = children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing attr", 0))?;
    let val = children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing value", 0))?;
    Ok((String::from_utf8(attr).map_err(|_| DecodeError::new("non-UTF8 attr", 0))?, val))
}

fn decode_substrings(tag: StructureTag) -> std::result::Result<Filter, DecodeError> {
    let mut children = tag.expect_constructed().ok_or_else(|| DecodeError::new("substrings not constructed", 0))?.into_iter();
    let attr = children.next().and_then(|t| t.expect_primitive()).ok_or_else(|| DecodeError::new("missing attr", 0))?;
    let attr = String::from_utf8(attr).map_err(|_| DecodeError::new("non-UTF8 attr", 0))?;
    let comp_seq = children.next().and_then(|t| t.expect_constructed()).unwrap_or_default();
    let mut comps = Vec::new();
    for c in comp_seq {
        let id = c.id;
        let bytes = c.expect_primitive().ok_or_else(|| DecodeError::new("substring component not primitive", 0))?;
        comps.push(match id {
            SUB_INITIAL => SubstringComponent::Initial(bytes),
            SUB_ANY => SubstringComponent::Any(bytes),
            SUB_FINAL => SubstringComponent::Final(bytes),
            _ => return Err(DecodeError::new("unknown substring component", 0)),
        });
    }
    Ok(Filter::Substrings(attr, comps))
}

fn decode_extensible(tag: StructureTag) -> std::result::Result<Filter, DecodeError> {
    let children = tag.expect_constructed().ok_or_else(|| DecodeError::new("extensible not constructed", 0))?;
    let mut mra = MatchingRuleAssertion::default();
    for c in children {
        match c.id {
            1 => mra.rule = c.expect_primitive().and_then(|b| String::from_utf8(b).ok()),
            2 => mra.attr = c.expect_primitive().and_then(|b| String::from_utf8(b).ok()),
            3 => mra.value = c.expect_primitive().unwrap_or_default(),
            4 => mra.dn_attributes = c.expect_primitive().map(|b| b.first() == Some(&0xff)).unwrap_or(false),
            _ => {}
        }
    }
    Ok(Filter::ExtensibleMatch(mra))
}

/// Build the APPLICATION(3) `SearchRequest` tag.
pub fn encode_search_request(req: &SearchRequest) -> StructureTag {
    let attrs: Vec<StructureTag> = req
        .attributes
        .iter()
        .map(|a| Tag::OctetString(OctetString { inner: a.clone().into_bytes(), ..Default::default() }).into_structure())
        .collect();
    StructureTag {
        class: TagClass::Application,
        id: 3,
        payload: PL::C(vec![
            Tag::OctetString(OctetString { inner: req.base.clone().into_bytes(), ..Default::default() }).into_structure(),
            Tag::Enumerated(lber::structures::Enumerated { inner: req.scope as i64, ..Default::default() }).into_structure(),
            Tag::Enumerated(lber::structures::Enumerated { inner: req.deref as i64, ..Default::default() }).into_structure(),
            Tag::Integer(Integer { inner: req.size_limit as i64, ..Default::default() }).into_structure(),
            Tag::Integer(Integer { inner: req.time_limit as i64, ..Default::default() }).into_structure(),
            Tag::Boolean(Boolean { inner: req.types_only, ..Default::default() }).into_structure(),
            encode_filter_tag(&req.filter),
            StructureTag { class: TagClass::Universal, id: 16, payload: PL::C(attrs) },
        ]),
    }
}

/// Decode an APPLICATION(3) `SearchRequest` tag.
pub fn decode_search_request(tag: StructureTag) -> Result<SearchRequest> {
    let mut c = tag
        .expect_constructed()
        .ok_or_else(|| LdapError::Decode(DecodeError::new("SearchRequest not constructed", 0)))?
        .into_iter();
    let next_primitive = |c: &mut std::vec::IntoIter<StructureTag>| -> Option<Vec<u8>> { c.next()?.expect_primitive() };
    let base = String::from_utf8(next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing base", 0)))?)
        .map_err(|_| LdapError::Decode(DecodeError::new("non-UTF8 base", 0)))?;
    let (_, scope_i) = lber::parse::parse_int(&next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing scope", 0)))?)
        .map_err(|_| LdapError::Decode(DecodeError::new("malformed scope", 0)))?;
    let scope = Scope::from_i64(scope_i).ok_or_else(|| LdapError::Decode(DecodeError::new("invalid scope", 0)))?;
    let (_, deref_i) = lber::parse::parse_int(&next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing deref", 0)))?)
        .map_err(|_| LdapError::Decode(DecodeError::new("malformed deref", 0)))?;
    let deref = DerefAliases::from_i64(deref_i).ok_or_else(|| LdapError::Decode(DecodeError::new("invalid deref", 0)))?;
    let (_, size_limit) = lber::parse::parse_int(&next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing sizeLimit", 0)))?)
        .map_err(|_| LdapError::Decode(DecodeError::new("malformed sizeLimit", 0)))?;
    let (_, time_limit) = lber::parse::parse_int(&next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing timeLimit", 0)))?)
        .map_err(|_| LdapError::Decode(DecodeError::new("malformed timeLimit", 0)))?;
    let types_only = next_primitive(&mut c).ok_or_else(|| LdapError::Decode(DecodeError::new("missing typesOnly", 0)))?
        .first()
        .map(|b| *b != 0)
        .unwrap_or(false);
    let filter_tag = c.next().ok_or_else(|| LdapError::Decode(DecodeError::new("missing filter", 0)))?;
    let filter = decode_filter_tag(filter_tag)?;
    let attributes = c
        .next()
        .and_then(|t| t.expect_constructed())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.expect_primitive())
        .filter_map(|b| String::from_utf8(b).ok())
        .collect();
    Ok(SearchRequest {
        base,
        scope,
        deref,
        size_limit: size_limit as i32,
        time_limit: time_limit as i32,
        types_only,
        filter,
        attributes,
    })
}

/// A bounded-capacity async stream of search results (C8): the sender (the client
/// dispatcher, for a streaming search) blocks once `capacity` results are buffered and
/// unconsumed, providing back-pressure against a slow consumer without unbounded memory
/// growth.
pub struct EntryStream {
    rx: tokio::sync::mpsc::Receiver<ResultEntry>,
    done_rx: tokio::sync::oneshot::Receiver<LdapResult>,
    result: Option<LdapResult>,
}

impl EntryStream {
    pub fn channel(capacity: usize) -> (EntryStreamSender, EntryStream) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        (EntryStreamSender { tx, done_tx: Some(done_tx) }, EntryStream { rx, done_rx, result: None })
    }

    /// Pull the next entry or referral, or `None` once the search is complete. After
    /// `None` is returned, [`EntryStream::finish`] yields the terminating result.
    pub async fn next(&mut self) -> Option<ResultEntry> {
        self.rx.recv().await
    }

    /// The final `LdapResult`, available only after `next()` has returned `None`.
    pub async fn finish(mut self) -> Result<LdapResult> {
        if let Some(r) = self.result.take() {
            return Ok(r);
        }
        self.done_rx.await.map_err(|_| LdapError::ConnectionClosed)
    }
}

/// The producer half of an [`EntryStream`], held by the dispatcher while a streaming
/// search is outstanding.
pub struct EntryStreamSender {
    tx: tokio::sync::mpsc::Sender<ResultEntry>,
    done_tx: Option<tokio::sync::oneshot::Sender<LdapResult>>,
}

impl EntryStreamSender {
    /// Enqueue an entry, waiting for buffer space if the consumer is behind.
    pub async fn send(&self, entry: ResultEntry) -> bool {
        self.tx.send(entry).await.is_ok()
    }

    /// Deliver the terminating result and close the stream.
    pub fn finish(mut self, result: LdapResult) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn filter_tag_round_trips_equality() {
        let f = Filter::EqualityMatch("cn".to_owned(), b"Alice".to_vec());
        let tag = encode_filter_tag(&f);
        let decoded = decode_filter_tag(tag).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn filter_tag_round_trips_and_or_not() {
        let f = Filter::And(vec![
            Filter::Present("cn".to_owned()),
            Filter::Not(Box::new(Filter::EqualityMatch("sn".to_owned(), b"X".to_vec()))),
        ]);
        let tag = encode_filter_tag(&f);
        let decoded = decode_filter_tag(tag).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn filter_tag_round_trips_substrings() {
        let f = Filter::Substrings(
            "cn".to_owned(),
            vec![SubstringComponent::Initial(b"Al".to_vec()), SubstringComponent::Any(b"i".to_vec()), SubstringComponent::Final(b"ce".to_vec())],
        );
        let tag = encode_filter_tag(&f);
        let decoded = decode_filter_tag(tag).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn filter_tag_round_trips_extensible() {
        let f = Filter::ExtensibleMatch(MatchingRuleAssertion {
            rule: Some("caseExactMatch".to_owned()),
            attr: Some("cn".to_owned()),
            value: b"Alice".to_vec(),
            dn_attributes: true,
        });
        let tag = encode_filter_tag(&f);
        let decoded = decode_filter_tag(tag).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn search_request_round_trips() {
        let req = SearchRequest {
            base: "dc=example,dc=com".to_owned(),
            scope: Scope::Subtree,
            deref: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: Filter::Present("objectClass".to_owned()),
            attributes: vec!["cn".to_owned(), "sn".to_owned()],
        };
        let tag = encode_search_request(&req);
        let decoded = decode_search_request(tag).unwrap();
        assert_eq!(decoded.base, req.base);
        assert_eq!(decoded.scope, Scope::Subtree);
        assert_eq!(decoded.attributes, req.attributes);
    }

    #[test]
    fn search_entry_round_trips_through_tag() {
        let entry = SearchEntry { dn: "cn=Alice,dc=example,dc=com".to_owned(), attrs: vec![("cn".to_owned(), vec![b"Alice".to_vec()])] };
        let tag = encode_search_entry(&entry, &[]);
        let decoded = SearchEntry::from_tag(tag).unwrap();
        assert_eq!(decoded.dn, entry.dn);
        assert_eq!(decoded.attrs, entry.attrs);
    }

    #[test]
    fn search_entry_attribute_selection_filters() {
        let entry = SearchEntry {
            dn: "cn=Alice,dc=example,dc=com".to_owned(),
            attrs: vec![("cn".to_owned(), vec![b"Alice".to_vec()]), ("sn".to_owned(), vec![b"Smith".to_vec()])],
        };
        let tag = encode_search_entry(&entry, &["cn".to_owned()]);
        let decoded = SearchEntry::from_tag(tag).unwrap();
        assert_eq!(decoded.attrs.len(), 1);
        assert_eq!(decoded.attrs[0].0, "cn");
    }

    #[test]
    fn search_result_done_carries_result_code() {
        let result = LdapResult::success_result(crate::result::ResultCode::Success);
        let tag = encode_search_result_done(&result);
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 5);
    }

    #[test]
    fn search_reference_wraps_urls() {
        let tag = encode_search_reference(&["ldap://other.example.com/dc=example,dc=com".to_owned()]);
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 19);
        assert_eq!(tag.expect_constructed().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entry_stream_delivers_entries_then_result() {
        let (tx, mut stream) = EntryStream::channel(2);
        tx.send(ResultEntry::Entry(SearchEntry::default())).await;
        tx.finish(LdapResult::default());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert!(stream.finish().await.unwrap().is_success());
    }
}

//! Listener + per-connection reader loop (C9): accepts TCP connections, frames each one
//! with the same [`LdapCodec`] the client dispatcher (C7) drives, and runs each
//! connection through a sequential read-dispatch-respond loop against a shared
//! [`Directory`] (C10). One request is always carried to completion — response written
//! and flushed — before the next is read off the same connection; two connections never
//! share a task, so a slow or malicious client stalls only itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use lber::structure::StructureTag;
use lber::structures::{ASNTag, Integer, Sequence, Tag};
use lber::write::encode;

use crate::abandon::decode_abandon_request;
use crate::add::{decode_add_request, encode_add_response};
use crate::bind::{decode_bind_request, encode_bind_response};
use crate::compare::{decode_compare_request, encode_compare_response};
use crate::conn::BoxedStream;
use crate::controls::{encode_controls, RawControl};
use crate::delete::{decode_delete_request, encode_delete_response};
use crate::dn::Dn;
use crate::extended::{decode_extended_request, encode_extended_response};
use crate::modify::{decode_modify_request, encode_modify_response};
use crate::modifydn::{decode_modifydn_request, encode_modifydn_response};
use crate::protocol::{LdapCodec, LdapMessage};
use crate::result::{LdapError, LdapResult, Result, ResultCode};
use crate::search::{decode_search_request, encode_search_entry, encode_search_reference, encode_search_result_done, ResultEntry};
use crate::server::controls::preprocess;
use crate::server::directory::{BoundIdentity, Directory};
use crate::server::exop::{self, ExopOutcome};

#[cfg(feature = "tls-native")]
type TlsAcceptor = Arc<tokio_native_tls::TlsAcceptor>;
#[cfg(not(feature = "tls-native"))]
type TlsAcceptor = ();

/// Listener configuration: the BER length cap every accepted connection's codec
/// enforces, and (behind the `tls-native` feature) the acceptor StartTLS upgrades use.
pub struct ListenerSettings {
    pub max_message_len: u64,
    pub tls_acceptor: Option<TlsAcceptor>,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        ListenerSettings { max_message_len: lber::parse::MAX_BER_LENGTH, tls_acceptor: None }
    }
}

/// Accepts connections on one TCP socket and serves each against a shared [`Directory`].
pub struct Listener {
    tcp: TcpListener,
    directory: Arc<Directory>,
    settings: ListenerSettings,
}

impl Listener {
    pub async fn bind(addr: &str, directory: Arc<Directory>) -> Result<Listener> {
        Self::bind_with_settings(addr, directory, ListenerSettings::default()).await
    }

    pub async fn bind_with_settings(addr: &str, directory: Arc<Directory>, settings: ListenerSettings) -> Result<Listener> {
        let tcp = TcpListener::bind(addr).await?;
        Ok(Listener { tcp, directory, settings })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept connections until the socket itself errors, spawning one task per
    /// connection so they run fully independently of one another.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = self.tcp.accept().await?;
            let _ = stream.set_nodelay(true);
            let directory = self.directory.clone();
            let tls_acceptor = clone_tls_acceptor(&self.settings.tls_acceptor);
            let max_message_len = self.settings.max_message_len;
            tokio::spawn(async move {
                if let Err(e) = run_connection(stream, directory, max_message_len, tls_acceptor).await {
                    log::debug!("connection from {peer} ended: {e}");
                }
            });
        }
    }
}

#[cfg(feature = "tls-native")]
fn clone_tls_acceptor(a: &Option<TlsAcceptor>) -> Option<TlsAcceptor> {
    a.clone()
}

#[cfg(not(feature = "tls-native"))]
fn clone_tls_acceptor(_a: &Option<TlsAcceptor>) -> Option<TlsAcceptor> {
    None
}

/// What a fully-dispatched request should cause the reader loop to do next.
enum Action {
    /// Send one response PDU carrying these response controls.
    Respond(StructureTag, Vec<RawControl>),
    /// Send the response, then (only if it is a success response) upgrade the
    /// transport to TLS in place.
    RespondThenStartTls(StructureTag, Vec<RawControl>),
    /// Send each intermediate entry/reference PDU, then the terminating
    /// `SearchResultDone` carrying the response controls.
    SearchResponse(Vec<StructureTag>, StructureTag, Vec<RawControl>),
    /// No response is ever sent for this request (Abandon).
    Ignore,
    /// Close the connection without a response (Unbind, or anything this server
    /// cannot safely keep reading past).
    Close,
}

fn response_controls(result: &LdapResult) -> Vec<RawControl> {
    result.ctrls.iter().map(|c| c.raw().clone()).collect()
}

async fn dispatch_request(
    directory: &Directory,
    bound: &mut BoundIdentity,
    vars: &mut HashMap<String, String>,
    op: StructureTag,
    controls: Vec<crate::controls::Control>,
    tls_available: bool,
) -> Action {
    match op.id {
        0 => match decode_bind_request(op) {
            Ok(req) => {
                let (result, new_bound) = directory.handle_bind(req);
                *bound = new_bound;
                Action::Respond(encode_bind_response(&result), response_controls(&result))
            }
            Err(_) => Action::Respond(encode_bind_response(&LdapResult::error(ResultCode::ProtocolError, "malformed BindRequest")), vec![]),
        },
        2 => Action::Close,
        3 => {
            let req = match decode_search_request(op) {
                Ok(r) => r,
                Err(_) => {
                    let result = LdapResult::error(ResultCode::ProtocolError, "malformed SearchRequest");
                    return Action::SearchResponse(Vec::new(), encode_search_result_done(&result), vec![]);
                }
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::SearchResponse(Vec::new(), encode_search_result_done(&result), response_controls(&result)),
            };
            let (entries, result) = directory.handle_search(req, &ctrls);
            let pdus = entries
                .into_iter()
                .map(|e| match e {
                    ResultEntry::Entry(se) => encode_search_entry(&se, &[]),
                    ResultEntry::Referral(urls) => encode_search_reference(&urls),
                })
                .collect();
            Action::SearchResponse(pdus, encode_search_result_done(&result), response_controls(&result))
        }
        6 => {
            let (dn_str, mods) = match decode_modify_request(op) {
                Ok(v) => v,
                Err(_) => return Action::Respond(encode_modify_response(&LdapResult::error(ResultCode::ProtocolError, "malformed ModifyRequest")), vec![]),
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::Respond(encode_modify_response(&result), response_controls(&result)),
            };
            let result = match Dn::parse(&dn_str) {
                Ok(dn) => directory.handle_modify(dn, mods, bound.as_ref(), &ctrls),
                Err(_) => LdapResult::error(ResultCode::InvalidDnSyntax, "malformed object DN"),
            };
            Action::Respond(encode_modify_response(&result), response_controls(&result))
        }
        8 => {
            let (dn_str, attrs) = match decode_add_request(op) {
                Ok(v) => v,
                Err(_) => return Action::Respond(encode_add_response(&LdapResult::error(ResultCode::ProtocolError, "malformed AddRequest")), vec![]),
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::Respond(encode_add_response(&result), response_controls(&result)),
            };
            let result = match Dn::parse(&dn_str) {
                Ok(dn) => directory.handle_add(dn, attrs, bound.as_ref(), &ctrls),
                Err(_) => LdapResult::error(ResultCode::InvalidDnSyntax, "malformed entry DN"),
            };
            Action::Respond(encode_add_response(&result), response_controls(&result))
        }
        10 => {
            let dn_str = match decode_delete_request(op) {
                Ok(v) => v,
                Err(_) => return Action::Respond(encode_delete_response(&LdapResult::error(ResultCode::ProtocolError, "malformed DelRequest")), vec![]),
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::Respond(encode_delete_response(&result), response_controls(&result)),
            };
            let result = match Dn::parse(&dn_str) {
                Ok(dn) => directory.handle_delete(dn, &ctrls),
                Err(_) => LdapResult::error(ResultCode::InvalidDnSyntax, "malformed entry DN"),
            };
            Action::Respond(encode_delete_response(&result), response_controls(&result))
        }
        12 => {
            let req = match decode_modifydn_request(op) {
                Ok(v) => v,
                Err(_) => return Action::Respond(encode_modifydn_response(&LdapResult::error(ResultCode::ProtocolError, "malformed ModDNRequest")), vec![]),
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::Respond(encode_modifydn_response(&result), response_controls(&result)),
            };
            let result = match Dn::parse(&req.dn) {
                Ok(dn) => directory.handle_modifydn(dn, req.new_rdn, req.delete_old_rdn, req.new_superior, &ctrls),
                Err(_) => LdapResult::error(ResultCode::InvalidDnSyntax, "malformed entry DN"),
            };
            Action::Respond(encode_modifydn_response(&result), response_controls(&result))
        }
        14 => {
            let (dn_str, attr, value) = match decode_compare_request(op) {
                Ok(v) => v,
                Err(_) => return Action::Respond(encode_compare_response(&LdapResult::error(ResultCode::ProtocolError, "malformed CompareRequest")), vec![]),
            };
            let ctrls = match preprocess(&controls) {
                Ok(c) => c,
                Err(result) => return Action::Respond(encode_compare_response(&result), response_controls(&result)),
            };
            let result = match Dn::parse(&dn_str) {
                Ok(dn) => directory.handle_compare(dn, attr, value, &ctrls),
                Err(_) => LdapResult::error(ResultCode::InvalidDnSyntax, "malformed entry DN"),
            };
            Action::Respond(encode_compare_response(&result), response_controls(&result))
        }
        16 => {
            let _ = decode_abandon_request(op);
            // This engine carries one request to completion before reading the next
            // (see the module doc comment), so there is never an outstanding
            // operation left for an Abandon to act on.
            Action::Ignore
        }
        23 => {
            let exop_req = match decode_extended_request(op) {
                Ok(e) => e,
                Err(_) => {
                    return Action::Respond(
                        encode_extended_response(&LdapResult::error(ResultCode::ProtocolError, "malformed ExtendedRequest"), &crate::exop::Exop::default()),
                        vec![],
                    )
                }
            };
            let (outcome, result, response_exop) = exop::dispatch(directory, bound.as_ref(), vars, exop_req);
            match outcome {
                ExopOutcome::Respond => {
                    let tag = encode_extended_response(&result, &response_exop);
                    Action::Respond(tag, response_controls(&result))
                }
                ExopOutcome::StartTls if tls_available => {
                    let tag = encode_extended_response(&result, &response_exop);
                    Action::RespondThenStartTls(tag, response_controls(&result))
                }
                ExopOutcome::StartTls => {
                    vars.remove("tls");
                    let result = LdapResult::error(ResultCode::Unavailable, "this listener does not support STARTTLS");
                    let tag = encode_extended_response(&result, &crate::exop::Exop::default());
                    Action::Respond(tag, response_controls(&result))
                }
            }
        }
        _ => {
            log::warn!("unrecognized protocolOp tag {}, closing connection", op.id);
            Action::Close
        }
    }
}

async fn send_pdu(framed: &mut Framed<BoxedStream, LdapCodec>, id: i32, op: StructureTag, controls: &[RawControl]) -> Result<()> {
    let mut inner = vec![Tag::Integer(Integer { inner: id as i64, ..Default::default() }), Tag::StructureTag(op)];
    if let Some(ctrl_tag) = encode_controls(controls) {
        inner.push(Tag::StructureTag(ctrl_tag));
    }
    let bytes = encode(Tag::Sequence(Sequence { inner, ..Default::default() }));
    framed.send(bytes).await?;
    Ok(())
}

#[cfg(feature = "tls-native")]
async fn upgrade_tls(framed: Framed<BoxedStream, LdapCodec>, acceptor: &TlsAcceptor, max_message_len: u64) -> Option<Framed<BoxedStream, LdapCodec>> {
    let stream = framed.into_inner();
    match acceptor.accept(stream).await {
        Ok(tls_stream) => Some(Framed::new(BoxedStream(Box::pin(tls_stream)), LdapCodec::with_max_message_len(max_message_len))),
        Err(e) => {
            log::warn!("StartTLS upgrade failed: {e}");
            None
        }
    }
}

#[cfg(not(feature = "tls-native"))]
async fn upgrade_tls(_framed: Framed<BoxedStream, LdapCodec>, _acceptor: &TlsAcceptor, _max_message_len: u64) -> Option<Framed<BoxedStream, LdapCodec>> {
    None
}

async fn run_connection(stream: TcpStream, directory: Arc<Directory>, max_message_len: u64, tls_acceptor: Option<TlsAcceptor>) -> Result<()> {
    let mut framed = Framed::new(BoxedStream(Box::pin(stream)), LdapCodec::with_max_message_len(max_message_len));
    let mut bound: BoundIdentity = None;
    let mut vars: HashMap<String, String> = HashMap::new();
    loop {
        let tag = match framed.next().await {
            None => return Ok(()),
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                log::warn!("malformed LDAP framing, closing connection: {e}");
                return Ok(());
            }
        };
        let msg = match LdapMessage::from_structure(tag) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("malformed LDAPMessage, closing connection: {e}");
                return Ok(());
            }
        };
        if msg.op.class != lber::common::TagClass::Application {
            log::warn!("protocolOp not APPLICATION-tagged, closing connection");
            return Ok(());
        }
        let id = msg.id;
        let tls_available = tls_acceptor.is_some();
        match dispatch_request(&directory, &mut bound, &mut vars, msg.op, msg.controls, tls_available).await {
            Action::Close => return Ok(()),
            Action::Ignore => {}
            Action::Respond(op, ctrls) => send_pdu(&mut framed, id, op, &ctrls).await?,
            Action::RespondThenStartTls(op, ctrls) => {
                // exop::dispatch only returns this outcome on the success path (an
                // already-upgraded connection gets a plain Respond with an error), so
                // the upgrade is unconditional here.
                send_pdu(&mut framed, id, op, &ctrls).await?;
                if let Some(ref acceptor) = tls_acceptor {
                    match upgrade_tls(framed, acceptor, max_message_len).await {
                        Some(f) => framed = f,
                        None => return Ok(()),
                    }
                }
            }
            Action::SearchResponse(entries, done, ctrls) => {
                for entry in entries {
                    send_pdu(&mut framed, id, entry, &[]).await?;
                }
                send_pdu(&mut framed, id, done, &ctrls).await?;
            }
        }
    }
}

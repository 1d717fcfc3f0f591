//! Client connection + async dispatcher (C7).
//!
//! A connection is a full-duplex channel to a server: a writer path that allocates a
//! message-id and inserts a handle into an outstanding-request table, and a reader task
//! that reads PDUs in a loop, looks the handle up by message-id, and delivers the
//! response. [`LdapConnAsync`] owns the socket and the table and must be driven (spawned
//! or awaited) for [`Ldap`], the cheaply-`Clone`able handle it's paired with, to make any
//! progress — mirroring the teacher's `conn, ldap` pair returned from `LdapConnAsync::new`.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use url::Url;

use lber::structure::StructureTag;
use lber::structures::{ASNTag, Integer, Sequence, Tag};
use lber::write::encode;

use crate::abandon::abandon_request;
use crate::bind::{decode_bind_response, sasl_external_bind_request, simple_bind_request};
use crate::compare::{compare_request, decode_compare_response};
use crate::controls::{encode_controls, Control, RawControl};
use crate::entry::Modification;
use crate::exop::{Exop, Request};
use crate::extended::{decode_extended_response, encode_extended_request};
use crate::modify::{decode_modify_response, modify_request};
use crate::modifydn::{decode_modifydn_response, modifydn_request};
use crate::protocol::{LdapCodec, LdapMessage};
use crate::rate::RateBarrier;
use crate::result::{CompareResult, ExopResult, LdapError, LdapResult, Result};
use crate::search::{encode_search_request, EntryStream, EntryStreamSender, ResultEntry, SearchEntry, SearchRequest};
use crate::unbind::unbind_request;
use crate::{add, delete};

/// A boxed, object-safe transport: plain TCP, TLS-wrapped TCP, or a Unix domain socket
/// all end up behind this so [`LdapConnAsync`] doesn't need a type parameter per scheme.
/// `pub(crate)` so the server's listener (C9) can reuse it for the same purpose on the
/// accept side.
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub(crate) struct BoxedStream(pub(crate) Pin<Box<dyn AsyncStream>>);

impl AsyncRead for BoxedStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.0.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.as_mut().poll_write(cx, buf)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.as_mut().poll_flush(cx)
    }
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.as_mut().poll_shutdown(cx)
    }
}

/// Connection options (spec.md §4.7): transport tuning plus whether a transport failure
/// should attempt one reconnect before failing every outstanding handle.
#[derive(Clone, Debug)]
pub struct LdapConnSettings {
    pub conn_timeout: Option<Duration>,
    pub no_delay: bool,
    pub auto_reconnect: bool,
    /// Caps how fast this connection's dispatcher sends PDUs (C6); `None` is unlimited.
    pub rate: Option<Arc<RateBarrier>>,
}

impl Default for LdapConnSettings {
    fn default() -> Self {
        LdapConnSettings { conn_timeout: None, no_delay: true, auto_reconnect: false, rate: None }
    }
}

impl LdapConnSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conn_timeout(mut self, d: Duration) -> Self {
        self.conn_timeout = Some(d);
        self
    }

    pub fn with_no_delay(mut self, v: bool) -> Self {
        self.no_delay = v;
        self
    }

    pub fn with_auto_reconnect(mut self, v: bool) -> Self {
        self.auto_reconnect = v;
        self
    }

    pub fn with_rate_barrier(mut self, rate: Arc<RateBarrier>) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// What to reconnect to, retained only so `auto_reconnect` can re-establish the socket.
#[derive(Clone, Debug)]
enum Target {
    Tcp { host: String, port: u16, tls: bool },
    #[cfg(unix)]
    Unix { path: String },
}

async fn connect(target: &Target, settings: &LdapConnSettings) -> Result<Framed<BoxedStream, LdapCodec>> {
    let stream = match target {
        Target::Tcp { host, port, .. } => {
            let addr = format!("{host}:{port}");
            let fut = TcpStream::connect(&addr);
            let stream = match settings.conn_timeout {
                Some(d) => tokio::time::timeout(d, fut)
                    .await
                    .map_err(|_| LdapError::Io(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))??,
                None => fut.await?,
            };
            stream.set_nodelay(settings.no_delay)?;
            BoxedStream(Box::pin(stream))
        }
        #[cfg(unix)]
        Target::Unix { path } => BoxedStream(Box::pin(tokio::net::UnixStream::connect(path).await?)),
    };
    let stream = wrap_tls(target, stream).await?;
    Ok(Framed::new(stream, LdapCodec::new()))
}

#[cfg(feature = "tls-native")]
async fn wrap_tls(target: &Target, stream: BoxedStream) -> Result<BoxedStream> {
    let Target::Tcp { host, tls: true, .. } = target else {
        return Ok(stream);
    };
    let connector =
        tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new().map_err(|e| LdapError::Io(io::Error::new(io::ErrorKind::Other, e)))?);
    let tls_stream = connector.connect(host, stream).await.map_err(|e| LdapError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    Ok(BoxedStream(Box::pin(tls_stream)))
}

#[cfg(not(feature = "tls-native"))]
async fn wrap_tls(target: &Target, stream: BoxedStream) -> Result<BoxedStream> {
    if matches!(target, Target::Tcp { tls: true, .. }) {
        return Err(LdapError::InvalidUrl("ldaps:// requires the \"tls\" feature".to_owned()));
    }
    Ok(stream)
}

fn resolve_url(url: &str) -> Result<Target> {
    let parsed = Url::parse(url).map_err(|e| LdapError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ldap" => {
            let host = parsed.host_str().ok_or_else(|| LdapError::InvalidUrl("missing host".to_owned()))?.to_owned();
            let port = parsed.port().unwrap_or(389);
            Ok(Target::Tcp { host, port, tls: false })
        }
        "ldaps" => {
            let host = parsed.host_str().ok_or_else(|| LdapError::InvalidUrl("missing host".to_owned()))?.to_owned();
            let port = parsed.port().unwrap_or(636);
            Ok(Target::Tcp { host, port, tls: true })
        }
        #[cfg(unix)]
        "ldapi" => {
            let path = percent_encoding::percent_decode_str(parsed.path())
                .decode_utf8()
                .map_err(|e| LdapError::InvalidUrl(e.to_string()))?
                .into_owned();
            Ok(Target::Unix { path })
        }
        other => Err(LdapError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

/// The dispatcher's view of one outstanding request: where to deliver its response(s).
enum Responder {
    Unary(oneshot::Sender<std::result::Result<(StructureTag, Vec<Control>), LdapError>>),
    Search(EntryStreamSender),
}

enum Command {
    Send { id: i32, op: StructureTag, controls: Vec<RawControl>, responder: Responder },
    Abandon { id: i32 },
    Unbind,
}

fn encode_message(id: i32, op: StructureTag, controls: &[RawControl]) -> Vec<u8> {
    let mut inner = vec![Tag::Integer(Integer { inner: id as i64, ..Default::default() }), Tag::StructureTag(op)];
    if let Some(ctrl_tag) = encode_controls(controls) {
        inner.push(Tag::StructureTag(ctrl_tag));
    }
    encode(Tag::Sequence(Sequence { inner, ..Default::default() }))
}

/// The async dispatcher: owns the framed transport and the outstanding-request table.
/// Must be `drive()`n (typically via `tokio::spawn`) for its paired [`Ldap`] handle to
/// make progress.
pub struct LdapConnAsync {
    framed: Framed<BoxedStream, LdapCodec>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    outstanding: HashMap<i32, Responder>,
    settings: LdapConnSettings,
    target: Target,
}

impl LdapConnAsync {
    /// Connect to `url` (`ldap://`, `ldaps://` behind the `tls` feature, or `ldapi://`
    /// on Unix) and return the driver future alongside the cheaply-cloneable handle.
    pub async fn new(url: &str) -> Result<(LdapConnAsync, Ldap)> {
        Self::with_settings(url, LdapConnSettings::default()).await
    }

    pub async fn with_settings(url: &str, settings: LdapConnSettings) -> Result<(LdapConnAsync, Ldap)> {
        let target = resolve_url(url)?;
        let framed = connect(&target, &settings).await?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let next_id = Arc::new(AtomicI32::new(1));
        let conn = LdapConnAsync { framed, cmd_rx, outstanding: HashMap::new(), settings, target };
        let ldap = Ldap { cmd_tx, next_id };
        Ok((conn, ldap))
    }

    /// Drive the connection until every [`Ldap`] handle is dropped or the transport
    /// fails without `auto_reconnect` recovering it. Intended to be handed to
    /// `tokio::spawn`.
    pub async fn drive(mut self) -> Result<()> {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Send { id, op, controls, responder }) => {
                            if let Some(rate) = self.settings.rate.clone() {
                                rate.acquire().await;
                            }
                            let bytes = encode_message(id, op, &controls);
                            self.outstanding.insert(id, responder);
                            if let Err(e) = self.framed.send(bytes).await {
                                let io_err = io::Error::new(io::ErrorKind::Other, e.to_string());
                                self.fail_all(LdapError::server_down(io_err));
                                if self.try_reconnect().await.is_err() {
                                    return Err(LdapError::ConnectionClosed);
                                }
                            }
                        }
                        Some(Command::Abandon { id }) => {
                            self.outstanding.remove(&id);
                            let abandon_id = id.wrapping_add(1).max(1);
                            let bytes = encode_message(abandon_id, abandon_request(id), &[]);
                            let _ = self.framed.send(bytes).await;
                        }
                        Some(Command::Unbind) => {
                            let bytes = encode_message(1, unbind_request(), &[]);
                            let _ = self.framed.send(bytes).await;
                            return Ok(());
                        }
                        None => return Ok(()),
                    }
                }
                item = self.framed.next() => {
                    match item {
                        Some(Ok(tag)) => {
                            if let Err(e) = self.dispatch(tag).await {
                                log::warn!("malformed LDAP PDU, closing connection: {e}");
                                self.fail_all(LdapResult::error(crate::result::ResultCode::ProtocolError, e.to_string()));
                                return Err(LdapError::Decode(e));
                            }
                        }
                        Some(Err(e)) => {
                            log::warn!("malformed LDAP framing, closing connection: {e}");
                            self.fail_all(LdapResult::error(crate::result::ResultCode::ProtocolError, e.to_string()));
                            return Err(LdapError::Decode(e));
                        }
                        None => {
                            let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
                            self.fail_all(LdapError::server_down(io_err));
                            if self.try_reconnect().await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    async fn try_reconnect(&mut self) -> Result<()> {
        if !self.settings.auto_reconnect {
            return Err(LdapError::ConnectionClosed);
        }
        log::debug!("attempting reconnect after transport failure");
        self.framed = connect(&self.target, &self.settings).await?;
        Ok(())
    }

    async fn dispatch(&mut self, tag: StructureTag) -> std::result::Result<(), lber::structure::DecodeError> {
        let msg = LdapMessage::from_structure(tag)?;
        match msg.op.id {
            // SearchResultEntry (3) / SearchResultReference (19): deliver into the
            // streaming responder; the table entry stays until SearchResultDone (4).
            3 | 19 => {
                let entry = if msg.op.id == 3 {
                    SearchEntry::from_tag(msg.op).map(ResultEntry::Entry)
                } else {
                    Some(ResultEntry::Referral(
                        msg.op
                            .expect_constructed()
                            .unwrap_or_default()
                            .into_iter()
                            .filter_map(|t| t.expect_primitive())
                            .map(|b| String::from_utf8_lossy(&b).into_owned())
                            .collect(),
                    ))
                };
                if let Some(entry) = entry {
                    if let Some(Responder::Search(sender)) = self.outstanding.get(&msg.id) {
                        // Blocks here if the consumer is slow, back-pressuring the reader
                        // loop (and so the transport) exactly as spec.md §4.8 describes.
                        sender.send(entry).await;
                    }
                }
            }
            4 => {
                if let Some(Responder::Search(sender)) = self.outstanding.remove(&msg.id) {
                    sender.finish(crate::result::decode_ldap_result(msg.op, msg.controls));
                }
            }
            _ => {
                if let Some(Responder::Unary(tx)) = self.outstanding.remove(&msg.id) {
                    let _ = tx.send(Ok((msg.op, msg.controls)));
                }
            }
        }
        Ok(())
    }

    fn fail_all(&mut self, result: LdapResult) {
        for (_, responder) in self.outstanding.drain() {
            match responder {
                Responder::Unary(tx) => {
                    let _ = tx.send(Err(LdapError::Result(result.clone())));
                }
                Responder::Search(sender) => sender.finish(result.clone()),
            }
        }
    }
}

/// Cheaply-`Clone`able handle to a connection's dispatcher. Every public operation
/// method allocates a message-id, sends a [`Command`] to the paired [`LdapConnAsync`]
/// running in `drive()`, and awaits its response.
#[derive(Clone)]
pub struct Ldap {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicI32>,
}

impl Ldap {
    fn alloc_id(&self) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            self.next_id.store(1, Ordering::Relaxed);
            1
        } else {
            id
        }
    }

    async fn unary(&self, op: StructureTag, controls: Vec<RawControl>) -> Result<(StructureTag, Vec<Control>)> {
        let id = self.alloc_id();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { id, op, controls, responder: Responder::Unary(tx) })
            .map_err(|_| LdapError::ConnectionClosed)?;
        rx.await.map_err(|_| LdapError::ConnectionClosed)?
    }

    pub async fn simple_bind(&self, bind_dn: &str, bind_pw: &str) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(simple_bind_request(bind_dn, bind_pw), vec![]).await?;
        Ok(decode_bind_response(tag, ctrls))
    }

    pub async fn sasl_external_bind(&self) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(sasl_external_bind_request(None), vec![]).await?;
        Ok(decode_bind_response(tag, ctrls))
    }

    pub async fn add(&self, dn: &str, attrs: &[(String, Vec<Vec<u8>>)]) -> Result<LdapResult> {
        self.add_with_controls(dn, attrs, vec![]).await
    }

    pub async fn add_with_controls(&self, dn: &str, attrs: &[(String, Vec<Vec<u8>>)], controls: Vec<RawControl>) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(add::add_request(dn, attrs), controls).await?;
        Ok(add::decode_add_response(tag, ctrls))
    }

    pub async fn delete(&self, dn: &str) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(delete::delete_request(dn), vec![]).await?;
        Ok(delete::decode_delete_response(tag, ctrls))
    }

    pub async fn modify(&self, dn: &str, mods: &[Modification]) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(modify_request(dn, mods), vec![]).await?;
        Ok(decode_modify_response(tag, ctrls))
    }

    pub async fn modifydn(&self, dn: &str, new_rdn: &str, delete_old_rdn: bool, new_superior: Option<&str>) -> Result<LdapResult> {
        let (tag, ctrls) = self.unary(modifydn_request(dn, new_rdn, delete_old_rdn, new_superior), vec![]).await?;
        Ok(decode_modifydn_response(tag, ctrls))
    }

    pub async fn compare(&self, dn: &str, attr: &str, value: &[u8]) -> Result<CompareResult> {
        let (tag, ctrls) = self.unary(compare_request(dn, attr, value), vec![]).await?;
        Ok(CompareResult(decode_compare_response(tag, ctrls)))
    }

    pub async fn extended<E: Request>(&self, exop: E) -> Result<ExopResult> {
        let exop = Exop::from_request(exop);
        let (tag, ctrls) = self.unary(encode_extended_request(&exop), vec![]).await?;
        Ok(decode_extended_response(tag, ctrls))
    }

    /// Begin a streaming search: returns immediately with the message-id (for
    /// [`Ldap::abandon`]) and a bounded [`EntryStream`] the caller pulls from.
    pub async fn streaming_search(&self, req: SearchRequest) -> Result<(i32, EntryStream)> {
        let id = self.alloc_id();
        let (sender, stream) = EntryStream::channel(100);
        self.cmd_tx
            .send(Command::Send { id, op: encode_search_request(&req), controls: vec![], responder: Responder::Search(sender) })
            .map_err(|_| LdapError::ConnectionClosed)?;
        Ok((id, stream))
    }

    /// Run a search to completion, collecting every entry before returning.
    pub async fn search(&self, req: SearchRequest) -> Result<crate::result::SearchResult> {
        let (_, mut stream) = self.streaming_search(req).await?;
        let mut entries = Vec::new();
        while let Some(e) = stream.next().await {
            entries.push(e);
        }
        let result = stream.finish().await?;
        Ok(crate::result::SearchResult(entries, result))
    }

    /// Remove `message_id` from the outstanding table and send an Abandon PDU (which
    /// carries no response); any later response for that id is silently dropped.
    pub fn abandon(&self, message_id: i32) -> Result<()> {
        self.cmd_tx.send(Command::Abandon { id: message_id }).map_err(|_| LdapError::ConnectionClosed)
    }

    /// Issue the Cancel extended request (RFC 3909) for `message_id`, for servers that
    /// don't treat a bare Abandon as sufficient cancellation.
    pub async fn cancel(&self, message_id: i32) -> Result<ExopResult> {
        self.extended(crate::exop::Cancel { message_id }).await
    }

    pub fn unbind(&self) -> Result<()> {
        self.cmd_tx.send(Command::Unbind).map_err(|_| LdapError::ConnectionClosed)
    }
}

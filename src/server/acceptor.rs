//! Connection acceptor and handler
//!
//! Reads the request head, asks the gate whether the stats session takes the
//! request over and, if so, drives the session's directives on the socket.

use ::metrics::{counter, gauge};
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::connection::{Directive, Renderer, SessionEvent, SessionId, StatsSession};
use crate::metrics::{
    CONNECTIONS_ACCEPTED, REQUESTS_DENIED, REQUESTS_INTERCEPTED, REQUESTS_PASSED_THROUGH,
    RESPONSE_BYTES, SESSIONS_ACTIVE, SESSION_ERRORS,
};
use crate::pool::BufferPool;
use crate::router::{evaluate, GateDecision, Intercept, PassReason, Request};
use crate::snapshot::ConfigStore;
use crate::util::{canonical_ip, shutdown_read};

/// Answer for anything the stats session does not serve
const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Shared per-server state handed to every connection
#[derive(Clone)]
pub struct ConnectionHandler {
    store: ConfigStore,
    renderer: Arc<Renderer>,
    buffer_pool: BufferPool,
    max_request_bytes: usize,
    header_timeout: Duration,
}

/// Outcome of reading the request head
#[derive(Debug)]
enum Head {
    Complete(BytesMut),
    Closed,
    TooLarge,
}

/// The request line of a `GET` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    /// Path without the leading slash
    pub path: &'a str,
    pub query: Option<&'a str>,
}

impl ConnectionHandler {
    pub fn new(
        store: ConfigStore,
        renderer: Arc<Renderer>,
        buffer_pool: BufferPool,
        max_request_bytes: usize,
        header_timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            buffer_pool,
            max_request_bytes,
            header_timeout,
        }
    }

    /// Handle one accepted connection
    #[instrument(skip(self, stream, peer), fields(client_addr = %peer))]
    pub async fn handle(self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        counter!(CONNECTIONS_ACCEPTED).increment(1);

        let head = match tokio::time::timeout(
            self.header_timeout,
            read_head(&mut stream, self.max_request_bytes),
        )
        .await
        {
            Ok(Ok(Head::Complete(head))) => head,
            Ok(Ok(Head::Closed)) => {
                debug!("Peer closed before sending a request");
                return Ok(());
            }
            Ok(Ok(Head::TooLarge)) => {
                debug!(limit = self.max_request_bytes, "Request head too large");
                return respond_not_found(&mut stream).await;
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                debug!("Timed out waiting for request head");
                return Ok(());
            }
        };

        let Some(line) = parse_request_line(&head) else {
            debug!("Unsupported request line");
            counter!(REQUESTS_PASSED_THROUGH).increment(1);
            return respond_not_found(&mut stream).await;
        };

        let request = Request {
            path: line.path.as_bytes(),
            query: line.query,
            client: Some(canonical_ip(peer.ip())),
        };
        let decision = {
            let snapshot = self.store.load();
            evaluate(&request, &snapshot)
        };

        match decision {
            GateDecision::Intercept(intercept) => self.serve(stream, &head, intercept).await,
            GateDecision::PassThrough(reason) => {
                counter!(REQUESTS_PASSED_THROUGH).increment(1);
                if reason == PassReason::AddressDenied {
                    counter!(REQUESTS_DENIED).increment(1);
                }
                respond_not_found(&mut stream).await
            }
        }
    }

    /// Run a stats session to completion on `stream`
    async fn serve(&self, mut stream: TcpStream, head: &[u8], intercept: Intercept) -> Result<()> {
        counter!(REQUESTS_INTERCEPTED).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);

        let mut session = StatsSession::new(
            SessionId::next(),
            intercept,
            self.renderer.clone(),
            self.buffer_pool.clone(),
        );
        debug!(session = %session.id(), "Stats session started");

        let mut written = 0usize;
        let mut directive = session.handle_event(SessionEvent::Accept);
        loop {
            directive = match directive {
                Directive::Read => session.handle_event(SessionEvent::ReadReady(head)),
                Directive::StartWrite => match shutdown_read(&stream) {
                    Ok(()) => {
                        // The first write renders the body, which reads sysfs and procfs.
                        let rendered = tokio::task::spawn_blocking(move || {
                            let next = session.handle_event(SessionEvent::WriteReady);
                            (session, next)
                        })
                        .await;
                        match rendered {
                            Ok((returned, next)) => {
                                session = returned;
                                next
                            }
                            Err(e) => {
                                counter!(SESSION_ERRORS).increment(1);
                                gauge!(SESSIONS_ACTIVE).decrement(1.0);
                                return Err(e).context("Render task failed");
                            }
                        }
                    }
                    Err(e) => session.handle_event(SessionEvent::Error(e.into())),
                },
                Directive::Write { chunk, total } => match stream.write_all(&chunk).await {
                    Ok(()) => {
                        written += chunk.len();
                        counter!(RESPONSE_BYTES).increment(chunk.len() as u64);
                        if written >= total {
                            session.handle_event(SessionEvent::WriteComplete)
                        } else {
                            session.handle_event(SessionEvent::WriteReady)
                        }
                    }
                    Err(e) => session.handle_event(SessionEvent::Error(e.into())),
                },
                Directive::Close | Directive::Done => break,
            };
        }

        if session.is_failed() {
            counter!(SESSION_ERRORS).increment(1);
        }
        gauge!(SESSIONS_ACTIVE).decrement(1.0);

        let _ = stream.shutdown().await;
        Ok(())
    }
}

/// Read until the blank line ending the head, at most `limit` bytes
async fn read_head(stream: &mut TcpStream, limit: usize) -> std::io::Result<Head> {
    let mut buf = BytesMut::with_capacity(limit.min(4096));

    loop {
        if find(&buf, HEAD_TERMINATOR).is_some() {
            return Ok(Head::Complete(buf));
        }
        if buf.len() >= limit {
            return Ok(Head::TooLarge);
        }
        buf.reserve(limit - buf.len());

        if stream.read_buf(&mut buf).await? == 0 {
            // A head cut short still gets a response if its request line is whole.
            return Ok(if buf.is_empty() {
                Head::Closed
            } else {
                Head::Complete(buf)
            });
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse `GET <target> HTTP/1.x`
///
/// Only origin-form targets are accepted. The target is split at the first
/// `?` and the leading `/` is stripped from the path.
pub fn parse_request_line(head: &[u8]) -> Option<RequestLine<'_>> {
    let end = find(head, b"\r\n")?;
    let line = std::str::from_utf8(&head[..end]).ok()?;

    let mut parts = line.split(' ');
    let (method, target, version) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || method != "GET" || !version.starts_with("HTTP/1.") {
        return None;
    }

    let target = target.strip_prefix('/')?;
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    Some(RequestLine { path, query })
}

async fn respond_not_found(stream: &mut TcpStream) -> Result<()> {
    stream.write_all(NOT_FOUND).await?;
    stream.shutdown().await?;
    Ok(())
}

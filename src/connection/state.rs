//! Stats session state machine
//!
//! One session owns one intercepted connection. The host delivers events one
//! at a time through [`StatsSession::handle_event`] and carries out the
//! returned [`Directive`]; the session itself never touches the socket.

use bytes::{BufMut, Bytes};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::render::{Renderer, RESPONSE_HEADER};
use crate::pool::{Buffer, BufferPool};
use crate::router::{Intercept, QueryFilter};
use crate::snapshot::RecordTypeMask;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate the next process-wide id
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Accepted,
    AwaitingRequest,
    Responding,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Accepted => "accepted",
            SessionPhase::AwaitingRequest => "awaiting request",
            SessionPhase::Responding => "responding",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Connection events delivered by the host
#[derive(Debug)]
pub enum SessionEvent<'a> {
    /// The connection was handed to the session
    Accept,
    /// Request bytes are available
    ReadReady(&'a [u8]),
    /// The connection can take more output
    WriteReady,
    /// Every declared response byte has been written
    WriteComplete,
    /// The connection failed
    Error(SessionError),
    /// The peer closed its side
    EndOfStream,
}

impl SessionEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Accept => "accept",
            SessionEvent::ReadReady(_) => "read-ready",
            SessionEvent::WriteReady => "write-ready",
            SessionEvent::WriteComplete => "write-complete",
            SessionEvent::Error(_) => "error",
            SessionEvent::EndOfStream => "end-of-stream",
        }
    }
}

/// What the host should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Deliver request bytes as `ReadReady`
    Read,
    /// Half-close the read side, then deliver `WriteReady`
    StartWrite,
    /// Write `chunk`; the response is `total` bytes long overall
    Write { chunk: Bytes, total: usize },
    /// Close the connection
    Close,
    /// Nothing left to do
    Done,
}

/// Reasons a session is torn down early
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected {event} event while {phase}")]
    UnexpectedEvent {
        event: &'static str,
        phase: SessionPhase,
    },
}

/// Buffers and progress of a live exchange
struct Exchange {
    filter: QueryFilter,
    input: Buffer,
    output: Buffer,
    bytes_read: usize,
    output_bytes: usize,
    body_written: bool,
}

enum SessionState {
    Accepted { filter: QueryFilter },
    AwaitingRequest(Exchange),
    Responding(Exchange),
    Closed,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Accepted { .. } => SessionPhase::Accepted,
            SessionState::AwaitingRequest(_) => SessionPhase::AwaitingRequest,
            SessionState::Responding(_) => SessionPhase::Responding,
            SessionState::Closed => SessionPhase::Closed,
        }
    }
}

/// Per-connection stats responder
pub struct StatsSession {
    id: SessionId,
    record_types: RecordTypeMask,
    renderer: Arc<Renderer>,
    pool: BufferPool,
    state: SessionState,
    bytes_read: usize,
    output_bytes: usize,
    failed: bool,
}

impl StatsSession {
    /// Create a session for a request the gate intercepted
    pub fn new(id: SessionId, intercept: Intercept, renderer: Arc<Renderer>, pool: BufferPool) -> Self {
        Self {
            id,
            record_types: intercept.record_types,
            renderer,
            pool,
            state: SessionState::Accepted {
                filter: intercept.filter,
            },
            bytes_read: 0,
            output_bytes: 0,
            failed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Whether the session was torn down by an error
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Request bytes consumed before the read side was closed
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Declared response length, zero until the body is rendered
    pub fn output_bytes(&self) -> usize {
        self.output_bytes
    }

    /// Advance the session by one event
    pub fn handle_event(&mut self, event: SessionEvent<'_>) -> Directive {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);

        match (state, event) {
            (SessionState::Closed, event) => {
                debug!(session = %self.id, event = event.name(), "Event after close ignored");
                Directive::Done
            }

            (_, SessionEvent::Error(err)) => self.fail(err),

            (SessionState::Accepted { filter }, SessionEvent::Accept) => {
                self.state = SessionState::AwaitingRequest(Exchange {
                    filter,
                    input: self.pool.acquire_or_alloc(),
                    output: self.pool.acquire_or_alloc(),
                    bytes_read: 0,
                    output_bytes: 0,
                    body_written: false,
                });
                Directive::Read
            }

            (SessionState::AwaitingRequest(mut exchange), SessionEvent::ReadReady(data)) => {
                let room = exchange.input.capacity() - exchange.input.len();
                let take = data.len().min(room);
                exchange.input.put_slice(&data[..take]);
                exchange.bytes_read += data.len();
                exchange.output.put_slice(RESPONSE_HEADER);
                self.bytes_read = exchange.bytes_read;

                self.state = SessionState::Responding(exchange);
                Directive::StartWrite
            }

            (SessionState::Responding(mut exchange), SessionEvent::WriteReady) => {
                if !exchange.body_written {
                    self.renderer
                        .render(&mut exchange.output, &exchange.filter, self.record_types);
                    exchange.output_bytes = exchange.output.len();
                    exchange.body_written = true;
                    self.output_bytes = exchange.output_bytes;
                }
                let chunk = exchange.output.split().freeze();
                let total = exchange.output_bytes;

                self.state = SessionState::Responding(exchange);
                Directive::Write { chunk, total }
            }

            (SessionState::Responding(exchange), SessionEvent::WriteComplete) => {
                self.teardown(exchange);
                Directive::Close
            }

            (SessionState::AwaitingRequest(exchange), SessionEvent::EndOfStream) => {
                debug!(session = %self.id, "Peer closed before sending a request");
                self.teardown(exchange);
                Directive::Close
            }

            (state, event) => {
                let err = SessionError::UnexpectedEvent {
                    event: event.name(),
                    phase: state.phase(),
                };
                drop(state);
                self.fail(err)
            }
        }
    }

    fn teardown(&mut self, exchange: Exchange) {
        debug!(
            session = %self.id,
            bytes_read = exchange.bytes_read,
            bytes_written = exchange.output_bytes,
            "Stats session closed"
        );
        drop(exchange);
        self.state = SessionState::Closed;
    }

    fn fail(&mut self, err: SessionError) -> Directive {
        warn!(session = %self.id, error = %err, "Stats session aborted");
        self.failed = true;
        self.state = SessionState::Closed;
        Directive::Close
    }
}

impl fmt::Debug for StatsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("record_types", &self.record_types)
            .field("failed", &self.failed)
            .finish()
    }
}

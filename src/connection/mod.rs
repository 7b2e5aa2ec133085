//! Stats sessions
//!
//! The per-connection state machine, the JSON renderer it drives and the
//! host probes behind the `system` section.

mod render;
mod state;
mod system;

pub use render::{Renderer, RESPONSE_HEADER};
pub use state::{Directive, SessionError, SessionEvent, SessionId, SessionPhase, StatsSession};
pub use system::SystemProbe;

//! Per-connection session machinery
//!
//! - `state`: the Idle / Subscribed / Closed lifecycle
//! - `outbound`: the bounded queue pump that writes fanned-out messages
//! - `teardown`: the one-shot signal that stops a session from any side

pub mod outbound;
pub mod state;
pub mod teardown;

pub use outbound::{OutboundPump, PumpExit, SharedWriter};
pub use state::{SessionPhase, SessionState};
pub use teardown::{Teardown, TeardownReason};

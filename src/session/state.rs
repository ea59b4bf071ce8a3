//! Session state machine
//!
//! Tracks a client session from connection to disconnection.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, not subscribed to anything
    Idle,
    /// Subscribed to exactly one channel
    Subscribed(Bytes),
    /// Session closed
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Commands handled so far
    pub commands_processed: u64,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Idle,
            connected_at: Instant::now(),
            commands_processed: 0,
        }
    }

    /// Switch to `channel`, returning the channel that was replaced
    pub fn subscribe(&mut self, channel: Bytes) -> Option<Bytes> {
        match std::mem::replace(&mut self.phase, SessionPhase::Subscribed(channel)) {
            SessionPhase::Subscribed(previous) => Some(previous),
            SessionPhase::Idle | SessionPhase::Closed => None,
        }
    }

    /// Mark the session closed, returning the channel it was subscribed to
    pub fn close(&mut self) -> Option<Bytes> {
        match std::mem::replace(&mut self.phase, SessionPhase::Closed) {
            SessionPhase::Subscribed(channel) => Some(channel),
            SessionPhase::Idle | SessionPhase::Closed => None,
        }
    }

    /// The current subscription
    pub fn channel(&self) -> Option<&Bytes> {
        match &self.phase {
            SessionPhase::Subscribed(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.phase, SessionPhase::Subscribed(_))
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6380);
        SessionState::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(!state.is_subscribed());

        assert_eq!(state.subscribe(Bytes::from_static(b"news")), None);
        assert!(state.is_subscribed());
        assert_eq!(state.channel().map(|c| c.as_ref()), Some(&b"news"[..]));

        assert_eq!(state.close(), Some(Bytes::from_static(b"news")));
        assert!(state.is_closed());
        assert_eq!(state.close(), None);
    }

    #[test]
    fn test_resubscribe_returns_previous_channel() {
        let mut state = state();
        state.subscribe(Bytes::from_static(b"a"));

        assert_eq!(
            state.subscribe(Bytes::from_static(b"b")),
            Some(Bytes::from_static(b"a"))
        );
        assert_eq!(state.channel(), Some(&Bytes::from_static(b"b")));
    }
}

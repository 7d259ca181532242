use std::fmt;

use log::{info, warn};

/// Lifecycle of the link to the active sample source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Connection state machine, independent of the underlying source variant.
///
/// Legal transitions: disconnected → connecting → {connected | error};
/// connected → disconnected (remote close) or → error (transport failure);
/// error → connecting (explicit retry). No terminal state. `Connecting`
/// left unresolved past the timeout becomes `Error` on the next tick.
/// Every method returns the new state when a transition happened so the
/// caller can notify observers exactly once, in order.
pub struct ConnectionMachine {
    state: ConnectionState,
    connecting_since_ms: Option<i64>,
    timeout_ms: u64,
}

impl ConnectionMachine {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connecting_since_ms: None,
            timeout_ms,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Disconnected/Error → Connecting. Starts the connect timeout.
    pub fn begin_connect(&mut self, now_ms: i64) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.connecting_since_ms = Some(now_ms);
                Some(self.transition(ConnectionState::Connecting))
            }
            _ => self.reject("begin_connect"),
        }
    }

    /// Connecting → Connected (handshake acknowledged).
    pub fn connected(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Connecting => {
                self.connecting_since_ms = None;
                Some(self.transition(ConnectionState::Connected))
            }
            ConnectionState::Connected => None,
            _ => self.reject("connected"),
        }
    }

    /// Connected → Disconnected (remote closed the stream).
    pub fn remote_closed(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Connected => Some(self.transition(ConnectionState::Disconnected)),
            _ => self.reject("remote_closed"),
        }
    }

    /// Connecting/Connected → Error (transport failure).
    pub fn transport_failed(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.connecting_since_ms = None;
                Some(self.transition(ConnectionState::Error))
            }
            ConnectionState::Error => None,
            _ => self.reject("transport_failed"),
        }
    }

    /// Fires the connect timeout: `Connecting` for at least `timeout_ms`
    /// becomes `Error`.
    pub fn tick(&mut self, now_ms: i64) -> Option<ConnectionState> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        let since = self.connecting_since_ms?;
        if now_ms - since >= self.timeout_ms as i64 {
            warn!("connection: handshake not reached within {} ms", self.timeout_ms);
            self.connecting_since_ms = None;
            return Some(self.transition(ConnectionState::Error));
        }
        None
    }

    fn transition(&mut self, to: ConnectionState) -> ConnectionState {
        info!("connection: {} -> {}", self.state, to);
        self.state = to;
        to
    }

    fn reject(&self, what: &str) -> Option<ConnectionState> {
        warn!("connection: {} ignored in state {}", what, self.state);
        None
    }
}

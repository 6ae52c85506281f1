use std::{fmt, time::Duration};

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Socket lifecycle guard.
///
/// Every connect attempt gets a new generation number. Socket notifications
/// carry the generation they belong to so that late events from a torn-down
/// socket can be told apart from the live one.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    generation: u64,
    attempt_started: Option<Instant>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            attempt_started: None,
        }
    }
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state != ConnectionState::Disconnected
    }

    /// Moves to `Connecting` and returns the new generation, or `None` when a
    /// connection is already in progress or established.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.attempt_started = Some(Instant::now());
        Some(self.generation)
    }

    /// Returns the time the attempt took, or `None` if `generation` is stale.
    pub fn mark_connected(&mut self, generation: u64) -> Option<Duration> {
        if self.generation != generation || self.state != ConnectionState::Connecting {
            return None;
        }
        self.state = ConnectionState::Connected;
        Some(
            self.attempt_started
                .take()
                .map(|started| started.elapsed())
                .unwrap_or_default(),
        )
    }

    /// Returns the state that was left, or `None` if already disconnected.
    pub fn mark_disconnected(&mut self) -> Option<ConnectionState> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.attempt_started = None;
        Some(previous)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_is_ignored_unless_disconnected() {
        let mut connection = Connection::default();
        let generation = connection.begin_connect().expect("first attempt");
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(connection.begin_connect(), None);

        connection.mark_connected(generation).expect("connected");
        assert!(connection.is_connected());
        assert_eq!(connection.begin_connect(), None);
    }

    #[test]
    fn stale_generation_cannot_connect() {
        let mut connection = Connection::default();
        let first = connection.begin_connect().expect("first attempt");
        connection.mark_disconnected();
        let second = connection.begin_connect().expect("second attempt");

        assert!(!connection.is_current(first));
        assert_eq!(connection.generation(), second);
        assert!(second > first);
        assert_eq!(connection.mark_connected(first), None);
        assert!(connection.mark_connected(second).is_some());
    }

    #[test]
    fn disconnect_reports_previous_state_once() {
        let mut connection = Connection::default();
        assert_eq!(connection.mark_disconnected(), None);

        let generation = connection.begin_connect().expect("attempt");
        connection.mark_connected(generation);
        assert_eq!(
            connection.mark_disconnected(),
            Some(ConnectionState::Connected)
        );
        assert_eq!(connection.mark_disconnected(), None);
        assert!(!connection.is_current(generation));
    }
}

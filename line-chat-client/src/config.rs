use std::time::Duration;

use crate::{heartbeat::DEFAULT_HEARTBEAT_INTERVAL, operation::DEFAULT_OPERATION_TIMEOUT};

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8888";
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 20;
pub const DEFAULT_LOCAL_HISTORY_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port`; resolved on every connect.
    pub server_addr: String,
    pub heartbeat_interval: Duration,
    pub operation_timeout: Duration,
    /// Messages requested by `get_chat_history` when no count is given.
    pub history_page_size: usize,
    /// Messages read by `load_local_history` when no count is given.
    pub local_history_page_size: usize,
    /// Release a buffered `<digits>:...` remainder without waiting for `\n`.
    pub eager_unterminated_frames: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            local_history_page_size: DEFAULT_LOCAL_HISTORY_PAGE_SIZE,
            eager_unterminated_frames: true,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_history_page_size(mut self, count: usize) -> Self {
        self.history_page_size = count;
        self
    }

    pub fn with_local_history_page_size(mut self, count: usize) -> Self {
        self.local_history_page_size = count;
        self
    }

    pub fn with_eager_unterminated_frames(mut self, enabled: bool) -> Self {
        self.eager_unterminated_frames = enabled;
        self
    }
}

use std::time::Duration;

use clap::Parser;

use crate::config::{ClientConfig, DEFAULT_SERVER_ADDR};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address of the chat server, as `host:port`.
    #[arg(long, default_value = DEFAULT_SERVER_ADDR)]
    pub server: String,

    /// Milliseconds between heartbeats while connected.
    #[arg(long, default_value_t = 20_000)]
    pub heartbeat_ms: u64,

    /// Milliseconds to wait for a login, logout, register or verify-code
    /// response.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Only treat newline-terminated input as a frame.
    #[arg(long)]
    pub strict_framing: bool,
}

impl Cli {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.server.clone())
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_ms))
            .with_operation_timeout(Duration::from_millis(self.timeout_ms))
            .with_eager_unterminated_frames(!self.strict_framing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_the_default_config() {
        let cli = Cli::parse_from(["line_chat_client"]);
        let config = cli.config();
        let defaults = ClientConfig::default();

        assert_eq!(config.server_addr, defaults.server_addr);
        assert_eq!(config.heartbeat_interval, defaults.heartbeat_interval);
        assert_eq!(config.operation_timeout, defaults.operation_timeout);
        assert!(config.eager_unterminated_frames);
    }

    #[test]
    fn flags_override_timers_and_framing() {
        let cli = Cli::parse_from([
            "line_chat_client",
            "--server",
            "chat.local:9000",
            "--heartbeat-ms",
            "500",
            "--timeout-ms",
            "250",
            "--strict-framing",
        ]);
        let config = cli.config();

        assert_eq!(config.server_addr, "chat.local:9000");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert!(!config.eager_unterminated_frames);
    }
}

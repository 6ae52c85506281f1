//! Client core for a line-oriented chat protocol.
//!
//! Frames look like `<code>:<key>=<value>;<key>=<value>` and are separated
//! by `\n`. Each module focuses on a concrete responsibility:
//!
//! - [`message`] encodes and decodes single frames and names every code.
//! - [`framing`] turns arbitrary TCP chunks back into frames.
//! - [`connection`], [`heartbeat`] and [`operation`] hold the socket
//!   lifecycle, the liveness timer and the single in-flight auth request.
//! - [`dispatch`] maps decoded messages onto [`event::Event`]s.
//! - [`client`] owns all of the above on one task and exposes
//!   [`client::ChatClient`] plus the ordered [`client::EventStream`].
//! - [`store`] is the boundary to local chat history.
//! - [`cli`] and [`console`] wire the client to a terminal.
//!
//! Integration tests drive [`client::ChatClient`] against a scripted
//! server on a local TCP port.

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod framing;
pub mod heartbeat;
pub mod message;
pub mod operation;
pub mod store;

pub use client::{ChatClient, ClientStatus, EventStream, SessionUser};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use event::{ChatKind, Event, FailureReason};
pub use message::{Message, MessageType};
pub use store::{ChatStore, MemoryStore};

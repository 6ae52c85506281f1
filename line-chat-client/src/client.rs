//! Client handle and the runtime task behind it.
//!
//! [`ChatClient::start`] spawns one task that owns every piece of mutable
//! state: the connection, the inbound buffer, the heartbeat and the
//! operation tracker. Four kinds of trigger are multiplexed onto it with
//! `select!`:
//!
//! - requests from [`ChatClient`] handles, each answered on a oneshot channel
//! - socket notifications posted by the per-connection I/O task
//! - heartbeat ticks
//! - the pending operation's deadline
//!
//! Everything the client observes is published, in order, on the returned
//! [`EventStream`].
//!
//! Sends are not queued. A request made while the socket is not connected
//! fails with [`ClientError::NotConnected`] and writes nothing.

use std::io;

use chrono::Utc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep_until, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    connection::{Connection, ConnectionState},
    dispatch::dispatch,
    error::{ClientError, Result},
    event::{ChatKind, Event},
    framing::FrameReassembler,
    heartbeat::HeartbeatScheduler,
    message::{Message, MessageType, write_message},
    operation::{Operation, OperationTracker},
    store::ChatStore,
};

const READ_CHUNK: usize = 4096;

/// Ordered stream of everything the client observes.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Returns `None` once the runtime has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub user: Option<SessionUser>,
    pub pending: Option<Operation>,
}

/// Cheap, cloneable handle to a running client.
///
/// Every method waits for the runtime to act on the request and returns its
/// synchronous outcome; responses from the server arrive as events.
#[derive(Clone)]
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    history_page_size: usize,
}

impl ChatClient {
    /// Spawns the runtime on the current tokio runtime.
    pub fn start(config: ClientConfig, store: impl ChatStore) -> (ChatClient, EventStream) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let history_page_size = config.history_page_size;

        let runtime = Runtime::new(config, Box::new(store), command_rx, event_tx);
        tokio::spawn(runtime.run());

        (
            ChatClient {
                commands: command_tx,
                history_page_size,
            },
            EventStream { events: event_rx },
        )
    }

    /// Starts connecting. The outcome arrives as `Connected` or
    /// `ConnectionError`; calling this while connecting or connected does
    /// nothing.
    pub async fn connect(&self) -> Result<()> {
        self.request(Action::Connect).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(Action::Disconnect).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.request(Action::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.request(Action::Logout).await
    }

    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<()> {
        self.request(Action::Register {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            code: code.to_string(),
        })
        .await
    }

    pub async fn send_verify_code(&self, email: &str) -> Result<()> {
        self.request(Action::SendVerifyCode {
            email: email.to_string(),
        })
        .await
    }

    pub async fn send_private_message(&self, to_user_id: &str, content: &str) -> Result<()> {
        self.chat(ChatKind::Private, to_user_id, content).await
    }

    pub async fn send_group_message(&self, group_id: &str, content: &str) -> Result<()> {
        self.chat(ChatKind::Group, group_id, content).await
    }

    pub async fn get_friends_list(&self) -> Result<()> {
        self.send_raw(Message::new(MessageType::GetUserFriends))
            .await
    }

    pub async fn add_friend(&self, friend_id: &str) -> Result<()> {
        self.send_raw(Message::new(MessageType::AddFriendRequest).with_field("friendId", friend_id))
            .await
    }

    pub async fn accept_friend_request(&self, from_user_id: &str) -> Result<()> {
        self.send_raw(
            Message::new(MessageType::AcceptFriendRequest).with_field("fromUserId", from_user_id),
        )
        .await
    }

    pub async fn reject_friend_request(&self, from_user_id: &str) -> Result<()> {
        self.send_raw(
            Message::new(MessageType::RejectFriendRequest).with_field("fromUserId", from_user_id),
        )
        .await
    }

    pub async fn get_friend_requests(&self) -> Result<()> {
        self.send_raw(Message::new(MessageType::GetFriendRequests))
            .await
    }

    pub async fn get_groups_list(&self) -> Result<()> {
        self.send_raw(Message::new(MessageType::GetGroupList)).await
    }

    pub async fn create_group(&self, group_name: &str) -> Result<()> {
        self.send_raw(Message::new(MessageType::CreateGroup).with_field("groupName", group_name))
            .await
    }

    pub async fn join_group(&self, group_id: &str) -> Result<()> {
        self.send_raw(Message::new(MessageType::JoinGroup).with_field("groupId", group_id))
            .await
    }

    pub async fn leave_group(&self, group_id: &str) -> Result<()> {
        self.send_raw(Message::new(MessageType::LeaveGroup).with_field("groupId", group_id))
            .await
    }

    pub async fn get_group_members(&self, group_id: &str) -> Result<()> {
        self.send_raw(Message::new(MessageType::GetGroupMembers).with_field("groupId", group_id))
            .await
    }

    pub async fn get_users_list(&self) -> Result<()> {
        self.send_raw(Message::new(MessageType::GetUserList)).await
    }

    /// Requests server-side history; `count` defaults to the configured page
    /// size.
    pub async fn get_chat_history(
        &self,
        kind: ChatKind,
        target_id: &str,
        count: Option<usize>,
    ) -> Result<()> {
        let count = count.unwrap_or(self.history_page_size);
        self.send_raw(
            targeted(MessageType::GetChatHistory, kind, target_id)
                .with_field("count", count.to_string()),
        )
        .await
    }

    pub async fn recall_message(
        &self,
        message_id: &str,
        kind: ChatKind,
        target_id: &str,
    ) -> Result<()> {
        self.send_raw(
            targeted(MessageType::RecallMessage, kind, target_id)
                .with_field("messageId", message_id),
        )
        .await
    }

    pub async fn mark_message_read(
        &self,
        message_id: &str,
        kind: ChatKind,
        target_id: &str,
    ) -> Result<()> {
        self.send_raw(
            targeted(MessageType::MarkMessageRead, kind, target_id)
                .with_field("messageId", message_id),
        )
        .await
    }

    /// Sends `message` as-is, subject only to the connection check.
    pub async fn send_raw(&self, message: Message) -> Result<()> {
        self.request(Action::Send(message)).await
    }

    /// Reads stored history and publishes it as `LocalChatHistoryLoaded`.
    pub async fn load_local_history(
        &self,
        kind: ChatKind,
        target_id: &str,
        count: Option<usize>,
    ) -> Result<()> {
        self.request(Action::LoadLocalHistory {
            kind,
            target_id: target_id.to_string(),
            count,
        })
        .await
    }

    pub async fn clear_chat_history(&self, kind: ChatKind, target_id: &str) -> Result<()> {
        self.request(Action::ClearHistory {
            kind,
            target_id: target_id.to_string(),
        })
        .await
    }

    pub async fn process_offline_messages(&self) -> Result<()> {
        self.request(Action::ProcessOffline).await
    }

    pub async fn clear_offline_messages(&self) -> Result<()> {
        self.request(Action::ClearOffline).await
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(Command::Status { respond_to })
            .map_err(|_| ClientError::Shutdown)?;
        response.await.map_err(|_| ClientError::Shutdown)
    }

    /// Closes the socket and stops the runtime; the event stream then ends.
    pub fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| ClientError::Shutdown)
    }

    async fn chat(&self, kind: ChatKind, target_id: &str, content: &str) -> Result<()> {
        self.request(Action::Chat {
            kind,
            target_id: target_id.to_string(),
            content: content.to_string(),
        })
        .await
    }

    async fn request(&self, action: Action) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(Command::Request { action, respond_to })
            .map_err(|_| ClientError::Shutdown)?;
        response.await.map_err(|_| ClientError::Shutdown)?
    }
}

fn targeted(message_type: MessageType, kind: ChatKind, target_id: &str) -> Message {
    Message::new(message_type)
        .with_field("type", kind.as_str())
        .with_field(kind.target_key(), target_id)
}

enum Command {
    Request {
        action: Action,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Status {
        respond_to: oneshot::Sender<ClientStatus>,
    },
    Shutdown,
}

enum Action {
    Connect,
    Disconnect,
    Login {
        username: String,
        password: String,
    },
    Logout,
    Register {
        username: String,
        email: String,
        password: String,
        code: String,
    },
    SendVerifyCode {
        email: String,
    },
    Chat {
        kind: ChatKind,
        target_id: String,
        content: String,
    },
    Send(Message),
    LoadLocalHistory {
        kind: ChatKind,
        target_id: String,
        count: Option<usize>,
    },
    ClearHistory {
        kind: ChatKind,
        target_id: String,
    },
    ProcessOffline,
    ClearOffline,
}

/// Notifications from the I/O task, tagged with the connection generation.
enum SocketEvent {
    Connected {
        generation: u64,
        writer: OwnedWriteHalf,
    },
    Data {
        generation: u64,
        chunk: Vec<u8>,
    },
    Closed {
        generation: u64,
    },
    Failed {
        generation: u64,
        error: io::Error,
    },
}

struct Runtime {
    config: ClientConfig,
    store: Box<dyn ChatStore>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Event>,
    socket_tx: mpsc::UnboundedSender<SocketEvent>,
    socket_rx: mpsc::UnboundedReceiver<SocketEvent>,
    connection: Connection,
    reassembler: FrameReassembler,
    heartbeat: HeartbeatScheduler,
    operations: OperationTracker,
    writer: Option<OwnedWriteHalf>,
    io_task: Option<JoinHandle<()>>,
    session: Option<SessionUser>,
}

impl Runtime {
    fn new(
        config: ClientConfig,
        store: Box<dyn ChatStore>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        Self {
            reassembler: FrameReassembler::new(config.eager_unterminated_frames),
            operations: OperationTracker::new(config.operation_timeout),
            config,
            store,
            commands,
            events,
            socket_tx,
            socket_rx,
            connection: Connection::default(),
            heartbeat: HeartbeatScheduler::default(),
            writer: None,
            io_task: None,
            session: None,
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.operations.deadline();
            select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Request { action, respond_to }) => {
                            let result = self.perform(action).await;
                            let _ = respond_to.send(result);
                        }
                        Some(Command::Status { respond_to }) => {
                            let _ = respond_to.send(self.status());
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                Some(event) = self.socket_rx.recv() => self.on_socket_event(event),
                _ = self.heartbeat.tick() => self.send_heartbeat().await,
                _ = wait_for(deadline) => self.on_operation_deadline(),
            }
        }

        self.heartbeat.stop();
        self.close_socket().await;
        debug!("client runtime stopped");
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.connection.state(),
            user: self.session.clone(),
            pending: self.operations.pending(),
        }
    }

    async fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Connect => {
                self.connect();
                Ok(())
            }
            Action::Disconnect => {
                self.disconnect().await;
                Ok(())
            }
            Action::Login { username, password } => {
                let message = Message::new(MessageType::LoginRequest)
                    .with_field("username", &username)
                    .with_field("password", password);
                self.send_tracked(Operation::Login, message).await?;
                debug!(%username, "login request sent");
                Ok(())
            }
            Action::Logout => self.logout().await,
            Action::Register {
                username,
                email,
                password,
                code,
            } => {
                let message = Message::new(MessageType::RegisterRequest)
                    .with_field("username", &username)
                    .with_field("email", &email)
                    .with_field("password", password)
                    .with_field("code", code);
                self.send_tracked(Operation::Register, message).await?;
                debug!(%username, %email, "register request sent");
                Ok(())
            }
            Action::SendVerifyCode { email } => {
                let message =
                    Message::new(MessageType::VerifyCodeRequest).with_field("email", &email);
                self.send_tracked(Operation::VerifyCode, message).await?;
                debug!(%email, "verify code request sent");
                Ok(())
            }
            Action::Chat {
                kind,
                target_id,
                content,
            } => self.send_chat(kind, &target_id, &content).await,
            Action::Send(message) => self.send(&message).await,
            Action::LoadLocalHistory {
                kind,
                target_id,
                count,
            } => {
                let count = count.unwrap_or(self.config.local_history_page_size);
                let messages = self.store.get_messages(kind, &target_id, count, 0)?;
                debug!(%kind, %target_id, count = messages.len(), "loaded local history");
                self.emit(Event::LocalChatHistoryLoaded {
                    kind,
                    target_id,
                    messages,
                });
                Ok(())
            }
            Action::ClearHistory { kind, target_id } => {
                self.store.clear_history(kind, &target_id)?;
                debug!(%kind, %target_id, "cleared local history");
                Ok(())
            }
            Action::ProcessOffline => self.process_offline_messages(),
            Action::ClearOffline => {
                self.store.clear_offline_messages()?;
                Ok(())
            }
        }
    }

    fn connect(&mut self) {
        let Some(generation) = self.connection.begin_connect() else {
            debug!(state = %self.connection.state(), "connect ignored");
            return;
        };

        info!(server = %self.config.server_addr, "connecting to server");
        self.io_task = Some(tokio::spawn(drive_socket(
            self.config.server_addr.clone(),
            generation,
            self.socket_tx.clone(),
        )));
    }

    async fn disconnect(&mut self) {
        if self.connection.state() == ConnectionState::Disconnected {
            debug!("disconnect ignored, not connected");
            return;
        }
        self.heartbeat.stop();
        self.close_socket().await;
        self.enter_disconnected(None);
    }

    async fn close_socket(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(error) = writer.shutdown().await {
                warn!(?error, "failed to shut down socket cleanly");
            }
        }
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }

    fn enter_disconnected(&mut self, reason: Option<String>) {
        let Some(previous) = self.connection.mark_disconnected() else {
            return;
        };

        self.heartbeat.stop();
        self.writer = None;
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.session = None;

        let failure = reason.as_deref().unwrap_or("connection closed").to_string();
        match reason {
            Some(reason) => {
                warn!(%previous, %reason, "connection error");
                self.emit(Event::ConnectionError { reason });
            }
            None => {
                info!(%previous, "disconnected from server");
                self.emit(Event::Disconnected);
            }
        }

        if let Some(event) = self.operations.fail_all(&failure) {
            self.emit(event);
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connected { generation, writer } => {
                let Some(elapsed) = self.connection.mark_connected(generation) else {
                    debug!(
                        generation,
                        current = self.connection.generation(),
                        "dropping stale connection"
                    );
                    return;
                };
                info!(
                    server = %self.config.server_addr,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "connected to server"
                );
                self.reassembler.clear();
                self.writer = Some(writer);
                self.emit(Event::Connected);
                self.heartbeat.start(self.config.heartbeat_interval);
            }
            SocketEvent::Data { generation, chunk } => {
                if self.is_stale(generation) {
                    return;
                }
                self.on_inbound(&chunk);
            }
            SocketEvent::Closed { generation } => {
                if self.is_stale(generation) {
                    return;
                }
                self.enter_disconnected(None);
            }
            SocketEvent::Failed { generation, error } => {
                if self.is_stale(generation) {
                    return;
                }
                self.enter_disconnected(Some(error.to_string()));
            }
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        if self.connection.is_current(generation) {
            return false;
        }
        debug!(
            generation,
            current = self.connection.generation(),
            "dropping event from a closed socket"
        );
        true
    }

    fn on_inbound(&mut self, chunk: &[u8]) {
        for frame in self.reassembler.push(chunk) {
            debug!(%frame, "frame received");
            match Message::decode(&frame) {
                Ok(message) => self.route(&message),
                Err(error) => warn!(%error, "dropping malformed frame"),
            }
        }
    }

    fn route(&mut self, message: &Message) {
        let Some(event) = dispatch(message) else {
            return;
        };

        if let Some(operation) = event.concludes() {
            if !self.operations.complete(operation) {
                debug!(%operation, "ignoring response with no matching request");
                return;
            }
        }

        let mut new_session = None;
        match &event {
            Event::UnrecognizedType { code } => warn!(code, "unrecognized message type"),
            Event::PrivateMessageReceived { .. } | Event::GroupMessageReceived { .. } => {
                self.save_incoming(&event)
            }
            Event::LoginSuccess { user_id, username } => {
                new_session = Some(SessionUser {
                    user_id: user_id.clone(),
                    username: username.clone(),
                });
            }
            Event::LogoutSuccess => self.session = None,
            _ => {}
        }

        self.emit(event);
        if let Some(user) = new_session {
            self.begin_session(user);
        }
    }

    fn begin_session(&mut self, user: SessionUser) {
        info!(user_id = %user.user_id, username = %user.username, "logged in");
        if let Err(error) = self.store.initialize(&user.user_id) {
            warn!(%error, "failed to initialize chat store");
        }
        self.session = Some(user);
        if let Err(error) = self.process_offline_messages() {
            warn!(%error, "failed to process offline messages");
        }
    }

    fn save_incoming(&mut self, event: &Event) {
        let Some(user) = &self.session else {
            return;
        };
        let saved = match event {
            Event::PrivateMessageReceived {
                from_user_id,
                content,
                message_id,
                timestamp,
                ..
            } => self.store.save_private_message(
                from_user_id,
                &user.user_id,
                content,
                non_empty(message_id),
                timestamp.parse().ok(),
            ),
            Event::GroupMessageReceived {
                group_id,
                from_user_id,
                content,
                message_id,
                timestamp,
                ..
            } => self.store.save_group_message(
                group_id,
                from_user_id,
                content,
                non_empty(message_id),
                timestamp.parse().ok(),
            ),
            _ => return,
        };
        if let Err(error) = saved {
            warn!(%error, "failed to save received message");
        }
    }

    fn process_offline_messages(&mut self) -> Result<()> {
        let queued = self.store.offline_messages()?;
        let count = queued.len();
        for message in queued {
            self.emit(message.into_event());
        }
        if count > 0 {
            self.store.clear_offline_messages()?;
            info!(count, "processed offline messages");
            self.emit(Event::OfflineMessagesProcessed { count });
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let Some(user) = &self.session else {
            self.emit(Event::LogoutSuccess);
            return Ok(());
        };
        let user_id = user.user_id.clone();
        let message = Message::new(MessageType::LogoutRequest).with_field("userId", &user_id);
        self.send_tracked(Operation::Logout, message).await?;
        debug!(%user_id, "logout request sent");
        Ok(())
    }

    async fn send_chat(&mut self, kind: ChatKind, target_id: &str, content: &str) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let (message_type, target_key) = match kind {
            ChatKind::Private => (MessageType::PrivateChat, "toUserId"),
            ChatKind::Group => (MessageType::GroupChat, "groupId"),
        };

        if let Some(user) = &self.session {
            let saved = match kind {
                ChatKind::Private => self.store.save_private_message(
                    &user.user_id,
                    target_id,
                    content,
                    None,
                    None,
                ),
                ChatKind::Group => {
                    self.store
                        .save_group_message(target_id, &user.user_id, content, None, None)
                }
            };
            if let Err(error) = saved {
                warn!(%error, "failed to save outgoing message");
            }
        }

        let message = Message::new(message_type)
            .with_field(target_key, target_id)
            .with_field("content", content);
        self.send(&message).await
    }

    async fn send_tracked(&mut self, operation: Operation, message: Message) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.operations.begin(operation)?;
        if let Err(error) = self.send(&message).await {
            self.operations.complete(operation);
            return Err(error);
        }
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        let written = timeout(self.config.operation_timeout, write_message(writer, message)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(%error, code = message.code(), "failed to send message");
                return Err(error.into());
            }
            Err(_) => {
                warn!(code = message.code(), "send stalled, dropping connection");
                self.enter_disconnected(Some("write timed out".to_string()));
                return Err(io::Error::from(io::ErrorKind::TimedOut).into());
            }
        }
        debug!(
            code = message.code(),
            queued_ms = (Utc::now() - message.created_at()).num_milliseconds(),
            "message sent"
        );
        Ok(())
    }

    async fn send_heartbeat(&mut self) {
        if !self.connection.is_connected() {
            self.heartbeat.stop();
            return;
        }
        if let Err(error) = self.send(&Message::heartbeat(Utc::now())).await {
            warn!(%error, "failed to send heartbeat");
        }
    }

    fn on_operation_deadline(&mut self) {
        if let Some(event) = self.operations.on_timeout(Instant::now()) {
            warn!(?event, "operation timed out");
            self.emit(event);
        }
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("event stream closed, dropping event");
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Connects, hands the write half to the runtime, then forwards reads until
/// the socket closes.
async fn drive_socket(addr: String, generation: u64, notify: mpsc::UnboundedSender<SocketEvent>) {
    let stream = match TcpStream::connect(addr.as_str()).await {
        Ok(stream) => stream,
        Err(error) => {
            let _ = notify.send(SocketEvent::Failed { generation, error });
            return;
        }
    };
    if let Err(error) = stream.set_nodelay(true) {
        debug!(?error, "failed to set TCP_NODELAY");
    }

    let (mut reader, writer) = stream.into_split();
    if notify
        .send(SocketEvent::Connected { generation, writer })
        .is_err()
    {
        return;
    }

    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut buffer).await {
            Ok(0) => {
                let _ = notify.send(SocketEvent::Closed { generation });
                break;
            }
            Ok(read) => read,
            Err(error) => {
                let _ = notify.send(SocketEvent::Failed { generation, error });
                break;
            }
        };

        let mut chunk = buffer[..read].to_vec();
        let drained = drain_ready(&reader, &mut buffer, &mut chunk);
        if notify.send(SocketEvent::Data { generation, chunk }).is_err() {
            break;
        }
        match drained {
            Drained::Open => {}
            Drained::Closed => {
                let _ = notify.send(SocketEvent::Closed { generation });
                break;
            }
            Drained::Failed(error) => {
                let _ = notify.send(SocketEvent::Failed { generation, error });
                break;
            }
        }
    }
}

enum Drained {
    Open,
    Closed,
    Failed(io::Error),
}

/// Appends everything already queued on the socket to `chunk`, so a burst
/// reaches the reassembler as one piece no matter how large it is.
fn drain_ready(reader: &OwnedReadHalf, scratch: &mut [u8], chunk: &mut Vec<u8>) -> Drained {
    loop {
        match reader.try_read(scratch) {
            Ok(0) => return Drained::Closed,
            Ok(read) => chunk.extend_from_slice(&scratch[..read]),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Drained::Open,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Drained::Failed(error),
        }
    }
}

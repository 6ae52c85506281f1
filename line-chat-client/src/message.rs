use std::{collections::BTreeMap, fmt, io};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ClientError, Result};

macro_rules! message_types {
    ($($variant:ident = $code:literal => $name:literal,)+) => {
        /// Every message type the protocol defines, keyed by its wire code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($variant,)+
        }

        impl MessageType {
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant,)+];

            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(MessageType::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> i32 {
                match self {
                    $(MessageType::$variant => $code,)+
                }
            }

            /// Protocol name, e.g. `LOGIN_REQUEST`.
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageType::$variant => $name,)+
                }
            }
        }
    };
}

message_types! {
    LoginRequest = 1 => "LOGIN_REQUEST",
    LoginResponse = 2 => "LOGIN_RESPONSE",
    LogoutRequest = 3 => "LOGOUT_REQUEST",
    LogoutResponse = 4 => "LOGOUT_RESPONSE",
    Error = 5 => "ERROR",
    HeartbeatRequest = 6 => "HEARTBEAT_REQUEST",
    HeartbeatResponse = 7 => "HEARTBEAT_RESPONSE",
    RegisterRequest = 8 => "REGISTER_REQUEST",
    RegisterResponse = 9 => "REGISTER_RESPONSE",
    VerifyCodeRequest = 10 => "VERIFY_CODE_REQUEST",
    VerifyCodeResponse = 11 => "VERIFY_CODE_RESPONSE",
    PrivateChat = 12 => "PRIVATE_CHAT",
    GroupChat = 13 => "GROUP_CHAT",
    CreateGroup = 14 => "CREATE_GROUP",
    CreateGroupResponse = 15 => "CREATE_GROUP_RESPONSE",
    JoinGroup = 16 => "JOIN_GROUP",
    JoinGroupResponse = 17 => "JOIN_GROUP_RESPONSE",
    LeaveGroup = 18 => "LEAVE_GROUP",
    LeaveGroupResponse = 19 => "LEAVE_GROUP_RESPONSE",
    GetUserList = 20 => "GET_USER_LIST",
    UserListResponse = 21 => "USER_LIST_RESPONSE",
    GetGroupList = 22 => "GET_GROUP_LIST",
    GroupListResponse = 23 => "GROUP_LIST_RESPONSE",
    GetGroupMembers = 24 => "GET_GROUP_MEMBERS",
    GroupMembersResponse = 25 => "GROUP_MEMBERS_RESPONSE",
    GetUserFriends = 26 => "GET_USER_FRIENDS",
    UserFriendsResponse = 27 => "USER_FRIENDS_RESPONSE",
    AddFriendRequest = 28 => "ADD_FRIEND_REQUEST",
    AddFriendResponse = 29 => "ADD_FRIEND_RESPONSE",
    GetChatHistory = 30 => "GET_CHAT_HISTORY",
    ChatHistoryResponse = 31 => "CHAT_HISTORY_RESPONSE",
    RecallMessage = 32 => "RECALL_MESSAGE",
    RecallMessageResponse = 33 => "RECALL_MESSAGE_RESPONSE",
    MarkMessageRead = 34 => "MARK_MESSAGE_READ",
    MarkMessageReadResponse = 35 => "MARK_MESSAGE_READ_RESPONSE",
    AcceptFriendRequest = 36 => "ACCEPT_FRIEND_REQUEST",
    AcceptFriendResponse = 37 => "ACCEPT_FRIEND_RESPONSE",
    RejectFriendRequest = 38 => "REJECT_FRIEND_REQUEST",
    RejectFriendResponse = 39 => "REJECT_FRIEND_RESPONSE",
    GetFriendRequests = 40 => "GET_FRIEND_REQUESTS",
    FriendRequestsResponse = 41 => "FRIEND_REQUESTS_RESPONSE",
    GetChatHistoryOld = 42 => "GET_CHAT_HISTORY_OLD",
    ChatHistoryResponseOld = 43 => "CHAT_HISTORY_RESPONSE_OLD",
    RecallMessageOld = 44 => "RECALL_MESSAGE_OLD",
    RecallMessageResponseOld = 45 => "RECALL_MESSAGE_RESPONSE_OLD",
    MarkMessageReadOld = 46 => "MARK_MESSAGE_READ_OLD",
    MarkMessageReadResponseOld = 47 => "MARK_MESSAGE_READ_RESPONSE_OLD",
    FileMessage = 48 => "FILE_MESSAGE",
    FileMessageResponse = 49 => "FILE_MESSAGE_RESPONSE",
    ImageMessage = 50 => "IMAGE_MESSAGE",
    ImageMessageResponse = 51 => "IMAGE_MESSAGE_RESPONSE",
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One application message: `<code>:<k1>=<v1>;<k2>=<v2>` on the wire.
///
/// The code is kept as a raw integer so frames with codes outside the table
/// still decode; [`Message::kind`] resolves it. Fields live in a `BTreeMap`,
/// which gives the ascending key order the encoder relies on.
///
/// Equality ignores `created_at`.
#[derive(Debug, Clone)]
pub struct Message {
    code: i32,
    fields: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self::with_code(kind.code())
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code,
            fields: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// `HEARTBEAT_REQUEST` carrying `at` as milliseconds since the epoch.
    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self::new(MessageType::HeartbeatRequest)
            .with_field("timestamp", at.timestamp_millis().to_string())
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_code(self.code)
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value, or `""` when absent.
    pub fn text(&self, key: &str) -> String {
        self.field(key).unwrap_or_default().to_string()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Encodes without the trailing newline; [`write_message`] appends it.
    ///
    /// Values are written verbatim. A `;` inside a value splits the field on
    /// decode, since the protocol has no escaping.
    pub fn to_wire(&self) -> String {
        let data = self
            .fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}:{data}", self.code)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        let Some((head, data)) = frame.split_once(':') else {
            return Err(ClientError::MalformedMessage {
                frame: frame.to_string(),
                reason: "missing ':' after message type",
            });
        };

        let code = head
            .trim()
            .parse::<i32>()
            .map_err(|_| ClientError::MalformedMessage {
                frame: frame.to_string(),
                reason: "message type is not an integer",
            })?;

        let mut message = Message::with_code(code);
        for item in data.split(';').filter(|item| !item.is_empty()) {
            // Only the first '=' separates; the rest belongs to the value.
            if let Some((key, value)) = item.split_once('=') {
                message.fields.insert(key.trim().to_string(), value.to_string());
            }
        }
        Ok(message)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.fields == other.fields
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = message.to_wire().into_bytes();
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;

    #[test]
    fn type_table_is_contiguous_and_named() {
        assert_eq!(MessageType::ALL.len(), 51);
        for (index, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(kind.code(), index as i32 + 1);
            assert_eq!(MessageType::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(MessageType::LoginRequest.name(), "LOGIN_REQUEST");
        assert_eq!(MessageType::ImageMessageResponse.code(), 51);
        assert_eq!(MessageType::from_code(0), None);
        assert_eq!(MessageType::from_code(52), None);
    }

    #[test]
    fn encodes_fields_in_key_order() {
        let message = Message::new(MessageType::PrivateChat)
            .with_field("toUserId", "42")
            .with_field("content", "hi");
        assert_eq!(message.to_wire(), "12:content=hi;toUserId=42");
        assert_eq!(message.to_wire(), message.clone().to_wire());
    }

    #[test]
    fn encodes_empty_fields() {
        assert_eq!(Message::new(MessageType::GetUserFriends).to_wire(), "26:");
    }

    #[test]
    fn equality_ignores_creation_time() {
        let first = Message::new(MessageType::GetUserList);
        let later = Message::new(MessageType::GetUserList);
        assert!(later.created_at() >= first.created_at());
        assert_eq!(first, later);
    }

    #[test]
    fn decode_keeps_colons_and_equals_in_values() {
        let message = Message::decode("12:content=a=b:c;url=http://host:80/x").expect("decode");
        assert_eq!(message.kind(), Some(MessageType::PrivateChat));
        assert_eq!(message.field("content"), Some("a=b:c"));
        assert_eq!(message.field("url"), Some("http://host:80/x"));
    }

    #[test]
    fn decode_skips_empty_and_keyless_segments() {
        let message = Message::decode("5:;; message =boom;junk;").expect("decode");
        assert_eq!(message.fields().len(), 1);
        assert_eq!(message.field("message"), Some("boom"));
    }

    #[test]
    fn decode_trims_keys_but_not_values() {
        let message = Message::decode("13: content =  padded ").expect("decode");
        assert_eq!(message.field("content"), Some("  padded "));
    }

    #[test]
    fn decode_rejects_missing_separator_and_bad_type() {
        assert!(matches!(
            Message::decode("hello"),
            Err(ClientError::MalformedMessage { .. })
        ));
        assert!(matches!(
            Message::decode("abc:x=1"),
            Err(ClientError::MalformedMessage { .. })
        ));
        assert!(matches!(
            Message::decode("99999999999:x=1"),
            Err(ClientError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn unknown_codes_still_decode() {
        let message = Message::decode("99:x=1").expect("decode");
        assert_eq!(message.code(), 99);
        assert_eq!(message.kind(), None);
    }

    #[test]
    fn decode_inverts_encode() {
        let message = Message::new(MessageType::GroupChat)
            .with_field("groupId", "g1")
            .with_field("content", "x=y:z")
            .with_field("empty", "");
        assert_eq!(Message::decode(&message.to_wire()).expect("decode"), message);
    }

    #[test]
    fn heartbeat_carries_epoch_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).expect("timestamp");
        assert_eq!(Message::heartbeat(at).to_wire(), "6:timestamp=1700000000123");
    }

    #[tokio::test]
    async fn write_message_appends_newline() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        let message = Message::new(MessageType::LoginRequest)
            .with_field("username", "alice")
            .with_field("password", "secret");

        write_message(&mut writer, &message)
            .await
            .expect("write message");

        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read line");
        assert_eq!(line, "1:password=secret;username=alice\n");
    }
}

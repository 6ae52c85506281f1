//! Semantic events produced by the client, in the order they happen.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{operation::Operation, store::StoredMessage};

/// Private conversation or group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
        }
    }

    /// Request field that names the conversation partner.
    pub(crate) fn target_key(self) -> &'static str {
        match self {
            ChatKind::Private => "targetUserId",
            ChatKind::Group => "groupId",
        }
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "private" => Ok(ChatKind::Private),
            "group" => Ok(ChatKind::Group),
            other => Err(format!("unknown chat kind '{other}'")),
        }
    }
}

/// Why a tracked operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server answered with a non-zero status.
    Server(String),
    /// No response arrived before the deadline.
    Timeout,
    /// The connection failed or closed while the request was pending.
    Connection(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Server(message) => f.write_str(message),
            FailureReason::Timeout => {
                f.write_str("operation timed out, check the network connection")
            }
            FailureReason::Connection(reason) => write!(f, "network error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRecord {
    pub user_id: String,
    pub username: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub group_id: String,
    pub group_name: String,
    pub member_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub message_id: String,
    pub from_user_id: String,
    pub from_username: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Disconnected,
    ConnectionError {
        reason: String,
    },

    LoginSuccess {
        user_id: String,
        username: String,
    },
    LoginFailed {
        reason: FailureReason,
    },
    LogoutSuccess,
    LogoutFailed {
        reason: FailureReason,
    },
    RegisterSuccess {
        user_id: String,
    },
    RegisterFailed {
        reason: FailureReason,
    },
    VerifyCodeSent,
    VerifyCodeFailed {
        reason: FailureReason,
    },

    PrivateMessageReceived {
        from_user_id: String,
        from_username: String,
        content: String,
        message_id: String,
        timestamp: String,
    },
    GroupMessageReceived {
        group_id: String,
        from_user_id: String,
        from_username: String,
        content: String,
        message_id: String,
        timestamp: String,
    },

    FriendRequestReceived {
        from_user_id: String,
        from_username: String,
    },
    FriendRequestAccepted {
        user_id: String,
        username: String,
    },
    FriendRequestRejected {
        user_id: String,
    },
    FriendAdded {
        friend_id: String,
        username: String,
    },
    FriendsListChanged(Vec<FriendRecord>),
    UsersListChanged(Vec<UserRecord>),

    GroupsListChanged(Vec<GroupRecord>),
    GroupCreated {
        group_id: String,
        group_name: String,
    },
    JoinedGroup {
        group_id: String,
        group_name: String,
    },
    LeftGroup {
        group_id: String,
    },
    GroupMembersReceived {
        group_id: String,
        members: Vec<MemberRecord>,
    },

    ChatHistoryReceived {
        kind: String,
        target_id: String,
        messages: Vec<HistoryRecord>,
    },
    LocalChatHistoryLoaded {
        kind: ChatKind,
        target_id: String,
        messages: Vec<StoredMessage>,
    },
    OfflineMessagesProcessed {
        count: usize,
    },

    MessageRecalled {
        message_id: String,
        kind: String,
        target_id: String,
    },
    MessageMarkedRead {
        message_id: String,
    },

    /// The server sent an explicit error.
    ErrorOccurred {
        message: String,
    },
    /// A well-formed frame with a code outside the message table.
    UnrecognizedType {
        code: i32,
    },
}

impl Event {
    /// The tracked operation this event concludes, if it is a response
    /// outcome for one.
    pub fn concludes(&self) -> Option<Operation> {
        match self {
            Event::LoginSuccess { .. } | Event::LoginFailed { .. } => Some(Operation::Login),
            Event::LogoutSuccess | Event::LogoutFailed { .. } => Some(Operation::Logout),
            Event::RegisterSuccess { .. } | Event::RegisterFailed { .. } => {
                Some(Operation::Register)
            }
            Event::VerifyCodeSent | Event::VerifyCodeFailed { .. } => Some(Operation::VerifyCode),
            _ => None,
        }
    }
}

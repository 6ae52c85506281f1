//! Maps decoded messages onto [`Event`]s.
//!
//! Most responses copy string fields straight across. List responses carry
//! one field whose value is a JSON array; those are parsed here and each
//! object is projected onto a record type, renaming the server's snake_case
//! keys. A key that is missing or has an unexpected JSON kind turns into an
//! empty/zero/false value rather than dropping the record.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    event::{
        Event, FailureReason, FriendRecord, GroupRecord, HistoryRecord, MemberRecord, UserRecord,
    },
    message::{Message, MessageType},
};

const STATUS_OK: &str = "0";

type JsonObject = Map<String, Value>;

trait Record: Sized {
    fn from_object(object: &JsonObject) -> Self;
}

impl Record for FriendRecord {
    fn from_object(object: &JsonObject) -> Self {
        FriendRecord {
            user_id: text(object, "id"),
            username: text(object, "username"),
            online: flag(object, "online"),
        }
    }
}

impl Record for UserRecord {
    fn from_object(object: &JsonObject) -> Self {
        UserRecord {
            user_id: text(object, "id"),
            username: text(object, "username"),
            online: flag(object, "online"),
        }
    }
}

impl Record for GroupRecord {
    fn from_object(object: &JsonObject) -> Self {
        GroupRecord {
            group_id: text(object, "group_id"),
            group_name: text(object, "group_name"),
            member_count: count(object, "member_count"),
        }
    }
}

impl Record for MemberRecord {
    fn from_object(object: &JsonObject) -> Self {
        MemberRecord {
            user_id: text(object, "user_id"),
            username: text(object, "username"),
            role: text(object, "role"),
        }
    }
}

impl Record for HistoryRecord {
    fn from_object(object: &JsonObject) -> Self {
        HistoryRecord {
            message_id: text(object, "message_id"),
            from_user_id: text(object, "from_user_id"),
            from_username: text(object, "from_username"),
            content: text(object, "content"),
            timestamp: text(object, "timestamp"),
        }
    }
}

// Ids come back as numbers from some server builds, so numbers are
// stringified.
fn text(object: &JsonObject, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn flag(object: &JsonObject, key: &str) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn count(object: &JsonObject, key: &str) -> u32 {
    object
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(0)
}

fn records<T: Record>(message: &Message, key: &str) -> Vec<T> {
    let raw = message.field(key).unwrap_or_default();
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(T::from_object)
            .collect(),
        Ok(_) => {
            warn!(field = key, "nested list is not a JSON array");
            Vec::new()
        }
        Err(error) => {
            warn!(field = key, %error, "nested list is not valid JSON");
            Vec::new()
        }
    }
}

fn succeeded(message: &Message) -> bool {
    message.field("status") == Some(STATUS_OK)
}

fn server_reason(message: &Message, fallback: &str) -> FailureReason {
    FailureReason::Server(message.field("message").unwrap_or(fallback).to_string())
}

/// Produces the event for `message`, or `None` for acknowledgements that
/// carry nothing for higher layers.
pub fn dispatch(message: &Message) -> Option<Event> {
    let Some(kind) = message.kind() else {
        return Some(Event::UnrecognizedType {
            code: message.code(),
        });
    };

    let event = match kind {
        MessageType::LoginResponse => {
            if succeeded(message) {
                if let Some(count) = message.field("offlineMsgCount") {
                    debug!(offline = count, "server reports queued offline messages");
                }
                Event::LoginSuccess {
                    user_id: message.text("userId"),
                    username: message.text("username"),
                }
            } else {
                Event::LoginFailed {
                    reason: server_reason(message, "login failed"),
                }
            }
        }
        MessageType::LogoutResponse => {
            if succeeded(message) {
                Event::LogoutSuccess
            } else {
                Event::LogoutFailed {
                    reason: server_reason(message, "logout failed"),
                }
            }
        }
        MessageType::RegisterResponse => {
            if succeeded(message) {
                // The server spells this one in lower case.
                Event::RegisterSuccess {
                    user_id: message.text("userid"),
                }
            } else {
                Event::RegisterFailed {
                    reason: server_reason(message, "registration failed"),
                }
            }
        }
        MessageType::VerifyCodeResponse => {
            if succeeded(message) {
                Event::VerifyCodeSent
            } else {
                Event::VerifyCodeFailed {
                    reason: server_reason(message, "failed to send verification code"),
                }
            }
        }
        MessageType::Error => Event::ErrorOccurred {
            message: message
                .field("errorMsg")
                .or_else(|| message.field("message"))
                .unwrap_or("unknown error")
                .to_string(),
        },
        MessageType::AddFriendResponse => {
            if succeeded(message) {
                Event::FriendAdded {
                    friend_id: message.text("friendId"),
                    username: message.text("username"),
                }
            } else {
                Event::ErrorOccurred {
                    message: format!("failed to add friend: {}", message.text("message")),
                }
            }
        }
        MessageType::PrivateChat => Event::PrivateMessageReceived {
            from_user_id: message.text("fromUserId"),
            from_username: message.text("fromUsername"),
            content: message.text("content"),
            message_id: message.text("messageId"),
            timestamp: message.text("timestamp"),
        },
        MessageType::GroupChat => Event::GroupMessageReceived {
            group_id: message.text("groupId"),
            from_user_id: message.text("fromUserId"),
            from_username: message.text("fromUsername"),
            content: message.text("content"),
            message_id: message.text("messageId"),
            timestamp: message.text("timestamp"),
        },
        MessageType::AddFriendRequest => Event::FriendRequestReceived {
            from_user_id: message.text("fromUserId"),
            from_username: message.text("fromUsername"),
        },
        MessageType::AcceptFriendResponse => Event::FriendRequestAccepted {
            user_id: message.text("userId"),
            username: message.text("username"),
        },
        MessageType::RejectFriendResponse => Event::FriendRequestRejected {
            user_id: message.text("userId"),
        },
        MessageType::UserFriendsResponse => {
            Event::FriendsListChanged(records(message, "friends"))
        }
        MessageType::UserListResponse => Event::UsersListChanged(records(message, "users")),
        MessageType::GroupListResponse => Event::GroupsListChanged(records(message, "groups")),
        MessageType::CreateGroupResponse => Event::GroupCreated {
            group_id: message.text("groupId"),
            group_name: message.text("groupName"),
        },
        MessageType::JoinGroupResponse => Event::JoinedGroup {
            group_id: message.text("groupId"),
            group_name: message.text("groupName"),
        },
        MessageType::LeaveGroupResponse => Event::LeftGroup {
            group_id: message.text("groupId"),
        },
        MessageType::GroupMembersResponse => Event::GroupMembersReceived {
            group_id: message.text("groupId"),
            members: records(message, "members"),
        },
        MessageType::ChatHistoryResponse => Event::ChatHistoryReceived {
            kind: message.text("type"),
            target_id: message.text("targetId"),
            messages: records(message, "messages"),
        },
        MessageType::RecallMessageResponse => Event::MessageRecalled {
            message_id: message.text("messageId"),
            kind: message.text("type"),
            target_id: message.text("targetId"),
        },
        MessageType::MarkMessageReadResponse => Event::MessageMarkedRead {
            message_id: message.text("messageId"),
        },
        MessageType::HeartbeatResponse | MessageType::FriendRequestsResponse => return None,
        other => {
            debug!(kind = %other, "no handler for message type");
            return None;
        }
    };

    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(frame: &str) -> Message {
        Message::decode(frame).expect("decode")
    }

    #[test]
    fn friends_list_decodes_nested_json() {
        let message = decode(r#"27:friends=[{"id":7,"username":"bob","online":true}]"#);
        assert_eq!(
            dispatch(&message),
            Some(Event::FriendsListChanged(vec![FriendRecord {
                user_id: "7".into(),
                username: "bob".into(),
                online: true,
            }]))
        );
    }

    #[test]
    fn nested_records_tolerate_missing_keys_and_skip_non_objects() {
        let message =
            decode(r#"27:friends=[{"id":"alice-1"},42,"x",{"username":"carl","online":"yes"}]"#);
        assert_eq!(
            dispatch(&message),
            Some(Event::FriendsListChanged(vec![
                FriendRecord {
                    user_id: "alice-1".into(),
                    username: String::new(),
                    online: false,
                },
                FriendRecord {
                    user_id: String::new(),
                    username: "carl".into(),
                    online: false,
                },
            ]))
        );
    }

    #[test]
    fn invalid_nested_json_yields_empty_list() {
        assert_eq!(
            dispatch(&decode("21:users={not json")),
            Some(Event::UsersListChanged(Vec::new()))
        );
        assert_eq!(
            dispatch(&decode(r#"21:users={"id":1}"#)),
            Some(Event::UsersListChanged(Vec::new()))
        );
        assert_eq!(
            dispatch(&decode("23:")),
            Some(Event::GroupsListChanged(Vec::new()))
        );
    }

    #[test]
    fn group_list_renames_snake_case_fields() {
        let message =
            decode(r#"23:groups=[{"group_id":"g1","group_name":"rustaceans","member_count":12}]"#);
        assert_eq!(
            dispatch(&message),
            Some(Event::GroupsListChanged(vec![GroupRecord {
                group_id: "g1".into(),
                group_name: "rustaceans".into(),
                member_count: 12,
            }]))
        );
    }

    #[test]
    fn group_members_carry_group_id() {
        let message = decode(
            r#"25:groupId=g1;members=[{"user_id":3,"username":"carol","role":"owner"}]"#,
        );
        assert_eq!(
            dispatch(&message),
            Some(Event::GroupMembersReceived {
                group_id: "g1".into(),
                members: vec![MemberRecord {
                    user_id: "3".into(),
                    username: "carol".into(),
                    role: "owner".into(),
                }],
            })
        );
    }

    #[test]
    fn chat_history_projects_each_message() {
        let message = decode(
            r#"31:messages=[{"message_id":"m1","from_user_id":"2","from_username":"bob","content":"yo","timestamp":"1700000000000"}];targetId=2;type=private"#,
        );
        assert_eq!(
            dispatch(&message),
            Some(Event::ChatHistoryReceived {
                kind: "private".into(),
                target_id: "2".into(),
                messages: vec![HistoryRecord {
                    message_id: "m1".into(),
                    from_user_id: "2".into(),
                    from_username: "bob".into(),
                    content: "yo".into(),
                    timestamp: "1700000000000".into(),
                }],
            })
        );
    }

    #[test]
    fn status_zero_is_the_only_success() {
        assert_eq!(
            dispatch(&decode("2:status=0;userId=7;username=alice")),
            Some(Event::LoginSuccess {
                user_id: "7".into(),
                username: "alice".into()
            })
        );
        assert_eq!(
            dispatch(&decode("2:status=1;message=bad password")),
            Some(Event::LoginFailed {
                reason: FailureReason::Server("bad password".into())
            })
        );
        assert_eq!(
            dispatch(&decode("11:status=")),
            Some(Event::VerifyCodeFailed {
                reason: FailureReason::Server("failed to send verification code".into())
            })
        );
        assert_eq!(
            dispatch(&decode("9:status=0;userid=12")),
            Some(Event::RegisterSuccess {
                user_id: "12".into()
            })
        );
    }

    #[test]
    fn add_friend_failure_becomes_error_event() {
        assert_eq!(
            dispatch(&decode("29:status=3;message=no such user")),
            Some(Event::ErrorOccurred {
                message: "failed to add friend: no such user".into()
            })
        );
    }

    #[test]
    fn server_error_prefers_error_msg() {
        assert_eq!(
            dispatch(&decode("5:errorMsg=boom;message=other")),
            Some(Event::ErrorOccurred {
                message: "boom".into()
            })
        );
        assert_eq!(
            dispatch(&decode("5:")),
            Some(Event::ErrorOccurred {
                message: "unknown error".into()
            })
        );
    }

    #[test]
    fn private_chat_maps_fields_verbatim() {
        let message =
            decode("12:content=a=b;fromUserId=3;fromUsername=carol;messageId=m5;timestamp=17");
        assert_eq!(
            dispatch(&message),
            Some(Event::PrivateMessageReceived {
                from_user_id: "3".into(),
                from_username: "carol".into(),
                content: "a=b".into(),
                message_id: "m5".into(),
                timestamp: "17".into(),
            })
        );
    }

    #[test]
    fn acknowledgements_and_unknown_codes() {
        assert_eq!(dispatch(&decode("7:timestamp=1")), None);
        assert_eq!(dispatch(&decode("41:requests=[]")), None);
        assert_eq!(dispatch(&decode("48:file=x")), None);
        assert_eq!(
            dispatch(&decode("99:x=1")),
            Some(Event::UnrecognizedType { code: 99 })
        );
    }
}

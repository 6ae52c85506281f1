use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
};
use tracing::{info, warn};

use crate::{
    client::{ChatClient, EventStream},
    config::ClientConfig,
    event::{ChatKind, Event},
    store::MemoryStore,
};

const USAGE: &str = "commands: /login u p, /logout, /register u email p code, /code email, \
/msg id text, /group id text, /friends, /add id, /accept id, /reject id, /groups, \
/create name, /join id, /leave id, /members id, /users, /history private|group id [n], \
/local private|group id [n], /quit";

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
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
    VerifyCode {
        email: String,
    },
    Private {
        to_user_id: String,
        text: String,
    },
    Group {
        group_id: String,
        text: String,
    },
    Friends,
    AddFriend {
        friend_id: String,
    },
    Accept {
        from_user_id: String,
    },
    Reject {
        from_user_id: String,
    },
    Groups,
    CreateGroup {
        name: String,
    },
    Join {
        group_id: String,
    },
    Leave {
        group_id: String,
    },
    Members {
        group_id: String,
    },
    Users,
    History {
        kind: ChatKind,
        target_id: String,
        count: Option<usize>,
    },
    LocalHistory {
        kind: ChatKind,
        target_id: String,
        count: Option<usize>,
    },
    Quit,
}

/// Output line and the stream it belongs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout(String),
    Stderr(String),
}

pub async fn run(config: ClientConfig) -> Result<()> {
    let server = config.server_addr.clone();
    let (client, mut events) = ChatClient::start(config, MemoryStore::new());

    client.connect().await?;
    wait_until_connected(&mut events, &server).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let closed = matches!(event, Event::Disconnected | Event::ConnectionError { .. });
                if let Some(output) = render(&event) {
                    write_output(&output).await?;
                }
                if closed {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&client, &line).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }

    client.disconnect().await?;
    client.shutdown()?;
    Ok(())
}

async fn wait_until_connected(events: &mut EventStream, server: &str) -> Result<()> {
    loop {
        match events.recv().await {
            Some(Event::Connected) => {
                info!("connected to {server}");
                write_stdout(&format!("*** connected to {server}")).await?;
                return Ok(());
            }
            Some(Event::ConnectionError { reason }) => {
                bail!("failed to connect to {server}: {reason}")
            }
            Some(_) => {}
            None => bail!("client stopped before connecting to {server}"),
        }
    }
}

/// Returns `false` once the user asked to leave.
async fn handle_line(client: &ChatClient, line: &str) -> Result<bool> {
    let input = match parse_input(line) {
        Ok(Some(input)) => input,
        Ok(None) => return Ok(true),
        Err(usage) => {
            write_stderr(&format!("!!! {usage}")).await?;
            return Ok(true);
        }
    };

    if input == Input::Quit {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    if let Err(error) = perform(client, input).await {
        write_stderr(&format!("!!! {error}")).await?;
    }
    Ok(true)
}

async fn perform(client: &ChatClient, input: Input) -> crate::Result<()> {
    match input {
        Input::Login { username, password } => client.login(&username, &password).await,
        Input::Logout => client.logout().await,
        Input::Register {
            username,
            email,
            password,
            code,
        } => client.register_user(&username, &email, &password, &code).await,
        Input::VerifyCode { email } => client.send_verify_code(&email).await,
        Input::Private { to_user_id, text } => {
            client.send_private_message(&to_user_id, &text).await
        }
        Input::Group { group_id, text } => client.send_group_message(&group_id, &text).await,
        Input::Friends => client.get_friends_list().await,
        Input::AddFriend { friend_id } => client.add_friend(&friend_id).await,
        Input::Accept { from_user_id } => client.accept_friend_request(&from_user_id).await,
        Input::Reject { from_user_id } => client.reject_friend_request(&from_user_id).await,
        Input::Groups => client.get_groups_list().await,
        Input::CreateGroup { name } => client.create_group(&name).await,
        Input::Join { group_id } => client.join_group(&group_id).await,
        Input::Leave { group_id } => client.leave_group(&group_id).await,
        Input::Members { group_id } => client.get_group_members(&group_id).await,
        Input::Users => client.get_users_list().await,
        Input::History {
            kind,
            target_id,
            count,
        } => client.get_chat_history(kind, &target_id, count).await,
        Input::LocalHistory {
            kind,
            target_id,
            count,
        } => client.load_local_history(kind, &target_id, count).await,
        Input::Quit => Ok(()),
    }
}

/// Parses one line of input. Blank lines yield `Ok(None)`; anything that is
/// not a known command yields the usage text.
pub fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();
    let arg = |index: usize| args.get(index).map(|value| value.to_string());

    let input = match (command.to_ascii_lowercase().as_str(), args.len()) {
        ("/quit", 0) => Input::Quit,
        ("/login", 2) => Input::Login {
            username: args[0].to_string(),
            password: args[1].to_string(),
        },
        ("/logout", 0) => Input::Logout,
        ("/register", 4) => Input::Register {
            username: args[0].to_string(),
            email: args[1].to_string(),
            password: args[2].to_string(),
            code: args[3].to_string(),
        },
        ("/code", 1) => Input::VerifyCode {
            email: args[0].to_string(),
        },
        ("/msg", n) if n >= 2 => {
            let (target, text) = split_target(rest);
            Input::Private {
                to_user_id: target,
                text,
            }
        }
        ("/group", n) if n >= 2 => {
            let (target, text) = split_target(rest);
            Input::Group {
                group_id: target,
                text,
            }
        }
        ("/friends", 0) => Input::Friends,
        ("/add", 1) => Input::AddFriend {
            friend_id: args[0].to_string(),
        },
        ("/accept", 1) => Input::Accept {
            from_user_id: args[0].to_string(),
        },
        ("/reject", 1) => Input::Reject {
            from_user_id: args[0].to_string(),
        },
        ("/groups", 0) => Input::Groups,
        ("/create", n) if n >= 1 => Input::CreateGroup {
            name: rest.to_string(),
        },
        ("/join", 1) => Input::Join {
            group_id: args[0].to_string(),
        },
        ("/leave", 1) => Input::Leave {
            group_id: args[0].to_string(),
        },
        ("/members", 1) => Input::Members {
            group_id: args[0].to_string(),
        },
        ("/users", 0) => Input::Users,
        ("/history" | "/local", 2 | 3) => {
            let kind: ChatKind = args[0].parse()?;
            let count = match arg(2) {
                Some(count) => Some(
                    count
                        .parse::<usize>()
                        .map_err(|_| format!("invalid message count '{count}'"))?,
                ),
                None => None,
            };
            let target_id = args[1].to_string();
            if command.eq_ignore_ascii_case("/history") {
                Input::History {
                    kind,
                    target_id,
                    count,
                }
            } else {
                Input::LocalHistory {
                    kind,
                    target_id,
                    count,
                }
            }
        }
        _ => return Err(USAGE.to_string()),
    };
    Ok(Some(input))
}

fn split_target(rest: &str) -> (String, String) {
    let (target, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    (target.to_string(), text.trim().to_string())
}

fn display_name<'a>(username: &'a str, user_id: &'a str) -> &'a str {
    if username.is_empty() { user_id } else { username }
}

/// Formats an event for the terminal; `None` for events with nothing to show.
pub fn render(event: &Event) -> Option<Output> {
    let line = match event {
        Event::Connected => "*** connected".to_string(),
        Event::Disconnected => "*** disconnected from server".to_string(),
        Event::ConnectionError { reason } => {
            return Some(Output::Stderr(format!("!!! connection error: {reason}")));
        }
        Event::LoginSuccess { user_id, username } => {
            format!("*** logged in as {username} ({user_id})")
        }
        Event::LoginFailed { reason } => {
            return Some(Output::Stderr(format!("!!! login failed: {reason}")));
        }
        Event::LogoutSuccess => "*** logged out".to_string(),
        Event::LogoutFailed { reason } => {
            return Some(Output::Stderr(format!("!!! logout failed: {reason}")));
        }
        Event::RegisterSuccess { user_id } => format!("*** registered as user {user_id}"),
        Event::RegisterFailed { reason } => {
            return Some(Output::Stderr(format!("!!! registration failed: {reason}")));
        }
        Event::VerifyCodeSent => "*** verification code sent".to_string(),
        Event::VerifyCodeFailed { reason } => {
            return Some(Output::Stderr(format!(
                "!!! could not send verification code: {reason}"
            )));
        }
        Event::PrivateMessageReceived {
            from_user_id,
            from_username,
            content,
            ..
        } => format!("<{}> {content}", display_name(from_username, from_user_id)),
        Event::GroupMessageReceived {
            group_id,
            from_user_id,
            from_username,
            content,
            ..
        } => format!(
            "[{group_id}] <{}> {content}",
            display_name(from_username, from_user_id)
        ),
        Event::FriendRequestReceived {
            from_user_id,
            from_username,
        } => format!(
            "*** friend request from {} ({from_user_id})",
            display_name(from_username, from_user_id)
        ),
        Event::FriendRequestAccepted { user_id, username } => format!(
            "*** {} accepted your friend request",
            display_name(username, user_id)
        ),
        Event::FriendRequestRejected { user_id } => {
            format!("*** {user_id} rejected your friend request")
        }
        Event::FriendAdded { friend_id, username } => {
            format!("*** {} is now a friend", display_name(username, friend_id))
        }
        Event::FriendsListChanged(friends) => listing(
            "friends",
            friends.iter().map(|friend| {
                presence(&friend.username, &friend.user_id, friend.online)
            }),
        ),
        Event::UsersListChanged(users) => listing(
            "users",
            users
                .iter()
                .map(|user| presence(&user.username, &user.user_id, user.online)),
        ),
        Event::GroupsListChanged(groups) => listing(
            "groups",
            groups.iter().map(|group| {
                format!(
                    "{} ({}, {} members)",
                    group.group_name, group.group_id, group.member_count
                )
            }),
        ),
        Event::GroupCreated {
            group_id,
            group_name,
        } => format!("*** created group {group_name} ({group_id})"),
        Event::JoinedGroup {
            group_id,
            group_name,
        } => format!("*** joined group {group_name} ({group_id})"),
        Event::LeftGroup { group_id } => format!("*** left group {group_id}"),
        Event::GroupMembersReceived { group_id, members } => listing(
            &format!("members of {group_id}"),
            members.iter().map(|member| {
                format!(
                    "{} ({}, {})",
                    display_name(&member.username, &member.user_id),
                    member.user_id,
                    member.role
                )
            }),
        ),
        Event::ChatHistoryReceived {
            kind,
            target_id,
            messages,
        } => {
            let mut lines = vec![format!(
                "*** {} {kind} messages with {target_id}",
                messages.len()
            )];
            lines.extend(messages.iter().map(|message| {
                format!(
                    "  <{}> {}",
                    display_name(&message.from_username, &message.from_user_id),
                    message.content
                )
            }));
            lines.join("\n")
        }
        Event::LocalChatHistoryLoaded {
            kind,
            target_id,
            messages,
        } => {
            let mut lines = vec![format!(
                "*** {} stored {kind} messages with {target_id}",
                messages.len()
            )];
            lines.extend(
                messages
                    .iter()
                    .map(|message| format!("  <{}> {}", message.from_user_id, message.content)),
            );
            lines.join("\n")
        }
        Event::OfflineMessagesProcessed { count } => {
            format!("*** {count} offline messages delivered")
        }
        Event::MessageRecalled { message_id, .. } => {
            format!("*** message {message_id} was recalled")
        }
        Event::MessageMarkedRead { .. } => return None,
        Event::ErrorOccurred { message } => return Some(Output::Stderr(format!("!!! {message}"))),
        Event::UnrecognizedType { .. } => return None,
    };
    Some(Output::Stdout(line))
}

fn presence(username: &str, user_id: &str, online: bool) -> String {
    let state = if online { "online" } else { "offline" };
    format!("{} ({user_id}, {state})", display_name(username, user_id))
}

fn listing(label: &str, entries: impl Iterator<Item = String>) -> String {
    let entries: Vec<String> = entries.collect();
    if entries.is_empty() {
        format!("*** no {label}")
    } else {
        format!("*** {label}: {}", entries.join(", "))
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn write_output(output: &Output) -> Result<()> {
    let written = match output {
        Output::Stdout(line) => write_stdout(line).await,
        Output::Stderr(line) => write_stderr(line).await,
    };
    written.context("failed to write to terminal")
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}

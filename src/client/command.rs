//! Terminal command parsing for the chat client
//!
//! A line starting with `/` is a command; anything else non-empty is sent as
//! public text. Command lines are tokenized with shell-like rules: whitespace
//! splits tokens, double quotes group spaces, and backslash escapes work both
//! inside and outside quotes. Every command validates its arguments locally
//! before a request is built, so bad input never reaches the wire.

use std::fmt;

use bytes::Bytes;

use crate::protocol::codec;
use crate::protocol::messages::*;

/// What a parsed input line asks the client to do.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a request to the server
    Send(Request),
    /// Leave the session
    Quit,
}

/// A validated client request, ready to marshal.
#[derive(Debug, Clone)]
pub enum Request {
    Identify(IdentifyRequest),
    Status(StatusRequest),
    Users(UsersRequest),
    Text(TextRequest),
    PublicText(PublicTextRequest),
    NewRoom(NewRoomRequest),
    Invite(InviteRequest),
    JoinRoom(JoinRoomRequest),
    RoomUsers(RoomUsersRequest),
    RoomText(RoomTextRequest),
    LeaveRoom(LeaveRoomRequest),
    Disconnect(DisconnectRequest),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Identify(_) => MessageType::Identify,
            Request::Status(_) => MessageType::Status,
            Request::Users(_) => MessageType::Users,
            Request::Text(_) => MessageType::Text,
            Request::PublicText(_) => MessageType::PublicText,
            Request::NewRoom(_) => MessageType::NewRoom,
            Request::Invite(_) => MessageType::Invite,
            Request::JoinRoom(_) => MessageType::JoinRoom,
            Request::RoomUsers(_) => MessageType::RoomUsers,
            Request::RoomText(_) => MessageType::RoomText,
            Request::LeaveRoom(_) => MessageType::LeaveRoom,
            Request::Disconnect(_) => MessageType::Disconnect,
        }
    }

    /// Marshal into a frame payload.
    pub fn encode(&self) -> Bytes {
        match self {
            Request::Identify(request) => codec::marshal(request),
            Request::Status(request) => codec::marshal(request),
            Request::Users(request) => codec::marshal(request),
            Request::Text(request) => codec::marshal(request),
            Request::PublicText(request) => codec::marshal(request),
            Request::NewRoom(request) => codec::marshal(request),
            Request::Invite(request) => codec::marshal(request),
            Request::JoinRoom(request) => codec::marshal(request),
            Request::RoomUsers(request) => codec::marshal(request),
            Request::RoomText(request) => codec::marshal(request),
            Request::LeaveRoom(request) => codec::marshal(request),
            Request::Disconnect(request) => codec::marshal(request),
        }
    }
}

/// Why a line could not be turned into an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line was blank
    Empty,
    /// The line was `/` with nothing after it
    EmptyCommand,
    /// Tokenization failed (unterminated quote, dangling escape)
    Syntax(&'static str),
    /// A required argument is absent
    MissingArgument(&'static str),
    /// An argument has the wrong shape
    InvalidArgument(&'static str),
    /// The command name is not recognized
    UnknownCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty input"),
            ParseError::EmptyCommand => write!(f, "empty command"),
            ParseError::Syntax(msg) => write!(f, "{}", msg),
            ParseError::MissingArgument(msg) => write!(f, "{}", msg),
            ParseError::InvalidArgument(msg) => write!(f, "{}", msg),
            ParseError::UnknownCommand(command) => write!(f, "unknown command: /{}", command),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one input line into an action.
pub fn parse_line(line: &str) -> Result<Action, ParseError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    // Non-command input is public text, sent exactly as typed.
    if !trimmed.starts_with('/') {
        return Ok(Action::Send(Request::PublicText(PublicTextRequest::new(
            trimmed,
        ))));
    }

    let tokens = tokenize(&trimmed[1..])?;
    if tokens.is_empty() || tokens[0].is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    match tokens[0].as_str() {
        "quit" => Ok(Action::Quit),
        "identify" => build_identify(&tokens),
        "status" => build_status(&tokens),
        "users" => Ok(Action::Send(Request::Users(UsersRequest::new()))),
        "msg" => build_msg(&tokens),
        "all" => build_all(&tokens),
        "newroom" => build_newroom(&tokens),
        "invite" => build_invite(&tokens),
        "join" => build_join(&tokens),
        "roomusers" => build_roomusers(&tokens),
        "roommsg" => build_roommsg(&tokens),
        "leave" => build_leave(&tokens),
        "disconnect" => Ok(Action::Send(Request::Disconnect(DisconnectRequest::new()))),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// Split a command line into tokens.
///
/// Rules: whitespace separates tokens outside quotes; a `"` at token start
/// opens a quoted token that runs to the closing `"`; `\n`, `\t`, `\\`, `\"`
/// decode to their escaped character and `\X` to a literal `X`, inside and
/// outside quotes.
fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        // Skip inter-token whitespace.
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut token = String::new();
        let mut in_quotes = chars.next_if_eq(&'"').is_some();

        loop {
            let Some(&ch) = chars.peek() else {
                if in_quotes {
                    return Err(ParseError::Syntax("unterminated quote"));
                }
                break;
            };

            if !in_quotes && ch.is_whitespace() {
                break;
            }

            if ch == '\\' {
                chars.next();
                let Some(escaped) = chars.next() else {
                    return Err(ParseError::Syntax("invalid escape sequence"));
                };
                token.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                continue;
            }

            if in_quotes && ch == '"' {
                chars.next();
                in_quotes = false;
                break;
            }

            token.push(ch);
            chars.next();
        }

        tokens.push(token);
    }

    Ok(tokens)
}

fn build_identify(tokens: &[String]) -> Result<Action, ParseError> {
    let username = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("missing username"))?;
    if !username_is_valid(username) {
        return Err(ParseError::InvalidArgument("invalid username"));
    }

    Ok(Action::Send(Request::Identify(IdentifyRequest::new(
        username,
    ))))
}

fn build_status(tokens: &[String]) -> Result<Action, ParseError> {
    let literal = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("missing status"))?;
    let status = Status::parse(literal).ok_or(ParseError::InvalidArgument(
        "invalid status (expected ACTIVE/AWAY/BUSY)",
    ))?;

    Ok(Action::Send(Request::Status(StatusRequest::new(status))))
}

fn build_msg(tokens: &[String]) -> Result<Action, ParseError> {
    if tokens.len() < 3 {
        return Err(ParseError::MissingArgument("usage: /msg <username> <text>"));
    }

    let username = &tokens[1];
    if !username_is_valid(username) {
        return Err(ParseError::InvalidArgument("invalid username"));
    }

    let text = &tokens[2];
    if text.is_empty() {
        return Err(ParseError::InvalidArgument("text must not be empty"));
    }

    Ok(Action::Send(Request::Text(TextRequest::new(username, text))))
}

fn build_all(tokens: &[String]) -> Result<Action, ParseError> {
    let text = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("usage: /all <text>"))?;
    if text.is_empty() {
        return Err(ParseError::InvalidArgument("text must not be empty"));
    }

    Ok(Action::Send(Request::PublicText(PublicTextRequest::new(
        text,
    ))))
}

fn build_newroom(tokens: &[String]) -> Result<Action, ParseError> {
    let room_name = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("usage: /newroom <roomname>"))?;
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    Ok(Action::Send(Request::NewRoom(NewRoomRequest::new(
        room_name,
    ))))
}

fn build_invite(tokens: &[String]) -> Result<Action, ParseError> {
    if tokens.len() < 3 {
        return Err(ParseError::MissingArgument(
            "usage: /invite <roomname> <user1> [user2 ...]",
        ));
    }

    let room_name = &tokens[1];
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    let usernames = &tokens[2..];
    for username in usernames {
        if !username_is_valid(username) {
            return Err(ParseError::InvalidArgument("invalid username in invite list"));
        }
    }

    Ok(Action::Send(Request::Invite(InviteRequest::new(
        room_name,
        usernames.to_vec(),
    ))))
}

fn build_join(tokens: &[String]) -> Result<Action, ParseError> {
    let room_name = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("usage: /join <roomname>"))?;
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    Ok(Action::Send(Request::JoinRoom(JoinRoomRequest::new(
        room_name,
    ))))
}

fn build_roomusers(tokens: &[String]) -> Result<Action, ParseError> {
    let room_name = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("usage: /roomusers <roomname>"))?;
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    Ok(Action::Send(Request::RoomUsers(RoomUsersRequest::new(
        room_name,
    ))))
}

fn build_roommsg(tokens: &[String]) -> Result<Action, ParseError> {
    if tokens.len() < 3 {
        return Err(ParseError::MissingArgument(
            "usage: /roommsg <roomname> <text>",
        ));
    }

    let room_name = &tokens[1];
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    let text = &tokens[2];
    if text.is_empty() {
        return Err(ParseError::InvalidArgument("text must not be empty"));
    }

    Ok(Action::Send(Request::RoomText(RoomTextRequest::new(
        room_name, text,
    ))))
}

fn build_leave(tokens: &[String]) -> Result<Action, ParseError> {
    let room_name = tokens
        .get(1)
        .ok_or(ParseError::MissingArgument("usage: /leave <roomname>"))?;
    if !room_name_is_valid(room_name) {
        return Err(ParseError::InvalidArgument("invalid room name"));
    }

    Ok(Action::Send(Request::LeaveRoom(LeaveRoomRequest::new(
        room_name,
    ))))
}

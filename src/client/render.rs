//! Pretty-printing of server events for the terminal
//!
//! Every recognized server message kind gets a typed header plus `key: value`
//! lines, so each kind is distinguishable at a glance. Output is plain text,
//! never raw JSON.

use std::io::{self, Write};

use serde_json::Value;

use crate::protocol::messages::MessageType;

/// Print one decoded server message in human-readable form.
pub fn print_event(root: &Value, out: &mut impl Write) -> io::Result<()> {
    let message_type = root
        .get("type")
        .and_then(Value::as_str)
        .and_then(MessageType::parse);

    let Some(message_type) = message_type else {
        writeln!(out, "server: invalid message (missing/unknown type)")?;
        return out.flush();
    };

    writeln!(out, "[{}]", message_type)?;

    match message_type {
        MessageType::NewUser => {
            kv(out, "username", root, "username")?;
        }
        MessageType::NewStatus => {
            kv(out, "username", root, "username")?;
            kv(out, "status", root, "status")?;
        }
        MessageType::TextFrom | MessageType::PublicTextFrom => {
            kv(out, "from", root, "username")?;
            kv(out, "text", root, "text")?;
        }
        MessageType::Invitation => {
            kv(out, "from", root, "username")?;
            kv(out, "roomname", root, "roomname")?;
        }
        MessageType::JoinedRoom | MessageType::LeftRoom => {
            kv(out, "roomname", root, "roomname")?;
            kv(out, "username", root, "username")?;
        }
        MessageType::Disconnected => {
            kv(out, "username", root, "username")?;
        }
        MessageType::UserList => {
            user_map(out, root)?;
        }
        MessageType::RoomUserList => {
            kv(out, "roomname", root, "roomname")?;
            user_map(out, root)?;
        }
        MessageType::RoomTextFrom => {
            kv(out, "roomname", root, "roomname")?;
            kv(out, "from", root, "username")?;
            kv(out, "text", root, "text")?;
        }
        MessageType::Response => {
            kv(out, "operation", root, "operation")?;
            kv(out, "result", root, "result")?;
            kv(out, "extra", root, "extra")?;
        }
        _ => {
            writeln!(out, "server: message type recognized but not explicitly printed")?;
        }
    }

    out.flush()
}

fn kv(out: &mut impl Write, label: &str, root: &Value, key: &str) -> io::Result<()> {
    match root.get(key).and_then(Value::as_str) {
        Some(value) => writeln!(out, "{}: {}", label, value),
        None => writeln!(out, "{}: <missing>", label),
    }
}

fn user_map(out: &mut impl Write, root: &Value) -> io::Result<()> {
    let Some(users) = root.get("users").and_then(Value::as_object) else {
        return writeln!(out, "users: <missing>");
    };

    writeln!(out, "users:")?;
    for (username, status) in users {
        let status = status.as_str().unwrap_or("<invalid>");
        writeln!(out, "  - {}: {}", username, status)?;
    }
    Ok(())
}

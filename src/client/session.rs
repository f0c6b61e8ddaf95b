//! Interactive client session
//!
//! A single cooperative loop multiplexes two input sources: frames from the
//! server socket and lines from stdin. Server frames are rendered to stdout;
//! stdin lines go through the command parser and, once the identify-gate is
//! open, onto the wire. Socket close exits cleanly; stdin EOF behaves like
//! `/quit`.

use std::io::Write;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::client::command::{self, Action, ParseError};
use crate::client::render;
use crate::config::DEFAULT_MAX_FRAME_BYTES;
use crate::error::{ChatError, Result};
use crate::protocol::codec;
use crate::protocol::frame::{FrameReader, FrameWriter};
use crate::protocol::messages::{DisconnectRequest, MessageType};

enum Flow {
    Continue,
    Quit,
}

/// Connect to the server and run the interactive loop until the session
/// ends. Returns Ok on a clean shutdown (server close, `/quit`, stdin EOF).
pub async fn run(host: &str, port: u16) -> Result<()> {
    let stream = TcpStream::connect((host, port)).await.map_err(|err| {
        ChatError::connection(format!("failed to connect to {}:{}: {}", host, port, err))
    })?;

    let (read_half, write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half, DEFAULT_MAX_FRAME_BYTES);
    let mut writer = FrameWriter::new(write_half);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let cancel = CancellationToken::new();

    // The gate starts closed; only RESPONSE{IDENTIFY, SUCCESS} opens it.
    let mut is_identified = false;
    let mut username = String::new();

    loop {
        draw_prompt(is_identified, &username);

        tokio::select! {
            incoming = frames.read_frame() => match incoming {
                Ok(Some(frame)) => {
                    handle_server_frame(&frame, &mut is_identified, &mut username);
                }
                Ok(None) => {
                    eprintln!("server: connection closed");
                    return Ok(());
                }
                Err(err) => {
                    eprintln!("error: failed to read from server");
                    return Err(ChatError::network(err.to_string()));
                }
            },

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    match handle_input_line(&line, is_identified, &cancel, &mut writer).await? {
                        Flow::Continue => {}
                        Flow::Quit => {
                            send_disconnect_best_effort(&cancel, &mut writer).await;
                            return Ok(());
                        }
                    }
                }
                Ok(None) => {
                    // stdin is gone; same as /quit.
                    send_disconnect_best_effort(&cancel, &mut writer).await;
                    return Ok(());
                }
                Err(err) => {
                    eprintln!("error: failed to read from stdin");
                    return Err(ChatError::from(err));
                }
            },
        }
    }
}

fn draw_prompt(is_identified: bool, username: &str) {
    let mut stdout = std::io::stdout();
    if is_identified {
        let _ = write!(stdout, "@{}: ", username);
    } else {
        let _ = write!(stdout, "> ");
    }
    let _ = stdout.flush();
}

fn handle_server_frame(frame: &[u8], is_identified: &mut bool, username: &mut String) {
    let root: Value = match serde_json::from_slice(frame) {
        Ok(root) => root,
        Err(err) => {
            eprintln!("server: invalid json: {}", err);
            return;
        }
    };

    if let Some(confirmed) = identify_success_extra(&root) {
        *is_identified = true;
        *username = confirmed.to_string();
    }

    println!();
    let mut stdout = std::io::stdout();
    let _ = render::print_event(&root, &mut stdout);
}

/// If this message is `RESPONSE{IDENTIFY, SUCCESS}`, return the confirmed
/// username from `extra`.
fn identify_success_extra(root: &Value) -> Option<&str> {
    if root.get("type")?.as_str()? != "RESPONSE" {
        return None;
    }
    if root.get("operation")?.as_str()? != "IDENTIFY" {
        return None;
    }
    if root.get("result")?.as_str()? != "SUCCESS" {
        return None;
    }
    root.get("extra")?.as_str()
}

async fn handle_input_line(
    line: &str,
    is_identified: bool,
    cancel: &CancellationToken,
    writer: &mut FrameWriter<OwnedWriteHalf>,
) -> Result<Flow> {
    let action = match command::parse_line(line) {
        Ok(action) => action,
        Err(ParseError::Empty) => return Ok(Flow::Continue),
        Err(err) => {
            eprintln!("input: {}", err);
            return Ok(Flow::Continue);
        }
    };

    let request = match action {
        Action::Quit => return Ok(Flow::Quit),
        Action::Send(request) => request,
    };

    if !is_identified && request.message_type() != MessageType::Identify {
        eprintln!("You must identify first using /identify <username>.");
        return Ok(Flow::Continue);
    }

    if let Err(err) = writer.write_frame(cancel, &request.encode()).await {
        eprintln!("error: failed to send message to server");
        return Err(ChatError::network(err.to_string()));
    }

    Ok(Flow::Continue)
}

async fn send_disconnect_best_effort(
    cancel: &CancellationToken,
    writer: &mut FrameWriter<OwnedWriteHalf>,
) {
    let frame = codec::marshal(&DisconnectRequest::new());
    let _ = writer.write_frame(cancel, &frame).await;
}

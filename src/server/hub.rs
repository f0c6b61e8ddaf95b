//! The hub: single owner of all shared server state
//!
//! Concurrency model:
//!   - Exactly one task runs [`Hub::run`].
//!   - All mutable state is touched only inside that task.
//!   - Every other task communicates with the hub through three bounded
//!     channels: register, unregister, inbound.
//!
//! The hub never performs I/O and never waits on a client: outbound delivery
//! goes through [`ClientWriter::send`], which must be non-blocking. A full
//! queue is treated as a fatal per-client condition and the client is
//! disconnected, which keeps the hub's latency independent of any one
//! client's behavior.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::codec::{self, Envelope};
use crate::protocol::messages::*;

/// Depth of the hub's register/unregister/inbound channels.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Uniquely identifies a connected client within the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a stable identifier from the connection's endpoints.
    pub fn from_endpoints(remote: SocketAddr, local: SocketAddr) -> Self {
        Self(format!("{}->{}", remote, local))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned by [`ClientWriter::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    /// The client's outbound queue is full
    Backpressure,
    /// The client's outbound queue is gone
    Closed,
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::Backpressure => write!(f, "client write queue is full"),
            WriterError::Closed => write!(f, "client write queue is closed"),
        }
    }
}

impl std::error::Error for WriterError {}

/// The outbound side of a client connection, as seen by the hub.
/// The hub owns protocol decisions; the concrete connection owns I/O.
pub trait ClientWriter: Send {
    /// Enqueue a frame for delivery. Must not block.
    fn send(&self, frame: Bytes) -> Result<(), WriterError>;

    /// Stop the connection. Must be idempotent.
    fn close(&self);
}

/// Registers a newly connected client with the hub.
pub struct RegisterEvent {
    pub client_id: ClientId,
    pub writer: Box<dyn ClientWriter>,
}

/// Removes a client from the hub and triggers cleanup.
#[derive(Debug)]
pub struct UnregisterEvent {
    pub client_id: ClientId,
    pub reason: String,
}

/// A raw protocol frame received from a client.
#[derive(Debug)]
pub struct InboundEvent {
    pub client_id: ClientId,
    pub frame: Bytes,
}

/// Cloneable handle used by connections to talk to the hub.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<RegisterEvent>,
    unregister: mpsc::Sender<UnregisterEvent>,
    inbound: mpsc::Sender<InboundEvent>,
}

impl HubHandle {
    /// Register a client connection with the hub.
    pub async fn register(&self, client_id: ClientId, writer: Box<dyn ClientWriter>) {
        let event = RegisterEvent { client_id, writer };
        if self.register.send(event).await.is_err() {
            debug!("hub is gone; register dropped");
        }
    }

    /// Request removal of a client from the hub.
    pub async fn unregister(&self, client_id: ClientId, reason: impl Into<String>) {
        let event = UnregisterEvent {
            client_id,
            reason: reason.into(),
        };
        if self.unregister.send(event).await.is_err() {
            debug!("hub is gone; unregister dropped");
        }
    }

    /// Deliver a raw protocol frame from a client to the hub.
    pub async fn deliver(&self, client_id: ClientId, frame: Bytes) {
        let event = InboundEvent { client_id, frame };
        if self.inbound.send(event).await.is_err() {
            debug!("hub is gone; inbound frame dropped");
        }
    }
}

struct RoomState {
    members: HashSet<ClientId>,
    invited: HashSet<ClientId>,
}

impl RoomState {
    fn new() -> Self {
        Self {
            members: HashSet::new(),
            invited: HashSet::new(),
        }
    }
}

/// The single-owner event processor holding all authoritative state.
pub struct Hub {
    register_rx: mpsc::Receiver<RegisterEvent>,
    unregister_rx: mpsc::Receiver<UnregisterEvent>,
    inbound_rx: mpsc::Receiver<InboundEvent>,

    // Kept so the hub can requeue unregister requests to itself without
    // blocking when an outbound send fails.
    unregister_tx: mpsc::Sender<UnregisterEvent>,

    clients: HashMap<ClientId, Box<dyn ClientWriter>>,
    client_user: HashMap<ClientId, String>,
    client_status: HashMap<ClientId, Status>,
    username_owner: HashMap<String, ClientId>,

    rooms: HashMap<String, RoomState>,
    client_rooms: HashMap<ClientId, HashSet<String>>,
}

impl Hub {
    /// Create a hub and the handle connections use to reach it.
    /// The caller must drive [`Hub::run`] in its own task.
    pub fn new() -> (Self, HubHandle) {
        Self::with_queue_depth(EVENT_QUEUE_DEPTH)
    }

    fn with_queue_depth(depth: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(depth);
        let (unregister_tx, unregister_rx) = mpsc::channel(depth);
        let (inbound_tx, inbound_rx) = mpsc::channel(depth);

        let handle = HubHandle {
            register: register_tx,
            unregister: unregister_tx.clone(),
            inbound: inbound_tx,
        };

        let hub = Self {
            register_rx,
            unregister_rx,
            inbound_rx,
            unregister_tx,
            clients: HashMap::new(),
            client_user: HashMap::new(),
            client_status: HashMap::new(),
            username_owner: HashMap::new(),
            rooms: HashMap::new(),
            client_rooms: HashMap::new(),
        };

        (hub, handle)
    }

    /// Process hub events until the cancellation token fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            // Biased polling keeps event ordering deterministic: a
            // connection's register is always handled before its first
            // inbound frame, and shutdown wins over everything.
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.close_all("server shutting down");
                    return;
                }

                event = self.register_rx.recv() => match event {
                    Some(event) => self.handle_register(event),
                    None => return,
                },

                event = self.unregister_rx.recv() => match event {
                    Some(event) => self.force_disconnect(&event.client_id, &event.reason),
                    None => return,
                },

                event = self.inbound_rx.recv() => match event {
                    Some(event) => self.handle_inbound(event),
                    None => return,
                },
            }

            #[cfg(debug_assertions)]
            self.assert_invariants();
        }
    }

    fn handle_register(&mut self, event: RegisterEvent) {
        debug!(client = %event.client_id, "client registered");
        self.clients.insert(event.client_id, event.writer);
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        // Frames can still be in flight for a client the hub has already
        // torn down; they must not resurrect any state.
        if !self.clients.contains_key(&event.client_id) {
            return;
        }

        let envelope = match codec::decode_envelope(&event.frame) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.send_invalid_and_disconnect(&event.client_id, "INVALID", "INVALID");
                return;
            }
        };

        let Some(username) = self.client_user.get(&event.client_id).cloned() else {
            if envelope.message_type() != Some(MessageType::Identify) {
                self.send_invalid_and_disconnect(&event.client_id, "INVALID", "NOT_IDENTIFIED");
                return;
            }
            self.handle_identify(&event.client_id, &envelope);
            return;
        };

        match envelope.message_type() {
            Some(MessageType::Status) => self.handle_status(&event.client_id, &username, &envelope),
            Some(MessageType::Users) => self.handle_users(&event.client_id, &envelope),
            Some(MessageType::Text) => self.handle_text(&event.client_id, &username, &envelope),
            Some(MessageType::PublicText) => {
                self.handle_public_text(&event.client_id, &username, &envelope)
            }
            Some(MessageType::NewRoom) => self.handle_new_room(&event.client_id, &envelope),
            Some(MessageType::Invite) => self.handle_invite(&event.client_id, &username, &envelope),
            Some(MessageType::JoinRoom) => {
                self.handle_join_room(&event.client_id, &username, &envelope)
            }
            Some(MessageType::RoomUsers) => self.handle_room_users(&event.client_id, &envelope),
            Some(MessageType::RoomText) => {
                self.handle_room_text(&event.client_id, &username, &envelope)
            }
            Some(MessageType::LeaveRoom) => {
                self.handle_leave_room(&event.client_id, &username, &envelope)
            }
            Some(MessageType::Disconnect) => {
                self.handle_disconnect(&event.client_id, &username, &envelope)
            }
            _ => self.send_invalid_and_disconnect(&event.client_id, "INVALID", "INVALID"),
        }
    }

    fn handle_identify(&mut self, client_id: &ClientId, envelope: &Envelope) {
        let request = match codec::decode_identify(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
                return;
            }
        };

        if !username_is_valid(&request.username) {
            self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
            return;
        }

        if self.username_owner.contains_key(&request.username) {
            self.send_response(
                client_id,
                ResponseMessage::new("IDENTIFY", "USER_ALREADY_EXISTS")
                    .with_extra(&request.username),
            );
            return;
        }

        self.client_user
            .insert(client_id.clone(), request.username.clone());
        self.client_status.insert(client_id.clone(), Status::Active);
        self.username_owner
            .insert(request.username.clone(), client_id.clone());

        self.send_response(
            client_id,
            ResponseMessage::new("IDENTIFY", "SUCCESS").with_extra(&request.username),
        );

        let frame = codec::marshal(&NewUserMessage::new(&request.username));
        self.broadcast_except(client_id, frame);
    }

    fn handle_status(&mut self, client_id: &ClientId, username: &str, envelope: &Envelope) {
        let request = match codec::decode_status(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
                return;
            }
        };

        self.client_status.insert(client_id.clone(), request.status);

        let frame = codec::marshal(&NewStatusMessage::new(username, request.status));
        self.broadcast_except(client_id, frame);
    }

    fn handle_users(&mut self, client_id: &ClientId, envelope: &Envelope) {
        if codec::decode_users(envelope).is_err() {
            self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
            return;
        }

        let mut users = HashMap::with_capacity(self.client_user.len());
        for (known_id, known_username) in &self.client_user {
            let status = self
                .client_status
                .get(known_id)
                .copied()
                .unwrap_or(Status::Active);
            users.insert(known_username.clone(), status);
        }

        let frame = codec::marshal(&UserListMessage::new(users));
        self.send_frame(client_id, frame);
    }

    fn handle_text(&mut self, sender_id: &ClientId, sender_username: &str, envelope: &Envelope) {
        let request = match codec::decode_text(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(sender_id, "INVALID", "INVALID");
                return;
            }
        };

        let Some(recipient_id) = self.username_owner.get(&request.username).cloned() else {
            self.send_response(
                sender_id,
                ResponseMessage::new("TEXT", "NO_SUCH_USER").with_extra(&request.username),
            );
            return;
        };

        let frame = codec::marshal(&TextFromMessage::new(sender_username, &request.text));
        self.send_frame(&recipient_id, frame);
    }

    fn handle_public_text(
        &mut self,
        sender_id: &ClientId,
        sender_username: &str,
        envelope: &Envelope,
    ) {
        let request = match codec::decode_public_text(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(sender_id, "INVALID", "INVALID");
                return;
            }
        };

        let frame = codec::marshal(&PublicTextFromMessage::new(sender_username, &request.text));
        self.broadcast_except(sender_id, frame);
    }

    fn handle_new_room(&mut self, creator_id: &ClientId, envelope: &Envelope) {
        let request = match codec::decode_new_room(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(creator_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(creator_id, "INVALID", "INVALID");
            return;
        }

        if self.rooms.contains_key(&request.room_name) {
            self.send_response(
                creator_id,
                ResponseMessage::new("NEW_ROOM", "ROOM_ALREADY_EXISTS")
                    .with_extra(&request.room_name),
            );
            return;
        }

        let mut room = RoomState::new();
        room.members.insert(creator_id.clone());
        self.rooms.insert(request.room_name.clone(), room);
        self.client_rooms
            .entry(creator_id.clone())
            .or_default()
            .insert(request.room_name.clone());

        self.send_response(
            creator_id,
            ResponseMessage::new("NEW_ROOM", "SUCCESS").with_extra(&request.room_name),
        );
    }

    fn handle_invite(&mut self, inviter_id: &ClientId, inviter_username: &str, envelope: &Envelope) {
        let request = match codec::decode_invite(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(inviter_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(inviter_id, "INVALID", "INVALID");
            return;
        }

        let Some(room) = self.rooms.get(&request.room_name) else {
            self.send_response(
                inviter_id,
                ResponseMessage::new("INVITE", "NO_SUCH_ROOM").with_extra(&request.room_name),
            );
            return;
        };

        // Only room members may invite; anyone else is violating the
        // protocol and gets disconnected.
        if !room.members.contains(inviter_id) {
            self.send_invalid_and_disconnect(inviter_id, "INVALID", "INVALID");
            return;
        }

        // Resolve every target before touching state: one unknown username
        // aborts the whole request.
        let mut recipient_ids = Vec::with_capacity(request.usernames.len());
        for target_username in &request.usernames {
            let Some(target_id) = self.username_owner.get(target_username).cloned() else {
                self.send_response(
                    inviter_id,
                    ResponseMessage::new("INVITE", "NO_SUCH_USER").with_extra(target_username),
                );
                return;
            };
            recipient_ids.push(target_id);
        }

        let frame = codec::marshal(&InvitationMessage::new(&request.room_name, inviter_username));

        for recipient_id in recipient_ids {
            let Some(room) = self.rooms.get_mut(&request.room_name) else {
                break;
            };
            // Skip users who already joined or were already invited.
            if room.members.contains(&recipient_id) {
                continue;
            }
            if !room.invited.insert(recipient_id.clone()) {
                continue;
            }
            self.send_frame(&recipient_id, frame.clone());
        }
    }

    fn handle_join_room(&mut self, client_id: &ClientId, username: &str, envelope: &Envelope) {
        let request = match codec::decode_join_room(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
            return;
        }

        let Some(room) = self.rooms.get_mut(&request.room_name) else {
            self.send_response(
                client_id,
                ResponseMessage::new("JOIN_ROOM", "NO_SUCH_ROOM").with_extra(&request.room_name),
            );
            return;
        };

        // Idempotency: a current member gets SUCCESS without a re-broadcast.
        if room.members.contains(client_id) {
            self.send_response(
                client_id,
                ResponseMessage::new("JOIN_ROOM", "SUCCESS").with_extra(&request.room_name),
            );
            return;
        }

        if !room.invited.remove(client_id) {
            self.send_response(
                client_id,
                ResponseMessage::new("JOIN_ROOM", "NOT_INVITED").with_extra(&request.room_name),
            );
            return;
        }

        room.members.insert(client_id.clone());
        self.client_rooms
            .entry(client_id.clone())
            .or_default()
            .insert(request.room_name.clone());

        self.send_response(
            client_id,
            ResponseMessage::new("JOIN_ROOM", "SUCCESS").with_extra(&request.room_name),
        );

        // The joiner is a member by now, so they receive this too.
        let frame = codec::marshal(&JoinedRoomMessage::new(&request.room_name, username));
        for member_id in self.room_member_snapshot(&request.room_name) {
            self.send_frame(&member_id, frame.clone());
        }
    }

    fn handle_room_users(&mut self, client_id: &ClientId, envelope: &Envelope) {
        let request = match codec::decode_room_users(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
            return;
        }

        let Some(room) = self.rooms.get(&request.room_name) else {
            self.send_response(
                client_id,
                ResponseMessage::new("ROOM_USERS", "NO_SUCH_ROOM").with_extra(&request.room_name),
            );
            return;
        };

        if !room.members.contains(client_id) {
            self.send_response(
                client_id,
                ResponseMessage::new("ROOM_USERS", "NOT_JOINED").with_extra(&request.room_name),
            );
            return;
        }

        let mut users = HashMap::with_capacity(room.members.len());
        for member_id in &room.members {
            let Some(member_username) = self.client_user.get(member_id) else {
                continue;
            };
            let status = self
                .client_status
                .get(member_id)
                .copied()
                .unwrap_or(Status::Active);
            users.insert(member_username.clone(), status);
        }

        let frame = codec::marshal(&RoomUserListMessage::new(&request.room_name, users));
        self.send_frame(client_id, frame);
    }

    fn handle_room_text(&mut self, sender_id: &ClientId, sender_username: &str, envelope: &Envelope) {
        let request = match codec::decode_room_text(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(sender_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(sender_id, "INVALID", "INVALID");
            return;
        }

        let Some(room) = self.rooms.get(&request.room_name) else {
            self.send_response(
                sender_id,
                ResponseMessage::new("ROOM_TEXT", "NO_SUCH_ROOM").with_extra(&request.room_name),
            );
            return;
        };

        if !room.members.contains(sender_id) {
            self.send_response(
                sender_id,
                ResponseMessage::new("ROOM_TEXT", "NOT_JOINED").with_extra(&request.room_name),
            );
            return;
        }

        let frame = codec::marshal(&RoomTextFromMessage::new(
            &request.room_name,
            sender_username,
            &request.text,
        ));

        for member_id in self.room_member_snapshot(&request.room_name) {
            if member_id == *sender_id {
                continue;
            }
            self.send_frame(&member_id, frame.clone());
        }
    }

    fn handle_leave_room(&mut self, leaver_id: &ClientId, leaver_username: &str, envelope: &Envelope) {
        let request = match codec::decode_leave_room(envelope) {
            Ok(request) => request,
            Err(_) => {
                self.send_invalid_and_disconnect(leaver_id, "INVALID", "INVALID");
                return;
            }
        };

        if !room_name_is_valid(&request.room_name) {
            self.send_invalid_and_disconnect(leaver_id, "INVALID", "INVALID");
            return;
        }

        let Some(room) = self.rooms.get_mut(&request.room_name) else {
            self.send_response(
                leaver_id,
                ResponseMessage::new("LEAVE_ROOM", "NO_SUCH_ROOM").with_extra(&request.room_name),
            );
            return;
        };

        if !room.members.remove(leaver_id) {
            self.send_response(
                leaver_id,
                ResponseMessage::new("LEAVE_ROOM", "NOT_JOINED").with_extra(&request.room_name),
            );
            return;
        }

        if let Some(room_set) = self.client_rooms.get_mut(leaver_id) {
            room_set.remove(&request.room_name);
            if room_set.is_empty() {
                self.client_rooms.remove(leaver_id);
            }
        }

        // No SUCCESS response: the remaining members hear about the leave,
        // the leaver hears nothing.
        let frame = codec::marshal(&LeftRoomMessage::new(&request.room_name, leaver_username));
        for member_id in self.room_member_snapshot(&request.room_name) {
            self.send_frame(&member_id, frame.clone());
        }

        self.delete_room_if_empty(&request.room_name);
    }

    fn handle_disconnect(&mut self, client_id: &ClientId, username: &str, envelope: &Envelope) {
        if codec::decode_disconnect(envelope).is_err() {
            self.send_invalid_and_disconnect(client_id, "INVALID", "INVALID");
            return;
        }

        let reason = format!("client requested disconnect (user={})", username);
        self.force_disconnect(client_id, &reason);
    }

    fn send_invalid_and_disconnect(&mut self, client_id: &ClientId, operation: &str, result: &str) {
        self.send_response(client_id, ResponseMessage::new(operation, result));

        let reason = format!("protocol violation: operation={} result={}", operation, result);
        self.force_disconnect(client_id, &reason);
    }

    fn send_response(&mut self, client_id: &ClientId, message: ResponseMessage) {
        let frame = codec::marshal(&message);
        self.send_frame(client_id, frame);
    }

    /// Deliver a frame to one client. Fails closed: a full or broken
    /// outbound queue disconnects that client instead of stalling the hub.
    fn send_frame(&mut self, client_id: &ClientId, frame: Bytes) {
        let Some(writer) = self.clients.get(client_id) else {
            return;
        };

        if let Err(err) = writer.send(frame) {
            let reason = format!("send failed: {}", err);
            self.request_unregister_nonblocking(client_id, &reason);
        }
    }

    fn request_unregister_nonblocking(&mut self, client_id: &ClientId, reason: &str) {
        let event = UnregisterEvent {
            client_id: client_id.clone(),
            reason: reason.to_string(),
        };

        // If the unregister queue is itself full, disconnect inline rather
        // than block the hub.
        if self.unregister_tx.try_send(event).is_err() {
            self.force_disconnect(client_id, reason);
        }
    }

    fn broadcast_except(&mut self, except_id: &ClientId, frame: Bytes) {
        let targets: Vec<ClientId> = self
            .clients
            .keys()
            .filter(|id| *id != except_id)
            .cloned()
            .collect();

        for target in targets {
            self.send_frame(&target, frame.clone());
        }
    }

    fn room_member_snapshot(&self, room_name: &str) -> Vec<ClientId> {
        self.rooms
            .get(room_name)
            .map(|room| room.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn delete_room_if_empty(&mut self, room_name: &str) {
        if let Some(room) = self.rooms.get(room_name) {
            if room.members.is_empty() {
                self.rooms.remove(room_name);
            }
        }
    }

    fn leave_all_rooms_with_notice(&mut self, leaver_id: &ClientId, leaver_username: &str) {
        let Some(room_names) = self.client_rooms.remove(leaver_id) else {
            return;
        };

        for room_name in room_names {
            let Some(room) = self.rooms.get_mut(&room_name) else {
                continue;
            };

            // Drop membership first, then tell whoever is left.
            room.members.remove(leaver_id);
            room.invited.remove(leaver_id);

            let frame = codec::marshal(&LeftRoomMessage::new(&room_name, leaver_username));
            for member_id in self.room_member_snapshot(&room_name) {
                self.send_frame(&member_id, frame.clone());
            }

            self.delete_room_if_empty(&room_name);
        }
    }

    /// Tear down one client: room notifications, DISCONNECTED broadcast,
    /// state removal, writer close. Safe to call for unknown clients.
    fn force_disconnect(&mut self, client_id: &ClientId, reason: &str) {
        if !self.clients.contains_key(client_id) {
            return;
        }

        let username = self.client_user.get(client_id).cloned();

        // Notify others according to the protocol before removing state.
        // A client that never identified cannot be in any room and has no
        // username to announce, so it is torn down silently.
        match &username {
            Some(username) => {
                self.leave_all_rooms_with_notice(client_id, username);

                let frame = codec::marshal(&DisconnectedMessage::new(username));
                self.broadcast_except(client_id, frame);
            }
            None => {
                self.client_rooms.remove(client_id);
            }
        }

        let writer = self.clients.remove(client_id);
        self.client_user.remove(client_id);
        self.client_status.remove(client_id);
        if let Some(username) = &username {
            self.username_owner.remove(username);
        }

        if let Some(writer) = writer {
            writer.close();
        }

        info!(client = %client_id, reason, "client disconnected");
    }

    fn close_all(&mut self, reason: &str) {
        let client_ids: Vec<ClientId> = self.clients.keys().cloned().collect();
        if !client_ids.is_empty() {
            warn!(count = client_ids.len(), "closing all client connections");
        }

        for client_id in client_ids {
            self.force_disconnect(&client_id, reason);
        }
    }

    /// Check the cross-index invariants that must hold between hub events.
    #[cfg(any(debug_assertions, test))]
    fn assert_invariants(&self) {
        for (client_id, username) in &self.client_user {
            assert!(
                self.clients.contains_key(client_id),
                "identified client {} has no connection record",
                client_id
            );
            assert_eq!(
                self.username_owner.get(username),
                Some(client_id),
                "username owner index out of sync for {}",
                username
            );
            assert!(
                self.client_status.contains_key(client_id),
                "identified client {} has no status",
                client_id
            );
        }

        for (username, client_id) in &self.username_owner {
            assert_eq!(
                self.client_user.get(client_id).map(String::as_str),
                Some(username.as_str()),
                "client user index out of sync for {}",
                username
            );
        }

        for (room_name, room) in &self.rooms {
            assert!(
                !room.members.is_empty(),
                "room {} exists with no members",
                room_name
            );
            for member_id in &room.members {
                assert!(
                    self.clients.contains_key(member_id),
                    "room member without connection record in {}",
                    room_name
                );
                assert!(
                    self.client_user.contains_key(member_id),
                    "unidentified room member in {}",
                    room_name
                );
                assert!(
                    !room.invited.contains(member_id),
                    "client both member and invited in {}",
                    room_name
                );
                assert!(
                    self.client_rooms
                        .get(member_id)
                        .is_some_and(|rooms| rooms.contains(room_name)),
                    "membership missing from reverse index for {}",
                    room_name
                );
            }
            for invited_id in &room.invited {
                assert!(
                    self.clients.contains_key(invited_id),
                    "invited client without connection record in {}",
                    room_name
                );
            }
        }

        for (client_id, room_names) in &self.client_rooms {
            assert!(
                !room_names.is_empty(),
                "empty room set left behind for {}",
                client_id
            );
            for room_name in room_names {
                assert!(
                    self.rooms
                        .get(room_name)
                        .is_some_and(|room| room.members.contains(client_id)),
                    "reverse index points at missing membership: {} in {}",
                    client_id,
                    room_name
                );
            }
        }
    }
}

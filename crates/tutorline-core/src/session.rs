//! Per-connection read and write pumps.
//!
//! [`SessionContext::start`] registers a connection with the hub and spawns
//! two tasks for it:
//!
//! - the write loop drains the outbox, the reader's control queue and a
//!   heartbeat ticker into the transport
//! - the read loop decodes inbound frames, routes and persists sends, and
//!   hands persisted messages to the hub
//!
//! Teardown always goes through the hub: the reader (or a failing writer)
//! unregisters, the hub drops its sender, the writer sees its outbox close
//! and shuts the transport. A writer that stops for any reason stops its
//! reader first, so an evicted client cannot keep posting.
//!
//! [`SessionContext::dispatch`] is the route, persist and broadcast path
//! shared by the read loop and any other ingress.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use tutorline_protocol::{
    ChatMessage, ClientFrame, ErrorCode, RoomId, ServerFrame, UserId, PROTOCOL_VERSION,
};
use tutorline_transport::{CloseReason, ConnectionId, FrameSink, FrameStream, Incoming};

use crate::connection::{Connection, Identity, Outbox};
use crate::hub::{HubError, HubHandle};
use crate::message::Draft;
use crate::route::{RouteError, SendRequest, SendRoute};
use crate::store::{MessageStore, RoomStore, StoreError};

const CONTROL_CAPACITY: usize = 16;

/// Per-connection limits and timers.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Undelivered messages a connection may hold before it is evicted.
    pub outbox_capacity: usize,
    /// How often the writer pings the client.
    pub heartbeat_interval: Duration,
    /// Silence after which the reader gives up on the client.
    pub idle_timeout: Duration,
    /// Maximum message length in characters.
    pub max_content_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_content_length: 4096,
        }
    }
}

/// Why a send did not reach the hub.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Refused by role routing.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// A direct send into a room the sender does not belong to.
    #[error("not a member of room {0}")]
    NotMember(RoomId),

    /// A store call failed; `step` names which one.
    #[error("failed to {step}: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl DispatchError {
    /// Wire code when the sender is at fault, `None` for server failures.
    #[must_use]
    pub fn refusal_code(&self) -> Option<ErrorCode> {
        match self {
            DispatchError::Route(e) => Some(e.code()),
            DispatchError::NotMember(_) => Some(ErrorCode::NotMember),
            DispatchError::Store { .. } | DispatchError::Hub(_) => None,
        }
    }

    fn close_reason(&self) -> CloseReason {
        match self {
            DispatchError::Store { step, .. } => CloseReason::internal(format!("failed to {step}")),
            DispatchError::Hub(_) => CloseReason::internal("hub unavailable"),
            other => CloseReason::internal(other.to_string()),
        }
    }
}

fn store_step(step: &'static str) -> impl Fn(StoreError) -> DispatchError {
    move |source| DispatchError::Store { step, source }
}

/// What the read loop asks of its writer.
#[derive(Debug)]
enum Control {
    /// Send a frame to this client only.
    Frame(ServerFrame),
    /// Close the transport with a reason and stop.
    Close(CloseReason),
}

/// Shared dependencies of every session.
#[derive(Clone)]
pub struct SessionContext {
    hub: HubHandle,
    messages: Arc<dyn MessageStore>,
    rooms: Arc<dyn RoomStore>,
    config: SessionConfig,
}

/// Handles of a running session's tasks.
#[derive(Debug)]
pub struct SessionTasks {
    pub connection_id: ConnectionId,
    pub writer: JoinHandle<()>,
    pub reader: JoinHandle<()>,
}

impl SessionTasks {
    /// Wait for both pumps to finish.
    pub async fn join(self) {
        for (name, task) in [("writer", self.writer), ("reader", self.reader)] {
            if let Err(e) = task.await {
                error!(
                    connection = %self.connection_id,
                    task = name,
                    error = %e,
                    "Session task failed"
                );
            }
        }
    }
}

impl SessionContext {
    #[must_use]
    pub fn new(
        hub: HubHandle,
        messages: Arc<dyn MessageStore>,
        rooms: Arc<dyn RoomStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            hub,
            messages,
            rooms,
            config,
        }
    }

    #[must_use]
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Rooms a new connection of `user_id` starts subscribed to.
    ///
    /// # Errors
    ///
    /// Returns the store error if the lookup fails.
    pub async fn bootstrap(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError> {
        self.rooms.rooms_for_user(user_id).await
    }

    /// Register a connection and spawn its pumps.
    ///
    /// The connection is visible to broadcasts by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running; nothing is
    /// spawned in that case.
    pub async fn start<S, R>(
        &self,
        identity: Identity,
        rooms: Vec<RoomId>,
        sink: S,
        stream: R,
    ) -> Result<SessionTasks, HubError>
    where
        S: FrameSink + 'static,
        R: FrameStream + 'static,
    {
        let id = ConnectionId::generate();
        let rooms: BTreeSet<RoomId> = rooms.into_iter().collect();
        let (connection, outbox) = Connection::new(
            id.clone(),
            identity,
            rooms.iter().copied(),
            self.config.outbox_capacity,
        );

        if !self.hub.register(connection).await? {
            warn!(connection = %id, "Connection id already registered");
        }

        info!(
            connection = %id,
            user = %identity.user_id,
            role = %identity.role,
            remote = stream.remote_addr().as_deref().unwrap_or("unknown"),
            "Session started"
        );

        let hello = ServerFrame::Connected {
            connection_id: id.to_string(),
            user_id: identity.user_id,
            role: identity.role,
            rooms: rooms.into_iter().collect(),
            version: PROTOCOL_VERSION.to_string(),
            heartbeat_ms: u64::try_from(self.config.heartbeat_interval.as_millis())
                .unwrap_or(u64::MAX),
        };

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();

        let writer = WriteLoop {
            id: id.clone(),
            sink,
            outbox,
            control: control_rx,
            stop_reader: Some(stop_tx),
            hub: self.hub.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
        };
        let reader = ReadLoop {
            id: id.clone(),
            identity,
            control: control_tx,
            ctx: self.clone(),
        };

        Ok(SessionTasks {
            connection_id: id,
            writer: tokio::spawn(writer.run(hello)),
            reader: tokio::spawn(reader.run(stream, stop_rx)),
        })
    }
}

impl SessionContext {
    /// Route, persist and broadcast one send from `sender`.
    ///
    /// Returns the persisted message once the hub has accepted it.
    ///
    /// # Errors
    ///
    /// Refusals ([`DispatchError::refusal_code`] is `Some`) leave no trace.
    /// Store and hub failures abort the message; nothing is broadcast.
    pub async fn dispatch(
        &self,
        sender: Identity,
        request: SendRequest,
    ) -> Result<ChatMessage, DispatchError> {
        let route = request.route(sender, self.config.max_content_length)?;

        let room_id = match route {
            SendRoute::Direct { room_id } => {
                let member = self
                    .messages
                    .is_member(room_id, sender.user_id)
                    .await
                    .map_err(store_step("check membership"))?;
                if !member {
                    return Err(DispatchError::NotMember(room_id));
                }
                room_id
            }
            SendRoute::ResolveThenSend { target_user_id } => {
                self.resolve_room(sender.user_id, target_user_id).await?
            }
        };

        let draft = Draft::new(room_id, sender.user_id, request.content);
        let message_id = self
            .messages
            .save_message(&draft)
            .await
            .map_err(store_step("persist message"))?;

        let message = draft.persisted(message_id);
        debug!(user = %sender.user_id, room = %room_id, message = %message_id, "Message persisted");

        self.hub.broadcast(message.clone()).await?;
        Ok(message)
    }

    /// Find or create the two-party room of `sender` and `target`.
    ///
    /// A freshly created room is pushed to every live connection of its
    /// participants before the first message goes out.
    async fn resolve_room(&self, sender: UserId, target: UserId) -> Result<RoomId, DispatchError> {
        if let Some(room) = self
            .rooms
            .room_by_participants(sender, target)
            .await
            .map_err(store_step("resolve room"))?
        {
            return Ok(room.id);
        }

        let room = self
            .rooms
            .create_room(&[sender, target])
            .await
            .map_err(store_step("resolve room"))?;

        let joined = self.hub.join_room(room.id, room.participants.clone()).await?;
        info!(room = %room.id, user = %sender, target = %target, joined, "Created room");

        Ok(room.id)
    }
}

struct WriteLoop<S> {
    id: ConnectionId,
    sink: S,
    outbox: Outbox,
    control: mpsc::Receiver<Control>,
    stop_reader: Option<oneshot::Sender<()>>,
    hub: HubHandle,
    heartbeat_interval: Duration,
}

impl<S: FrameSink> WriteLoop<S> {
    async fn run(mut self, hello: ServerFrame) {
        let outcome = match self.sink.send(&hello).await {
            Ok(()) => self.pump().await,
            Err(e) => Err(e),
        };

        // Before the close frame, so the peer never sees a close while its
        // sends are still being read.
        if let Some(stop) = self.stop_reader.take() {
            let _ = stop.send(());
        }

        match outcome {
            Ok(reason) => {
                debug!(connection = %self.id, code = reason.code, "Closing transport");
                let _ = self.sink.close(Some(reason)).await;
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Write failed");
                let _ = self.sink.close(None).await;
                // The read loop may be parked on a half-open link.
                let _ = self.hub.unregister(self.id.clone()).await;
            }
        }
    }

    async fn pump(&mut self) -> Result<CloseReason, tutorline_transport::TransportError> {
        let period = self.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                Some(control) = self.control.recv() => match control {
                    Control::Frame(frame) => self.sink.send(&frame).await?,
                    Control::Close(reason) => return Ok(reason),
                },

                message = self.outbox.recv() => match message {
                    Some(message) => {
                        self.sink.send(&ServerFrame::Message((*message).clone())).await?;
                    }
                    None => return Ok(CloseReason::normal()),
                },

                _ = heartbeat.tick() => self.sink.ping().await?,
            }
        }
    }
}

struct ReadLoop {
    id: ConnectionId,
    identity: Identity,
    control: mpsc::Sender<Control>,
    ctx: SessionContext,
}

impl ReadLoop {
    async fn run<R: FrameStream>(self, mut stream: R, mut writer_stopped: oneshot::Receiver<()>) {
        let idle_timeout = self.ctx.config.idle_timeout;

        loop {
            let read = tokio::select! {
                biased;

                _ = &mut writer_stopped => {
                    debug!(connection = %self.id, "Writer stopped");
                    break;
                }
                read = time::timeout(idle_timeout, stream.recv()) => read,
            };

            let incoming = match read {
                Ok(Ok(Some(incoming))) => incoming,
                Ok(Ok(None)) => {
                    debug!(connection = %self.id, "Client closed the connection");
                    break;
                }
                Ok(Err(e)) => {
                    debug!(connection = %self.id, error = %e, "Read failed");
                    break;
                }
                Err(_) => {
                    info!(connection = %self.id, timeout = ?idle_timeout, "Client went silent");
                    break;
                }
            };

            match incoming {
                Incoming::Heartbeat => {}
                Incoming::Malformed(reason) => {
                    debug!(connection = %self.id, %reason, "Malformed frame");
                    self.reply(ServerFrame::error(ErrorCode::BadFrame, reason)).await;
                }
                Incoming::Frame(ClientFrame::Ping { timestamp }) => {
                    self.reply(ServerFrame::pong(timestamp)).await;
                }
                Incoming::Frame(frame @ ClientFrame::Send { .. }) => {
                    if let Err(reason) = self.handle_send(frame).await {
                        let _ = self.control.send(Control::Close(reason)).await;
                        break;
                    }
                }
            }
        }

        let _ = self.ctx.hub.unregister(self.id.clone()).await;
        debug!(connection = %self.id, "Read loop finished");
    }

    /// Hand one send to [`SessionContext::dispatch`].
    ///
    /// Refusals are answered with an error frame. An `Err` means the
    /// connection has to be closed with the returned reason.
    async fn handle_send(&self, frame: ClientFrame) -> Result<(), CloseReason> {
        let Some(request) = SendRequest::from_frame(frame) else {
            return Ok(());
        };

        match self.ctx.dispatch(self.identity, request).await {
            Ok(message) => {
                trace!(connection = %self.id, message = %message.id, "Send accepted");
                Ok(())
            }
            Err(e) => match e.refusal_code() {
                Some(code) => {
                    debug!(connection = %self.id, error = %e, "Send refused");
                    self.reply(ServerFrame::error(code, e.to_string())).await;
                    Ok(())
                }
                None => {
                    error!(connection = %self.id, error = %e, "Send failed");
                    Err(e.close_reason())
                }
            },
        }
    }

    async fn reply(&self, frame: ServerFrame) {
        if self.control.send(Control::Frame(frame)).await.is_err() {
            debug!(connection = %self.id, "Writer gone, dropping reply");
        }
    }
}

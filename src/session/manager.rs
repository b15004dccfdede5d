//! Session lifecycle manager
//!
//! Every inbound connection event goes through the manager. It validates the
//! request against the room directory and connection registry, applies the
//! state change and hands the resulting events to the publisher, all while
//! holding the session store lock. That lock is the single serialization
//! point for membership changes.

use crate::avatar::{AvatarGenerator, PlaceholderAvatarGenerator};
use crate::config::AppConfig;
use crate::error::{RelayError, Result};
use crate::fanout::publisher::{Delivery, EventPublisher};
use crate::metrics::MetricsCollector;
use crate::room::{DirectoryConfig, Room};
use crate::session::store::SessionStore;
use crate::types::{
    AvatarResult, ClientEvent, ConnectionId, CreateRoomRequest, JoinRoomRequest, Participant,
    Payload, RoomId, RoomSummary, RoomView, ServerEvent, TryOnRequest,
};
use crate::utils::current_timestamp;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Statistics about session manager operations
#[derive(Debug, Clone, Default)]
pub struct SessionManagerStats {
    /// Total number of rooms created
    pub rooms_created: u64,
    /// Total number of rooms removed after emptying
    pub rooms_deleted: u64,
    /// Total number of successful joins
    pub joins: u64,
    /// Total number of rejected joins
    pub join_failures: u64,
    /// Total number of leaves (explicit or on disconnect)
    pub leaves: u64,
    /// Total number of chat messages relayed
    pub messages_relayed: u64,
    /// Total number of avatar updates relayed
    pub avatar_updates: u64,
    /// Total number of try-on requests accepted
    pub try_on_requests: u64,
    /// Current number of rooms
    pub active_rooms: usize,
    /// Current number of joined connections
    pub active_participants: usize,
    /// Current number of live connections
    pub connected_clients: usize,
}

/// Manager settings
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub directory: DirectoryConfig,
    /// Capacity used when a create request omits `maxUsers`
    pub default_max_users: usize,
    /// Upper bound on a single avatar service call
    pub avatar_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            default_max_users: crate::room::MAX_SLOTS,
            avatar_timeout: Duration::from_secs(10),
        }
    }
}

impl ManagerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            directory: DirectoryConfig {
                public_base_url: config.service.public_base_url.clone(),
                invite_code_max_attempts: config.rooms.invite_code_max_attempts,
            },
            default_max_users: config.rooms.default_max_users,
            avatar_timeout: config.avatar_timeout(),
        }
    }
}

/// What happened to a try-on result when it came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryOnOutcome {
    /// Broadcast to the origin's room
    Applied,
    /// Reported to the origin as `tryOnError`
    Failed,
    /// The origin left, rejoined or disconnected in the meantime
    Discarded,
}

/// The session lifecycle manager
#[derive(Clone)]
pub struct SessionManager {
    /// Directory and registry behind one lock
    store: Arc<Mutex<SessionStore>>,
    /// Fan-out for outbound events
    publisher: Arc<dyn EventPublisher>,
    /// Downstream avatar generation
    avatar: Arc<dyn AvatarGenerator>,
    config: ManagerConfig,
    stats: Arc<RwLock<SessionManagerStats>>,
    metrics: Arc<MetricsCollector>,
}

impl SessionManager {
    /// Create a manager with placeholder avatars and its own metrics
    pub fn new(config: ManagerConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_components(
            config,
            publisher,
            Arc::new(PlaceholderAvatarGenerator::new()),
            metrics,
        )
    }

    pub fn with_components(
        config: ManagerConfig,
        publisher: Arc<dyn EventPublisher>,
        avatar: Arc<dyn AvatarGenerator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(SessionStore::new(config.directory.clone()))),
            publisher,
            avatar,
            config,
            stats: Arc::new(RwLock::new(SessionManagerStats::default())),
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    // ----- Directory operations (HTTP facade) -----

    /// Create an empty room and announce the new listing
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomView> {
        let name = request.room_name.unwrap_or_default();
        let creator = request.creator_name.unwrap_or_default();
        let max_users = request.max_users.unwrap_or(self.config.default_max_users);

        let mut store = self.store.lock().await;
        let room = store.directory.create(&name, &creator, max_users)?;

        self.metrics.record_room_created();
        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_created += 1;
        }

        self.publish_room_list(&store).await;
        Ok(room.view())
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomView> {
        let store = self.store.lock().await;
        store
            .directory
            .lookup_by_id(room_id)
            .map(|room| room.view())
            .ok_or_else(|| {
                RelayError::RoomNotFound {
                    room_id: room_id.to_string(),
                }
                .into()
            })
    }

    pub async fn get_room_by_invite(&self, invite_code: &str) -> Result<RoomSummary> {
        let store = self.store.lock().await;
        store
            .directory
            .lookup_by_invite_code(invite_code)
            .map(|room| room.summary())
            .ok_or_else(|| {
                RelayError::InviteCodeNotFound {
                    code: invite_code.to_string(),
                }
                .into()
            })
    }

    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let store = self.store.lock().await;
        room_summaries(&store)
    }

    // ----- Connection lifecycle -----

    /// Track a new connection and greet it with its id and the room list
    pub async fn connect(&self, connection_id: ConnectionId) {
        let mut store = self.store.lock().await;
        store.registry.connect(connection_id);
        info!("Connection {} opened", connection_id);

        self.publish(
            Delivery::Direct(connection_id),
            ServerEvent::Connected {
                socket_id: connection_id,
            },
        )
        .await;
        self.publish(
            Delivery::Direct(connection_id),
            ServerEvent::RoomListUpdate {
                rooms: room_summaries(&store),
            },
        )
        .await;
    }

    /// Leave any joined room, then forget the connection
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        let mut store = self.store.lock().await;
        self.leave_locked(&mut store, connection_id).await?;
        store.registry.disconnect(connection_id);
        info!("Connection {} closed", connection_id);
        Ok(())
    }

    /// Join a room by id or invite code
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        request: JoinRoomRequest,
    ) -> Result<Participant> {
        let mut store = self.store.lock().await;

        let participant = match join_locked(&mut store, connection_id, &request) {
            Ok(participant) => participant,
            Err(e) => {
                let label = match RelayError::from_anyhow(&e) {
                    Some(RelayError::RoomNotFound { .. }) => "not_found",
                    Some(RelayError::RoomFull { .. }) => "full",
                    Some(RelayError::AlreadyJoined { .. }) => "already_joined",
                    _ => "rejected",
                };
                self.metrics.record_join(label);
                if let Ok(mut stats) = self.stats.write() {
                    stats.join_failures += 1;
                }
                warn!(
                    "Connection {} failed to join '{}': {}",
                    connection_id, request.room_id, e
                );
                self.publish(
                    Delivery::Direct(connection_id),
                    ServerEvent::JoinRoomError {
                        message: e.to_string(),
                    },
                )
                .await;
                return Err(e);
            }
        };

        let room = store
            .directory
            .lookup_by_id(participant.room_id)
            .ok_or_else(|| RelayError::Internal {
                message: format!("room {} vanished during join", participant.room_id),
            })?;

        self.metrics.record_join("joined");
        if let Ok(mut stats) = self.stats.write() {
            stats.joins += 1;
        }
        info!(
            "{} ({}) joined room {} on the {} side",
            participant.name, connection_id, participant.room_id, participant.side
        );

        let view = room.view();
        self.publish(
            Delivery::Direct(connection_id),
            ServerEvent::JoinRoomSuccess {
                room: view.clone(),
                user_info: participant.info(),
            },
        )
        .await;

        let others: Vec<ConnectionId> = room
            .member_connections()
            .into_iter()
            .filter(|id| *id != connection_id)
            .collect();
        if !others.is_empty() {
            self.publish(
                Delivery::Room {
                    room_id: room.id(),
                    recipients: others,
                },
                ServerEvent::UserJoined {
                    message: format!("{} joined the room", participant.name),
                    user_info: participant.info(),
                    room: view,
                },
            )
            .await;
        }

        self.publish_room_list(&store).await;
        Ok(participant)
    }

    /// Leave the current room. Unjoined connections are a no-op.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<Option<Participant>> {
        let mut store = self.store.lock().await;
        self.leave_locked(&mut store, connection_id).await
    }

    async fn leave_locked(
        &self,
        store: &mut SessionStore,
        connection_id: ConnectionId,
    ) -> Result<Option<Participant>> {
        let Some(participant) = store.registry.unbind(connection_id) else {
            return Ok(None);
        };
        let room_id = participant.room_id;

        let (remaining, now_empty) = match store.directory.get_mut(room_id) {
            Some(room) => {
                room.remove_participant(connection_id);
                (room.member_connections(), room.is_empty())
            }
            None => {
                warn!(
                    "Connection {} was joined to missing room {}",
                    connection_id, room_id
                );
                (Vec::new(), false)
            }
        };

        self.metrics.record_leave();
        if let Ok(mut stats) = self.stats.write() {
            stats.leaves += 1;
        }
        info!(
            "{} ({}) left room {}",
            participant.name, connection_id, room_id
        );

        if !remaining.is_empty() {
            self.publish(
                Delivery::Room {
                    room_id,
                    recipients: remaining,
                },
                ServerEvent::UserLeft {
                    message: format!("{} left the room", participant.name),
                    user_info: participant.info(),
                },
            )
            .await;
        }

        if now_empty && store.directory.delete(room_id).is_some() {
            self.metrics.record_room_deleted();
            if let Ok(mut stats) = self.stats.write() {
                stats.rooms_deleted += 1;
            }
        }

        self.publish_room_list(store).await;
        Ok(Some(participant))
    }

    // ----- Relayed events -----

    /// Relay a chat message to every member of the sender's room
    pub async fn message(&self, connection_id: ConnectionId, mut payload: Payload) -> Result<()> {
        let store = self.store.lock().await;
        let Some(participant) = store.registry.participant(connection_id).cloned() else {
            let err = not_in_room(connection_id);
            self.publish(
                Delivery::Direct(connection_id),
                ServerEvent::MessageError {
                    message: err.to_string(),
                },
            )
            .await;
            return Err(err.into());
        };

        payload.insert("name".to_string(), Value::from(participant.name.clone()));
        payload.insert("userId".to_string(), Value::from(participant.user_id.clone()));
        payload.insert(
            "socketId".to_string(),
            Value::from(connection_id.to_string()),
        );
        payload.insert("side".to_string(), Value::from(participant.side.to_string()));
        payload.insert(
            "timestamp".to_string(),
            Value::from(current_timestamp().to_rfc3339()),
        );

        let delivery = room_delivery(&store, &participant);
        debug!(
            "Relaying message from {} to room {}",
            connection_id, participant.room_id
        );
        self.publish(delivery, ServerEvent::Update(payload)).await;

        if let Ok(mut stats) = self.stats.write() {
            stats.messages_relayed += 1;
        }
        Ok(())
    }

    /// Relay an avatar change keyed by the sender's side
    pub async fn avatar_update(
        &self,
        connection_id: ConnectionId,
        mut payload: Payload,
    ) -> Result<()> {
        let store = self.store.lock().await;
        let Some(participant) = store.registry.participant(connection_id).cloned() else {
            let err = not_in_room(connection_id);
            self.publish(
                Delivery::Direct(connection_id),
                ServerEvent::AvatarError {
                    message: err.to_string(),
                },
            )
            .await;
            return Err(err.into());
        };

        payload.insert("side".to_string(), Value::from(participant.side.to_string()));
        payload.insert("userId".to_string(), Value::from(participant.user_id.clone()));

        let delivery = room_delivery(&store, &participant);
        self.publish(delivery, ServerEvent::AvatarUpdated(payload))
            .await;

        if let Ok(mut stats) = self.stats.write() {
            stats.avatar_updates += 1;
        }
        Ok(())
    }

    /// Start a try-on request. The avatar call runs on its own task and its
    /// result is applied through [`SessionManager::apply_try_on_result`].
    pub async fn try_on(
        &self,
        connection_id: ConnectionId,
        request: TryOnRequest,
    ) -> Result<JoinHandle<()>> {
        let session_epoch = {
            let store = self.store.lock().await;
            match store.registry.participant(connection_id) {
                Some(participant) => participant.session_epoch,
                None => {
                    let err = not_in_room(connection_id);
                    self.publish(
                        Delivery::Direct(connection_id),
                        ServerEvent::TryOnError {
                            message: err.to_string(),
                        },
                    )
                    .await;
                    return Err(err.into());
                }
            }
        };

        if let Ok(mut stats) = self.stats.write() {
            stats.try_on_requests += 1;
        }
        info!(
            "Connection {} requested try-on of {} ({})",
            connection_id, request.product_name, request.product_id
        );

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let limit = manager.config.avatar_timeout;
            let result = match timeout(limit, manager.avatar.generate(&request)).await {
                Ok(Ok(avatar)) => Ok(avatar),
                Ok(Err(e)) => Err(RelayError::from_anyhow(&e).cloned().unwrap_or_else(|| {
                    RelayError::Downstream {
                        message: e.to_string(),
                    }
                })),
                Err(_) => Err(RelayError::DownstreamTimeout {
                    timeout_ms: limit.as_millis() as u64,
                }),
            };

            let status = match &result {
                Ok(_) => "success",
                Err(RelayError::DownstreamTimeout { .. }) => "timeout",
                Err(_) => "error",
            };
            let outcome = manager
                .apply_try_on_result(connection_id, session_epoch, result)
                .await;
            let status = if outcome == TryOnOutcome::Discarded {
                "discarded"
            } else {
                status
            };
            manager.metrics.record_try_on(status, started.elapsed());
        });

        Ok(handle)
    }

    /// Apply a finished avatar call for the session that requested it
    pub async fn apply_try_on_result(
        &self,
        connection_id: ConnectionId,
        session_epoch: u64,
        result: std::result::Result<AvatarResult, RelayError>,
    ) -> TryOnOutcome {
        let store = self.store.lock().await;

        match result {
            Ok(avatar) => {
                let participant = match store.registry.participant(connection_id) {
                    Some(p) if p.session_epoch == session_epoch => p.clone(),
                    _ => {
                        debug!(
                            "Discarding try-on result for {}: session {} is gone",
                            connection_id, session_epoch
                        );
                        return TryOnOutcome::Discarded;
                    }
                };

                let mut payload = Payload::new();
                payload.insert("side".to_string(), Value::from(participant.side.to_string()));
                payload.insert("userId".to_string(), Value::from(participant.user_id.clone()));
                payload.insert("avatarUrl".to_string(), Value::from(avatar.avatar_url));
                match serde_json::to_value(&avatar.product_info) {
                    Ok(info) => {
                        payload.insert("productInfo".to_string(), info);
                    }
                    Err(e) => warn!("Failed to encode product info: {}", e),
                }

                let delivery = room_delivery(&store, &participant);
                self.publish(delivery, ServerEvent::AvatarUpdated(payload))
                    .await;
                TryOnOutcome::Applied
            }
            Err(e) => {
                error!("Try-on for connection {} failed: {}", connection_id, e);
                if !store.registry.is_connected(connection_id) {
                    debug!(
                        "Dropping try-on error for departed connection {}",
                        connection_id
                    );
                    return TryOnOutcome::Discarded;
                }
                self.publish(
                    Delivery::Direct(connection_id),
                    ServerEvent::TryOnError {
                        message: e.to_string(),
                    },
                )
                .await;
                TryOnOutcome::Failed
            }
        }
    }

    /// Dispatch one inbound realtime event
    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let timer = self.metrics.start_timer();
        let operation = match event {
            ClientEvent::JoinRoom(request) => {
                let _ = self.join(connection_id, request).await;
                "join_room"
            }
            ClientEvent::Message(payload) => {
                let _ = self.message(connection_id, payload).await;
                "message"
            }
            ClientEvent::UpdateAvatar(payload) => {
                let _ = self.avatar_update(connection_id, payload).await;
                "update_avatar"
            }
            ClientEvent::TryOn(request) => {
                let _ = self.try_on(connection_id, request).await;
                "try_on"
            }
            ClientEvent::LeaveRoom => {
                if let Err(e) = self.leave(connection_id).await {
                    warn!("Leave for {} failed: {}", connection_id, e);
                }
                "leave_room"
            }
        };
        self.metrics
            .record_event_processing(operation, timer.stop());
    }

    /// Send a generic `error` event to one connection
    pub async fn send_error(&self, connection_id: ConnectionId, message: String) {
        self.publish(Delivery::Direct(connection_id), ServerEvent::Error { message })
            .await;
    }

    /// Current statistics, including live gauges from the store
    pub async fn get_stats(&self) -> SessionManagerStats {
        let mut stats = self
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();

        let store = self.store.lock().await;
        stats.active_rooms = store.directory.len();
        stats.active_participants = store.registry.joined_count();
        stats.connected_clients = store.registry.connected_count();
        stats
    }

    /// Check directory/registry consistency
    pub async fn verify_invariants(&self) -> Result<()> {
        self.store.lock().await.verify_invariants()
    }

    async fn publish(&self, delivery: Delivery, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.publisher.publish(delivery, event).await {
            warn!("Failed to publish '{}': {}", name, e);
        }
    }

    async fn publish_room_list(&self, store: &SessionStore) {
        self.publish(
            Delivery::Global,
            ServerEvent::RoomListUpdate {
                rooms: room_summaries(store),
            },
        )
        .await;
    }
}

/// Validate and apply a join against the store
fn join_locked(
    store: &mut SessionStore,
    connection_id: ConnectionId,
    request: &JoinRoomRequest,
) -> Result<Participant> {
    if store.registry.is_joined(connection_id) {
        return Err(RelayError::AlreadyJoined {
            connection_id: connection_id.to_string(),
        }
        .into());
    }

    let name = match request.user_name.trim() {
        "" => connection_id.to_string(),
        name => name.to_string(),
    };
    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| connection_id.to_string());

    let room_id = store
        .directory
        .resolve(&request.room_id)
        .ok_or_else(|| RelayError::RoomNotFound {
            room_id: request.room_id.clone(),
        })?;

    let session_epoch = store.next_epoch();
    let room = store
        .directory
        .get_mut(room_id)
        .ok_or_else(|| RelayError::RoomNotFound {
            room_id: room_id.to_string(),
        })?;
    let participant = room.add_participant(connection_id, user_id, name, session_epoch)?;

    if let Err(e) = store.registry.bind(participant.clone()) {
        if let Some(room) = store.directory.get_mut(room_id) {
            room.remove_participant(connection_id);
        }
        return Err(e);
    }

    Ok(participant)
}

fn room_summaries(store: &SessionStore) -> Vec<RoomSummary> {
    store.directory.list().iter().map(Room::summary).collect()
}

/// Room-scoped delivery to every current member of a participant's room
fn room_delivery(store: &SessionStore, participant: &Participant) -> Delivery {
    let recipients = store
        .directory
        .lookup_by_id(participant.room_id)
        .map(|room| room.member_connections())
        .unwrap_or_default();
    Delivery::Room {
        room_id: participant.room_id,
        recipients,
    }
}

fn not_in_room(connection_id: ConnectionId) -> RelayError {
    RelayError::NotInRoom {
        connection_id: connection_id.to_string(),
    }
}

//! Test fixtures and helpers for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use duet_room::avatar::AvatarGenerator;
use duet_room::error::Result;
use duet_room::fanout::RecordingPublisher;
use duet_room::metrics::MetricsCollector;
use duet_room::session::{ManagerConfig, SessionManager};
use duet_room::types::{
    AvatarResult, ConnectionId, CreateRoomRequest, JoinRoomRequest, Participant, Payload,
    ProductInfo, RoomView, TryOnRequest,
};
use duet_room::utils::generate_connection_id;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mockall::mock! {
    pub Avatar {}

    #[async_trait]
    impl AvatarGenerator for Avatar {
        async fn generate(&self, request: &TryOnRequest) -> Result<AvatarResult>;
    }
}

/// Avatar generator that answers after a fixed delay
#[derive(Debug, Default)]
pub struct DelayedAvatarGenerator {
    delay: Duration,
    calls: AtomicUsize,
}

impl DelayedAvatarGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvatarGenerator for DelayedAvatarGenerator {
    async fn generate(&self, request: &TryOnRequest) -> Result<AvatarResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(AvatarResult {
            avatar_url: format!("https://avatars.test/{}.png", request.product_id),
            product_info: ProductInfo {
                id: request.product_id.clone(),
                name: request.product_name.clone(),
            },
        })
    }
}

/// Manager wired to a recording publisher and placeholder avatars
pub fn create_test_system() -> (SessionManager, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let manager = SessionManager::new(ManagerConfig::default(), publisher.clone());
    (manager, publisher)
}

/// Manager with a custom avatar generator
pub fn create_test_system_with_avatar(
    avatar: Arc<dyn AvatarGenerator>,
    avatar_timeout: Duration,
) -> (SessionManager, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let config = ManagerConfig {
        avatar_timeout,
        ..ManagerConfig::default()
    };
    let manager = SessionManager::with_components(
        config,
        publisher.clone(),
        avatar,
        Arc::new(MetricsCollector::new().expect("Failed to create metrics collector")),
    );
    (manager, publisher)
}

pub async fn create_room(manager: &SessionManager, name: &str, creator: &str) -> RoomView {
    manager
        .create_room(CreateRoomRequest {
            room_name: Some(name.to_string()),
            creator_name: Some(creator.to_string()),
            max_users: Some(2),
        })
        .await
        .expect("room creation should succeed")
}

pub async fn connect(manager: &SessionManager) -> ConnectionId {
    let id = generate_connection_id();
    manager.connect(id).await;
    id
}

pub fn join_request(room: &str, name: &str) -> JoinRoomRequest {
    JoinRoomRequest {
        room_id: room.to_string(),
        user_name: name.to_string(),
        user_id: Some(format!("{}-id", name.to_lowercase())),
    }
}

/// Connect a new client and join it to `room`
pub async fn connect_and_join(
    manager: &SessionManager,
    room: &str,
    name: &str,
) -> (ConnectionId, Participant) {
    let id = connect(manager).await;
    let participant = manager
        .join(id, join_request(room, name))
        .await
        .expect("join should succeed");
    (id, participant)
}

pub fn chat(text: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("type".to_string(), "message".into());
    payload.insert("message".to_string(), text.into());
    payload
}

pub fn try_on_request(product_id: &str, product_name: &str) -> TryOnRequest {
    TryOnRequest {
        product_id: product_id.to_string(),
        product_name: product_name.to_string(),
        jwt: Some("test-jwt".to_string()),
    }
}

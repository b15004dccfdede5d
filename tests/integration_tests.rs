//! Integration tests for the duet-room relay
//!
//! These tests drive the session manager the way the realtime surface does
//! and check what each connection would have received:
//! - The create / join / chat / disconnect walkthrough
//! - Room isolation and capacity under concurrent joins
//! - Try-on results racing against leave, rejoin and disconnect
//! - Directory/registry invariants under random operation sequences

mod fixtures;

use duet_room::error::RelayError;
use duet_room::fanout::Delivery;
use duet_room::types::{ServerEvent, Side};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use fixtures::{
    chat, connect, connect_and_join, create_room, create_test_system,
    create_test_system_with_avatar, join_request, try_on_request, DelayedAvatarGenerator,
    MockAvatar,
};

#[tokio::test]
async fn test_demo_room_walkthrough() {
    let (manager, publisher) = create_test_system();

    let room = create_room(&manager, "Demo", "Alice").await;
    let room_id = room.summary.id;
    let invite_code = room.summary.invite_code.clone();
    assert_eq!(invite_code.len(), 8);

    // Alice joins by id and takes the left seat
    let (alice, alice_seat) = connect_and_join(&manager, &room_id.to_string(), "Alice").await;
    assert_eq!(alice_seat.side, Side::Left);

    // Bob joins through the invite code and takes the right seat
    let (bob, bob_seat) = connect_and_join(&manager, &invite_code, "Bob").await;
    assert_eq!(bob_seat.side, Side::Right);
    assert!(publisher.received_by(alice).iter().any(|event| matches!(
        event,
        ServerEvent::UserJoined { user_info, .. } if user_info.name == "Bob"
    )));

    // Bob says hi; both receive the enriched message
    publisher.clear_events();
    manager.message(bob, chat("hi")).await.unwrap();
    for member in [alice, bob] {
        let received = publisher.received_by(member);
        assert_eq!(received.len(), 1);
        match &received[0] {
            ServerEvent::Update(data) => {
                assert_eq!(data["name"], "Bob");
                assert_eq!(data["message"], "hi");
                assert_eq!(data["side"], "right");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // Alice disconnects; Bob is told and the room shrinks
    publisher.clear_events();
    manager.disconnect(alice).await.unwrap();
    assert!(publisher.received_by(bob).iter().any(|event| matches!(
        event,
        ServerEvent::UserLeft { user_info, .. } if user_info.name == "Alice"
    )));
    let remaining = manager.get_room(room_id).await.unwrap();
    assert_eq!(remaining.summary.current_users, 1);
    assert_eq!(remaining.users[0].side, Side::Right);

    // Bob disconnects; the room is gone by id and by code
    manager.disconnect(bob).await.unwrap();
    let err = manager.get_room(room_id).await.unwrap_err();
    assert!(RelayError::from_anyhow(&err).unwrap().is_not_found());
    assert!(manager.get_room_by_invite(&invite_code).await.is_err());
    assert!(manager.list_rooms().await.is_empty());
    manager.verify_invariants().await.unwrap();
}

#[tokio::test]
async fn test_messages_stay_inside_their_room() {
    let (manager, publisher) = create_test_system();
    let first = create_room(&manager, "First", "Alice").await;
    let second = create_room(&manager, "Second", "Carol").await;

    let (alice, _) = connect_and_join(&manager, &first.summary.invite_code, "Alice").await;
    let (bob, _) = connect_and_join(&manager, &first.summary.invite_code, "Bob").await;
    let (carol, _) = connect_and_join(&manager, &second.summary.invite_code, "Carol").await;
    publisher.clear_events();

    manager.message(alice, chat("only for bob")).await.unwrap();

    assert_eq!(publisher.received_by(alice).len(), 1);
    assert_eq!(publisher.received_by(bob).len(), 1);
    assert!(publisher.received_by(carol).is_empty());
}

#[tokio::test]
async fn test_unjoined_message_changes_nothing() {
    let (manager, publisher) = create_test_system();
    let room = create_room(&manager, "Demo", "Alice").await;
    let (member, _) = connect_and_join(&manager, &room.summary.invite_code, "Alice").await;
    let stranger = connect(&manager).await;
    let before = manager.list_rooms().await;
    publisher.clear_events();

    let err = manager.message(stranger, chat("hello?")).await.unwrap_err();
    assert!(matches!(
        RelayError::from_anyhow(&err),
        Some(RelayError::NotInRoom { .. })
    ));

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Delivery::Direct(stranger));
    assert_eq!(events[0].1.name(), "messageError");
    assert!(publisher.received_by(member).is_empty());
    assert_eq!(manager.list_rooms().await, before);
}

#[tokio::test]
async fn test_concurrent_joins_respect_capacity() {
    let (manager, _publisher) = create_test_system();
    let room = create_room(&manager, "Demo", "Alice").await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let manager = manager.clone();
        let code = room.summary.invite_code.clone();
        handles.push(tokio::spawn(async move {
            let id = connect(&manager).await;
            manager
                .join(id, join_request(&code, &format!("Guest{}", i)))
                .await
        }));
    }

    let mut joined = Vec::new();
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(participant) => joined.push(participant),
            Err(e) => {
                assert!(matches!(
                    RelayError::from_anyhow(&e),
                    Some(RelayError::RoomFull { .. })
                ));
                full += 1;
            }
        }
    }

    assert_eq!(joined.len(), 2);
    assert_eq!(full, 4);
    let mut sides: Vec<Side> = joined.iter().map(|p| p.side).collect();
    sides.sort_by_key(|side| side.index());
    assert_eq!(sides, vec![Side::Left, Side::Right]);
    manager.verify_invariants().await.unwrap();
}

#[tokio::test]
async fn test_freed_seat_goes_to_next_joiner() {
    let (manager, _publisher) = create_test_system();
    let room = create_room(&manager, "Demo", "Alice").await;
    let code = room.summary.invite_code.clone();

    let (alice, _) = connect_and_join(&manager, &code, "Alice").await;
    let (_bob, bob_seat) = connect_and_join(&manager, &code, "Bob").await;
    manager.leave(alice).await.unwrap();

    let (_carol, carol_seat) = connect_and_join(&manager, &code, "Carol").await;
    assert_eq!(bob_seat.side, Side::Right);
    assert_eq!(carol_seat.side, Side::Left);
}

#[tokio::test]
async fn test_try_on_result_after_disconnect_is_discarded() {
    let avatar = Arc::new(DelayedAvatarGenerator::new(Duration::from_millis(100)));
    let (manager, publisher) =
        create_test_system_with_avatar(avatar.clone(), Duration::from_secs(5));
    let room = create_room(&manager, "Demo", "Alice").await;
    let (alice, _) = connect_and_join(&manager, &room.summary.invite_code, "Alice").await;
    let (bob, _) = connect_and_join(&manager, &room.summary.invite_code, "Bob").await;

    let pending = manager
        .try_on(alice, try_on_request("p-9", "Green Coat"))
        .await
        .unwrap();
    manager.disconnect(alice).await.unwrap();
    publisher.clear_events();

    pending.await.unwrap();

    assert_eq!(avatar.call_count(), 1);
    assert!(publisher.events().is_empty());
    assert!(publisher.received_by(bob).is_empty());
}

#[tokio::test]
async fn test_try_on_result_after_rejoin_is_discarded() {
    let avatar = Arc::new(DelayedAvatarGenerator::new(Duration::from_millis(100)));
    let (manager, publisher) = create_test_system_with_avatar(avatar, Duration::from_secs(5));
    let room = create_room(&manager, "Demo", "Alice").await;
    let code = room.summary.invite_code.clone();
    let (alice, _) = connect_and_join(&manager, &code, "Alice").await;

    let pending = manager
        .try_on(alice, try_on_request("p-9", "Green Coat"))
        .await
        .unwrap();
    manager.leave(alice).await.unwrap();
    let fresh_room = create_room(&manager, "Other", "Alice").await;
    manager
        .join(alice, join_request(&fresh_room.summary.invite_code, "Alice"))
        .await
        .unwrap();
    publisher.clear_events();

    pending.await.unwrap();

    assert_eq!(publisher.count_events_named("avatarUpdated"), 0);
}

#[tokio::test]
async fn test_try_on_success_reaches_the_whole_room() {
    let mut avatar = MockAvatar::new();
    avatar
        .expect_generate()
        .withf(|request| request.product_id == "p-1" && request.jwt.as_deref() == Some("test-jwt"))
        .times(1)
        .returning(|request| {
            Ok(duet_room::types::AvatarResult {
                avatar_url: "https://avatars.test/p-1.png".to_string(),
                product_info: duet_room::types::ProductInfo {
                    id: request.product_id.clone(),
                    name: request.product_name.clone(),
                },
            })
        });
    let (manager, publisher) =
        create_test_system_with_avatar(Arc::new(avatar), Duration::from_secs(5));
    let room = create_room(&manager, "Demo", "Alice").await;
    let (alice, _) = connect_and_join(&manager, &room.summary.invite_code, "Alice").await;
    let (bob, _) = connect_and_join(&manager, &room.summary.invite_code, "Bob").await;
    publisher.clear_events();

    manager
        .try_on(bob, try_on_request("p-1", "Red Dress"))
        .await
        .unwrap()
        .await
        .unwrap();

    for member in [alice, bob] {
        match &publisher.received_by(member)[..] {
            [ServerEvent::AvatarUpdated(data)] => {
                assert_eq!(data["side"], "right");
                assert_eq!(data["avatarUrl"], "https://avatars.test/p-1.png");
                assert_eq!(data["productInfo"]["id"], "p-1");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_try_on_timeout_reports_once_to_origin() {
    let avatar = Arc::new(DelayedAvatarGenerator::new(Duration::from_secs(2)));
    let (manager, publisher) = create_test_system_with_avatar(avatar, Duration::from_millis(30));
    let room = create_room(&manager, "Demo", "Alice").await;
    let (alice, _) = connect_and_join(&manager, &room.summary.invite_code, "Alice").await;
    let (bob, _) = connect_and_join(&manager, &room.summary.invite_code, "Bob").await;
    publisher.clear_events();

    manager
        .try_on(alice, try_on_request("p-1", "Red Dress"))
        .await
        .unwrap()
        .await
        .unwrap();

    assert_eq!(publisher.count_events_named("tryOnError"), 1);
    assert_eq!(publisher.received_by(alice).len(), 1);
    assert!(publisher.received_by(bob).is_empty());
}

/// One step of a random session workload
#[derive(Debug, Clone)]
enum Op {
    Create,
    Join { client: usize, room: usize },
    Leave { client: usize },
    Disconnect { client: usize },
    Message { client: usize },
}

const CLIENTS: usize = 5;

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Create),
        4 => (0..CLIENTS, 0..4usize).prop_map(|(client, room)| Op::Join { client, room }),
        2 => (0..CLIENTS).prop_map(|client| Op::Leave { client }),
        1 => (0..CLIENTS).prop_map(|client| Op::Disconnect { client }),
        2 => (0..CLIENTS).prop_map(|client| Op::Message { client }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_random_sessions_keep_invariants(ops in prop::collection::vec(op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let (manager, _publisher) = create_test_system();
            let mut clients = Vec::new();
            for _ in 0..CLIENTS {
                clients.push(connect(&manager).await);
            }
            let mut codes: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Create => {
                        let room = create_room(&manager, "Room", "Owner").await;
                        codes.push(room.summary.invite_code);
                    }
                    Op::Join { client, room } => {
                        if let Some(code) = codes.get(room % codes.len().max(1)) {
                            let _ = manager.join(clients[client], join_request(code, "Guest")).await;
                        }
                    }
                    Op::Leave { client } => {
                        manager.leave(clients[client]).await.unwrap();
                    }
                    Op::Disconnect { client } => {
                        manager.disconnect(clients[client]).await.unwrap();
                        manager.connect(clients[client]).await;
                    }
                    Op::Message { client } => {
                        let _ = manager.message(clients[client], chat("ping")).await;
                    }
                }

                manager.verify_invariants().await.unwrap();
                for room in manager.list_rooms().await {
                    assert!(room.current_users <= room.max_users);
                    let view = manager.get_room(room.id).await.unwrap();
                    assert_eq!(view.users.len(), room.current_users);
                }
            }
        });
    }
}

//! Fan-out behaviour observed through a running hub.

use chrono::Utc;
use tutorline_core::{
    ChatMessage, Connection, FanoutReport, Hub, HubConfig, HubHandle, Identity, MessageId, Outbox,
    Role, RoomId, UserId,
};

fn message(id: i64, room: i64) -> ChatMessage {
    ChatMessage {
        id: MessageId(id),
        room_id: RoomId(room),
        sender_id: UserId(1),
        content: format!("message {id}"),
        created_at: Utc::now(),
    }
}

async fn register(
    hub: &HubHandle,
    id: &str,
    user: i64,
    rooms: &[i64],
    capacity: usize,
) -> Outbox {
    let (connection, outbox) = Connection::new(
        id.into(),
        Identity::new(UserId(user), Role::Student),
        rooms.iter().map(|r| RoomId(*r)),
        capacity,
    );
    assert!(hub.register(connection).await.unwrap());
    outbox
}

#[tokio::test]
async fn test_broadcast_reaches_only_room_subscribers() {
    let hub = Hub::spawn(HubConfig::default());
    let mut c1 = register(&hub, "c1", 1, &[7], 8).await;
    let mut c2 = register(&hub, "c2", 2, &[7], 8).await;
    let mut c3 = register(&hub, "c3", 3, &[8], 8).await;

    let report = hub.broadcast_with_report(message(1, 7)).await.unwrap();
    assert_eq!(
        report,
        FanoutReport {
            delivered: 2,
            evicted: 0
        }
    );

    assert_eq!(c1.try_recv().map(|m| m.id), Some(MessageId(1)));
    assert_eq!(c2.try_recv().map(|m| m.id), Some(MessageId(1)));
    assert!(c1.try_recv().is_none());
    assert!(c2.try_recv().is_none());
    assert!(c3.try_recv().is_none());
}

#[tokio::test]
async fn test_slow_subscriber_does_not_hold_back_others() {
    const HEALTHY: usize = 4;
    const MESSAGES: i64 = 50;

    let hub = Hub::spawn(HubConfig::default());
    let _stuck = register(&hub, "stuck", 100, &[7], 2).await;
    let mut healthy = Vec::new();
    for i in 0..HEALTHY {
        healthy.push(register(&hub, &format!("h{i}"), i as i64, &[7], 64).await);
    }

    let mut evicted = 0;
    for id in 1..=MESSAGES {
        evicted += hub
            .broadcast_with_report(message(id, 7))
            .await
            .unwrap()
            .evicted;
    }
    assert_eq!(evicted, 1);

    for outbox in &mut healthy {
        let mut received = Vec::new();
        while let Some(m) = outbox.try_recv() {
            received.push(m.id.0);
        }
        assert_eq!(received, (1..=MESSAGES).collect::<Vec<_>>());
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.connections, HEALTHY);
    assert_eq!(stats.evicted_total, 1);
}

#[tokio::test]
async fn test_undrained_outbox_is_evicted_after_second_broadcast() {
    let hub = Hub::spawn(HubConfig::default());
    let mut c1 = register(&hub, "c1", 1, &[7], 1).await;

    assert_eq!(hub.broadcast_with_report(message(1, 7)).await.unwrap().delivered, 1);
    assert_eq!(hub.broadcast_with_report(message(2, 7)).await.unwrap().evicted, 1);
    assert_eq!(hub.broadcast_with_report(message(3, 7)).await.unwrap().delivered, 0);
    assert_eq!(hub.stats().await.unwrap().connections, 0);

    // The writer drains what was queued, then sees the outbox close.
    assert_eq!(c1.recv().await.map(|m| m.id), Some(MessageId(1)));
    assert!(c1.recv().await.is_none());
}

#[tokio::test]
async fn test_double_registration_delivers_once() {
    let hub = Hub::spawn(HubConfig::default());
    let (connection, mut outbox) = Connection::new(
        "c1".into(),
        Identity::new(UserId(1), Role::Teacher),
        [RoomId(7)],
        8,
    );

    assert!(hub.register(connection.clone()).await.unwrap());
    assert!(!hub.register(connection).await.unwrap());

    hub.broadcast_with_report(message(1, 7)).await.unwrap();
    assert!(outbox.try_recv().is_some());
    assert!(outbox.try_recv().is_none());
}

#[tokio::test]
async fn test_concurrent_unregister_is_harmless() {
    let hub = Hub::spawn(HubConfig::default());
    let mut outbox = register(&hub, "c1", 1, &[7], 8).await;
    let _other = register(&hub, "c2", 2, &[7], 8).await;

    let (a, b) = tokio::join!(hub.unregister("c1".into()), hub.unregister("c1".into()));
    a.unwrap();
    b.unwrap();

    assert!(outbox.recv().await.is_none());
    let report = hub.broadcast_with_report(message(1, 7)).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(hub.stats().await.unwrap().connections, 1);
}

#[tokio::test]
async fn test_join_room_reaches_live_connections() {
    let hub = Hub::spawn(HubConfig::default());
    let mut teacher = register(&hub, "t", 10, &[], 8).await;
    let mut student = register(&hub, "s", 20, &[], 8).await;
    let mut other = register(&hub, "o", 30, &[], 8).await;

    let joined = hub
        .join_room(RoomId(5), vec![UserId(10), UserId(20)])
        .await
        .unwrap();
    assert_eq!(joined, 2);

    hub.broadcast_with_report(message(1, 5)).await.unwrap();
    assert!(teacher.try_recv().is_some());
    assert!(student.try_recv().is_some());
    assert!(other.try_recv().is_none());
}

use std::sync::Arc;
use std::time::Duration;

use otopazar_core::backend::{DataService, Filter, MemoryDataService};
use otopazar_core::inbox::{
    contact_seller, load_conversations, load_thread, mark_thread_read, send_message,
    ComposeContext,
};
use otopazar_core::{CoreEvent, InboxRuntime};
use serde_json::json;

const BODY: &str = "Merhaba, araç hala satılık mı?";

fn marketplace() -> MemoryDataService {
    let service = MemoryDataService::new();
    service.seed(
        "arabalar",
        json!({"id": "car-1", "baslik": "2015 VW Passat 1.6 TDI", "kullanici_id": "seller"}),
    );
    service.seed(
        "arabalar",
        json!({"id": "car-2", "baslik": "2019 Renault Clio", "kullanici_id": "seller"}),
    );
    service.seed("profiller", json!({"id": "seller", "ad_soyad": "Mehmet Kaya"}));
    service.seed("profiller", json!({"id": "buyer", "ad_soyad": "Ayşe Demir"}));
    service
}

fn seed_message(service: &MemoryDataService, id: &str, from: &str, to: &str, read: bool, at: &str) {
    service.seed(
        "mesajlar",
        json!({
            "id": id, "gonderen_id": from, "alici_id": to, "arac_id": "car-1",
            "icerik": format!("message {}", id), "okundu": read, "created_at": at
        }),
    );
}

#[tokio::test]
async fn test_unread_count_matches_persisted_unread_rows() {
    let service = marketplace();
    seed_message(&service, "1", "buyer", "seller", false, "2024-03-01T09:00:00Z");
    seed_message(&service, "2", "buyer", "seller", true, "2024-03-01T09:01:00Z");
    seed_message(&service, "3", "seller", "buyer", false, "2024-03-01T09:02:00Z");
    seed_message(&service, "4", "buyer", "seller", false, "2024-03-01T09:03:00Z");
    seed_message(&service, "5", "other", "seller", false, "2024-03-01T09:04:00Z");

    for (viewer, counterpart) in [("seller", "buyer"), ("buyer", "seller"), ("seller", "other")] {
        let conversations = load_conversations(&service, viewer).await.unwrap();
        let conversation = conversations
            .iter()
            .find(|c| c.counterpart_id == counterpart)
            .unwrap();
        let persisted = service
            .count(
                "mesajlar",
                &[
                    Filter::eq("alici_id", viewer),
                    Filter::eq("gonderen_id", counterpart),
                    Filter::eq("okundu", false),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            u64::from(conversation.unread_count),
            persisted,
            "{} <- {}",
            viewer,
            counterpart
        );
    }
}

#[tokio::test]
async fn test_thread_is_exclusive_and_ascending() {
    let service = marketplace();
    seed_message(&service, "c", "seller", "buyer", false, "2024-03-01T09:05:00Z");
    seed_message(&service, "a", "buyer", "seller", false, "2024-03-01T09:00:00Z");
    seed_message(&service, "x", "buyer", "other", false, "2024-03-01T09:01:00Z");
    seed_message(&service, "y", "other", "seller", false, "2024-03-01T09:02:00Z");
    seed_message(&service, "b", "buyer", "seller", false, "2024-03-01T09:03:00Z");

    let thread = load_thread(&service, "buyer", "seller").await.unwrap();
    let ids: Vec<_> = thread.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(thread.messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert!(thread.messages.iter().all(|m| m.involves("buyer", "seller")));
    assert_eq!(thread.counterpart.display_name.as_deref(), Some("Mehmet Kaya"));
}

#[tokio::test]
async fn test_sent_and_received_come_back_in_time_order() {
    let service = marketplace();
    seed_message(&service, "t2", "seller", "buyer", false, "2024-03-01T10:00:00Z");
    seed_message(&service, "t1", "buyer", "seller", false, "2024-03-01T09:00:00Z");

    for (viewer, counterpart) in [("buyer", "seller"), ("seller", "buyer")] {
        let thread = load_thread(&service, viewer, counterpart).await.unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }
}

#[tokio::test]
async fn test_marking_read_twice_is_idempotent() {
    let service = marketplace();
    seed_message(&service, "1", "buyer", "seller", false, "2024-03-01T09:00:00Z");
    seed_message(&service, "2", "buyer", "seller", true, "2024-03-01T09:01:00Z");

    assert_eq!(mark_thread_read(&service, "buyer", "seller").await.unwrap(), 1);
    let once = service.rows("mesajlar");
    assert_eq!(mark_thread_read(&service, "buyer", "seller").await.unwrap(), 0);
    assert_eq!(service.rows("mesajlar"), once);
}

#[tokio::test]
async fn test_composed_message_round_trips_through_thread() {
    let service = marketplace();
    seed_message(&service, "old", "seller", "buyer", true, "2024-03-01T09:00:00Z");

    let ctx = ComposeContext::new("buyer", "seller", "car-1");
    send_message(&service, &ctx, BODY).await.unwrap();

    let thread = load_thread(&service, "seller", "buyer").await.unwrap();
    let last = thread.messages.last().unwrap();
    assert_eq!(last.body, BODY);
    assert!(thread.messages[..thread.messages.len() - 1]
        .iter()
        .all(|m| m.created_at < last.created_at));
}

#[tokio::test]
async fn test_first_contact_scenario() {
    let service = marketplace();

    let before = load_conversations(&service, "buyer").await.unwrap();
    assert!(before.iter().all(|c| c.counterpart_id != "seller"));

    contact_seller(&service, "buyer", "car-2", BODY).await.unwrap();

    let seller_view = load_conversations(&service, "seller").await.unwrap();
    assert_eq!(seller_view.len(), 1);
    assert_eq!(seller_view[0].counterpart_id, "buyer");
    assert_eq!(seller_view[0].counterpart_name, "Ayşe Demir");
    assert_eq!(seller_view[0].unread_count, 1);
    assert_eq!(seller_view[0].last_message_body, BODY);
    assert_eq!(seller_view[0].listing_title.as_deref(), Some("2019 Renault Clio"));

    mark_thread_read(&service, "buyer", "seller").await.unwrap();
    let seller_view = load_conversations(&service, "seller").await.unwrap();
    assert_eq!(seller_view[0].unread_count, 0);
}

async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CoreEvent>) -> CoreEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_runtime_keeps_open_thread_live() {
    let service = marketplace();
    seed_message(&service, "1", "buyer", "seller", false, "2024-03-01T09:00:00Z");

    let mut runtime = InboxRuntime::start(Arc::new(service.clone()), "seller")
        .await
        .unwrap();
    let mut events = runtime.take_event_rx().unwrap();
    let handle = runtime.handle();

    // Initial refresh
    assert!(matches!(
        next_event(&mut events).await,
        CoreEvent::ConversationsUpdated { unread_total: 1, .. }
    ));

    handle.open_thread("buyer").unwrap();
    assert!(matches!(next_event(&mut events).await, CoreEvent::ThreadLoaded(_)));
    assert!(matches!(
        next_event(&mut events).await,
        CoreEvent::ConversationsUpdated { unread_total: 0, .. }
    ));

    // Buyer writes while the seller has the thread open
    let incoming = send_message(&service, &ComposeContext::new("buyer", "seller", "car-1"), BODY)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        CoreEvent::MessageAppended(incoming.clone())
    );
    assert!(matches!(
        next_event(&mut events).await,
        CoreEvent::ConversationsUpdated { unread_total: 0, .. }
    ));
    let stored = service.rows("mesajlar");
    let row = stored.iter().find(|r| r["id"] == json!(incoming.id)).unwrap();
    assert_eq!(row["okundu"], json!(true));

    // Seller replies through the handle; the message arrives via the feed
    let id = handle.send_message("Evet, satılık").await.unwrap();
    assert!(matches!(next_event(&mut events).await, CoreEvent::MessageSent(_)));
    match next_event(&mut events).await {
        CoreEvent::MessageAppended(message) => assert_eq!(message.id, id),
        other => panic!("unexpected event: {:?}", other),
    }

    runtime.shutdown().await;
    assert_eq!(service.subscriber_count(), 0);
}

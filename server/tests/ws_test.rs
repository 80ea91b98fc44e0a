//! Integration tests for WebSocket auth, presence and photo capture relay.

mod common;

use common::*;
use futures_util::SinkExt;
use serde_json::json;

#[tokio::test]
async fn test_ws_rejects_missing_and_invalid_token() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/ws", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "token required"}));

    let resp = client
        .get(format!("{}/ws?token=not-a-jwt", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "invalid token"}));

    let url = format!("ws://{}/ws?token=not-a-jwt", server.addr);
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn test_unpaired_user_gets_status_and_trigger_error() {
    let server = start_test_server().await;
    let user = create_user(&server).await;

    let (mut write, mut read) = connect_ws(&server, &user.token).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "pair_status", "data": {"has_pair": false}})
    );

    send_json(&mut write, json!({"type": "trigger_photo"})).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "error", "message": "not in a pairing"})
    );
    expect_silence(&mut read).await;
}

#[tokio::test]
async fn test_trigger_with_offline_partner() {
    let server = start_test_server().await;
    let (a, _b, pair_id) = paired_users(&server).await;

    let (mut write, mut read) = connect_ws(&server, &a.token).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "pair_status", "data": {"has_pair": true, "pair_id": pair_id}})
    );

    send_json(
        &mut write,
        json!({"type": "trigger_photo", "timestamp": 1705315200000i64}),
    )
    .await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "error", "message": "partner is offline"})
    );
    expect_silence(&mut read).await;
}

#[tokio::test]
async fn test_presence_and_capture_between_partners() {
    let server = start_test_server().await;
    let (a, b, pair_id) = paired_users(&server).await;

    let (mut a_write, mut a_read) = connect_ws(&server, &a.token).await;
    assert_eq!(
        next_json(&mut a_read).await,
        json!({"type": "pair_status", "data": {"has_pair": true, "pair_id": pair_id}})
    );

    let (mut b_write, mut b_read) = connect_ws(&server, &b.token).await;
    assert_eq!(
        next_json(&mut a_read).await,
        json!({"type": "partner_status", "online": true})
    );
    assert_eq!(
        next_json(&mut b_read).await,
        json!({"type": "pair_status", "data": {"has_pair": true, "pair_id": pair_id}})
    );

    send_json(
        &mut a_write,
        json!({"type": "trigger_photo", "timestamp": 1705315200000i64}),
    )
    .await;
    let expected = json!({
        "type": "take_photo",
        "initiator_id": a.id,
        "timestamp": 1705315200000i64,
    });
    assert_eq!(next_json(&mut a_read).await, expected);
    assert_eq!(next_json(&mut b_read).await, expected);

    // Omitted timestamp means "now"
    send_json(&mut b_write, json!({"type": "trigger_photo"})).await;
    let take = next_json(&mut a_read).await;
    assert_eq!(take["type"], "take_photo");
    assert_eq!(take["initiator_id"], b.id.as_str());
    assert!(take["timestamp"].as_i64().unwrap() > 1705315200000);
    assert_eq!(next_json(&mut b_read).await, take);

    b_write.close().await.unwrap();
    assert_eq!(
        next_json(&mut a_read).await,
        json!({"type": "partner_status", "online": false})
    );
    expect_silence(&mut a_read).await;
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let server = start_test_server().await;
    let user = create_user(&server).await;

    let (mut write, mut read) = connect_ws(&server, &user.token).await;
    next_json(&mut read).await;

    for _ in 0..3 {
        send_text(&mut write, "{not json").await;
    }
    for _ in 0..3 {
        assert_eq!(
            next_json(&mut read).await,
            json!({"type": "error", "message": "invalid message format"})
        );
    }

    send_json(&mut write, json!({"type": "wave"})).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "error", "message": "unknown message type"})
    );

    // A well-formed object without a tag is an unknown type, not malformed.
    send_json(&mut write, json!({"timestamp": 1})).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "error", "message": "unknown message type"})
    );

    send_json(&mut write, json!({"type": "photo_uploaded", "photo_id": "x"})).await;
    assert_eq!(
        next_json(&mut read).await,
        json!({"type": "error", "message": "photo_id and s3_url are required"})
    );
}

#[tokio::test]
async fn test_reconnect_supersedes_without_offline_flap() {
    let server = start_test_server().await;
    let (a, b, _pair_id) = paired_users(&server).await;

    let (_b_write, mut b_read) = connect_ws(&server, &b.token).await;
    next_json(&mut b_read).await;

    let (_a1_write, mut a1_read) = connect_ws(&server, &a.token).await;
    next_json(&mut a1_read).await;
    assert_eq!(
        next_json(&mut b_read).await,
        json!({"type": "partner_status", "online": true})
    );

    let (mut a2_write, mut a2_read) = connect_ws(&server, &a.token).await;
    next_json(&mut a2_read).await;
    expect_closed(&mut a1_read).await;

    // The new connection re-announces presence; the old one never announces offline.
    assert_eq!(
        next_json(&mut b_read).await,
        json!({"type": "partner_status", "online": true})
    );
    expect_silence(&mut b_read).await;

    send_json(&mut a2_write, json!({"type": "trigger_photo", "timestamp": 42})).await;
    let expected = json!({"type": "take_photo", "initiator_id": a.id, "timestamp": 42});
    assert_eq!(next_json(&mut a2_read).await, expected);
    assert_eq!(next_json(&mut b_read).await, expected);
}

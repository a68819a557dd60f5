//! Connection lifecycle tests over real loopback sockets
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use comet_gateway::protocol::{Frame, OpCode};
use integration_tests::{
    test_config, token, wait_for, SessionCall, TestGateway, TestWsClient, RECV_TIMEOUT,
};
use std::time::Duration;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_auth_registers_session() {
    let gw = TestGateway::start().await.unwrap();
    let (_client, reply) = gw
        .connect_auth(&token(42, "devkey1", "room7", "pc", &[4, 5]))
        .await
        .unwrap();
    assert!(reply.body.is_empty());

    let channel = gw
        .gateway()
        .bucket("devkey1")
        .channel("devkey1")
        .expect("channel registered");
    assert_eq!(channel.user_id(), 42);
    assert_eq!(channel.platform(), "pc");
    assert_eq!(channel.room_id().as_deref(), Some("room7"));
    assert_eq!(channel.watched_ops(), vec![4, 5]);

    let connects = gw.authority.connects();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].server_id, gw.gateway().server_id());
    assert!(connects[0]
        .server_key
        .starts_with(&format!("{}-", gw.gateway().server_id())));
}

#[tokio::test]
async fn test_frames_before_auth_are_ignored() {
    let gw = TestGateway::start().await.unwrap();
    let mut client = gw.connect().await.unwrap();

    client.send_op(OpCode::Heartbeat, b"").await.unwrap();
    client.send_op(OpCode::SendMsg, b"early").await.unwrap();
    client
        .auth(&token(1, "patient", "", "pc", &[]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_token_closes_connection() {
    let gw = TestGateway::start().await.unwrap();
    let mut client = gw.connect().await.unwrap();

    client.send_op(OpCode::Auth, b"not a token").await.unwrap();
    assert!(client.closed_within(RECV_TIMEOUT).await);
    assert_eq!(gw.gateway().channel_count(), 0);
    assert!(gw.authority.disconnects().is_empty());
}

#[tokio::test]
async fn test_handshake_timeout_closes_connection() {
    let gw = TestGateway::start().await.unwrap();
    let mut client = gw.connect().await.unwrap();

    assert!(client.closed_within(Duration::from_secs(3)).await);
    assert!(gw.authority.connects().is_empty());
    assert!(gw.authority.disconnects().is_empty());
}

#[tokio::test]
async fn test_duplicate_key_is_rejected() {
    let gw = TestGateway::start().await.unwrap();
    let (mut first, _) = gw
        .connect_auth(&token(1, "same", "room1", "pc", &[]))
        .await
        .unwrap();

    let mut second = gw.connect().await.unwrap();
    second
        .send_op(OpCode::Auth, token(2, "same", "room1", "pc", &[]).as_bytes())
        .await
        .unwrap();
    assert!(second.closed_within(RECV_TIMEOUT).await);

    // the original session is untouched
    let channel = gw.gateway().bucket("same").channel("same").unwrap();
    assert_eq!(channel.user_id(), 1);
    let seq = first.send_op(OpCode::Heartbeat, b"").await.unwrap();
    assert_eq!(first.recv().await.unwrap().seq, seq);
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_room_broadcast_respects_watch_set() {
    let gw = TestGateway::start().await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(42, "devkey1", "room7", "pc", &[4, 5]))
        .await
        .unwrap();

    let delivered = gw
        .gateway()
        .broadcast_room("room7", &Frame::new(OpCode::SendMsgReply, "hello"));
    assert_eq!(delivered, 1);

    let frame = client.recv().await.unwrap();
    assert_eq!(frame.op, OpCode::SendMsgReply.as_u32());
    assert_eq!(&frame.body[..], b"hello");

    let mut raw = bytes::BytesMut::new();
    comet_gateway::protocol::FrameCodec::default()
        .encode(&Frame::new(OpCode::SendMsgReply, "inner"), &mut raw);
    assert_eq!(
        gw.gateway()
            .broadcast_room("room7", &Frame::new(OpCode::Raw, raw.freeze())),
        0
    );
    assert!(client
        .recv_timeout(Duration::from_millis(200))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_socket_close_disconnects_exactly_once() {
    let gw = TestGateway::start().await.unwrap();
    let (client, _) = gw
        .connect_auth(&token(42, "devkey1", "room7", "pc", &[4, 5]))
        .await
        .unwrap();
    drop(client);

    let authority = gw.authority.clone();
    assert!(wait_for(RECV_TIMEOUT, || !authority.disconnects().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        gw.authority.disconnects(),
        vec![SessionCall {
            user_id: 42,
            key: "devkey1".to_string(),
            server_id: gw.gateway().server_id().to_string(),
        }]
    );
    assert_eq!(gw.gateway().channel_count(), 0);
    assert!(gw.gateway().room_ids().is_empty());
    assert_eq!(gw.gateway().round().outstanding_buffers(), 0);
    assert_eq!(gw.gateway().round().pending_timers(), 0);
}

#[tokio::test]
async fn test_push_keys_and_register() {
    let gw = TestGateway::start().await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(7, "pushed", "", "ios", &[5]))
        .await
        .unwrap();
    let keys = vec!["pushed".to_string()];

    let frame = Frame::new(1001u32, "biz");
    assert_eq!(gw.gateway().push_keys(&keys, &frame, 1001).unwrap(), 0);

    let seq = client.send_op(OpCode::Register, b"1001,1002").await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (OpCode::RegisterReply.as_u32(), seq));

    assert_eq!(gw.gateway().push_keys(&keys, &frame, 1001).unwrap(), 1);
    let pushed = client.recv().await.unwrap();
    assert_eq!((pushed.op, &pushed.body[..]), (1001, &b"biz"[..]));

    let seq = client.send_op(OpCode::Unregister, b"1001").await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (OpCode::UnregisterReply.as_u32(), seq));
    assert_eq!(gw.gateway().push_keys(&keys, &frame, 1001).unwrap(), 0);
}

#[tokio::test]
async fn test_change_room() {
    let gw = TestGateway::start().await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(3, "mover", "lobby", "pc", &[]))
        .await
        .unwrap();

    let seq = client.send_op(OpCode::ChangeRoom, b"stage").await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (OpCode::ChangeRoomReply.as_u32(), seq));
    assert_eq!(&reply.body[..], b"stage");

    assert_eq!(
        gw.gateway().room_ids().into_iter().collect::<Vec<_>>(),
        vec!["stage".to_string()]
    );
    assert_eq!(
        gw.gateway()
            .broadcast_room("lobby", &Frame::new(OpCode::SendMsgReply, "x")),
        0
    );
}

#[tokio::test]
async fn test_business_op_is_reported() {
    let gw = TestGateway::start().await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(9, "reporter", "", "pc", &[]))
        .await
        .unwrap();

    let seq = client.send_op(2000u32, b"payload").await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (2000, seq));
    assert!(reply.body.is_empty());

    let reports = gw.authority.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!((reports[0].user_id, reports[0].op), (9, 2000));
    assert_eq!(reports[0].body, b"payload");
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_reply_carries_room_occupancy() {
    let gw = TestGateway::start().await.unwrap();
    let (mut alice, _) = gw
        .connect_auth(&token(1, "alice", "room7", "pc", &[]))
        .await
        .unwrap();
    let (_bob, _) = gw
        .connect_auth(&token(2, "bob", "room7", "pc", &[]))
        .await
        .unwrap();

    gw.gateway().renew_online().await.unwrap();

    let seq = alice.send_op(OpCode::Heartbeat, b"").await.unwrap();
    let reply = alice.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (OpCode::HeartbeatReply.as_u32(), seq));
    assert_eq!(&reply.body[..], &2i32.to_be_bytes());
}

#[tokio::test]
async fn test_heartbeats_renew_liveness_with_authority() {
    let mut config = test_config();
    config.heartbeat.min_secs = 1;
    config.heartbeat.max_secs = 2;
    let gw = TestGateway::start_with_config(config).await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(8, "renewing", "room1", "pc", &[]))
        .await
        .unwrap();

    // inside the renewal interval: answered locally only
    client.send_op(OpCode::Heartbeat, b"").await.unwrap();
    client.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gw.authority.heartbeats().is_empty());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    client.send_op(OpCode::Heartbeat, b"").await.unwrap();
    client.recv().await.unwrap();

    let authority = gw.authority.clone();
    assert!(wait_for(RECV_TIMEOUT, || !authority.heartbeats().is_empty()).await);
    assert_eq!(
        gw.authority.heartbeats(),
        vec![SessionCall {
            user_id: 8,
            key: "renewing".to_string(),
            server_id: gw.gateway().server_id().to_string(),
        }]
    );
}

#[tokio::test]
async fn test_missed_heartbeats_expire_session() {
    let mut config = test_config();
    config.protocol.heartbeat_timeout_ms = 300;
    let gw = TestGateway::start_with_config(config).await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(5, "sleepy", "room1", "pc", &[]))
        .await
        .unwrap();

    // heartbeats keep it alive past the expiry
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        client.send_op(OpCode::Heartbeat, b"").await.unwrap();
        client.recv().await.unwrap();
    }
    assert_eq!(gw.gateway().channel_count(), 1);

    assert!(client.closed_within(Duration::from_secs(3)).await);
    let gateway = gw.gateway().clone();
    assert!(wait_for(RECV_TIMEOUT, || gateway.channel_count() == 0).await);
    assert!(gw.gateway().room_ids().is_empty());

    let authority = gw.authority.clone();
    assert!(wait_for(RECV_TIMEOUT, || authority.disconnects().len() == 1).await);
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_websocket_session() {
    let gw = TestGateway::start().await.unwrap();
    let mut ws = TestWsClient::connect(&gw.ws_url()).await.unwrap();

    ws.send(&Frame::new(OpCode::Auth, token(11, "wskey", "room9", "web", &[])).with_seq(1))
        .await
        .unwrap();
    let reply = ws.recv().await.unwrap();
    assert_eq!((reply.op, reply.seq), (OpCode::AuthReply.as_u32(), 1));

    ws.send(&Frame::new(OpCode::Heartbeat, "").with_seq(2))
        .await
        .unwrap();
    let heartbeat = ws.recv().await.unwrap();
    assert_eq!((heartbeat.op, heartbeat.seq), (OpCode::HeartbeatReply.as_u32(), 2));
    assert_eq!(&heartbeat.body[..], &1i32.to_be_bytes());

    assert_eq!(
        gw.gateway()
            .broadcast_room("room9", &Frame::new(OpCode::SendMsgReply, "ws")),
        1
    );
    assert_eq!(&ws.recv().await.unwrap().body[..], b"ws");

    ws.close().await.unwrap();
    let authority = gw.authority.clone();
    assert!(wait_for(RECV_TIMEOUT, || authority.disconnects().len() == 1).await);
    assert_eq!(gw.authority.disconnects()[0].key, "wskey");
}

//! Push RPC tests
//!
//! Run with: cargo test -p integration-tests --test rpc_tests

use base64::{engine::general_purpose::STANDARD, Engine as _};
use comet_gateway::protocol::OpCode;
use integration_tests::{assert_json, assert_status, token, TestGateway};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn frame(op: u32, body: &[u8]) -> Value {
    json!({ "op": op, "body": STANDARD.encode(body) })
}

#[tokio::test]
async fn test_health_check() {
    let gw = TestGateway::start().await.unwrap();
    let response = gw.get("/health").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_push_keys() {
    let gw = TestGateway::start().await.unwrap();
    let (mut client, _) = gw
        .connect_auth(&token(1, "rpc-key", "", "pc", &[]))
        .await
        .unwrap();

    let response = gw
        .post(
            "/push/keys",
            &json!({
                "keys": ["rpc-key", "missing"],
                "op": 5,
                "frame": frame(5, b"over rpc"),
            }),
        )
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["pushed"], 1);

    let pushed = client.recv().await.unwrap();
    assert_eq!(pushed.op, OpCode::SendMsgReply.as_u32());
    assert_eq!(&pushed.body[..], b"over rpc");
}

#[tokio::test]
async fn test_push_keys_without_keys_is_bad_request() {
    let gw = TestGateway::start().await.unwrap();
    let response = gw
        .post(
            "/push/keys",
            &json!({ "keys": [], "op": 5, "frame": frame(5, b"") }),
        )
        .await
        .unwrap();

    let body: Value = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_broadcast_is_accepted_and_delivered() {
    let gw = TestGateway::start().await.unwrap();
    let (mut pc, _) = gw
        .connect_auth(&token(1, "pc-1", "", "pc", &[]))
        .await
        .unwrap();
    let (mut phone, _) = gw
        .connect_auth(&token(2, "ios-1", "", "ios", &[]))
        .await
        .unwrap();

    let response = gw
        .post(
            "/broadcast",
            &json!({ "op": 1001, "platform": "ios", "frame": frame(1001, b"notice") }),
        )
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::ACCEPTED).await.unwrap();
    assert_eq!(body["accepted"], true);

    let received = phone.recv().await.unwrap();
    assert_eq!((received.op, &received.body[..]), (1001, &b"notice"[..]));
    assert!(pc
        .recv_timeout(std::time::Duration::from_millis(200))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_broadcast_room_rooms_and_stats() {
    let gw = TestGateway::start().await.unwrap();
    let (mut member, _) = gw
        .connect_auth(&token(1, "member", "hall", "pc", &[]))
        .await
        .unwrap();
    let (_other, _) = gw
        .connect_auth(&token(2, "other", "annex", "pc", &[]))
        .await
        .unwrap();

    let response = gw
        .post(
            "/broadcast/room",
            &json!({ "room_id": "hall", "frame": frame(5, b"to hall") }),
        )
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["delivered"], 1);
    assert_eq!(&member.recv().await.unwrap().body[..], b"to hall");

    let response = gw.get("/rooms").await.unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["rooms"], json!(["annex", "hall"]));

    let response = gw.get("/stats").await.unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["server_id"], gw.gateway().server_id());
    assert_eq!(body["channels"], 2);
    assert_eq!(body["rooms"], 2);
}

#[tokio::test]
async fn test_broadcast_room_requires_room_id() {
    let gw = TestGateway::start().await.unwrap();
    let response = gw
        .post(
            "/broadcast/room",
            &json!({ "room_id": "", "frame": frame(5, b"") }),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::BAD_REQUEST).await.unwrap();
}

// Integration tests for the live poll server
// These start the full warp stack on an ephemeral port and drive it over HTTP and WebSocket

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use live_poll_server::{api, PollServer};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const TICK: Duration = Duration::from_millis(200);

async fn start_server() -> (SocketAddr, Arc<PollServer>) {
    let poll_server = PollServer::new(TICK);
    let routes = api::routes(poll_server.clone(), "./public");
    let (addr, serve) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serve);
    (addr, poll_server)
}

async fn post(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{}/{}", addr, path))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn create_room(addr: SocketAddr, admin: &str) -> String {
    let (status, body) = post(addr, "create-room", json!({ "adminName": admin })).await;
    assert_eq!(status, 200);
    body["roomCode"].as_str().unwrap().to_string()
}

async fn connect_bound(
    addr: SocketAddr,
    server: &PollServer,
    room_code: &str,
    user: &str,
    is_admin: bool,
) -> WsStream {
    let before = server.connections().bound_count(room_code).await;
    let (mut ws, _) = connect_async(format!("ws://{}/", addr))
        .await
        .expect("Failed to connect");

    let join = json!({ "type": "join", "roomCode": room_code, "user": user, "isAdmin": is_admin });
    ws.send(Message::Text(join.to_string())).await.unwrap();

    for _ in 0..100 {
        if server.connections().bound_count(room_code).await > before {
            return ws;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("join for {} was never applied", user);
}

async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).unwrap(),
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected an event, got {:?}", other),
        }
    }
}

/// Verifies the health endpoint answers
#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _server) = start_server().await;

    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

/// Create, join twice, inspect and end a room over HTTP
#[tokio::test]
async fn test_room_lifecycle_over_http() {
    let (addr, _server) = start_server().await;
    let code = create_room(addr, "Dr. Test").await;
    assert_eq!(code.len(), 6);

    let (status, _) = post(addr, "join-room", json!({ "roomCode": code, "studentName": "alice" })).await;
    assert_eq!(status, 200);

    let (status, body) = post(addr, "join-room", json!({ "roomCode": code, "studentName": "alice" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "Student name already taken");

    let room: Value = reqwest::get(format!("http://{}/room/{}", addr, code))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(room["admin"], "Dr. Test");
    assert_eq!(room["students"].as_object().unwrap().len(), 1);

    let (status, _) = post(addr, "end-room", json!({ "roomCode": code })).await;
    assert_eq!(status, 200);

    let resp = reqwest::get(format!("http://{}/room/{}", addr, code)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

/// Full poll: two students answer inside the window, the countdown closes the question
#[tokio::test]
async fn test_poll_round_trip() {
    let (addr, server) = start_server().await;
    let code = create_room(addr, "instructor").await;
    for student in ["alice", "bob"] {
        let (status, _) = post(addr, "join-room", json!({ "roomCode": code, "studentName": student })).await;
        assert_eq!(status, 200);
    }

    let mut admin = connect_bound(addr, &server, &code, "instructor", true).await;
    let mut alice = connect_bound(addr, &server, &code, "alice", false).await;
    let mut bob = connect_bound(addr, &server, &code, "bob", false).await;

    let poll = json!({
        "type": "poll",
        "roomCode": code,
        "question": { "text": "Pick one", "options": ["A", "B"], "timer": 3 }
    });
    admin.send(Message::Text(poll.to_string())).await.unwrap();

    let opened = next_event(&mut alice).await;
    assert_eq!(opened["type"], "poll");
    assert_eq!(opened["question"]["text"], "Pick one");
    assert_eq!(next_event(&mut bob).await["type"], "poll");

    let answer = json!({ "type": "answer", "roomCode": code, "user": "alice", "answer": "A" });
    alice.send(Message::Text(answer.to_string())).await.unwrap();
    let answer = json!({ "type": "answer", "roomCode": code, "user": "bob", "answer": "B" });
    bob.send(Message::Text(answer.to_string())).await.unwrap();

    let mut events = vec![next_event(&mut admin).await];
    while !(events.last().unwrap()["type"] == "poll" && events.last().unwrap()["question"].is_null()) {
        events.push(next_event(&mut admin).await);
    }

    let ticks: Vec<i64> = events
        .iter()
        .filter(|e| e["type"] == "timer")
        .map(|e| e["timer"].as_i64().unwrap())
        .collect();
    assert_eq!(ticks, vec![2, 1, 0]);

    let room: Value = reqwest::get(format!("http://{}/room/{}", addr, code))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(room["currentQuestion"].is_null());
    assert_eq!(room["questions"][0]["responses"], json!({ "alice": "A", "bob": "B" }));
    assert_eq!(room["students"]["alice"]["answers"]["0"], "A");
    assert_eq!(room["students"]["bob"]["answers"]["0"], "B");
}

/// A student socket closing removes the student; malformed frames keep the socket open
#[tokio::test]
async fn test_disconnect_and_malformed_messages() {
    let (addr, server) = start_server().await;
    let code = create_room(addr, "instructor").await;
    let (status, _) = post(addr, "join-room", json!({ "roomCode": code, "studentName": "alice" })).await;
    assert_eq!(status, 200);

    let mut admin = connect_bound(addr, &server, &code, "instructor", true).await;
    admin.send(Message::Text("{garbage".to_string())).await.unwrap();
    admin.send(Message::Text(r#"{"type":"mystery"}"#.to_string())).await.unwrap();

    let mut alice = connect_bound(addr, &server, &code, "alice", false).await;
    alice.close(None).await.unwrap();

    let update = next_event(&mut admin).await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["room"]["students"], json!({}));

    let (status, _) = post(addr, "end-room", json!({ "roomCode": code })).await;
    assert_eq!(status, 200);
    assert_eq!(next_event(&mut admin).await, json!({ "type": "end" }));
}

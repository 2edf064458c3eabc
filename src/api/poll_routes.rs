use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection};

use super::poll_websocket;
use crate::error::PollError;
use crate::poll::PollServer;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub admin_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRoomRequest {
    #[serde(default)]
    pub room_code: Option<String>,
}

/// Every route the server exposes: the WebSocket at `/`, the room JSON API,
/// health, and static files as the fallback.
pub fn routes(
    poll_server: Arc<PollServer>,
    static_dir: &str,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    poll_websocket_route(poll_server.clone())
        .or(create_room_route(poll_server.clone()))
        .or(join_room_route(poll_server.clone()))
        .or(end_room_route(poll_server.clone()))
        .or(get_room_route(poll_server.clone()))
        .or(health_check(poll_server))
        .or(warp::fs::dir(static_dir.to_string()))
        .recover(handle_rejection)
}

pub fn poll_websocket_route(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .and(warp::ws())
        .and(with_poll_server(poll_server))
        .map(|ws: warp::ws::Ws, poll_server: Arc<PollServer>| {
            ws.on_upgrade(move |websocket| {
                poll_websocket::handle_poll_websocket(websocket, poll_server)
            })
        })
}

pub fn create_room_route(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("create-room")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_poll_server(poll_server))
        .and_then(create_room)
}

pub fn join_room_route(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("join-room")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_poll_server(poll_server))
        .and_then(join_room)
}

pub fn end_room_route(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("end-room")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_poll_server(poll_server))
        .and_then(end_room)
}

pub fn get_room_route(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("room" / String)
        .and(warp::get())
        .and(with_poll_server(poll_server))
        .and_then(get_room)
}

pub fn health_check(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_poll_server(poll_server))
        .and_then(health)
}

async fn health(poll_server: Arc<PollServer>) -> Result<WithStatus<Json>, Infallible> {
    let rooms = poll_server.rooms().room_count().await;
    let connections = poll_server.connections().connection_count().await;

    Ok(ok_json(&serde_json::json!({
        "status": "healthy",
        "service": "Live Poll Server",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": rooms,
        "connections": connections
    })))
}

async fn create_room(
    request: CreateRoomRequest,
    poll_server: Arc<PollServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let admin_name = request.admin_name.unwrap_or_default();

    Ok(match poll_server.create_room(&admin_name).await {
        Ok(room_code) => ok_json(&CreateRoomResponse { room_code }),
        Err(PollError::InvalidInput(_)) => {
            error_reply(StatusCode::BAD_REQUEST, "Admin name required")
        }
        Err(e) => failure(&e),
    })
}

async fn join_room(
    request: JoinRoomRequest,
    poll_server: Arc<PollServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let room_code = request.room_code.unwrap_or_default();
    let student_name = request.student_name.unwrap_or_default();

    Ok(match poll_server.join_room(&room_code, &student_name).await {
        Ok(()) => success(),
        Err(PollError::InvalidInput(_)) => {
            error_reply(StatusCode::BAD_REQUEST, "Room code and name required")
        }
        Err(PollError::RoomNotFound(_)) => error_reply(StatusCode::NOT_FOUND, "Invalid room code"),
        Err(PollError::StudentNameTaken(_)) => {
            error_reply(StatusCode::CONFLICT, "Student name already taken")
        }
        Err(e) => failure(&e),
    })
}

async fn end_room(
    request: EndRoomRequest,
    poll_server: Arc<PollServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let room_code = request.room_code.unwrap_or_default();

    Ok(match poll_server.end_room(&room_code).await {
        Ok(()) => success(),
        Err(PollError::RoomNotFound(_)) => error_reply(StatusCode::NOT_FOUND, "Room not found"),
        Err(e) => failure(&e),
    })
}

async fn get_room(
    room_code: String,
    poll_server: Arc<PollServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let room_code = decode_path_segment(&room_code);

    Ok(match poll_server.get_room(&room_code).await {
        Ok(room) => ok_json(&room),
        Err(PollError::RoomNotFound(_)) => error_reply(StatusCode::NOT_FOUND, "Room not found"),
        Err(e) => failure(&e),
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<WithStatus<Json>, Infallible> {
    if rejection.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "Not found"));
    }
    if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        tracing::debug!(error = %e, "Rejected request body");
        return Ok(error_reply(StatusCode::BAD_REQUEST, "Invalid request body"));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }

    tracing::warn!(?rejection, "Unhandled rejection");
    Ok(error_reply(StatusCode::BAD_REQUEST, "Bad request"))
}

fn ok_json<T: Serialize>(body: &T) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

fn success() -> WithStatus<Json> {
    ok_json(&serde_json::json!({ "success": true }))
}

fn error_reply(status: StatusCode, message: &str) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
}

fn failure(error: &PollError) -> WithStatus<Json> {
    tracing::error!(error = %error, "Request failed");
    error_reply(error.status_code(), &error.to_string())
}

fn decode_path_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

fn with_poll_server(
    poll_server: Arc<PollServer>,
) -> impl Filter<Extract = (Arc<PollServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || poll_server.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};

    fn server() -> Arc<PollServer> {
        PollServer::new(Duration::from_secs(1))
    }

    async fn create(server: &Arc<PollServer>) -> String {
        let filter = routes(server.clone(), "./public");
        let response = warp::test::request()
            .method("POST")
            .path("/create-room")
            .json(&json!({"adminName": "instructor"}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: CreateRoomResponse = serde_json::from_slice(response.body()).unwrap();
        body.room_code
    }

    fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_create_room() {
        let server = server();
        let code = create(&server).await;
        assert!(server.get_room(&code).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_room_requires_admin() {
        let filter = routes(server(), "./public");
        let response = warp::test::request()
            .method("POST")
            .path("/create-room")
            .json(&json!({}))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response)["error"], "Admin name required");
    }

    #[tokio::test]
    async fn test_join_room_flow() {
        let server = server();
        let code = create(&server).await;
        let filter = routes(server.clone(), "./public");

        let response = warp::test::request()
            .method("POST")
            .path("/join-room")
            .json(&json!({"roomCode": code, "studentName": "alice"}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), json!({"success": true}));

        let response = warp::test::request()
            .method("POST")
            .path("/join-room")
            .json(&json!({"roomCode": code, "studentName": "alice"}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body(&response)["error"], "Student name already taken");

        let response = warp::test::request()
            .method("POST")
            .path("/join-room")
            .json(&json!({"roomCode": "NOPE00", "studentName": "bob"}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response)["error"], "Invalid room code");

        let response = warp::test::request()
            .method("POST")
            .path("/join-room")
            .json(&json!({"roomCode": code}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response)["error"], "Room code and name required");
    }

    #[tokio::test]
    async fn test_get_room_snapshot() {
        let server = server();
        let code = create(&server).await;
        server.join_room(&code, "alice").await.unwrap();
        let filter = routes(server.clone(), "./public");

        let response = warp::test::request()
            .method("GET")
            .path(&format!("/room/{}", code))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let room = body(&response);
        assert_eq!(room["code"], code.as_str());
        assert_eq!(room["admin"], "instructor");
        assert_eq!(room["questions"], json!([]));
        assert_eq!(room["currentQuestion"], Value::Null);
        assert!(room["students"]["alice"].is_object());

        let response = warp::test::request()
            .method("GET")
            .path("/room/NOPE00")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response)["error"], "Room not found");
    }

    #[tokio::test]
    async fn test_end_room() {
        let server = server();
        let code = create(&server).await;
        let filter = routes(server.clone(), "./public");

        let response = warp::test::request()
            .method("POST")
            .path("/end-room")
            .json(&json!({"roomCode": code}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(server.get_room(&code).await.is_err());

        let response = warp::test::request()
            .method("POST")
            .path("/end-room")
            .json(&json!({"roomCode": code}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response)["error"], "Room not found");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let filter = routes(server(), "./public");
        let response = warp::test::request()
            .method("POST")
            .path("/create-room")
            .header("content-type", "application/json")
            .body("{oops")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = server();
        create(&server).await;
        let filter = routes(server, "./public");
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let health = body(&response);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["rooms"], 1);
        assert_eq!(health["connections"], 0);
    }

    #[test]
    fn test_decode_path_segment() {
        assert_eq!(decode_path_segment("AB%20C"), "AB C");
        assert_eq!(decode_path_segment("ABC123"), "ABC123");
    }
}

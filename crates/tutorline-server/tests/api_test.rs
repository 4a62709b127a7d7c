//! REST endpoints over a real socket.

mod common;

use common::TestServer;
use reqwest::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tutorline_core::{Draft, MessageStore, Role, RoomStore, UserId};

fn register_body(phone: &str, role: &str) -> Value {
    json!({
        "phone": phone,
        "password": "correct horse",
        "role": role,
        "first_name": "Ada",
        "last_name": "Lovelace",
    })
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let body: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_register_then_duplicate_conflicts() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/v1/register"))
        .json(&register_body("+15550001", "teacher"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["phone"], "+15550001");
    assert_eq!(user["role"], "teacher");
    assert!(user.get("password_hash").is_none());

    let resp = client
        .post(server.url("/api/v1/register"))
        .json(&register_body("+15550001", "student"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn test_register_requires_phone_and_password() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/v1/register"))
        .json(&json!({ "phone": "  ", "password": "", "role": "student" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_sets_cookie_and_logout_expires_it() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/api/v1/register"))
        .json(&register_body("+15550002", "student"))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(server.url("/api/v1/login"))
        .json(&json!({ "phone": "+15550002", "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let identity = server.auth.validate(&token).unwrap();
    assert_eq!(identity.role, Role::Student);

    let resp = client
        .post(server.url("/api/v1/logout"))
        .send()
        .await
        .unwrap();
    let cookie = resp.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_login_failures() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/api/v1/register"))
        .json(&register_body("+15550003", "teacher"))
        .send()
        .await
        .unwrap();

    let unknown = client
        .post(server.url("/api/v1/login"))
        .json(&json!({ "phone": "+19999999", "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let wrong = client
        .post(server.url("/api/v1/login"))
        .json(&json!({ "phone": "+15550003", "password": "battery staple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_chats_require_credentials() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/api/v1/chats")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(server.url("/api/v1/chats"))
        .header(AUTHORIZATION, "Bearer not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_chats_with_cookie() {
    let server = TestServer::start().await;
    let mine = server
        .chat
        .create_named_room("algebra", &[UserId(1), UserId(2)])
        .await
        .unwrap();
    server
        .chat
        .create_named_room("biology", &[UserId(3), UserId(4)])
        .await
        .unwrap();

    let rooms: Vec<Value> = reqwest::Client::new()
        .get(server.url("/api/v1/chats"))
        .header(COOKIE, format!("token={}", server.token(1, Role::Teacher)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], mine.id.0);
    assert_eq!(rooms[0]["name"], "algebra");
}

#[tokio::test]
async fn test_message_history_pages() {
    let server = TestServer::start().await;
    let room = server
        .chat
        .create_named_room("", &[UserId(1), UserId(2)])
        .await
        .unwrap();
    for i in 0..5 {
        server
            .chat
            .save_message(&Draft::new(room.id, UserId(1), format!("m{i}")))
            .await
            .unwrap();
    }

    let client = reqwest::Client::new();
    let bearer = format!("Bearer {}", server.token(2, Role::Student));
    let page = |query: &str| {
        client
            .get(server.url(&format!("/api/v1/chats/{}/messages{query}", room.id.0)))
            .header(AUTHORIZATION, bearer.clone())
            .send()
    };

    let latest: Vec<Value> = page("?limit=2").await.unwrap().json().await.unwrap();
    let contents: Vec<&str> = latest.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, ["m3", "m4"]);

    let earlier: Vec<Value> = page("?limit=2&offset=2").await.unwrap().json().await.unwrap();
    let contents: Vec<&str> = earlier.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, ["m1", "m2"]);

    let all: Vec<Value> = page("").await.unwrap().json().await.unwrap();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn test_history_membership() {
    let server = TestServer::start().await;
    let room = server
        .chat
        .create_named_room("", &[UserId(1), UserId(2)])
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let path = server.url(&format!("/api/v1/chats/{}/messages", room.id.0));

    let outsider = client
        .get(&path)
        .header(AUTHORIZATION, format!("Bearer {}", server.token(3, Role::Student)))
        .send()
        .await
        .unwrap();
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);

    let supervisor = client
        .get(&path)
        .header(AUTHORIZATION, format!("Bearer {}", server.token(9, Role::Supervisor)))
        .send()
        .await
        .unwrap();
    assert_eq!(supervisor.status(), StatusCode::OK);

    let missing = client
        .get(server.url("/api/v1/chats/999/messages"))
        .header(AUTHORIZATION, format!("Bearer {}", server.token(1, Role::Teacher)))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_chat() {
    let server = TestServer::start().await;
    let room = server
        .chat
        .create_named_room("physics", &[UserId(1), UserId(2)])
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let get = |user_id: i64, role: Role, path: String| {
        client
            .get(server.url(&path))
            .header(AUTHORIZATION, format!("Bearer {}", server.token(user_id, role)))
            .send()
    };

    let resp = get(2, Role::Student, format!("/api/v1/chats/{}", room.id.0)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "physics");
    assert_eq!(body["participants"], json!([1, 2]));

    let resp = get(3, Role::Teacher, format!("/api/v1/chats/{}", room.id.0)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = get(1, Role::Teacher, "/api/v1/chats/999".to_string()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conversation_with_user() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let bearer = format!("Bearer {}", server.token(2, Role::Student));

    let none: Value = client
        .get(server.url("/api/v1/chats/with/1"))
        .header(AUTHORIZATION, bearer.clone())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(none.is_null());

    let room = server.chat.create_room(&[UserId(1), UserId(2)]).await.unwrap();
    for i in 0..35 {
        server
            .chat
            .save_message(&Draft::new(room.id, UserId(1), format!("m{i}")))
            .await
            .unwrap();
    }

    let messages: Vec<Value> = client
        .get(server.url("/api/v1/chats/with/1"))
        .header(AUTHORIZATION, bearer.clone())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(messages.len(), 30);
    assert_eq!(messages[0]["content"], "m5");
    assert_eq!(messages[29]["content"], "m34");

    let resp = client
        .get(server.url("/api/v1/chats/with/2"))
        .header(AUTHORIZATION, bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_chat() {
    let server = TestServer::start().await;
    let room = server
        .chat
        .create_named_room("", &[UserId(1), UserId(2)])
        .await
        .unwrap();
    server
        .chat
        .save_message(&Draft::new(room.id, UserId(1), "bye"))
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let path = server.url(&format!("/api/v1/chats/{}", room.id.0));

    let outsider = client
        .delete(&path)
        .header(AUTHORIZATION, format!("Bearer {}", server.token(3, Role::Student)))
        .send()
        .await
        .unwrap();
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);

    let member = client
        .delete(&path)
        .header(AUTHORIZATION, format!("Bearer {}", server.token(1, Role::Teacher)))
        .send()
        .await
        .unwrap();
    assert_eq!(member.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.chat.message_count().await, 0);

    let again = client
        .delete(&path)
        .header(AUTHORIZATION, format!("Bearer {}", server.token(1, Role::Teacher)))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_teachers_and_students() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    for (phone, role) in [("+1", "teacher"), ("+2", "student"), ("+3", "student")] {
        client
            .post(server.url("/api/v1/register"))
            .json(&register_body(phone, role))
            .send()
            .await
            .unwrap();
    }

    let bearer = format!("Bearer {}", server.token(1, Role::Student));
    let list = |path: &'static str| {
        client
            .get(server.url(path))
            .header(AUTHORIZATION, bearer.clone())
            .send()
    };

    let teachers: Vec<Value> = list("/api/v1/users/teachers").await.unwrap().json().await.unwrap();
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0]["phone"], "+1");

    let students: Vec<Value> = list("/api/v1/users/students").await.unwrap().json().await.unwrap();
    let phones: Vec<&str> = students.iter().map(|u| u["phone"].as_str().unwrap()).collect();
    assert_eq!(phones, ["+2", "+3"]);

    let anonymous = client
        .get(server.url("/api/v1/users/teachers"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_chats_for_supervisors_only() {
    let server = TestServer::start().await;
    server.chat.create_room(&[UserId(1), UserId(2)]).await.unwrap();
    let client = reqwest::Client::new();

    let rooms: Vec<Value> = client
        .get(server.url("/api/v1/users/2/chats"))
        .header(AUTHORIZATION, format!("Bearer {}", server.token(9, Role::Supervisor)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rooms.len(), 1);

    let resp = client
        .get(server.url("/api/v1/users/2/chats"))
        .header(AUTHORIZATION, format!("Bearer {}", server.token(1, Role::Teacher)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_send_message_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let send = |user_id: i64, role: Role, body: Value| {
        client
            .post(server.url("/api/v1/messages"))
            .header(AUTHORIZATION, format!("Bearer {}", server.token(user_id, role)))
            .json(&body)
            .send()
    };

    let resp = send(2, Role::Student, json!({ "target_user_id": 1, "content": "hi" }))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["sender_id"], 2);
    assert_eq!(message["content"], "hi");
    assert_eq!(server.chat.message_count().await, 1);

    let room_id = message["room_id"].clone();
    let resp = send(1, Role::Teacher, json!({ "room_id": room_id, "content": "hello" }))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(9, Role::Supervisor, json!({ "room_id": room_id, "content": "x" }))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(3, Role::Teacher, json!({ "room_id": room_id, "content": "x" }))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(1, Role::Teacher, json!({ "room_id": room_id, "content": "  " }))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.chat.message_count().await, 2);
}

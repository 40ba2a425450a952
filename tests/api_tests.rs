//! HTTP API tests driven through the router without binding a socket.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{ScriptedLlm, TestDb};
use serde_json::{json, Value};
use std::sync::Arc;
use tasklens::api::{create_router, AppState};
use tasklens::llm::LlmProvider;
use tasklens::query::HistoryPolicy;
use tasklens::queue::JobQueue;
use tower::ServiceExt;

fn router(db: &TestDb, llm: Arc<dyn LlmProvider>) -> Router {
    let state = AppState::new(JobQueue::new(db.pool.clone()), llm, HistoryPolicy::default());
    create_router(state)
}

fn no_llm() -> Arc<dyn LlmProvider> {
    ScriptedLlm::new(vec![])
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(&app, "GET", "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_task_routes_require_known_user() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(&app, "GET", "/api/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, "GET", "/api/tasks", Some(9999), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_task_starts_processing() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Buy milk", "priority": "HIGH" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["title"], "Buy milk");
    assert_eq!(body["data"]["priority"], "HIGH");
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["ai_status"], "PROCESSING");

    let id = body["data"]["id"].as_i64().unwrap();
    let (status, body) = send(&app, "GET", &format!("/api/tasks/{}", id), Some(db.user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ai_status"], "PROCESSING");
    assert_eq!(body["data"]["threads"], json!([]));
}

#[tokio::test]
async fn test_blank_title_is_bad_request() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_missing_or_mistyped_title_is_bad_request() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    for body in [json!({}), json!({ "description": "no title" }), json!({ "title": 42 })] {
        let (status, body) = send(&app, "POST", "/api/tasks", Some(db.user_id), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    let (_, body) = send(&app, "GET", "/api/tasks", Some(db.user_id), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_missing_question_is_bad_request() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Ask me" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/tasks/{}/query", id);

    for body in [json!({}), json!({ "question": null })] {
        let (status, body) = send(&app, "POST", &uri, Some(db.user_id), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    let threads: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ai_threads WHERE task_id = ? AND type != 'AUTO_SUGGESTION'",
    )
    .bind(id)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(threads, 0);
}

#[tokio::test]
async fn test_other_users_task_is_not_found() {
    let db = TestDb::new().await;
    let intruder = db.add_user("intruder@example.com").await;
    let app = router(&db, no_llm());

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Private" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", &format!("/api/tasks/{}", id), Some(intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TASK_NOT_FOUND");

    let (status, _) = send(&app, "DELETE", &format!("/api/tasks/{}", id), Some(intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/api/tasks", Some(intruder), None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_list_filters_and_rejects_unknown_status() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    for (title, priority) in [("low one", "LOW"), ("high one", "HIGH")] {
        send(
            &app,
            "POST",
            "/api/tasks",
            Some(db.user_id),
            Some(json!({ "title": title, "priority": priority })),
        )
        .await;
    }

    let (status, body) = send(&app, "GET", "/api/tasks?priority=high", Some(db.user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "high one");

    let (status, _) = send(&app, "GET", "/api/tasks?status=someday", Some(db.user_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_ignores_ai_status() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Draft", "description": "notes" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/tasks/{}", id),
        Some(db.user_id),
        Some(json!({ "status": "COMPLETED", "description": null, "ai_status": "COMPLETED" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["description"], Value::Null);
    assert_eq!(body["data"]["ai_status"], "PROCESSING");
}

#[tokio::test]
async fn test_query_returns_answer_thread() {
    let db = TestDb::new().await;
    let llm = ScriptedLlm::new(vec![Ok("Today afternoon")]);
    let app = router(&db, llm);

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Buy milk" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/tasks/{}/query", id),
        Some(db.user_id),
        Some(json!({ "question": "When should I go?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["type"], "AI_ANSWER");
    assert_eq!(body["data"]["content"], "Today afternoon");

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/tasks/{}/threads", id),
        Some(db.user_id),
        None,
    )
    .await;
    let types: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["USER_QUESTION", "AI_ANSWER"]);
}

#[tokio::test]
async fn test_query_provider_failure_is_bad_gateway() {
    let db = TestDb::new().await;
    let app = router(&db, ScriptedLlm::new(vec![Err("timeout")]));

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Buy milk" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/tasks/{}/query", id),
        Some(db.user_id),
        Some(json!({ "question": "When?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_ERROR");

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/tasks/{}", id),
        Some(db.user_id),
        None,
    )
    .await;
    assert_eq!(body["data"]["threads"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["threads"][0]["type"], "USER_QUESTION");
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (_, body) = send(
        &app,
        "POST",
        "/api/tasks",
        Some(db.user_id),
        Some(json!({ "title": "Temporary" })),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, "DELETE", &format!("/api/tasks/{}", id), Some(db.user_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, "GET", &format!("/api/tasks/{}", id), Some(db.user_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(&app, "GET", "/api/nope", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_user() {
    let db = TestDb::new().await;
    let app = router(&db, no_llm());

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "email": "new@example.com", "name": "New" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], "new@example.com");

    let (status, _) = send(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "email": "new@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

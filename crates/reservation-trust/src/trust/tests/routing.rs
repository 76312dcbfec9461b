use super::common::*;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::trust::audit::{AuditTrail, MemoryAuditSink};
use crate::trust::policy::TrustPolicy;
use crate::trust::router::{trust_router, TrustApi};
use crate::trust::service::TrustService;
use crate::trust::store::{MemoryStore, StoreError};

fn router_with(token: Option<&str>) -> Router {
    let (service, _, _) = build_service();
    trust_router(TrustApi::new(Arc::new(service), token.map(str::to_string)))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request
        .headers_mut()
        .insert("x-admin-id", "admin-7".parse().unwrap());
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    request
}

async fn declare(router: &Router, reservation: &str) -> String {
    let body = serde_json::to_value(declaration(reservation, CONSUMER)).unwrap();
    let response = router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/disputes", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    payload["id"].as_str().expect("dispute id").to_string()
}

#[tokio::test]
async fn declared_dispute_is_visible_with_user_facing_reason() {
    let router = router_with(None);
    let dispute_id = declare(&router, "r-1").await;

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/disputes/{dispute_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["dispute_status"], "open");
    assert_eq!(payload["reason"], "awaiting_your_response");
    assert_eq!(payload["message"], "awaiting your response");

    let response = router
        .oneshot(
            Request::get(format!("/api/v1/reliability/{CONSUMER}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = read_json_body(response).await;
    assert_eq!(payload["score"], 85);
    assert_eq!(payload["level"], "good");
    assert_eq!(payload["stars"], 4);
}

#[tokio::test]
async fn duplicate_declaration_conflicts() {
    let router = router_with(None);
    let dispute_id = declare(&router, "r-1").await;

    let body = serde_json::to_value(declaration("r-1", CONSUMER)).unwrap();
    let response = router
        .oneshot(json_request(Method::POST, "/api/v1/disputes", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["reservation_id"], "r-1");
    assert_eq!(payload["dispute"]["id"], dispute_id.as_str());
    assert_eq!(payload["dispute"]["dispute_status"], "open");
    assert_eq!(payload["dispute"]["consumer_id"], CONSUMER);
}

#[tokio::test]
async fn repeated_scoring_event_returns_the_recorded_one() {
    let router = router_with(None);
    let body = json!({
        "consumer_id": CONSUMER,
        "reservation_id": "r-7",
        "kind": "no_show",
    });

    let first = router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/reliability/events", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let repeat = router
        .oneshot(json_request(Method::POST, "/api/v1/reliability/events", body))
        .await
        .unwrap();
    assert_eq!(repeat.status(), StatusCode::CONFLICT);
    let payload = read_json_body(repeat).await;
    assert_eq!(payload["reservation_id"], "r-7");
    assert_eq!(payload["kind"], "no_show");
    assert_eq!(payload["event"]["delta"], -15);
    assert_eq!(payload["event"]["consumer_id"], CONSUMER);
    assert_eq!(payload["profile"]["score"], 85);
    assert_eq!(payload["profile"]["no_show_count"], 1);
}

#[tokio::test]
async fn admin_routes_require_identity_and_token() {
    let router = router_with(Some("s3cret"));
    let dispute_id = declare(&router, "r-1").await;
    let uri = format!("/api/v1/admin/disputes/{dispute_id}/arbitrate");
    let body = json!({ "decision": "favor_pro" });

    let anonymous = router
        .clone()
        .oneshot(json_request(Method::POST, &uri, body.clone()))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let mut wrong_token = admin_request(Method::POST, &uri, body.clone());
    wrong_token
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer guess".parse().unwrap());
    let response = router.clone().oneshot(wrong_token).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut authorized = admin_request(Method::POST, &uri, body);
    authorized
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let response = router.oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["decision"], "favor_pro");
    assert_eq!(payload["replayed"], false);
}

#[tokio::test]
async fn repeated_arbitration_succeeds_with_replayed_flag() {
    let router = router_with(None);
    let dispute_id = declare(&router, "r-1").await;
    let uri = format!("/api/v1/admin/disputes/{dispute_id}/arbitrate");

    let first = router
        .clone()
        .oneshot(admin_request(
            Method::POST,
            &uri,
            json!({ "decision": "favor_client", "notes": "walk-in logged" }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = read_json_body(first).await;

    let second = router
        .oneshot(admin_request(
            Method::POST,
            &uri,
            json!({ "decision": "favor_client" }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = read_json_body(second).await;
    assert_eq!(second["replayed"], true);
    assert_eq!(second["sanction_applied"], first["sanction_applied"]);
    assert_eq!(second["resolved_at"], first["resolved_at"]);
}

#[tokio::test]
async fn unknown_decision_is_unprocessable() {
    let router = router_with(None);
    let dispute_id = declare(&router, "r-1").await;

    let response = router
        .oneshot(admin_request(
            Method::POST,
            &format!("/api/v1/admin/disputes/{dispute_id}/arbitrate"),
            json!({ "decision": "split_the_difference" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn lifting_a_lifted_sanction_conflicts_with_committed_state() {
    let router = router_with(None);
    let response = router
        .clone()
        .oneshot(admin_request(
            Method::POST,
            &format!("/api/v1/admin/establishments/{ESTABLISHMENT}/sanctions"),
            json!({ "type": "deactivation_7d", "reason": "false no-shows" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let sanction = read_json_body(response).await;
    assert_eq!(sanction["type"], "deactivation_7d");
    let lift_uri = format!(
        "/api/v1/admin/sanctions/{}/lift",
        sanction["id"].as_str().expect("sanction id")
    );

    let response = router
        .clone()
        .oneshot(admin_request(
            Method::POST,
            &lift_uri,
            json!({ "reason": "appeal accepted" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(admin_request(
            Method::POST,
            &lift_uri,
            json!({ "reason": "again" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["sanction"]["lift_reason"], "appeal accepted");
    assert_eq!(payload["sanction"]["lifted_by"], "admin-7");

    let response = router
        .oneshot(
            Request::get(format!("/api/v1/establishments/{ESTABLISHMENT}/visibility"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = read_json_body(response).await;
    assert_eq!(payload["listed"], true);
}

#[tokio::test]
async fn suspended_consumer_cannot_book() {
    let router = router_with(None);
    for reservation in ["r-1", "r-2", "r-3"] {
        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/reliability/events",
                json!({
                    "consumer_id": CONSUMER,
                    "reservation_id": reservation,
                    "kind": "no_show",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/reliability/{CONSUMER}/can-book"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = read_json_body(response).await;
    assert_eq!(payload["allowed"], false);
    assert_eq!(payload["reason"], "temporarily_suspended");
    assert_eq!(payload["message"], "temporarily suspended");

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/reliability/events",
            json!({
                "consumer_id": CONSUMER,
                "reservation_id": "r-3",
                "kind": "no_show",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_consumer_profile_is_not_found() {
    let router = router_with(None);
    let response = router
        .oneshot(
            Request::get("/api/v1/reliability/c-nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn storage_outage_maps_to_service_unavailable() {
    let audit = Arc::new(AuditTrail::new(Arc::new(MemoryAuditSink::new()), 10));
    let service = TrustService::new(Arc::new(FailingStore::offline()), audit, TrustPolicy::default());
    let router = trust_router(TrustApi::new(Arc::new(service), None));

    let response = router
        .oneshot(
            Request::get(format!("/api/v1/reliability/{CONSUMER}/can-book"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = read_json_body(response).await;
    let message = payload["error"].as_str().expect("error message");
    assert!(!message.contains("database offline"));
}

#[tokio::test]
async fn permanent_store_failures_are_not_reported_as_retryable() {
    let cases = [
        (
            StoreError::Conflict("sanctions.active_deactivation".to_string()),
            StatusCode::CONFLICT,
        ),
        (
            StoreError::Corrupt("bad sanction type".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (StoreError::NotFound, StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (failure, expected) in cases {
        let audit = Arc::new(AuditTrail::new(Arc::new(MemoryAuditSink::new()), 10));
        let store = Arc::new(FailingStore(failure.clone()));
        let service = TrustService::new(store, audit, TrustPolicy::default());
        let router = trust_router(TrustApi::new(Arc::new(service), None));

        let response = router
            .oneshot(admin_request(
                Method::POST,
                &format!("/api/v1/admin/establishments/{ESTABLISHMENT}/sanctions"),
                json!({ "type": "deactivation_7d", "reason": "manual review" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "{failure:?}");
        let payload = read_json_body(response).await;
        assert!(!payload["error"].as_str().expect("error message").contains("retry"));
    }
}

#[tokio::test]
async fn maintenance_sweep_reports_counts() {
    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(AuditTrail::new(Arc::new(MemoryAuditSink::new()), 10));
    let service = TrustService::new(store, audit, TrustPolicy::default());
    let router = trust_router(TrustApi::new(Arc::new(service), None));

    let response = router
        .oneshot(admin_request(Method::POST, "/api/v1/maintenance/sweep", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["escalated_disputes"], 0);
    assert_eq!(payload["audit_backlog"], 0);
}

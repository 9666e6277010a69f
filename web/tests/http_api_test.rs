//! End-to-end tests of the HTTP surface over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use rifa_core::environment::RaffleEnvironment;
use rifa_core::error::StoreError;
use rifa_core::events::DomainEvent;
use rifa_core::orchestrator::PurchaseLimits;
use rifa_core::reconciler::FallbackPolicy;
use rifa_core::types::Raffle;
use rifa_testing::{RaffleBuilder, TestHarness, init_test_tracing};
use rifa_web::{AppState, BroadcastEventPublisher, REQUEST_ID_HEADER, build_router};
use serde_json::{Value, json};
use std::sync::Arc;

fn server_for(h: &TestHarness) -> TestServer {
    init_test_tracing();
    let state = AppState::new(&h.env(), PurchaseLimits::default(), FallbackPolicy::MostRecent);
    TestServer::new(build_router(state, std::time::Duration::from_secs(5)))
        .expect("Failed to start test server")
}

fn buy(raffle: &Raffle, numbers: &[u32]) -> Value {
    json!({
        "slug": raffle.slug,
        "name": "Maria Silva",
        "phone": "(11) 99999-8888",
        "numbers": numbers,
    })
}

async fn purchase_id(server: &TestServer, raffle: &Raffle, numbers: &[u32]) -> String {
    let response = server.post("/purchase").json(&buy(raffle, numbers)).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["purchase"]["id"]
        .as_str()
        .expect("purchase id")
        .to_string()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let h = TestHarness::new();
    let server = server_for(&h);

    let health = server.get("/health").await;
    health.assert_status_ok();
    assert_eq!(health.text(), "ok");

    server.get("/ready").await.assert_status_ok();

    h.store
        .fail_with(Some(StoreError::Database("connection refused".into())));
    server
        .get("/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let h = TestHarness::new();
    server_for(&h)
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_purchase_by_slug_returns_receipt() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(
        RaffleBuilder::new()
            .slug("moto-0km")
            .unit_price_cents(500)
            .pix("contato@rifa.com.br", "Rifa da Moto", "Sao Paulo")
            .build(),
    );
    let server = server_for(&h);

    let response = server.post("/purchase").json(&buy(&raffle, &[7, 13])).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["purchase"]["status"], "pending");
    assert_eq!(body["purchase"]["numbers"], json!([7, 13]));
    assert_eq!(body["purchase"]["total"], 1000);
    assert_eq!(body["customer"]["phone"], "11999998888");
    assert!(body["pix_code"].as_str().unwrap().starts_with("000201"));
}

#[tokio::test]
async fn test_taken_numbers_answer_conflict_with_list() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let server = server_for(&h);
    purchase_id(&server, &raffle, &[2, 3]).await;

    let response = server
        .post("/purchase")
        .json(&json!({
            "raffleId": raffle.id,
            "name": "Joao",
            "phone": "21988887777",
            "numbers": [1, 2, 3],
        }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "NUMBERS_UNAVAILABLE");
    assert_eq!(body["numbers"], json!([2, 3]));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_without_side_effects() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().total_tickets(10).build());
    let server = server_for(&h);

    for body in [
        buy(&raffle, &[]),
        buy(&raffle, &[11]),
        json!({ "name": "Maria", "phone": "11999998888", "numbers": [1] }),
        json!({ "slug": raffle.slug, "name": "Maria", "numbers": [1] }),
    ] {
        let response = server.post("/purchase").json(&body).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
    }
    assert!(h.store.stored_holds(raffle.id).is_empty());

    server
        .post("/purchase")
        .json(&json!({ "slug": "nope", "name": "Maria", "phone": "11999998888", "numbers": [1] }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_raffle_page_sweeps_expired_holds() {
    let h = TestHarness::new();
    let raffle = h
        .store
        .insert_raffle(RaffleBuilder::new().total_tickets(10).ttl_seconds(60).build());
    let server = server_for(&h);
    purchase_id(&server, &raffle, &[4, 5]).await;

    let page: Value = server.get(&format!("/raffle/{}", raffle.slug)).await.json();
    assert_eq!(page["available"], 8);
    assert_eq!(page["holds"].as_array().unwrap().len(), 2);

    h.advance(Duration::seconds(61));
    let page: Value = server.get(&format!("/raffle/{}", raffle.slug)).await.json();
    assert_eq!(page["available"], 10);
    assert!(h.store.stored_holds(raffle.id).is_empty());

    server
        .get("/raffle/does-not-exist")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_confirms_purchase_and_redelivery_is_duplicate() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let server = server_for(&h);
    let id = purchase_id(&server, &raffle, &[9]).await;
    let payload = json!({
        "data": { "id": "mp-991" },
        "status": "approved",
        "external_reference": format!("purchase:{id}"),
    });

    let first: Value = server
        .post("/webhooks/mercadopago")
        .json(&payload)
        .await
        .json();
    assert_eq!(first["action"], "confirm_purchase");
    assert_eq!(first["applied"], true);

    let second: Value = server
        .post("/webhooks/mercadopago")
        .json(&payload)
        .await
        .json();
    assert_eq!(second["duplicate"], true);
    assert_eq!(h.store.receipt_count(), 1);
}

#[tokio::test]
async fn test_webhook_edge_cases() {
    let h = TestHarness::new();
    let server = server_for(&h);

    let ignored = server
        .post("/webhooks/asaas")
        .json(&json!({ "event": "PAYMENT_RECEIVED" }))
        .await;
    ignored.assert_status_ok();
    assert_eq!(ignored.json::<Value>()["action"], "ignored");

    server
        .post("/webhooks/paypal")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server
        .post("/webhooks/openpix")
        .text("charge=paid")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_organizer_scoped_webhook_activates_their_raffle() {
    let h = TestHarness::new();
    let mine = h.store.insert_raffle(
        RaffleBuilder::new()
            .status(rifa_core::types::RaffleStatus::PendingActivation)
            .build(),
    );
    h.store.insert_raffle(
        RaffleBuilder::new()
            .status(rifa_core::types::RaffleStatus::PendingActivation)
            .created_at(mine.created_at + Duration::minutes(5))
            .build(),
    );
    let server = server_for(&h);

    let outcome: Value = server
        .post(&format!("/webhooks/asaas?organizer={}", mine.organizer_id))
        .json(&json!({ "event": "PAYMENT_CONFIRMED", "payment": { "id": "pay_7" } }))
        .await
        .json();
    assert_eq!(outcome["action"], "activate_raffle");
    assert_eq!(outcome["via_fallback"], true);
    assert_eq!(outcome["target_id"], json!(mine.id));
}

#[tokio::test]
async fn test_manual_confirm_then_cancel() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let server = server_for(&h);
    let id = purchase_id(&server, &raffle, &[1, 2]).await;

    let confirmed: Value = server
        .post(&format!("/purchases/{id}/confirm"))
        .await
        .json();
    assert_eq!(confirmed["action"], "confirm_purchase");
    assert_eq!(confirmed["applied"], true);

    let cancelled: Value = server.post(&format!("/purchases/{id}/cancel")).await.json();
    assert_eq!(cancelled["applied"], true);
    assert_eq!(cancelled["released"], 2);
    assert_eq!(cancelled["purchase"]["status"], "cancelled");

    let again: Value = server.post(&format!("/purchases/{id}/cancel")).await.json();
    assert_eq!(again["applied"], false);

    let late_payment: Value = server
        .post(&format!("/purchases/{id}/confirm"))
        .await
        .json();
    assert_eq!(late_payment["action"], "ignored");
    assert_eq!(late_payment["applied"], false);

    server
        .post(&format!("/purchases/{}/confirm", uuid::Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_timeout_answers_408() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let server = server_for(&h);
    h.store.fail_with(Some(StoreError::Timeout));

    let response = server.post("/purchase").json(&buy(&raffle, &[1])).await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);
    assert_eq!(response.json::<Value>()["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_request_id_is_generated_or_propagated() {
    let h = TestHarness::new();
    let server = server_for(&h);

    let generated = server.get("/health").await;
    let id = generated.header(REQUEST_ID_HEADER);
    assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());

    let echoed = server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static(REQUEST_ID_HEADER),
            axum::http::HeaderValue::from_static("req-42"),
        )
        .await;
    assert_eq!(echoed.header(REQUEST_ID_HEADER), "req-42");
}

#[tokio::test]
async fn test_domain_events_reach_broadcast_subscribers() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let publisher = BroadcastEventPublisher::default();
    let mut events = publisher.subscribe();
    let env = RaffleEnvironment::new(
        Arc::new(h.store.clone()),
        Arc::new(h.clock.clone()),
        Arc::new(publisher),
    );
    let state = AppState::new(&env, PurchaseLimits::default(), FallbackPolicy::Disabled);
    let server = TestServer::new(build_router(state, std::time::Duration::from_secs(5))).unwrap();

    let id = purchase_id(&server, &raffle, &[5]).await;
    match events.recv().await.unwrap() {
        DomainEvent::ReservationCreated { purchase_id, .. } => {
            assert_eq!(purchase_id.to_string(), id);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

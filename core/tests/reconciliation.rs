//! Webhook reconciliation: providers, idempotency, late payments and the
//! identity-less fallback.

#![allow(clippy::unwrap_used)]

use chrono::Duration;
use rifa_core::environment::Clock;
use rifa_core::error::RaffleError;
use rifa_core::events::DomainEvent;
use rifa_core::reconciler::{FallbackPolicy, PaymentStatus, ReconcileAction, WebhookScope};
use rifa_core::store::RaffleStore;
use rifa_core::types::{
    CancelReason, HoldStatus, OrganizerId, PurchaseId, PurchaseStatus, Raffle, RaffleId, RaffleStatus,
    TicketNumber,
};
use rifa_testing::{RaffleBuilder, TestHarness, purchase_request, test_clock};
use serde_json::json;

fn mp_payment(reference: &str, status: &str, payment_id: &str) -> serde_json::Value {
    json!({
        "action": "payment.updated",
        "data": { "id": payment_id },
        "status": status,
        "external_reference": reference,
    })
}

#[tokio::test]
async fn approved_payment_confirms_purchase_once() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[1, 2])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::MostRecent);

    let payload = mp_payment(&format!("purchase:{}", receipt.purchase.id), "approved", "pay-1");
    let first = reconciler
        .reconcile("mercadopago", &payload, WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(first.action, ReconcileAction::ConfirmPurchase);
    assert_eq!(first.target_id, Some(*receipt.purchase.id.as_uuid()));
    assert!(first.applied);
    assert!(!first.duplicate);

    let second = reconciler
        .reconcile("mercadopago", &payload, WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(second.action, ReconcileAction::ConfirmPurchase);
    assert!(!second.applied);
    assert!(second.duplicate);

    let purchase = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Confirmed);
    assert_eq!(purchase.paid_at, Some(test_clock().now()));
    assert!(h.store.stored_holds(raffle.id).iter().all(|h| h.status == HoldStatus::Paid));
    assert_eq!(h.store.receipt_count(), 1);
    assert_eq!(
        h.events.names().iter().filter(|n| **n == "purchase.confirmed").count(),
        1
    );
}

#[tokio::test]
async fn redelivery_without_event_id_is_still_a_no_op() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[3])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::MostRecent);

    let payload = json!({
        "payment": { "externalReference": format!("purchase:{}", receipt.purchase.id) },
        "event": "PAYMENT_CONFIRMED",
    });
    let first = reconciler.reconcile("asaas", &payload, WebhookScope::default()).await.unwrap();
    let second = reconciler.reconcile("asaas", &payload, WebhookScope::default()).await.unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert!(!second.duplicate);
    assert_eq!(h.store.receipt_count(), 0);
    let purchase = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Confirmed);
}

#[tokio::test]
async fn pending_then_approved_notifications_are_distinct_events() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[4])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::MostRecent);
    let reference = format!("purchase:{}", receipt.purchase.id);

    let pending = reconciler
        .reconcile("mercadopago", &mp_payment(&reference, "pending", "pay-9"), WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(pending.action, ReconcileAction::Ignored);
    assert_eq!(pending.status, PaymentStatus::Pending);
    assert_eq!(pending.target_id, Some(*receipt.purchase.id.as_uuid()));

    let approved = reconciler
        .reconcile("mercadopago", &mp_payment(&reference, "approved", "pay-9"), WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(approved.action, ReconcileAction::ConfirmPurchase);
    assert!(approved.applied);
}

#[tokio::test]
async fn failed_payment_is_ignored() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[5])).await.unwrap();

    let outcome = h
        .reconciler(FallbackPolicy::MostRecent)
        .reconcile(
            "mercadopago",
            &mp_payment(&format!("purchase:{}", receipt.purchase.id), "rejected", "pay-2"),
            WebhookScope::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::Ignored);
    assert_eq!(outcome.status, PaymentStatus::Failure);

    let purchase = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn late_payment_revives_swept_purchase() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().ttl_seconds(1).build());
    let orchestrator = h.orchestrator();
    let receipt = orchestrator.purchase(purchase_request(&raffle, &[1, 2, 3])).await.unwrap();

    h.advance(Duration::seconds(2));
    assert_eq!(h.sweeper().sweep(raffle.id).await.unwrap(), 3);
    let swept = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(swept.status, PurchaseStatus::Cancelled);
    assert_eq!(swept.cancel_reason, Some(CancelReason::Expired));
    assert!(h.raffles().snapshot(&raffle.slug).await.unwrap().holds.is_empty());

    let outcome = h
        .reconciler(FallbackPolicy::MostRecent)
        .reconcile(
            "mercadopago",
            &mp_payment(&format!("purchase:{}", receipt.purchase.id), "approved", "pay-3"),
            WebhookScope::default(),
        )
        .await
        .unwrap();
    assert!(outcome.applied);
    assert!(outcome.unavailable.is_empty());

    let revived = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(revived.status, PurchaseStatus::PaidDelayed);
    assert_eq!(revived.cancel_reason, None);

    for n in [1, 2, 3] {
        let err = orchestrator.purchase(purchase_request(&raffle, &[n])).await.unwrap_err();
        assert_eq!(err, RaffleError::Conflict { numbers: vec![TicketNumber::new(n)] });
    }
}

#[tokio::test]
async fn late_payment_before_sweep_is_paid_delayed() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().ttl_seconds(60).build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[6])).await.unwrap();

    h.advance(Duration::seconds(61));
    let outcome = h
        .reconciler(FallbackPolicy::MostRecent)
        .confirm_purchase(receipt.purchase.id)
        .await
        .unwrap();
    assert!(outcome.applied);

    let purchase = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::PaidDelayed);
    assert_eq!(h.sweeper().sweep(raffle.id).await.unwrap(), 0);
    assert!(matches!(
        h.events.events().last(),
        Some(DomainEvent::PurchaseConfirmed { status: PurchaseStatus::PaidDelayed, .. })
    ));
}

#[tokio::test]
async fn late_payment_gives_up_numbers_taken_in_the_gap() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().ttl_seconds(1).build());
    let orchestrator = h.orchestrator();
    let late = orchestrator.purchase(purchase_request(&raffle, &[1, 2])).await.unwrap();

    h.advance(Duration::seconds(2));
    let mut other = purchase_request(&raffle, &[2]);
    other.phone = "21977776666".into();
    let other = orchestrator.purchase(other).await.unwrap();

    let outcome = h
        .reconciler(FallbackPolicy::MostRecent)
        .confirm_purchase(late.purchase.id)
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.unavailable, vec![TicketNumber::new(2)]);

    let purchase = h.store.purchase(late.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::PaidDelayed);
    assert_eq!(purchase.numbers, vec![TicketNumber::new(1)]);
    assert_eq!(purchase.forfeited_numbers, vec![TicketNumber::new(2)]);

    let holds = h.store.stored_holds(raffle.id);
    assert_eq!(holds.len(), 2);
    assert_eq!(holds[0].purchase_id, late.purchase.id);
    assert_eq!(holds[0].status, HoldStatus::Paid);
    assert_eq!(holds[1].purchase_id, other.purchase.id);
    assert_eq!(holds[1].status, HoldStatus::Held);

    assert!(matches!(
        h.events.events().last(),
        Some(DomainEvent::PurchaseConfirmed { numbers, .. }) if *numbers == vec![TicketNumber::new(1)]
    ));
}

#[tokio::test]
async fn two_paid_purchases_never_share_a_number() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().ttl_seconds(1).build());
    let orchestrator = h.orchestrator();
    let reconciler = h.reconciler(FallbackPolicy::Disabled);
    let late = orchestrator.purchase(purchase_request(&raffle, &[1, 2])).await.unwrap();

    h.advance(Duration::seconds(2));
    let mut other = purchase_request(&raffle, &[2]);
    other.phone = "21977776666".into();
    let other = orchestrator.purchase(other).await.unwrap();

    reconciler.confirm_purchase(late.purchase.id).await.unwrap();
    let outcome = reconciler.confirm_purchase(other.purchase.id).await.unwrap();
    assert!(outcome.applied);
    assert!(outcome.unavailable.is_empty());

    let late = h.store.purchase(late.purchase.id).await.unwrap().unwrap();
    let other = h.store.purchase(other.purchase.id).await.unwrap().unwrap();
    assert_eq!(late.status, PurchaseStatus::PaidDelayed);
    assert_eq!(other.status, PurchaseStatus::Confirmed);
    assert!(late.numbers.iter().all(|n| !other.numbers.contains(n)));
    assert_eq!(other.numbers, vec![TicketNumber::new(2)]);

    let holds = h.store.stored_holds(raffle.id);
    assert!(holds.iter().all(|hold| hold.status == HoldStatus::Paid));
    for purchase in [&late, &other] {
        let owned: Vec<TicketNumber> = holds
            .iter()
            .filter(|hold| hold.purchase_id == purchase.id)
            .map(|hold| hold.number)
            .collect();
        assert_eq!(owned, purchase.numbers);
    }
}

#[tokio::test]
async fn payment_after_organizer_cancel_is_ignored() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().ttl_seconds(600).build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[4])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::Disabled);
    reconciler.cancel_purchase(receipt.purchase.id).await.unwrap();

    let payload = mp_payment(&format!("purchase:{}", receipt.purchase.id), "approved", "pay-4");
    let outcome = reconciler
        .reconcile("mercadopago", &payload, WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::Ignored);
    assert!(!outcome.applied);

    let purchase = h.store.purchase(receipt.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Cancelled);
    assert_eq!(purchase.cancel_reason, Some(CancelReason::Admin));
    assert!(purchase.paid_at.is_none());
    assert!(h.store.stored_holds(raffle.id).is_empty());
    assert!(!h.events.names().contains(&"purchase.confirmed"));

    // the number stays free for other buyers
    let mut next = purchase_request(&raffle, &[4]);
    next.phone = "21977776666".into();
    h.orchestrator().purchase(next).await.unwrap();
}

#[tokio::test]
async fn activation_by_reference_is_idempotent() {
    let h = TestHarness::new();
    let raffle = h
        .store
        .insert_raffle(RaffleBuilder::new().status(RaffleStatus::PendingActivation).build());
    let reconciler = h.reconciler(FallbackPolicy::Disabled);
    let payload = json!({
        "event": "OPENPIX:CHARGE_COMPLETED",
        "charge": { "correlationID": raffle.id.to_string(), "status": "COMPLETED" },
    });

    let first = reconciler.reconcile("openpix", &payload, WebhookScope::default()).await.unwrap();
    assert_eq!(first.action, ReconcileAction::ActivateRaffle);
    assert!(first.applied);

    let second = reconciler.reconcile("OpenPix", &payload, WebhookScope::default()).await.unwrap();
    assert_eq!(second.action, ReconcileAction::ActivateRaffle);
    assert!(!second.applied);

    assert_eq!(h.store.raffle(raffle.id).await.unwrap().unwrap().status, RaffleStatus::Active);
    assert_eq!(h.events.names(), ["raffle.activated"]);
}

#[tokio::test]
async fn efi_txid_confirms_purchase() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[9])).await.unwrap();

    let payload = json!({
        "pix": [{
            "txid": receipt.purchase.id.as_uuid().simple().to_string(),
            "endToEndId": "E18236120202501011200s0123456789",
            "valor": "10.00",
        }]
    });
    let outcome = h
        .reconciler(FallbackPolicy::Disabled)
        .reconcile("efi", &payload, WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::ConfirmPurchase);
    assert!(outcome.applied);
}

#[tokio::test]
async fn drawn_raffle_is_never_reactivated() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().status(RaffleStatus::Drawn).build());

    let outcome = h
        .reconciler(FallbackPolicy::Disabled)
        .reconcile(
            "mercadopago",
            &mp_payment(&format!("raffle:{}", raffle.id), "approved", "pay-4"),
            WebhookScope::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::Ignored);
    assert_eq!(h.store.raffle(raffle.id).await.unwrap().unwrap().status, RaffleStatus::Drawn);
}

#[tokio::test]
async fn unknown_targets_and_providers() {
    let h = TestHarness::new();
    let reconciler = h.reconciler(FallbackPolicy::Disabled);

    let outcome = reconciler
        .reconcile(
            "mercadopago",
            &mp_payment(&format!("purchase:{}", PurchaseId::new()), "approved", "pay-5"),
            WebhookScope::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::Ignored);
    assert_eq!(outcome.reason.as_deref(), Some("purchase not found"));

    let outcome = reconciler
        .reconcile("mercadopago", &mp_payment("order-77", "approved", "pay-6"), WebhookScope::default())
        .await
        .unwrap();
    assert_eq!(outcome.action, ReconcileAction::Ignored);

    let err = reconciler
        .reconcile("stripe", &json!({}), WebhookScope::default())
        .await
        .unwrap_err();
    assert_eq!(err, RaffleError::UnknownProvider("stripe".into()));

    let err = reconciler.confirm_purchase(PurchaseId::new()).await.unwrap_err();
    assert!(matches!(err, RaffleError::NotFound { resource: "purchase", .. }));
}

mod fallback {
    use super::*;

    struct Scenario {
        h: TestHarness,
        org_a: OrganizerId,
        org_b: OrganizerId,
        a_old: Raffle,
        a_new: Raffle,
        b_only: Raffle,
    }

    async fn status_of(h: &TestHarness, id: RaffleId) -> RaffleStatus {
        h.store.raffle(id).await.unwrap().unwrap().status
    }

    fn scenario() -> Scenario {
        let h = TestHarness::new();
        let t0 = test_clock().now();
        let (org_a, org_b) = (OrganizerId::new(), OrganizerId::new());
        let pending = |org, minutes| {
            RaffleBuilder::new()
                .organizer(org)
                .status(RaffleStatus::PendingActivation)
                .created_at(t0 + Duration::minutes(minutes))
                .build()
        };
        let a_old = h.store.insert_raffle(pending(org_a, 0));
        let a_new = h.store.insert_raffle(pending(org_a, 10));
        let b_only = h.store.insert_raffle(pending(org_b, 20));
        Scenario {
            h,
            org_a,
            org_b,
            a_old,
            a_new,
            b_only,
        }
    }

    fn anonymous_payment() -> serde_json::Value {
        json!({ "id": "evt_1", "event": "PAYMENT_RECEIVED", "payment": { "id": "pay_1" } })
    }

    #[tokio::test]
    async fn most_recent_is_scoped_to_the_organizer() {
        let s = scenario();
        let outcome = s
            .h
            .reconciler(FallbackPolicy::MostRecent)
            .reconcile("asaas", &anonymous_payment(), WebhookScope { organizer: Some(s.org_a) })
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::ActivateRaffle);
        assert!(outcome.via_fallback);
        assert_eq!(outcome.target_id, Some(*s.a_new.id.as_uuid()));
        assert_eq!(status_of(&s.h, s.a_new.id).await, RaffleStatus::Active);
        assert_eq!(status_of(&s.h, s.a_old.id).await, RaffleStatus::PendingActivation);
        assert_eq!(status_of(&s.h, s.b_only.id).await, RaffleStatus::PendingActivation);
    }

    #[tokio::test]
    async fn most_recent_without_scope_is_global() {
        let s = scenario();
        let outcome = s
            .h
            .reconciler(FallbackPolicy::MostRecent)
            .reconcile("asaas", &anonymous_payment(), WebhookScope::default())
            .await
            .unwrap();
        assert_eq!(outcome.target_id, Some(*s.b_only.id.as_uuid()));
    }

    #[tokio::test]
    async fn unique_refuses_to_guess_between_two() {
        let s = scenario();
        let reconciler = s.h.reconciler(FallbackPolicy::Unique);

        let outcome = reconciler
            .reconcile("asaas", &anonymous_payment(), WebhookScope { organizer: Some(s.org_a) })
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Ignored);
        assert_eq!(outcome.reason.as_deref(), Some("no identifier in payload"));

        let payload = json!({ "event": "PAYMENT_RECEIVED", "payment": { "id": "pay_2" } });
        let outcome = reconciler
            .reconcile("asaas", &payload, WebhookScope { organizer: Some(s.org_b) })
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::ActivateRaffle);
        assert_eq!(outcome.target_id, Some(*s.b_only.id.as_uuid()));
    }

    #[tokio::test]
    async fn disabled_policy_and_manual_provider_never_fall_back() {
        let s = scenario();
        let outcome = s
            .h
            .reconciler(FallbackPolicy::Disabled)
            .reconcile("asaas", &anonymous_payment(), WebhookScope::default())
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Ignored);

        let outcome = s
            .h
            .reconciler(FallbackPolicy::MostRecent)
            .reconcile("manual", &json!({ "status": "paid" }), WebhookScope::default())
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Ignored);
        assert!(s.h.events.events().is_empty());
    }

    #[tokio::test]
    async fn pending_status_never_triggers_fallback() {
        let s = scenario();
        let payload = json!({ "event": "PAYMENT_CREATED", "payment": { "id": "pay_3" } });
        let outcome = s
            .h
            .reconciler(FallbackPolicy::MostRecent)
            .reconcile("asaas", &payload, WebhookScope { organizer: Some(s.org_b) })
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Ignored);
        assert_eq!(outcome.status, PaymentStatus::Pending);
    }
}

#[tokio::test]
async fn admin_cancel_releases_paid_numbers() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let orchestrator = h.orchestrator();
    let receipt = orchestrator.purchase(purchase_request(&raffle, &[20, 21])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::Disabled);
    reconciler.confirm_purchase(receipt.purchase.id).await.unwrap();

    let cancellation = reconciler.cancel_purchase(receipt.purchase.id).await.unwrap();
    assert!(cancellation.transition.is_applied());
    assert_eq!(cancellation.released, 2);
    assert_eq!(cancellation.purchase.status, PurchaseStatus::Cancelled);
    assert!(h.store.stored_holds(raffle.id).is_empty());
    assert!(matches!(
        h.events.events().last(),
        Some(DomainEvent::PurchaseCancelled { reason: CancelReason::Admin, .. })
    ));

    let again = reconciler.cancel_purchase(receipt.purchase.id).await.unwrap();
    assert!(!again.transition.is_applied());
    assert_eq!(again.released, 0);

    orchestrator.purchase(purchase_request(&raffle, &[20, 21])).await.unwrap();
}

#[tokio::test]
async fn storage_failure_is_surfaced_and_not_recorded() {
    let h = TestHarness::new();
    let raffle = h.store.insert_raffle(RaffleBuilder::new().build());
    let receipt = h.orchestrator().purchase(purchase_request(&raffle, &[30])).await.unwrap();
    let reconciler = h.reconciler(FallbackPolicy::Disabled);
    let payload = mp_payment(&format!("purchase:{}", receipt.purchase.id), "approved", "pay-7");

    h.store
        .fail_with(Some(rifa_core::error::StoreError::Database("connection reset".into())));
    let err = reconciler
        .reconcile("mercadopago", &payload, WebhookScope::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RaffleError::Storage(_)));

    h.store.fail_with(None);
    assert_eq!(h.store.receipt_count(), 0);
    let outcome = reconciler
        .reconcile("mercadopago", &payload, WebhookScope::default())
        .await
        .unwrap();
    assert!(outcome.applied);
}

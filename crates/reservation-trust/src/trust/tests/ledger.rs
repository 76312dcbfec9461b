use super::common::*;
use chrono::Duration;

use crate::trust::domain::{
    ReliabilityLevel, ReservationId, ReservationStatus, ScoringEventKind, UserFacingReason,
};
use crate::trust::error::TrustError;
use crate::trust::service::{ScoringEventRequest, TrustService};
use crate::trust::store::MemoryStore;

fn no_show(reservation: &str) -> ScoringEventRequest {
    ScoringEventRequest {
        consumer_id: consumer(),
        reservation_id: ReservationId::from(reservation),
        kind: ScoringEventKind::NoShow,
    }
}

#[test]
fn three_consecutive_no_shows_suspend_at_fifty_five() {
    let (service, _, sink) = build_service();

    for reservation in ["r-1", "r-2", "r-3"] {
        service
            .apply_event(&lifecycle(), &no_show(reservation), now())
            .expect("apply no-show");
    }

    let view = service.profile(&consumer()).expect("profile exists");
    assert_eq!(view.profile.score, 55);
    assert_eq!(view.profile.consecutive_no_shows, 3);
    assert!(view.profile.is_suspended);
    assert_eq!(view.profile.suspended_until, Some(now() + Duration::days(30)));
    assert_eq!(
        view.profile.suspension_reason.as_deref(),
        Some("3 consecutive no-shows")
    );
    assert_eq!(view.level, ReliabilityLevel::Fair);
    assert_eq!(view.stars, 3);

    let eligibility = service.can_book(&consumer(), now()).expect("gate");
    assert!(!eligibility.allowed);
    assert_eq!(eligibility.reason, Some(UserFacingReason::TemporarilySuspended));
    assert_eq!(audit_actions(&sink).len(), 3);
}

#[test]
fn duplicate_event_is_rejected_without_side_effects() {
    let (service, _, sink) = build_service();
    service
        .apply_event(&lifecycle(), &no_show("r-1"), now())
        .expect("first no-show");

    match service.apply_event(&lifecycle(), &no_show("r-1"), now()) {
        Err(TrustError::DuplicateEvent {
            reservation_id,
            kind,
            ..
        }) => {
            assert_eq!(reservation_id, ReservationId::from("r-1"));
            assert_eq!(kind, ScoringEventKind::NoShow);
        }
        other => panic!("expected duplicate event, got {other:?}"),
    }

    let view = service.profile(&consumer()).expect("profile");
    assert_eq!(view.profile.score, 85);
    assert_eq!(view.profile.no_show_count, 1);
    assert_eq!(audit_actions(&sink), vec!["scoring_event.applied"]);
}

#[test]
fn reversal_cannot_be_submitted_directly() {
    let (service, _, _) = build_service();
    let request = ScoringEventRequest {
        kind: ScoringEventKind::DisputeReversal,
        ..no_show("r-1")
    };

    assert!(matches!(
        service.apply_event(&lifecycle(), &request, now()),
        Err(TrustError::Validation(_))
    ));
    assert!(matches!(
        service.profile(&consumer()),
        Err(TrustError::NotFound { .. })
    ));
}

#[test]
fn honored_credit_caps_at_one_hundred_and_resets_streak() {
    let (service, _, _) = build_service();
    service
        .apply_event(&lifecycle(), &no_show("r-1"), now())
        .expect("no-show");

    let honored = |reservation: &str| ScoringEventRequest {
        kind: ScoringEventKind::Honored,
        ..no_show(reservation)
    };
    for index in 2..=10 {
        service
            .apply_event(&lifecycle(), &honored(&format!("r-{index}")), now())
            .expect("honored");
    }

    let view = service.profile(&consumer()).expect("profile");
    assert_eq!(view.profile.score, 100);
    assert_eq!(view.profile.consecutive_no_shows, 0);
    assert_eq!(view.profile.consecutive_honored, 9);
    assert_eq!(view.profile.total_reservations, 10);

    let verification = service.verify_ledger(&consumer()).expect("verify");
    assert!(verification.consistent);
    assert_eq!(verification.event_count, 10);
    assert_eq!(verification.replayed_score, 100);
}

#[test]
fn low_score_suspends_even_without_a_no_show_streak() {
    let (service, _, _) = build_service();
    for index in 1..=8 {
        let mut snapshot = missed_reservation(&format!("r-{index}"), CONSUMER, ESTABLISHMENT);
        snapshot.status = ReservationStatus::Cancelled;
        snapshot.cancelled_at = Some(snapshot.starts_at - Duration::minutes(30));
        service
            .record_outcome(&lifecycle(), &snapshot, now())
            .expect("record cancellation");
    }

    let view = service.profile(&consumer()).expect("profile");
    assert_eq!(view.profile.score, 20);
    assert_eq!(view.profile.very_late_cancellation_count, 8);
    assert_eq!(view.profile.consecutive_no_shows, 0);
    assert!(view.profile.is_suspended);
    assert_eq!(
        view.profile.suspension_reason.as_deref(),
        Some("reliability score dropped to 20")
    );
}

#[test]
fn record_outcome_classifies_reservation_snapshots() {
    let (service, _, _) = build_service();

    let mut attended = missed_reservation("r-in", CONSUMER, ESTABLISHMENT);
    attended.checked_in_at = Some(attended.starts_at);
    let view = service
        .record_outcome(&lifecycle(), &attended, now())
        .expect("honored")
        .expect("scored");
    assert_eq!(view.profile.consecutive_honored, 1);

    let mut late = missed_reservation("r-late", CONSUMER, ESTABLISHMENT);
    late.status = ReservationStatus::Cancelled;
    late.cancelled_at = Some(late.starts_at - Duration::hours(5));
    let view = service
        .record_outcome(&lifecycle(), &late, now())
        .expect("late cancellation")
        .expect("scored");
    assert_eq!(view.profile.score, 95);
    assert_eq!(view.profile.late_cancellation_count, 1);

    let mut early = missed_reservation("r-early", CONSUMER, ESTABLISHMENT);
    early.status = ReservationStatus::Cancelled;
    early.cancelled_at = Some(early.starts_at - Duration::days(3));
    assert!(service
        .record_outcome(&lifecycle(), &early, now())
        .expect("early cancellation")
        .is_none());

    let missed = missed_reservation("r-miss", CONSUMER, ESTABLISHMENT);
    let view = service
        .record_outcome(&lifecycle(), &missed, now())
        .expect("no-show")
        .expect("scored");
    assert_eq!(view.profile.score, 80);
    assert_eq!(view.profile.no_show_count, 1);

    let mut upcoming = missed_reservation("r-next", CONSUMER, ESTABLISHMENT);
    upcoming.status = ReservationStatus::Confirmed;
    upcoming.starts_at = now() + Duration::days(1);
    assert!(matches!(
        service.record_outcome(&lifecycle(), &upcoming, now()),
        Err(TrustError::Validation(_))
    ));
}

#[test]
fn lift_keeps_ledger_score_and_is_idempotent() {
    let (service, _, sink) = build_service();
    for reservation in ["r-1", "r-2", "r-3"] {
        service
            .apply_event(&lifecycle(), &no_show(reservation), now())
            .expect("apply no-show");
    }

    let lift = service
        .lift_suspension(&admin(), &consumer(), now())
        .expect("lift suspension");
    assert!(lift.lifted);
    assert_eq!(lift.view.profile.score, 55);
    assert!(!lift.view.profile.is_suspended);
    assert_eq!(lift.view.profile.suspended_until, None);
    assert_eq!(lift.view.stars, 3);

    let again = service
        .lift_suspension(&admin(), &consumer(), now())
        .expect("repeat lift");
    assert!(!again.lifted);
    assert_eq!(again.view.profile, lift.view.profile);

    let lifts = audit_actions(&sink)
        .into_iter()
        .filter(|action| action == "consumer.suspension_lifted")
        .count();
    assert_eq!(lifts, 1);
    assert!(service.can_book(&consumer(), now()).expect("gate").allowed);
}

#[test]
fn lifting_an_unknown_consumer_is_not_found() {
    let (service, _, _) = build_service();
    assert!(matches!(
        service.lift_suspension(&admin(), &consumer(), now()),
        Err(TrustError::NotFound { entity: "consumer", .. })
    ));
}

#[test]
fn suspension_stops_blocking_once_it_lapses() {
    let (service, _, _) = build_service();
    for reservation in ["r-1", "r-2", "r-3"] {
        service
            .apply_event(&lifecycle(), &no_show(reservation), now())
            .expect("apply no-show");
    }

    assert!(!service.can_book(&consumer(), now() + Duration::days(29)).expect("gate").allowed);
    assert!(service.can_book(&consumer(), now() + Duration::days(31)).expect("gate").allowed);
}

fn scored(reservation: &str, kind: ScoringEventKind) -> ScoringEventRequest {
    ScoringEventRequest {
        kind,
        ..no_show(reservation)
    }
}

fn sink_to_twenty(service: &TrustService<MemoryStore>) {
    for index in 1..=8 {
        service
            .apply_event(
                &lifecycle(),
                &scored(&format!("r-{index}"), ScoringEventKind::VeryLateCancellation),
                now(),
            )
            .expect("apply very late cancellation");
    }
}

#[test]
fn honored_visit_after_a_lift_does_not_resuspend() {
    let (service, _, _) = build_service();
    sink_to_twenty(&service);
    service
        .lift_suspension(&admin(), &consumer(), now())
        .expect("lift suspension");

    let view = service
        .apply_event(&lifecycle(), &scored("r-9", ScoringEventKind::Honored), now())
        .expect("apply honored");
    assert_eq!(view.profile.score, 22);
    assert!(!view.profile.is_suspended);
    assert_eq!(view.profile.suspended_until, None);
    assert!(service.can_book(&consumer(), now()).expect("gate").allowed);

    // Another penalty while still under the threshold does suspend again.
    let view = service
        .apply_event(
            &lifecycle(),
            &scored("r-10", ScoringEventKind::LateCancellation),
            now(),
        )
        .expect("apply late cancellation");
    assert_eq!(view.profile.score, 17);
    assert!(view.profile.is_suspended);
}

#[test]
fn lifted_streak_is_not_counted_twice() {
    let (service, _, _) = build_service();
    for reservation in ["r-1", "r-2", "r-3"] {
        service
            .apply_event(&lifecycle(), &no_show(reservation), now())
            .expect("apply no-show");
    }
    service
        .lift_suspension(&admin(), &consumer(), now())
        .expect("lift suspension");

    let view = service
        .apply_event(
            &lifecycle(),
            &scored("r-4", ScoringEventKind::LateCancellation),
            now(),
        )
        .expect("apply late cancellation");
    assert_eq!(view.profile.consecutive_no_shows, 3);
    assert_eq!(view.profile.score, 50);
    assert!(!view.profile.is_suspended);
    assert!(service.can_book(&consumer(), now()).expect("gate").allowed);

    let verification = service.verify_ledger(&consumer()).expect("verify");
    assert!(verification.consistent);
}

#[test]
fn honored_visit_after_a_lapse_clears_the_suspension() {
    let (service, _, _) = build_service();
    sink_to_twenty(&service);
    let later = now() + Duration::days(31);

    let view = service
        .apply_event(&lifecycle(), &scored("r-9", ScoringEventKind::Honored), later)
        .expect("apply honored");
    assert_eq!(view.profile.score, 22);
    assert!(!view.profile.is_suspended);
    assert!(view.profile.suspension_reason.is_none());
    assert!(service.can_book(&consumer(), later).expect("gate").allowed);
}

#[test]
fn unknown_consumer_may_book() {
    let (service, _, _) = build_service();
    let eligibility = service
        .can_book(&crate::trust::domain::ConsumerId::from("c-first-timer"), now())
        .expect("gate");
    assert!(eligibility.allowed);
}

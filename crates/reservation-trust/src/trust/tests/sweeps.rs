use super::common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;

use crate::trust::audit::AuditTrail;
use crate::trust::domain::{Actor, ConsumerId, CurrentSanction, DisputeStatus, SanctionType};
use crate::trust::policy::TrustPolicy;
use crate::trust::sanctions::SanctionRequest;
use crate::trust::service::{DisputeResponse, TrustService};
use crate::trust::store::MemoryStore;
use crate::trust::sweep::SweepReport;

#[test]
fn overdue_disputes_are_escalated_once() {
    let (service, _, sink) = build_service();
    let declared = service
        .declare_no_show(&lifecycle(), &declaration("r-1", CONSUMER), now())
        .expect("declare");

    let early = service
        .run_sweeps(now() + Duration::hours(71))
        .expect("early sweep");
    assert_eq!(early, SweepReport::default());

    let report = service
        .run_sweeps(now() + Duration::hours(72))
        .expect("deadline sweep");
    assert_eq!(report.escalated_disputes, 1);
    let view = service.dispute(&declared.dispute.id).expect("dispute");
    assert_eq!(
        view.dispute.dispute_status,
        DisputeStatus::DisputedPendingArbitration
    );

    let again = service
        .run_sweeps(now() + Duration::hours(80))
        .expect("second sweep");
    assert_eq!(again.escalated_disputes, 0);

    let escalation = sink
        .entries()
        .into_iter()
        .find(|entry| entry.action == "dispute.escalated")
        .expect("escalation audited");
    assert_eq!(escalation.actor_id, "system:sweeper");

    let late_reply = DisputeResponse {
        consumer_id: consumer(),
        response: "I was travelling, here is my boarding pass".to_string(),
        evidence: vec!["boarding-pass.pdf".to_string()],
    };
    let view = service
        .respond_to_dispute(
            &Actor::new(format!("consumer:{CONSUMER}")),
            &declared.dispute.id,
            &late_reply,
            now() + Duration::hours(90),
        )
        .expect("late response still recorded");
    assert!(view.dispute.client_response.is_some());
}

#[test]
fn sweep_ignores_disputes_resolved_before_the_deadline() {
    let (service, _, _) = build_service();
    let declared = service
        .declare_no_show(&lifecycle(), &declaration("r-1", CONSUMER), now())
        .expect("declare");
    service
        .arbitrate(&admin(), &declared.dispute.id, "favor_pro", None, now())
        .expect("arbitrate");

    let report = service
        .run_sweeps(now() + Duration::days(5))
        .expect("sweep");
    assert_eq!(report.escalated_disputes, 0);
    let view = service.dispute(&declared.dispute.id).expect("dispute");
    assert_eq!(view.dispute.dispute_status, DisputeStatus::ResolvedFavorPro);
}

#[test]
fn lapsed_deactivation_clears_the_trust_score_flag() {
    let (service, _, _) = build_service();
    let request = SanctionRequest {
        establishment_id: establishment(),
        sanction_type: SanctionType::Deactivation7d,
        reason: "false no-shows".to_string(),
        related_dispute_id: None,
    };
    service
        .impose_sanction(&admin(), &request, now())
        .expect("impose");

    let report = service
        .run_sweeps(now() + Duration::days(6))
        .expect("sweep before expiry");
    assert_eq!(report.expired_sanctions, 0);

    let expiry = now() + Duration::days(7);
    let report = service.run_sweeps(expiry).expect("sweep at expiry");
    assert_eq!(report.expired_sanctions, 1);

    let score = service.trust_score(&establishment()).expect("trust score");
    assert_eq!(score.current_sanction, CurrentSanction::None);
    assert_eq!(score.deactivated_until, None);
    assert!(service.visibility(&establishment(), expiry).expect("visibility").listed);

    let report = service
        .run_sweeps(expiry + Duration::hours(1))
        .expect("repeat sweep");
    assert_eq!(report.expired_sanctions, 0);
}

#[test]
fn audit_backlog_is_redelivered_by_the_sweep() {
    let sink = Arc::new(SwitchableSink::default());
    sink.down.store(true, Ordering::SeqCst);
    let audit = Arc::new(AuditTrail::new(sink.clone(), 2));
    let service = TrustService::new(Arc::new(MemoryStore::new()), audit, TrustPolicy::default());

    service
        .declare_no_show(&lifecycle(), &declaration("r-1", CONSUMER), now())
        .expect("declare commits despite audit outage");
    service
        .declare_no_show(&lifecycle(), &declaration("r-2", "c-bea"), now())
        .expect("second declaration");
    assert_eq!(service.audit_trail().backlog_len(), 2);
    assert_eq!(
        service
            .profile(&ConsumerId::from("c-bea"))
            .expect("profile")
            .profile
            .score,
        85
    );

    let report = service.run_sweeps(now()).expect("sweep while down");
    assert_eq!(report.audit_redelivered, 0);
    assert_eq!(report.audit_backlog, 2);

    sink.down.store(false, Ordering::SeqCst);
    let report = service.run_sweeps(now()).expect("sweep after recovery");
    assert_eq!(report.audit_redelivered, 2);
    assert_eq!(report.audit_backlog, 0);
    assert_eq!(sink.delivered.entries().len(), 2);
}

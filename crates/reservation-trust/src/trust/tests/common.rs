use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::trust::audit::{AuditError, AuditSink, AuditTrail, MemoryAuditSink};
use crate::trust::domain::{
    Actor, AuditEntry, ConsumerId, DisputeId, DisputeStatus, EstablishmentId,
    EstablishmentSanction, NoShowDispute, ProTrustScore, ReliabilityProfile, ReservationId,
    ReservationSnapshot, ReservationStatus, SanctionId, ScoringEvent, ScoringEventKind,
};
use crate::trust::policy::TrustPolicy;
use crate::trust::service::{NoShowDeclaration, TrustService};
use crate::trust::store::{MemoryStore, StoreError, TrustStore, TrustTransaction};

pub(super) const ESTABLISHMENT: &str = "est-bistro";
pub(super) const CONSUMER: &str = "c-ada";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-7").with_source_ip(Some("10.1.2.3".to_string()))
}

pub(super) fn lifecycle() -> Actor {
    Actor::system("reservation-lifecycle")
}

pub(super) fn consumer() -> ConsumerId {
    ConsumerId::from(CONSUMER)
}

pub(super) fn establishment() -> EstablishmentId {
    EstablishmentId::from(ESTABLISHMENT)
}

/// A finished reservation the consumer never checked in to.
pub(super) fn missed_reservation(
    reservation: &str,
    consumer: &str,
    establishment: &str,
) -> ReservationSnapshot {
    ReservationSnapshot {
        reservation_id: ReservationId::from(reservation),
        consumer_id: ConsumerId::from(consumer),
        establishment_id: EstablishmentId::from(establishment),
        starts_at: now() - Duration::hours(3),
        status: ReservationStatus::Completed,
        checked_in_at: None,
        cancelled_at: None,
    }
}

pub(super) fn declaration(reservation: &str, consumer: &str) -> NoShowDeclaration {
    NoShowDeclaration {
        establishment_id: establishment(),
        reservation: missed_reservation(reservation, consumer, ESTABLISHMENT),
        evidence: vec!["floor-log-2025-06-01.pdf".to_string()],
    }
}

pub(super) fn build_service() -> (
    TrustService<MemoryStore>,
    Arc<MemoryStore>,
    Arc<MemoryAuditSink>,
) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = Arc::new(AuditTrail::new(sink.clone(), 10));
    let service = TrustService::new(store.clone(), audit, TrustPolicy::default());
    (service, store, sink)
}

/// Declares a no-show and has the consumer contest it, returning the dispute id.
pub(super) fn contested_dispute<S: TrustStore + 'static>(
    service: &TrustService<S>,
    reservation: &str,
    consumer: &str,
    at: DateTime<Utc>,
) -> DisputeId {
    let declared = service
        .declare_no_show(&lifecycle(), &declaration(reservation, consumer), at)
        .expect("declare no-show");
    let response = crate::trust::service::DisputeResponse {
        consumer_id: ConsumerId::from(consumer),
        response: "I was seated at the bar".to_string(),
        evidence: vec!["receipt-4411.jpg".to_string()],
    };
    service
        .respond_to_dispute(
            &Actor::new(format!("consumer:{consumer}")),
            &declared.dispute.id,
            &response,
            at,
        )
        .expect("respond to dispute");
    declared.dispute.id
}

pub(super) fn audit_actions(sink: &MemoryAuditSink) -> Vec<String> {
    sink.entries().into_iter().map(|entry| entry.action).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Sink that can be switched off to simulate an unreachable compliance store.
#[derive(Default)]
pub(super) struct SwitchableSink {
    pub(super) down: AtomicBool,
    pub(super) delivered: MemoryAuditSink,
}

impl AuditSink for SwitchableSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("compliance sink offline".to_string()));
        }
        self.delivered.record(entry)
    }
}

/// Store whose every transaction fails with the same error.
pub(super) struct FailingStore(pub(super) StoreError);

impl FailingStore {
    pub(super) fn offline() -> Self {
        Self(StoreError::Unavailable("database offline".to_string()))
    }
}

impl TrustStore for FailingStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TrustTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(E::from(self.0.clone()))
    }
}

/// Memory store that fails the reversal insert while `fail_reversals` is set,
/// standing in for a storage fault in the middle of arbitration.
#[derive(Default)]
pub(super) struct FaultyStore {
    pub(super) inner: MemoryStore,
    pub(super) fail_reversals: AtomicBool,
}

impl TrustStore for FaultyStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TrustTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let fail_reversals = self.fail_reversals.load(Ordering::SeqCst);
        self.inner.transaction(|tx| {
            let mut faulty = FaultyTransaction {
                inner: tx,
                fail_reversals,
            };
            work(&mut faulty)
        })
    }
}

struct FaultyTransaction<'a> {
    inner: &'a mut dyn TrustTransaction,
    fail_reversals: bool,
}

impl TrustTransaction for FaultyTransaction<'_> {
    fn profile(&self, consumer: &ConsumerId) -> Result<Option<ReliabilityProfile>, StoreError> {
        self.inner.profile(consumer)
    }

    fn save_profile(&mut self, profile: &ReliabilityProfile) -> Result<(), StoreError> {
        self.inner.save_profile(profile)
    }

    fn append_scoring_event(&mut self, event: &ScoringEvent) -> Result<(), StoreError> {
        if self.fail_reversals && event.kind == ScoringEventKind::DisputeReversal {
            return Err(StoreError::Unavailable("disk I/O error".to_string()));
        }
        self.inner.append_scoring_event(event)
    }

    fn scoring_events(&self, consumer: &ConsumerId) -> Result<Vec<ScoringEvent>, StoreError> {
        self.inner.scoring_events(consumer)
    }

    fn scoring_event(
        &self,
        reservation: &ReservationId,
        kind: ScoringEventKind,
    ) -> Result<Option<ScoringEvent>, StoreError> {
        self.inner.scoring_event(reservation, kind)
    }

    fn dispute(&self, id: &DisputeId) -> Result<Option<NoShowDispute>, StoreError> {
        self.inner.dispute(id)
    }

    fn disputes_for_reservation(
        &self,
        reservation: &ReservationId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.inner.disputes_for_reservation(reservation)
    }

    fn disputes_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.inner.disputes_for_establishment(establishment)
    }

    fn disputes_with_status(
        &self,
        status: DisputeStatus,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.inner.disputes_with_status(status)
    }

    fn insert_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        self.inner.insert_dispute(dispute)
    }

    fn update_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        self.inner.update_dispute(dispute)
    }

    fn sanction(&self, id: &SanctionId) -> Result<Option<EstablishmentSanction>, StoreError> {
        self.inner.sanction(id)
    }

    fn sanctions_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<EstablishmentSanction>, StoreError> {
        self.inner.sanctions_for_establishment(establishment)
    }

    fn insert_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        self.inner.insert_sanction(sanction)
    }

    fn update_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        self.inner.update_sanction(sanction)
    }

    fn trust_score(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Option<ProTrustScore>, StoreError> {
        self.inner.trust_score(establishment)
    }

    fn save_trust_score(&mut self, score: &ProTrustScore) -> Result<(), StoreError> {
        self.inner.save_trust_score(score)
    }

    fn lapsed_sanction_scores(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProTrustScore>, StoreError> {
        self.inner.lapsed_sanction_scores(now)
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::arbitration::{ArbitrationCoordinator, ArbitrationOutcome};
use super::audit::AuditTrail;
use super::disputes::{DisputeView, DisputeWorkflow};
use super::domain::{
    Actor, ArbitrationDecision, AuditEntry, ConsumerId, DisputeId, EstablishmentId,
    EstablishmentSanction, ProTrustScore, ReservationId, ReservationSnapshot,
    ReservationStatus, SanctionId, ScoringEventKind,
};
use super::error::TrustError;
use super::gate::{BookingEligibility, SuspensionGate};
use super::ledger::{LedgerVerification, ProfileView, ScoreLedger, SuspensionLift};
use super::policy::TrustPolicy;
use super::sanctions::{EstablishmentVisibility, SanctionRegistry, SanctionRequest};
use super::store::TrustStore;

/// Outcome reported by a collaborator for one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringEventRequest {
    pub consumer_id: ConsumerId,
    pub reservation_id: ReservationId,
    pub kind: ScoringEventKind,
}

/// Establishment's no-show declaration together with the reservation facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoShowDeclaration {
    pub establishment_id: EstablishmentId,
    pub reservation: ReservationSnapshot,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResponse {
    pub consumer_id: ConsumerId,
    pub response: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProEvidence {
    pub establishment_id: EstablishmentId,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentActivity {
    pub total_reservations: u32,
    pub cancelled_by_establishment: u32,
}

/// Entry point composing the ledgers, the dispute workflow, and audit delivery.
/// Every operation runs inside one store transaction; audit entries go out after
/// the transaction commits.
pub struct TrustService<S> {
    pub(super) store: Arc<S>,
    pub(super) audit: Arc<AuditTrail>,
    pub(super) policy: TrustPolicy,
}

impl<S> TrustService<S>
where
    S: TrustStore + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<AuditTrail>, policy: TrustPolicy) -> Self {
        Self {
            store,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// Records a reservation outcome reported by the reservation lifecycle.
    /// Reversals are issued only by arbitration.
    pub fn apply_event(
        &self,
        actor: &Actor,
        request: &ScoringEventRequest,
        now: DateTime<Utc>,
    ) -> Result<ProfileView, TrustError> {
        if request.kind == ScoringEventKind::DisputeReversal {
            return Err(TrustError::Validation(
                "dispute_reversal events are issued by arbitration only".to_string(),
            ));
        }
        self.apply_kind(
            actor,
            &request.consumer_id,
            &request.reservation_id,
            request.kind,
            now,
        )
    }

    /// Derives the scoring event from the reservation snapshot and applies it.
    /// Returns `None` when the outcome carries no score change.
    pub fn record_outcome(
        &self,
        actor: &Actor,
        snapshot: &ReservationSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<ProfileView>, TrustError> {
        match self.outcome_kind(snapshot, now)? {
            Some(kind) => self
                .apply_kind(
                    actor,
                    &snapshot.consumer_id,
                    &snapshot.reservation_id,
                    kind,
                    now,
                )
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn profile(&self, consumer: &ConsumerId) -> Result<ProfileView, TrustError> {
        let profile = self.store.transaction(|tx| {
            tx.profile(consumer)?
                .ok_or_else(|| TrustError::not_found("consumer", consumer))
        })?;
        Ok(profile.into())
    }

    pub fn lift_suspension(
        &self,
        actor: &Actor,
        consumer: &ConsumerId,
        now: DateTime<Utc>,
    ) -> Result<SuspensionLift, TrustError> {
        let ledger = ScoreLedger::new(&self.policy.scoring);
        let (profile, lifted) = self
            .store
            .transaction(|tx| ledger.lift_suspension(tx, consumer))?;

        if lifted {
            info!(consumer_id = %consumer, admin_id = %actor.id, score = profile.score, "suspension lifted");
            self.record(
                actor,
                "consumer.suspension_lifted",
                "consumer",
                consumer.as_str(),
                json!({ "score": profile.score, "level": profile.level().label() }),
                now,
            );
        }

        Ok(SuspensionLift {
            view: profile.into(),
            lifted,
        })
    }

    pub fn can_book(
        &self,
        consumer: &ConsumerId,
        now: DateTime<Utc>,
    ) -> Result<BookingEligibility, TrustError> {
        let profile = self.store.transaction(|tx| tx.profile(consumer))?;
        Ok(SuspensionGate::evaluate(consumer, profile.as_ref(), now))
    }

    pub fn verify_ledger(&self, consumer: &ConsumerId) -> Result<LedgerVerification, TrustError> {
        let ledger = ScoreLedger::new(&self.policy.scoring);
        self.store.transaction(|tx| ledger.verify(tx, consumer))
    }

    /// Opens a dispute and applies the consumer's no-show penalty in the same
    /// transaction. A no-show already recorded for the reservation is kept as is.
    pub fn declare_no_show(
        &self,
        actor: &Actor,
        declaration: &NoShowDeclaration,
        now: DateTime<Utc>,
    ) -> Result<DisputeView, TrustError> {
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let ledger = ScoreLedger::new(&self.policy.scoring);
        let snapshot = &declaration.reservation;

        let (dispute, penalized) = self.store.transaction(|tx| {
            let dispute = workflow.declare(
                tx,
                snapshot,
                &declaration.establishment_id,
                declaration.evidence.clone(),
                now,
            )?;
            let penalized = match ledger.apply(
                tx,
                &snapshot.consumer_id,
                &snapshot.reservation_id,
                ScoringEventKind::NoShow,
                now,
            ) {
                Ok(_) => true,
                Err(TrustError::DuplicateEvent { .. }) => false,
                Err(err) => return Err(err),
            };
            Ok::<_, TrustError>((dispute, penalized))
        })?;

        info!(
            dispute_id = %dispute.id,
            reservation_id = %dispute.reservation_id,
            establishment_id = %dispute.establishment_id,
            penalized,
            "no-show declared"
        );
        self.record(
            actor,
            "dispute.declared",
            "dispute",
            dispute.id.as_str(),
            json!({
                "reservation_id": dispute.reservation_id,
                "consumer_id": dispute.consumer_id,
                "establishment_id": dispute.establishment_id,
                "no_show_penalty_applied": penalized,
            }),
            now,
        );
        Ok(workflow.view(dispute))
    }

    pub fn respond_to_dispute(
        &self,
        actor: &Actor,
        dispute_id: &DisputeId,
        response: &DisputeResponse,
        now: DateTime<Utc>,
    ) -> Result<DisputeView, TrustError> {
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let dispute = self.store.transaction(|tx| {
            workflow.respond(
                tx,
                dispute_id,
                &response.consumer_id,
                &response.response,
                response.evidence.clone(),
                now,
            )
        });

        let dispute = match dispute {
            Ok(dispute) => dispute,
            Err(TrustError::AlreadyResponded(existing)) => {
                warn!(dispute_id = %dispute_id, "repeated dispute response ignored");
                return Err(TrustError::AlreadyResponded(existing));
            }
            Err(err) => return Err(err),
        };

        info!(dispute_id = %dispute.id, "consumer responded to dispute");
        self.record(
            actor,
            "dispute.responded",
            "dispute",
            dispute.id.as_str(),
            json!({ "evidence_count": dispute.evidence_client.len() }),
            now,
        );
        Ok(workflow.view(dispute))
    }

    pub fn attach_pro_evidence(
        &self,
        actor: &Actor,
        dispute_id: &DisputeId,
        request: &ProEvidence,
        now: DateTime<Utc>,
    ) -> Result<DisputeView, TrustError> {
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let dispute = self.store.transaction(|tx| {
            workflow.attach_pro_evidence(
                tx,
                dispute_id,
                &request.establishment_id,
                request.evidence.clone(),
            )
        })?;

        self.record(
            actor,
            "dispute.evidence_added",
            "dispute",
            dispute.id.as_str(),
            json!({ "evidence_pro": dispute.evidence_pro }),
            now,
        );
        Ok(workflow.view(dispute))
    }

    pub fn dispute(&self, dispute_id: &DisputeId) -> Result<DisputeView, TrustError> {
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let dispute = self.store.transaction(|tx| {
            tx.dispute(dispute_id)?
                .ok_or_else(|| TrustError::not_found("dispute", dispute_id))
        })?;
        Ok(workflow.view(dispute))
    }

    /// Undecided disputes for the admin queue, oldest first.
    pub fn arbitration_queue(&self) -> Result<Vec<DisputeView>, TrustError> {
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let queue = self.store.transaction(|tx| workflow.queue(tx))?;
        Ok(queue
            .into_iter()
            .map(|dispute| workflow.view(dispute))
            .collect())
    }

    /// Resolves a dispute. A dispute that is already resolved yields
    /// `TrustError::Conflict` carrying the committed outcome, and nothing changes.
    pub fn arbitrate(
        &self,
        actor: &Actor,
        dispute_id: &DisputeId,
        decision: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ArbitrationOutcome, TrustError> {
        let decision = ArbitrationDecision::parse(decision)
            .ok_or_else(|| TrustError::InvalidDecision(decision.to_string()))?;
        let coordinator = ArbitrationCoordinator::new(&self.policy);

        let resolution = self.store.transaction(|tx| {
            coordinator.resolve(tx, dispute_id, &actor.id, decision, notes, now)
        });
        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(TrustError::Conflict { prior }) => {
                warn!(
                    dispute_id = %dispute_id,
                    decision = prior.decision.label(),
                    "arbitration replay returned committed outcome"
                );
                return Err(TrustError::Conflict { prior });
            }
            Err(err) => return Err(err),
        };

        let outcome = resolution.outcome;
        info!(
            dispute_id = %outcome.dispute_id,
            decision = outcome.decision.label(),
            sanction_applied = outcome.sanction_applied,
            suspension_released = resolution.suspension_released,
            "dispute arbitrated"
        );
        self.record(
            actor,
            "dispute.arbitrated",
            "dispute",
            outcome.dispute_id.as_str(),
            json!({
                "decision": outcome.decision.label(),
                "sanction_applied": outcome.sanction_applied,
                "sanction_id": outcome.sanction_id,
                "notes": resolution.dispute.resolution_notes,
                "reversal_applied": resolution.reversal_applied,
                "suspension_released": resolution.suspension_released,
            }),
            now,
        );
        Ok(outcome)
    }

    pub fn impose_sanction(
        &self,
        actor: &Actor,
        request: &SanctionRequest,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentSanction, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        let sanction = self
            .store
            .transaction(|tx| registry.impose(tx, request, &actor.id, now))?;

        info!(
            sanction_id = %sanction.id,
            establishment_id = %sanction.establishment_id,
            sanction_type = sanction.sanction_type.label(),
            "sanction imposed"
        );
        self.record(
            actor,
            "sanction.imposed",
            "establishment_sanction",
            sanction.id.as_str(),
            json!({
                "establishment_id": sanction.establishment_id,
                "type": sanction.sanction_type.label(),
                "reason": sanction.reason,
                "related_dispute_id": sanction.related_dispute_id,
                "deactivation_end": sanction.deactivation_end,
            }),
            now,
        );
        Ok(sanction)
    }

    pub fn lift_sanction(
        &self,
        actor: &Actor,
        sanction_id: &SanctionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentSanction, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        let sanction = self
            .store
            .transaction(|tx| registry.lift(tx, sanction_id, &actor.id, reason, now));

        let sanction = match sanction {
            Ok(sanction) => sanction,
            Err(TrustError::AlreadyLifted { sanction }) => {
                warn!(sanction_id = %sanction_id, "sanction already lifted");
                return Err(TrustError::AlreadyLifted { sanction });
            }
            Err(err) => return Err(err),
        };

        info!(sanction_id = %sanction.id, establishment_id = %sanction.establishment_id, "sanction lifted");
        self.record(
            actor,
            "sanction.lifted",
            "establishment_sanction",
            sanction.id.as_str(),
            json!({
                "establishment_id": sanction.establishment_id,
                "reason": sanction.lift_reason,
            }),
            now,
        );
        Ok(sanction)
    }

    /// Lifts the active deactivation, if any. Returns `None` when nothing was active.
    pub fn reactivate_establishment(
        &self,
        actor: &Actor,
        establishment: &EstablishmentId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EstablishmentSanction>, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        let lifted = self
            .store
            .transaction(|tx| registry.reactivate(tx, establishment, &actor.id, reason, now))?;

        if let Some(sanction) = &lifted {
            info!(establishment_id = %establishment, sanction_id = %sanction.id, "establishment reactivated");
            self.record(
                actor,
                "establishment.reactivated",
                "establishment",
                establishment.as_str(),
                json!({ "sanction_id": sanction.id, "reason": sanction.lift_reason }),
                now,
            );
        }
        Ok(lifted)
    }

    pub fn sanctions(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<EstablishmentSanction>, TrustError> {
        Ok(self
            .store
            .transaction(|tx| tx.sanctions_for_establishment(establishment))?)
    }

    pub fn active_sanctions(
        &self,
        establishment: &EstablishmentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EstablishmentSanction>, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        let active = self
            .store
            .transaction(|tx| registry.active(tx, establishment, now))?;
        Ok(active.into_iter().collect())
    }

    pub fn trust_score(&self, establishment: &EstablishmentId) -> Result<ProTrustScore, TrustError> {
        self.store.transaction(|tx| {
            tx.trust_score(establishment)?
                .ok_or_else(|| TrustError::not_found("establishment", establishment))
        })
    }

    pub fn visibility(
        &self,
        establishment: &EstablishmentId,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentVisibility, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        self.store
            .transaction(|tx| registry.visibility(tx, establishment, now))
    }

    pub fn record_establishment_activity(
        &self,
        actor: &Actor,
        establishment: &EstablishmentId,
        activity: &EstablishmentActivity,
        now: DateTime<Utc>,
    ) -> Result<ProTrustScore, TrustError> {
        let registry = SanctionRegistry::new(&self.policy.sanctions);
        let score = self.store.transaction(|tx| {
            registry.record_activity(
                tx,
                establishment,
                activity.total_reservations,
                activity.cancelled_by_establishment,
                now,
            )
        })?;

        self.record(
            actor,
            "establishment.activity_recorded",
            "establishment",
            establishment.as_str(),
            json!({
                "total_reservations": activity.total_reservations,
                "cancelled_by_establishment": activity.cancelled_by_establishment,
                "trust_score": score.trust_score,
            }),
            now,
        );
        Ok(score)
    }

    fn apply_kind(
        &self,
        actor: &Actor,
        consumer: &ConsumerId,
        reservation: &ReservationId,
        kind: ScoringEventKind,
        now: DateTime<Utc>,
    ) -> Result<ProfileView, TrustError> {
        let ledger = ScoreLedger::new(&self.policy.scoring);
        let profile = self
            .store
            .transaction(|tx| ledger.apply(tx, consumer, reservation, kind, now));

        let profile = match profile {
            Ok(profile) => profile,
            Err(err @ TrustError::DuplicateEvent { .. }) => {
                warn!(reservation_id = %reservation, kind = kind.label(), "duplicate scoring event rejected");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        info!(
            consumer_id = %consumer,
            reservation_id = %reservation,
            kind = kind.label(),
            score = profile.score,
            suspended = profile.is_suspended,
            "scoring event applied"
        );
        self.record(
            actor,
            "scoring_event.applied",
            "consumer",
            consumer.as_str(),
            json!({
                "reservation_id": reservation,
                "kind": kind.label(),
                "score": profile.score,
                "is_suspended": profile.is_suspended,
                "suspension_reason": profile.suspension_reason,
            }),
            now,
        );
        Ok(profile.into())
    }

    fn outcome_kind(
        &self,
        snapshot: &ReservationSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<ScoringEventKind>, TrustError> {
        if snapshot.checked_in_at.is_some() {
            return Ok(Some(ScoringEventKind::Honored));
        }

        match snapshot.status {
            ReservationStatus::Cancelled => {
                let cancelled_at = snapshot.cancelled_at.ok_or_else(|| {
                    TrustError::Validation(
                        "cancelled reservation is missing cancelled_at".to_string(),
                    )
                })?;
                Ok(self
                    .policy
                    .scoring
                    .cancellation_kind(snapshot.starts_at, cancelled_at))
            }
            ReservationStatus::Completed if snapshot.starts_at <= now => {
                Ok(Some(ScoringEventKind::NoShow))
            }
            ReservationStatus::Completed | ReservationStatus::Confirmed => Err(
                TrustError::Validation("reservation has no outcome yet".to_string()),
            ),
        }
    }

    pub(super) fn record(
        &self,
        actor: &Actor,
        action: &str,
        target_type: &str,
        target_id: &str,
        details: Value,
        now: DateTime<Utc>,
    ) {
        self.audit.emit(AuditEntry::new(
            actor,
            action,
            target_type,
            target_id,
            details,
            now,
        ));
    }
}

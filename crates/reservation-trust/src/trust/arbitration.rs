//! Arbitration Coordinator: closes disputes and fans the decision out to the
//! consumer ledger and the establishment's sanction record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ArbitrationDecision, DisputeId, DisputeStatus, EstablishmentSanction, NoShowDispute,
    SanctionId, ScoringEventKind,
};
use super::error::TrustError;
use super::ledger::ScoreLedger;
use super::policy::TrustPolicy;
use super::sanctions::SanctionRegistry;
use super::store::{StoreError, TrustTransaction};

/// What arbitration decided. Replaying a resolved dispute yields the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrationOutcome {
    pub dispute_id: DisputeId,
    pub decision: ArbitrationDecision,
    pub dispute_status: DisputeStatus,
    pub sanction_applied: bool,
    pub sanction_id: Option<SanctionId>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Outcome plus the side effects that only the first resolution produces.
#[derive(Debug, Clone)]
pub struct ArbitrationResolution {
    pub outcome: ArbitrationOutcome,
    pub dispute: NoShowDispute,
    pub reversal_applied: bool,
    pub suspension_released: bool,
    pub sanction: Option<EstablishmentSanction>,
}

pub struct ArbitrationCoordinator<'p> {
    policy: &'p TrustPolicy,
}

impl<'p> ArbitrationCoordinator<'p> {
    pub fn new(policy: &'p TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn resolve(
        &self,
        tx: &mut dyn TrustTransaction,
        dispute_id: &DisputeId,
        admin_id: &str,
        decision: ArbitrationDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ArbitrationResolution, TrustError> {
        let mut dispute = tx
            .dispute(dispute_id)?
            .ok_or_else(|| TrustError::not_found("dispute", dispute_id))?;

        if dispute.is_terminal() {
            let prior = prior_outcome(tx, &dispute)?;
            return Err(TrustError::Conflict {
                prior: Box::new(prior),
            });
        }

        dispute.dispute_status = decision.resolved_status();
        dispute.resolution_notes = notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());
        dispute.resolved_by = Some(admin_id.to_string());
        dispute.resolved_at = Some(now);
        tx.update_dispute(&dispute)?;

        let mut reversal_applied = false;
        let mut suspension_released = false;
        let mut sanction = None;
        let registry = SanctionRegistry::new(&self.policy.sanctions);

        if decision == ArbitrationDecision::FavorClient {
            let ledger = ScoreLedger::new(&self.policy.scoring);
            let reservation = &dispute.reservation_id;
            let penalized = tx
                .scoring_event(reservation, ScoringEventKind::NoShow)?
                .is_some();
            let reversed = tx
                .scoring_event(reservation, ScoringEventKind::DisputeReversal)?
                .is_some();
            if penalized && !reversed {
                ledger.apply(
                    tx,
                    &dispute.consumer_id,
                    reservation,
                    ScoringEventKind::DisputeReversal,
                    now,
                )?;
                reversal_applied = true;
            }
            suspension_released = ledger.release_cleared_suspension(tx, &dispute.consumer_id)?;

            registry.refresh(tx, &dispute.establishment_id, now, None)?;
            sanction = registry.evaluate_false_no_shows(
                tx,
                &dispute.establishment_id,
                &dispute.id,
                admin_id,
                now,
            )?;
        } else {
            registry.refresh(tx, &dispute.establishment_id, now, None)?;
        }

        let outcome = ArbitrationOutcome {
            dispute_id: dispute.id.clone(),
            decision,
            dispute_status: dispute.dispute_status,
            sanction_applied: sanction.is_some(),
            sanction_id: sanction.as_ref().map(|sanction| sanction.id.clone()),
            resolved_by: dispute.resolved_by.clone(),
            resolved_at: dispute.resolved_at,
        };

        Ok(ArbitrationResolution {
            outcome,
            dispute,
            reversal_applied,
            suspension_released,
            sanction,
        })
    }
}

/// Reconstructs the committed outcome of an already-resolved dispute.
fn prior_outcome(
    tx: &mut dyn TrustTransaction,
    dispute: &NoShowDispute,
) -> Result<ArbitrationOutcome, TrustError> {
    let decision = dispute.dispute_status.decision().ok_or_else(|| {
        StoreError::Corrupt(format!(
            "dispute {} is terminal without a decision",
            dispute.id
        ))
    })?;
    let sanction = tx
        .sanctions_for_establishment(&dispute.establishment_id)?
        .into_iter()
        .find(|sanction| sanction.related_dispute_id.as_ref() == Some(&dispute.id));

    Ok(ArbitrationOutcome {
        dispute_id: dispute.id.clone(),
        decision,
        dispute_status: dispute.dispute_status,
        sanction_applied: sanction.is_some(),
        sanction_id: sanction.map(|sanction| sanction.id),
        resolved_by: dispute.resolved_by.clone(),
        resolved_at: dispute.resolved_at,
    })
}

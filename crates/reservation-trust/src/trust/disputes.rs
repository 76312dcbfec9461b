//! Dispute Workflow: no-show declarations and the consumer's contest window.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ConsumerId, DeclaredBy, DisputeId, DisputeStatus, EstablishmentId, NoShowDispute,
    ReservationSnapshot, ReservationStatus, UserFacingReason,
};
use super::error::TrustError;
use super::policy::DisputePolicy;
use super::store::{StoreError, TrustTransaction};

pub struct DisputeWorkflow<'p> {
    policy: &'p DisputePolicy,
}

impl<'p> DisputeWorkflow<'p> {
    pub fn new(policy: &'p DisputePolicy) -> Self {
        Self { policy }
    }

    /// Opens a dispute for a reservation the establishment reports as a no-show.
    pub fn declare(
        &self,
        tx: &mut dyn TrustTransaction,
        snapshot: &ReservationSnapshot,
        establishment: &EstablishmentId,
        evidence: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<NoShowDispute, TrustError> {
        if snapshot.establishment_id != *establishment {
            return Err(TrustError::Forbidden);
        }
        if snapshot.status == ReservationStatus::Cancelled || snapshot.cancelled_at.is_some() {
            return Err(TrustError::InvalidReservationState(
                "reservation was cancelled".to_string(),
            ));
        }
        if snapshot.checked_in_at.is_some() {
            return Err(TrustError::InvalidReservationState(
                "consumer checked in".to_string(),
            ));
        }
        if snapshot.starts_at > now {
            return Err(TrustError::InvalidReservationState(
                "reservation has not started yet".to_string(),
            ));
        }

        let existing = tx.disputes_for_reservation(&snapshot.reservation_id)?;
        if let Some(open) = existing.iter().find(|dispute| !dispute.is_terminal()) {
            return Err(TrustError::already_disputed(open.clone()));
        }
        if !existing.is_empty() {
            return Err(TrustError::InvalidReservationState(
                "reservation was already disputed".to_string(),
            ));
        }

        let dispute = NoShowDispute {
            id: DisputeId::generate(),
            reservation_id: snapshot.reservation_id.clone(),
            consumer_id: snapshot.consumer_id.clone(),
            establishment_id: establishment.clone(),
            declared_by: DeclaredBy::Pro,
            declared_at: now,
            client_response: None,
            client_responded_at: None,
            dispute_status: DisputeStatus::Open,
            evidence_client: Vec::new(),
            evidence_pro: clean_evidence(evidence),
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
        };

        match tx.insert_dispute(&dispute) {
            Err(StoreError::Conflict(reason)) => {
                let open = tx
                    .disputes_for_reservation(&snapshot.reservation_id)?
                    .into_iter()
                    .find(|dispute| !dispute.is_terminal());
                return Err(match open {
                    Some(open) => TrustError::already_disputed(open),
                    None => StoreError::Conflict(reason).into(),
                });
            }
            other => other?,
        }
        Ok(dispute)
    }

    /// Records the consumer's contest. Only the first response is kept.
    pub fn respond(
        &self,
        tx: &mut dyn TrustTransaction,
        dispute_id: &DisputeId,
        consumer: &ConsumerId,
        response: &str,
        evidence: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<NoShowDispute, TrustError> {
        let mut dispute = tx
            .dispute(dispute_id)?
            .ok_or_else(|| TrustError::not_found("dispute", dispute_id))?;

        if dispute.consumer_id != *consumer {
            return Err(TrustError::Forbidden);
        }
        if dispute.is_terminal() {
            return Err(TrustError::AlreadyTerminal(dispute.dispute_status));
        }
        if dispute.client_response.is_some() {
            return Err(TrustError::AlreadyResponded(Box::new(dispute)));
        }
        if response.trim().is_empty() {
            return Err(TrustError::Validation(
                "response must not be empty".to_string(),
            ));
        }

        dispute.client_response = Some(response.trim().to_string());
        dispute.client_responded_at = Some(now);
        dispute.evidence_client.extend(clean_evidence(evidence));
        dispute.dispute_status = DisputeStatus::DisputedPendingArbitration;
        tx.update_dispute(&dispute)?;
        Ok(dispute)
    }

    /// Adds establishment evidence while the dispute is still undecided.
    pub fn attach_pro_evidence(
        &self,
        tx: &mut dyn TrustTransaction,
        dispute_id: &DisputeId,
        establishment: &EstablishmentId,
        evidence: Vec<String>,
    ) -> Result<NoShowDispute, TrustError> {
        let mut dispute = tx
            .dispute(dispute_id)?
            .ok_or_else(|| TrustError::not_found("dispute", dispute_id))?;

        if dispute.establishment_id != *establishment {
            return Err(TrustError::Forbidden);
        }
        if dispute.is_terminal() {
            return Err(TrustError::AlreadyTerminal(dispute.dispute_status));
        }

        let evidence = clean_evidence(evidence);
        if evidence.is_empty() {
            return Err(TrustError::Validation(
                "at least one evidence reference is required".to_string(),
            ));
        }
        dispute.evidence_pro.extend(evidence);
        tx.update_dispute(&dispute)?;
        Ok(dispute)
    }

    /// Moves open disputes whose response window has closed into arbitration.
    pub fn escalate_overdue(
        &self,
        tx: &mut dyn TrustTransaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<NoShowDispute>, TrustError> {
        let overdue: Vec<NoShowDispute> = tx
            .disputes_with_status(DisputeStatus::Open)?
            .into_iter()
            .filter(|dispute| self.policy.response_deadline(dispute.declared_at) <= now)
            .collect();

        let mut escalated = Vec::with_capacity(overdue.len());
        for mut dispute in overdue {
            dispute.dispute_status = DisputeStatus::DisputedPendingArbitration;
            tx.update_dispute(&dispute)?;
            escalated.push(dispute);
        }
        Ok(escalated)
    }

    /// Undecided disputes, oldest declaration first.
    pub fn queue(&self, tx: &mut dyn TrustTransaction) -> Result<Vec<NoShowDispute>, TrustError> {
        let mut queue = tx.disputes_with_status(DisputeStatus::DisputedPendingArbitration)?;
        queue.extend(tx.disputes_with_status(DisputeStatus::Open)?);
        queue.sort_by(|left, right| left.declared_at.cmp(&right.declared_at));
        Ok(queue)
    }

    pub fn view(&self, dispute: NoShowDispute) -> DisputeView {
        let reason = dispute.user_facing_reason();
        let response_deadline = self.policy.response_deadline(dispute.declared_at);
        DisputeView {
            dispute,
            response_deadline,
            reason,
            message: reason.message(),
        }
    }
}

/// Dispute shaped for display to either party.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeView {
    #[serde(flatten)]
    pub dispute: NoShowDispute,
    pub response_deadline: DateTime<Utc>,
    pub reason: UserFacingReason,
    pub message: &'static str,
}

fn clean_evidence(evidence: Vec<String>) -> Vec<String> {
    evidence
        .into_iter()
        .map(|reference| reference.trim().to_string())
        .filter(|reference| !reference.is_empty())
        .collect()
}

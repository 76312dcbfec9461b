//! Sanction Registry: establishment deactivations and the materialized trust score.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CurrentSanction, DisputeId, DisputeStatus, EstablishmentId, EstablishmentSanction,
    ProTrustScore, SanctionId, SanctionType,
};
use super::error::TrustError;
use super::policy::SanctionPolicy;
use super::store::TrustTransaction;

pub const SUPERSEDED: &str = "superseded";
pub const EXPIRED: &str = "expired";

/// Staff or coordinator request to impose a sanction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionRequest {
    pub establishment_id: EstablishmentId,
    #[serde(rename = "type")]
    pub sanction_type: SanctionType,
    pub reason: String,
    #[serde(default)]
    pub related_dispute_id: Option<DisputeId>,
}

/// Whether an establishment may appear in search and accept bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstablishmentVisibility {
    pub establishment_id: EstablishmentId,
    pub listed: bool,
    pub current_sanction: CurrentSanction,
    pub deactivated_until: Option<DateTime<Utc>>,
}

pub struct SanctionRegistry<'p> {
    policy: &'p SanctionPolicy,
}

impl<'p> SanctionRegistry<'p> {
    pub fn new(policy: &'p SanctionPolicy) -> Self {
        Self { policy }
    }

    /// Imposes a sanction. Any unlifted deactivation is closed first so at most one
    /// deactivation is ever active per establishment.
    pub fn impose(
        &self,
        tx: &mut dyn TrustTransaction,
        request: &SanctionRequest,
        imposed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentSanction, TrustError> {
        if request.reason.trim().is_empty() {
            return Err(TrustError::Validation(
                "sanction reason must not be empty".to_string(),
            ));
        }

        if let Some(dispute_id) = &request.related_dispute_id {
            let dispute = tx
                .dispute(dispute_id)?
                .ok_or_else(|| TrustError::not_found("dispute", dispute_id))?;
            if dispute.establishment_id != request.establishment_id {
                return Err(TrustError::Validation(format!(
                    "dispute {dispute_id} does not concern establishment {}",
                    request.establishment_id
                )));
            }
        }

        if request.sanction_type.is_deactivation() {
            let unlifted = tx
                .sanctions_for_establishment(&request.establishment_id)?
                .into_iter()
                .filter(|existing| {
                    existing.sanction_type.is_deactivation() && existing.lifted_at.is_none()
                });
            for mut existing in unlifted {
                let closing_reason = if existing.is_active(now) {
                    SUPERSEDED
                } else {
                    EXPIRED
                };
                existing.lifted_by = Some(imposed_by.to_string());
                existing.lifted_at = Some(now);
                existing.lift_reason = Some(closing_reason.to_string());
                tx.update_sanction(&existing)?;
            }
        }

        let sanction = EstablishmentSanction {
            id: SanctionId::generate(),
            establishment_id: request.establishment_id.clone(),
            sanction_type: request.sanction_type,
            reason: request.reason.trim().to_string(),
            related_dispute_id: request.related_dispute_id.clone(),
            imposed_by: imposed_by.to_string(),
            imposed_at: now,
            deactivation_start: now,
            deactivation_end: now + Duration::days(request.sanction_type.duration_days()),
            lifted_by: None,
            lifted_at: None,
            lift_reason: None,
        };
        tx.insert_sanction(&sanction)?;
        self.refresh(tx, &request.establishment_id, now, None)?;
        Ok(sanction)
    }

    pub fn lift(
        &self,
        tx: &mut dyn TrustTransaction,
        sanction_id: &SanctionId,
        lifted_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentSanction, TrustError> {
        let mut sanction = tx
            .sanction(sanction_id)?
            .ok_or_else(|| TrustError::not_found("sanction", sanction_id))?;

        if sanction.lifted_at.is_some() {
            return Err(TrustError::AlreadyLifted {
                sanction: Box::new(sanction),
            });
        }
        if reason.trim().is_empty() {
            return Err(TrustError::Validation(
                "lift reason must not be empty".to_string(),
            ));
        }

        sanction.lifted_by = Some(lifted_by.to_string());
        sanction.lifted_at = Some(now);
        sanction.lift_reason = Some(reason.trim().to_string());
        tx.update_sanction(&sanction)?;
        self.refresh(tx, &sanction.establishment_id, now, None)?;
        Ok(sanction)
    }

    /// Lifts whatever deactivation is currently active, if any.
    pub fn reactivate(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        lifted_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EstablishmentSanction>, TrustError> {
        match self.active(tx, establishment, now)? {
            Some(active) => self.lift(tx, &active.id, lifted_by, reason, now).map(Some),
            None => Ok(None),
        }
    }

    pub fn active(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        now: DateTime<Utc>,
    ) -> Result<Option<EstablishmentSanction>, TrustError> {
        Ok(tx
            .sanctions_for_establishment(establishment)?
            .into_iter()
            .find(|sanction| sanction.is_active(now)))
    }

    pub fn visibility(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        now: DateTime<Utc>,
    ) -> Result<EstablishmentVisibility, TrustError> {
        let active = self.active(tx, establishment, now)?;
        Ok(EstablishmentVisibility {
            establishment_id: establishment.clone(),
            listed: active.is_none(),
            current_sanction: active
                .as_ref()
                .map_or(CurrentSanction::None, |sanction| {
                    sanction.sanction_type.current_sanction()
                }),
            deactivated_until: active.map(|sanction| sanction.deactivation_end),
        })
    }

    /// Imposes a deactivation once favor-client resolutions inside the rolling window
    /// reach the threshold. A repeat offender within the escalation lookback gets the
    /// longer deactivation. Nothing is imposed while a deactivation is still active.
    pub fn evaluate_false_no_shows(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        dispute_id: &DisputeId,
        imposed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<EstablishmentSanction>, TrustError> {
        let window_start = self.policy.window_start(now);
        let recent = tx
            .disputes_for_establishment(establishment)?
            .iter()
            .filter(|dispute| {
                dispute.dispute_status == DisputeStatus::ResolvedFavorClient
                    && dispute.resolved_at.map_or(false, |at| at >= window_start)
            })
            .count() as u32;

        if recent < self.policy.false_no_show_threshold {
            return Ok(None);
        }

        let history = tx.sanctions_for_establishment(establishment)?;
        if history.iter().any(|sanction| sanction.is_active(now)) {
            return Ok(None);
        }

        let escalation_start = self.policy.escalation_start(now);
        let repeat = history.iter().any(|sanction| {
            sanction.sanction_type.is_deactivation() && sanction.imposed_at >= escalation_start
        });
        let sanction_type = if repeat {
            SanctionType::Deactivation30d
        } else {
            SanctionType::Deactivation7d
        };

        let request = SanctionRequest {
            establishment_id: establishment.clone(),
            sanction_type,
            reason: format!(
                "{recent} false no-show declarations within {} days",
                self.policy.false_no_show_window_days
            ),
            related_dispute_id: Some(dispute_id.clone()),
        };
        self.impose(tx, &request, imposed_by, now).map(Some)
    }

    /// Records the establishment's cancellation behavior reported by the reservation
    /// lifecycle and refreshes the trust score with it.
    pub fn record_activity(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        total_reservations: u32,
        cancelled_by_establishment: u32,
        now: DateTime<Utc>,
    ) -> Result<ProTrustScore, TrustError> {
        if cancelled_by_establishment > total_reservations {
            return Err(TrustError::Validation(
                "cancellations cannot exceed total reservations".to_string(),
            ));
        }

        let rate = if total_reservations == 0 {
            0.0
        } else {
            f64::from(cancelled_by_establishment) / f64::from(total_reservations)
        };
        self.refresh(tx, establishment, now, Some(rate))
    }

    /// Re-aggregates the trust score from dispute and sanction history.
    pub fn refresh(
        &self,
        tx: &mut dyn TrustTransaction,
        establishment: &EstablishmentId,
        now: DateTime<Utc>,
        cancellation_rate: Option<f64>,
    ) -> Result<ProTrustScore, TrustError> {
        let disputes = tx.disputes_for_establishment(establishment)?;
        let false_no_show_count = disputes
            .iter()
            .filter(|dispute| dispute.dispute_status == DisputeStatus::ResolvedFavorClient)
            .count() as u32;

        let sanctions = tx.sanctions_for_establishment(establishment)?;
        let deactivations = sanctions
            .iter()
            .filter(|sanction| {
                sanction.sanction_type.is_deactivation()
                    && sanction.lift_reason.as_deref() != Some(SUPERSEDED)
            })
            .count() as u32;
        let active = sanctions.iter().find(|sanction| sanction.is_active(now));

        let previous = tx.trust_score(establishment)?;
        let cancellation_rate = cancellation_rate
            .or_else(|| previous.as_ref().map(|score| score.cancellation_rate))
            .unwrap_or(0.0);

        let score = ProTrustScore {
            establishment_id: establishment.clone(),
            trust_score: self
                .policy
                .trust_score(false_no_show_count, deactivations, cancellation_rate),
            false_no_show_count,
            total_disputes: disputes.len() as u32,
            cancellation_rate,
            sanctions_count: sanctions.len() as u32,
            current_sanction: active.map_or(CurrentSanction::None, |sanction| {
                sanction.sanction_type.current_sanction()
            }),
            deactivated_until: active.map(|sanction| sanction.deactivation_end),
        };
        tx.save_trust_score(&score)?;
        Ok(score)
    }

    /// Refreshes every score still flagged with a deactivation that has run out.
    pub fn expire_lapsed(
        &self,
        tx: &mut dyn TrustTransaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProTrustScore>, TrustError> {
        let lapsed = tx.lapsed_sanction_scores(now)?;
        lapsed
            .iter()
            .map(|score| self.refresh(tx, &score.establishment_id, now, None))
            .collect()
    }
}

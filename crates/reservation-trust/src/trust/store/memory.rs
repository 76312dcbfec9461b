use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{StoreError, TrustStore, TrustTransaction};
use crate::trust::domain::{
    ConsumerId, CurrentSanction, DisputeId, DisputeStatus, EstablishmentId,
    EstablishmentSanction, NoShowDispute, ProTrustScore, ReliabilityProfile, ReservationId,
    SanctionId, ScoringEvent, ScoringEventKind,
};

#[derive(Debug, Clone, Default)]
struct TrustState {
    profiles: HashMap<ConsumerId, ReliabilityProfile>,
    events: Vec<ScoringEvent>,
    disputes: Vec<NoShowDispute>,
    sanctions: Vec<EstablishmentSanction>,
    trust_scores: HashMap<EstablishmentId, ProTrustScore>,
}

/// Process-local store. A transaction works on a copy of the state that only
/// replaces the shared state when the work succeeds.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<TrustState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustStore for MemoryStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TrustTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))?;

        let mut tx = MemoryTransaction {
            state: guard.clone(),
        };
        let output = work(&mut tx)?;
        *guard = tx.state;
        Ok(output)
    }
}

struct MemoryTransaction {
    state: TrustState,
}

impl TrustTransaction for MemoryTransaction {
    fn profile(&self, consumer: &ConsumerId) -> Result<Option<ReliabilityProfile>, StoreError> {
        Ok(self.state.profiles.get(consumer).cloned())
    }

    fn save_profile(&mut self, profile: &ReliabilityProfile) -> Result<(), StoreError> {
        self.state
            .profiles
            .insert(profile.consumer_id.clone(), profile.clone());
        Ok(())
    }

    fn append_scoring_event(&mut self, event: &ScoringEvent) -> Result<(), StoreError> {
        let duplicate = self.state.events.iter().any(|existing| {
            existing.reservation_id == event.reservation_id && existing.kind == event.kind
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "scoring event {} already recorded for reservation {}",
                event.kind.label(),
                event.reservation_id
            )));
        }
        self.state.events.push(event.clone());
        Ok(())
    }

    fn scoring_events(&self, consumer: &ConsumerId) -> Result<Vec<ScoringEvent>, StoreError> {
        Ok(self
            .state
            .events
            .iter()
            .filter(|event| &event.consumer_id == consumer)
            .cloned()
            .collect())
    }

    fn scoring_event(
        &self,
        reservation: &ReservationId,
        kind: ScoringEventKind,
    ) -> Result<Option<ScoringEvent>, StoreError> {
        Ok(self
            .state
            .events
            .iter()
            .find(|event| &event.reservation_id == reservation && event.kind == kind)
            .cloned())
    }

    fn dispute(&self, id: &DisputeId) -> Result<Option<NoShowDispute>, StoreError> {
        Ok(self
            .state
            .disputes
            .iter()
            .find(|dispute| &dispute.id == id)
            .cloned())
    }

    fn disputes_for_reservation(
        &self,
        reservation: &ReservationId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        Ok(self
            .state
            .disputes
            .iter()
            .filter(|dispute| &dispute.reservation_id == reservation)
            .cloned()
            .collect())
    }

    fn disputes_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        Ok(self
            .state
            .disputes
            .iter()
            .filter(|dispute| &dispute.establishment_id == establishment)
            .cloned()
            .collect())
    }

    fn disputes_with_status(
        &self,
        status: DisputeStatus,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        let mut disputes: Vec<NoShowDispute> = self
            .state
            .disputes
            .iter()
            .filter(|dispute| dispute.dispute_status == status)
            .cloned()
            .collect();
        disputes.sort_by_key(|dispute| dispute.declared_at);
        Ok(disputes)
    }

    fn insert_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        let open_exists = self.state.disputes.iter().any(|existing| {
            existing.reservation_id == dispute.reservation_id && !existing.is_terminal()
        });
        if open_exists && !dispute.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "reservation {} already has an open dispute",
                dispute.reservation_id
            )));
        }
        if self.state.disputes.iter().any(|existing| existing.id == dispute.id) {
            return Err(StoreError::Conflict(format!("dispute {} exists", dispute.id)));
        }
        self.state.disputes.push(dispute.clone());
        Ok(())
    }

    fn update_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        let slot = self
            .state
            .disputes
            .iter_mut()
            .find(|existing| existing.id == dispute.id)
            .ok_or(StoreError::NotFound)?;
        *slot = dispute.clone();
        Ok(())
    }

    fn sanction(&self, id: &SanctionId) -> Result<Option<EstablishmentSanction>, StoreError> {
        Ok(self
            .state
            .sanctions
            .iter()
            .find(|sanction| &sanction.id == id)
            .cloned())
    }

    fn sanctions_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<EstablishmentSanction>, StoreError> {
        let mut sanctions: Vec<EstablishmentSanction> = self
            .state
            .sanctions
            .iter()
            .filter(|sanction| &sanction.establishment_id == establishment)
            .cloned()
            .collect();
        sanctions.sort_by_key(|sanction| sanction.imposed_at);
        Ok(sanctions)
    }

    fn insert_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        let unlifted_exists = sanction.sanction_type.is_deactivation()
            && self.state.sanctions.iter().any(|existing| {
                existing.establishment_id == sanction.establishment_id
                    && existing.sanction_type.is_deactivation()
                    && existing.lifted_at.is_none()
            });
        if unlifted_exists {
            return Err(StoreError::Conflict(format!(
                "establishment {} already has an unlifted deactivation",
                sanction.establishment_id
            )));
        }
        self.state.sanctions.push(sanction.clone());
        Ok(())
    }

    fn update_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        let slot = self
            .state
            .sanctions
            .iter_mut()
            .find(|existing| existing.id == sanction.id)
            .ok_or(StoreError::NotFound)?;
        *slot = sanction.clone();
        Ok(())
    }

    fn trust_score(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Option<ProTrustScore>, StoreError> {
        Ok(self.state.trust_scores.get(establishment).cloned())
    }

    fn save_trust_score(&mut self, score: &ProTrustScore) -> Result<(), StoreError> {
        self.state
            .trust_scores
            .insert(score.establishment_id.clone(), score.clone());
        Ok(())
    }

    fn lapsed_sanction_scores(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProTrustScore>, StoreError> {
        Ok(self
            .state
            .trust_scores
            .values()
            .filter(|score| {
                score.current_sanction != CurrentSanction::None
                    && score.deactivated_until.map_or(true, |until| until <= now)
            })
            .cloned()
            .collect())
    }
}

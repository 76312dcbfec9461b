//! Persistence seam for the trust engine.
//!
//! All cross-entity consistency comes from `TrustStore::transaction`: the closure's
//! mutations either all commit or none do.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use super::domain::{
    ConsumerId, DisputeId, DisputeStatus, EstablishmentId, EstablishmentSanction, NoShowDispute,
    ProTrustScore, ReliabilityProfile, ReservationId, SanctionId, ScoringEvent, ScoringEventKind,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("uniqueness constraint violated: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Transactional storage backend.
pub trait TrustStore: Send + Sync {
    /// Runs `work` inside one transaction. `Ok` commits, `Err` rolls everything back.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TrustTransaction) -> Result<T, E>,
        E: From<StoreError>;
}

/// Operations available inside a transaction.
pub trait TrustTransaction {
    fn profile(&self, consumer: &ConsumerId) -> Result<Option<ReliabilityProfile>, StoreError>;
    fn save_profile(&mut self, profile: &ReliabilityProfile) -> Result<(), StoreError>;

    /// Rejects a second event with the same `(reservation_id, kind)` as `Conflict`.
    fn append_scoring_event(&mut self, event: &ScoringEvent) -> Result<(), StoreError>;
    /// Events for a consumer in insertion order.
    fn scoring_events(&self, consumer: &ConsumerId) -> Result<Vec<ScoringEvent>, StoreError>;
    fn scoring_event(
        &self,
        reservation: &ReservationId,
        kind: ScoringEventKind,
    ) -> Result<Option<ScoringEvent>, StoreError>;

    fn dispute(&self, id: &DisputeId) -> Result<Option<NoShowDispute>, StoreError>;
    fn disputes_for_reservation(
        &self,
        reservation: &ReservationId,
    ) -> Result<Vec<NoShowDispute>, StoreError>;
    fn disputes_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<NoShowDispute>, StoreError>;
    /// Disputes in `status`, oldest declaration first.
    fn disputes_with_status(&self, status: DisputeStatus)
        -> Result<Vec<NoShowDispute>, StoreError>;
    /// Rejects a second non-terminal dispute for the same reservation as `Conflict`.
    fn insert_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError>;
    fn update_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError>;

    fn sanction(&self, id: &SanctionId) -> Result<Option<EstablishmentSanction>, StoreError>;
    /// Sanction history, oldest first.
    fn sanctions_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<EstablishmentSanction>, StoreError>;
    /// Rejects a second unlifted deactivation for the same establishment as `Conflict`.
    fn insert_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError>;
    fn update_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError>;

    fn trust_score(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Option<ProTrustScore>, StoreError>;
    fn save_trust_score(&mut self, score: &ProTrustScore) -> Result<(), StoreError>;
    /// Scores still flagged as sanctioned whose deactivation ended at or before `now`.
    fn lapsed_sanction_scores(&self, now: DateTime<Utc>)
        -> Result<Vec<ProTrustScore>, StoreError>;
}

use super::arbitration::ArbitrationOutcome;
use super::domain::{
    DisputeStatus, EstablishmentSanction, NoShowDispute, ReliabilityProfile, ReservationId,
    ScoringEvent, ScoringEventKind,
};
use super::store::StoreError;

/// Error raised by the trust engine operations.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("reservation {} already has an open no-show dispute", .dispute.reservation_id)]
    AlreadyDisputed { dispute: Box<NoShowDispute> },
    #[error("reservation is not eligible for a no-show declaration: {0}")]
    InvalidReservationState(String),
    #[error("caller is not a party to this record")]
    Forbidden,
    #[error("dispute already resolved ({})", .0.label())]
    AlreadyTerminal(DisputeStatus),
    #[error("consumer already responded to this dispute")]
    AlreadyResponded(Box<NoShowDispute>),
    #[error("dispute already resolved as {}", .prior.decision.label())]
    Conflict { prior: Box<ArbitrationOutcome> },
    #[error("unknown arbitration decision '{0}'")]
    InvalidDecision(String),
    #[error("sanction already lifted")]
    AlreadyLifted { sanction: Box<EstablishmentSanction> },
    #[error("{} event already recorded for reservation {reservation_id}", .kind.label())]
    DuplicateEvent {
        reservation_id: ReservationId,
        kind: ScoringEventKind,
        /// The event already in the ledger and the profile it produced.
        existing: Box<ScoringEvent>,
        profile: Option<Box<ReliabilityProfile>>,
    },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrustError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TrustError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_disputed(dispute: NoShowDispute) -> Self {
        TrustError::AlreadyDisputed {
            dispute: Box::new(dispute),
        }
    }

    /// Only dependency failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrustError::Store(StoreError::Unavailable(_)))
    }
}

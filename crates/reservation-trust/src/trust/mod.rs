//! Reservation trust engine: consumer reliability scoring, no-show disputes,
//! arbitration, establishment sanctions, and the booking gate.

pub mod arbitration;
pub mod audit;
pub mod disputes;
pub mod domain;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod policy;
pub mod router;
pub mod sanctions;
pub mod service;
pub mod store;
pub mod sweep;

pub use arbitration::{ArbitrationCoordinator, ArbitrationOutcome, ArbitrationResolution};
pub use audit::{AuditError, AuditSink, AuditTrail, CsvAuditSink, MemoryAuditSink};
pub use disputes::{DisputeView, DisputeWorkflow};
pub use error::TrustError;
pub use gate::{BookingEligibility, SuspensionGate};
pub use ledger::{LedgerVerification, ProfileView, ScoreLedger, SuspensionLift};
pub use policy::{DisputePolicy, SanctionPolicy, ScoringPolicy, TrustPolicy};
pub use router::{trust_router, TrustApi};
pub use sanctions::{EstablishmentVisibility, SanctionRegistry, SanctionRequest};
pub use service::{
    DisputeResponse, EstablishmentActivity, NoShowDeclaration, ProEvidence, ScoringEventRequest,
    TrustService,
};
pub use store::{MemoryStore, SqliteStore, StoreError, TrustStore, TrustTransaction};
pub use sweep::SweepReport;

#[cfg(test)]
mod tests;

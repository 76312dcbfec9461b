//! Scheduled maintenance: dispute response deadlines, sanction expiry, and audit
//! redelivery. Each pass reads current state, so work already done by an admin
//! is simply not found again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::disputes::DisputeWorkflow;
use super::domain::Actor;
use super::error::TrustError;
use super::sanctions::SanctionRegistry;
use super::service::TrustService;
use super::store::TrustStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub escalated_disputes: usize,
    pub expired_sanctions: usize,
    pub audit_redelivered: usize,
    pub audit_backlog: usize,
}

impl<S> TrustService<S>
where
    S: TrustStore + 'static,
{
    pub fn run_sweeps(&self, now: DateTime<Utc>) -> Result<SweepReport, TrustError> {
        let actor = Actor::system("sweeper");
        let workflow = DisputeWorkflow::new(&self.policy.disputes);
        let registry = SanctionRegistry::new(&self.policy.sanctions);

        let escalated = self
            .store
            .transaction(|tx| workflow.escalate_overdue(tx, now))?;
        for dispute in &escalated {
            self.record(
                &actor,
                "dispute.escalated",
                "dispute",
                dispute.id.as_str(),
                json!({
                    "declared_at": dispute.declared_at,
                    "response_deadline": self.policy.disputes.response_deadline(dispute.declared_at),
                }),
                now,
            );
        }

        let refreshed = self
            .store
            .transaction(|tx| registry.expire_lapsed(tx, now))?;
        for score in &refreshed {
            self.record(
                &actor,
                "sanction.expired",
                "establishment",
                score.establishment_id.as_str(),
                json!({
                    "current_sanction": score.current_sanction.label(),
                    "trust_score": score.trust_score,
                }),
                now,
            );
        }

        let audit_redelivered = self.audit.retry_backlog();
        let report = SweepReport {
            escalated_disputes: escalated.len(),
            expired_sanctions: refreshed.len(),
            audit_redelivered,
            audit_backlog: self.audit.backlog_len(),
        };

        if report != SweepReport::default() {
            info!(
                escalated = report.escalated_disputes,
                expired = report.expired_sanctions,
                redelivered = report.audit_redelivered,
                backlog = report.audit_backlog,
                "maintenance sweep finished"
            );
        }
        Ok(report)
    }
}

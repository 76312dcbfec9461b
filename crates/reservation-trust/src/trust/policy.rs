use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ReservationId, ScoringEvent, ScoringEventKind};

pub const MAX_SCORE: i32 = 100;
pub const MIN_SCORE: i32 = 0;

/// Business dials for consumer reliability scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub initial_score: u8,
    pub honored_credit: i16,
    pub no_show_penalty: i16,
    pub late_cancellation_penalty: i16,
    pub very_late_cancellation_penalty: i16,
    pub dispute_reversal_credit: i16,
    pub suspension_threshold: u8,
    pub consecutive_no_show_limit: u32,
    /// Zero suspends until staff lift it.
    pub suspension_days: u32,
    pub late_cancellation_hours: i64,
    pub very_late_cancellation_hours: i64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            initial_score: 100,
            honored_credit: 2,
            no_show_penalty: 15,
            late_cancellation_penalty: 5,
            very_late_cancellation_penalty: 10,
            dispute_reversal_credit: 15,
            suspension_threshold: 30,
            consecutive_no_show_limit: 3,
            suspension_days: 30,
            late_cancellation_hours: 24,
            very_late_cancellation_hours: 2,
        }
    }
}

impl ScoringPolicy {
    /// Signed nominal delta before clamping.
    pub fn nominal_delta(&self, kind: ScoringEventKind) -> i16 {
        match kind {
            ScoringEventKind::Honored => self.honored_credit,
            ScoringEventKind::NoShow => -self.no_show_penalty,
            ScoringEventKind::LateCancellation => -self.late_cancellation_penalty,
            ScoringEventKind::VeryLateCancellation => -self.very_late_cancellation_penalty,
            ScoringEventKind::DisputeReversal => self.dispute_reversal_credit,
        }
    }

    /// Delta actually applied to `current` once the result is clamped to the score range.
    pub fn applied_delta(&self, current: u8, kind: ScoringEventKind) -> i16 {
        let current = i32::from(current);
        let next = (current + i32::from(self.nominal_delta(kind))).clamp(MIN_SCORE, MAX_SCORE);
        (next - current) as i16
    }

    pub fn suspension_breach(&self, standing: &Standing) -> Option<SuspensionCause> {
        if standing.consecutive_no_shows >= self.consecutive_no_show_limit {
            Some(SuspensionCause::ConsecutiveNoShows(standing.consecutive_no_shows))
        } else if standing.score < self.suspension_threshold {
            Some(SuspensionCause::LowScore(standing.score))
        } else {
            None
        }
    }

    pub fn suspension_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.suspension_days == 0 {
            None
        } else {
            Some(later_by(now, Duration::try_days(i64::from(self.suspension_days))))
        }
    }

    /// Classifies a cancellation by how long before the start it arrived.
    pub fn cancellation_kind(
        &self,
        starts_at: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
    ) -> Option<ScoringEventKind> {
        let lead = starts_at - cancelled_at;
        if lead < Duration::hours(self.very_late_cancellation_hours) {
            Some(ScoringEventKind::VeryLateCancellation)
        } else if lead < Duration::hours(self.late_cancellation_hours) {
            Some(ScoringEventKind::LateCancellation)
        } else {
            None
        }
    }

    /// Rebuilds a consumer's standing from the ledger, in insertion order.
    pub fn replay(&self, events: &[ScoringEvent]) -> Standing {
        let reversed: HashSet<&ReservationId> = events
            .iter()
            .filter(|event| event.kind == ScoringEventKind::DisputeReversal)
            .map(|event| &event.reservation_id)
            .collect();

        let mut score = i32::from(self.initial_score);
        let mut standing = Standing::default();
        let mut reservations: HashSet<&ReservationId> = HashSet::new();

        for event in events {
            score = (score + i32::from(event.delta)).clamp(MIN_SCORE, MAX_SCORE);

            match event.kind {
                ScoringEventKind::Honored => {
                    standing.consecutive_honored += 1;
                    standing.consecutive_no_shows = 0;
                }
                ScoringEventKind::NoShow => {
                    if !reversed.contains(&event.reservation_id) {
                        standing.no_show_count += 1;
                        standing.consecutive_no_shows += 1;
                        standing.consecutive_honored = 0;
                    }
                }
                ScoringEventKind::LateCancellation => standing.late_cancellation_count += 1,
                ScoringEventKind::VeryLateCancellation => {
                    standing.very_late_cancellation_count += 1
                }
                ScoringEventKind::DisputeReversal => {}
            }

            if event.kind != ScoringEventKind::DisputeReversal {
                reservations.insert(&event.reservation_id);
            }
        }

        standing.score = score as u8;
        standing.total_reservations = reservations.len() as u32;
        standing
    }
}

/// Counters derived from a replay of the scoring ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Standing {
    pub score: u8,
    pub no_show_count: u32,
    pub late_cancellation_count: u32,
    pub very_late_cancellation_count: u32,
    pub consecutive_no_shows: u32,
    pub consecutive_honored: u32,
    pub total_reservations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionCause {
    ConsecutiveNoShows(u32),
    LowScore(u8),
}

impl SuspensionCause {
    pub fn describe(self) -> String {
        match self {
            SuspensionCause::ConsecutiveNoShows(count) => {
                format!("{count} consecutive no-shows")
            }
            SuspensionCause::LowScore(score) => format!("reliability score dropped to {score}"),
        }
    }
}

/// Dials for the no-show dispute workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputePolicy {
    pub response_window_hours: i64,
}

impl Default for DisputePolicy {
    fn default() -> Self {
        Self {
            response_window_hours: 72,
        }
    }
}

impl DisputePolicy {
    pub fn response_deadline(&self, declared_at: DateTime<Utc>) -> DateTime<Utc> {
        later_by(declared_at, Duration::try_hours(self.response_window_hours))
    }
}

/// Dials for establishment sanctions and trust scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionPolicy {
    pub false_no_show_threshold: u32,
    pub false_no_show_window_days: i64,
    pub escalation_lookback_days: i64,
    pub false_no_show_weight: f64,
    pub sanction_weight: f64,
    pub cancellation_weight: f64,
}

impl Default for SanctionPolicy {
    fn default() -> Self {
        Self {
            false_no_show_threshold: 3,
            false_no_show_window_days: 90,
            escalation_lookback_days: 365,
            false_no_show_weight: 10.0,
            sanction_weight: 15.0,
            cancellation_weight: 50.0,
        }
    }
}

impl SanctionPolicy {
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        earlier_by(now, Duration::try_days(self.false_no_show_window_days))
    }

    pub fn escalation_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        earlier_by(now, Duration::try_days(self.escalation_lookback_days))
    }

    pub fn trust_score(
        &self,
        false_no_shows: u32,
        deactivations: u32,
        cancellation_rate: f64,
    ) -> u8 {
        let rate = if cancellation_rate.is_finite() {
            cancellation_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let penalty = self.false_no_show_weight * f64::from(false_no_shows)
            + self.sanction_weight * f64::from(deactivations)
            + self.cancellation_weight * rate;
        (f64::from(MAX_SCORE) - penalty).clamp(0.0, f64::from(MAX_SCORE)).round() as u8
    }
}

/// Complete set of tunable trust parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub scoring: ScoringPolicy,
    pub disputes: DisputePolicy,
    pub sanctions: SanctionPolicy,
}

/// `at + span`, pinned to the latest representable instant on overflow.
fn later_by(at: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| at.checked_add_signed(span)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - span`, pinned to the earliest representable instant on overflow.
fn earlier_by(at: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| at.checked_sub_signed(span)).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

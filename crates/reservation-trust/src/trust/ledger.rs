//! Score Ledger: the single writer of consumer reliability state.
//!
//! The profile is a materialized view over the consumer's scoring events. Counters
//! and streaks are recomputed from the log on every write instead of being
//! incremented in place.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ConsumerId, EventId, ReliabilityLevel, ReliabilityProfile, ReservationId, ScoringEvent,
    ScoringEventKind,
};
use super::error::TrustError;
use super::policy::{ScoringPolicy, Standing};
use super::store::{StoreError, TrustTransaction};

pub struct ScoreLedger<'p> {
    policy: &'p ScoringPolicy,
}

impl<'p> ScoreLedger<'p> {
    pub fn new(policy: &'p ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Appends one scoring event and re-derives the consumer's profile.
    pub fn apply(
        &self,
        tx: &mut dyn TrustTransaction,
        consumer: &ConsumerId,
        reservation: &ReservationId,
        kind: ScoringEventKind,
        now: DateTime<Utc>,
    ) -> Result<ReliabilityProfile, TrustError> {
        if let Some(existing) = tx.scoring_event(reservation, kind)? {
            return Err(duplicate(tx, existing)?);
        }

        let current = tx.profile(consumer)?;
        let mut events = tx.scoring_events(consumer)?;
        let before = self.policy.replay(&events);

        let event = ScoringEvent {
            id: EventId::generate(),
            consumer_id: consumer.clone(),
            reservation_id: reservation.clone(),
            kind,
            delta: self.policy.applied_delta(before.score, kind),
            created_at: now,
        };

        match tx.append_scoring_event(&event) {
            Err(StoreError::Conflict(reason)) => {
                return Err(match tx.scoring_event(reservation, kind)? {
                    Some(existing) => duplicate(tx, existing)?,
                    None => StoreError::Conflict(reason).into(),
                });
            }
            other => other?,
        }
        events.push(event);

        let standing = self.policy.replay(&events);
        let mut profile = materialize(consumer, current, &standing);
        self.evaluate_suspension(&mut profile, kind, now);
        tx.save_profile(&profile)?;
        Ok(profile)
    }

    /// Clears a suspension and re-derives the score from the ledger. Returns the
    /// profile and whether anything changed; lifting an unsuspended profile is a no-op.
    ///
    /// The current no-show streak counts as answered afterwards, so only further
    /// penalties can suspend the consumer again.
    pub fn lift_suspension(
        &self,
        tx: &mut dyn TrustTransaction,
        consumer: &ConsumerId,
    ) -> Result<(ReliabilityProfile, bool), TrustError> {
        let current = tx
            .profile(consumer)?
            .ok_or_else(|| TrustError::not_found("consumer", consumer))?;

        if !current.is_suspended {
            return Ok((current, false));
        }

        let events = tx.scoring_events(consumer)?;
        let standing = self.policy.replay(&events);
        let mut profile = materialize(consumer, Some(current), &standing);
        clear_suspension(&mut profile);
        profile.answered_no_shows = profile.consecutive_no_shows;
        tx.save_profile(&profile)?;
        Ok((profile, true))
    }

    /// Lifts a suspension whose triggering condition no longer holds, as happens
    /// when arbitration reverses one of the no-shows that caused it.
    pub fn release_cleared_suspension(
        &self,
        tx: &mut dyn TrustTransaction,
        consumer: &ConsumerId,
    ) -> Result<bool, TrustError> {
        let Some(mut profile) = tx.profile(consumer)? else {
            return Ok(false);
        };
        if !profile.is_suspended {
            return Ok(false);
        }

        let standing = standing_of(&profile);
        if self.policy.suspension_breach(&standing).is_some() {
            return Ok(false);
        }

        // The suspension no longer stands, so the remaining streak was never answered.
        clear_suspension(&mut profile);
        profile.answered_no_shows = 0;
        tx.save_profile(&profile)?;
        Ok(true)
    }

    /// Replays the log and compares it against the stored profile.
    pub fn verify(
        &self,
        tx: &mut dyn TrustTransaction,
        consumer: &ConsumerId,
    ) -> Result<LedgerVerification, TrustError> {
        let profile = tx
            .profile(consumer)?
            .ok_or_else(|| TrustError::not_found("consumer", consumer))?;
        let events = tx.scoring_events(consumer)?;
        let replayed = self.policy.replay(&events);
        let stored = standing_of(&profile);

        Ok(LedgerVerification {
            consumer_id: consumer.clone(),
            event_count: events.len(),
            stored_score: profile.score,
            replayed_score: replayed.score,
            consistent: stored == replayed,
        })
    }

    /// Clears a lapsed suspension, then suspends if `kind` is a penalty that leaves
    /// the consumer in breach. Credits and reversals never suspend, and no-shows
    /// already answered by an earlier suspension or lift do not count again.
    fn evaluate_suspension(
        &self,
        profile: &mut ReliabilityProfile,
        kind: ScoringEventKind,
        now: DateTime<Utc>,
    ) {
        if profile.is_suspended && !profile.suspension_active(now) {
            clear_suspension(profile);
        }
        if profile.is_suspended || !kind.is_penalty() {
            return;
        }

        let pending = Standing {
            consecutive_no_shows: profile.unanswered_no_shows(),
            ..standing_of(profile)
        };
        if let Some(cause) = self.policy.suspension_breach(&pending) {
            profile.is_suspended = true;
            profile.suspended_until = self.policy.suspension_until(now);
            profile.suspension_reason = Some(cause.describe());
            profile.answered_no_shows = profile.consecutive_no_shows;
        }
    }
}

/// Builds the rejection for a repeated event, carrying what the ledger already holds.
fn duplicate(tx: &dyn TrustTransaction, existing: ScoringEvent) -> Result<TrustError, TrustError> {
    let profile = tx.profile(&existing.consumer_id)?.map(Box::new);
    Ok(TrustError::DuplicateEvent {
        reservation_id: existing.reservation_id.clone(),
        kind: existing.kind,
        existing: Box::new(existing),
        profile,
    })
}

fn materialize(
    consumer: &ConsumerId,
    current: Option<ReliabilityProfile>,
    standing: &Standing,
) -> ReliabilityProfile {
    let (is_suspended, suspended_until, suspension_reason, answered) = match current {
        Some(profile) => (
            profile.is_suspended,
            profile.suspended_until,
            profile.suspension_reason,
            profile.answered_no_shows,
        ),
        None => (false, None, None, 0),
    };

    ReliabilityProfile {
        consumer_id: consumer.clone(),
        score: standing.score,
        no_show_count: standing.no_show_count,
        late_cancellation_count: standing.late_cancellation_count,
        very_late_cancellation_count: standing.very_late_cancellation_count,
        consecutive_no_shows: standing.consecutive_no_shows,
        consecutive_honored: standing.consecutive_honored,
        is_suspended,
        suspended_until,
        suspension_reason,
        total_reservations: standing.total_reservations,
        // A broken or shortened streak shrinks the answered tail with it.
        answered_no_shows: answered.min(standing.consecutive_no_shows),
    }
}

fn standing_of(profile: &ReliabilityProfile) -> Standing {
    Standing {
        score: profile.score,
        no_show_count: profile.no_show_count,
        late_cancellation_count: profile.late_cancellation_count,
        very_late_cancellation_count: profile.very_late_cancellation_count,
        consecutive_no_shows: profile.consecutive_no_shows,
        consecutive_honored: profile.consecutive_honored,
        total_reservations: profile.total_reservations,
    }
}

fn clear_suspension(profile: &mut ReliabilityProfile) {
    profile.is_suspended = false;
    profile.suspended_until = None;
    profile.suspension_reason = None;
}

/// Profile plus its display band.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: ReliabilityProfile,
    pub level: ReliabilityLevel,
    pub stars: u8,
}

impl From<ReliabilityProfile> for ProfileView {
    fn from(profile: ReliabilityProfile) -> Self {
        let level = profile.level();
        Self {
            profile,
            level,
            stars: level.stars(),
        }
    }
}

/// Result of a suspension lift, shaped for display.
#[derive(Debug, Clone, Serialize)]
pub struct SuspensionLift {
    #[serde(flatten)]
    pub view: ProfileView,
    pub lifted: bool,
}

/// Outcome of replaying a consumer's ledger against the stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerVerification {
    pub consumer_id: ConsumerId,
    pub event_count: usize,
    pub stored_score: u8,
    pub replayed_score: u8,
    pub consistent: bool,
}

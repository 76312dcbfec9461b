//! Suspension Gate: the booking-time eligibility check.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ConsumerId, ReliabilityProfile, UserFacingReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingEligibility {
    pub consumer_id: ConsumerId,
    pub allowed: bool,
    pub reason: Option<UserFacingReason>,
    pub message: Option<&'static str>,
    pub suspended_until: Option<DateTime<Utc>>,
}

pub struct SuspensionGate;

impl SuspensionGate {
    /// Consumers without a profile have no history against them and may book.
    /// A suspension whose end has passed no longer blocks, even before a sweep
    /// clears the flag.
    pub fn evaluate(
        consumer: &ConsumerId,
        profile: Option<&ReliabilityProfile>,
        now: DateTime<Utc>,
    ) -> BookingEligibility {
        match profile {
            Some(profile) if profile.suspension_active(now) => {
                let reason = UserFacingReason::TemporarilySuspended;
                BookingEligibility {
                    consumer_id: consumer.clone(),
                    allowed: false,
                    reason: Some(reason),
                    message: Some(reason.message()),
                    suspended_until: profile.suspended_until,
                }
            }
            _ => BookingEligibility {
                consumer_id: consumer.clone(),
                allowed: true,
                reason: None,
                message: None,
                suspended_until: None,
            },
        }
    }
}

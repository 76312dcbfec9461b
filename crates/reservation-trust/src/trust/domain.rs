use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Marketplace consumer (the diner, guest, or participant).
    ConsumerId
);
string_id!(
    /// Restaurant, hotel, or activity provider.
    EstablishmentId
);
string_id!(ReservationId);
string_id!(DisputeId);
string_id!(SanctionId);
string_id!(EventId);

impl DisputeId {
    pub fn generate() -> Self {
        Self(format!("dsp-{}", Uuid::new_v4()))
    }
}

impl SanctionId {
    pub fn generate() -> Self {
        Self(format!("snc-{}", Uuid::new_v4()))
    }
}

impl EventId {
    pub fn generate() -> Self {
        Self(format!("evt-{}", Uuid::new_v4()))
    }
}

/// Materialized view over a consumer's scoring events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityProfile {
    pub consumer_id: ConsumerId,
    pub score: u8,
    pub no_show_count: u32,
    pub late_cancellation_count: u32,
    pub very_late_cancellation_count: u32,
    pub consecutive_no_shows: u32,
    pub consecutive_honored: u32,
    pub is_suspended: bool,
    pub suspended_until: Option<DateTime<Utc>>,
    pub suspension_reason: Option<String>,
    pub total_reservations: u32,
    /// Tail of the no-show streak already answered by a suspension or a lift.
    /// Only no-shows beyond it count toward a new streak suspension.
    #[serde(default)]
    pub answered_no_shows: u32,
}

impl ReliabilityProfile {
    /// A suspension blocks bookings until it lapses; `None` means until lifted.
    pub fn suspension_active(&self, now: DateTime<Utc>) -> bool {
        self.is_suspended && self.suspended_until.map_or(true, |until| until > now)
    }

    /// Consecutive no-shows not yet answered by a suspension.
    pub fn unanswered_no_shows(&self) -> u32 {
        self.consecutive_no_shows.saturating_sub(self.answered_no_shows)
    }

    pub fn level(&self) -> ReliabilityLevel {
        ReliabilityLevel::from_score(self.score)
    }
}

/// Outcome categories recorded in the scoring ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringEventKind {
    Honored,
    NoShow,
    LateCancellation,
    VeryLateCancellation,
    DisputeReversal,
}

impl ScoringEventKind {
    pub const fn label(self) -> &'static str {
        match self {
            ScoringEventKind::Honored => "honored",
            ScoringEventKind::NoShow => "no_show",
            ScoringEventKind::LateCancellation => "late_cancellation",
            ScoringEventKind::VeryLateCancellation => "very_late_cancellation",
            ScoringEventKind::DisputeReversal => "dispute_reversal",
        }
    }

    /// Kinds that can push a consumer into a suspension.
    pub const fn is_penalty(self) -> bool {
        matches!(
            self,
            ScoringEventKind::NoShow
                | ScoringEventKind::LateCancellation
                | ScoringEventKind::VeryLateCancellation
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "honored" => Some(ScoringEventKind::Honored),
            "no_show" => Some(ScoringEventKind::NoShow),
            "late_cancellation" => Some(ScoringEventKind::LateCancellation),
            "very_late_cancellation" => Some(ScoringEventKind::VeryLateCancellation),
            "dispute_reversal" => Some(ScoringEventKind::DisputeReversal),
            _ => None,
        }
    }
}

/// Append-only ledger row. `delta` is the change actually applied to the score,
/// so replaying the deltas from the initial score reproduces the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub id: EventId,
    pub consumer_id: ConsumerId,
    pub reservation_id: ReservationId,
    pub kind: ScoringEventKind,
    pub delta: i16,
    pub created_at: DateTime<Utc>,
}

/// Display band derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityLevel {
    Excellent,
    Good,
    Fair,
    AtRisk,
    Restricted,
}

impl ReliabilityLevel {
    pub const fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => ReliabilityLevel::Excellent,
            70..=89 => ReliabilityLevel::Good,
            50..=69 => ReliabilityLevel::Fair,
            30..=49 => ReliabilityLevel::AtRisk,
            _ => ReliabilityLevel::Restricted,
        }
    }

    pub const fn stars(self) -> u8 {
        match self {
            ReliabilityLevel::Excellent => 5,
            ReliabilityLevel::Good => 4,
            ReliabilityLevel::Fair => 3,
            ReliabilityLevel::AtRisk => 2,
            ReliabilityLevel::Restricted => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReliabilityLevel::Excellent => "excellent",
            ReliabilityLevel::Good => "good",
            ReliabilityLevel::Fair => "fair",
            ReliabilityLevel::AtRisk => "at_risk",
            ReliabilityLevel::Restricted => "restricted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    DisputedPendingArbitration,
    ResolvedFavorClient,
    ResolvedFavorPro,
    ResolvedIndeterminate,
}

impl DisputeStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::DisputedPendingArbitration => "disputed_pending_arbitration",
            DisputeStatus::ResolvedFavorClient => "resolved_favor_client",
            DisputeStatus::ResolvedFavorPro => "resolved_favor_pro",
            DisputeStatus::ResolvedIndeterminate => "resolved_indeterminate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(DisputeStatus::Open),
            "disputed_pending_arbitration" => Some(DisputeStatus::DisputedPendingArbitration),
            "resolved_favor_client" => Some(DisputeStatus::ResolvedFavorClient),
            "resolved_favor_pro" => Some(DisputeStatus::ResolvedFavorPro),
            "resolved_indeterminate" => Some(DisputeStatus::ResolvedIndeterminate),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            DisputeStatus::ResolvedFavorClient
                | DisputeStatus::ResolvedFavorPro
                | DisputeStatus::ResolvedIndeterminate
        )
    }

    /// The arbitration decision that produced a terminal status.
    pub const fn decision(self) -> Option<ArbitrationDecision> {
        match self {
            DisputeStatus::ResolvedFavorClient => Some(ArbitrationDecision::FavorClient),
            DisputeStatus::ResolvedFavorPro => Some(ArbitrationDecision::FavorPro),
            DisputeStatus::ResolvedIndeterminate => Some(ArbitrationDecision::Indeterminate),
            DisputeStatus::Open | DisputeStatus::DisputedPendingArbitration => None,
        }
    }
}

/// Only establishments declare no-shows today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredBy {
    Pro,
}

impl DeclaredBy {
    pub const fn label(self) -> &'static str {
        match self {
            DeclaredBy::Pro => "pro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoShowDispute {
    pub id: DisputeId,
    pub reservation_id: ReservationId,
    pub consumer_id: ConsumerId,
    pub establishment_id: EstablishmentId,
    pub declared_by: DeclaredBy,
    pub declared_at: DateTime<Utc>,
    pub client_response: Option<String>,
    pub client_responded_at: Option<DateTime<Utc>>,
    pub dispute_status: DisputeStatus,
    pub evidence_client: Vec<String>,
    pub evidence_pro: Vec<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl NoShowDispute {
    pub fn is_terminal(&self) -> bool {
        self.dispute_status.is_terminal()
    }

    /// Consumer-facing wording for the dispute's current state.
    pub fn user_facing_reason(&self) -> UserFacingReason {
        match self.dispute_status {
            DisputeStatus::Open => UserFacingReason::AwaitingYourResponse,
            DisputeStatus::DisputedPendingArbitration => UserFacingReason::DisputeUnderReview,
            DisputeStatus::ResolvedFavorClient => UserFacingReason::ResolvedInYourFavor,
            DisputeStatus::ResolvedFavorPro => UserFacingReason::ResolvedForEstablishment,
            DisputeStatus::ResolvedIndeterminate => UserFacingReason::ClosedWithoutFinding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationDecision {
    FavorClient,
    FavorPro,
    Indeterminate,
}

impl ArbitrationDecision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "favor_client" => Some(ArbitrationDecision::FavorClient),
            "favor_pro" => Some(ArbitrationDecision::FavorPro),
            "indeterminate" => Some(ArbitrationDecision::Indeterminate),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ArbitrationDecision::FavorClient => "favor_client",
            ArbitrationDecision::FavorPro => "favor_pro",
            ArbitrationDecision::Indeterminate => "indeterminate",
        }
    }

    pub const fn resolved_status(self) -> DisputeStatus {
        match self {
            ArbitrationDecision::FavorClient => DisputeStatus::ResolvedFavorClient,
            ArbitrationDecision::FavorPro => DisputeStatus::ResolvedFavorPro,
            ArbitrationDecision::Indeterminate => DisputeStatus::ResolvedIndeterminate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionType {
    #[serde(rename = "deactivation_7d")]
    Deactivation7d,
    #[serde(rename = "deactivation_30d")]
    Deactivation30d,
    Warning,
}

impl SanctionType {
    pub const fn label(self) -> &'static str {
        match self {
            SanctionType::Deactivation7d => "deactivation_7d",
            SanctionType::Deactivation30d => "deactivation_30d",
            SanctionType::Warning => "warning",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deactivation_7d" => Some(SanctionType::Deactivation7d),
            "deactivation_30d" => Some(SanctionType::Deactivation30d),
            "warning" => Some(SanctionType::Warning),
            _ => None,
        }
    }

    pub const fn duration_days(self) -> i64 {
        match self {
            SanctionType::Deactivation7d => 7,
            SanctionType::Deactivation30d => 30,
            SanctionType::Warning => 0,
        }
    }

    pub const fn is_deactivation(self) -> bool {
        !matches!(self, SanctionType::Warning)
    }

    pub const fn current_sanction(self) -> CurrentSanction {
        match self {
            SanctionType::Deactivation7d => CurrentSanction::Deactivated7d,
            SanctionType::Deactivation30d => CurrentSanction::Deactivated30d,
            SanctionType::Warning => CurrentSanction::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentSanction {
    pub id: SanctionId,
    pub establishment_id: EstablishmentId,
    #[serde(rename = "type")]
    pub sanction_type: SanctionType,
    pub reason: String,
    pub related_dispute_id: Option<DisputeId>,
    pub imposed_by: String,
    pub imposed_at: DateTime<Utc>,
    pub deactivation_start: DateTime<Utc>,
    pub deactivation_end: DateTime<Utc>,
    pub lifted_by: Option<String>,
    pub lifted_at: Option<DateTime<Utc>>,
    pub lift_reason: Option<String>,
}

impl EstablishmentSanction {
    /// Imposed, not lifted, and still inside its deactivation window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.sanction_type.is_deactivation()
            && self.lifted_at.is_none()
            && self.deactivation_end > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentSanction {
    None,
    #[serde(rename = "deactivated_7d")]
    Deactivated7d,
    #[serde(rename = "deactivated_30d")]
    Deactivated30d,
}

impl CurrentSanction {
    pub const fn label(self) -> &'static str {
        match self {
            CurrentSanction::None => "none",
            CurrentSanction::Deactivated7d => "deactivated_7d",
            CurrentSanction::Deactivated30d => "deactivated_30d",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(CurrentSanction::None),
            "deactivated_7d" => Some(CurrentSanction::Deactivated7d),
            "deactivated_30d" => Some(CurrentSanction::Deactivated30d),
            _ => None,
        }
    }
}

/// Materialized establishment reputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProTrustScore {
    pub establishment_id: EstablishmentId,
    pub trust_score: u8,
    pub false_no_show_count: u32,
    pub total_disputes: u32,
    pub cancellation_rate: f64,
    pub sanctions_count: u32,
    pub current_sanction: CurrentSanction,
    pub deactivated_until: Option<DateTime<Utc>>,
}

/// Reservation facts supplied by the reservation lifecycle collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSnapshot {
    pub reservation_id: ReservationId,
    pub consumer_id: ConsumerId,
    pub establishment_id: EstablishmentId,
    pub starts_at: DateTime<Utc>,
    pub status: ReservationStatus,
    #[serde(default)]
    pub checked_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
}

/// Stable consumer-facing outcome wording; internal error codes never reach consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFacingReason {
    TemporarilySuspended,
    AwaitingYourResponse,
    DisputeUnderReview,
    ResolvedInYourFavor,
    ResolvedForEstablishment,
    ClosedWithoutFinding,
}

impl UserFacingReason {
    pub const fn message(self) -> &'static str {
        match self {
            UserFacingReason::TemporarilySuspended => "temporarily suspended",
            UserFacingReason::AwaitingYourResponse => "awaiting your response",
            UserFacingReason::DisputeUnderReview => "dispute under review",
            UserFacingReason::ResolvedInYourFavor => "dispute resolved in your favor",
            UserFacingReason::ResolvedForEstablishment => {
                "dispute resolved in favor of the establishment"
            }
            UserFacingReason::ClosedWithoutFinding => "dispute closed without a finding",
        }
    }
}

/// Caller attribution carried into audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub source_ip: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_ip: None,
        }
    }

    pub fn system(component: &str) -> Self {
        Self::new(format!("system:{component}"))
    }

    pub fn with_source_ip(mut self, source_ip: Option<String>) -> Self {
        self.source_ip = source_ip;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub source_ip: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action: &str,
        target_type: &str,
        target_id: &str,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("aud-{}", Uuid::new_v4()),
            actor_id: actor.id.clone(),
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            details,
            created_at,
            source_ip: actor.source_ip.clone(),
        }
    }
}

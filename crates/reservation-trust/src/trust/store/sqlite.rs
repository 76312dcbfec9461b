use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Params, Row, Transaction,
    TransactionBehavior,
};

use super::{StoreError, TrustStore, TrustTransaction};
use crate::trust::domain::{
    ConsumerId, CurrentSanction, DeclaredBy, DisputeId, DisputeStatus, EstablishmentId,
    EstablishmentSanction, EventId, NoShowDispute, ProTrustScore, ReliabilityProfile,
    ReservationId, SanctionId, SanctionType, ScoringEvent, ScoringEventKind,
};

const SCHEMA: &str = include_str!("../../../migrations/0001_trust_schema.sql");

const PROFILE_COLUMNS: &str = "consumer_id, score, no_show_count, late_cancellation_count, \
     very_late_cancellation_count, consecutive_no_shows, consecutive_honored, is_suspended, \
     suspended_until, suspension_reason, total_reservations, answered_no_shows";

const EVENT_COLUMNS: &str = "id, consumer_id, reservation_id, kind, delta, created_at";

const DISPUTE_COLUMNS: &str = "id, reservation_id, consumer_id, establishment_id, declared_by, \
     declared_at, client_response, client_responded_at, dispute_status, evidence_client, \
     evidence_pro, resolution_notes, resolved_by, resolved_at";

const SANCTION_COLUMNS: &str = "id, establishment_id, sanction_type, reason, related_dispute_id, \
     imposed_by, imposed_at, deactivation_start, deactivation_end, lifted_by, lifted_at, \
     lift_reason";

const TRUST_SCORE_COLUMNS: &str = "establishment_id, trust_score, false_no_show_count, \
     total_disputes, cancellation_rate, sanctions_count, current_sanction, deactivated_until";

/// SQLite-backed store. Writers are serialised with `BEGIN IMMEDIATE`, and the
/// uniqueness rules live in the schema as (partial) unique indexes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (used in tests and demos).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TrustStore for SqliteStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TrustTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut handle = SqliteTransaction { tx };
        let output = work(&mut handle)?;
        handle.tx.commit().map_err(StoreError::from)?;
        Ok(output)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

struct SqliteTransaction<'c> {
    tx: Transaction<'c>,
}

impl SqliteTransaction<'_> {
    fn query_disputes<P: Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        let sql = format!("SELECT {DISPUTE_COLUMNS} FROM no_show_disputes {filter}");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params, DisputeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(DisputeRow::into_domain).collect()
    }

    fn query_sanctions<P: Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<EstablishmentSanction>, StoreError> {
        let sql = format!("SELECT {SANCTION_COLUMNS} FROM establishment_sanctions {filter}");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params, SanctionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SanctionRow::into_domain).collect()
    }

    fn query_events<P: Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<ScoringEvent>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM scoring_events {filter}");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params, EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EventRow::into_domain).collect()
    }

    fn query_trust_scores<P: Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<ProTrustScore>, StoreError> {
        let sql = format!("SELECT {TRUST_SCORE_COLUMNS} FROM pro_trust_scores {filter}");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt
            .query_map(params, TrustScoreRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TrustScoreRow::into_domain).collect()
    }
}

impl TrustTransaction for SqliteTransaction<'_> {
    fn profile(&self, consumer: &ConsumerId) -> Result<Option<ReliabilityProfile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM reliability_profiles WHERE consumer_id = ?1");
        let row = self
            .tx
            .query_row(&sql, params![consumer.as_str()], ProfileRow::from_row)
            .optional()?;
        row.map(ProfileRow::into_domain).transpose()
    }

    fn save_profile(&mut self, profile: &ReliabilityProfile) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT OR REPLACE INTO reliability_profiles ({PROFILE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        );
        self.tx.execute(
            &sql,
            params![
                profile.consumer_id.as_str(),
                profile.score,
                profile.no_show_count,
                profile.late_cancellation_count,
                profile.very_late_cancellation_count,
                profile.consecutive_no_shows,
                profile.consecutive_honored,
                profile.is_suspended,
                profile.suspended_until.map(millis),
                profile.suspension_reason,
                profile.total_reservations,
                profile.answered_no_shows,
            ],
        )?;
        Ok(())
    }

    fn append_scoring_event(&mut self, event: &ScoringEvent) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO scoring_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        );
        self.tx.execute(
            &sql,
            params![
                event.id.as_str(),
                event.consumer_id.as_str(),
                event.reservation_id.as_str(),
                event.kind.label(),
                event.delta,
                millis(event.created_at),
            ],
        )?;
        Ok(())
    }

    fn scoring_events(&self, consumer: &ConsumerId) -> Result<Vec<ScoringEvent>, StoreError> {
        self.query_events(
            "WHERE consumer_id = ?1 ORDER BY seq ASC",
            params![consumer.as_str()],
        )
    }

    fn scoring_event(
        &self,
        reservation: &ReservationId,
        kind: ScoringEventKind,
    ) -> Result<Option<ScoringEvent>, StoreError> {
        let mut events = self.query_events(
            "WHERE reservation_id = ?1 AND kind = ?2",
            params![reservation.as_str(), kind.label()],
        )?;
        Ok(events.pop())
    }

    fn dispute(&self, id: &DisputeId) -> Result<Option<NoShowDispute>, StoreError> {
        let mut disputes = self.query_disputes("WHERE id = ?1", params![id.as_str()])?;
        Ok(disputes.pop())
    }

    fn disputes_for_reservation(
        &self,
        reservation: &ReservationId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.query_disputes(
            "WHERE reservation_id = ?1 ORDER BY declared_at ASC",
            params![reservation.as_str()],
        )
    }

    fn disputes_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.query_disputes(
            "WHERE establishment_id = ?1 ORDER BY declared_at ASC",
            params![establishment.as_str()],
        )
    }

    fn disputes_with_status(
        &self,
        status: DisputeStatus,
    ) -> Result<Vec<NoShowDispute>, StoreError> {
        self.query_disputes(
            "WHERE dispute_status = ?1 ORDER BY declared_at ASC",
            params![status.label()],
        )
    }

    fn insert_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO no_show_disputes ({DISPUTE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        );
        self.tx.execute(
            &sql,
            params![
                dispute.id.as_str(),
                dispute.reservation_id.as_str(),
                dispute.consumer_id.as_str(),
                dispute.establishment_id.as_str(),
                dispute.declared_by.label(),
                millis(dispute.declared_at),
                dispute.client_response,
                dispute.client_responded_at.map(millis),
                dispute.dispute_status.label(),
                encode_evidence(&dispute.evidence_client)?,
                encode_evidence(&dispute.evidence_pro)?,
                dispute.resolution_notes,
                dispute.resolved_by,
                dispute.resolved_at.map(millis),
            ],
        )?;
        Ok(())
    }

    fn update_dispute(&mut self, dispute: &NoShowDispute) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "UPDATE no_show_disputes SET client_response = ?2, client_responded_at = ?3, \
             dispute_status = ?4, evidence_client = ?5, evidence_pro = ?6, \
             resolution_notes = ?7, resolved_by = ?8, resolved_at = ?9 WHERE id = ?1",
            params![
                dispute.id.as_str(),
                dispute.client_response,
                dispute.client_responded_at.map(millis),
                dispute.dispute_status.label(),
                encode_evidence(&dispute.evidence_client)?,
                encode_evidence(&dispute.evidence_pro)?,
                dispute.resolution_notes,
                dispute.resolved_by,
                dispute.resolved_at.map(millis),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn sanction(&self, id: &SanctionId) -> Result<Option<EstablishmentSanction>, StoreError> {
        let mut sanctions = self.query_sanctions("WHERE id = ?1", params![id.as_str()])?;
        Ok(sanctions.pop())
    }

    fn sanctions_for_establishment(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Vec<EstablishmentSanction>, StoreError> {
        self.query_sanctions(
            "WHERE establishment_id = ?1 ORDER BY imposed_at ASC",
            params![establishment.as_str()],
        )
    }

    fn insert_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO establishment_sanctions ({SANCTION_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        );
        self.tx.execute(
            &sql,
            params![
                sanction.id.as_str(),
                sanction.establishment_id.as_str(),
                sanction.sanction_type.label(),
                sanction.reason,
                sanction.related_dispute_id.as_ref().map(DisputeId::as_str),
                sanction.imposed_by,
                millis(sanction.imposed_at),
                millis(sanction.deactivation_start),
                millis(sanction.deactivation_end),
                sanction.lifted_by,
                sanction.lifted_at.map(millis),
                sanction.lift_reason,
            ],
        )?;
        Ok(())
    }

    fn update_sanction(&mut self, sanction: &EstablishmentSanction) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "UPDATE establishment_sanctions SET deactivation_end = ?2, lifted_by = ?3, \
             lifted_at = ?4, lift_reason = ?5 WHERE id = ?1",
            params![
                sanction.id.as_str(),
                millis(sanction.deactivation_end),
                sanction.lifted_by,
                sanction.lifted_at.map(millis),
                sanction.lift_reason,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn trust_score(
        &self,
        establishment: &EstablishmentId,
    ) -> Result<Option<ProTrustScore>, StoreError> {
        let mut scores = self.query_trust_scores(
            "WHERE establishment_id = ?1",
            params![establishment.as_str()],
        )?;
        Ok(scores.pop())
    }

    fn save_trust_score(&mut self, score: &ProTrustScore) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT OR REPLACE INTO pro_trust_scores ({TRUST_SCORE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        );
        self.tx.execute(
            &sql,
            params![
                score.establishment_id.as_str(),
                score.trust_score,
                score.false_no_show_count,
                score.total_disputes,
                score.cancellation_rate,
                score.sanctions_count,
                score.current_sanction.label(),
                score.deactivated_until.map(millis),
            ],
        )?;
        Ok(())
    }

    fn lapsed_sanction_scores(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProTrustScore>, StoreError> {
        self.query_trust_scores(
            "WHERE current_sanction <> 'none' \
             AND (deactivated_until IS NULL OR deactivated_until <= ?1)",
            params![millis(now)],
        )
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn timestamp(raw: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(raw)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp {raw}")))
}

fn optional_timestamp(raw: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(timestamp).transpose()
}

fn encode_evidence(evidence: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(evidence).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn decode_evidence(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Corrupt(format!("unexpected {column} value '{value}'"))
}

struct ProfileRow {
    consumer_id: String,
    score: u8,
    no_show_count: u32,
    late_cancellation_count: u32,
    very_late_cancellation_count: u32,
    consecutive_no_shows: u32,
    consecutive_honored: u32,
    is_suspended: bool,
    suspended_until: Option<i64>,
    suspension_reason: Option<String>,
    total_reservations: u32,
    answered_no_shows: u32,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            consumer_id: row.get(0)?,
            score: row.get(1)?,
            no_show_count: row.get(2)?,
            late_cancellation_count: row.get(3)?,
            very_late_cancellation_count: row.get(4)?,
            consecutive_no_shows: row.get(5)?,
            consecutive_honored: row.get(6)?,
            is_suspended: row.get(7)?,
            suspended_until: row.get(8)?,
            suspension_reason: row.get(9)?,
            total_reservations: row.get(10)?,
            answered_no_shows: row.get(11)?,
        })
    }

    fn into_domain(self) -> Result<ReliabilityProfile, StoreError> {
        Ok(ReliabilityProfile {
            consumer_id: ConsumerId(self.consumer_id),
            score: self.score,
            no_show_count: self.no_show_count,
            late_cancellation_count: self.late_cancellation_count,
            very_late_cancellation_count: self.very_late_cancellation_count,
            consecutive_no_shows: self.consecutive_no_shows,
            consecutive_honored: self.consecutive_honored,
            is_suspended: self.is_suspended,
            suspended_until: optional_timestamp(self.suspended_until)?,
            suspension_reason: self.suspension_reason,
            total_reservations: self.total_reservations,
            answered_no_shows: self.answered_no_shows,
        })
    }
}

struct EventRow {
    id: String,
    consumer_id: String,
    reservation_id: String,
    kind: String,
    delta: i16,
    created_at: i64,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            consumer_id: row.get(1)?,
            reservation_id: row.get(2)?,
            kind: row.get(3)?,
            delta: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_domain(self) -> Result<ScoringEvent, StoreError> {
        let kind = ScoringEventKind::parse(&self.kind).ok_or_else(|| corrupt("kind", &self.kind))?;
        Ok(ScoringEvent {
            id: EventId(self.id),
            consumer_id: ConsumerId(self.consumer_id),
            reservation_id: ReservationId(self.reservation_id),
            kind,
            delta: self.delta,
            created_at: timestamp(self.created_at)?,
        })
    }
}

struct DisputeRow {
    id: String,
    reservation_id: String,
    consumer_id: String,
    establishment_id: String,
    declared_by: String,
    declared_at: i64,
    client_response: Option<String>,
    client_responded_at: Option<i64>,
    dispute_status: String,
    evidence_client: String,
    evidence_pro: String,
    resolution_notes: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<i64>,
}

impl DisputeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reservation_id: row.get(1)?,
            consumer_id: row.get(2)?,
            establishment_id: row.get(3)?,
            declared_by: row.get(4)?,
            declared_at: row.get(5)?,
            client_response: row.get(6)?,
            client_responded_at: row.get(7)?,
            dispute_status: row.get(8)?,
            evidence_client: row.get(9)?,
            evidence_pro: row.get(10)?,
            resolution_notes: row.get(11)?,
            resolved_by: row.get(12)?,
            resolved_at: row.get(13)?,
        })
    }

    fn into_domain(self) -> Result<NoShowDispute, StoreError> {
        let declared_by = match self.declared_by.as_str() {
            "pro" => DeclaredBy::Pro,
            other => return Err(corrupt("declared_by", other)),
        };
        let dispute_status = DisputeStatus::parse(&self.dispute_status)
            .ok_or_else(|| corrupt("dispute_status", &self.dispute_status))?;

        Ok(NoShowDispute {
            id: DisputeId(self.id),
            reservation_id: ReservationId(self.reservation_id),
            consumer_id: ConsumerId(self.consumer_id),
            establishment_id: EstablishmentId(self.establishment_id),
            declared_by,
            declared_at: timestamp(self.declared_at)?,
            client_response: self.client_response,
            client_responded_at: optional_timestamp(self.client_responded_at)?,
            dispute_status,
            evidence_client: decode_evidence(&self.evidence_client)?,
            evidence_pro: decode_evidence(&self.evidence_pro)?,
            resolution_notes: self.resolution_notes,
            resolved_by: self.resolved_by,
            resolved_at: optional_timestamp(self.resolved_at)?,
        })
    }
}

struct SanctionRow {
    id: String,
    establishment_id: String,
    sanction_type: String,
    reason: String,
    related_dispute_id: Option<String>,
    imposed_by: String,
    imposed_at: i64,
    deactivation_start: i64,
    deactivation_end: i64,
    lifted_by: Option<String>,
    lifted_at: Option<i64>,
    lift_reason: Option<String>,
}

impl SanctionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            establishment_id: row.get(1)?,
            sanction_type: row.get(2)?,
            reason: row.get(3)?,
            related_dispute_id: row.get(4)?,
            imposed_by: row.get(5)?,
            imposed_at: row.get(6)?,
            deactivation_start: row.get(7)?,
            deactivation_end: row.get(8)?,
            lifted_by: row.get(9)?,
            lifted_at: row.get(10)?,
            lift_reason: row.get(11)?,
        })
    }

    fn into_domain(self) -> Result<EstablishmentSanction, StoreError> {
        let sanction_type = SanctionType::parse(&self.sanction_type)
            .ok_or_else(|| corrupt("sanction_type", &self.sanction_type))?;
        Ok(EstablishmentSanction {
            id: SanctionId(self.id),
            establishment_id: EstablishmentId(self.establishment_id),
            sanction_type,
            reason: self.reason,
            related_dispute_id: self.related_dispute_id.map(DisputeId),
            imposed_by: self.imposed_by,
            imposed_at: timestamp(self.imposed_at)?,
            deactivation_start: timestamp(self.deactivation_start)?,
            deactivation_end: timestamp(self.deactivation_end)?,
            lifted_by: self.lifted_by,
            lifted_at: optional_timestamp(self.lifted_at)?,
            lift_reason: self.lift_reason,
        })
    }
}

struct TrustScoreRow {
    establishment_id: String,
    trust_score: u8,
    false_no_show_count: u32,
    total_disputes: u32,
    cancellation_rate: f64,
    sanctions_count: u32,
    current_sanction: String,
    deactivated_until: Option<i64>,
}

impl TrustScoreRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            establishment_id: row.get(0)?,
            trust_score: row.get(1)?,
            false_no_show_count: row.get(2)?,
            total_disputes: row.get(3)?,
            cancellation_rate: row.get(4)?,
            sanctions_count: row.get(5)?,
            current_sanction: row.get(6)?,
            deactivated_until: row.get(7)?,
        })
    }

    fn into_domain(self) -> Result<ProTrustScore, StoreError> {
        let current_sanction = CurrentSanction::parse(&self.current_sanction)
            .ok_or_else(|| corrupt("current_sanction", &self.current_sanction))?;
        Ok(ProTrustScore {
            establishment_id: EstablishmentId(self.establishment_id),
            trust_score: self.trust_score,
            false_no_show_count: self.false_no_show_count,
            total_disputes: self.total_disputes,
            cancellation_rate: self.cancellation_rate,
            sanctions_count: self.sanctions_count,
            current_sanction,
            deactivated_until: optional_timestamp(self.deactivated_until)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanction(id: &str, sanction_type: SanctionType) -> EstablishmentSanction {
        let imposed_at = Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap();
        EstablishmentSanction {
            id: SanctionId::from(id),
            establishment_id: EstablishmentId::from("est-1"),
            sanction_type,
            reason: "three false no-shows".to_string(),
            related_dispute_id: Some(DisputeId::from("dsp-1")),
            imposed_by: "admin-7".to_string(),
            imposed_at,
            deactivation_start: imposed_at,
            deactivation_end: imposed_at + chrono::Duration::days(sanction_type.duration_days()),
            lifted_by: None,
            lifted_at: None,
            lift_reason: None,
        }
    }

    #[test]
    fn sanctions_survive_a_round_trip_through_sql() {
        let store = SqliteStore::in_memory().expect("schema applies");
        let original = sanction("snc-1", SanctionType::Deactivation7d);

        store
            .transaction(|tx| tx.insert_sanction(&original))
            .expect("insert succeeds");
        let loaded = store
            .transaction(|tx| tx.sanction(&original.id))
            .expect("read succeeds")
            .expect("row present");

        assert_eq!(loaded, original);
    }

    #[test]
    fn partial_index_rejects_second_unlifted_deactivation() {
        let store = SqliteStore::in_memory().expect("schema applies");
        store
            .transaction(|tx| tx.insert_sanction(&sanction("snc-1", SanctionType::Deactivation7d)))
            .expect("first insert");

        let warning: Result<(), StoreError> = store
            .transaction(|tx| tx.insert_sanction(&sanction("snc-2", SanctionType::Warning)));
        assert!(warning.is_ok(), "warnings are not deactivations");

        let second: Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_sanction(&sanction("snc-3", SanctionType::Deactivation30d))
        });
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn rolled_back_transaction_discards_rows() {
        let store = SqliteStore::in_memory().expect("schema applies");
        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_sanction(&sanction("snc-1", SanctionType::Deactivation7d))?;
            Err(StoreError::Unavailable("injected".to_string()))
        });
        assert!(result.is_err());

        let history = store
            .transaction(|tx| tx.sanctions_for_establishment(&EstablishmentId::from("est-1")))
            .expect("read succeeds");
        assert!(history.is_empty());
    }
}

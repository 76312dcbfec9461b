use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::arbitration::ArbitrationOutcome;
use super::domain::{
    Actor, ConsumerId, DisputeId, EstablishmentId, ReservationSnapshot, SanctionId,
    SanctionType,
};
use super::error::TrustError;
use super::sanctions::SanctionRequest;
use super::service::{
    DisputeResponse, EstablishmentActivity, NoShowDeclaration, ProEvidence, ScoringEventRequest,
    TrustService,
};
use super::store::{StoreError, TrustStore};

pub const ADMIN_ID_HEADER: &str = "x-admin-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Shared handler state: the service plus the optional admin bearer token.
pub struct TrustApi<S> {
    service: Arc<TrustService<S>>,
    admin_token: Option<Arc<str>>,
}

impl<S> Clone for TrustApi<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            admin_token: self.admin_token.clone(),
        }
    }
}

impl<S> TrustApi<S> {
    pub fn new(service: Arc<TrustService<S>>, admin_token: Option<String>) -> Self {
        Self {
            service,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

impl<S> TrustApi<S>
where
    S: TrustStore + 'static,
{
    /// Runs a service call on tokio's blocking pool. Store transactions take locks
    /// and touch disk, so they never run on the async workers.
    async fn run<T, F>(&self, work: F) -> Result<T, Response>
    where
        F: FnOnce(&TrustService<S>) -> Result<T, TrustError> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        match tokio::task::spawn_blocking(move || work(service.as_ref())).await {
            Ok(result) => result.map_err(error_response),
            Err(join_error) => {
                tracing::error!(error = %join_error, "trust service task aborted");
                let payload = json!({ "error": "internal error" });
                Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArbitrationRequest {
    pub decision: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SanctionBody {
    #[serde(rename = "type")]
    pub sanction_type: SanctionType,
    pub reason: String,
    #[serde(default)]
    pub related_dispute_id: Option<DisputeId>,
}

#[derive(Debug, Deserialize)]
pub struct LiftBody {
    pub reason: String,
}

#[derive(Serialize)]
struct ArbitrationReply<'a> {
    #[serde(flatten)]
    outcome: &'a ArbitrationOutcome,
    replayed: bool,
}

/// Router builder exposing the consumer, establishment, and admin endpoints.
pub fn trust_router<S>(api: TrustApi<S>) -> Router
where
    S: TrustStore + 'static,
{
    Router::new()
        .route("/api/v1/reliability/events", post(apply_event_handler::<S>))
        .route(
            "/api/v1/reliability/outcomes",
            post(record_outcome_handler::<S>),
        )
        .route(
            "/api/v1/reliability/:consumer_id",
            get(profile_handler::<S>),
        )
        .route(
            "/api/v1/reliability/:consumer_id/can-book",
            get(can_book_handler::<S>),
        )
        .route("/api/v1/disputes", post(declare_handler::<S>))
        .route("/api/v1/disputes/:dispute_id", get(dispute_handler::<S>))
        .route(
            "/api/v1/disputes/:dispute_id/response",
            post(respond_handler::<S>),
        )
        .route(
            "/api/v1/disputes/:dispute_id/pro-evidence",
            post(pro_evidence_handler::<S>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/trust-score",
            get(trust_score_handler::<S>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/visibility",
            get(visibility_handler::<S>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/sanctions",
            get(sanctions_handler::<S>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/activity",
            put(activity_handler::<S>),
        )
        .route(
            "/api/v1/admin/disputes/queue",
            get(queue_handler::<S>),
        )
        .route(
            "/api/v1/admin/disputes/:dispute_id/arbitrate",
            post(arbitrate_handler::<S>),
        )
        .route(
            "/api/v1/admin/consumers/:consumer_id/lift-suspension",
            post(lift_suspension_handler::<S>),
        )
        .route(
            "/api/v1/admin/establishments/:establishment_id/sanctions",
            post(impose_handler::<S>),
        )
        .route(
            "/api/v1/admin/sanctions/:sanction_id/lift",
            post(lift_sanction_handler::<S>),
        )
        .route(
            "/api/v1/admin/establishments/:establishment_id/reactivate",
            post(reactivate_handler::<S>),
        )
        .route("/api/v1/maintenance/sweep", post(sweep_handler::<S>))
        .with_state(api)
}

pub(crate) async fn apply_event_handler<S>(
    State(api): State<TrustApi<S>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ScoringEventRequest>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = collaborator(&headers, "reservation-lifecycle");
    match api
        .run(move |service| service.apply_event(&actor, &request, Utc::now()))
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn record_outcome_handler<S>(
    State(api): State<TrustApi<S>>,
    headers: HeaderMap,
    axum::Json(snapshot): axum::Json<ReservationSnapshot>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = collaborator(&headers, "reservation-lifecycle");
    let reservation_id = snapshot.reservation_id.clone();
    match api
        .run(move |service| service.record_outcome(&actor, &snapshot, Utc::now()))
        .await
    {
        Ok(Some(view)) => (StatusCode::OK, axum::Json(view)).into_response(),
        Ok(None) => {
            let payload = json!({
                "reservation_id": reservation_id,
                "scored": false,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(rejection) => rejection,
    }
}

pub(crate) async fn profile_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(consumer_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let consumer = ConsumerId(consumer_id);
    match api.run(move |service| service.profile(&consumer)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn can_book_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(consumer_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let consumer = ConsumerId(consumer_id);
    match api
        .run(move |service| service.can_book(&consumer, Utc::now()))
        .await
    {
        Ok(eligibility) => (StatusCode::OK, axum::Json(eligibility)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn declare_handler<S>(
    State(api): State<TrustApi<S>>,
    headers: HeaderMap,
    axum::Json(declaration): axum::Json<NoShowDeclaration>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = Actor::new(format!("establishment:{}", declaration.establishment_id))
        .with_source_ip(source_ip(&headers));
    match api
        .run(move |service| service.declare_no_show(&actor, &declaration, Utc::now()))
        .await
    {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn dispute_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(dispute_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let dispute_id = DisputeId(dispute_id);
    match api.run(move |service| service.dispute(&dispute_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn respond_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    axum::Json(response): axum::Json<DisputeResponse>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = Actor::new(format!("consumer:{}", response.consumer_id))
        .with_source_ip(source_ip(&headers));
    let dispute_id = DisputeId(dispute_id);
    match api
        .run(move |service| {
            service.respond_to_dispute(&actor, &dispute_id, &response, Utc::now())
        })
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn pro_evidence_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ProEvidence>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = Actor::new(format!("establishment:{}", request.establishment_id))
        .with_source_ip(source_ip(&headers));
    let dispute_id = DisputeId(dispute_id);
    match api
        .run(move |service| {
            service.attach_pro_evidence(&actor, &dispute_id, &request, Utc::now())
        })
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn trust_score_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let establishment = EstablishmentId(establishment_id);
    match api
        .run(move |service| service.trust_score(&establishment))
        .await
    {
        Ok(score) => (StatusCode::OK, axum::Json(score)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn visibility_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let establishment = EstablishmentId(establishment_id);
    match api
        .run(move |service| service.visibility(&establishment, Utc::now()))
        .await
    {
        Ok(visibility) => (StatusCode::OK, axum::Json(visibility)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn sanctions_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    S: TrustStore + 'static,
{
    let establishment = EstablishmentId(establishment_id);
    let lookup = establishment.clone();
    let listing = api
        .run(move |service| {
            let history = service.sanctions(&lookup)?;
            let active = service.active_sanctions(&lookup, Utc::now())?;
            Ok((history, active))
        })
        .await;
    match listing {
        Ok((history, active)) => {
            let payload = json!({
                "establishment_id": establishment,
                "active": active,
                "history": history,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(rejection) => rejection,
    }
}

pub(crate) async fn activity_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
    headers: HeaderMap,
    axum::Json(activity): axum::Json<EstablishmentActivity>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = collaborator(&headers, "reservation-lifecycle");
    let establishment = EstablishmentId(establishment_id);
    match api
        .run(move |service| {
            service.record_establishment_activity(&actor, &establishment, &activity, Utc::now())
        })
        .await
    {
        Ok(score) => (StatusCode::OK, axum::Json(score)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn queue_handler<S>(
    State(api): State<TrustApi<S>>,
    headers: HeaderMap,
) -> Response
where
    S: TrustStore + 'static,
{
    if let Err(rejection) = admin_actor(&headers, api.admin_token.as_deref()) {
        return rejection;
    }
    match api.run(|service| service.arbitration_queue()).await {
        Ok(queue) => (StatusCode::OK, axum::Json(queue)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn arbitrate_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ArbitrationRequest>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = match admin_actor(&headers, api.admin_token.as_deref()) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let dispute_id = DisputeId(dispute_id);
    // A repeated decision comes back as `Conflict` and is answered as a replay.
    match api
        .run(move |service| {
            service.arbitrate(
                &actor,
                &dispute_id,
                &request.decision,
                request.notes,
                Utc::now(),
            )
        })
        .await
    {
        Ok(outcome) => {
            let reply = ArbitrationReply {
                outcome: &outcome,
                replayed: false,
            };
            (StatusCode::OK, axum::Json(reply)).into_response()
        }
        Err(rejection) => rejection,
    }
}

pub(crate) async fn lift_suspension_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(consumer_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = match admin_actor(&headers, api.admin_token.as_deref()) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let consumer = ConsumerId(consumer_id);
    match api
        .run(move |service| service.lift_suspension(&actor, &consumer, Utc::now()))
        .await
    {
        Ok(lift) => (StatusCode::OK, axum::Json(lift)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn impose_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<SanctionBody>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = match admin_actor(&headers, api.admin_token.as_deref()) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let request = SanctionRequest {
        establishment_id: EstablishmentId(establishment_id),
        sanction_type: body.sanction_type,
        reason: body.reason,
        related_dispute_id: body.related_dispute_id,
    };
    match api
        .run(move |service| service.impose_sanction(&actor, &request, Utc::now()))
        .await
    {
        Ok(sanction) => (StatusCode::CREATED, axum::Json(sanction)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn lift_sanction_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(sanction_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<LiftBody>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = match admin_actor(&headers, api.admin_token.as_deref()) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let sanction_id = SanctionId(sanction_id);
    match api
        .run(move |service| service.lift_sanction(&actor, &sanction_id, &body.reason, Utc::now()))
        .await
    {
        Ok(sanction) => (StatusCode::OK, axum::Json(sanction)).into_response(),
        Err(rejection) => rejection,
    }
}

pub(crate) async fn reactivate_handler<S>(
    State(api): State<TrustApi<S>>,
    Path(establishment_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<LiftBody>,
) -> Response
where
    S: TrustStore + 'static,
{
    let actor = match admin_actor(&headers, api.admin_token.as_deref()) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let establishment = EstablishmentId(establishment_id);
    let target = establishment.clone();
    match api
        .run(move |service| {
            service.reactivate_establishment(&actor, &target, &body.reason, Utc::now())
        })
        .await
    {
        Ok(lifted) => {
            let payload = json!({
                "establishment_id": establishment,
                "reactivated": lifted.is_some(),
                "lifted_sanction": lifted,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(rejection) => rejection,
    }
}

pub(crate) async fn sweep_handler<S>(
    State(api): State<TrustApi<S>>,
    headers: HeaderMap,
) -> Response
where
    S: TrustStore + 'static,
{
    if let Err(rejection) = admin_actor(&headers, api.admin_token.as_deref()) {
        return rejection;
    }
    match api.run(|service| service.run_sweeps(Utc::now())).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(rejection) => rejection,
    }
}

/// Resolves the calling admin from headers. Staff must name themselves for audit
/// attribution and, when a token is configured, present it as a bearer credential.
fn admin_actor(headers: &HeaderMap, token: Option<&str>) -> Result<Actor, Response> {
    if let Some(expected) = token {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if presented != Some(expected) {
            let payload = json!({ "error": "admin credentials required" });
            return Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response());
        }
    }

    let admin_id = headers
        .get(ADMIN_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match admin_id {
        Some(admin_id) => Ok(Actor::new(admin_id).with_source_ip(source_ip(headers))),
        None => {
            let payload = json!({ "error": "x-admin-id header is required" });
            Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response())
        }
    }
}

fn collaborator(headers: &HeaderMap, component: &str) -> Actor {
    Actor::system(component).with_source_ip(source_ip(headers))
}

/// First hop of `x-forwarded-for`.
fn source_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn error_response(error: TrustError) -> Response {
    match error {
        TrustError::NotFound { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        TrustError::Forbidden => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        TrustError::AlreadyDisputed { ref dispute } => {
            let payload = json!({
                "error": error.to_string(),
                "reservation_id": dispute.reservation_id,
                "dispute": dispute,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::AlreadyTerminal(status) => {
            let payload = json!({
                "error": error.to_string(),
                "dispute_status": status,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::AlreadyResponded(ref dispute) => {
            let payload = json!({
                "error": error.to_string(),
                "dispute": dispute,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::AlreadyLifted { ref sanction } => {
            let payload = json!({
                "error": error.to_string(),
                "sanction": sanction,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::DuplicateEvent {
            ref reservation_id,
            kind,
            ref existing,
            ref profile,
        } => {
            let payload = json!({
                "error": error.to_string(),
                "reservation_id": reservation_id,
                "kind": kind,
                "event": existing,
                "profile": profile,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::Conflict { ref prior } => {
            let reply = ArbitrationReply {
                outcome: prior,
                replayed: true,
            };
            (StatusCode::OK, axum::Json(reply)).into_response()
        }
        TrustError::InvalidDecision(_)
        | TrustError::InvalidReservationState(_)
        | TrustError::Validation(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        TrustError::Store(StoreError::Unavailable(ref reason)) => {
            tracing::error!(error = %reason, "trust store unavailable");
            let payload = json!({
                "error": "trust service temporarily unavailable; retry the request",
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        TrustError::Store(StoreError::Conflict(ref reason)) => {
            tracing::warn!(error = %reason, "trust store write conflict");
            let payload = json!({
                "error": "request conflicts with the current record state",
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        TrustError::Store(ref store_error) => {
            tracing::error!(error = %store_error, "trust store failure");
            let payload = json!({ "error": "internal trust store error" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

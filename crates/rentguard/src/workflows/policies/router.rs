use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::actors::ActorSubmission;
use super::documents::ValidationDecision;
use super::domain::{
    ActorId, ActorRole, DocumentId, GuarantorType, PackageId, Performer, PolicyId, RequestContext,
};
use super::lifecycle::{TransitionError, TransitionRequest};
use super::repository::{NotificationPublisher, PolicyRepository, RepositoryError};
use super::service::{NewDocument, NewPolicy, PolicyService, PolicyServiceError};

/// Header carrying the authenticated staff member's id.
pub const STAFF_HEADER: &str = "x-staff-id";
const FORWARDED_FOR: &str = "x-forwarded-for";

type SharedService<R, N> = State<Arc<PolicyService<R, N>>>;

/// Router builder exposing the staff back office and the actor portal.
pub fn policy_router<R, N>(service: Arc<PolicyService<R, N>>) -> Router
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/policies",
            post(create_handler::<R, N>).get(list_handler::<R, N>),
        )
        .route("/api/v1/policies/:policy_id", get(policy_handler::<R, N>))
        .route(
            "/api/v1/policies/:policy_id/invitations",
            post(invitations_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/transitions",
            post(transition_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/activities",
            get(activities_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/actors",
            post(add_guarantor_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/guarantor-type",
            put(guarantor_type_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/contract",
            put(contract_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/package",
            put(package_handler::<R, N>),
        )
        .route(
            "/api/v1/policies/:policy_id/documents",
            get(checklist_handler::<R, N>),
        )
        .route("/api/v1/packages", get(packages_handler::<R, N>))
        .route("/api/v1/actors/:actor_id", put(actor_update_handler::<R, N>))
        .route(
            "/api/v1/actors/:actor_id/documents",
            post(upload_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/validation",
            put(validation_handler::<R, N>),
        )
        .route(
            "/api/v1/portal/:token",
            get(portal_view_handler::<R, N>).put(portal_update_handler::<R, N>),
        )
        .route(
            "/api/v1/portal/:token/documents",
            post(portal_upload_handler::<R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddGuarantorRequest {
    pub role: ActorRole,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GuarantorTypeRequest {
    pub guarantor_type: GuarantorType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContractRequest {
    pub storage_key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PackageRequest {
    pub package_id: PackageId,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn staff_context(headers: &HeaderMap) -> Result<RequestContext, Response> {
    let staff_id = headers
        .get(STAFF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("the {STAFF_HEADER} header is required"),
                "code": "unauthenticated",
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })?;

    Ok(RequestContext::new(Performer::admin(staff_id)).with_ip(client_ip(headers)))
}

pub fn error_response(error: PolicyServiceError) -> Response {
    let (status, code) = match &error {
        PolicyServiceError::Transition(TransitionError::Invalid { .. }) => {
            (StatusCode::BAD_REQUEST, "invalid_transition")
        }
        PolicyServiceError::Transition(TransitionError::OverrideNotPermitted) => {
            (StatusCode::FORBIDDEN, "override_not_permitted")
        }
        PolicyServiceError::Transition(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "precondition_failed")
        }
        PolicyServiceError::Profile(_) => (StatusCode::UNPROCESSABLE_ENTITY, "actor_incomplete"),
        PolicyServiceError::DocumentValidation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_validation")
        }
        PolicyServiceError::GuarantorNotRequired { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "guarantor_not_required")
        }
        PolicyServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        PolicyServiceError::PolicyNotFound(_)
        | PolicyServiceError::ActorNotFound(_)
        | PolicyServiceError::DocumentNotFound(_)
        | PolicyServiceError::PackageNotFound(_)
        | PolicyServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        PolicyServiceError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
        PolicyServiceError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
        PolicyServiceError::PortalClosed { .. } => (StatusCode::CONFLICT, "portal_closed"),
        PolicyServiceError::PolicyLocked { .. } => (StatusCode::CONFLICT, "policy_locked"),
        PolicyServiceError::PolicyClosed { .. } => (StatusCode::CONFLICT, "policy_closed"),
        PolicyServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, "conflict")
        }
        PolicyServiceError::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    let mut payload = json!({
        "error": error.to_string(),
        "code": code,
    });
    if let PolicyServiceError::Transition(TransitionError::ActorsIncomplete { report, .. }) =
        &error
    {
        payload["blocking_roles"] = json!(report.blocking_roles());
    }
    if let PolicyServiceError::Profile(incomplete) = &error {
        payload["missing"] = json!(incomplete.missing);
    }
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, PolicyServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_handler<R, N>(
    State(service): SharedService<R, N>,
    headers: HeaderMap,
    Json(request): Json<NewPolicy>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, service.create_policy(request, &context))
}

pub(crate) async fn list_handler<R, N>(State(service): SharedService<R, N>) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.list())
}

pub(crate) async fn policy_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.get(&PolicyId(policy_id)))
}

pub(crate) async fn invitations_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.send_invitations(&PolicyId(policy_id), &context),
    )
}

pub(crate) async fn transition_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.transition(&PolicyId(policy_id), request, &context),
    )
}

pub(crate) async fn activities_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.activities(&PolicyId(policy_id)))
}

pub(crate) async fn add_guarantor_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AddGuarantorRequest>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.add_guarantor(&PolicyId(policy_id), request.role, &context),
    )
}

pub(crate) async fn guarantor_type_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<GuarantorTypeRequest>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.change_guarantor_type(&PolicyId(policy_id), request.guarantor_type, &context),
    )
}

pub(crate) async fn contract_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ContractRequest>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.attach_contract(&PolicyId(policy_id), &request.storage_key, &context),
    )
}

pub(crate) async fn package_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PackageRequest>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.assign_package(&PolicyId(policy_id), &request.package_id, &context),
    )
}

pub(crate) async fn checklist_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(policy_id): Path<String>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.document_checklist(&PolicyId(policy_id)),
    )
}

pub(crate) async fn packages_handler<R, N>(State(service): SharedService<R, N>) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.packages())
}

pub(crate) async fn actor_update_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(actor_id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ActorSubmission>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.submit_actor_information(&ActorId(actor_id), submission, &context),
    )
}

pub(crate) async fn upload_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(actor_id): Path<String>,
    headers: HeaderMap,
    Json(upload): Json<NewDocument>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.upload_document(&ActorId(actor_id), upload, &context),
    )
}

pub(crate) async fn validation_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    Json(decision): Json<ValidationDecision>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let context = match staff_context(&headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.validate_document(&DocumentId(document_id), decision, &context),
    )
}

pub(crate) async fn portal_view_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(token): Path<String>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.portal_view(&token))
}

pub(crate) async fn portal_update_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ActorSubmission>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.submit_via_token(&token, submission, client_ip(&headers)),
    )
}

pub(crate) async fn portal_upload_handler<R, N>(
    State(service): SharedService<R, N>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(upload): Json<NewDocument>,
) -> Response
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.upload_via_token(&token, upload, client_ip(&headers)),
    )
}

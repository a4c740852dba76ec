use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{
    Json, Router, middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use gacp_domain::application::{Application, ApplicationIntake, ApplicationState, PaymentPhase};
use gacp_domain::auth::Role;
use gacp_domain::engine::TransitionRequest;
use gacp_domain::error::DomainError;
use gacp_domain::idempotency::BeginOutcome;
use gacp_domain::identity::ActorIdentity;
use gacp_domain::ports::db::DbAdapter;
use gacp_domain::ports::idempotency::{IdempotencyKey, IdempotencyResponse};
use gacp_domain::transitions::{Action, ActionPayload, PaymentPayload};

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::observability;
use crate::{middleware as app_middleware, state::AppState, validation};

const LIST_LIMIT_DEFAULT: usize = 50;
const LIST_LIMIT_MAX: usize = 200;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/v1/applications",
            post(create_application).get(list_applications),
        )
        .route("/v1/applications/:application_number", get(get_application))
        .route(
            "/v1/applications/:application_number/history",
            get(get_history),
        )
        .route(
            "/v1/applications/:application_number/actions",
            get(get_available_actions),
        )
        .route(
            "/v1/applications/:application_number/transitions",
            post(execute_transition),
        )
        .route("/v1/payments/gateway-callback", post(gateway_callback))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    backend: &'static str,
    backend_healthy: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (backend, backend_healthy) = match state.db.as_ref() {
        Some(adapter) => (adapter.name(), adapter.health_check().await.is_ok()),
        None => ("memory", true),
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        backend,
        backend_healthy,
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, String::new()).into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 200))]
    farm_name: String,
    #[validate(length(min = 1, max = 120))]
    crop: String,
    #[validate(length(min = 1, max = 120))]
    province: String,
}

async fn create_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    require_role(&auth, &[Role::Farmer])?;
    let request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new("application_create", actor.user_id.clone(), request_id);
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict("request already in flight".into())),
        BeginOutcome::Started => {
            let intake = ApplicationIntake {
                farm_name: payload.farm_name,
                crop: payload.crop,
                province: payload.province,
            };
            let application = state
                .engine()
                .create_application(&actor, intake)
                .await
                .map_err(map_domain_error)?;

            let response = IdempotencyResponse {
                status_code: StatusCode::CREATED.as_u16(),
                body: serde_json::to_value(&application).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, &response).await?;
            Ok(to_response(response))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationListQuery {
    state: String,
    limit: Option<usize>,
}

async fn list_applications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ApplicationListQuery>,
) -> Result<Json<Vec<Application>>, ApiError> {
    require_role(
        &auth,
        &[
            Role::Reviewer,
            Role::Inspector,
            Role::Approver,
            Role::Admin,
            Role::System,
        ],
    )?;
    let filter = ApplicationState::parse(&query.state)
        .ok_or_else(|| ApiError::Validation(format!("unknown state '{}'", query.state)))?;
    let limit = query.limit.unwrap_or(LIST_LIMIT_DEFAULT).min(LIST_LIMIT_MAX);
    let applications = state
        .applications
        .list_by_state(filter, limit)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(applications))
}

async fn get_application(
    State(state): State<AppState>,
    Path(application_number): Path<String>,
) -> Result<Json<Application>, ApiError> {
    let application = state
        .engine()
        .get(&application_number)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(application))
}

async fn get_history(
    State(state): State<AppState>,
    Path(application_number): Path<String>,
) -> Result<Response, ApiError> {
    let history = state
        .engine()
        .history(&application_number)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(history).into_response())
}

#[derive(Serialize)]
struct AvailableActionsResponse {
    application_number: String,
    state: ApplicationState,
    actions: Vec<Action>,
}

async fn get_available_actions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(application_number): Path<String>,
) -> Result<Json<AvailableActionsResponse>, ApiError> {
    let application = state
        .engine()
        .get(&application_number)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(AvailableActionsResponse {
        application_number,
        state: application.state(),
        actions: application.available_actions(auth.role),
    }))
}

fn default_action_payload() -> ActionPayload {
    ActionPayload::None
}

#[derive(Debug, Deserialize)]
struct ExecuteTransitionRequest {
    action: Action,
    #[serde(default = "default_action_payload")]
    payload: ActionPayload,
    #[serde(default)]
    expected_version: Option<u64>,
}

async fn execute_transition(
    State(state): State<AppState>,
    Path(application_number): Path<String>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ExecuteTransitionRequest>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;

    let key = IdempotencyKey::new(
        "application_transition",
        format!("{}:{application_number}", actor.user_id),
        request_id,
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict("request already in flight".into())),
        BeginOutcome::Started => {
            let request = TransitionRequest {
                application_number,
                action: payload.action,
                actor,
                actor_role: auth.role,
                payload: payload.payload,
                expected_version: payload.expected_version,
                occurred_at_ms: None,
            };
            let action = request.action;
            let result = run_transition(&state, request).await;
            match &result {
                Ok(_) => observability::register_transition(action.as_str(), "applied"),
                Err(err) => observability::register_transition(action.as_str(), err.error_code()),
            }
            let application = result?;

            let response = IdempotencyResponse {
                status_code: StatusCode::OK.as_u16(),
                body: serde_json::to_value(&application).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, &response).await?;
            Ok(to_response(response))
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct GatewayCallbackRequest {
    #[validate(length(min = 1, max = 64))]
    application_number: String,
    phase: PaymentPhase,
    amount_thb: u64,
    #[validate(length(min = 1, max = 128))]
    reference: String,
    #[validate(length(min = 1, max = 32))]
    status: String,
}

/// Settlement notification from the payment gateway. Records the settlement
/// fact, then drives the matching workflow transition as the system actor.
async fn gateway_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<GatewayCallbackRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    require_role(&auth, &[Role::System, Role::Admin])?;
    let request_id = request_id_from_headers(&headers)?;

    let action = match payload.status.as_str() {
        "settled" => Action::PaymentConfirmed,
        "failed" => Action::PaymentFailed,
        other => {
            return Err(ApiError::Validation(format!(
                "unsupported gateway status '{other}'"
            )));
        }
    };

    let key = IdempotencyKey::new(
        "payment_callback",
        payload.application_number.clone(),
        request_id,
    );
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict("request already in flight".into())),
        BeginOutcome::Started => {
            if action == Action::PaymentConfirmed {
                state.settlements.mark_settled(payload.reference.clone());
            }
            let request = TransitionRequest {
                application_number: payload.application_number,
                action,
                actor,
                actor_role: Role::System,
                payload: ActionPayload::Payment(PaymentPayload {
                    phase: payload.phase,
                    amount_thb: Some(payload.amount_thb),
                    reference: Some(payload.reference),
                }),
                expected_version: None,
                occurred_at_ms: None,
            };
            let result = run_transition(&state, request).await;
            match &result {
                Ok(_) => observability::register_transition(action.as_str(), "applied"),
                Err(err) => observability::register_transition(action.as_str(), err.error_code()),
            }
            let application = result?;

            let response = IdempotencyResponse {
                status_code: StatusCode::OK.as_u16(),
                body: serde_json::to_value(&application).map_err(|_| ApiError::Internal)?,
            };
            complete_idempotent(&state, &key, &response).await?;
            Ok(to_response(response))
        }
    }
}

/// Retry policy lives here, not in the engine: one automatic retry on a
/// version conflict, and only when the client did not pin a version.
async fn run_transition(
    state: &AppState,
    request: TransitionRequest,
) -> Result<Application, ApiError> {
    let engine = state.engine();
    let auto_retry = request.expected_version.is_none();
    match engine.execute(request.clone()).await {
        Err(DomainError::VersionConflict) if auto_retry => {
            tracing::debug!(
                application_number = %request.application_number,
                action = %request.action,
                "version conflict, retrying once"
            );
            engine.execute(request).await.map_err(map_domain_error)
        }
        other => other.map_err(map_domain_error),
    }
}

async fn complete_idempotent(
    state: &AppState,
    key: &IdempotencyKey,
    response: &IdempotencyResponse,
) -> Result<(), ApiError> {
    state
        .idempotency
        .complete(key, response.clone())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "idempotency complete failed");
            ApiError::Internal
        })
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity {
        user_id: user_id.to_string(),
        username: auth
            .username
            .clone()
            .unwrap_or_else(|| user_id.to_string()),
    })
}

fn require_role(auth: &AuthContext, allowed: &[Role]) -> Result<Role, ApiError> {
    if allowed.contains(&auth.role) {
        Ok(auth.role)
    } else {
        Err(ApiError::Forbidden(format!(
            "role '{}' is not allowed to call this endpoint",
            auth.role
        )))
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::VersionConflict => {
            ApiError::Conflict("application changed since it was loaded".into())
        }
        DomainError::Forbidden { action, role } => ApiError::Forbidden(format!(
            "role '{role}' is not authorized to perform '{action}'"
        )),
        DomainError::InvalidTransition { state, action } => ApiError::UnprocessableEntity {
            code: "invalid_transition",
            message: format!("action '{action}' is not defined for state '{state}'"),
        },
        DomainError::GuardFailed(violation) => ApiError::UnprocessableEntity {
            code: violation.code,
            message: violation.message,
        },
        DomainError::Persistence(message) => {
            tracing::error!(error = %message, "persistence failure");
            ApiError::ServiceUnavailable
        }
    }
}

fn to_response(response: IdempotencyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}

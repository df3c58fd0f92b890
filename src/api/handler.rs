use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    loans::{
        models::{
            Actor, ApiResponse, ApprovalResponse, LoanApplication, LoanSubmission, LoanTracking,
            Role,
        },
        service::LoanOperations,
    },
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Clone)]
pub struct AppState {
    pub loans: Arc<dyn LoanOperations>,
}

/// Identity asserted by the upstream gateway
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing caller identity".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| AppError::Unauthorized("invalid caller identity".to_string()))?;

        let role = header_value(parts, ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing caller role".to_string()))?
            .parse::<Role>()
            .map_err(AppError::Unauthorized)?;

        Ok(Actor { id, role })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// POST /api/v1/loans - Submit a loan application
pub async fn apply_loan(
    State(state): State<AppState>,
    actor: Actor,
    Json(application): Json<LoanApplication>,
) -> AppResult<(StatusCode, Json<ApiResponse<LoanSubmission>>)> {
    info!("Loan application from user {}", actor.id);

    let submission = state.loans.apply(actor.id, application).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Loan application submitted", submission)),
    ))
}

/// GET /api/v1/loans/:loan_id - Loan status with its history
pub async fn track_loan(
    State(state): State<AppState>,
    actor: Actor,
    Path(loan_id): Path<String>,
) -> AppResult<Json<ApiResponse<LoanTracking>>> {
    let loan_id = parse_loan_id(&loan_id)?;

    let tracking = state.loans.track(actor, loan_id).await?;

    Ok(Json(ApiResponse::new("loan retrieved successfully", tracking)))
}

/// PUT /api/v1/admin/loans/:loan_id/approve - Approve or reject a pending loan
pub async fn approve_loan(
    State(state): State<AppState>,
    actor: Actor,
    Path(loan_id): Path<String>,
) -> AppResult<Json<ApiResponse<ApprovalResponse>>> {
    if !actor.is_admin() {
        warn!("Non-admin {} attempted to approve loan {}", actor.id, loan_id);
        return Err(AppError::Forbidden(
            "only admins can approve loans".to_string(),
        ));
    }

    let loan_id = parse_loan_id(&loan_id)?;
    info!("Admin {} deciding loan {}", actor.id, loan_id);

    let outcome = state.loans.approve(loan_id, actor.id).await?;

    Ok(Json(outcome.into()))
}

fn parse_loan_id(raw: &str) -> AppResult<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidInput("loan ID is required".to_string()));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidInput("invalid loan ID".to_string()))
}

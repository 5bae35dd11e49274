// HTTP handlers for discount rule administration (operator only)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::discounts::error::DiscountError;
use crate::discounts::metrics::MetricsSummary;
use crate::discounts::models::{
    CreateDiscountRequest, DiscountRuleResponse, Redemption, UpdateDiscountRequest,
};
use crate::AppState;

/// Handler for POST /api/admin/discounts
#[utoipa::path(
    post,
    path = "/api/admin/discounts",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Discount rule created", body = DiscountRuleResponse),
        (status = 400, description = "Invalid or disabled rule definition"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Operator role required")
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn create_discount_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<DiscountRuleResponse>), DiscountError> {
    tracing::debug!("Operator {} creating discount '{}'", user.user_id, request.name);
    let rule = state.admin.create_rule(request).await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

/// Handler for GET /api/admin/discounts
#[utoipa::path(
    get,
    path = "/api/admin/discounts",
    responses(
        (status = 200, description = "All discount rules", body = Vec<DiscountRuleResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn list_discounts_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<DiscountRuleResponse>>, DiscountError> {
    let rules = state.admin.list_rules().await?;
    Ok(Json(rules.into_iter().map(DiscountRuleResponse::from).collect()))
}

/// Handler for GET /api/admin/discounts/:id
#[utoipa::path(
    get,
    path = "/api/admin/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount rule ID")),
    responses(
        (status = 200, description = "Discount rule", body = DiscountRuleResponse),
        (status = 404, description = "Discount rule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn get_discount_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DiscountRuleResponse>, DiscountError> {
    let rule = state.admin.get_rule(id).await?;
    Ok(Json(rule.into()))
}

/// Handler for PUT /api/admin/discounts/:id
#[utoipa::path(
    put,
    path = "/api/admin/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount rule ID")),
    request_body = UpdateDiscountRequest,
    responses(
        (status = 200, description = "Discount rule updated", body = DiscountRuleResponse),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Discount rule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn update_discount_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDiscountRequest>,
) -> Result<Json<DiscountRuleResponse>, DiscountError> {
    tracing::debug!("Operator {} updating discount {}", user.user_id, id);
    let rule = state.admin.update_rule(id, request).await?;
    Ok(Json(rule.into()))
}

/// Handler for PATCH /api/admin/discounts/:id/toggle
#[utoipa::path(
    patch,
    path = "/api/admin/discounts/{id}/toggle",
    params(("id" = Uuid, Path, description = "Discount rule ID")),
    responses(
        (status = 200, description = "Active flag flipped", body = DiscountRuleResponse),
        (status = 404, description = "Discount rule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn toggle_discount_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<DiscountRuleResponse>, DiscountError> {
    tracing::debug!("Operator {} toggling discount {}", user.user_id, id);
    let rule = state.admin.toggle_rule(id).await?;
    Ok(Json(rule.into()))
}

/// Handler for GET /api/admin/discounts/:id/redemptions
#[utoipa::path(
    get,
    path = "/api/admin/discounts/{id}/redemptions",
    params(("id" = Uuid, Path, description = "Discount rule ID")),
    responses(
        (status = 200, description = "Ledger entries for the rule, newest first", body = Vec<Redemption>),
        (status = 404, description = "Discount rule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn list_redemptions_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Redemption>>, DiscountError> {
    let redemptions = state.admin.list_redemptions(id).await?;
    Ok(Json(redemptions))
}

/// Handler for GET /api/admin/discounts/metrics
#[utoipa::path(
    get,
    path = "/api/admin/discounts/metrics",
    responses(
        (status = 200, description = "Discount engine counters", body = MetricsSummary)
    ),
    security(("bearer_auth" = [])),
    tag = "discounts"
)]
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

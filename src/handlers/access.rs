//! Data-access decisions for dashboard pages

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::SessionContext,
    error::AppError,
    middleware::AppState,
    models::auth::{AccessCheckRequest, AccessCheckResponse},
    services::permission_service::{allowed_countries, effective_country},
};

/// POST /api/v1/access/check
/// The session middleware already validated and refreshed the session.
pub async fn check(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Json(req): Json<AccessCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let country = req
        .country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    state
        .permission_service
        .check(&ctx.session, country, req.action)
        .await
        .into_result()?;

    Ok(Json(AccessCheckResponse {
        decision: "allow",
        country: country.map(str::to_string),
        action: req.action,
        session_expires_at: ctx.session.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CountriesQuery {
    pub selected: Option<String>,
}

/// GET /api/v1/access/countries
pub async fn countries(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Query(query): Query<CountriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let allowed = allowed_countries(&ctx.session, state.permission_service.countries());
    let effective = effective_country(&ctx.session, query.selected.as_deref());

    Ok(Json(json!({
        "countries": allowed,
        "effective_country": effective,
    })))
}

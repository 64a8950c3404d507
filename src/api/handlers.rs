use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{AppState, error::ApiError};
use crate::events::IngestStatus;
use crate::models::Briefing;
use crate::store::{BriefingQuery, MAX_QUERY_LIMIT};

const DEFAULT_LIMIT: i64 = 10;

/// Raw query string. `limit` stays a string so a bad value becomes our 400,
/// not axum's rejection.
#[derive(Debug, Default, Deserialize)]
pub struct BriefingParams {
    pub limit: Option<String>,
    pub keyword: Option<String>,
    pub category: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_limit(raw: Option<&str>) -> Result<i64, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_LIMIT),
        Some(s) => s
            .parse::<i64>()
            .map(|n| n.clamp(0, MAX_QUERY_LIMIT))
            .map_err(|_| ApiError::InvalidLimit(s.to_string())),
    }
}

impl BriefingParams {
    fn into_query(self, limit: i64) -> BriefingQuery {
        BriefingQuery {
            limit,
            keyword: non_empty(self.keyword),
            category: non_empty(self.category),
        }
    }
}

#[instrument(level = "info", skip(state))]
pub async fn latest_briefing(
    State(state): State<AppState>,
    Query(params): Query<BriefingParams>,
) -> Result<Json<Briefing>, ApiError> {
    let query = params.into_query(1);
    let briefing = state
        .store
        .query(&query)
        .await?
        .into_iter()
        .next()
        .ok_or(ApiError::NotFound)?;
    debug!(id = briefing.id, "Serving latest briefing");
    Ok(Json(briefing))
}

#[instrument(level = "info", skip(state))]
pub async fn briefings(
    State(state): State<AppState>,
    Query(params): Query<BriefingParams>,
) -> Result<Json<Vec<Briefing>>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let rows = state.store.query(&params.into_query(limit)).await?;
    debug!(limit, returned = rows.len(), "Serving briefings");
    Ok(Json(rows))
}

pub async fn categories(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "categories": state.categories.labels() }))
}

pub async fn status(State(state): State<AppState>) -> Json<IngestStatus> {
    Json(state.status.snapshot())
}

pub async fn health() -> &'static str {
    "ok"
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::audit::{LogEntry, LogKind};
use crate::rules::{BulkAction, NewRule, Rule, RuleFilter, StoreError};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub transport: &'static str,
    pub rules_total: usize,
    pub rules_enabled: usize,
}

/// Structured admin error.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: status.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::Io(_) | StoreError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    /// Comma-separated rule ids.
    pub items: String,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub kind: Option<LogKind>,
}

/// Ids from a comma-separated list; anything that is not an id is skipped.
pub fn parse_items(items: &str) -> Vec<u64> {
    items
        .split(',')
        .filter_map(|item| item.trim().parse().ok())
        .collect()
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, ApiError> {
    let resolver = state.resolver.load();
    let rules = resolver.store().list(&RuleFilter::default())?;
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        transport: resolver.transport().name(),
        rules_total: rules.len(),
        rules_enabled: rules.iter().filter(|r| r.enabled).count(),
    }))
}

pub async fn list_rules(
    State(state): State<AdminState>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<Vec<Rule>>, ApiError> {
    Ok(Json(state.resolver.load().store().list(&filter)?))
}

pub async fn create_rule(
    State(state): State<AdminState>,
    Query(filter): Query<RuleFilter>,
    Json(rule): Json<NewRule>,
) -> Result<(StatusCode, Json<Vec<Rule>>), ApiError> {
    let resolver = state.resolver.load();
    let created = resolver.store().create(rule)?;
    tracing::info!(rule_id = created.id, source = %created.source.url, "Rule created");
    Ok((StatusCode::CREATED, Json(resolver.store().list(&filter)?)))
}

pub async fn update_rule(
    State(state): State<AdminState>,
    Path(id): Path<u64>,
    Query(filter): Query<RuleFilter>,
    Json(rule): Json<NewRule>,
) -> Result<Json<Vec<Rule>>, ApiError> {
    let resolver = state.resolver.load();
    resolver.store().update(id, rule)?;
    tracing::info!(rule_id = id, "Rule updated");
    Ok(Json(resolver.store().list(&filter)?))
}

pub async fn bulk_rules(
    State(state): State<AdminState>,
    Query(filter): Query<RuleFilter>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<Vec<Rule>>, ApiError> {
    let ids = parse_items(&request.items);
    if ids.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "no valid ids in items"));
    }

    let resolver = state.resolver.load();
    let applied = resolver.store().bulk(request.action, &ids);
    tracing::info!(action = ?request.action, requested = ids.len(), applied, "Bulk rule action");
    Ok(Json(resolver.store().list(&filter)?))
}

pub async fn list_logs(
    State(state): State<AdminState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let resolver = state.resolver.load();
    resolver
        .logger()
        .writer()
        .entries(query.kind)
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AppState,
    auth::CurrentUser,
    entities::user,
    error::{AppError, AppResult},
    permissions::check_sync,
};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    message: String,
    synced_count: usize,
    page: u32,
    total_pages: u32,
}

pub async fn trigger_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<SyncResponse>> {
    run(&state, &user, query.page.as_deref()).await
}

/// Takes `page` from a JSON or form-encoded body.
pub async fn trigger_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<SyncResponse>> {
    let page = page_from_body(&headers, &body)?;
    run(&state, &user, page.as_deref()).await
}

async fn run(state: &AppState, user: &user::Model, raw_page: Option<&str>) -> AppResult<Json<SyncResponse>> {
    check_sync(user)?;
    let page = parse_page(raw_page)?;

    let report = state.synchronizer.sync(page, Some(user)).await?;

    Ok(Json(SyncResponse {
        message: format!(
            "Информация о {} фильмах и их актёрах успешно загружена в Вашу базу данных!",
            report.synced_count
        ),
        synced_count: report.synced_count,
        page: report.current_page,
        total_pages: report.total_pages,
    }))
}

fn parse_page(raw: Option<&str>) -> AppResult<u32> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(1),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| AppError::bad_parameter("page must be a positive integer")),
    }
}

fn page_from_body(headers: &HeaderMap, body: &[u8]) -> AppResult<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if is_json {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::bad_parameter(format!("request body is not valid JSON: {e}")))?;
        return Ok(match value.get("page") {
            None | Some(Value::Null) => None,
            Some(Value::String(page)) => Some(page.clone()),
            Some(other) => Some(other.to_string()),
        });
    }

    Ok(url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned()))
}

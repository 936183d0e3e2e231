use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::IntoResponse,
};

use crate::api::{BookClubQueryParams, BookClubResponse, IntegrationResponse, SearchParams, book_club_responses};
use crate::db::Database;
use crate::error::ApiError;
use crate::query::Catalog;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

pub async fn healthcheck() -> impl IntoResponse {
    tracing::debug!("got healthcheck request");
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn list_book_clubs(
    State(state): State<AppState>,
    params: Result<Query<BookClubQueryParams>, QueryRejection>,
) -> Result<Json<Vec<BookClubResponse>>, ApiError> {
    let Query(params) = params?;
    let filters = params.into_filters()?;
    let rows = Catalog::new(state.db.connection()).list_book_clubs(&filters).await?;

    tracing::info!(count = rows.len(), ?filters, "listed book clubs");
    Ok(Json(book_club_responses(rows)))
}

pub async fn search_book_clubs(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<BookClubResponse>>, ApiError> {
    let Query(params) = params?;
    let text = params.into_text();
    let rows = Catalog::new(state.db.connection()).search_book_clubs(&text).await?;

    tracing::info!(count = rows.len(), search = %text, "searched book clubs");
    Ok(Json(book_club_responses(rows)))
}

pub async fn get_book_club(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<BookClubResponse>, ApiError> {
    match Catalog::new(state.db.connection()).get_book_club(&key).await? {
        Some(row) => Ok(Json(row.into())),
        None => {
            tracing::info!(key = %key, "book club not found");
            Err(ApiError::NotFound)
        }
    }
}

pub async fn list_integrations(State(state): State<AppState>) -> Result<Json<Vec<IntegrationResponse>>, ApiError> {
    let integrations = Catalog::new(state.db.connection()).list_integrations().await?;
    Ok(Json(integrations.into_iter().map(IntegrationResponse::from).collect()))
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::{BookClubWithIntegration, DATE_FORMAT, Integration};
use crate::query::BookClubFilters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookClubResponse {
    pub id: String,
    pub url: String,
    pub author: String,
    pub book: String,
    pub date: NaiveDate,
    pub integration: i32,
    pub integration_name: Option<String>,
}

impl From<BookClubWithIntegration> for BookClubResponse {
    fn from(row: BookClubWithIntegration) -> Self {
        let BookClubWithIntegration { book_club, integration } = row;
        BookClubResponse {
            id: book_club.id,
            url: book_club.url,
            author: book_club.author,
            book: book_club.book,
            date: book_club.date,
            integration: book_club.integration_id,
            integration_name: integration.map(|i| i.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationResponse {
    pub id: i32,
    pub name: String,
}

impl From<Integration> for IntegrationResponse {
    fn from(integration: Integration) -> Self {
        IntegrationResponse {
            id: integration.id,
            name: integration.name,
        }
    }
}

pub fn book_club_responses(rows: Vec<BookClubWithIntegration>) -> Vec<BookClubResponse> {
    rows.into_iter().map(BookClubResponse::from).collect()
}

/// Raw query string of `GET /bookclub/`. Values are kept as strings so a malformed
/// one becomes a descriptive 400 instead of a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct BookClubQueryParams {
    pub integration: Option<String>,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub q: Option<String>,
}

/// Raw query string of `GET /bookclub/search/`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
    pub q: Option<String>,
}

impl BookClubQueryParams {
    pub fn into_filters(self) -> Result<BookClubFilters, ApiError> {
        let integration = match non_empty(self.integration) {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| ApiError::invalid_param("integration", "expected an integer id"))?,
            ),
            None => None,
        };

        let date = parse_date("date", self.date)?;
        let start_date = parse_date("start_date", self.start_date)?;
        let end_date = parse_date("end_date", self.end_date)?;

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(ApiError::invalid_param("start_date", "must not be after end_date"));
            }
        }

        Ok(BookClubFilters {
            integration,
            date,
            start_date,
            end_date,
            search: non_empty(self.search).or_else(|| non_empty(self.q)),
        })
    }
}

impl SearchParams {
    pub fn into_text(self) -> String {
        non_empty(self.search).or_else(|| non_empty(self.q)).unwrap_or_default()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_date(param: &str, value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    match non_empty(value) {
        Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| ApiError::invalid_param(param, "enter a valid date (YYYY-MM-DD)")),
        None => Ok(None),
    }
}

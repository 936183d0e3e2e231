use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Storage format of `book_club.date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookClub {
    pub id: String,
    pub url: String,
    pub author: String,
    pub book: String,
    pub date: NaiveDate,
    pub integration_id: i32,
}

/// A book club row together with the integration it references, fetched in one query.
///
/// `integration` is optional so that a dangling reference (possible only if foreign
/// keys were disabled when the row was written) still yields a usable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookClubWithIntegration {
    pub book_club: BookClub,
    pub integration: Option<Integration>,
}

impl BookClubWithIntegration {
    pub fn integration_name(&self) -> Option<&str> {
        self.integration.as_ref().map(|i| i.name.as_str())
    }
}

/// Lowercased `book` and `author` as stored in `book_club.search_text`.
/// Folding happens here rather than in SQLite, whose LOWER and LIKE only fold ASCII.
pub fn search_text(book: &str, author: &str) -> String {
    format!("{}\n{}", book, author).to_lowercase()
}

/// Input for the administrative write path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBookClub {
    pub id: String,
    pub url: String,
    pub author: String,
    pub book: String,
    pub date: NaiveDate,
    pub integration_id: i32,
}

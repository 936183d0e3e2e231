//! Read-side queries over book clubs and integrations.
//!
//! Every book club query joins `integration` in the same statement, so producing the
//! denormalized integration name never costs a follow-up lookup per row.

use chrono::NaiveDate;
use libsql::Connection;

use crate::error::DbError;
use crate::model::{BookClub, BookClubWithIntegration, DATE_FORMAT, Integration};

const SELECT_BOOK_CLUBS: &str = r#"
SELECT
    book_club.id,
    book_club.url,
    book_club.author,
    book_club.book,
    book_club.date,
    book_club.integration_id,
    integration.id,
    integration.name
FROM book_club
LEFT JOIN integration ON integration.id = book_club.integration_id
"#;

const ORDER_BOOK_CLUBS: &str = "ORDER BY book_club.date DESC, book_club.id ASC";

/// Optional constraints for listing book clubs. All present constraints must hold.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BookClubFilters {
    pub integration: Option<i32>,
    pub date: Option<NaiveDate>,
    /// Inclusive lower bound.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound.
    pub end_date: Option<NaiveDate>,
    /// Case-insensitive substring of `book` or `author`.
    pub search: Option<String>,
}

pub struct Catalog<'a> {
    conn: &'a Connection,
}

impl<'a> Catalog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn list_book_clubs(
        &self,
        filters: &BookClubFilters,
    ) -> Result<Vec<BookClubWithIntegration>, DbError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(integration) = filters.integration {
            clauses.push("book_club.integration_id = ?");
            params.push(integration.into());
        }
        if let Some(date) = filters.date {
            clauses.push("book_club.date = ?");
            params.push(date.format(DATE_FORMAT).to_string().into());
        }
        if let Some(start) = filters.start_date {
            clauses.push("book_club.date >= ?");
            params.push(start.format(DATE_FORMAT).to_string().into());
        }
        if let Some(end) = filters.end_date {
            clauses.push("book_club.date <= ?");
            params.push(end.format(DATE_FORMAT).to_string().into());
        }
        if let Some(search) = filters.search.as_deref().filter(|s| !s.is_empty()) {
            clauses.push(r"book_club.search_text LIKE ? ESCAPE '\'");
            params.push(like_pattern(&search.to_lowercase()).into());
        }

        let query = if clauses.is_empty() {
            format!("{SELECT_BOOK_CLUBS} {ORDER_BOOK_CLUBS}")
        } else {
            format!("{SELECT_BOOK_CLUBS} WHERE {} {ORDER_BOOK_CLUBS}", clauses.join(" AND "))
        };

        let mut rows = self.conn.query(&query, params).await?;
        let mut book_clubs = Vec::new();

        while let Some(row) = rows.next().await? {
            book_clubs.push(row_to_book_club(&row)?);
        }

        Ok(book_clubs)
    }

    pub async fn search_book_clubs(&self, text: &str) -> Result<Vec<BookClubWithIntegration>, DbError> {
        let filters = BookClubFilters {
            search: Some(text.to_string()),
            ..Default::default()
        };
        self.list_book_clubs(&filters).await
    }

    /// Looks a book club up by identifier, falling back to its url.
    /// An identifier match wins if the key matches both.
    pub async fn get_book_club(&self, key: &str) -> Result<Option<BookClubWithIntegration>, DbError> {
        let query = format!(
            "{SELECT_BOOK_CLUBS} WHERE book_club.id = ? OR book_club.url = ? \
             ORDER BY (book_club.id = ?) DESC LIMIT 1"
        );

        let mut rows = self.conn.query(&query, libsql::params![key, key, key]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_book_club(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_integrations(&self) -> Result<Vec<Integration>, DbError> {
        let mut rows = self
            .conn
            .query("SELECT id, name FROM integration ORDER BY name ASC, id ASC", ())
            .await?;
        let mut integrations = Vec::new();

        while let Some(row) = rows.next().await? {
            integrations.push(Integration {
                id: row.get(0)?,
                name: row.get(1)?,
            });
        }

        Ok(integrations)
    }
}

fn row_to_book_club(row: &libsql::Row) -> Result<BookClubWithIntegration, DbError> {
    let date_str: String = row.get(4)?;
    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|e| DbError::Decode(format!("invalid book_club.date {:?}: {}", date_str, e)))?;

    let integration = match (row.get::<Option<i32>>(6)?, row.get::<Option<String>>(7)?) {
        (Some(id), Some(name)) => Some(Integration { id, name }),
        _ => None,
    };

    Ok(BookClubWithIntegration {
        book_club: BookClub {
            id: row.get(0)?,
            url: row.get(1)?,
            author: row.get(2)?,
            book: row.get(3)?,
            date,
            integration_id: row.get(5)?,
        },
        integration,
    })
}

/// `%text%` with LIKE metacharacters escaped by `\`.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::NewBookClub;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded() -> (Database, i32, i32) {
        let db = Database::in_memory().await.unwrap();
        let oprah = db.create_integration("Oprah's Book Club").await.unwrap().id;
        let reese = db.create_integration("Reese's Book Club").await.unwrap().id;

        let rows = [
            ("bc1", "/bc1", "Jane Doe", "Example Book", date(2024, 1, 15), oprah),
            ("bc2", "/bc2", "John Roe", "Another Story", date(2024, 2, 1), oprah),
            ("bc3", "/bc3", "Ann EXAMPLE", "Night Train", date(2024, 1, 15), reese),
            ("bc4", "/bc4", "Mo Shah", "100% Real_Facts", date(2023, 12, 31), reese),
        ];
        for (id, url, author, book, date, integration_id) in rows {
            db.upsert_book_club(&NewBookClub {
                id: id.to_string(),
                url: url.to_string(),
                author: author.to_string(),
                book: book.to_string(),
                date,
                integration_id,
            })
            .await
            .unwrap();
        }

        (db, oprah, reese)
    }

    fn ids(rows: &[BookClubWithIntegration]) -> Vec<&str> {
        rows.iter().map(|r| r.book_club.id.as_str()).collect()
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("100%_\\"), r"%100\%\_\\%");
    }

    #[tokio::test]
    async fn test_list_without_filters_returns_all_newest_first() {
        let (db, _, _) = seeded().await;
        let rows = Catalog::new(db.connection())
            .list_book_clubs(&BookClubFilters::default())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["bc2", "bc1", "bc3", "bc4"]);
    }

    #[tokio::test]
    async fn test_integration_filter_and_joined_name() {
        let (db, oprah, _) = seeded().await;
        let filters = BookClubFilters {
            integration: Some(oprah),
            ..Default::default()
        };
        let rows = Catalog::new(db.connection()).list_book_clubs(&filters).await.unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.book_club.integration_id, oprah);
            assert_eq!(row.integration_name(), Some("Oprah's Book Club"));
        }
    }

    #[tokio::test]
    async fn test_date_filters() {
        let (db, _, _) = seeded().await;
        let catalog = Catalog::new(db.connection());

        let exact = BookClubFilters {
            date: Some(date(2024, 1, 15)),
            ..Default::default()
        };
        let rows = catalog.list_book_clubs(&exact).await.unwrap();
        assert_eq!(ids(&rows), vec!["bc1", "bc3"]);
        assert!(rows.iter().all(|r| r.book_club.date == date(2024, 1, 15)));

        let range = BookClubFilters {
            start_date: Some(date(2024, 1, 1)),
            end_date: Some(date(2024, 1, 31)),
            ..Default::default()
        };
        let rows = catalog.list_book_clubs(&range).await.unwrap();
        assert_eq!(ids(&rows), vec!["bc1", "bc3"]);
    }

    #[tokio::test]
    async fn test_filters_compose() {
        let (db, _, reese) = seeded().await;
        let filters = BookClubFilters {
            integration: Some(reese),
            search: Some("example".to_string()),
            ..Default::default()
        };
        let rows = Catalog::new(db.connection()).list_book_clubs(&filters).await.unwrap();
        assert_eq!(ids(&rows), vec!["bc3"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_book_and_author() {
        let (db, _, _) = seeded().await;
        let rows = Catalog::new(db.connection()).search_book_clubs("eXaMpLe").await.unwrap();
        assert_eq!(ids(&rows), vec!["bc1", "bc3"]);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let (db, _, reese) = seeded().await;
        db.upsert_book_club(&NewBookClub {
            id: "bc5".to_string(),
            url: "/bc5".to_string(),
            author: "Émile Zola".to_string(),
            book: "ÉTÉ À PARIS".to_string(),
            date: date(2023, 6, 21),
            integration_id: reese,
        })
        .await
        .unwrap();
        let catalog = Catalog::new(db.connection());

        assert_eq!(ids(&catalog.search_book_clubs("émile").await.unwrap()), vec!["bc5"]);
        assert_eq!(ids(&catalog.search_book_clubs("été à").await.unwrap()), vec!["bc5"]);
        assert_eq!(ids(&catalog.search_book_clubs("ÉMILE ZOLA").await.unwrap()), vec!["bc5"]);
        assert_eq!(ids(&catalog.search_book_clubs("zola").await.unwrap()), vec!["bc5"]);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let (db, _, _) = seeded().await;
        let catalog = Catalog::new(db.connection());

        assert_eq!(ids(&catalog.search_book_clubs("%").await.unwrap()), vec!["bc4"]);
        assert_eq!(ids(&catalog.search_book_clubs("e_l").await.unwrap()), Vec::<&str>::new());
        assert_eq!(ids(&catalog.search_book_clubs("real_").await.unwrap()), vec!["bc4"]);
    }

    #[tokio::test]
    async fn test_empty_search_returns_everything() {
        let (db, _, _) = seeded().await;
        let rows = Catalog::new(db.connection()).search_book_clubs("").await.unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[tokio::test]
    async fn test_get_by_identifier_or_url() {
        let (db, oprah, _) = seeded().await;
        let catalog = Catalog::new(db.connection());

        let by_id = catalog.get_book_club("bc1").await.unwrap().unwrap();
        assert_eq!(by_id.book_club.url, "/bc1");
        assert_eq!(by_id.integration, Some(Integration { id: oprah, name: "Oprah's Book Club".into() }));

        let by_url = catalog.get_book_club("/bc2").await.unwrap().unwrap();
        assert_eq!(by_url.book_club.id, "bc2");

        assert!(catalog.get_book_club("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identifier_match_wins_over_url_match() {
        let (db, oprah, _) = seeded().await;
        db.upsert_book_club(&NewBookClub {
            id: "/bc1-alias".to_string(),
            url: "bc1".to_string(),
            author: "X".to_string(),
            book: "Y".to_string(),
            date: date(2020, 1, 1),
            integration_id: oprah,
        })
        .await
        .unwrap();

        let row = Catalog::new(db.connection()).get_book_club("bc1").await.unwrap().unwrap();
        assert_eq!(row.book_club.id, "bc1");
    }

    #[tokio::test]
    async fn test_list_integrations_sorted_by_name() {
        let (db, _, _) = seeded().await;
        let integrations = Catalog::new(db.connection()).list_integrations().await.unwrap();
        let names: Vec<_> = integrations.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Oprah's Book Club", "Reese's Book Club"]);
    }
}

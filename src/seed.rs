//! Administrative import of integrations and book clubs from a YAML file.
//!
//! This is the only write path into the catalog. The whole file is applied inside one
//! transaction: either every row lands or none do. Re-running the same file is a no-op.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::RESERVED_BOOK_CLUB_ID;
use crate::db::Database;
use crate::model::NewBookClub;
use crate::query::Catalog;

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub integrations: Vec<SeedIntegration>,
    #[serde(default)]
    pub book_clubs: Vec<SeedBookClub>,
}

#[derive(Debug, Deserialize)]
pub struct SeedIntegration {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedBookClub {
    pub id: String,
    pub url: String,
    pub author: String,
    pub book: String,
    pub date: NaiveDate,
    /// Integration name. Must be listed in the same file or already stored.
    pub integration: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub integrations: usize,
    pub book_clubs: usize,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let yaml_str =
            std::fs::read_to_string(path).with_context(|| format!("failed to read seed file {}", path.display()))?;
        Self::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }
}

pub async fn apply(db: &Database, seed: &SeedFile) -> Result<SeedReport> {
    let report = db
        .transaction(|db| async move {
            let mut ids: HashMap<String, i32> = Catalog::new(db.connection())
                .list_integrations()
                .await?
                .into_iter()
                .map(|i| (i.name, i.id))
                .collect();

            for integration in &seed.integrations {
                let created = db.create_integration(&integration.name).await?;
                tracing::debug!(id = created.id, name = %created.name, "seeded integration");
                ids.insert(created.name, created.id);
            }

            for entry in &seed.book_clubs {
                if entry.id == RESERVED_BOOK_CLUB_ID {
                    anyhow::bail!(
                        "book club id {:?} is reserved by the search endpoint and could never be fetched",
                        entry.id
                    );
                }

                let integration_id = *ids.get(&entry.integration).with_context(|| {
                    format!("book club {:?} references unknown integration {:?}", entry.id, entry.integration)
                })?;

                db.upsert_book_club(&NewBookClub {
                    id: entry.id.clone(),
                    url: entry.url.clone(),
                    author: entry.author.clone(),
                    book: entry.book.clone(),
                    date: entry.date,
                    integration_id,
                })
                .await
                .with_context(|| format!("failed to seed book club {:?}", entry.id))?;
            }

            Ok::<_, anyhow::Error>(SeedReport {
                integrations: seed.integrations.len(),
                book_clubs: seed.book_clubs.len(),
            })
        })
        .await?;

    db.sync().await?;
    tracing::info!(
        integrations = report.integrations,
        book_clubs = report.book_clubs,
        "seed applied"
    );
    Ok(report)
}

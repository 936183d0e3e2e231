use crate::config::Config;
use crate::error::DbError;
use crate::model::{DATE_FORMAT, Integration, NewBookClub, search_text};
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_schema.sql", include_str!("migrations/001_schema.sql")),
    ("002_search_text.sql", include_str!("migrations/002_search_text.sql")),
];

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    replicated: bool,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_replica(&self) -> bool {
        self.replicated
    }

    /// Pushes local writes to the remote primary. No-op for a purely local database.
    pub async fn sync(&self) -> Result<()> {
        if self.replicated {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());

        let (db, replicated) = match cfg.app.replica() {
            Some((url, token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                let db = Builder::new_synced_database(&path, url.to_string(), token.to_string())
                    .sync_interval(sync_interval)
                    .build()
                    .await?;
                (db, true)
            }
            None => {
                tracing::info!(path = ?path, "[db] running in local mode");
                (Builder::new_local(&path).build().await?, false)
            }
        };

        Self::open(db, replicated).await
    }

    /// Fresh private in-memory database, migrated and ready.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db, false).await
    }

    async fn open(db: LibsqlDatabase, replicated: bool) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        // SQLite leaves foreign keys (and so ON DELETE CASCADE) off per connection.
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Self::backfill_search_text(&conn).await?;

        Ok(Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            replicated,
        })
    }

    /// Fills `search_text` for rows written before the column existed.
    async fn backfill_search_text(conn: &Connection) -> Result<()> {
        let mut rows = conn
            .query("SELECT id, book, author FROM book_club WHERE search_text = ''", ())
            .await?;
        let mut pending: Vec<(String, String)> = Vec::new();

        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let book: String = row.get(1)?;
            let author: String = row.get(2)?;
            pending.push((id, search_text(&book, &author)));
        }

        if !pending.is_empty() {
            tracing::info!(rows = pending.len(), "backfilling book_club.search_text");
        }
        for (id, text) in pending {
            conn.execute(
                "UPDATE book_club SET search_text = ? WHERE id = ?",
                libsql::params![text, id],
            )
            .await?;
        }
        Ok(())
    }

    /// Runs `f` inside a single SQL transaction; rolls back if it fails.
    /// Concurrent callers are serialized.
    pub async fn transaction<'a, T, F, Fut>(&'a self, f: F) -> Result<T>
    where
        F: FnOnce(&'a Database) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match f(self).await {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Get-or-create by unique name.
    pub async fn create_integration(&self, name: &str) -> Result<Integration, DbError> {
        self.conn
            .execute(
                "INSERT INTO integration (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
                libsql::params![name],
            )
            .await?;

        let mut rows = self
            .conn
            .query("SELECT id, name FROM integration WHERE name = ? LIMIT 1", libsql::params![name])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Integration {
                id: row.get(0)?,
                name: row.get(1)?,
            }),
            None => Err(DbError::Integrity(format!("failed to get or create integration: {}", name))),
        }
    }

    /// Inserts a book club, or replaces the fields of the one with the same `id`.
    /// A `url` already owned by a different row, or an unknown integration, is an
    /// integrity error.
    pub async fn upsert_book_club(&self, input: &NewBookClub) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO book_club (id, url, author, book, date, integration_id, search_text)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                author = excluded.author,
                book = excluded.book,
                date = excluded.date,
                integration_id = excluded.integration_id,
                search_text = excluded.search_text
        "#;

        self.conn
            .execute(
                query,
                libsql::params![
                    input.id.as_str(),
                    input.url.as_str(),
                    input.author.as_str(),
                    input.book.as_str(),
                    input.date.format(DATE_FORMAT).to_string(),
                    input.integration_id,
                    search_text(&input.book, &input.author)
                ],
            )
            .await?;
        Ok(())
    }

    /// Deletes an integration and, through the foreign key, all of its book clubs.
    pub async fn delete_integration(&self, id: i32) -> Result<bool, DbError> {
        let affected = self
            .conn
            .execute("DELETE FROM integration WHERE id = ?", libsql::params![id])
            .await?;
        Ok(affected > 0)
    }
}

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::ports::{StoreError, TargetStore};
use crate::domain::{IdentityRow, InsertedRow, NormalizedService};
use crate::pipeline::processing::slug::identity_of;

/// Relational target store backed by SQLite.
///
/// Each `insert_batch` call runs in its own transaction, so a failing batch leaves
/// none of its rows behind. JSON-shaped columns (`images`, `tags`) are stored as text.
pub struct SqliteTargetStore {
    conn: Mutex<Connection>,
}

impl SqliteTargetStore {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened target store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Create the services table with the column layout the adapter writes.
    /// Used by tests and local fixtures; production schemas are managed elsewhere.
    pub fn create_table(&self, table: &str) -> Result<(), StoreError> {
        let table = quoted_identifier(table)?;
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                slug          TEXT,
                category      TEXT,
                category_slug TEXT,
                description   TEXT,
                images        TEXT,
                rating        REAL NOT NULL DEFAULT 4.2,
                neighborhood  TEXT,
                district      TEXT,
                active        INTEGER NOT NULL DEFAULT 1,
                tags          TEXT NOT NULL DEFAULT '[]',
                country       TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );
            "#
        ))
        .map_err(classify)
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let table = quoted_identifier(table)?;
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(classify)?;
        Ok(count as usize)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

/// Only plain identifiers are accepted as table names; they are interpolated into SQL.
fn quoted_identifier(table: &str) -> Result<String, StoreError> {
    let valid = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(format!("\"{}\"", table))
    } else {
        Err(StoreError::Rejected(format!("invalid table name {:?}", table)))
    }
}

fn classify(e: rusqlite::Error) -> StoreError {
    let message = e.to_string();
    if let Some(rest) = message.strip_prefix("no such table: ") {
        StoreError::SchemaMissing(rest.trim_matches('"').to_string())
    } else if message.contains("no such table") {
        StoreError::SchemaMissing(message)
    } else {
        StoreError::Rejected(message)
    }
}

/// Column/value pairs for one service; absent optionals are left out so column
/// defaults apply.
fn row_values(
    id: &str,
    service: &NormalizedService,
    created_at: &str,
) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
    let mut cols: Vec<(&'static str, SqlValue)> = vec![
        ("id", SqlValue::Text(id.to_string())),
        ("name", SqlValue::Text(service.name.clone())),
        ("rating", SqlValue::Real(service.rating)),
        ("active", SqlValue::Integer(i64::from(service.active))),
        ("tags", SqlValue::Text(json_text(&service.tags)?)),
        ("country", SqlValue::Text(service.country.clone())),
        ("created_at", SqlValue::Text(created_at.to_string())),
    ];

    if let Some(slug) = identity_of(&service.name) {
        cols.push(("slug", SqlValue::Text(slug)));
    }
    let optional_text = [
        ("category", &service.category),
        ("category_slug", &service.category_slug),
        ("description", &service.description),
        ("neighborhood", &service.neighborhood),
        ("district", &service.district),
    ];
    for (col, value) in optional_text {
        if let Some(v) = value {
            cols.push((col, SqlValue::Text(v.clone())));
        }
    }
    if let Some(images) = &service.images {
        cols.push(("images", SqlValue::Text(json_text(images)?)));
    }
    Ok(cols)
}

fn json_text<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Rejected(e.to_string()))
}

#[async_trait]
impl TargetStore for SqliteTargetStore {
    async fn select_identities(&self, table: &str) -> Result<Vec<IdentityRow>, StoreError> {
        let quoted = quoted_identifier(table)?;
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!("SELECT name, slug FROM {quoted}"))
            .map_err(classify)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(IdentityRow {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                })
            })
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        debug!(table, rows = rows.len(), "Selected identities");
        Ok(rows)
    }

    async fn insert_batch(
        &self,
        table: &str,
        rows: &[NormalizedService],
    ) -> Result<Vec<InsertedRow>, StoreError> {
        let quoted = quoted_identifier(table)?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(classify)?;

        let mut acks = Vec::with_capacity(rows.len());
        for service in rows {
            let id = Uuid::new_v4().to_string();
            let cols = row_values(&id, service, &created_at)?;
            let names: Vec<&str> = cols.iter().map(|(c, _)| *c).collect();
            let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted,
                names.join(", "),
                placeholders.join(", ")
            );
            tx.execute(&sql, params_from_iter(cols.into_iter().map(|(_, v)| v)))
                .map_err(classify)?;
            acks.push(InsertedRow {
                inserted_id: id,
                name: service.name.clone(),
            });
        }

        tx.commit().map_err(classify)?;
        debug!(table, rows = acks.len(), "Committed batch");
        Ok(acks)
    }
}

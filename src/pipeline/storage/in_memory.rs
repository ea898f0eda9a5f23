use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::{SourceStore, StoreError, TargetStore};
use crate::domain::{IdentityRow, InsertedRow, NormalizedService, SourceRecord};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory source store for development/testing
#[derive(Default)]
pub struct InMemorySourceStore {
    collections: Arc<Mutex<HashMap<String, Vec<SourceRecord>>>>,
    fail_reads: Arc<Mutex<bool>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(collection: &str, records: Vec<SourceRecord>) -> Self {
        let store = Self::new();
        store.put_collection(collection, records);
        store
    }

    pub fn put_collection(&self, collection: &str, records: Vec<SourceRecord>) {
        locked(&self.collections).insert(collection.to_string(), records);
    }

    /// Make every subsequent read fail outright.
    pub fn fail_reads(&self) {
        *locked(&self.fail_reads) = true;
    }
}

#[async_trait]
impl SourceStore for InMemorySourceStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<SourceRecord>, StoreError> {
        if *locked(&self.fail_reads) {
            return Err(StoreError::Unavailable("source reads disabled".to_string()));
        }
        locked(&self.collections)
            .get(collection)
            .cloned()
            .ok_or_else(|| StoreError::SchemaMissing(collection.to_string()))
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    id: String,
    slug: Option<String>,
    service: Option<NormalizedService>,
    name: String,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Fail,
    DropRows(usize),
    Delay(Duration),
}

/// In-memory target store for development/testing.
///
/// Records every insert call so tests can check chunk sizes, and can inject faults
/// on a given 1-based call number.
#[derive(Default)]
pub struct InMemoryTargetStore {
    tables: Arc<Mutex<HashMap<String, Vec<StoredRow>>>>,
    insert_calls: Arc<Mutex<Vec<usize>>>,
    select_calls: Arc<Mutex<usize>>,
    faults: Arc<Mutex<HashMap<usize, Fault>>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: &str) -> Self {
        let store = Self::new();
        store.create_table(table);
        store
    }

    pub fn create_table(&self, table: &str) {
        locked(&self.tables).entry(table.to_string()).or_default();
    }

    /// Pre-populate identities as if rows had been migrated earlier.
    pub fn seed_identities(&self, table: &str, rows: Vec<IdentityRow>) {
        let mut tables = locked(&self.tables);
        let stored = tables.entry(table.to_string()).or_default();
        stored.extend(rows.into_iter().map(|row| StoredRow {
            id: Uuid::new_v4().to_string(),
            slug: row.slug,
            service: None,
            name: row.name,
        }));
    }

    pub fn fail_on_call(&self, call: usize) {
        locked(&self.faults).insert(call, Fault::Fail);
    }

    /// Acknowledge `dropped` fewer rows than sent on the given call.
    pub fn drop_silently_on_call(&self, call: usize, dropped: usize) {
        locked(&self.faults).insert(call, Fault::DropRows(dropped));
    }

    pub fn delay_call(&self, call: usize, delay: Duration) {
        locked(&self.faults).insert(call, Fault::Delay(delay));
    }

    /// Sizes of every insert call issued, including failed ones.
    pub fn insert_call_sizes(&self) -> Vec<usize> {
        locked(&self.insert_calls).clone()
    }

    pub fn select_calls(&self) -> usize {
        *locked(&self.select_calls)
    }

    pub fn row_count(&self, table: &str) -> usize {
        locked(&self.tables).get(table).map_or(0, Vec::len)
    }

    /// Services inserted through `insert_batch`, in insertion order.
    pub fn inserted_services(&self, table: &str) -> Vec<NormalizedService> {
        locked(&self.tables)
            .get(table)
            .map(|rows| rows.iter().filter_map(|r| r.service.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn select_identities(&self, table: &str) -> Result<Vec<IdentityRow>, StoreError> {
        *locked(&self.select_calls) += 1;
        let tables = locked(&self.tables);
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::SchemaMissing(table.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| IdentityRow {
                name: r.name.clone(),
                slug: r.slug.clone(),
            })
            .collect())
    }

    async fn insert_batch(
        &self,
        table: &str,
        rows: &[NormalizedService],
    ) -> Result<Vec<InsertedRow>, StoreError> {
        let call = {
            let mut calls = locked(&self.insert_calls);
            calls.push(rows.len());
            calls.len()
        };
        let fault = locked(&self.faults).get(&call).copied();

        if !locked(&self.tables).contains_key(table) {
            return Err(StoreError::SchemaMissing(table.to_string()));
        }

        let keep = match fault {
            Some(Fault::Fail) => {
                return Err(StoreError::Rejected(format!("injected failure on call {}", call)))
            }
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                rows.len()
            }
            Some(Fault::DropRows(dropped)) => rows.len().saturating_sub(dropped),
            None => rows.len(),
        };

        let mut tables = locked(&self.tables);
        let stored = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::SchemaMissing(table.to_string()))?;

        let mut acks = Vec::with_capacity(keep);
        for service in &rows[..keep] {
            let row = StoredRow {
                id: Uuid::new_v4().to_string(),
                slug: None,
                service: Some(service.clone()),
                name: service.name.clone(),
            };
            acks.push(InsertedRow {
                inserted_id: row.id.clone(),
                name: row.name.clone(),
            });
            stored.push(row);
        }

        debug!(table, call, rows = acks.len(), "Inserted batch");
        Ok(acks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn source_returns_records_in_insertion_order() {
        let store = InMemorySourceStore::with_collection(
            "services",
            vec![
                SourceRecord::from_value("b", json!({"name": "B"})),
                SourceRecord::from_value("a", json!({"name": "A"})),
            ],
        );
        let records = store.read_all("services").await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);

        assert_eq!(
            store.read_all("missing").await.unwrap_err(),
            StoreError::SchemaMissing("missing".to_string())
        );
    }

    #[tokio::test]
    async fn failed_call_commits_nothing() {
        let target = InMemoryTargetStore::with_table("services");
        target.fail_on_call(1);
        let service = NormalizedService {
            name: "Uno".to_string(),
            category: None,
            category_slug: None,
            description: None,
            images: None,
            rating: 4.2,
            neighborhood: None,
            district: None,
            active: true,
            tags: vec![],
            country: "pe".to_string(),
        };

        assert!(target.insert_batch("services", &[service.clone()]).await.is_err());
        assert_eq!(target.row_count("services"), 0);

        let acks = target.insert_batch("services", &[service]).await.unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(target.row_count("services"), 1);
        assert_eq!(target.insert_call_sizes(), vec![1, 1]);
    }
}

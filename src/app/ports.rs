use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{IdentityRow, InsertedRow, NormalizedService, SourceRecord};

/// Failures reported by store adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The table or collection does not exist in the store.
    #[error("table or collection '{0}' does not exist")]
    SchemaMissing(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request; for batch writes nothing from the batch was kept.
    #[error("store rejected request: {0}")]
    Rejected(String),
}

// Source-side port
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Read the whole collection in the store's natural enumeration order.
    async fn read_all(&self, collection: &str) -> Result<Vec<SourceRecord>, StoreError>;
}

// Target-side port
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Bounded, projection-only read of identities already present in `table`.
    async fn select_identities(&self, table: &str) -> Result<Vec<IdentityRow>, StoreError>;

    /// Insert one batch. All-or-nothing: on error no row of the batch is committed.
    async fn insert_batch(
        &self,
        table: &str,
        rows: &[NormalizedService],
    ) -> Result<Vec<InsertedRow>, StoreError>;
}

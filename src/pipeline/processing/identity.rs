use std::collections::HashSet;
use tracing::{info, instrument};

use crate::app::ports::{StoreError, TargetStore};
use crate::error::{MigrationError, Result};
use crate::pipeline::processing::slug::identity_of;

/// Slug-form identities already present in the target store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityIndex {
    slugs: HashSet<String>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the slug of `text`. Returns false when the text has no stable identity.
    pub fn insert_text(&mut self, text: &str) -> bool {
        match identity_of(text) {
            Some(slug) => {
                self.slugs.insert(slug);
                true
            }
            None => false,
        }
    }

    pub fn contains_slug(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for IdentityIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut index = IdentityIndex::new();
        for text in iter {
            index.insert_text(text.as_ref());
        }
        index
    }
}

/// Build the existing-target index with a single projection read.
///
/// A missing table aborts the run: treating it as empty would re-insert everything
/// once the schema shows up out-of-band.
#[instrument(skip(target))]
pub async fn load_existing_identities(target: &dyn TargetStore, table: &str) -> Result<IdentityIndex> {
    let rows = target.select_identities(table).await.map_err(|e| match e {
        StoreError::SchemaMissing(name) => MigrationError::config(
            format!("target table '{}' does not exist", name),
            "create the target table before migrating",
        ),
        other => MigrationError::Database {
            message: format!("failed to read existing identities from '{}': {}", table, other),
        },
    })?;

    let mut index = IdentityIndex::new();
    for row in &rows {
        index.insert_text(&row.name);
        if let Some(slug) = &row.slug {
            index.insert_text(slug);
        }
    }

    info!(rows = rows.len(), identities = index.len(), "Loaded existing target identities");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentityRow;
    use crate::pipeline::storage::in_memory::InMemoryTargetStore;

    #[test]
    fn index_stores_slug_form() {
        let index: IdentityIndex = ["Café Lima", "  BODEGA   central ", "!!!"].into_iter().collect();
        assert_eq!(index.len(), 2);
        assert!(index.contains_slug("cafe-lima"));
        assert!(index.contains_slug("bodega-central"));
    }

    #[tokio::test]
    async fn loads_names_and_slugs() {
        let target = InMemoryTargetStore::with_table("services");
        target.seed_identities(
            "services",
            vec![
                IdentityRow { name: "Café Lima".to_string(), slug: None },
                IdentityRow { name: "Otro Nombre".to_string(), slug: Some("Bodega-Sur".to_string()) },
            ],
        );

        let index = load_existing_identities(&target, "services").await.unwrap();
        assert!(index.contains_slug("cafe-lima"));
        assert!(index.contains_slug("otro-nombre"));
        assert!(index.contains_slug("bodega-sur"));
        assert_eq!(target.select_calls(), 1);
    }

    #[tokio::test]
    async fn missing_table_is_a_configuration_error() {
        let target = InMemoryTargetStore::new();
        let err = load_existing_identities(&target, "services").await.unwrap_err();
        assert!(matches!(err, MigrationError::Configuration { .. }));
    }
}

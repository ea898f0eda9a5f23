use serde::{Deserialize, Serialize};

use crate::domain::SourceRecord;
use serde_json::Value;

/// Ordered alias list for one canonical field. The first path that resolves to a
/// usable value wins; later paths are only consulted when earlier ones miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasChain(Vec<String>);

impl AliasChain {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    /// First value along the chain accepted by `accept`.
    pub fn resolve<'a, T>(
        &self,
        record: &'a SourceRecord,
        accept: impl Fn(&'a Value) -> Option<T>,
    ) -> Option<T> {
        self.0
            .iter()
            .filter_map(|path| record.lookup(path))
            .find_map(accept)
    }
}

/// Alias precedence table for every canonical field.
///
/// The legacy migration scripts differed only in these chains, so each of them is
/// a rule table rather than a separate code path. Deserialized from the `[rules]`
/// section of the config; omitted fields keep their default chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizationRules {
    pub name: AliasChain,
    pub category: AliasChain,
    pub category_slug: AliasChain,
    pub description: AliasChain,
    pub images: AliasChain,
    pub rating: AliasChain,
    pub neighborhood: AliasChain,
    pub district: AliasChain,
    pub active: AliasChain,
    pub tags: AliasChain,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            name: AliasChain::new(["name", "title"]),
            category: AliasChain::new(["category"]),
            category_slug: AliasChain::new(["categorySlug", "category_slug"]),
            description: AliasChain::new(["description"]),
            images: AliasChain::new(["images", "image"]),
            rating: AliasChain::new(["rating"]),
            neighborhood: AliasChain::new(["neighborhood", "barrio", "location.barrio"]),
            district: AliasChain::new(["district", "location.district"]),
            active: AliasChain::new(["active"]),
            tags: AliasChain::new(["tags", "tag"]),
        }
    }
}

use std::collections::HashSet;
use tracing::debug;

use crate::domain::{NormalizedService, SourceRecord};
use crate::pipeline::processing::identity::IdentityIndex;
use crate::pipeline::processing::slug::identity_of;

/// Why a candidate did not make it to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Identity already present in the target store.
    AlreadyMigrated,
    /// An earlier record in this run had the same identity.
    DuplicateInRun,
    /// Name slugified to nothing.
    NoIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub source_id: String,
    pub name: String,
    pub reason: SkipReason,
}

/// Result of filtering one run's candidates.
#[derive(Debug, Clone, Default)]
pub struct DedupeOutcome {
    /// Survivors in source order
    pub kept: Vec<NormalizedService>,
    pub skipped: Vec<SkippedRecord>,
}

impl DedupeOutcome {
    pub fn count(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }

    /// Skips caused by an identity collision, either with the target or within the run.
    pub fn duplicates(&self) -> usize {
        self.count(SkipReason::AlreadyMigrated) + self.count(SkipReason::DuplicateInRun)
    }
}

/// Drops candidates whose name identity already exists, in the target or earlier in the run.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    skip_unidentifiable: bool,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            skip_unidentifiable: true,
        }
    }
}

impl Deduplicator {
    pub fn new(skip_unidentifiable: bool) -> Self {
        Self { skip_unidentifiable }
    }

    /// Iterates in the given order; the first occurrence of an identity wins.
    pub fn dedupe(
        &self,
        records: Vec<(SourceRecord, NormalizedService)>,
        existing: &IdentityIndex,
    ) -> DedupeOutcome {
        let mut seen: HashSet<String> = HashSet::new();
        let mut outcome = DedupeOutcome::default();

        for (source, service) in records {
            let reason = match identity_of(&service.name) {
                None if self.skip_unidentifiable => Some(SkipReason::NoIdentity),
                None => None,
                Some(slug) if existing.contains_slug(&slug) => Some(SkipReason::AlreadyMigrated),
                Some(slug) => {
                    if seen.insert(slug) {
                        None
                    } else {
                        Some(SkipReason::DuplicateInRun)
                    }
                }
            };

            match reason {
                Some(reason) => {
                    debug!(source_id = %source.id, name = %service.name, ?reason, "Skipping record");
                    outcome.skipped.push(SkippedRecord {
                        source_id: source.id,
                        name: service.name,
                        reason,
                    });
                }
                None => outcome.kept.push(service),
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Country;
    use crate::pipeline::processing::normalize::Normalizer;
    use serde_json::json;

    fn candidates(docs: &[(&str, serde_json::Value)]) -> Vec<(SourceRecord, NormalizedService)> {
        let normalizer = Normalizer::default();
        let country = Country::parse("pe").unwrap();
        docs.iter()
            .map(|(id, value)| {
                let source = SourceRecord::from_value(*id, value.clone());
                let service = normalizer.normalize(&source, &country);
                (source, service)
            })
            .collect()
    }

    #[test]
    fn existing_name_is_skipped() {
        let existing: IdentityIndex = ["Café Lima"].into_iter().collect();
        let records = candidates(&[("a", json!({"name": "Café Lima", "barrio": "Miraflores"}))]);

        let outcome = Deduplicator::default().dedupe(records, &existing);

        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.count(SkipReason::AlreadyMigrated), 1);
        assert_eq!(outcome.duplicates(), 1);
    }

    #[test]
    fn first_occurrence_wins_within_a_run() {
        let records = candidates(&[
            ("first", json!({"name": "Bodega Sur", "rating": 4.0})),
            ("second", json!({"name": "BODEGA  SÚR", "rating": 3.0})),
            ("third", json!({"name": "Ferretería"})),
        ]);

        let outcome = Deduplicator::default().dedupe(records, &IdentityIndex::new());

        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[0].name, "Bodega Sur");
        assert_eq!(outcome.kept[0].rating, 4.0);
        assert_eq!(outcome.kept[1].name, "Ferretería");
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].source_id, "second");
        assert_eq!(outcome.skipped[0].reason, SkipReason::DuplicateInRun);
    }

    #[test]
    fn unidentifiable_names_are_not_counted_as_duplicates() {
        let records = candidates(&[("a", json!({"name": "★★★"})), ("b", json!({"name": "!!!"}))]);

        let skipping = Deduplicator::default().dedupe(records.clone(), &IdentityIndex::new());
        assert!(skipping.kept.is_empty());
        assert_eq!(skipping.count(SkipReason::NoIdentity), 2);
        assert_eq!(skipping.duplicates(), 0);

        let keeping = Deduplicator::new(false).dedupe(records, &IdentityIndex::new());
        assert_eq!(keeping.kept.len(), 2);
        assert!(keeping.skipped.is_empty());
    }

    #[test]
    fn order_of_survivors_follows_source_order() {
        let records = candidates(&[
            ("1", json!({"name": "C"})),
            ("2", json!({"name": "A"})),
            ("3", json!({"name": "B"})),
        ]);
        let outcome = Deduplicator::default().dedupe(records, &IdentityIndex::new());
        let names: Vec<_> = outcome.kept.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["C", "A", "B"]);
    }
}

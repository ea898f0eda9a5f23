use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::app::ports::TargetStore;
use crate::domain::NormalizedService;
use crate::error::MigrationError;
use crate::observability::metrics;

/// Outcome of a fully successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows acknowledged by the target store
    pub inserted: usize,
    /// Insert calls issued
    pub chunks: usize,
}

/// Writes services in bounded chunks, one awaited call at a time, stopping at the
/// first failure. Earlier chunks stay committed.
#[derive(Debug, Clone)]
pub struct ChunkedLoader {
    chunk_size: NonZeroUsize,
    chunk_timeout: Option<Duration>,
}

impl ChunkedLoader {
    pub fn new(chunk_size: NonZeroUsize) -> Self {
        Self {
            chunk_size,
            chunk_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Number of insert calls needed for `records` rows.
    pub fn planned_chunks(&self, records: usize) -> usize {
        records.div_ceil(self.chunk_size.get())
    }

    /// Insert `records` into `table`.
    ///
    /// The committed count comes from the store's acknowledgments, not from the input
    /// length. A short acknowledgment counts as a failed chunk.
    #[instrument(skip(self, target, records), fields(records = records.len(), chunk_size = self.chunk_size.get()))]
    pub async fn load(
        &self,
        target: &dyn TargetStore,
        table: &str,
        records: &[NormalizedService],
    ) -> Result<LoadReport, MigrationError> {
        let total_chunks = self.planned_chunks(records.len());
        let mut report = LoadReport::default();

        for (chunk_index, chunk) in records.chunks(self.chunk_size.get()).enumerate() {
            let started = Instant::now();
            let call = target.insert_batch(table, chunk);
            let result = match self.chunk_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", limit)),
                },
                None => call.await.map_err(|e| e.to_string()),
            };
            report.chunks += 1;
            metrics::load::chunk_duration(started.elapsed().as_secs_f64());

            let acknowledged = match result {
                Ok(acks) => acks,
                Err(reason) => {
                    error!(chunk_index, committed = report.inserted, %reason, "Chunk write failed, aborting load");
                    metrics::load::chunk_failed();
                    return Err(MigrationError::LoadChunk {
                        chunk_index,
                        committed: report.inserted,
                        reason,
                    });
                }
            };

            let accepted = acknowledged.len();
            report.inserted += accepted;
            metrics::load::rows_inserted(accepted);

            if accepted != chunk.len() {
                warn!(chunk_index, sent = chunk.len(), accepted, "Target acknowledged fewer rows than sent");
                metrics::load::chunk_failed();
                return Err(MigrationError::LoadChunk {
                    chunk_index,
                    committed: report.inserted,
                    reason: format!(
                        "target acknowledged {} of {} rows",
                        accepted,
                        chunk.len()
                    ),
                });
            }

            info!(
                chunk = chunk_index + 1,
                of = total_chunks,
                rows = accepted,
                committed = report.inserted,
                "Chunk committed"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::in_memory::InMemoryTargetStore;

    fn services(n: usize) -> Vec<NormalizedService> {
        (0..n)
            .map(|i| NormalizedService {
                name: format!("Servicio {i}"),
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
            })
            .collect()
    }

    fn loader(size: usize) -> ChunkedLoader {
        ChunkedLoader::new(NonZeroUsize::new(size).unwrap())
    }

    #[tokio::test]
    async fn chunk_count_law() {
        for (n, c) in [(0, 100), (1, 100), (100, 100), (101, 100), (250, 100), (7, 3), (9, 3)] {
            let target = InMemoryTargetStore::with_table("services");
            let report = loader(c).load(&target, "services", &services(n)).await.unwrap();

            let sizes = target.insert_call_sizes();
            assert_eq!(sizes.len(), n.div_ceil(c), "n={n} c={c}");
            if n > 0 {
                let expected_last = if n % c == 0 { c } else { n % c };
                assert_eq!(*sizes.last().unwrap(), expected_last, "n={n} c={c}");
            }
            assert_eq!(report.inserted, n);
            assert_eq!(report.chunks, sizes.len());
        }
    }

    #[tokio::test]
    async fn second_chunk_failure_aborts() {
        let target = InMemoryTargetStore::with_table("services");
        target.fail_on_call(2);

        let err = loader(100)
            .load(&target, "services", &services(250))
            .await
            .unwrap_err();

        match err {
            MigrationError::LoadChunk {
                chunk_index,
                committed,
                ..
            } => {
                assert_eq!(chunk_index, 1);
                assert_eq!(committed, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(target.insert_call_sizes(), vec![100, 100]);
        assert_eq!(target.row_count("services"), 100);
    }

    #[tokio::test]
    async fn short_acknowledgment_is_detected() {
        let target = InMemoryTargetStore::with_table("services");
        target.drop_silently_on_call(1, 2);

        let err = loader(5).load(&target, "services", &services(10)).await.unwrap_err();

        match err {
            MigrationError::LoadChunk { chunk_index, committed, .. } => {
                assert_eq!(chunk_index, 0);
                assert_eq!(committed, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(target.insert_call_sizes(), vec![5]);
    }

    #[tokio::test]
    async fn chunk_timeout_aborts_like_a_failure() {
        let target = InMemoryTargetStore::with_table("services");
        target.delay_call(2, Duration::from_millis(200));

        let err = loader(2)
            .with_timeout(Some(Duration::from_millis(20)))
            .load(&target, "services", &services(6))
            .await
            .unwrap_err();

        match err {
            MigrationError::LoadChunk { chunk_index, committed, reason } => {
                assert_eq!(chunk_index, 1);
                assert_eq!(committed, 2);
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(target.insert_call_sizes().len(), 2);
    }
}

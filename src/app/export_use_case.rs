use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::app::ports::SourceStore;
use crate::constants::CSV_COLUMNS;
use crate::domain::{Country, NormalizedService, SourceRecord};
use crate::error::{MigrationError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::Normalizer;

/// Where the three artifacts of an export landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub raw_path: PathBuf,
    pub normalized_path: PathBuf,
    pub csv_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Normalized export row: the service plus the document it came from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedService<'a> {
    source_id: &'a str,
    #[serde(flatten)]
    service: &'a NormalizedService,
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    file: String,
    sha256: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct Manifest {
    collection: String,
    country: String,
    records: usize,
    exported_at: DateTime<Utc>,
    artifacts: Vec<ManifestEntry>,
}

/// Snapshots a source collection to disk for audit. Never touches the target store.
pub struct ExportUseCase {
    normalizer: Normalizer,
    country: Country,
}

impl ExportUseCase {
    pub fn new(normalizer: Normalizer, country: Country) -> Self {
        Self { normalizer, country }
    }

    /// Read `collection` once and write raw JSON, normalized JSON, CSV and a manifest
    /// into `output_dir`, overwriting previous artifacts.
    #[instrument(skip(self, source), fields(country = %self.country))]
    pub async fn export_all(
        &self,
        source: &dyn SourceStore,
        collection: &str,
        output_dir: &Path,
    ) -> Result<ExportPaths> {
        let records = source.read_all(collection).await.map_err(|e| {
            metrics::source::read_error();
            MigrationError::SourceRead(format!("collection '{}': {}", collection, e))
        })?;
        metrics::source::records_read(records.len());

        fs::create_dir_all(output_dir).map_err(|e| MigrationError::export_write(output_dir, e))?;

        let normalized: Vec<NormalizedService> = records
            .iter()
            .map(|r| self.normalizer.normalize(r, &self.country))
            .collect();

        let paths = ExportPaths {
            raw_path: output_dir.join(format!("{}_raw.json", collection)),
            normalized_path: output_dir.join(format!("{}_normalized.json", collection)),
            csv_path: output_dir.join(format!("{}.csv", collection)),
            manifest_path: output_dir.join(format!("{}_manifest.json", collection)),
        };

        let raw: Vec<Value> = records.iter().map(SourceRecord::to_raw_json).collect();
        let raw_bytes = serde_json::to_vec_pretty(&raw)?;
        write_artifact(&paths.raw_path, &raw_bytes, "raw_json")?;

        let exported: Vec<ExportedService<'_>> = records
            .iter()
            .zip(&normalized)
            .map(|(r, s)| ExportedService {
                source_id: &r.id,
                service: s,
            })
            .collect();
        let normalized_bytes = serde_json::to_vec_pretty(&exported)?;
        write_artifact(&paths.normalized_path, &normalized_bytes, "normalized_json")?;

        let csv_bytes = render_csv(records.iter().zip(&normalized))?;
        write_artifact(&paths.csv_path, &csv_bytes, "csv")?;

        let manifest = Manifest {
            collection: collection.to_string(),
            country: self.country.to_string(),
            records: records.len(),
            exported_at: Utc::now(),
            artifacts: vec![
                manifest_entry(&paths.raw_path, &raw_bytes),
                manifest_entry(&paths.normalized_path, &normalized_bytes),
                manifest_entry(&paths.csv_path, &csv_bytes),
            ],
        };
        write_artifact(&paths.manifest_path, &serde_json::to_vec_pretty(&manifest)?, "manifest")?;

        info!(
            records = records.len(),
            dir = %output_dir.display(),
            "Export complete"
        );
        Ok(paths)
    }
}

fn write_artifact(path: &Path, bytes: &[u8], kind: &str) -> Result<()> {
    fs::write(path, bytes).map_err(|e| MigrationError::export_write(path, e))?;
    metrics::export::artifact_written(kind);
    Ok(())
}

fn manifest_entry(path: &Path, bytes: &[u8]) -> ManifestEntry {
    let digest = Sha256::digest(bytes);
    ManifestEntry {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256: hex::encode(digest),
        bytes: bytes.len(),
    }
}

/// CSV over the fixed column list. Every field is quoted and inner quotes doubled;
/// strings go in verbatim, other values JSON-stringified, absent values empty.
fn render_csv<'a>(
    rows: impl Iterator<Item = (&'a SourceRecord, &'a NormalizedService)>,
) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;

    for (record, service) in rows {
        let value = serde_json::to_value(service)?;
        let fields = CSV_COLUMNS.iter().map(|column| match *column {
            "id" => record.id.clone(),
            other => value.get(other).map(csv_field).unwrap_or_default(),
        });
        writer.write_record(fields)?;
    }

    writer
        .into_inner()
        .map_err(|e| MigrationError::Io(e.into_error()))
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

//! Defaults shared by the normalizer, loader and CLI.

/// Name assigned to services whose source record carries no usable name.
pub const DEFAULT_SERVICE_NAME: &str = "Servicio";

/// Rating assigned when the source record has no numeric rating.
pub const DEFAULT_RATING: f64 = 4.2;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

pub const DEFAULT_COLLECTION: &str = "services";
pub const DEFAULT_TARGET_TABLE: &str = "services";
pub const DEFAULT_OUTPUT_DIR: &str = "exports";
pub const DEFAULT_CONFIG_PATH: &str = "service_sync.toml";

// Environment overrides
pub const ENV_COUNTRY: &str = "SERVICE_SYNC_COUNTRY";
pub const ENV_CHUNK_SIZE: &str = "SERVICE_SYNC_CHUNK_SIZE";

/// Fixed CSV header for the export sidecar. Extra source fields never widen it.
pub const CSV_COLUMNS: [&str; 12] = [
    "id",
    "name",
    "category",
    "categorySlug",
    "description",
    "images",
    "rating",
    "neighborhood",
    "district",
    "active",
    "tags",
    "country",
];

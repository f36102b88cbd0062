//! Migration run configuration.

use std::path::PathBuf;

/// Settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory containing the exported collections.
    pub export_dir: PathBuf,
    /// Target SQLite database path.
    pub database: PathBuf,
    /// Name of the durable identifier-map audit table.
    pub id_map_table: String,
    /// Batch size for identifier-map persistence.
    pub id_map_chunk: usize,
}

impl MigrationConfig {
    /// Default name of the identifier-map audit table.
    pub const DEFAULT_ID_MAP_TABLE: &'static str = "id_map";
    /// Default insert batch size for the identifier-map table.
    pub const DEFAULT_ID_MAP_CHUNK: usize = 30;
    /// Collection holding serialized model definitions.
    pub const MODEL_DEF_COLLECTION: &'static str = "core_store";
    /// Key prefix identifying model-definition entries in that collection.
    pub const MODEL_DEF_PREFIX: &'static str = "model_def";

    /// Create a configuration with default table naming and batching.
    pub fn new(export_dir: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            database: database.into(),
            id_map_table: Self::DEFAULT_ID_MAP_TABLE.to_string(),
            id_map_chunk: Self::DEFAULT_ID_MAP_CHUNK,
        }
    }
}

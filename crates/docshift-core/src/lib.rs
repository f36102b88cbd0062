//! docshift-core — schema-driven document-store to relational-store
//! migration engine.
//!
//! The engine converts an exported document store (collections of
//! nested JSON documents, relations expressed as embedded references)
//! into a normalized SQLite database: surrogate integer keys,
//! foreign-key columns, join tables and polymorphic morph tables. The
//! source's own model definitions drive the conversion; relation
//! cardinality is inferred from each attribute together with its
//! reciprocal on the target model.
//!
//! # Example
//!
//! ```rust,ignore
//! use docshift_core::{
//!     ExportDirSource, MigrationConfig, Migrator, ModelCatalog, SqliteSink, source,
//! };
//!
//! fn main() -> docshift_core::Result<()> {
//!     let config = MigrationConfig::new("export", "target.db");
//!     let src = ExportDirSource::new(&config.export_dir);
//!     let blobs = source::read_model_defs(
//!         &src,
//!         MigrationConfig::MODEL_DEF_COLLECTION,
//!         MigrationConfig::MODEL_DEF_PREFIX,
//!     )?;
//!     let catalog = ModelCatalog::load_all(blobs)?;
//!
//!     let mut sink = SqliteSink::open(&config.database)?;
//!     let report = Migrator::new(&catalog, &config).run(&src, &mut sink)?;
//!     println!("migrated {} rows, {} links", report.rows_created, report.links_created);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod idmap;
pub mod link;
pub mod migrate;
pub mod naming;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export commonly used types
pub use catalog::{Attribute, AttributeDef, JoinSpec, LinkKind, Model, ModelCatalog, ModelDef};
pub use config::MigrationConfig;
pub use error::{MigrateError, Result};
pub use idmap::{IdEntry, IdMap, SealedIdMap};
pub use link::{Emit, LinkEmitter, SkipReason};
pub use migrate::{MigrationReport, Migrator};
pub use sink::{RelationalSink, SqlRow, SqlValue, SqliteSink};
pub use source::{DocStream, DocumentSource, ExportDirSource};

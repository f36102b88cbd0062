//! Two-pass migration orchestration.
//!
//! Pass 1 creates one base row per document and allocates every
//! surrogate id; the identifier map is then sealed and Pass 2 re-walks
//! the same documents to emit relation links. Row creation must be
//! complete before any link is written, which is why the passes never
//! interleave.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::catalog::{LinkKind, ModelCatalog};
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::idmap::IdMap;
use crate::link::{Emit, LinkEmitter};
use crate::sink::{RelationalSink, SqlRow, SqlValue};
use crate::source::{document_id, DocumentSource};
use crate::transform::transform_document;

/// Summary of one migration run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub rows_created: u64,
    pub links_created: u64,
    /// Collections skipped because their target table does not exist.
    pub collections_skipped: Vec<String>,
    /// Documents dropped because they carry no identifier.
    pub documents_without_id: u64,
    /// Individually skipped dangling references inside arrays.
    pub dangling_refs: u64,
    /// Tolerated emission skips, counted by reason.
    pub skips: BTreeMap<&'static str, u64>,
}

/// Drives the two-pass conversion for one catalog.
pub struct Migrator<'a> {
    catalog: &'a ModelCatalog,
    config: &'a MigrationConfig,
}

impl<'a> Migrator<'a> {
    pub fn new(catalog: &'a ModelCatalog, config: &'a MigrationConfig) -> Self {
        Self { catalog, config }
    }

    /// Run the full migration: rows, links, identifier-map persistence.
    pub fn run<S, D>(&self, source: &D, sink: &mut S) -> Result<MigrationReport>
    where
        S: RelationalSink,
        D: DocumentSource + ?Sized,
    {
        let mut report = MigrationReport::default();

        sink.reset_id_map(&self.config.id_map_table)?;

        let mut ids = IdMap::new();

        info!("first pass: creating rows and allocating ids");
        for model in self.catalog.models() {
            if !sink.table_exists(&model.collection_name)? {
                warn!(
                    collection = %model.collection_name,
                    "target table does not exist, skipping collection"
                );
                report.collections_skipped.push(model.collection_name.clone());
                continue;
            }

            let mut rows = 0u64;
            for doc in source.stream_all(&model.collection_name)? {
                let doc = doc?;
                let Some(doc_id) = document_id(&doc) else {
                    warn!(collection = %model.collection_name, "document without id, dropping");
                    report.documents_without_id += 1;
                    continue;
                };

                let mut row = transform_document(&doc, model);
                let id = ids.allocate(&doc_id, &model.collection_name);
                row.push(("id".to_string(), SqlValue::Integer(id)));
                sink.insert(&model.collection_name, &row)?;
                rows += 1;
            }

            info!(collection = %model.collection_name, rows, "created rows");
            report.rows_created += rows;
        }

        // Pass 1 is complete; no id may be allocated from here on.
        let ids = ids.seal();

        info!(allocated = ids.len(), "second pass: linking components and relations");
        let mut emitter = LinkEmitter::new(self.catalog, &ids);
        for model in self.catalog.models() {
            if report
                .collections_skipped
                .iter()
                .any(|c| c == &model.collection_name)
            {
                continue;
            }

            debug!(collection = %model.collection_name, "linking collection");
            for doc in source.stream_all(&model.collection_name)? {
                let doc = doc?;
                let Some(doc_id) = document_id(&doc) else {
                    continue;
                };
                // allocated during pass 1; a miss here means the pass
                // ordering or the source data is broken
                let owner_id = ids.resolve(&doc_id)?;

                for (name, attr) in &model.attributes {
                    if matches!(attr.link, LinkKind::Scalar) {
                        continue;
                    }
                    match emitter.emit(sink, model, &doc, owner_id, name, attr)? {
                        Emit::Done { rows } => report.links_created += rows as u64,
                        Emit::Skipped { reason } => {
                            *report.skips.entry(reason.as_str()).or_default() += 1;
                        }
                    }
                }
            }
        }
        report.dangling_refs = emitter.dangling_refs();

        info!(entries = ids.len(), "saving identifier map");
        sink.create_id_map(&self.config.id_map_table)?;
        for chunk in ids.entries().chunks(self.config.id_map_chunk.max(1)) {
            let rows: Vec<SqlRow> = chunk
                .iter()
                .map(|entry| {
                    vec![
                        ("source_id".to_string(), SqlValue::Text(entry.source_id.clone())),
                        ("collection".to_string(), SqlValue::Text(entry.collection.clone())),
                        ("sql_id".to_string(), SqlValue::Integer(entry.id)),
                    ]
                })
                .collect();
            sink.insert_many(&self.config.id_map_table, &rows)?;
        }

        info!(
            rows = report.rows_created,
            links = report.links_created,
            skipped_collections = report.collections_skipped.len(),
            "migration complete"
        );
        Ok(report)
    }
}

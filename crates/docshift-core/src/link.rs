//! Link emission: the relation pass.
//!
//! Given one document and one classified attribute, emit the rows that
//! reproduce the relationship in the relational schema. Every emission
//! reports an outcome so the orchestrator can aggregate skip counts and
//! escalate only real errors.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{Attribute, LinkKind, Model, ModelCatalog};
use crate::error::{MigrateError, Result};
use crate::idmap::SealedIdMap;
use crate::naming;
use crate::sink::{RelationalSink, SqlRow, SqlValue};
use crate::source::source_id;

/// Polymorphic attachment-link table of the upload plugin.
const UPLOAD_MORPH_TABLE: &str = "upload_file_morph";

/// Outcome of emitting one attribute of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    Done { rows: usize },
    Skipped { reason: SkipReason },
}

/// Why an emission produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The document has no value for the attribute.
    NoValue,
    /// The referenced target was never allocated a relational id.
    UnresolvedTarget,
    /// The attribute was classified as unlinkable (see catalog).
    Unlinked,
    /// The reciprocal many-to-one side owns the foreign key.
    ReciprocalOwnsColumn,
    /// Only the dominant side of a many-to-many emits rows.
    NonDominantSide,
    /// The foreign-key update hit an existing unique value.
    DuplicateKey,
    /// Scalar attributes carry no link.
    NotALink,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoValue => "no value",
            SkipReason::UnresolvedTarget => "unresolved target",
            SkipReason::Unlinked => "unlinked attribute",
            SkipReason::ReciprocalOwnsColumn => "reciprocal side owns the link",
            SkipReason::NonDominantSide => "non-dominant side",
            SkipReason::DuplicateKey => "duplicate unique key",
            SkipReason::NotALink => "not a link",
        }
    }
}

/// Emits link rows against a sealed identifier map.
pub struct LinkEmitter<'a> {
    catalog: &'a ModelCatalog,
    ids: &'a SealedIdMap,
    /// Generated row ids per link table, monotonic from 1.
    link_row_ids: HashMap<String, i64>,
    /// References that pointed at documents the row pass never saw.
    dangling_refs: u64,
}

impl<'a> LinkEmitter<'a> {
    pub fn new(catalog: &'a ModelCatalog, ids: &'a SealedIdMap) -> Self {
        Self {
            catalog,
            ids,
            link_row_ids: HashMap::new(),
            dangling_refs: 0,
        }
    }

    /// Count of individually skipped dangling references inside arrays.
    pub fn dangling_refs(&self) -> u64 {
        self.dangling_refs
    }

    /// Emit the rows for one attribute of one document.
    ///
    /// `owner_id` is the document's already-resolved relational id.
    pub fn emit<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
        attr: &Attribute,
    ) -> Result<Emit> {
        match &attr.link {
            LinkKind::Scalar => Ok(Emit::Skipped {
                reason: SkipReason::NotALink,
            }),
            LinkKind::Unlinked { reason } => {
                debug!(attribute = name, reason, "skipping unlinked attribute");
                Ok(Emit::Skipped {
                    reason: SkipReason::Unlinked,
                })
            }
            LinkKind::Component { target_table } => {
                self.emit_component_rows(sink, model, doc, owner_id, name, Some(target_table.as_str()))
            }
            LinkKind::DynamicZone => {
                self.emit_component_rows(sink, model, doc, owner_id, name, None)
            }
            LinkKind::AttachmentSingle => self.emit_attachment(sink, model, doc, owner_id, name),
            LinkKind::AttachmentMulti => {
                self.emit_attachment_list(sink, model, doc, owner_id, name)
            }
            LinkKind::OneWay { column }
            | LinkKind::OneToOne { column }
            | LinkKind::ManyToOne { column } => {
                self.emit_foreign_key(sink, model, doc, owner_id, name, column)
            }
            LinkKind::OneToMany => Ok(Emit::Skipped {
                reason: SkipReason::ReciprocalOwnsColumn,
            }),
            LinkKind::ManyWay { join } => self.emit_join_rows(sink, doc, owner_id, name, join),
            LinkKind::ManyToMany { join, dominant } => {
                if !dominant {
                    return Ok(Emit::Skipped {
                        reason: SkipReason::NonDominantSide,
                    });
                }
                self.emit_join_rows(sink, doc, owner_id, name, join)
            }
            LinkKind::Morph => self.emit_morph_rows(sink, model, doc, owner_id, name),
        }
    }

    fn next_link_row_id(&mut self, table: &str) -> i64 {
        let counter = self.link_row_ids.entry(table.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Component and dynamic-zone links share one table per owning
    /// collection; dynamic zones resolve the element type per instance.
    fn emit_component_rows<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
        fixed_target: Option<&str>,
    ) -> Result<Emit> {
        let Some(items) = doc.get(name).and_then(Value::as_array) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        let table = format!("{}_components", model.collection_name);
        let owner_column = naming::foreign_key(&model.collection_name);

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let target_table = match fixed_target {
                Some(fixed) => fixed.to_string(),
                None => {
                    let kind = item.get("kind").and_then(Value::as_str);
                    match kind.and_then(|k| self.catalog.resolve_by_global_id(k)) {
                        Some(target) => target.collection_name.clone(),
                        None => {
                            warn!(attribute = name, kind, "unknown dynamic-zone kind, skipping element");
                            self.dangling_refs += 1;
                            continue;
                        }
                    }
                }
            };

            let resolved = item
                .get("ref")
                .and_then(source_id)
                .and_then(|r| self.ids.try_resolve(&r));
            let Some(component_id) = resolved else {
                warn!(attribute = name, index = idx, "dangling component reference, skipping element");
                self.dangling_refs += 1;
                continue;
            };

            rows.push(vec![
                ("id".to_string(), SqlValue::Integer(self.next_link_row_id(&table))),
                ("field".to_string(), SqlValue::Text(name.to_string())),
                // order reflects the original array position, holes included
                ("order".to_string(), SqlValue::Integer(idx as i64 + 1)),
                ("component_type".to_string(), SqlValue::Text(target_table)),
                ("component_id".to_string(), SqlValue::Integer(component_id)),
                (owner_column.clone(), SqlValue::Integer(owner_id)),
            ]);
        }

        if !rows.is_empty() {
            debug!(table = %table, attribute = name, rows = rows.len(), "linking components");
            sink.insert_many(&table, &rows)?;
        }
        Ok(Emit::Done { rows: rows.len() })
    }

    fn emit_attachment<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
    ) -> Result<Emit> {
        let Some(value) = doc.get(name).filter(|v| !v.is_null()) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        let resolved = source_id(value).and_then(|r| self.ids.try_resolve(&r));
        let Some(file_id) = resolved else {
            return Ok(Emit::Skipped {
                reason: SkipReason::UnresolvedTarget,
            });
        };

        let row = attachment_row(file_id, owner_id, &model.collection_name, name, 1);
        debug!(attribute = name, "linking single attachment");
        sink.insert(UPLOAD_MORPH_TABLE, &row)?;
        Ok(Emit::Done { rows: 1 })
    }

    fn emit_attachment_list<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
    ) -> Result<Emit> {
        let Some(items) = doc.get(name).and_then(Value::as_array) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let resolved = source_id(item).and_then(|r| self.ids.try_resolve(&r));
            let Some(file_id) = resolved else {
                warn!(attribute = name, index = idx, "dangling attachment reference, skipping element");
                self.dangling_refs += 1;
                continue;
            };
            rows.push(attachment_row(
                file_id,
                owner_id,
                &model.collection_name,
                name,
                idx as i64 + 1,
            ));
        }

        if !rows.is_empty() {
            debug!(attribute = name, rows = rows.len(), "linking attachments");
            sink.insert_many(UPLOAD_MORPH_TABLE, &rows)?;
        }
        Ok(Emit::Done { rows: rows.len() })
    }

    fn emit_foreign_key<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
        column: &str,
    ) -> Result<Emit> {
        let Some(value) = doc.get(name).filter(|v| !v.is_null()) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        let resolved = source_id(value).and_then(|r| self.ids.try_resolve(&r));
        let Some(target_id) = resolved else {
            return Ok(Emit::Skipped {
                reason: SkipReason::UnresolvedTarget,
            });
        };

        let assignments = vec![(column.to_string(), SqlValue::Integer(target_id))];
        match sink.update_by_id(&model.collection_name, &assignments, owner_id) {
            Ok(()) => Ok(Emit::Done { rows: 1 }),
            Err(MigrateError::UniqueViolation { table, message }) => {
                warn!(table = %table, column, message = %message, "duplicate unique key, keeping first value");
                Ok(Emit::Skipped {
                    reason: SkipReason::DuplicateKey,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn emit_join_rows<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        doc: &Value,
        owner_id: i64,
        name: &str,
        join: &crate::catalog::JoinSpec,
    ) -> Result<Emit> {
        let Some(items) = doc.get(name).and_then(Value::as_array) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let resolved = source_id(item).and_then(|r| self.ids.try_resolve(&r));
            let Some(target_id) = resolved else {
                warn!(attribute = name, index = idx, "dangling relation reference, skipping element");
                self.dangling_refs += 1;
                continue;
            };
            rows.push(vec![
                (join.target_column.clone(), SqlValue::Integer(target_id)),
                (join.source_column.clone(), SqlValue::Integer(owner_id)),
            ]);
        }

        if !rows.is_empty() {
            debug!(table = %join.table, attribute = name, rows = rows.len(), "linking relations");
            sink.insert_many(&join.table, &rows)?;
        }
        Ok(Emit::Done { rows: rows.len() })
    }

    /// Polymorphic references land in the owner's morph table; the
    /// element type comes from the per-instance `kind` discriminator.
    fn emit_morph_rows<S: RelationalSink>(
        &mut self,
        sink: &mut S,
        model: &Model,
        doc: &Value,
        owner_id: i64,
        name: &str,
    ) -> Result<Emit> {
        let Some(value) = doc.get(name).filter(|v| !v.is_null()) else {
            return Ok(Emit::Skipped {
                reason: SkipReason::NoValue,
            });
        };

        // cardinality-independent: a single object counts as one element
        let single = std::slice::from_ref(value);
        let items: &[Value] = value.as_array().map_or(single, Vec::as_slice);

        let table = format!("{}_morph", model.collection_name);
        let owner_column = naming::foreign_key(&model.collection_name);

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let kind = item.get("kind").and_then(Value::as_str);
            let Some(target) = kind.and_then(|k| self.catalog.resolve_by_global_id(k)) else {
                warn!(attribute = name, kind, "unknown polymorphic kind, skipping element");
                self.dangling_refs += 1;
                continue;
            };
            let resolved = item
                .get("ref")
                .and_then(source_id)
                .and_then(|r| self.ids.try_resolve(&r));
            let Some(related_id) = resolved else {
                warn!(attribute = name, index = idx, "dangling polymorphic reference, skipping element");
                self.dangling_refs += 1;
                continue;
            };
            let field = item
                .get("field")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string();

            rows.push(vec![
                (owner_column.clone(), SqlValue::Integer(owner_id)),
                ("related_id".to_string(), SqlValue::Integer(related_id)),
                (
                    "related_type".to_string(),
                    SqlValue::Text(target.collection_name.clone()),
                ),
                ("field".to_string(), SqlValue::Text(field)),
                ("order".to_string(), SqlValue::Integer(idx as i64 + 1)),
            ]);
        }

        if !rows.is_empty() {
            debug!(table = %table, attribute = name, rows = rows.len(), "linking polymorphic references");
            sink.insert_many(&table, &rows)?;
        }
        Ok(Emit::Done { rows: rows.len() })
    }
}

fn attachment_row(
    file_id: i64,
    owner_id: i64,
    owner_table: &str,
    field: &str,
    order: i64,
) -> SqlRow {
    vec![
        ("upload_file_id".to_string(), SqlValue::Integer(file_id)),
        ("related_id".to_string(), SqlValue::Integer(owner_id)),
        ("related_type".to_string(), SqlValue::Text(owner_table.to_string())),
        ("field".to_string(), SqlValue::Text(field.to_string())),
        ("order".to_string(), SqlValue::Integer(order)),
    ]
}

//! Relation classification: attribute metadata to emission shapes.
//!
//! Cardinality is not declared directly by the source schema; it is
//! inferred from the attribute together with its reciprocal on the
//! target model. Classification runs once at catalog build time so the
//! link pass never re-inspects raw metadata.

use std::cmp::Ordering;

use super::{find_target, AttributeDef, Model};
use crate::naming;

/// Sentinel target meaning "polymorphic, any model".
const ANY_MODEL: &str = "*";
/// Target short name of the upload plugin's file model.
const FILE_MODEL: &str = "file";
/// Plugin namespace owning file attachments.
const UPLOAD_PLUGIN: &str = "upload";

/// Join-table shape for a multi-valued relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub table: String,
    /// Column holding the owning row's id.
    pub source_column: String,
    /// Column holding the referenced row's id.
    pub target_column: String,
}

/// Classified link shape of one attribute.
///
/// Exactly one constructor per relation variant; the link pass matches
/// this exhaustively and never guesses from raw metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Plain value column, written during the row pass.
    Scalar,
    /// Repeatable component; elements link through the owner's
    /// component table.
    Component { target_table: String },
    /// Like a component, but the element type is resolved per instance
    /// via its `kind` discriminator.
    DynamicZone,
    /// Single file attachment through the upload morph table.
    AttachmentSingle,
    /// Multiple file attachments through the upload morph table.
    AttachmentMulti,
    /// Unidirectional single reference; foreign key on the owning row.
    OneWay { column: String },
    /// Bidirectional single-single; this side holds the foreign key.
    OneToOne { column: String },
    /// This side holds the foreign key, the reciprocal is plural.
    ManyToOne { column: String },
    /// The reciprocal many-to-one side owns the foreign key.
    OneToMany,
    /// Unidirectional multi-reference through a join table.
    ManyWay { join: JoinSpec },
    /// Symmetric multi-multi; only the dominant side emits rows.
    ManyToMany { join: JoinSpec, dominant: bool },
    /// Polymorphic reference resolved per instance into a morph table.
    Morph,
    /// Metadata this schema cannot link; skipped at emission.
    Unlinked { reason: &'static str },
}

/// Classify one attribute of `owner` against the full model set.
pub(crate) fn classify_attribute(
    owner: &Model,
    name: &str,
    def: &AttributeDef,
    models: &[Model],
) -> LinkKind {
    match def.kind.as_deref() {
        Some("component") => {
            let Some(target) = def
                .component
                .as_deref()
                .and_then(|uid| models.iter().find(|m| m.uid == uid))
            else {
                return LinkKind::Unlinked {
                    reason: "unknown component target",
                };
            };
            return LinkKind::Component {
                target_table: target.collection_name.clone(),
            };
        }
        Some("dynamiczone") => return LinkKind::DynamicZone,
        _ => {}
    }

    if def.plugin.as_deref() == Some(UPLOAD_PLUGIN) {
        if def.model.as_deref() == Some(FILE_MODEL) {
            return LinkKind::AttachmentSingle;
        }
        if def.collection.as_deref() == Some(FILE_MODEL) {
            return LinkKind::AttachmentMulti;
        }
    }

    if def.model.is_some() || def.collection.is_some() {
        return classify_relation(owner, name, def, models);
    }

    LinkKind::Scalar
}

fn classify_relation(
    owner: &Model,
    name: &str,
    def: &AttributeDef,
    models: &[Model],
) -> LinkKind {
    // Polymorphic targets short-circuit everything else.
    if def.model.as_deref() == Some(ANY_MODEL) || def.collection.as_deref() == Some(ANY_MODEL) {
        return LinkKind::Morph;
    }

    let target_name = def.model.as_deref().or(def.collection.as_deref());
    let reciprocal = def.via.as_deref().and_then(|via| {
        target_name
            .and_then(|n| find_target(models, n, def.plugin.as_deref()))
            .and_then(|target| target.attributes.get(via))
            .map(|attr| &attr.def)
    });

    if def.model.is_some() {
        let column = name.to_string();
        return match reciprocal {
            // A missing reciprocal degenerates to the unidirectional case.
            None => LinkKind::OneWay { column },
            Some(b) if singular_target(b) => LinkKind::OneToOne { column },
            Some(b) if plural_target(b) => LinkKind::ManyToOne { column },
            Some(_) => LinkKind::Unlinked {
                reason: "polymorphic reciprocal",
            },
        };
    }

    match reciprocal {
        None => LinkKind::ManyWay {
            join: many_way_join(owner, name, def),
        },
        Some(b) if singular_target(b) => LinkKind::OneToMany,
        Some(b) if plural_target(b) => LinkKind::ManyToMany {
            join: many_to_many_join(def, b),
            dominant: def.dominant == Some(true),
        },
        Some(_) => LinkKind::Unlinked {
            reason: "polymorphic reciprocal",
        },
    }
}

fn singular_target(def: &AttributeDef) -> bool {
    matches!(def.model.as_deref(), Some(m) if m != ANY_MODEL)
}

fn plural_target(def: &AttributeDef) -> bool {
    matches!(def.collection.as_deref(), Some(c) if c != ANY_MODEL)
}

/// Join shape for a unidirectional multi-reference.
fn many_way_join(owner: &Model, name: &str, def: &AttributeDef) -> JoinSpec {
    let table = def.collection_name.clone().unwrap_or_else(|| {
        format!("{}__{}", owner.collection_name, naming::snake_case(name))
    });

    let source_column = naming::foreign_key(&owner.collection_name);
    let mut target_column = naming::foreign_key(def.collection.as_deref().unwrap_or_default());
    if target_column == source_column {
        target_column = format!("related_{target_column}");
    }

    JoinSpec {
        table,
        source_column,
        target_column,
    }
}

/// Join shape for a symmetric many-to-many, as seen from attribute `a`.
///
/// `b` is the reciprocal; its `collection` names the owning side's model,
/// so the owning foreign key derives from `b` and the referenced one
/// from `a`.
fn many_to_many_join(a: &AttributeDef, b: &AttributeDef) -> JoinSpec {
    let table = many_to_many_table(a, b);

    let mut source_column = naming::foreign_key(b.collection.as_deref().unwrap_or_default());
    let target_column = naming::foreign_key(a.collection.as_deref().unwrap_or_default());
    if source_column == target_column {
        source_column = naming::foreign_key(a.via.as_deref().unwrap_or_default());
    }

    JoinSpec {
        table,
        source_column,
        target_column,
    }
}

/// Resolve the one physical join-table name both sides agree on.
///
/// An explicitly dominant side with a table override wins; otherwise the
/// two descriptors are ordered deterministically (collection name, then
/// dominance, dominant side last) and the name is derived from the
/// ordered pair. Classifying from either direction therefore yields the
/// same name without coordination.
fn many_to_many_table(a: &AttributeDef, b: &AttributeDef) -> String {
    if a.dominant == Some(true) {
        if let Some(name) = &a.collection_name {
            return name.clone();
        }
    }
    if b.dominant == Some(true) {
        if let Some(name) = &b.collection_name {
            return name.clone();
        }
    }

    // TODO: confirm the lexicographic fallback with schema owners before
    // relying on it for schemas that omit the dominant flag entirely.
    let mut sides = [a, b];
    sides.sort_by(|x, y| {
        if x.collection == y.collection {
            if x.dominant == Some(true) {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        } else {
            x.collection.cmp(&y.collection)
        }
    });

    sides
        .iter()
        .map(|side| {
            naming::snake_case(&format!(
                "{}_{}",
                naming::plural(side.collection.as_deref().unwrap_or_default()),
                naming::plural(side.via.as_deref().unwrap_or_default()),
            ))
        })
        .collect::<Vec<_>>()
        .join("__")
}

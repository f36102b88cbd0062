//! Model catalog: parsed definitions of the source collections.
//!
//! Definitions arrive as raw JSON blobs stored by the source system.
//! Loading derives the naming facts (short name, plugin, global id) and
//! classifies every attribute into its link shape exactly once; the
//! catalog is immutable for the rest of the run.

mod classify;

pub use classify::{JoinSpec, LinkKind};

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::naming;

/// Raw attribute descriptor as stored in a model definition.
///
/// An untyped bag of optional fields; [`LinkKind`] is the classified
/// form the rest of the engine works with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttributeDef {
    /// Type tag: `component`, `dynamiczone`, or a scalar type name.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Singular relation target (short model name, or `*` for polymorphic).
    pub model: Option<String>,
    /// Plural relation target (short model name, or `*` for polymorphic).
    pub collection: Option<String>,
    /// Name of the reciprocal attribute on the target model.
    pub via: Option<String>,
    /// Namespace qualifier for the target model.
    pub plugin: Option<String>,
    /// Tie-break flag for symmetric many-to-many relations.
    pub dominant: Option<bool>,
    /// Explicit join-table override.
    #[serde(rename = "collectionName")]
    pub collection_name: Option<String>,
    /// Component target uid (for `type: component`).
    pub component: Option<String>,
}

/// Raw model definition blob.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDef {
    pub uid: String,
    #[serde(rename = "collectionName")]
    pub collection_name: String,
    #[serde(rename = "globalId")]
    pub global_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDef>,
}

/// One attribute on a loaded model: the raw descriptor plus its
/// classified link shape.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub def: AttributeDef,
    pub link: LinkKind,
}

/// A loaded model with derived naming facts.
#[derive(Debug, Clone)]
pub struct Model {
    /// Unique identifier, e.g. `application::blog.article`.
    pub uid: String,
    /// Target table / source collection name.
    pub collection_name: String,
    /// Short model name extracted from the uid, when recognized.
    pub model_name: Option<String>,
    /// Owning plugin namespace, when recognized.
    pub plugin: Option<String>,
    /// Owning API namespace for application-defined models.
    pub api_name: Option<String>,
    /// Namespaced display name used to resolve polymorphic references.
    pub global_id: String,
    pub attributes: BTreeMap<String, Attribute>,
}

const NS_SYSTEM: &str = "strapi::";
const NS_PLUGIN: &str = "plugins";
const NS_APPLICATION: &str = "application";

impl Model {
    fn from_def(def: ModelDef) -> Self {
        let ModelDef {
            uid,
            collection_name,
            global_id,
            attributes,
        } = def;

        let attributes = attributes
            .into_iter()
            .map(|(name, def)| {
                (
                    name,
                    Attribute {
                        def,
                        // replaced once the whole model set is loaded
                        link: LinkKind::Scalar,
                    },
                )
            })
            .collect();

        if !uid.contains("::") {
            // Non-namespaced definitions are components; their global id
            // is always synthesized, even when the blob carries one.
            let model_name = uid.splitn(2, '.').nth(1).map(str::to_string);
            return Self {
                global_id: naming::pascal_global_id(&format!("component_{uid}")),
                collection_name,
                model_name,
                plugin: None,
                api_name: None,
                attributes,
                uid,
            };
        }

        let tail = uid.splitn(2, "::").nth(1).unwrap_or("");
        let (plugin, api_name, model_name) = if uid.starts_with(NS_SYSTEM) {
            (Some("admin".to_string()), None, Some(tail.to_string()))
        } else if uid.starts_with(NS_PLUGIN) {
            let mut parts = tail.splitn(2, '.');
            (
                parts.next().map(str::to_string),
                None,
                parts.next().map(str::to_string),
            )
        } else if uid.starts_with(NS_APPLICATION) {
            let mut parts = tail.splitn(2, '.');
            (
                None,
                parts.next().map(str::to_string),
                parts.next().map(str::to_string),
            )
        } else {
            // Unrecognized namespace: leave the naming fields unset and
            // let callers tolerate the partial metadata.
            (None, None, None)
        };

        let global_id = global_id.unwrap_or_else(|| match (&plugin, &model_name) {
            (Some(plugin), Some(name)) => naming::pascal_global_id(&format!("{plugin}-{name}")),
            (None, Some(name)) => naming::pascal_global_id(name),
            _ => naming::pascal_global_id(&uid),
        });

        Self {
            uid,
            collection_name,
            model_name,
            plugin,
            api_name,
            global_id,
            attributes,
        }
    }
}

/// Immutable index over the full model set.
#[derive(Debug)]
pub struct ModelCatalog {
    models: Vec<Model>,
    by_uid: HashMap<String, usize>,
    by_global_id: HashMap<String, usize>,
}

impl ModelCatalog {
    /// Parse raw definition blobs and classify every attribute.
    pub fn load_all(blobs: Vec<Value>) -> Result<Self> {
        let mut models = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let def: ModelDef =
                serde_json::from_value(blob).map_err(|e| MigrateError::ModelDef {
                    message: e.to_string(),
                })?;
            models.push(Model::from_def(def));
        }

        // Relation shapes depend on reciprocal attributes, so classification
        // runs once after the whole set is loaded.
        let mut links = Vec::new();
        for (idx, model) in models.iter().enumerate() {
            for (name, attr) in &model.attributes {
                links.push((
                    idx,
                    name.clone(),
                    classify::classify_attribute(model, name, &attr.def, &models),
                ));
            }
        }
        for (idx, name, link) in links {
            if let Some(attr) = models[idx].attributes.get_mut(&name) {
                attr.link = link;
            }
        }

        let mut by_uid = HashMap::with_capacity(models.len());
        let mut by_global_id = HashMap::with_capacity(models.len());
        for (idx, model) in models.iter().enumerate() {
            by_uid.insert(model.uid.clone(), idx);
            by_global_id.insert(model.global_id.clone(), idx);
        }

        Ok(Self {
            models,
            by_uid,
            by_global_id,
        })
    }

    /// All models, in definition order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn resolve_by_uid(&self, uid: &str) -> Option<&Model> {
        self.by_uid.get(uid).map(|&idx| &self.models[idx])
    }

    pub fn resolve_by_global_id(&self, global_id: &str) -> Option<&Model> {
        self.by_global_id.get(global_id).map(|&idx| &self.models[idx])
    }

    /// Find the model a relation attribute targets by short name,
    /// honoring the attribute's plugin qualifier when present.
    pub fn resolve_target(&self, name: &str, plugin: Option<&str>) -> Option<&Model> {
        find_target(&self.models, name, plugin)
    }
}

pub(crate) fn find_target<'a>(
    models: &'a [Model],
    name: &str,
    plugin: Option<&str>,
) -> Option<&'a Model> {
    models.iter().find(|m| {
        m.model_name.as_deref() == Some(name)
            && plugin.is_none_or(|p| m.plugin.as_deref() == Some(p))
    })
}

//! Document sources: where migration input comes from.
//!
//! The engine only requires forward-only, restartable iteration per
//! collection. The concrete source reads a document-store export
//! directory with one `<collection>.json` (array) or
//! `<collection>.jsonl` (one document per line) file per collection.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Lazy stream of documents from one collection.
pub type DocStream = Box<dyn Iterator<Item = Result<Value>>>;

/// A readable document store.
pub trait DocumentSource {
    /// Iterate over every document of a collection, first to last.
    ///
    /// Calling this again restarts from the first element; there is no
    /// mid-stream resume. An unknown collection yields an empty stream.
    fn stream_all(&self, collection: &str) -> Result<DocStream>;
}

/// Export-directory source.
#[derive(Debug, Clone)]
pub struct ExportDirSource {
    dir: PathBuf,
}

impl ExportDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentSource for ExportDirSource {
    fn stream_all(&self, collection: &str) -> Result<DocStream> {
        let jsonl = self.dir.join(format!("{collection}.jsonl"));
        if jsonl.exists() {
            let file = File::open(&jsonl).map_err(|e| MigrateError::io_with_path(e, &jsonl))?;
            let display = jsonl.display().to_string();
            let lines = BufReader::new(file)
                .lines()
                .enumerate()
                .filter_map(move |(idx, line)| match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
                        MigrateError::Json {
                            message: format!("{display}:{}: {e}", idx + 1),
                            source: Some(e),
                        }
                    })),
                    Err(e) => Some(Err(e.into())),
                });
            return Ok(Box::new(lines));
        }

        let json = self.dir.join(format!("{collection}.json"));
        if json.exists() {
            let file = File::open(&json).map_err(|e| MigrateError::io_with_path(e, &json))?;
            let docs: Vec<Value> =
                serde_json::from_reader(BufReader::new(file)).map_err(|e| MigrateError::Json {
                    message: format!("{}: {e}", json.display()),
                    source: Some(e),
                })?;
            return Ok(Box::new(docs.into_iter().map(Ok)));
        }

        debug!(collection, "no export file found, treating as empty");
        Ok(Box::new(std::iter::empty()))
    }
}

/// Extract a source identifier from a document value or reference.
///
/// Export formats wrap object ids as `{"$oid": "..."}`; embedded
/// documents carry their id under `_id`. Plain strings and numbers pass
/// through.
pub fn source_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("$oid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| map.get("_id").and_then(source_id))
            .or_else(|| map.get("id").and_then(source_id)),
        _ => None,
    }
}

/// The document's own identifier.
pub fn document_id(doc: &Value) -> Option<String> {
    doc.get("_id").and_then(source_id)
}

/// Scan the store's settings collection for model-definition blobs.
///
/// Definitions live in documents `{key, value}` where `key` starts with
/// the given prefix and `value` is a JSON string.
pub fn read_model_defs(
    source: &dyn DocumentSource,
    collection: &str,
    key_prefix: &str,
) -> Result<Vec<Value>> {
    let mut blobs = Vec::new();
    for doc in source.stream_all(collection)? {
        let doc = doc?;
        let Some(key) = doc.get("key").and_then(Value::as_str) else {
            continue;
        };
        if !key.starts_with(key_prefix) {
            continue;
        }
        let Some(raw) = doc.get("value").and_then(Value::as_str) else {
            continue;
        };
        let blob = serde_json::from_str(raw).map_err(|e| MigrateError::Json {
            message: format!("invalid model definition under key {key}: {e}"),
            source: Some(e),
        })?;
        blobs.push(blob);
    }
    Ok(blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn streams_jsonl_collections() {
        let dir = TempDir::new().unwrap();
        write(&dir, "articles.jsonl", "{\"_id\":\"a1\"}\n\n{\"_id\":\"a2\"}\n");

        let source = ExportDirSource::new(dir.path());
        let docs: Vec<Value> = source
            .stream_all("articles")
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["_id"], "a1");
    }

    #[test]
    fn streams_json_array_collections() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tags.json", "[{\"_id\":\"t1\"},{\"_id\":\"t2\"}]");

        let source = ExportDirSource::new(dir.path());
        let docs: Vec<Value> = source
            .stream_all("tags")
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn restarts_from_the_first_document() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tags.jsonl", "{\"_id\":\"t1\"}\n");

        let source = ExportDirSource::new(dir.path());
        for _ in 0..2 {
            let docs: Vec<Value> = source
                .stream_all("tags")
                .unwrap()
                .map(|d| d.unwrap())
                .collect();
            assert_eq!(docs.len(), 1);
        }
    }

    #[test]
    fn missing_collection_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = ExportDirSource::new(dir.path());
        assert_eq!(source.stream_all("nothing").unwrap().count(), 0);
    }

    #[test]
    fn surfaces_malformed_lines() {
        let dir = TempDir::new().unwrap();
        write(&dir, "bad.jsonl", "{\"_id\":\"ok\"}\nnot json\n");

        let source = ExportDirSource::new(dir.path());
        let results: Vec<Result<Value>> = source.stream_all("bad").unwrap().collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn extracts_source_ids() {
        assert_eq!(source_id(&json!("5f1c")), Some("5f1c".to_string()));
        assert_eq!(source_id(&json!({"$oid": "5f1c"})), Some("5f1c".to_string()));
        assert_eq!(
            source_id(&json!({"_id": {"$oid": "5f1c"}, "name": "x"})),
            Some("5f1c".to_string())
        );
        assert_eq!(source_id(&json!(null)), None);
        assert_eq!(source_id(&json!("")), None);
        assert_eq!(document_id(&json!({"_id": "a1"})), Some("a1".to_string()));
    }

    #[test]
    fn reads_model_defs_from_settings_collection() {
        let dir = TempDir::new().unwrap();
        let def = json!({"uid": "application::blog.article", "collectionName": "articles"});
        let line = json!({
            "_id": "s1",
            "key": "model_def_application::blog.article",
            "value": serde_json::to_string(&def).unwrap()
        });
        let other = json!({"_id": "s2", "key": "db_model_settings", "value": "{}"});
        write(
            &dir,
            "core_store.jsonl",
            &format!("{line}\n{other}\n"),
        );

        let source = ExportDirSource::new(dir.path());
        let blobs = read_model_defs(&source, "core_store", "model_def").unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0]["uid"], "application::blog.article");
    }
}

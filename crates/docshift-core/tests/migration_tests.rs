//! End-to-end migration tests against a real SQLite database.
//!
//! A fixture export directory (model definitions plus documents) is
//! migrated into a temporary database and the resulting tables are
//! inspected directly.

use docshift_core::{
    source, ExportDirSource, MigrationConfig, MigrationReport, Migrator, ModelCatalog, SqliteSink,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn write_jsonl(dir: &Path, name: &str, docs: &[serde_json::Value]) {
    let contents = docs
        .iter()
        .map(|d| serde_json::to_string(d).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(dir.join(format!("{name}.jsonl")), contents).unwrap();
}

fn model_def_line(def: &serde_json::Value) -> serde_json::Value {
    json!({
        "_id": format!("def_{}", def["uid"].as_str().unwrap()),
        "key": format!("model_def_{}", def["uid"].as_str().unwrap()),
        "value": serde_json::to_string(def).unwrap()
    })
}

/// Build the export directory and the pre-provisioned target schema.
fn create_test_env() -> (TempDir, MigrationConfig) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let export_dir = temp_dir.path().join("export");
    std::fs::create_dir_all(&export_dir).unwrap();

    let defs = [
        json!({
            "uid": "application::blog.article",
            "collectionName": "articles",
            "attributes": {
                "title": { "type": "string" },
                "cover": { "model": "file", "plugin": "upload" },
                "category": { "model": "category", "via": "articles" },
                "tags": { "collection": "tag" },
                "authors": { "collection": "writer", "via": "articles", "dominant": true },
                "slides": { "type": "component", "component": "blog.slider" }
            }
        }),
        json!({
            "uid": "application::blog.category",
            "collectionName": "categories",
            "attributes": {
                "name": { "type": "string" },
                "articles": { "collection": "article", "via": "category" }
            }
        }),
        json!({
            "uid": "application::blog.tag",
            "collectionName": "tags",
            "attributes": { "name": { "type": "string" } }
        }),
        json!({
            "uid": "application::blog.writer",
            "collectionName": "writers",
            "attributes": {
                "name": { "type": "string" },
                "articles": { "collection": "article", "via": "authors" }
            }
        }),
        json!({
            "uid": "plugins::upload.file",
            "collectionName": "upload_file",
            "attributes": { "name": { "type": "string" } }
        }),
        json!({
            "uid": "blog.slider",
            "collectionName": "components_blog_sliders",
            "attributes": { "caption": { "type": "string" } }
        }),
        json!({
            "uid": "application::blog.note",
            "collectionName": "legacy_notes",
            "attributes": { "body": { "type": "string" } }
        }),
    ];
    let mut core_store: Vec<serde_json::Value> = defs.iter().map(model_def_line).collect();
    core_store.push(json!({"_id": "s0", "key": "db_model_settings", "value": "{}"}));
    write_jsonl(&export_dir, "core_store", &core_store);

    write_jsonl(
        &export_dir,
        "articles",
        &[
            json!({
                "_id": "A1",
                "title": "Hello",
                "cover": "F1",
                "category": "C1",
                "tags": ["T1", "T2"],
                "authors": ["W1", "W2"],
                "slides": [
                    {"_id": "L1", "ref": "S1"},
                    {"_id": "L2", "ref": "S2"}
                ],
                "createdAt": {"$date": "2020-04-16T08:00:00Z"}
            }),
            json!({
                "_id": "A2",
                "title": "Second",
                "category": "GONE",
                "tags": []
            }),
        ],
    );
    write_jsonl(
        &export_dir,
        "categories",
        &[json!({"_id": "C1", "name": "News", "articles": ["A1"]})],
    );
    write_jsonl(
        &export_dir,
        "tags",
        &[json!({"_id": "T1", "name": "rust"}), json!({"_id": "T2", "name": "sql"})],
    );
    write_jsonl(
        &export_dir,
        "writers",
        &[json!({"_id": "W1", "name": "Ada"}), json!({"_id": "W2", "name": "Grace"})],
    );
    write_jsonl(
        &export_dir,
        "upload_file",
        &[json!({"_id": "F1", "name": "cover.png"})],
    );
    write_jsonl(
        &export_dir,
        "components_blog_sliders",
        &[
            json!({"_id": "S1", "caption": "first"}),
            json!({"_id": "S2", "caption": "second"}),
        ],
    );
    write_jsonl(&export_dir, "legacy_notes", &[json!({"_id": "N1", "body": "old"})]);

    let database = temp_dir.path().join("target.db");
    let conn = Connection::open(&database).unwrap();
    // target schema is provisioned ahead of the run; legacy_notes is
    // deliberately absent
    conn.execute_batch(
        "
        CREATE TABLE articles (
            id INTEGER PRIMARY KEY, title TEXT, cover INTEGER, category INTEGER,
            created_at TEXT, updated_at TEXT
        );
        CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE writers (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE upload_file (id INTEGER PRIMARY KEY, name TEXT);
        CREATE TABLE components_blog_sliders (id INTEGER PRIMARY KEY, caption TEXT);
        CREATE TABLE articles_components (
            id INTEGER PRIMARY KEY, field TEXT, \"order\" INTEGER,
            component_type TEXT, component_id INTEGER, article_id INTEGER
        );
        CREATE TABLE upload_file_morph (
            upload_file_id INTEGER, related_id INTEGER, related_type TEXT,
            field TEXT, \"order\" INTEGER
        );
        CREATE TABLE articles__tags (tag_id INTEGER, article_id INTEGER);
        CREATE TABLE articles_authors__writers_articles (article_id INTEGER, writer_id INTEGER);
        ",
    )
    .unwrap();

    let config = MigrationConfig::new(&export_dir, &database);
    (temp_dir, config)
}

fn run_migration(config: &MigrationConfig) -> MigrationReport {
    let src = ExportDirSource::new(&config.export_dir);
    let blobs = source::read_model_defs(
        &src,
        MigrationConfig::MODEL_DEF_COLLECTION,
        MigrationConfig::MODEL_DEF_PREFIX,
    )
    .unwrap();
    let catalog = ModelCatalog::load_all(blobs).unwrap();
    let mut sink = SqliteSink::open(&config.database).unwrap();
    Migrator::new(&catalog, config).run(&src, &mut sink).unwrap()
}

#[test]
fn migrates_a_full_export() {
    let (_env, config) = create_test_env();
    let report = run_migration(&config);

    assert_eq!(report.rows_created, 10);
    assert_eq!(report.collections_skipped, vec!["legacy_notes".to_string()]);
    // tags (2) + authors (2) + slides (2) + cover (1) + category fk (1)
    assert_eq!(report.links_created, 8);
    assert_eq!(report.skips.get("unresolved target"), Some(&1));
    assert_eq!(report.skips.get("reciprocal side owns the link"), Some(&1));

    let conn = Connection::open(&config.database).unwrap();

    // base rows with remapped foreign keys
    let (title, category, created_at): (String, Option<i64>, Option<String>) = conn
        .query_row(
            "SELECT title, category, created_at FROM articles WHERE id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(title, "Hello");
    assert_eq!(category, Some(1));
    assert_eq!(created_at.as_deref(), Some("2020-04-16T08:00:00Z"));

    // the dangling category reference stayed NULL
    let dangling: Option<i64> = conn
        .query_row("SELECT category FROM articles WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(dangling, None);

    // many-way join rows
    let tag_links: Vec<(i64, i64)> = conn
        .prepare("SELECT tag_id, article_id FROM articles__tags ORDER BY tag_id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(tag_links, vec![(1, 1), (2, 1)]);

    // dominant-side many-to-many join rows
    let author_links: Vec<(i64, i64)> = conn
        .prepare(
            "SELECT article_id, writer_id FROM articles_authors__writers_articles ORDER BY writer_id",
        )
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(author_links, vec![(1, 1), (1, 2)]);

    // component links preserve array order
    let components: Vec<(i64, String, i64, String, i64, i64)> = conn
        .prepare(
            "SELECT id, field, \"order\", component_type, component_id, article_id
             FROM articles_components ORDER BY \"order\"",
        )
        .unwrap()
        .query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        components,
        vec![
            (1, "slides".to_string(), 1, "components_blog_sliders".to_string(), 1, 1),
            (2, "slides".to_string(), 2, "components_blog_sliders".to_string(), 2, 1),
        ]
    );

    // single attachment row
    let morph: (i64, i64, String, String, i64) = conn
        .query_row(
            "SELECT upload_file_id, related_id, related_type, field, \"order\"
             FROM upload_file_morph",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .unwrap();
    assert_eq!(morph, (1, 1, "articles".to_string(), "cover".to_string(), 1));
}

#[test]
fn persists_the_identifier_map() {
    let (_env, config) = create_test_env();
    run_migration(&config);

    let conn = Connection::open(&config.database).unwrap();
    let entries: Vec<(String, String, i64)> = conn
        .prepare("SELECT source_id, collection, sql_id FROM id_map")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(entries.len(), 10);
    // insertion order: collections in definition order, documents in
    // export order
    assert_eq!(entries[0], ("A1".to_string(), "articles".to_string(), 1));
    assert_eq!(entries[1], ("A2".to_string(), "articles".to_string(), 2));
    assert_eq!(entries[2], ("C1".to_string(), "categories".to_string(), 1));
    // the skipped collection allocated nothing
    assert!(entries.iter().all(|(_, c, _)| c != "legacy_notes"));
}

#[test]
fn rerun_resets_the_identifier_map() {
    let (_env, config) = create_test_env();
    run_migration(&config);

    // wipe the data tables the way an operator would before a rerun,
    // then run again: the audit table must not accumulate stale entries
    let conn = Connection::open(&config.database).unwrap();
    conn.execute_batch(
        "DELETE FROM articles; DELETE FROM categories; DELETE FROM tags;
         DELETE FROM writers; DELETE FROM upload_file;
         DELETE FROM components_blog_sliders; DELETE FROM articles_components;
         DELETE FROM upload_file_morph; DELETE FROM articles__tags;
         DELETE FROM articles_authors__writers_articles;",
    )
    .unwrap();
    drop(conn);

    run_migration(&config);

    let conn = Connection::open(&config.database).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM id_map", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 10);
}

#[test]
fn skipped_collection_writes_nothing() {
    let (_env, config) = create_test_env();
    let report = run_migration(&config);

    assert!(report.collections_skipped.contains(&"legacy_notes".to_string()));
    let conn = Connection::open(&config.database).unwrap();
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'legacy_notes'",
            [],
            |r| r.get(0),
        )
        .ok();
    assert_eq!(exists, None);
}

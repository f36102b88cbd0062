//! Name derivations for tables, columns and global ids.
//!
//! All relational naming in the target schema is derived from source
//! collection and attribute names, so every derivation lives here and
//! nowhere else.

use convert_case::{Case, Casing};

/// Snake-case a name the way the target schema expects (`myTags` → `my_tags`).
pub fn snake_case(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// Pascal-case a name into a global display id.
///
/// Dots, dashes and other separators all act as word boundaries, so
/// `component_blog.slider` becomes `ComponentBlogSlider`.
pub fn pascal_global_id(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.to_case(Case::Pascal)
}

/// Singularize an English collection name.
///
/// Covers the suffix classes that occur in collection naming
/// (`categories`, `addresses`, `boxes`, `tags`); words already singular
/// pass through unchanged.
pub fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["ses", "xes", "zes", "ches", "shes"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            // strip only the trailing "es"
            return format!("{stem}{}", &suffix[..suffix.len() - 2]);
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Pluralize an English collection name.
///
/// Already-plural words pass through unchanged so join-table naming is
/// stable whether a schema declares targets in singular or plural form.
pub fn plural(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(|c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) && !stem.is_empty() {
            return format!("{stem}ies");
        }
    }
    if word.ends_with("ss")
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Foreign-key column name for a collection (`articles` → `article_id`).
pub fn foreign_key(collection: &str) -> String {
    format!("{}_id", singular(collection))
}

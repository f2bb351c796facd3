//! Feature text provider.
//!
//! Raw entity records live in a directory, one `<entity>.json` file each,
//! holding the entity's posts under `tweets`. The feature text of an entity is
//! the concatenation of its posts' text.

use affinity_core::{AppError, AppResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Entity feature texts, ordered by entity-id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    entries: BTreeMap<String, String>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(entity.into(), text.into());
    }

    pub fn get(&self, entity: &str) -> Option<&str> {
        self.entries.get(entity).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Source of entity feature texts for a vectorization run.
pub trait FeatureProvider: Send + Sync {
    fn load_features(&self) -> AppResult<FeatureSet>;
}

/// Features read from a directory of entity record files.
#[derive(Debug, Clone)]
pub struct DirectoryFeatures {
    dir: PathBuf,
}

impl DirectoryFeatures {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FeatureProvider for DirectoryFeatures {
    fn load_features(&self) -> AppResult<FeatureSet> {
        load_feature_text(&self.dir)
    }
}

/// Features held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatures(pub FeatureSet);

impl FeatureProvider for StaticFeatures {
    fn load_features(&self) -> AppResult<FeatureSet> {
        Ok(self.0.clone())
    }
}

/// Read every `*.json` record directly inside `dir`.
///
/// The entity-id is the file name up to its first `.`.
pub fn load_feature_text(dir: &Path) -> AppResult<FeatureSet> {
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "Feature source directory does not exist: {:?}",
            dir
        )));
    }

    let tags = Regex::new(r"<.*?>").map_err(|e| AppError::Other(e.to_string()))?;

    let mut features = FeatureSet::new();
    let mut total_records = 0usize;
    let mut invalid_records = 0usize;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AppError::Config(format!("Failed to read source directory {:?}: {}", dir, e))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let Some(entity) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.split('.').next())
            .filter(|id| !id.is_empty())
        else {
            tracing::warn!("Skipping record with unusable file name: {:?}", path);
            continue;
        };

        let bytes = std::fs::read(path)?;
        let record: Value = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to parse record {:?}: {}", path, e))
        })?;

        let Some(posts) = record.get("tweets").and_then(Value::as_array) else {
            tracing::warn!("Record {:?} has no 'tweets' array, using empty text", path);
            features.insert(entity, "");
            continue;
        };

        let mut text = String::new();
        for post in posts {
            if post.is_null() {
                continue;
            }
            total_records += 1;
            match post_text(post, &tags) {
                Some(t) => text.push_str(&t),
                None => invalid_records += 1,
            }
        }
        features.insert(entity, text);
    }

    tracing::info!(
        "Loaded features for {} entities from {:?} (invalid records: {} / {})",
        features.len(),
        dir,
        invalid_records,
        total_records
    );
    Ok(features)
}

/// Text of one post: the linked page's title and summary when present,
/// otherwise the post body with HTML tags removed.
fn post_text(post: &Value, tags: &Regex) -> Option<String> {
    let mblog = post.get("mblog")?;

    if let Some(page) = mblog.get("page_info").and_then(Value::as_object) {
        if let (Some(title), Some(content)) = (page.get("title"), page.get("content2")) {
            let title = title.as_str().unwrap_or("");
            let content = content.as_str().unwrap_or("");
            return Some(format!("{}{}", title, content));
        }
    }

    mblog
        .get("text")
        .and_then(Value::as_str)
        .map(|body| tags.replace_all(body, "").into_owned())
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    followers: Vec<Followed>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Followed {
    name: String,
}

/// A user and the entities they follow, used as aggregate query input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Followers {
    pub screen_name: Option<String>,
    pub entities: Vec<String>,
}

/// Read a user record `{ profile: { screen_name }, followers: [{ name }] }`.
pub fn load_followers(path: &Path) -> AppResult<Followers> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read user file {:?}: {}", path, e))
    })?;
    let record: UserRecord = serde_json::from_str(&contents).map_err(|e| {
        AppError::Serialization(format!("Failed to parse user file {:?}: {}", path, e))
    })?;

    Ok(Followers {
        screen_name: record.profile.and_then(|p| p.screen_name),
        entities: record.followers.into_iter().map(|f| f.name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_load_feature_text() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "alice.json",
            serde_json::json!({
                "tweets": [
                    {"mblog": {"page_info": {"title": "Rust ", "content2": null}}},
                    null,
                    {"mblog": {"text": "<a href='x'>hello</a> world"}},
                    {"other": 1}
                ]
            }),
        );
        write(temp.path(), "bob.profile.json", serde_json::json!({"tweets": []}));
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let features = load_feature_text(temp.path()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features.get("alice"), Some("Rust hello world"));
        assert_eq!(features.get("bob"), Some(""));
    }

    #[test]
    fn test_page_info_without_keys_falls_back_to_text() {
        let tags = Regex::new(r"<.*?>").unwrap();
        let post = serde_json::json!({"mblog": {"page_info": {"title": "t"}, "text": "<b>body</b>"}});
        assert_eq!(post_text(&post, &tags), Some("body".to_string()));
    }

    #[test]
    fn test_missing_dir_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = load_feature_text(&temp.path().join("missing"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_followers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("me.json");
        std::fs::write(
            &path,
            r#"{"profile": {"screen_name": "me"}, "followers": [{"name": "b"}, {"name": "a"}]}"#,
        )
        .unwrap();

        let followers = load_followers(&path).unwrap();
        assert_eq!(followers.screen_name.as_deref(), Some("me"));
        assert_eq!(followers.entities, vec!["b", "a"]);
    }

    #[test]
    fn test_static_features() {
        let set: FeatureSet = [("b", "two"), ("a", "one")].into_iter().collect();
        let provider = StaticFeatures(set);
        let loaded = provider.load_features().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

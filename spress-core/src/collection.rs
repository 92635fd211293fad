use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::{CollectionConfig, Configuration};
use crate::item::{Item, PathKind};

pub const DEFAULT_COLLECTION: &str = "pages";

pub struct CollectionSet {
    /// Longest path first so nested collections win over their parents.
    collections: Vec<(String, CollectionConfig)>,
    fallback: CollectionConfig,
}

impl CollectionSet {
    pub fn from_config(config: &Configuration) -> Self {
        let mut collections: Vec<_> = config
            .collections
            .iter()
            .map(|(name, collection)| (name.clone(), collection.clone()))
            .collect();
        collections.sort_by_key(|(_, collection)| {
            std::cmp::Reverse(collection.path.trim_matches('/').len())
        });

        let fallback = config
            .collections
            .get(DEFAULT_COLLECTION)
            .cloned()
            .unwrap_or_default();

        Self {
            collections,
            fallback,
        }
    }

    /// Name of the collection owning `relative_path`.
    pub fn collection_for(&self, relative_path: &str) -> &str {
        for (name, collection) in &self.collections {
            let prefix = collection.path.trim_matches('/');
            if prefix.is_empty() {
                continue;
            }
            if relative_path == prefix
                || relative_path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
            {
                return name;
            }
        }
        DEFAULT_COLLECTION
    }

    pub fn get(&self, name: &str) -> &CollectionConfig {
        self.collections
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map_or(&self.fallback, |(_, collection)| collection)
    }

    /// Collection names, sorted, `pages` included.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.iter().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        if !names.contains(&DEFAULT_COLLECTION) {
            names.push(DEFAULT_COLLECTION);
        }
        names
    }

    /// Assign the item its collection and derive post attributes from the
    /// file name. Attributes already set are left alone.
    pub fn assign(&self, item: &mut Item) {
        let relative = item
            .path(PathKind::Relative)
            .unwrap_or(item.id())
            .to_owned();
        let name = self.collection_for(&relative);

        let attributes = item.attributes_mut();
        let assigned = attributes
            .entry("collection")
            .or_insert_with(|| Value::String(name.to_string()));
        if assigned.as_str() != Some("posts") {
            return;
        }
        let Some((date, title)) = parse_post_filename(&relative) else {
            tracing::debug!(item = %relative, "Post file name carries no date");
            return;
        };
        attributes
            .entry("date")
            .or_insert_with(|| Value::String(date.format("%Y-%m-%d").to_string()));
        attributes
            .entry("title_path")
            .or_insert_with(|| Value::String(title.to_string()));
    }
}

/// Split `2024-03-09-hello-world.md` into its date and `hello-world`.
pub fn parse_post_filename(path: &str) -> Option<(NaiveDate, &str)> {
    let file_name = path.rsplit('/').next()?;
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);

    let date = NaiveDate::parse_from_str(stem.get(..10)?, "%Y-%m-%d").ok()?;
    let title = stem.get(10..)?.strip_prefix('-')?;
    if title.is_empty() {
        return None;
    }
    Some((date, title))
}

/// Parse a `date` attribute: RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.naive_local());
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(date);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn item_date(item: &Item) -> Option<NaiveDateTime> {
    item.attribute("date").and_then(parse_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set() -> CollectionSet {
        let mut config = Configuration::default();
        config
            .collections
            .insert("guides".to_string(), CollectionConfig::with_path("docs/guides"));
        config
            .collections
            .insert("docs".to_string(), CollectionConfig::with_path("docs"));
        CollectionSet::from_config(&config)
    }

    #[test]
    fn longest_prefix_wins() {
        let set = set();
        assert_eq!(set.collection_for("_posts/2024-01-01-a.md"), "posts");
        assert_eq!(set.collection_for("docs/guides/setup.md"), "guides");
        assert_eq!(set.collection_for("docs/intro.md"), "docs");
        assert_eq!(set.collection_for("docsish.md"), "pages");
        assert_eq!(set.collection_for("about.md"), "pages");
    }

    #[test]
    fn names_include_pages() {
        let config = Configuration {
            collections: Default::default(),
            ..Configuration::default()
        };
        let set = CollectionSet::from_config(&config);
        assert_eq!(set.names(), ["pages"]);
        assert!(set.get("pages").output);
    }

    #[test]
    fn parses_post_file_names() {
        let (date, title) = parse_post_filename("_posts/2024-03-09-hello-world.md").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(title, "hello-world");

        assert!(parse_post_filename("_posts/hello.md").is_none());
        assert!(parse_post_filename("_posts/2024-13-01-bad.md").is_none());
        assert!(parse_post_filename("_posts/2024-01-01.md").is_none());
    }

    #[test]
    fn assign_sets_collection_and_post_attributes() {
        let set = set();
        let mut post = Item::new("_posts/2024-03-09-hello.md", "");
        set.assign(&mut post);
        assert_eq!(post.collection(), "posts");
        assert_eq!(post.attribute("date"), Some(&json!("2024-03-09")));
        assert_eq!(post.attribute("title_path"), Some(&json!("hello")));

        let mut dated = Item::new("_posts/2024-03-09-hello.md", "");
        dated.attributes_mut().insert("date".to_string(), json!("2020-01-01"));
        set.assign(&mut dated);
        assert_eq!(dated.attribute("date"), Some(&json!("2020-01-01")));

        let mut page = Item::new("about.md", "");
        set.assign(&mut page);
        assert_eq!(page.attribute("collection"), Some(&json!("pages")));
        assert_eq!(page.attribute("date"), None);
    }

    #[test]
    fn parses_date_formats() {
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_date(&json!("2024-01-02")), Some(midnight));
        assert_eq!(parse_date(&json!("2024-01-02 00:00:00")), Some(midnight));
        assert_eq!(parse_date(&json!("2024-01-02T00:00:00+02:00")), Some(midnight));
        assert_eq!(parse_date(&json!("yesterday")), None);
        assert_eq!(parse_date(&json!(12)), None);
    }
}

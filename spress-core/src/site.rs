use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};

use crate::collection::{CollectionSet, parse_date};
use crate::config::Configuration;
use crate::item::{Attributes, Item, PathKind};

const TAXONOMIES: [&str; 2] = ["categories", "tags"];

pub struct SiteAttributes {
    time: String,
    spress: Attributes,
    site: Attributes,
    summaries: HashMap<String, Value>,
    defaults: Attributes,
    collection_attributes: BTreeMap<String, Attributes>,
}

impl SiteAttributes {
    pub fn new(config: &Configuration) -> Self {
        let mut spress = Attributes::new();
        spress.insert("name".to_string(), json!("spress"));
        spress.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        spress.insert("external".to_string(), json!({}));

        Self {
            time: chrono::Utc::now().to_rfc3339(),
            spress,
            site: config.site.clone(),
            summaries: HashMap::new(),
            defaults: config.defaults.clone(),
            collection_attributes: config
                .collections
                .iter()
                .map(|(name, collection)| (name.clone(), collection.attributes.clone()))
                .collect(),
        }
    }

    /// Pin the build time, mostly for reproducible output.
    #[must_use]
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = time.into();
        self
    }

    /// Recompute the `site` section from scratch. Lists keep discovery
    /// order, except the posts list which is newest first.
    pub fn rebuild(&mut self, items: &[Item], config: &Configuration, collections: &CollectionSet) {
        let mut site = config.site.clone();
        site.insert("time".to_string(), Value::String(self.time.clone()));

        let mut by_collection: BTreeMap<String, Vec<Value>> = collections
            .names()
            .into_iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        let mut taxonomies: [Map<String, Value>; 2] = [Map::new(), Map::new()];
        self.summaries.clear();

        for item in items.iter().filter(|item| !item.is_binary()) {
            let summary = summary(item);
            by_collection
                .entry(item.collection().to_string())
                .or_default()
                .push(summary.clone());

            for (taxonomy, terms) in TAXONOMIES.iter().zip(taxonomies.iter_mut()) {
                for term in terms_of(item, taxonomy) {
                    let entry = terms.entry(term).or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(list) = entry {
                        list.push(summary.clone());
                    }
                }
            }
            self.summaries.insert(item.id().to_string(), summary);
        }

        if let Some(posts) = by_collection.get_mut("posts") {
            // Stable: equal dates keep discovery order.
            posts.sort_by(|a, b| date_of(b).cmp(&date_of(a)));
        }

        let mut collection_map = Map::new();
        for (name, list) in by_collection {
            site.insert(name.clone(), Value::Array(list.clone()));
            collection_map.insert(name, Value::Array(list));
        }
        site.insert("collections".to_string(), Value::Object(collection_map));

        let [categories, tags] = taxonomies;
        site.insert("categories".to_string(), Value::Object(categories));
        site.insert("tags".to_string(), Value::Object(tags));

        tracing::debug!(items = self.summaries.len(), "Rebuilt site attributes");
        self.site = site;
    }

    /// Update the `content` of every item summary without touching
    /// anything else.
    pub fn refresh_contents(&mut self, items: &[Item]) {
        let contents: HashMap<&str, &str> = items
            .iter()
            .map(|item| (item.id(), item.latest_content()))
            .collect();

        for value in self.site.values_mut() {
            patch_contents(value, &contents);
        }
        for (id, summary) in self.summaries.iter_mut() {
            if let (Some(content), Value::Object(map)) = (contents.get(id.as_str()), summary) {
                map.insert("content".to_string(), json!(content));
            }
        }
    }

    pub fn spress(&self) -> &Attributes {
        &self.spress
    }

    pub fn site(&self) -> &Attributes {
        &self.site
    }

    pub fn summary(&self, id: &str) -> Option<&Value> {
        self.summaries.get(id)
    }

    /// Payload for rendering `item`: `spress` and `page`, where `page`
    /// layers configuration defaults, then collection attributes, then the
    /// item's own attributes. The item is not modified. The `site` section
    /// is shared through [`Renderer::set_site`](crate::template::Renderer::set_site).
    pub fn page_payload(&self, item: &Item) -> Attributes {
        let mut page = self.defaults.clone();
        if let Some(attributes) = self.collection_attributes.get(item.collection()) {
            page.extend(attributes.clone());
        }
        page.extend(item.attributes().clone());
        if let Value::Object(identity) = identity(item) {
            page.extend(identity);
        }
        if let Some(Value::Object(paginator)) = page.get_mut("paginator") {
            self.resolve_paginator(paginator);
        }

        let mut payload = Attributes::new();
        payload.insert("spress".to_string(), Value::Object(self.spress.clone()));
        payload.insert("page".to_string(), Value::Object(page));
        payload
    }

    /// Swap item ids for summaries and page ids for their URLs.
    fn resolve_paginator(&self, paginator: &mut Map<String, Value>) {
        if let Some(Value::Array(items)) = paginator.get_mut("items") {
            for entry in items.iter_mut() {
                if let Some(summary) = entry.as_str().and_then(|id| self.summaries.get(id)) {
                    *entry = summary.clone();
                }
            }
        }
        for (id_key, path_key) in [
            ("previous_page_id", "previous_page_path"),
            ("next_page_id", "next_page_path"),
        ] {
            let url = paginator
                .get(id_key)
                .and_then(Value::as_str)
                .and_then(|id| self.summaries.get(id))
                .and_then(|summary| summary.get("url"))
                .cloned()
                .unwrap_or(Value::Null);
            paginator.insert(path_key.to_string(), url);
        }
    }
}

fn identity(item: &Item) -> Value {
    json!({
        "id": item.id(),
        "path": item.path(PathKind::Relative).unwrap_or(item.id()),
        "url": item.attribute("url").cloned().unwrap_or(Value::Null),
        "collection": item.collection(),
        "content": item.latest_content(),
    })
}

/// Item attributes plus id, path, url, collection and content.
fn summary(item: &Item) -> Value {
    let mut map = item.attributes().clone();
    if let Value::Object(identity) = identity(item) {
        map.extend(identity);
    }
    Value::Object(map)
}

fn terms_of(item: &Item, taxonomy: &str) -> Vec<String> {
    match item.attribute(taxonomy) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(term)) => vec![term.clone()],
        _ => Vec::new(),
    }
}

fn date_of(summary: &Value) -> Option<chrono::NaiveDateTime> {
    summary.get("date").and_then(parse_date)
}

fn patch_contents(value: &mut Value, contents: &HashMap<&str, &str>) {
    match value {
        Value::Array(list) => {
            for entry in list {
                patch_contents(entry, contents);
            }
        }
        Value::Object(map) => {
            let content = map
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| contents.get(id))
                .copied();
            match content {
                Some(content) if map.contains_key("content") => {
                    map.insert("content".to_string(), json!(content));
                }
                _ => {
                    for entry in map.values_mut() {
                        patch_contents(entry, contents);
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectionConfig;
    use crate::item::SnapshotKind;
    use pretty_assertions::assert_eq;

    fn item(id: &str, attrs: Value) -> Item {
        let Value::Object(map) = attrs else {
            unreachable!()
        };
        Item::new(id, "").with_attributes(map)
    }

    fn ids(list: &Value) -> Vec<&str> {
        list.as_array()
            .unwrap()
            .iter()
            .map(|summary| summary["id"].as_str().unwrap())
            .collect()
    }

    fn fixture() -> (Configuration, Vec<Item>) {
        let mut config = Configuration::default();
        config.set("title", "Blog");
        config.defaults.insert("layout".to_string(), json!("default"));
        config.collections.insert(
            "posts".to_string(),
            CollectionConfig {
                attributes: json!({ "layout": "post", "author": "team" })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ..CollectionConfig::with_path("_posts")
            },
        );

        let items = vec![
            item(
                "_posts/2024-01-01-old.md",
                json!({ "collection": "posts", "date": "2024-01-01", "tags": ["rust", "web"] }),
            ),
            item(
                "_posts/2024-02-01-new.md",
                json!({ "collection": "posts", "date": "2024-02-01", "tags": "rust", "categories": ["news"], "author": "ann" }),
            ),
            item("about.md", json!({ "collection": "pages", "title": "About" })),
        ];
        (config, items)
    }

    #[test]
    fn builds_collections_and_taxonomies() {
        let (config, items) = fixture();
        let collections = CollectionSet::from_config(&config);
        let mut site = SiteAttributes::new(&config).with_time("2024-03-01T00:00:00+00:00");
        site.rebuild(&items, &config, &collections);

        let attrs = site.site();
        assert_eq!(attrs["title"], "Blog");
        assert_eq!(attrs["time"], "2024-03-01T00:00:00+00:00");
        assert_eq!(
            ids(&attrs["posts"]),
            ["_posts/2024-02-01-new.md", "_posts/2024-01-01-old.md"]
        );
        assert_eq!(ids(&attrs["pages"]), ["about.md"]);
        assert_eq!(ids(&attrs["collections"]["pages"]), ["about.md"]);
        assert_eq!(
            ids(&attrs["tags"]["rust"]),
            ["_posts/2024-01-01-old.md", "_posts/2024-02-01-new.md"]
        );
        assert_eq!(ids(&attrs["tags"]["web"]), ["_posts/2024-01-01-old.md"]);
        assert_eq!(ids(&attrs["categories"]["news"]), ["_posts/2024-02-01-new.md"]);
        assert_eq!(site.spress()["name"], "spress");
    }

    #[test]
    fn page_layers_defaults_collection_and_item() {
        let (config, items) = fixture();
        let collections = CollectionSet::from_config(&config);
        let mut site = SiteAttributes::new(&config);
        site.rebuild(&items, &config, &collections);

        let payload = site.page_payload(&items[1]);
        let page = &payload["page"];
        assert_eq!(page["layout"], "post");
        assert_eq!(page["author"], "ann");
        assert_eq!(page["id"], "_posts/2024-02-01-new.md");
        assert_eq!(payload.get("site"), None);
        assert_eq!(payload["spress"]["name"], "spress");

        let about = site.page_payload(&items[2]);
        assert_eq!(about["page"]["layout"], "default");
        assert_eq!(about["page"].get("author"), None);

        assert_eq!(items[1].attributes().len(), 5);
    }

    #[test]
    fn refresh_updates_contents_everywhere() {
        let (config, mut items) = fixture();
        let collections = CollectionSet::from_config(&config);
        let mut site = SiteAttributes::new(&config);
        site.rebuild(&items, &config, &collections);

        items[0].set_content(SnapshotKind::RenderedBlocks, "<p>old</p>");
        site.refresh_contents(&items);

        assert_eq!(site.site()["posts"][1]["content"], "<p>old</p>");
        assert_eq!(site.site()["tags"]["web"][0]["content"], "<p>old</p>");
        assert_eq!(site.summary("_posts/2024-01-01-old.md").unwrap()["content"], "<p>old</p>");
    }

    #[test]
    fn paginator_ids_become_summaries() {
        let (config, mut items) = fixture();
        items[2]
            .attributes_mut()
            .insert("url".to_string(), json!("/about/"));
        let mut blog = item(
            "blog/index.html",
            json!({
                "paginator": {
                    "items": ["_posts/2024-02-01-new.md"],
                    "next_page_id": "about.md",
                    "previous_page_id": null,
                }
            }),
        );
        blog.attributes_mut().insert("url".to_string(), json!("/blog/"));
        items.push(blog);

        let collections = CollectionSet::from_config(&config);
        let mut site = SiteAttributes::new(&config);
        site.rebuild(&items, &config, &collections);

        let payload = site.page_payload(&items[3]);
        let paginator = &payload["page"]["paginator"];
        assert_eq!(paginator["items"][0]["author"], "ann");
        assert_eq!(paginator["next_page_path"], "/about/");
        assert_eq!(paginator["previous_page_path"], Value::Null);
        assert!(items[3].attributes()["paginator"]["items"][0].is_string());
    }
}

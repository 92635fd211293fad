use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::Attributes;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// What happens when a converter fails or no converter matches an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionErrorPolicy {
    #[default]
    Abort,
    /// Drop the item from the build and keep going.
    Skip,
}

/// What happens when a plugin listener fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerErrorPolicy {
    /// Stop the dispatch at the first failing listener.
    #[default]
    Abort,
    /// Run every listener, then report all failures together.
    Collect,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildPolicy {
    pub on_conversion_error: ConversionErrorPolicy,
    pub on_listener_error: ListenerErrorPolicy,
    /// Convert items on the rayon pool when no plugin listens to conversion.
    pub parallel_conversion: bool,
    /// Keep items marked `draft: true`.
    pub drafts: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Directory prefix, relative to the content root. Empty matches everything.
    pub path: String,
    /// Whether items of this collection are written.
    pub output: bool,
    /// Permalink style or pattern overriding the site default.
    pub permalink: Option<String>,
    /// Attributes every item of the collection inherits.
    pub attributes: Attributes,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            output: true,
            permalink: None,
            attributes: Attributes::new(),
        }
    }
}

impl CollectionConfig {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

fn default_collections() -> BTreeMap<String, CollectionConfig> {
    BTreeMap::from([
        ("posts".to_string(), CollectionConfig::with_path("_posts")),
        ("pages".to_string(), CollectionConfig::default()),
    ])
}

fn default_mirror_extensions() -> Vec<String> {
    ["html", "htm", "xml", "css", "js", "txt", "json"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Build configuration handed to the pipeline and, through
/// `EnvironmentEvent`, to plugins.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    /// Free-form site values, exposed to templates under `site`.
    pub site: Attributes,
    pub build: BuildPolicy,
    pub collections: BTreeMap<String, CollectionConfig>,
    /// Default permalink style: `none`, `pretty`, `date`, `ordinal` or a pattern.
    pub permalink: String,
    /// Attributes merged under every page.
    pub defaults: Attributes,
    pub mirror_extensions: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            site: Attributes::new(),
            build: BuildPolicy::default(),
            collections: default_collections(),
            permalink: "pretty".to_string(),
            defaults: Attributes::new(),
            mirror_extensions: default_mirror_extensions(),
        }
    }
}

impl Configuration {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let config: Configuration = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permalink.trim().is_empty() {
            return Err(ConfigError::Validation(
                "permalink style must not be empty".to_string(),
            ));
        }
        if let Some(name) = self.collections.keys().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "collection name '{name}' must not be empty"
            )));
        }

        let mut seen = BTreeMap::new();
        for (name, collection) in &self.collections {
            let path = collection.path.trim_matches('/');
            if let Some(other) = seen.insert(path, name) {
                return Err(ConfigError::Validation(format!(
                    "collections '{other}' and '{name}' share the path '{path}'"
                )));
            }
        }
        Ok(())
    }

    /// Site value, as seen by templates under `site.<key>`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.site.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.site.insert(key.into(), value.into());
    }
}

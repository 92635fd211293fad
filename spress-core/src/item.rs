use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

/// Front matter and metadata attached to an item.
pub type Attributes = Map<String, Value>;

/// Content snapshot kinds, in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SnapshotKind {
    /// Source text as discovered.
    Raw,
    /// Output of the converter.
    Converted,
    /// Content after block-level template rendering.
    RenderedBlocks,
    /// Final page output, layout applied.
    Rendered,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Raw => "raw",
            SnapshotKind::Converted => "converted",
            SnapshotKind::RenderedBlocks => "rendered_blocks",
            SnapshotKind::Rendered => "rendered",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path snapshot kinds. Unlike content there is no fallback between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathKind {
    /// Absolute location of the source file, when it came from disk.
    Source,
    /// Path relative to the content root.
    Relative,
    /// Relative path with the converter's output extension.
    RelativeAfterConvert,
    /// Output file path derived from the permalink.
    Permalink,
}

impl PathKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PathKind::Source => "source",
            PathKind::Relative => "relative",
            PathKind::RelativeAfterConvert => "relative_after_convert",
            PathKind::Permalink => "permalink",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("Snapshot '{kind}' not found for item '{id}'")]
    SnapshotNotFound { id: String, kind: &'static str },
}

/// One content unit: a page, post, data file or binary asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: String,
    contents: BTreeMap<SnapshotKind, String>,
    paths: BTreeMap<PathKind, String>,
    attributes: Attributes,
    binary: bool,
}

impl Item {
    /// Create a text item. The id doubles as the relative path.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let mut paths = BTreeMap::new();
        paths.insert(PathKind::Relative, id.clone());
        let mut contents = BTreeMap::new();
        contents.insert(SnapshotKind::Raw, content.into());

        Self {
            id,
            contents,
            paths,
            attributes: Attributes::new(),
            binary: false,
        }
    }

    /// Create a binary item backed by a file on disk.
    ///
    /// Binary items carry no text; writers copy them from their source path.
    pub fn binary(id: impl Into<String>, source: impl AsRef<Path>) -> Self {
        let mut item = Self::new(id, String::new());
        item.binary = true;
        item.set_path(
            PathKind::Source,
            source.as_ref().to_string_lossy().into_owned(),
        );
        item
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Content for `kind`, falling back to the latest earlier snapshot.
    pub fn content(&self, kind: SnapshotKind) -> Result<&str, ItemError> {
        self.contents
            .range(..=kind)
            .next_back()
            .map(|(_, text)| text.as_str())
            .ok_or_else(|| ItemError::SnapshotNotFound {
                id: self.id.clone(),
                kind: kind.as_str(),
            })
    }

    /// Content of the most advanced snapshot set so far.
    pub fn latest_content(&self) -> &str {
        self.contents
            .last_key_value()
            .map_or("", |(_, text)| text.as_str())
    }

    /// Kind of the most advanced snapshot set so far.
    pub fn latest_snapshot(&self) -> SnapshotKind {
        self.contents
            .last_key_value()
            .map_or(SnapshotKind::Raw, |(kind, _)| *kind)
    }

    pub fn set_content(&mut self, kind: SnapshotKind, content: impl Into<String>) {
        self.contents.insert(kind, content.into());
    }

    pub fn path(&self, kind: PathKind) -> Result<&str, ItemError> {
        self.paths
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| ItemError::SnapshotNotFound {
                id: self.id.clone(),
                kind: kind.as_str(),
            })
    }

    pub fn set_path(&mut self, kind: PathKind, path: impl Into<String>) {
        self.paths.insert(kind, path.into());
    }

    /// Where a writer should put this item: permalink, then the converted
    /// relative path, then the relative path.
    pub fn output_path(&self) -> Option<&str> {
        [
            PathKind::Permalink,
            PathKind::RelativeAfterConvert,
            PathKind::Relative,
        ]
        .into_iter()
        .find_map(|kind| self.paths.get(&kind))
        .map(String::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Replace the whole attribute map.
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Collection name assigned during preparation, `pages` when unassigned.
    pub fn collection(&self) -> &str {
        self.str_attribute("collection").unwrap_or("pages")
    }
}

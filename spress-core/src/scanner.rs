use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::frontmatter::{self, FrontMatterError};
use crate::item::{Item, PathKind};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walking source directory failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Front matter of '{}': {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
}

/// Turns a content directory into items.
///
/// Files are visited in file-name order. Hidden entries and the layout and
/// include directories are skipped. Files that are not UTF-8 become binary
/// items.
pub struct SourceScanner {
    source_dir: PathBuf,
    excluded: Vec<String>,
}

impl SourceScanner {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source_dir: path.as_ref().to_path_buf(),
            excluded: vec!["_layouts".to_string(), "_includes".to_string()],
        }
    }

    /// Skip another top-level directory, e.g. a theme living inside the
    /// content root.
    pub fn exclude<S: Into<String>>(mut self, name: S) -> Self {
        self.excluded.push(name.into());
        self
    }

    pub fn scan(&self) -> Result<Vec<Item>, ScanError> {
        tracing::info!(dir = %self.source_dir.display(), "Scanning");

        let mut items = Vec::new();
        let walker = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_skipped(entry));

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() {
                items.push(self.scan_file(entry.path())?);
            }
        }

        tracing::debug!(items = items.len(), "Scan complete");
        Ok(items)
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.')
            || (entry.depth() == 1 && self.excluded.iter().any(|excluded| *excluded == name))
    }

    fn scan_file(&self, path: &Path) -> Result<Item, ScanError> {
        let relative = self.relative_id(path)?;
        let bytes = std::fs::read(path)?;

        let Ok(text) = String::from_utf8(bytes) else {
            tracing::debug!(item = %relative, "Binary file");
            return Ok(Item::binary(relative, path));
        };

        let (attributes, body) =
            frontmatter::parse(&text).map_err(|source| ScanError::FrontMatter {
                path: path.to_path_buf(),
                source,
            })?;

        let mut item = Item::new(relative, body).with_attributes(attributes);
        item.set_path(PathKind::Source, path.to_string_lossy().into_owned());
        Ok(item)
    }

    /// Forward-slash path relative to the source directory.
    fn relative_id(&self, path: &Path) -> Result<String, ScanError> {
        let relative = path
            .strip_prefix(&self.source_dir)
            .map_err(|_| ScanError::InvalidPath(path.to_path_buf()))?;

        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return Err(ScanError::InvalidPath(path.to_path_buf()));
        }
        Ok(parts.join("/"))
    }
}

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::item::{Item, PathKind};

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("Writing '{}' failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Item '{0}' has no usable output path")]
    InvalidPath(String),
}

/// Receives finished items. Writing the same id twice replaces the earlier
/// output.
pub trait DataWriter {
    fn write(&mut self, item: &Item) -> Result<(), WriterError>;

    fn has_item(&self, id: &str) -> bool;

    fn get_item(&self, id: &str) -> Option<&Item>;

    fn count_items(&self) -> usize;

    /// Written items in first-write order.
    fn get_items(&self) -> Vec<&Item>;
}

/// Keeps written items in memory, in first-write order.
#[derive(Debug, Default)]
pub struct MemoryDataWriter {
    items: Vec<Item>,
    positions: HashMap<String, usize>,
}

impl MemoryDataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, item: &Item) {
        match self.positions.get(item.id()) {
            Some(&position) => self.items[position] = item.clone(),
            None => {
                self.positions.insert(item.id().to_string(), self.items.len());
                self.items.push(item.clone());
            }
        }
    }
}

impl DataWriter for MemoryDataWriter {
    fn write(&mut self, item: &Item) -> Result<(), WriterError> {
        self.record(item);
        Ok(())
    }

    fn has_item(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    fn get_item(&self, id: &str) -> Option<&Item> {
        self.positions.get(id).map(|&position| &self.items[position])
    }

    fn count_items(&self) -> usize {
        self.items.len()
    }

    fn get_items(&self) -> Vec<&Item> {
        self.items.iter().collect()
    }
}

/// Writes each item's latest content under an output directory, at its
/// output path. Binary items are copied from their source file.
#[derive(Debug)]
pub struct FilesystemDataWriter {
    output_dir: PathBuf,
    written: MemoryDataWriter,
}

impl FilesystemDataWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            written: MemoryDataWriter::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination of `item`. Rejects absolute paths and `..` segments.
    pub fn target_path(&self, item: &Item) -> Result<PathBuf, WriterError> {
        let relative = item
            .output_path()
            .map(|path| path.trim_start_matches('/'))
            .filter(|path| !path.is_empty())
            .ok_or_else(|| WriterError::InvalidPath(item.id().to_string()))?;

        let safe = Path::new(relative)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(WriterError::InvalidPath(item.id().to_string()));
        }
        Ok(self.output_dir.join(relative))
    }
}

impl DataWriter for FilesystemDataWriter {
    fn write(&mut self, item: &Item) -> Result<(), WriterError> {
        let path = self.target_path(item)?;
        let io_err = |source| WriterError::Io {
            path: path.clone(),
            source,
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        match item.path(PathKind::Source) {
            Ok(source) if item.is_binary() => {
                std::fs::copy(source, &path).map_err(io_err)?;
            }
            _ => std::fs::write(&path, item.latest_content()).map_err(io_err)?,
        }

        tracing::debug!(item = item.id(), path = %path.display(), "Wrote item");
        self.written.record(item);
        Ok(())
    }

    fn has_item(&self, id: &str) -> bool {
        self.written.has_item(id)
    }

    fn get_item(&self, id: &str) -> Option<&Item> {
        self.written.get_item(id)
    }

    fn count_items(&self) -> usize {
        self.written.count_items()
    }

    fn get_items(&self) -> Vec<&Item> {
        self.written.get_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SnapshotKind;

    #[test]
    fn memory_writer_replaces_same_id() {
        let mut writer = MemoryDataWriter::new();
        writer.write(&Item::new("a.md", "one")).unwrap();
        writer.write(&Item::new("b.md", "two")).unwrap();
        writer.write(&Item::new("a.md", "three")).unwrap();

        assert_eq!(writer.count_items(), 2);
        assert!(writer.has_item("a.md"));
        assert!(!writer.has_item("c.md"));
        assert_eq!(writer.get_item("a.md").unwrap().latest_content(), "three");

        let ids: Vec<&str> = writer.get_items().into_iter().map(Item::id).collect();
        assert_eq!(ids, ["a.md", "b.md"]);
    }

    #[test]
    fn filesystem_writer_uses_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FilesystemDataWriter::new(dir.path());

        let mut item = Item::new("about.md", "# About");
        item.set_content(SnapshotKind::Rendered, "<h1>About</h1>");
        item.set_path(PathKind::Permalink, "about/index.html");
        writer.write(&item).unwrap();

        let written = std::fs::read_to_string(dir.path().join("about/index.html")).unwrap();
        assert_eq!(written, "<h1>About</h1>");
        assert!(writer.has_item("about.md"));
        assert_eq!(writer.count_items(), 1);
    }

    #[test]
    fn filesystem_writer_copies_binaries() {
        let source = tempfile::tempdir().unwrap();
        let logo = source.path().join("logo.png");
        std::fs::write(&logo, [0x89, b'P', b'N', b'G']).unwrap();

        let out = tempfile::tempdir().unwrap();
        let mut writer = FilesystemDataWriter::new(out.path());
        writer.write(&Item::binary("img/logo.png", &logo)).unwrap();

        let copied = std::fs::read(out.path().join("img/logo.png")).unwrap();
        assert_eq!(copied, [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn rejects_escaping_paths() {
        let writer = FilesystemDataWriter::new("/tmp/out");
        let mut item = Item::new("evil.md", "");
        item.set_path(PathKind::Permalink, "../etc/passwd");
        assert!(matches!(
            writer.target_path(&item),
            Err(WriterError::InvalidPath(ref id)) if id == "evil.md"
        ));
    }
}

use std::path::Path;

use crate::item::{Item, PathKind, SnapshotKind};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A format converter, e.g. Markdown to HTML.
pub trait Converter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn matches(&self, extension: &str) -> bool;

    fn convert(&self, input: &str) -> Result<String, BoxError>;

    /// Extension of the converted output for a given input extension.
    fn out_extension(&self, extension: &str) -> String;

    fn priority(&self) -> i32 {
        0
    }
}

/// Converted text plus the extension the output should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterResult {
    result: String,
    out_extension: String,
}

impl ConverterResult {
    pub fn new(result: impl Into<String>, out_extension: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            out_extension: out_extension.into(),
        }
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn out_extension(&self) -> &str {
        &self.out_extension
    }

    pub fn into_parts(self) -> (String, String) {
        (self.result, self.out_extension)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConverterError {
    #[error("No converter matches extension '{extension}' of item '{id}'")]
    UnsupportedFormat { id: String, extension: String },

    #[error("Converting item '{id}' failed: {source}")]
    ConversionFailed {
        id: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: Converter + 'static>(&mut self, converter: C) {
        self.register_boxed(Box::new(converter));
    }

    pub fn register_boxed(&mut self, converter: Box<dyn Converter>) {
        tracing::debug!(
            converter = converter.name(),
            priority = converter.priority(),
            "Registered converter"
        );
        self.converters.push(converter);
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Highest-priority converter matching `extension`, earliest on ties.
    pub fn select(&self, extension: &str) -> Option<&dyn Converter> {
        let mut selected: Option<&dyn Converter> = None;
        for converter in &self.converters {
            if !converter.matches(extension) {
                continue;
            }
            if selected.is_none_or(|current| converter.priority() > current.priority()) {
                selected = Some(converter.as_ref());
            }
        }
        selected
    }

    /// Convert the item's raw content with the selected converter.
    pub fn convert(&self, item: &Item) -> Result<ConverterResult, ConverterError> {
        let extension = item_extension(item);
        let raw = item
            .content(SnapshotKind::Raw)
            .map_err(|e| ConverterError::ConversionFailed {
                id: item.id().to_owned(),
                source: Box::new(e),
            })?;
        self.convert_text(item.id(), &extension, raw)
    }

    pub fn convert_text(
        &self,
        id: &str,
        extension: &str,
        text: &str,
    ) -> Result<ConverterResult, ConverterError> {
        let converter =
            self.select(extension)
                .ok_or_else(|| ConverterError::UnsupportedFormat {
                    id: id.to_owned(),
                    extension: extension.to_owned(),
                })?;

        let result = converter
            .convert(text)
            .map_err(|source| ConverterError::ConversionFailed {
                id: id.to_owned(),
                source,
            })?;

        tracing::debug!(item = id, converter = converter.name(), "Converted item");
        Ok(ConverterResult::new(
            result,
            converter.out_extension(extension),
        ))
    }
}

/// Extension of the item's relative path, or of its id when unset.
pub fn item_extension(item: &Item) -> String {
    let path = item.path(PathKind::Relative).unwrap_or(item.id());
    extension_of(path).to_owned()
}

pub(crate) fn extension_of(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// Replace the extension of a relative path, keeping its directory.
pub(crate) fn with_extension(path: &str, extension: &str) -> String {
    Path::new(path)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

/// Passes content through untouched. Used for HTML, CSS and other files
/// that need no conversion but still go through rendering.
pub struct MirrorConverter {
    extensions: Vec<String>,
}

impl MirrorConverter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl Converter for MirrorConverter {
    fn name(&self) -> &str {
        "mirror"
    }

    fn matches(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    fn convert(&self, input: &str) -> Result<String, BoxError> {
        Ok(input.to_owned())
    }

    fn out_extension(&self, extension: &str) -> String {
        extension.to_owned()
    }
}

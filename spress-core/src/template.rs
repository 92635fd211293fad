use std::path::Path;

use serde_json::Value;
use tera::{Context, Tera};

use crate::item::Attributes;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template error: {0}")]
    Tera(#[from] tera::Error),

    #[error("Rendering '{id}' failed: {source}")]
    Render {
        id: String,
        #[source]
        source: tera::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layout '{layout}' used by '{id}' not found")]
    LayoutNotFound { id: String, layout: String },
}

/// What the pipeline needs from a template engine.
pub trait Renderer {
    /// Site-wide values visible as `site` in every render until the next
    /// call. Keys in a render's payload take precedence.
    fn set_site(&mut self, site: &Attributes) -> Result<(), TemplateError>;

    /// Render `template` as a one-off template against `payload`.
    fn render_string(
        &mut self,
        id: &str,
        template: &str,
        payload: &Attributes,
    ) -> Result<String, TemplateError>;

    /// Wrap block-rendered `content` in `layout`. Without a layout the
    /// content is returned as is.
    fn render_page(
        &mut self,
        id: &str,
        content: &str,
        layout: Option<&str>,
        payload: &Attributes,
    ) -> Result<String, TemplateError>;
}

/// Tera-backed renderer. Layouts and includes are loaded from a theme glob
/// or registered by hand.
pub struct TeraRenderer {
    tera: Tera,
    shared: Context,
}

impl Default for TeraRenderer {
    fn default() -> Self {
        Self::empty()
    }
}

impl TeraRenderer {
    /// Renderer without layouts.
    pub fn empty() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        Self {
            tera,
            shared: Context::new(),
        }
    }

    /// Load every template matching `theme_glob`, e.g. `theme/**/*.html`.
    pub fn new(theme_glob: &str) -> Result<Self, TemplateError> {
        let mut tera = Tera::new(theme_glob)?;
        tera.autoescape_on(vec![]);
        Ok(Self {
            tera,
            shared: Context::new(),
        })
    }

    /// Load all templates under `dir`. A missing directory gives an empty
    /// renderer.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "No layout directory, rendering without layouts");
            return Ok(Self::empty());
        }
        Self::new(&format!("{}/**/*", dir.display()))
    }

    pub fn add_layout(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.tera.add_raw_template(name, source)?;
        Ok(())
    }

    pub fn layouts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tera.get_template_names().collect();
        names.sort_unstable();
        names
    }

    fn resolve_layout(&self, layout: &str) -> Option<String> {
        [
            layout.to_string(),
            format!("{layout}.html"),
            format!("_layouts/{layout}.html"),
        ]
        .into_iter()
        .find(|name| self.tera.get_template_names().any(|known| known == name))
    }
}

fn has_template_markers(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

impl TeraRenderer {
    /// Run `render` with `payload` (and `content`) layered over the shared
    /// context, then put the shared values back.
    fn render_layered<F>(
        &mut self,
        payload: &Attributes,
        content: Option<&str>,
        render: F,
    ) -> Result<String, tera::Error>
    where
        F: FnOnce(&mut Tera, &Context) -> Result<String, tera::Error>,
    {
        let content = content.map(|text| ("content".to_string(), Value::String(text.to_string())));
        let layered = payload
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .chain(content);

        let mut shadowed = Vec::new();
        for (key, value) in layered {
            shadowed.push((key.clone(), self.shared.remove(&key)));
            self.shared.insert(key, &value);
        }
        let result = render(&mut self.tera, &self.shared);
        for (key, previous) in shadowed.into_iter().rev() {
            self.shared.remove(&key);
            if let Some(previous) = previous {
                self.shared.insert(key, &previous);
            }
        }
        result
    }
}

impl Renderer for TeraRenderer {
    fn set_site(&mut self, site: &Attributes) -> Result<(), TemplateError> {
        let mut shared = Context::new();
        shared.try_insert("site", site)?;
        self.shared = shared;
        Ok(())
    }

    fn render_string(
        &mut self,
        id: &str,
        template: &str,
        payload: &Attributes,
    ) -> Result<String, TemplateError> {
        if !has_template_markers(template) {
            return Ok(template.to_string());
        }
        self.render_layered(payload, None, |tera, context| tera.render_str(template, context))
            .map_err(|source| TemplateError::Render {
                id: id.to_string(),
                source,
            })
    }

    fn render_page(
        &mut self,
        id: &str,
        content: &str,
        layout: Option<&str>,
        payload: &Attributes,
    ) -> Result<String, TemplateError> {
        let Some(layout) = layout else {
            return Ok(content.to_string());
        };
        let name = self
            .resolve_layout(layout)
            .ok_or_else(|| TemplateError::LayoutNotFound {
                id: id.to_string(),
                layout: layout.to_string(),
            })?;

        tracing::debug!(item = id, layout = %name, "Applying layout");
        self.render_layered(payload, Some(content), |tera, context| tera.render(&name, context))
            .map_err(|source| TemplateError::Render {
                id: id.to_string(),
                source,
            })
    }
}

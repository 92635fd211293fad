use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::builder::BuildSummary;
use crate::config::Configuration;
use crate::converter::ConverterRegistry;
use crate::item::{Attributes, Item, ItemError, PathKind, SnapshotKind};
use crate::permalink::Permalink;
use crate::writer::DataWriter;

/// Stable event names, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventName {
    Start,
    BeforeConvert,
    AfterConvert,
    BeforeRenderBlocks,
    AfterRenderBlocks,
    BeforeRenderPage,
    AfterRenderPage,
    Finish,
}

impl EventName {
    pub const ALL: [EventName; 8] = [
        EventName::Start,
        EventName::BeforeConvert,
        EventName::AfterConvert,
        EventName::BeforeRenderBlocks,
        EventName::AfterRenderBlocks,
        EventName::BeforeRenderPage,
        EventName::AfterRenderPage,
        EventName::Finish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Start => "spress.start",
            EventName::BeforeConvert => "spress.before_convert",
            EventName::AfterConvert => "spress.after_convert",
            EventName::BeforeRenderBlocks => "spress.before_render_blocks",
            EventName::AfterRenderBlocks => "spress.after_render_blocks",
            EventName::BeforeRenderPage => "spress.before_render_page",
            EventName::AfterRenderPage => "spress.after_render_page",
            EventName::Finish => "spress.finish",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event name '{0}'")]
pub struct UnknownEventName(pub String);

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_owned()))
    }
}

/// Event payload handed to listeners.
pub enum Event<'a> {
    Environment(EnvironmentEvent<'a>),
    Content(ContentEvent<'a>),
    Render(RenderEvent<'a>),
    Finish(FinishEvent<'a>),
}

impl Event<'_> {
    /// The item this event is about, if any.
    pub fn item(&self) -> Option<&Item> {
        match self {
            Event::Content(event) => Some(&*event.item),
            Event::Render(event) => Some(&*event.item),
            Event::Environment(_) | Event::Finish(_) => None,
        }
    }
}

/// Fired at start. Exposes the build configuration, the converter registry
/// and the data writer.
pub struct EnvironmentEvent<'a> {
    pub(crate) configuration: &'a mut Configuration,
    pub(crate) converters: &'a mut ConverterRegistry,
    pub(crate) writer: &'a mut dyn DataWriter,
}

impl<'a> EnvironmentEvent<'a> {
    pub fn new(
        configuration: &'a mut Configuration,
        converters: &'a mut ConverterRegistry,
        writer: &'a mut dyn DataWriter,
    ) -> Self {
        Self {
            configuration,
            converters,
            writer,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        self.configuration
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        self.configuration
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        self.converters
    }

    pub fn writer(&self) -> &dyn DataWriter {
        self.writer
    }
}

/// Fired before and after converting an item.
///
/// `set_content` writes into the snapshot this event treats as current.
pub struct ContentEvent<'a> {
    pub(crate) item: &'a mut Item,
    pub(crate) snapshot: SnapshotKind,
    pub(crate) path: PathKind,
}

impl<'a> ContentEvent<'a> {
    pub fn new(item: &'a mut Item, snapshot: SnapshotKind, path: PathKind) -> Self {
        Self {
            item,
            snapshot,
            path,
        }
    }

    pub fn id(&self) -> &str {
        self.item.id()
    }

    pub fn content(&self) -> Result<&str, ItemError> {
        self.item.content(self.snapshot)
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.item.set_content(self.snapshot, content);
    }

    pub fn path(&self) -> Result<&str, ItemError> {
        self.item.path(self.path)
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.item.set_path(self.path, path);
    }

    pub fn attributes(&self) -> &Attributes {
        self.item.attributes()
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        self.item.attributes_mut()
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.item.set_attributes(attributes);
    }

    pub fn snapshot_kind(&self) -> SnapshotKind {
        self.snapshot
    }

    pub fn path_kind(&self) -> PathKind {
        self.path
    }

    pub fn item(&self) -> &Item {
        self.item
    }

    pub fn item_mut(&mut self) -> &mut Item {
        self.item
    }
}

/// Fired around block and page rendering. Carries the payload handed to
/// the renderer; after rendering, `content` is the produced text.
pub struct RenderEvent<'a> {
    pub(crate) item: &'a mut Item,
    pub(crate) snapshot: SnapshotKind,
    pub(crate) payload: &'a mut Attributes,
    pub(crate) site: Option<&'a Attributes>,
}

impl<'a> RenderEvent<'a> {
    pub fn new(item: &'a mut Item, snapshot: SnapshotKind, payload: &'a mut Attributes) -> Self {
        Self {
            item,
            snapshot,
            payload,
            site: None,
        }
    }

    /// Attach the shared `site` section the renderer sees next to the payload.
    pub fn with_site(mut self, site: &'a Attributes) -> Self {
        self.site = Some(site);
        self
    }

    pub fn site(&self) -> Option<&Attributes> {
        self.site
    }

    pub fn id(&self) -> &str {
        self.item.id()
    }

    pub fn content(&self) -> Result<&str, ItemError> {
        self.item.content(self.snapshot)
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.item.set_content(self.snapshot, content);
    }

    pub fn attributes(&self) -> &Attributes {
        self.item.attributes()
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.item.set_attributes(attributes);
    }

    pub fn payload(&self) -> &Attributes {
        self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Attributes {
        self.payload
    }

    pub fn set_payload(&mut self, payload: Attributes) {
        *self.payload = payload;
    }

    /// Public URL of the item, e.g. `/about/`.
    pub fn url(&self) -> Option<&str> {
        self.item.str_attribute("url")
    }

    /// Change the public URL. The item, the `page` section of the payload
    /// and the output path follow it.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let link = Permalink::from_url(&url.into());
        let url = Value::String(link.url);
        if let Some(Value::Object(page)) = self.payload.get_mut("page") {
            page.insert("url".to_owned(), url.clone());
        }
        self.item.attributes_mut().insert("url".to_owned(), url);
        self.item.set_path(PathKind::Permalink, link.path);
    }

    pub fn snapshot_kind(&self) -> SnapshotKind {
        self.snapshot
    }

    pub fn item(&self) -> &Item {
        self.item
    }

    pub fn item_mut(&mut self) -> &mut Item {
        self.item
    }
}

/// Fired once the build is written.
pub struct FinishEvent<'a> {
    pub(crate) summary: &'a mut BuildSummary,
    pub(crate) site: &'a Attributes,
}

impl<'a> FinishEvent<'a> {
    pub fn new(summary: &'a mut BuildSummary, site: &'a Attributes) -> Self {
        Self { summary, site }
    }

    pub fn summary(&self) -> &BuildSummary {
        self.summary
    }

    pub fn summary_mut(&mut self) -> &mut BuildSummary {
        self.summary
    }

    /// Site attributes as they were exposed to templates.
    pub fn site_attributes(&self) -> &Attributes {
        self.site
    }
}

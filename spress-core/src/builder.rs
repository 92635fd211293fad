use std::fmt;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::collection::CollectionSet;
use crate::config::{ConfigError, Configuration, ConversionErrorPolicy};
use crate::converter::{
    Converter, ConverterError, ConverterRegistry, ConverterResult, MirrorConverter, with_extension,
};
use crate::event::{ContentEvent, EnvironmentEvent, Event, EventName, FinishEvent, RenderEvent};
use crate::generator::{GeneratorError, PaginationGenerator, generator_name};
use crate::item::{Attributes, Item, ItemError, PathKind, SnapshotKind};
use crate::legacy::{LegacyPlugin, LegacyPluginAdapter};
use crate::markdown::MarkdownConverter;
use crate::permalink;
use crate::plugin::{DispatchError, EventBus, Plugin, PluginError, PluginInfo};
use crate::site::SiteAttributes;
use crate::template::{Renderer, TemplateError, TeraRenderer};
use crate::writer::{DataWriter, MemoryDataWriter, WriterError};

/// Pipeline stage an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Prepare,
    Convert,
    RenderBlocks,
    RenderPage,
    Write,
    Finish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Prepare => "prepare",
            Stage::Convert => "convert",
            Stage::RenderBlocks => "render blocks",
            Stage::RenderPage => "render page",
            Stage::Write => "write",
            Stage::Finish => "finish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildErrorKind {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Listener(#[from] DispatchError),

    #[error(transparent)]
    Converter(#[from] ConverterError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Item(#[from] ItemError),

    #[error("Pipeline already ran")]
    AlreadyRan,
}

/// Why a build stopped: the stage, the item if any, and the cause.
#[derive(Debug, thiserror::Error)]
#[error("Build failed in {stage} stage{}: {kind}", .item.as_ref().map(|id| format!(" on '{id}'")).unwrap_or_default())]
pub struct BuildError {
    pub stage: Stage,
    pub item: Option<String>,
    #[source]
    pub kind: BuildErrorKind,
}

impl BuildError {
    pub fn new(stage: Stage, item: Option<&str>, kind: impl Into<BuildErrorKind>) -> Self {
        Self {
            stage,
            item: item.map(str::to_string),
            kind: kind.into(),
        }
    }
}

/// Owned copy of a [`BuildError`] kept in the pipeline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub stage: Stage,
    pub item: Option<String>,
    pub message: String,
}

impl From<&BuildError> for BuildFailure {
    fn from(err: &BuildError) -> Self {
        Self {
            stage: err.stage,
            item: err.item.clone(),
            message: err.kind.to_string(),
        }
    }
}

/// Pipeline state. Transitions only move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Started,
    Converting,
    Converted,
    Rendering,
    Rendered,
    Written,
    Finished,
    Failed(BuildFailure),
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Idle => "idle",
            BuildState::Started => "started",
            BuildState::Converting => "converting",
            BuildState::Converted => "converted",
            BuildState::Rendering => "rendering",
            BuildState::Rendered => "rendered",
            BuildState::Written => "written",
            BuildState::Finished => "finished",
            BuildState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Finished | BuildState::Failed(_))
    }
}

/// Outcome of a finished build, also handed to `spress.finish` listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub items_written: usize,
    /// Ids handed to the writer, in write order.
    pub written: Vec<String>,
    /// Ids dropped because their conversion failed under the skip policy.
    pub skipped: Vec<String>,
    /// Listener failures recorded under the collect policy.
    pub listener_errors: Vec<String>,
}

pub struct SiteBuilder {
    configuration: Configuration,
    converters: Vec<Box<dyn Converter>>,
    default_converters: bool,
    syntax_theme: String,
    renderer: Option<Box<dyn Renderer>>,
    writer: Option<Box<dyn DataWriter>>,
    bus: EventBus,
    build_time: Option<String>,
}

impl Default for SiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self {
            configuration: Configuration::default(),
            converters: Vec::new(),
            default_converters: true,
            syntax_theme: "base16-ocean.dark".to_string(),
            renderer: None,
            writer: None,
            bus: EventBus::new(),
            build_time: None,
        }
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Register a converter after the built-in Markdown and mirror ones.
    pub fn converter<C: Converter + 'static>(mut self, converter: C) -> Self {
        self.converters.push(Box::new(converter));
        self
    }

    /// Skip the built-in Markdown and mirror converters.
    pub fn without_default_converters(mut self) -> Self {
        self.default_converters = false;
        self
    }

    // Syntax highlighting configuration
    pub fn syntax_theme<S: Into<String>>(mut self, theme: S) -> Self {
        self.syntax_theme = theme.into();
        self
    }

    pub fn renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn writer<W: DataWriter + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Plugins are initialized in the order they are added.
    pub fn plugin<P: Plugin>(mut self, plugin: P) -> Self {
        self.bus.add_plugin(plugin);
        self
    }

    pub fn legacy_plugin<P: LegacyPlugin>(mut self, plugin: P) -> Self {
        self.bus.add_plugin(LegacyPluginAdapter::new(plugin));
        self
    }

    /// Fix `site.time` instead of using the clock.
    pub fn build_time<S: Into<String>>(mut self, time: S) -> Self {
        self.build_time = Some(time.into());
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigError> {
        self.configuration.validate()?;

        let mut converters = ConverterRegistry::new();
        if self.default_converters {
            converters.register(MarkdownConverter::new().syntax_theme(self.syntax_theme));
            converters.register(MirrorConverter::new(
                self.configuration.mirror_extensions.iter().cloned(),
            ));
        }
        for converter in self.converters {
            converters.register_boxed(converter);
        }

        Ok(Pipeline {
            configuration: self.configuration,
            converters,
            renderer: self
                .renderer
                .unwrap_or_else(|| Box::new(TeraRenderer::empty())),
            writer: self
                .writer
                .unwrap_or_else(|| Box::new(MemoryDataWriter::new())),
            bus: self.bus,
            build_time: self.build_time,
            state: BuildState::Idle,
            summary: BuildSummary::default(),
        })
    }
}

pub struct Pipeline {
    configuration: Configuration,
    converters: ConverterRegistry,
    renderer: Box<dyn Renderer>,
    writer: Box<dyn DataWriter>,
    bus: EventBus,
    build_time: Option<String>,
    state: BuildState,
    summary: BuildSummary,
}

/// Dispatch `name`. Under the collect policy failures are logged and
/// returned instead of stopping the build.
fn notify(
    bus: &EventBus,
    name: EventName,
    event: &mut Event<'_>,
    stage: Stage,
    item: Option<&str>,
) -> Result<Vec<String>, BuildError> {
    match bus.dispatch(name, event) {
        Ok(()) => Ok(Vec::new()),
        Err(DispatchError::Collected { failures, .. }) => Ok(failures
            .into_iter()
            .map(|failure| {
                tracing::warn!(plugin = %failure.plugin, event = %name, error = %failure.source, "Listener failed");
                failure.to_string()
            })
            .collect()),
        Err(err) => Err(BuildError::new(stage, item, err)),
    }
}

/// Fire a before-render event, then carry attribute changes listeners made
/// on the item into `page`. Keys a listener wrote into the payload directly
/// are left as written.
fn notify_before_render(
    bus: &EventBus,
    name: EventName,
    item: &mut Item,
    snapshot: SnapshotKind,
    payload: &mut Attributes,
    site: &Attributes,
    stage: Stage,
) -> Result<Vec<String>, BuildError> {
    let id = item.id().to_string();
    let attributes_before = item.attributes().clone();
    let content_before = item.content(snapshot).ok().map(str::to_string);
    let page_before = page_of(payload).cloned().unwrap_or_default();

    let mut event = Event::Render(RenderEvent::new(item, snapshot, payload).with_site(site));
    let collected = notify(bus, name, &mut event, stage, Some(&id))?;

    let attributes = item.attributes();
    if let Some(Value::Object(page)) = payload.get_mut("page") {
        for (key, value) in attributes {
            if attributes_before.get(key) != Some(value) && page.get(key) == page_before.get(key) {
                page.insert(key.clone(), value.clone());
            }
        }
        for key in attributes_before.keys() {
            if !attributes.contains_key(key) && page.get(key) == page_before.get(key) {
                page.remove(key);
            }
        }
        if let Ok(content) = item.content(snapshot)
            && Some(content) != content_before.as_deref()
            && page.get("content") == page_before.get("content")
        {
            page.insert("content".to_string(), Value::String(content.to_string()));
        }
    }
    Ok(collected)
}

fn page_of(payload: &Attributes) -> Option<&Attributes> {
    match payload.get("page") {
        Some(Value::Object(page)) => Some(page),
        _ => None,
    }
}

fn layout_of(payload: &Attributes) -> Option<&str> {
    match payload.get("page").and_then(|page| page.get("layout")) {
        Some(Value::String(layout)) if !layout.is_empty() && layout != "none" => Some(layout),
        _ => None,
    }
}

fn set_page_content(payload: &mut Attributes, content: &str) {
    if let Some(Value::Object(page)) = payload.get_mut("page") {
        page.insert("content".to_string(), Value::String(content.to_string()));
    }
}

impl Pipeline {
    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn writer(&self) -> &dyn DataWriter {
        self.writer.as_ref()
    }

    pub fn plugins(&self) -> &[PluginInfo] {
        self.bus.plugins()
    }

    /// Run the whole build over `items`.
    pub fn run(&mut self, items: Vec<Item>) -> Result<BuildSummary, BuildError> {
        if self.state != BuildState::Idle {
            return Err(BuildError::new(Stage::Start, None, BuildErrorKind::AlreadyRan));
        }

        match self.execute(items) {
            Ok(()) => {
                self.advance(BuildState::Finished);
                Ok(self.summary.clone())
            }
            Err(err) => {
                tracing::error!(stage = %err.stage, item = ?err.item, error = %err.kind, "Build failed");
                self.state = BuildState::Failed(BuildFailure::from(&err));
                Err(err)
            }
        }
    }

    fn advance(&mut self, next: BuildState) {
        tracing::info!(from = self.state.as_str(), to = next.as_str(), "Build state");
        self.state = next;
    }

    fn execute(&mut self, items: Vec<Item>) -> Result<(), BuildError> {
        self.bus.set_policy(self.configuration.build.on_listener_error);
        self.bus
            .load_plugins()
            .map_err(|err| BuildError::new(Stage::Start, None, err))?;
        self.advance(BuildState::Started);

        let mut event = Event::Environment(EnvironmentEvent::new(
            &mut self.configuration,
            &mut self.converters,
            self.writer.as_mut(),
        ));
        let collected = notify(&self.bus, EventName::Start, &mut event, Stage::Start, None)?;
        self.summary.listener_errors.extend(collected);
        // Plugins may have changed the configuration.
        self.bus.set_policy(self.configuration.build.on_listener_error);

        let collections = CollectionSet::from_config(&self.configuration);
        let items = self.prepare(items, &collections)?;

        self.advance(BuildState::Converting);
        let mut items = self.convert(items)?;
        for item in &mut items {
            self.assign_permalink(item, &collections);
        }
        self.advance(BuildState::Converted);

        let mut site = SiteAttributes::new(&self.configuration);
        if let Some(time) = &self.build_time {
            site = site.with_time(time.clone());
        }
        site.rebuild(&items, &self.configuration, &collections);

        self.advance(BuildState::Rendering);
        self.render_blocks(&mut items, &site)?;
        site.refresh_contents(&items);
        self.render_pages(&mut items, &site)?;
        self.advance(BuildState::Rendered);

        self.write(&items, &collections)?;
        self.advance(BuildState::Written);

        let mut event = Event::Finish(FinishEvent::new(&mut self.summary, site.site()));
        let collected = notify(&self.bus, EventName::Finish, &mut event, Stage::Finish, None)?;
        self.summary.listener_errors.extend(collected);
        Ok(())
    }

    /// Drop drafts, assign collections and expand generators.
    fn prepare(&self, items: Vec<Item>, collections: &CollectionSet) -> Result<Vec<Item>, BuildError> {
        let drafts = self.configuration.build.drafts;
        let mut items: Vec<Item> = items
            .into_iter()
            .filter(|item| {
                let draft = item.attribute("draft").and_then(Value::as_bool) == Some(true);
                if draft && !drafts {
                    tracing::debug!(item = item.id(), "Skipping draft");
                }
                drafts || !draft
            })
            .collect();

        for item in &mut items {
            collections.assign(item);
        }

        if items.iter().all(|item| generator_name(item).is_none()) {
            return Ok(items);
        }

        let paginator = PaginationGenerator::new();
        let mut expanded = Vec::with_capacity(items.len());
        for item in &items {
            let Some(name) = generator_name(item) else {
                expanded.push(item.clone());
                continue;
            };
            if name != "pagination" {
                let err = GeneratorError::UnknownGenerator {
                    id: item.id().to_string(),
                    generator: name.to_string(),
                };
                return Err(BuildError::new(Stage::Prepare, Some(item.id()), err));
            }

            let provider = paginator
                .provider(item)
                .map_err(|err| BuildError::new(Stage::Prepare, Some(item.id()), err))?;
            let provided: Vec<&Item> = items
                .iter()
                .filter(|other| other.collection() == provider && generator_name(other).is_none())
                .collect();
            let mut pages = paginator
                .generate(item, &provided)
                .map_err(|err| BuildError::new(Stage::Prepare, Some(item.id()), err))?;
            for page in &mut pages {
                collections.assign(page);
            }
            expanded.extend(pages);
        }
        Ok(expanded)
    }

    fn convert(&mut self, items: Vec<Item>) -> Result<Vec<Item>, BuildError> {
        let parallel = self.configuration.build.parallel_conversion
            && !self.bus.has_listeners(EventName::BeforeConvert)
            && !self.bus.has_listeners(EventName::AfterConvert);

        let mut precomputed = parallel.then(|| {
            tracing::debug!(items = items.len(), "Converting in parallel");
            let converters = &self.converters;
            items
                .par_iter()
                .map(|item| (!item.is_binary()).then(|| converters.convert(item)))
                .collect::<Vec<_>>()
                .into_iter()
        });

        let mut converted = Vec::with_capacity(items.len());
        for mut item in items {
            let ready = precomputed.as_mut().and_then(Iterator::next).flatten();

            let mut event = Event::Content(ContentEvent::new(
                &mut item,
                SnapshotKind::Raw,
                PathKind::Relative,
            ));
            let collected = notify(&self.bus, EventName::BeforeConvert, &mut event, Stage::Convert, None)
                .map_err(|err| BuildError { item: Some(item.id().to_string()), ..err })?;
            self.summary.listener_errors.extend(collected);

            if item.is_binary() {
                let relative = item.path(PathKind::Relative)?.to_string();
                item.set_path(PathKind::RelativeAfterConvert, relative);
            } else {
                let outcome = match ready {
                    Some(outcome) => outcome,
                    None => self.converters.convert(&item),
                };
                match outcome {
                    Ok(result) => apply_conversion(&mut item, result)?,
                    Err(err) => match self.configuration.build.on_conversion_error {
                        ConversionErrorPolicy::Skip => {
                            tracing::warn!(item = item.id(), error = %err, "Skipping item");
                            self.summary.skipped.push(item.id().to_string());
                            continue;
                        }
                        ConversionErrorPolicy::Abort => {
                            return Err(BuildError::new(Stage::Convert, Some(item.id()), err));
                        }
                    },
                }
            }

            let mut event = Event::Content(ContentEvent::new(
                &mut item,
                SnapshotKind::Converted,
                PathKind::RelativeAfterConvert,
            ));
            let collected = notify(&self.bus, EventName::AfterConvert, &mut event, Stage::Convert, None)
                .map_err(|err| BuildError { item: Some(item.id().to_string()), ..err })?;
            self.summary.listener_errors.extend(collected);

            converted.push(item);
        }
        Ok(converted)
    }

    fn assign_permalink(&self, item: &mut Item, collections: &CollectionSet) {
        let style = collections
            .get(item.collection())
            .permalink
            .as_deref()
            .unwrap_or(&self.configuration.permalink);
        let link = permalink::resolve(item, style);
        tracing::debug!(item = item.id(), url = %link.url, "Permalink");
        item.set_path(PathKind::Permalink, link.path);
        item.attributes_mut()
            .insert("url".to_string(), Value::String(link.url));
    }

    fn render_blocks(&mut self, items: &mut [Item], site: &SiteAttributes) -> Result<(), BuildError> {
        self.renderer
            .set_site(site.site())
            .map_err(|err| BuildError::new(Stage::RenderBlocks, None, err))?;
        for item in items.iter_mut().filter(|item| !item.is_binary()) {
            let id = item.id().to_string();
            let fail = |kind: BuildErrorKind| BuildError {
                stage: Stage::RenderBlocks,
                item: Some(id.clone()),
                kind,
            };

            let mut payload = site.page_payload(item);
            set_page_content(&mut payload, item.content(SnapshotKind::Converted).map_err(|e| fail(e.into()))?);

            let collected = notify_before_render(
                &self.bus,
                EventName::BeforeRenderBlocks,
                item,
                SnapshotKind::Converted,
                &mut payload,
                site.site(),
                Stage::RenderBlocks,
            )?;
            self.summary.listener_errors.extend(collected);

            let template = item
                .content(SnapshotKind::Converted)
                .map_err(|e| fail(e.into()))?;
            let rendered = self
                .renderer
                .render_string(&id, template, &payload)
                .map_err(|e| fail(e.into()))?;
            item.set_content(SnapshotKind::RenderedBlocks, rendered);

            let render = RenderEvent::new(item, SnapshotKind::RenderedBlocks, &mut payload).with_site(site.site());
            let mut event = Event::Render(render);
            let collected = notify(&self.bus, EventName::AfterRenderBlocks, &mut event, Stage::RenderBlocks, Some(&id))?;
            self.summary.listener_errors.extend(collected);
        }
        Ok(())
    }

    fn render_pages(&mut self, items: &mut [Item], site: &SiteAttributes) -> Result<(), BuildError> {
        self.renderer
            .set_site(site.site())
            .map_err(|err| BuildError::new(Stage::RenderPage, None, err))?;
        for item in items.iter_mut().filter(|item| !item.is_binary()) {
            let id = item.id().to_string();
            let fail = |kind: BuildErrorKind| BuildError {
                stage: Stage::RenderPage,
                item: Some(id.clone()),
                kind,
            };

            let mut payload = site.page_payload(item);
            set_page_content(&mut payload, item.content(SnapshotKind::RenderedBlocks).map_err(|e| fail(e.into()))?);

            let collected = notify_before_render(
                &self.bus,
                EventName::BeforeRenderPage,
                item,
                SnapshotKind::RenderedBlocks,
                &mut payload,
                site.site(),
                Stage::RenderPage,
            )?;
            self.summary.listener_errors.extend(collected);

            let content = item
                .content(SnapshotKind::RenderedBlocks)
                .map_err(|e| fail(e.into()))?;
            let rendered = self
                .renderer
                .render_page(&id, content, layout_of(&payload), &payload)
                .map_err(|e| fail(e.into()))?;
            item.set_content(SnapshotKind::Rendered, rendered);

            let render = RenderEvent::new(item, SnapshotKind::Rendered, &mut payload).with_site(site.site());
            let mut event = Event::Render(render);
            let collected = notify(&self.bus, EventName::AfterRenderPage, &mut event, Stage::RenderPage, Some(&id))?;
            self.summary.listener_errors.extend(collected);
        }
        Ok(())
    }

    fn write(&mut self, items: &[Item], collections: &CollectionSet) -> Result<(), BuildError> {
        for item in items {
            if !collections.get(item.collection()).output {
                tracing::debug!(item = item.id(), collection = item.collection(), "Collection not written");
                continue;
            }
            if self.writer.has_item(item.id()) {
                tracing::debug!(item = item.id(), "Replacing earlier output");
            }
            self.writer
                .write(item)
                .map_err(|err| BuildError::new(Stage::Write, Some(item.id()), err))?;
            self.summary.items_written += 1;
            self.summary.written.push(item.id().to_string());
        }
        tracing::info!(items = self.summary.items_written, "Wrote items");
        Ok(())
    }
}

/// Store converted text and the path with the output extension.
fn apply_conversion(item: &mut Item, result: ConverterResult) -> Result<(), ItemError> {
    let (text, extension) = result.into_parts();
    let relative = item.path(PathKind::Relative)?;
    let after = with_extension(relative, &extension);
    item.set_content(SnapshotKind::Converted, text);
    item.set_path(PathKind::RelativeAfterConvert, after);
    Ok(())
}

impl From<ItemError> for BuildError {
    fn from(err: ItemError) -> Self {
        let ItemError::SnapshotNotFound { id, .. } = &err;
        let id = id.clone();
        BuildError::new(Stage::Convert, Some(&id), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::BoxError;
    use pretty_assertions::assert_eq;

    struct Broken;

    impl Converter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn matches(&self, extension: &str) -> bool {
            extension == "bad"
        }

        fn convert(&self, _input: &str) -> Result<String, BoxError> {
            Err("cannot parse".into())
        }

        fn out_extension(&self, _extension: &str) -> String {
            "html".to_string()
        }
    }

    #[test]
    fn runs_through_every_state_once() {
        let mut pipeline = SiteBuilder::new().build().unwrap();
        assert_eq!(pipeline.state(), &BuildState::Idle);

        let summary = pipeline.run(vec![Item::new("index.md", "#hi")]).unwrap();
        assert_eq!(pipeline.state(), &BuildState::Finished);
        assert_eq!(summary.items_written, 1);

        let written = pipeline.writer().get_item("index.md").unwrap();
        assert_eq!(written.content(SnapshotKind::Rendered).unwrap().trim_end(), "<h1>hi</h1>");
        assert_eq!(written.path(PathKind::Permalink).unwrap(), "index.html");

        let err = pipeline.run(Vec::new()).unwrap_err();
        assert!(matches!(err.kind, BuildErrorKind::AlreadyRan));
        assert_eq!(pipeline.state(), &BuildState::Finished);
    }

    #[test]
    fn abort_policy_fails_with_context() {
        let mut pipeline = SiteBuilder::new().converter(Broken).build().unwrap();
        let err = pipeline
            .run(vec![Item::new("a.md", "ok"), Item::new("b.bad", "x")])
            .unwrap_err();

        assert_eq!(err.stage, Stage::Convert);
        assert_eq!(err.item.as_deref(), Some("b.bad"));
        assert_eq!(
            err.to_string(),
            "Build failed in convert stage on 'b.bad': Converting item 'b.bad' failed: cannot parse"
        );
        match pipeline.state() {
            BuildState::Failed(failure) => {
                assert_eq!(failure.stage, Stage::Convert);
                assert_eq!(failure.item.as_deref(), Some("b.bad"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(pipeline.writer().count_items(), 0);
    }

    #[test]
    fn skip_policy_drops_the_item() {
        let mut config = Configuration::default();
        config.build.on_conversion_error = ConversionErrorPolicy::Skip;
        let mut pipeline = SiteBuilder::new()
            .configuration(config)
            .converter(Broken)
            .build()
            .unwrap();

        let summary = pipeline
            .run(vec![
                Item::new("a.md", "ok"),
                Item::new("b.bad", "x"),
                Item::new("c.unknown", "x"),
            ])
            .unwrap();
        assert_eq!(summary.skipped, ["b.bad", "c.unknown"]);
        assert_eq!(summary.written, ["a.md"]);
        assert!(!pipeline.writer().has_item("b.bad"));
    }

    #[test]
    fn drafts_are_dropped_unless_enabled() {
        let mut draft = Item::new("wip.md", "");
        draft.attributes_mut().insert("draft".to_string(), Value::Bool(true));

        let mut pipeline = SiteBuilder::new().build().unwrap();
        let summary = pipeline.run(vec![draft.clone(), Item::new("a.md", "")]).unwrap();
        assert_eq!(summary.written, ["a.md"]);

        let mut config = Configuration::default();
        config.build.drafts = true;
        let mut pipeline = SiteBuilder::new().configuration(config).build().unwrap();
        let summary = pipeline.run(vec![draft]).unwrap();
        assert_eq!(summary.written, ["wip.md"]);
    }

    #[test]
    fn parallel_conversion_matches_serial() {
        let items = || {
            (0..20)
                .map(|i| Item::new(format!("p{i}.md"), format!("# Page {i}")))
                .collect::<Vec<_>>()
        };

        let mut serial = SiteBuilder::new().build().unwrap();
        serial.run(items()).unwrap();

        let mut config = Configuration::default();
        config.build.parallel_conversion = true;
        let mut parallel = SiteBuilder::new().configuration(config).build().unwrap();
        parallel.run(items()).unwrap();

        let contents = |pipeline: &Pipeline| {
            pipeline
                .writer()
                .get_items()
                .into_iter()
                .map(|item| (item.id().to_string(), item.latest_content().to_string()))
                .collect::<Vec<_>>()
        };
        assert_eq!(contents(&serial), contents(&parallel));
    }

    #[test]
    fn unknown_generator_fails_prepare() {
        let mut item = Item::new("feed.xml", "");
        item.attributes_mut()
            .insert("generator".to_string(), Value::String("rss".to_string()));

        let mut pipeline = SiteBuilder::new().build().unwrap();
        let err = pipeline.run(vec![item]).unwrap_err();
        assert_eq!(err.stage, Stage::Prepare);
        assert!(matches!(err.kind, BuildErrorKind::Generator(GeneratorError::UnknownGenerator { .. })));
    }

    #[test]
    fn collections_without_output_are_not_written() {
        let mut config = Configuration::default();
        config
            .collections
            .insert("drafts".to_string(), crate::config::CollectionConfig {
                output: false,
                ..crate::config::CollectionConfig::with_path("_drafts")
            });

        let mut pipeline = SiteBuilder::new().configuration(config).build().unwrap();
        let summary = pipeline
            .run(vec![Item::new("_drafts/idea.md", ""), Item::new("a.md", "")])
            .unwrap();
        assert_eq!(summary.written, ["a.md"]);
    }
}

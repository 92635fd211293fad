use std::collections::BTreeMap;

use serde_json::Value;

use crate::builder::BuildSummary;
use crate::config::Configuration;
use crate::converter::{Converter, ConverterRegistry};
use crate::event::{Event, EventName};
use crate::item::{Attributes, Item, PathKind, SnapshotKind};
use crate::permalink::Permalink;
use crate::plugin::{EventSubscriber, ListenerResult, Plugin, PluginError, PluginMetas};

pub type LegacyHandler<P> = fn(&mut P, &mut LegacyEvent<'_>) -> ListenerResult;

/// 1.x plugin protocol.
pub trait LegacyPlugin: Sized + 'static {
    fn get_metas(&self) -> PluginMetas;

    fn initialize(&mut self, subscriber: &mut LegacyEventSubscriber<Self>);
}

/// Subscriber handed to legacy plugins. Last registration per name wins.
pub struct LegacyEventSubscriber<P> {
    listeners: Vec<(String, LegacyHandler<P>)>,
}

impl<P> Default for LegacyEventSubscriber<P> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<P> LegacyEventSubscriber<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener(&mut self, event_name: &str, handler: LegacyHandler<P>) {
        match self.listeners.iter_mut().find(|(name, _)| name == event_name) {
            Some(slot) => slot.1 = handler,
            None => self.listeners.push((event_name.to_owned(), handler)),
        }
    }

    pub fn get_event_listeners(&self) -> impl Iterator<Item = &str> + '_ {
        self.listeners.iter().map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyEventName {
    Start,
    BeforeConvert,
    AfterConvert,
    AfterConvertPosts,
    BeforeRender,
    AfterRender,
    BeforeRenderPagination,
    AfterRenderPagination,
    Finish,
}

impl LegacyEventName {
    fn parse(name: &str) -> Option<Self> {
        let parsed = match name {
            "spress.start" => Self::Start,
            "spress.before_convert" => Self::BeforeConvert,
            "spress.after_convert" => Self::AfterConvert,
            "spress.after_convert_posts" => Self::AfterConvertPosts,
            "spress.before_render" => Self::BeforeRender,
            "spress.after_render" => Self::AfterRender,
            "spress.before_render_pagination" => Self::BeforeRenderPagination,
            "spress.after_render_pagination" => Self::AfterRenderPagination,
            "spress.finish" => Self::Finish,
            _ => return None,
        };
        Some(parsed)
    }

    /// Current event the legacy name is fired from.
    fn target(self) -> EventName {
        match self {
            Self::Start => EventName::Start,
            Self::BeforeConvert => EventName::BeforeConvert,
            Self::AfterConvert | Self::AfterConvertPosts => EventName::AfterConvert,
            Self::BeforeRender | Self::BeforeRenderPagination => EventName::BeforeRenderBlocks,
            Self::AfterRender | Self::AfterRenderPagination => EventName::AfterRenderPage,
            Self::Finish => EventName::Finish,
        }
    }

    fn applies(self, event: &Event<'_>) -> bool {
        let Some(item) = event.item() else {
            return true;
        };
        let paginated = item.attribute("paginator").is_some();
        match self {
            Self::AfterConvertPosts => item.collection() == "posts",
            Self::BeforeRender | Self::AfterRender => !paginated,
            Self::BeforeRenderPagination | Self::AfterRenderPagination => paginated,
            _ => true,
        }
    }

    fn translate<'b>(self, event: &'b mut Event<'_>) -> Option<LegacyEvent<'b>> {
        let translated = match (self, event) {
            (Self::Start, Event::Environment(env)) => {
                LegacyEvent::Environment(LegacyEnvironmentEvent {
                    config: &mut *env.configuration,
                    converters: &mut *env.converters,
                })
            }
            (Self::BeforeConvert | Self::AfterConvert, Event::Content(content)) => {
                LegacyEvent::Convert(ConvertEvent {
                    item: &mut *content.item,
                    snapshot: content.snapshot,
                })
            }
            (Self::AfterConvertPosts, Event::Content(content)) => {
                LegacyEvent::AfterConvertPosts(AfterConvertPostsEvent {
                    item: &mut *content.item,
                })
            }
            (
                Self::BeforeRender
                | Self::AfterRender
                | Self::BeforeRenderPagination
                | Self::AfterRenderPagination,
                Event::Render(render),
            ) => LegacyEvent::Render(LegacyRenderEvent {
                item: &mut *render.item,
                snapshot: render.snapshot,
                payload: &mut *render.payload,
                site: render.site,
            }),
            (Self::Finish, Event::Finish(finish)) => LegacyEvent::Finish(LegacyFinishEvent {
                summary: &*finish.summary,
            }),
            _ => return None,
        };
        Some(translated)
    }
}

/// Events in their 1.x shape.
pub enum LegacyEvent<'a> {
    Environment(LegacyEnvironmentEvent<'a>),
    Convert(ConvertEvent<'a>),
    AfterConvertPosts(AfterConvertPostsEvent<'a>),
    Render(LegacyRenderEvent<'a>),
    Finish(LegacyFinishEvent<'a>),
}

pub struct LegacyEnvironmentEvent<'a> {
    config: &'a mut Configuration,
    converters: &'a mut ConverterRegistry,
}

impl LegacyEnvironmentEvent<'_> {
    pub fn get_config_repository(&mut self) -> &mut Configuration {
        self.config
    }

    pub fn add_converter<C: Converter + 'static>(&mut self, converter: C) {
        self.converters.register(converter);
    }
}

pub struct ConvertEvent<'a> {
    item: &'a mut Item,
    snapshot: SnapshotKind,
}

impl ConvertEvent<'_> {
    pub fn get_id(&self) -> &str {
        self.item.id()
    }

    pub fn get_content(&self) -> &str {
        self.item.content(self.snapshot).unwrap_or_default()
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.item.set_content(self.snapshot, content);
    }

    pub fn get_relative_path(&self) -> &str {
        self.item.path(PathKind::Relative).unwrap_or(self.item.id())
    }

    pub fn get_front_matter(&self) -> &Attributes {
        self.item.attributes()
    }

    pub fn set_front_matter(&mut self, attributes: Attributes) {
        self.item.set_attributes(attributes);
    }

    pub fn is_post(&self) -> bool {
        self.item.collection() == "posts"
    }
}

/// Per-post taxonomy access, fired after each post is converted.
pub struct AfterConvertPostsEvent<'a> {
    item: &'a mut Item,
}

impl AfterConvertPostsEvent<'_> {
    pub fn get_id(&self) -> &str {
        self.item.id()
    }

    pub fn get_categories(&self) -> Vec<String> {
        string_list(self.item.attribute("categories"))
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.item
            .attributes_mut()
            .insert("categories".to_owned(), Value::from(categories));
    }

    pub fn get_tags(&self) -> Vec<String> {
        string_list(self.item.attribute("tags"))
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.item
            .attributes_mut()
            .insert("tags".to_owned(), Value::from(tags));
    }
}

pub struct LegacyRenderEvent<'a> {
    item: &'a mut Item,
    snapshot: SnapshotKind,
    payload: &'a mut Attributes,
    site: Option<&'a Attributes>,
}

impl LegacyRenderEvent<'_> {
    pub fn get_id(&self) -> &str {
        self.item.id()
    }

    pub fn get_content(&self) -> &str {
        self.item.content(self.snapshot).unwrap_or_default()
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.item.set_content(self.snapshot, content);
    }

    pub fn get_payload(&self) -> &Attributes {
        self.payload
    }

    pub fn set_payload(&mut self, payload: Attributes) {
        *self.payload = payload;
    }

    pub fn get_site_attributes(&self) -> Option<&Attributes> {
        self.site
    }

    pub fn get_relative_url(&self) -> &str {
        self.item.str_attribute("url").unwrap_or_default()
    }

    pub fn set_relative_url(&mut self, url: impl Into<String>) {
        let link = Permalink::from_url(&url.into());
        let url = Value::String(link.url);
        if let Some(Value::Object(page)) = self.payload.get_mut("page") {
            page.insert("url".to_owned(), url.clone());
        }
        self.item.attributes_mut().insert("url".to_owned(), url);
        self.item.set_path(PathKind::Permalink, link.path);
    }

    pub fn is_post(&self) -> bool {
        self.item.collection() == "posts"
    }
}

pub struct LegacyFinishEvent<'a> {
    summary: &'a BuildSummary,
}

impl LegacyFinishEvent<'_> {
    pub fn get_result(&self) -> &BuildSummary {
        self.summary
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(value)) => vec![value.clone()],
        _ => Vec::new(),
    }
}

/// Runs a [`LegacyPlugin`] under the current protocol.
pub struct LegacyPluginAdapter<P> {
    inner: P,
}

impl<P: LegacyPlugin> LegacyPluginAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: LegacyPlugin> Plugin for LegacyPluginAdapter<P> {
    fn metas(&self) -> PluginMetas {
        self.inner.get_metas()
    }

    fn initialize(&mut self, subscriber: &mut EventSubscriber<Self>) -> Result<(), PluginError> {
        let mut legacy = LegacyEventSubscriber::new();
        self.inner.initialize(&mut legacy);

        // Several legacy names can land on one current event; the current
        // subscriber keeps one handler per event, so fan out here.
        let mut routes: BTreeMap<EventName, Vec<(LegacyEventName, LegacyHandler<P>)>> =
            BTreeMap::new();
        for (name, handler) in legacy.listeners {
            let legacy_name =
                LegacyEventName::parse(&name).ok_or_else(|| PluginError::UnknownEvent {
                    plugin: self.inner.get_metas().get("name").cloned().unwrap_or_default(),
                    event: name.clone(),
                })?;
            routes
                .entry(legacy_name.target())
                .or_default()
                .push((legacy_name, handler));
        }

        for (target, handlers) in routes {
            tracing::debug!(event = %target, handlers = handlers.len(), "Routing legacy listeners");
            subscriber.add_event_listener(target, move |adapter: &mut Self, event: &mut Event<'_>| {
                for &(legacy_name, handler) in &handlers {
                    if !legacy_name.applies(event) {
                        continue;
                    }
                    if let Some(mut legacy_event) = legacy_name.translate(event) {
                        handler(&mut adapter.inner, &mut legacy_event)?;
                    }
                }
                Ok(())
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ContentEvent, RenderEvent};
    use crate::plugin::EventBus;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn on_before_convert(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::Convert(event) = event {
                self.seen.borrow_mut().push(format!("convert:{}", event.get_id()));
                let content = format!("[{}]", event.get_content());
                event.set_content(content);
            }
            Ok(())
        }

        fn on_after_convert_posts(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::AfterConvertPosts(event) = event {
                let mut tags = event.get_tags();
                tags.push("legacy".to_owned());
                event.set_tags(tags);
            }
            Ok(())
        }

        fn on_before_render(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::Render(event) = event {
                self.seen.borrow_mut().push(format!("render:{}", event.get_id()));
                event.set_relative_url("/legacy/");
            }
            Ok(())
        }

        fn on_after_render(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::Render(event) = event {
                let line = format!("after_render:{}:{}", event.get_id(), event.get_content());
                self.seen.borrow_mut().push(line);
            }
            Ok(())
        }

        fn on_before_render_pagination(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::Render(event) = event {
                self.seen.borrow_mut().push(format!("pagination:{}", event.get_id()));
            }
            Ok(())
        }

        fn on_after_render_pagination(&mut self, event: &mut LegacyEvent<'_>) -> ListenerResult {
            if let LegacyEvent::Render(event) = event {
                let line = format!("after_pagination:{}:{}", event.get_id(), event.get_content());
                self.seen.borrow_mut().push(line);
            }
            Ok(())
        }
    }

    impl LegacyPlugin for Recorder {
        fn get_metas(&self) -> PluginMetas {
            PluginMetas::from([("name".to_owned(), "recorder".to_owned())])
        }

        fn initialize(&mut self, subscriber: &mut LegacyEventSubscriber<Self>) {
            subscriber.add_event_listener("spress.before_convert", Self::on_before_convert);
            subscriber.add_event_listener("spress.after_convert_posts", Self::on_after_convert_posts);
            subscriber.add_event_listener("spress.before_render", Self::on_before_render);
            subscriber.add_event_listener("spress.after_render", Self::on_after_render);
            subscriber.add_event_listener(
                "spress.before_render_pagination",
                Self::on_before_render_pagination,
            );
            subscriber.add_event_listener(
                "spress.after_render_pagination",
                Self::on_after_render_pagination,
            );
        }
    }

    fn bus_with(plugin: Recorder) -> EventBus {
        let mut bus = EventBus::new();
        bus.add_plugin(LegacyPluginAdapter::new(plugin));
        bus.load_plugins().unwrap();
        bus
    }

    #[test]
    fn convert_event_maps_onto_content_event() {
        let bus = bus_with(Recorder::default());
        let mut item = Item::new("about.md", "hello");

        let mut event = Event::Content(ContentEvent::new(
            &mut item,
            SnapshotKind::Raw,
            PathKind::Relative,
        ));
        bus.dispatch(EventName::BeforeConvert, &mut event).unwrap();

        assert_eq!(item.content(SnapshotKind::Raw).unwrap(), "[hello]");
    }

    #[test]
    fn after_convert_posts_only_fires_for_posts() {
        let bus = bus_with(Recorder::default());

        let mut attrs = Attributes::new();
        attrs.insert("collection".to_owned(), json!("posts"));
        attrs.insert("tags".to_owned(), json!(["rust"]));
        let mut post = Item::new("_posts/2024-01-01-a.md", "").with_attributes(attrs);
        let mut page = Item::new("about.md", "");

        for item in [&mut post, &mut page] {
            let mut event = Event::Content(ContentEvent::new(
                item,
                SnapshotKind::Converted,
                PathKind::RelativeAfterConvert,
            ));
            bus.dispatch(EventName::AfterConvert, &mut event).unwrap();
        }

        assert_eq!(post.attribute("tags"), Some(&json!(["rust", "legacy"])));
        assert_eq!(page.attribute("tags"), None);
    }

    #[test]
    fn render_family_splits_on_pagination() {
        let recorder = Recorder::default();
        let seen = Rc::clone(&recorder.seen);
        let bus = bus_with(recorder);

        let mut plain = Item::new("about.md", "");
        let mut attrs = Attributes::new();
        attrs.insert("paginator".to_owned(), json!({ "page": 1 }));
        let mut paged = Item::new("blog/index.html", "").with_attributes(attrs);

        for item in [&mut plain, &mut paged] {
            item.set_content(SnapshotKind::Rendered, "done");
            let mut payload = Attributes::new();
            payload.insert("page".to_owned(), json!({}));

            let mut event = Event::Render(RenderEvent::new(
                item,
                SnapshotKind::Converted,
                &mut payload,
            ));
            bus.dispatch(EventName::BeforeRenderBlocks, &mut event).unwrap();

            let mut event = Event::Render(RenderEvent::new(
                item,
                SnapshotKind::Rendered,
                &mut payload,
            ));
            bus.dispatch(EventName::AfterRenderPage, &mut event).unwrap();
        }

        assert_eq!(
            *seen.borrow(),
            [
                "render:about.md",
                "after_render:about.md:done",
                "pagination:blog/index.html",
                "after_pagination:blog/index.html:done",
            ]
        );
        assert_eq!(plain.str_attribute("url"), Some("/legacy/"));
        assert_eq!(plain.output_path(), Some("legacy/index.html"));
        assert_eq!(paged.str_attribute("url"), None);
    }

    #[test]
    fn render_family_ignores_the_inner_render_events() {
        let recorder = Recorder::default();
        let seen = Rc::clone(&recorder.seen);
        let bus = bus_with(recorder);

        let mut item = Item::new("about.md", "");
        let mut payload = Attributes::new();
        for name in [EventName::AfterRenderBlocks, EventName::BeforeRenderPage] {
            let mut event = Event::Render(RenderEvent::new(
                &mut item,
                SnapshotKind::RenderedBlocks,
                &mut payload,
            ));
            bus.dispatch(name, &mut event).unwrap();
        }

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn unknown_legacy_event_fails_loading() {
        struct Typo;

        impl LegacyPlugin for Typo {
            fn get_metas(&self) -> PluginMetas {
                PluginMetas::from([("name".to_owned(), "typo".to_owned())])
            }

            fn initialize(&mut self, subscriber: &mut LegacyEventSubscriber<Self>) {
                subscriber.add_event_listener("spress.before_covnert", |_, _| Ok(()));
            }
        }

        let mut bus = EventBus::new();
        bus.add_plugin(LegacyPluginAdapter::new(Typo));
        let err = bus.load_plugins().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Plugin 'typo' subscribed to unknown event 'spress.before_covnert'"
        );
    }
}

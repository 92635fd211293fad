use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::config::ListenerErrorPolicy;
use crate::converter::BoxError;
use crate::event::{Event, EventName};
use crate::item::ItemError;

/// Informational plugin metadata. Must contain a non-empty `name`.
pub type PluginMetas = BTreeMap<String, String>;

pub type ListenerResult = Result<(), ListenerError>;

/// Error raised by a plugin handler.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ItemError> for ListenerError {
    fn from(err: ItemError) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

/// A listener failure with the plugin and event it happened in.
#[derive(Debug, thiserror::Error)]
#[error("Plugin '{plugin}' failed handling '{event}': {source}")]
pub struct ListenerFailure {
    pub plugin: String,
    pub event: EventName,
    #[source]
    pub source: ListenerError,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// First failure; remaining listeners did not run.
    #[error(transparent)]
    Aborted(ListenerFailure),

    /// All listeners ran; these failed.
    #[error("{} listener(s) failed handling '{event}'", .failures.len())]
    Collected {
        event: EventName,
        failures: Vec<ListenerFailure>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin metadata has no 'name'")]
    MissingName,

    #[error("Plugin '{plugin}' subscribed to unknown event '{event}'")]
    UnknownEvent { plugin: String, event: String },

    #[error("Plugin '{plugin}' failed to initialize: {message}")]
    Initialization { plugin: String, message: String },
}

type Handler<P> = Box<dyn Fn(&mut P, &mut Event<'_>) -> ListenerResult>;

/// Registration surface handed to a plugin during `initialize`.
///
/// One handler per event name: registering the same event again replaces
/// the earlier handler.
pub struct EventSubscriber<P> {
    listeners: Vec<(EventName, Handler<P>)>,
}

impl<P> Default for EventSubscriber<P> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<P> EventSubscriber<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener<F>(&mut self, event: EventName, handler: F)
    where
        F: Fn(&mut P, &mut Event<'_>) -> ListenerResult + 'static,
    {
        let handler: Handler<P> = Box::new(handler);
        match self.listeners.iter_mut().find(|(name, _)| *name == event) {
            Some(slot) => slot.1 = handler,
            None => self.listeners.push((event, handler)),
        }
    }

    pub fn event_names(&self) -> impl Iterator<Item = EventName> + '_ {
        self.listeners.iter().map(|(name, _)| *name)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Current plugin protocol.
pub trait Plugin: Sized + 'static {
    fn metas(&self) -> PluginMetas;

    /// Called exactly once per build, before `spress.start`.
    fn initialize(&mut self, subscriber: &mut EventSubscriber<Self>) -> Result<(), PluginError>;
}

/// Name and metadata of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub metas: PluginMetas,
}

type Loader = Box<dyn FnOnce(&mut EventBus) -> Result<(), PluginError>>;
type Listener = Box<dyn Fn(&mut Event<'_>) -> ListenerResult>;

struct RegisteredListener {
    plugin: String,
    call: Listener,
}

/// Owns plugins and dispatches events to their listeners.
#[derive(Default)]
pub struct EventBus {
    pending: Vec<Loader>,
    plugins: Vec<PluginInfo>,
    listeners: BTreeMap<EventName, Vec<RegisteredListener>>,
    policy: ListenerErrorPolicy,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ListenerErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: ListenerErrorPolicy) {
        self.policy = policy;
    }

    /// Queue a plugin. It is initialized by [`EventBus::load_plugins`].
    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) {
        self.pending
            .push(Box::new(move |bus: &mut EventBus| bus.load(plugin)));
    }

    /// Initialize queued plugins in the order they were added.
    pub fn load_plugins(&mut self) -> Result<(), PluginError> {
        for loader in std::mem::take(&mut self.pending) {
            loader(self)?;
        }
        Ok(())
    }

    fn load<P: Plugin>(&mut self, plugin: P) -> Result<(), PluginError> {
        let metas = plugin.metas();
        let name = metas
            .get("name")
            .filter(|name| !name.is_empty())
            .cloned()
            .ok_or(PluginError::MissingName)?;

        let plugin = Rc::new(RefCell::new(plugin));
        let mut subscriber = EventSubscriber::new();
        plugin.borrow_mut().initialize(&mut subscriber)?;

        for (event, handler) in subscriber.listeners {
            let target = Rc::clone(&plugin);
            self.listeners
                .entry(event)
                .or_default()
                .push(RegisteredListener {
                    plugin: name.clone(),
                    call: Box::new(move |ev: &mut Event<'_>| handler(&mut *target.borrow_mut(), ev)),
                });
        }

        tracing::debug!(plugin = %name, "Loaded plugin");
        self.plugins.push(PluginInfo { name, metas });
        Ok(())
    }

    pub fn plugins(&self) -> &[PluginInfo] {
        &self.plugins
    }

    pub fn has_listeners(&self, event: EventName) -> bool {
        self.listeners
            .get(&event)
            .is_some_and(|listeners| !listeners.is_empty())
    }

    /// Run every listener registered for `name`, in load order, on the same
    /// event instance.
    pub fn dispatch(&self, name: EventName, event: &mut Event<'_>) -> Result<(), DispatchError> {
        let Some(listeners) = self.listeners.get(&name) else {
            return Ok(());
        };

        let mut failures = Vec::new();
        for listener in listeners {
            tracing::trace!(plugin = %listener.plugin, event = %name, "Dispatching event");
            if let Err(source) = (listener.call)(event) {
                let failure = ListenerFailure {
                    plugin: listener.plugin.clone(),
                    event: name,
                    source,
                };
                match self.policy {
                    ListenerErrorPolicy::Abort => return Err(DispatchError::Aborted(failure)),
                    ListenerErrorPolicy::Collect => failures.push(failure),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Collected {
                event: name,
                failures,
            })
        }
    }
}

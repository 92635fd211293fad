pub mod builder;
pub mod collection;
pub mod config;
pub mod converter;
pub mod event;
pub mod frontmatter;
pub mod generator;
pub mod item;
pub mod legacy;
pub mod markdown;
pub mod permalink;
pub mod plugin;
pub mod scanner;
pub mod site;
pub mod template;
pub mod writer;

// Re-export main types
pub use builder::{BuildError, BuildState, BuildSummary, Pipeline, SiteBuilder, Stage};
pub use config::Configuration;
pub use converter::{Converter, ConverterRegistry, ConverterResult};
pub use event::{Event, EventName};
pub use item::{Attributes, Item, PathKind, SnapshotKind};
pub use legacy::{LegacyPlugin, LegacyPluginAdapter};
pub use markdown::MarkdownConverter;
pub use plugin::{EventBus, EventSubscriber, ListenerError, Plugin, PluginMetas};
pub use scanner::SourceScanner;
pub use site::SiteAttributes;
pub use template::{Renderer, TemplateError, TeraRenderer};
pub use writer::{DataWriter, FilesystemDataWriter, MemoryDataWriter};

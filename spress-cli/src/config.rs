use anyhow::Result;
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use spress_core::Configuration;
use std::path::Path;

/// Complete configuration that merges CLI args, env vars, config files, and defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpressConfig {
    /// Where to read from and write to
    pub paths: PathsConfig,
    /// Pipeline configuration (from spress-core)
    #[serde(flatten)]
    pub site: Configuration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Content directory scanned into items
    pub source: String,
    /// Output directory for the generated site
    pub output: String,
    /// Layout templates
    pub layouts: String,
    /// Configuration file path
    pub config: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: "./src/content".to_string(),
            output: "./build".to_string(),
            layouts: "./src/layouts".to_string(),
            config: "./spress.toml".to_string(),
        }
    }
}

impl SpressConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (SPRESS_*)
    /// 3. Configuration file
    /// 4. Defaults (lowest priority)
    pub fn load(args: &ArgMatches) -> Result<Self> {
        let config_file = string_arg(args, "config").unwrap_or_else(|| PathsConfig::default().config);

        let mut builder = ConfigBuilder::builder();

        let defaults = Self::default();
        builder = builder.add_source(ConfigBuilder::try_from(&defaults)?);

        if Path::new(&config_file).exists() {
            tracing::info!(file = %config_file, "Reading configuration");
            builder = builder.add_source(File::from(Path::new(&config_file)));
        }

        // Double underscore separates nested keys: SPRESS_PATHS__OUTPUT
        builder = builder.add_source(
            Environment::with_prefix("SPRESS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (arg, key) in [
            ("source", "paths.source"),
            ("output", "paths.output"),
            ("layouts", "paths.layouts"),
            ("config", "paths.config"),
        ] {
            if let Some(value) = string_arg(args, arg) {
                builder = builder.set_override(key, value)?;
            }
        }
        if flag_arg(args, "drafts") {
            builder = builder.set_override("build.drafts", true)?;
        }
        if flag_arg(args, "parallel") {
            builder = builder.set_override("build.parallel_conversion", true)?;
        }

        let config: SpressConfig = builder.build()?.try_deserialize()?;
        config.site.validate()?;
        Ok(config)
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }
}

/// Arguments this command does not define read as absent.
fn string_arg(args: &ArgMatches, id: &str) -> Option<String> {
    args.try_get_one::<String>(id).ok().flatten().cloned()
}

fn flag_arg(args: &ArgMatches, id: &str) -> bool {
    matches!(args.try_get_one::<bool>(id), Ok(Some(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};
    use spress_core::config::ListenerErrorPolicy;

    fn command() -> Command {
        Command::new("test")
            .arg(Arg::new("source").long("source").value_name("DIR"))
            .arg(Arg::new("output").long("output").value_name("DIR"))
            .arg(Arg::new("config").long("config").value_name("FILE"))
            .arg(Arg::new("drafts").long("drafts").action(ArgAction::SetTrue))
    }

    #[test]
    fn test_default_config() {
        let config = SpressConfig::default();
        assert_eq!(config.paths.source, "./src/content");
        assert_eq!(config.paths.output, "./build");
        assert_eq!(config.paths.layouts, "./src/layouts");
        assert_eq!(config.site.permalink, "pretty");
        assert!(!config.site.build.drafts);
    }

    #[test]
    fn test_cli_args_override() {
        let matches = command()
            .try_get_matches_from([
                "test",
                "--source",
                "/custom/source",
                "--output",
                "/custom/output",
                "--config",
                "/does/not/exist.toml",
                "--drafts",
            ])
            .unwrap();

        let config = SpressConfig::load(&matches).unwrap();
        assert_eq!(config.paths.source, "/custom/source");
        assert_eq!(config.paths.output, "/custom/output");
        // Should still have defaults for non-overridden values
        assert_eq!(config.paths.layouts, "./src/layouts");
        assert!(config.site.build.drafts);
        assert!(config.site.collections.contains_key("posts"));
    }

    #[test]
    fn test_config_file_is_layered() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spress.toml");
        std::fs::write(
            &file,
            r#"
permalink = "date"

[paths]
output = "./public"

[site]
title = "Blog"

[build]
on_listener_error = "collect"
"#,
        )
        .unwrap();

        let file = file.to_string_lossy().into_owned();
        let matches = command()
            .try_get_matches_from(["test", "--config", file.as_str(), "--output", "./dist"])
            .unwrap();

        let config = SpressConfig::load(&matches).unwrap();
        assert_eq!(config.paths.output, "./dist");
        assert_eq!(config.paths.config, file);
        assert_eq!(config.site.permalink, "date");
        assert_eq!(config.site.get("title").and_then(|v| v.as_str()), Some("Blog"));
        assert_eq!(config.site.build.on_listener_error, ListenerErrorPolicy::Collect);
    }
}

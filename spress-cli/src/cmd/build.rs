use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use spress_core::{FilesystemDataWriter, SiteBuilder, SourceScanner, TeraRenderer};

use crate::config::SpressConfig;

pub fn add_build_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("DIR")
                .help("Content directory [default: ./src/content]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for generated site [default: ./build]"),
        )
        .arg(
            Arg::new("layouts")
                .short('l')
                .long("layouts")
                .value_name("DIR")
                .help("Layout templates directory [default: ./src/layouts]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file [default: ./spress.toml]"),
        )
        .arg(
            Arg::new("drafts")
                .long("drafts")
                .help("Include items marked as drafts")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .help("Convert items on a thread pool when no plugin listens to conversion")
                .action(ArgAction::SetTrue),
        )
}

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("build")).about("Build the static site")
}

pub fn execute(args: &ArgMatches) -> Result<()> {
    let config = SpressConfig::load(args)?;
    let paths = config.paths().clone();

    let items = SourceScanner::new(&paths.source)
        .scan()
        .with_context(|| format!("Failed to read content from {}", paths.source))?;
    let renderer = TeraRenderer::from_dir(&paths.layouts)
        .with_context(|| format!("Failed to load layouts from {}", paths.layouts))?;

    let mut pipeline = SiteBuilder::new()
        .configuration(config.site)
        .renderer(renderer)
        .writer(FilesystemDataWriter::new(&paths.output))
        .build()?;

    let summary = pipeline.run(items)?;

    for id in &summary.skipped {
        eprintln!("Skipped {id}");
    }
    for error in &summary.listener_errors {
        eprintln!("Plugin error: {error}");
    }
    println!(
        "Site built successfully in {} ({} items)",
        paths.output, summary.items_written
    );

    Ok(())
}

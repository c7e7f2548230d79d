// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod process;
pub mod scan;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cache::{shared, FileCacheStore, MemoryCacheStore, SharedStore};
use crate::cli::CliArgs;
use crate::config::loader::load_with_root;
use crate::config::model::{BoxConfig, RouteConfig};
use crate::process::{Handler, SourceFile};
use crate::types::CacheStorageMode;

pub use crate::engine::{SourceBox, SourceBoxBuilder, WatchState};
pub use crate::errors::SourceBoxError;
pub use crate::process::{PatternSpec, Registration};
pub use crate::scan::ScanSummary;
pub use crate::types::ChangeType;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds the box and its route processors, then either
/// runs one pass (`--once`) or watches until Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_with_root(&config_path, args.root.as_deref())?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let config_dir = config_root_dir(&config_path);
    let root = match args.root.as_deref() {
        Some(root) => PathBuf::from(root),
        None => config_dir.join(&cfg.source.root),
    };
    let store = open_store(&cfg, &config_dir)?;

    let mut builder = SourceBox::builder(root)
        .ignore(cfg.source.ignore.clone())
        .store(store)
        .rename_window(cfg.rename_window())
        .concurrency(cfg.watch.concurrency);
    if let Some(scope) = &cfg.source.scope {
        builder = builder.scope(scope.clone());
    }
    let source_box = builder.build();

    for route in &cfg.routes {
        install_route(&source_box, route)?;
    }

    if args.once {
        let summary = source_box.process().await?;
        info!(dispatched = summary.dispatched(), "single pass complete");
        return Ok(());
    }

    source_box.watch().await?;
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    source_box.unwatch();
    source_box.cache().flush()?;
    Ok(())
}

/// Directory the config file lives in, or the working directory for a bare
/// file name.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn open_store(cfg: &BoxConfig, config_dir: &Path) -> Result<SharedStore> {
    match cfg.cache.mode {
        CacheStorageMode::Memory => Ok(shared(MemoryCacheStore::new())),
        CacheStorageMode::File => {
            let store = FileCacheStore::open(config_dir.join(&cfg.cache.path))?;
            Ok(shared(store))
        }
    }
}

fn install_route(source_box: &SourceBox, route: &RouteConfig) -> Result<()> {
    let handler = route_handler(route.name.clone());
    match &route.pattern {
        Some(pattern) => source_box.add_processor(pattern.as_str(), handler)?,
        None => source_box.add_handler(handler)?,
    }
    debug!(route = %route.name, pattern = ?route.pattern, "route installed");
    Ok(())
}

fn route_handler(name: String) -> impl Handler {
    move |file: SourceFile| {
        let name = name.clone();
        async move {
            println!(
                "[sourcebox] {} {} route={} params={:?}",
                file.change, file.path, name, file.params
            );
            Ok::<(), anyhow::Error>(())
        }
    }
}

fn print_dry_run(cfg: &BoxConfig) {
    println!("sourcebox dry-run");
    println!("  source.root = {}", cfg.source.root);
    let ignore = cfg.source.ignore.patterns();
    if !ignore.is_empty() {
        println!("  source.ignore = {:?}", ignore);
    }
    if let Some(scope) = &cfg.source.scope {
        println!("  source.scope = {scope}");
    }
    println!("  cache.mode = {:?}", cfg.cache.mode);
    if cfg.cache.mode == CacheStorageMode::File {
        println!("  cache.path = {}", cfg.cache.path);
    }
    println!("  watch.rename_window_ms = {}", cfg.watch.rename_window_ms);
    println!("  watch.concurrency = {}", cfg.watch.concurrency);
    println!();

    println!("routes ({}):", cfg.routes.len());
    for route in &cfg.routes {
        match &route.pattern {
            Some(pattern) => println!("  - {} ({pattern})", route.name),
            None => println!("  - {} (all files)", route.name),
        }
    }

    debug!("dry-run complete (nothing processed)");
}

//! Desktop wallpaper auto-updater.
//!
//! Polls a remote listing or GitHub release and applies the image it names as
//! the light- and dark-theme wallpaper whenever it changes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use wallpoll::cycle::{CycleContext, run_cycle};
use wallpoll::exit_codes;
use wallpoll::io::config::{WallpollConfig, load_config, write_config};
use wallpoll::io::desktop::setter_from_config;
use wallpoll::io::http::HttpFetcher;
use wallpoll::io::paths::{AppPaths, config_path};
use wallpoll::io::state_store::load_state;
use wallpoll::logging;
use wallpoll::looping::{LoopOptions, run_loop};

#[derive(Parser)]
#[command(
    name = "wallpoll",
    version,
    about = "Keep the desktop wallpaper in sync with a remote source"
)]
struct Cli {
    /// Config file (default: `$XDG_CONFIG_HOME/wallpoll/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the source forever, applying new wallpapers as they appear.
    Run {
        /// Stop after this many cycles.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_cycles: Option<u32>,
    },
    /// Run a single poll cycle.
    Check,
    /// Print the last applied wallpaper.
    Status,
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = config_path(cli.config.as_deref(), |key| std::env::var_os(key))?;
    match cli.command {
        Command::Run { max_cycles } => cmd_run(&config_path, max_cycles),
        Command::Check => cmd_check(&config_path),
        Command::Status => cmd_status(&config_path),
        Command::Init { force } => cmd_init(&config_path, force),
    }
}

/// Load config, install logging and resolve paths shared by `run` and `check`.
fn prepare(config_path: &Path) -> Result<(WallpollConfig, CycleContext)> {
    let cfg = load_config(config_path)?;
    logging::init(cfg.log_file.as_deref())?;
    let paths = AppPaths::from_env(&cfg)?;
    let ctx = CycleContext::new(&cfg, &paths);
    Ok((cfg, ctx))
}

fn cmd_run(config_path: &Path, max_cycles: Option<u32>) -> Result<i32> {
    let (cfg, ctx) = prepare(config_path)?;
    let fetcher = HttpFetcher::new(cfg.http_timeout())?;
    let setter = setter_from_config(&cfg.apply);
    let options = LoopOptions {
        interval: cfg.poll_interval(),
        max_cycles,
    };

    let outcome = run_loop(
        &ctx,
        &fetcher,
        setter.as_ref(),
        &options,
        std::thread::sleep,
        |_| {},
    );
    println!(
        "run: cycles={} updated={} failed={}",
        outcome.cycles, outcome.updated, outcome.failed
    );
    if outcome.failed > 0 && outcome.failed == outcome.cycles {
        return Ok(exit_codes::FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_check(config_path: &Path) -> Result<i32> {
    let (cfg, ctx) = prepare(config_path)?;
    let fetcher = HttpFetcher::new(cfg.http_timeout())?;
    let setter = setter_from_config(&cfg.apply);

    let outcome = run_cycle(&ctx, &fetcher, setter.as_ref()).context("check for updates")?;
    println!(
        "check: outcome={} identifier={}",
        outcome.label(),
        outcome.identifier()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let paths = AppPaths::from_env(&cfg)?;
    let Some(record) = load_state(&paths.state_path)? else {
        println!("status: no wallpaper applied yet ({})", paths.state_path.display());
        return Ok(exit_codes::NO_STATE);
    };
    println!("status: identifier={}", record.identifier);
    println!("status: source={}", record.source);
    println!("status: local_path={}", record.local_path);
    println!(
        "status: sha256={}",
        record.sha256.as_deref().unwrap_or("<unknown>")
    );
    println!("status: updated_at={}", record.updated_at);
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("init: config exists at {}", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &WallpollConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("init: wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

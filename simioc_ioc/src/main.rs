//! # simioc Binary
//!
//! Runs one simulated IOC until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # List available IOCs
//! simioc --list
//!
//! # Run the motor IOC under the default prefix
//! simioc --ioc motor
//!
//! # BTPS IOC from a config file, with a macro and verbose logging
//! simioc --config ioc.toml --macro area=LAS -v
//!
//! # Print every PV name and exit
//! simioc --ioc btps --dump-pvs
//! ```

use clap::Parser;
use simioc_common::config::{ConfigLoader, LogLevel, parse_macro};
use simioc_common::pv::{MemoryStore, ValueStore};
use simioc_common::sim::IocConfig;
use simioc_ioc::{IocCore, IocRegistry, StatePersistence, TaskExit};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// simioc - soft-IOC device simulator
#[derive(Parser, Debug)]
#[command(name = "simioc")]
#[command(version)]
#[command(about = "Soft-IOC simulator for motors, BTPS routing, valves and auxiliary devices")]
#[command(long_about = None)]
struct Args {
    /// IOC to run (see --list). Overrides `ioc` in the config file.
    #[arg(short, long)]
    ioc: Option<String>,

    /// PV prefix. Overrides `prefix` in the config file.
    #[arg(short, long)]
    prefix: Option<String>,

    /// Macro definition `key=value` (can be specified multiple times)
    #[arg(short, long = "macro", action = clap::ArgAction::Append)]
    macros: Vec<String>,

    /// Path to the IOC configuration file (ioc.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File for motor position persistence
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// List available IOCs and exit
    #[arg(long)]
    list: bool,

    /// Print the IOC's PV names (with --json: values and metadata) and exit
    #[arg(long)]
    dump_pvs: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("simioc failed: {}", e);
        eprintln!("simioc: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = init(&args)?;

    let registry = IocRegistry::with_builtin();
    if args.list {
        for (name, description) in registry.list() {
            println!("{name:<12} {description}");
        }
        return Ok(());
    }

    let ioc = config
        .ioc
        .clone()
        .ok_or("No IOC selected (use --ioc or set `ioc` in the config file)")?;

    info!(
        "simioc v{} starting IOC '{}' ({})",
        env!("CARGO_PKG_VERSION"),
        ioc,
        config.shared.service_name
    );

    let (prefix, assembly) = registry.create(&ioc, &config)?;
    info!("PV prefix: {}", prefix);

    let store: Arc<dyn ValueStore> = Arc::new(MemoryStore::new());
    let mut core = IocCore::new(&ioc, assembly, Arc::clone(&store))?;

    if args.dump_pvs {
        dump_pvs(store.as_ref(), args.json)?;
        return Ok(());
    }

    if let Some(path) = &config.state_file {
        info!("Persisting motor positions to {:?}", path);
        core = core.with_persistence(StatePersistence::new(path));
    }

    let running = core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    let reports = core.run()?;
    for report in &reports {
        match &report.exit {
            TaskExit::Stopped => {}
            TaskExit::Halted(reason) => warn!("Task {} had halted: {}", report.name, reason),
            TaskExit::Panicked => warn!("Task {} had panicked", report.name),
        }
    }

    info!("simioc shutdown complete");
    Ok(())
}

/// Load the configuration and install the tracing subscriber.
///
/// The subscriber is installed on both paths, at the default level when the
/// configuration cannot be loaded, so the failure reaches the log.
fn init(args: &Args) -> Result<IocConfig, Box<dyn std::error::Error>> {
    match load_config(args) {
        Ok(config) => {
            setup_tracing(args, config.shared.log_level);
            Ok(config)
        }
        Err(e) => {
            setup_tracing(args, LogLevel::default());
            Err(e)
        }
    }
}

/// Print every PV, as names or as one JSON object per line.
fn dump_pvs(store: &dyn ValueStore, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    for name in store.names() {
        if !json {
            println!("{name}");
            continue;
        }
        let snapshot = store.read(&name)?;
        let line = serde_json::json!({
            "name": name,
            "value": snapshot.value,
            "metadata": snapshot.metadata,
        });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

/// Load the config file (if any) and apply CLI overrides.
fn load_config(args: &Args) -> Result<IocConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => IocConfig::load(path)?,
        None => IocConfig::default(),
    };

    if let Some(ioc) = &args.ioc {
        config.ioc = Some(ioc.clone());
    }
    if let Some(prefix) = &args.prefix {
        config.prefix = Some(prefix.clone());
    }
    for definition in &args.macros {
        let (key, value) = parse_macro(definition)?;
        config.macros.insert(key, value);
    }
    if let Some(path) = &args.state_file {
        config.state_file = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match configured {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

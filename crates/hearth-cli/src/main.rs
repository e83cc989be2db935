use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use hearth_host::{
    Host, JsonConfigStore, LocalHost, SourceLoader, BOOTSTRAP_MODULE_ID, BOOTSTRAP_SOURCE,
};
use hearth_lang::ScriptEngine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod config;
mod console;
mod logging;

use config::{ConfigLoadError, HearthConfig};
use console::ConsoleInput;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the platform default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory from the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log to the console only
    #[arg(long)]
    no_file_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(HearthConfig::config_path)
        .context("Failed to determine config directory")?;

    let mut created_example = false;
    let mut config = match HearthConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(ConfigLoadError::NotFound) => {
            HearthConfig::create_example(&config_path)?;
            created_example = true;
            HearthConfig::default()
        }
        Err(err) => return Err(err).context("Failed to load config"),
    };
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = Some(data_dir);
    }

    let log_file = if cli.no_file_log { None } else { config.log_file() };
    let _guard = logging::init_logging(cli.debug, log_file.as_deref())?;

    if created_example {
        info!("Created example config at {}", config_path.display());
    } else {
        info!("Using config {}", config_path.display());
    }

    let local = Rc::new(LocalHost::new());
    let host = start_host(&config, &local)?;

    run(&config, &local).await;

    info!("Disabling scripts...");
    let report = host.on_disable();
    info!(
        "Disabled {} script(s), {} failed",
        report.succeeded.len(),
        report.failed.len()
    );

    Ok(())
}

/// Build the host and run the load sequence
fn start_host(config: &HearthConfig, local: &Rc<LocalHost>) -> Result<Host> {
    let modules_dir = config.modules_dir();
    let scripts_dir = config.scripts_dir();

    let mut builder = Host::builder()
        .evaluator(Rc::new(ScriptEngine::new()))
        .capabilities(local.clone())
        .types(Rc::new(config.host_types()))
        .config_store(Rc::new(JsonConfigStore::new()))
        .root_namespace(config.root_namespace.clone());
    builder = match config.bootstrap() {
        Some(id) => builder.bootstrap_module(id),
        None => builder.without_bootstrap(),
    };
    let host = builder.build()?;

    if config.bootstrap() == Some(BOOTSTRAP_MODULE_ID) {
        install_bootstrap(&modules_dir, config)?;
    }

    let loader = Rc::new(SourceLoader::new());
    let extensions: Vec<&str> = config.extensions.iter().map(String::as_str).collect();
    host.add_module_loader(loader.clone(), &extensions);
    host.add_script_loader(loader, &extensions);

    let modules = host.load_modules(&modules_dir);
    let scripts = host.load_scripts(&scripts_dir);
    let evaluated = host.eval_scripts();

    info!(
        "Modules: {} loaded, {} failed. Scripts: {} loaded, {} failed, {} running",
        modules.loaded.len(),
        modules.failed.len(),
        scripts.loaded.len(),
        scripts.failed.len(),
        evaluated.succeeded.len()
    );

    Ok(host)
}

/// Write the bundled bootstrap module unless one is already there
fn install_bootstrap(modules_dir: &std::path::Path, config: &HearthConfig) -> Result<()> {
    let extension = config
        .extensions
        .first()
        .map(String::as_str)
        .unwrap_or("js");
    let path = modules_dir.join(format!("{}.{}", BOOTSTRAP_MODULE_ID, extension));
    if path.exists() {
        return Ok(());
    }

    fs::create_dir_all(modules_dir)
        .with_context(|| format!("Failed to create {}", modules_dir.display()))?;
    fs::write(&path, BOOTSTRAP_SOURCE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Installed bootstrap module at {}", path.display());
    Ok(())
}

/// Drive the scheduler and the console until shutdown is requested
async fn run(config: &HearthConfig, local: &LocalHost) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Running. Type `quit` or press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = ticker.tick() => {
                local.run_pending(Instant::now());
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_line(local, &line) {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    stdin_open = false;
                }
            },
        }
    }
}

/// Returns false when the console asked to quit
fn handle_line(local: &LocalHost, line: &str) -> bool {
    match console::parse_line(line) {
        ConsoleInput::Empty => {}
        ConsoleInput::Quit => return false,
        ConsoleInput::Event { name, payload } => {
            let handlers = local.fire(&name, &payload);
            info!("Fired {} to {} handler(s)", name, handlers);
        }
        ConsoleInput::Command(command) => match local.dispatch_command("console", &command) {
            Some(true) => {}
            Some(false) => warn!("Command failed: {}", command),
            None => warn!("Unknown command: {}", command),
        },
        ConsoleInput::Invalid(message) => warn!("{}", message),
    }
    true
}

//! f007th-setup - install or remove the F007TH sensor service.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use f007th_setup::config::{Settings, DEFAULT_CONFIG_PATH};
use f007th_setup::error::SetupError;
use f007th_setup::lifecycle::{Lifecycle, LifecycleStatus, Report};

#[derive(Parser)]
#[command(name = "f007th-setup", version)]
#[command(about = "Install or remove the F007TH sensor service and its GPIO kernel module")]
struct Cli {
    /// Configuration file [default: /etc/f007th/setup.toml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and load the kernel module, then install and start the service
    Install,
    /// Stop and remove the service, then unload and unregister the kernel module
    Uninstall,
    /// Show the current state without changing anything
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load_or_default(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings);
    match &cli.config {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!(default_path = DEFAULT_CONFIG_PATH, "Using default configuration"),
    }

    match run(cli.command, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.code(), error = %e, "Operation failed");
            eprintln!("error [{}]: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, settings: Settings) -> Result<(), SetupError> {
    let lifecycle = Lifecycle::new(settings)?;

    match command {
        Commands::Install => print_report(&lifecycle.install()?),
        Commands::Uninstall => print_report(&lifecycle.uninstall()?),
        Commands::Status => print_status(&lifecycle.status()?),
    }

    Ok(())
}

fn print_report(report: &Report) {
    for record in &report.steps {
        println!("{:<26} {}", record.step, record.outcome);
    }
    if report.changed() {
        println!("{} complete", report.operation);
    } else {
        println!("{} complete (nothing to change)", report.operation);
    }
}

fn print_status(status: &LifecycleStatus) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("state:            {}", status.state);
    println!("unit:             {}", status.unit);
    println!("  file present:   {}", yes_no(status.unit_file_present));
    println!("  enabled:        {}", yes_no(status.unit_enabled));
    println!("  active:         {}", yes_no(status.unit_active));
    println!("module:           {}", status.module);
    println!("  loaded:         {}", yes_no(status.module_loaded));
    println!("  loaded at boot: {}", yes_no(status.boot_configured));
    println!("  parameters:     {}", yes_no(status.params_present));
}

/// Logs go to stderr so stdout carries only the report.
fn init_logging(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

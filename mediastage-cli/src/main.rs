//! mediastage command-line front-end
//!
//! Stages the bundled transcoder and prints where it lives, so shell scripts
//! and non-Rust hosts can use the same staging layout.

use anyhow::{bail, Context, Result};
use mediastage_core::{
    load_config_from, DirectoryResources, ExecutableProvisioner, ProvisionerConfig,
    ResourceSource,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "\
Usage: mediastage [COMMAND] [OPTIONS]

Commands:
  path     Stage the executable if needed and print its path (default)
  info     Stage, then print platform, resource and staging details as JSON
  prune    Remove staging directories of other versions
  clean    Remove this version's staging directory

Options:
  --config <FILE>      Load provisioner settings from a JSON file
  --resources <DIR>    Read bundled executables from DIR instead of the embedded set
  -h, --help           Show this help
  -V, --version        Show version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Path,
    Info,
    Prune,
    Clean,
}

#[derive(Debug)]
struct Args {
    action: Action,
    config: Option<PathBuf>,
    resources: Option<PathBuf>,
}

enum Parsed {
    Run(Args),
    Help,
    Version,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Parsed> {
    let mut action = None;
    let mut config = None;
    let mut resources = None;

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-V" | "--version" => return Ok(Parsed::Version),
            "--config" => {
                let value = raw.next().context("--config requires a file path")?;
                config = Some(PathBuf::from(value));
            }
            "--resources" => {
                let value = raw.next().context("--resources requires a directory")?;
                resources = Some(PathBuf::from(value));
            }
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            command => {
                if action.is_some() {
                    bail!("Unexpected argument: {}", command);
                }
                action = Some(match command {
                    "path" => Action::Path,
                    "info" => Action::Info,
                    "prune" => Action::Prune,
                    "clean" => Action::Clean,
                    _ => bail!("Unknown command: {}", command),
                });
            }
        }
    }

    Ok(Parsed::Run(Args {
        action: action.unwrap_or(Action::Path),
        config,
        resources,
    }))
}

fn build_provisioner(args: &Args) -> Result<ExecutableProvisioner> {
    let config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => ProvisionerConfig::default(),
    };

    Ok(match &args.resources {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("Resource directory not found: {}", dir.display());
            }
            let source: Arc<dyn ResourceSource> = Arc::new(DirectoryResources::new(dir));
            ExecutableProvisioner::with_resources(config, source)
        }
        None => ExecutableProvisioner::new(config),
    })
}

fn run(args: Args) -> Result<ExitCode> {
    let provisioner = build_provisioner(&args)?;

    match args.action {
        Action::Path => {
            let report = provisioner.provision();
            println!("{}", report.path.display());
            if !report.is_ready() {
                for issue in &report.issues {
                    eprintln!("warning: {}", issue);
                }
                return Ok(ExitCode::FAILURE);
            }
        }
        Action::Info => {
            let report = provisioner.provision();
            let issues: Vec<String> = report.issues.iter().map(|e| e.to_string()).collect();
            let info = serde_json::json!({
                "version": mediastage_core::VERSION,
                "config": provisioner.config(),
                "platform": provisioner.platform(),
                "resource_name": provisioner.resource_name(),
                "resource_source": provisioner.resources().describe(),
                "resource_available": provisioner.has_bundled_executable(),
                "staging_dir": provisioner.staging_dir(),
                "target_path": provisioner.target_path(),
                "staged": report.is_ready(),
                "action": report.action,
                "issues": issues,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Action::Prune => {
            for dir in provisioner.prune_stale_versions()? {
                println!("{}", dir.display());
            }
        }
        Action::Clean => {
            if provisioner.remove_staged()? {
                println!("{}", provisioner.staging_dir().display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    // Initialize logging (stderr; stdout is reserved for command output)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mediastage=debug".parse().expect("valid directive"))
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::debug!("Starting mediastage v{}", mediastage_core::VERSION);

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Parsed::Run(args)) => args,
        Ok(Parsed::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Ok(Parsed::Version) => {
            println!("mediastage {}", mediastage_core::VERSION);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

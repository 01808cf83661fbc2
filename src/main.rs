use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roomservice::{
    Config, EntryChange, GitHubClient, Invocation, Outcome, RepoSync, Resolution, RoomService, SyncStatus,
};

#[derive(Parser)]
#[command(name = "roomservice")]
#[command(about = "Fetch a device tree and its dependencies into a repo checkout")]
#[command(version)]
struct Cli {
    /// Product to fetch, e.g. xos_widget; the device is the part after the first underscore
    product: String,

    /// Any value selects dependencies-only mode; remote:<name> and branch:<name> override the target
    args: Vec<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the repo checkout
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting roomservice v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config)?;
    let invocation = Invocation::parse(&cli.product, &cli.args, &config.target);

    let lister = GitHubClient::new(&config.github)?;
    let syncer = RepoSync::new(&config.sync, &cli.root);
    let service = RoomService::new(&config, &cli.root, lister, syncer);

    let outcome = service.run(&invocation).await?;
    print_outcome(&outcome, &service.manifests().local);

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

fn print_outcome(outcome: &Outcome, overlay: &std::path::Path) {
    match outcome {
        Outcome::DeviceSynced {
            repository,
            change,
            sync,
            dependencies,
        } => {
            println!("Found repository: {}", repository.name);
            print_change(change);
            print_sync("Repository", sync);
            print_resolution(dependencies);
            println!("Done");
        }
        Outcome::DeviceNotFound { device, remote } => {
            println!(
                "Repository for {} not found in the {} GitHub repository list. \
                 If this is in error, you may need to manually add it to {}",
                device,
                remote,
                overlay.display()
            );
        }
        Outcome::DependenciesResolved { path, dependencies } => {
            println!("Device tree: {}", path);
            print_resolution(dependencies);
        }
        Outcome::DeviceNotInstalled { device } => {
            println!(
                "Trying dependencies-only mode on a non-existing device tree? \
                 No manifest lists a device tree for {}",
                device
            );
        }
    }
}

fn print_change(change: &EntryChange) {
    match change {
        EntryChange::Unchanged { name, path } => println!("   {} already at {}", name, path),
        EntryChange::Updated {
            name,
            previous_name,
            previous_revision,
            ..
        } => {
            if let Some(old) = previous_name {
                println!("   Renamed {} -> {}", old, name);
            }
            if let Some(old) = previous_revision {
                println!("   Updated branch of {} (was {})", name, old);
            }
        }
        EntryChange::Added {
            name,
            path,
            revision,
            replaces,
        } => {
            println!("   Added {} -> {} ({})", name, path, revision);
            if let Some(replaced) = replaces {
                println!("   Masked {} from the main manifest", replaced);
            }
        }
    }
}

fn print_sync(what: &str, sync: &SyncStatus) {
    match sync {
        SyncStatus::NotNeeded => {}
        SyncStatus::Completed { paths } => println!("{} synced: {}", what, paths.join(" ")),
        SyncStatus::Failed(error) => println!("⚠️  {} sync failed: {}", what, error),
    }
}

fn print_resolution(resolution: &Resolution) {
    match resolution {
        Resolution::NoDeclaration => println!("Dependencies file not found, bailing out."),
        Resolution::Resolved(report) => {
            println!("Dependencies from {}", report.declaration.display());
            for name in &report.satisfied {
                println!("   {} already exists", name);
            }
            for change in &report.changes {
                print_change(change);
            }
            print_sync("Dependencies", &report.sync);
        }
    }
}

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use quartermaster::{
    CommandRegistry, Installer, Manifest, QmError, Registry, Result, TokioProcessRunner, build_tree,
};

#[derive(Parser)]
#[command(name = "qm")]
#[command(author, version, about = "Dependency-aware installer orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Manifest path (default: ./quartermaster.toml, then the user config dir)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure packages and their dependency closures are installed
    Ensure {
        /// Package names (default: every manifest root)
        packages: Vec<String>,
    },

    /// Show installed vs target versions for declared packages
    Status {
        /// Emit JSON instead of the human-readable listing
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{} {}", "✗".red(), err);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Ensure { packages } => ensure(cli.manifest, &packages).await,
        Commands::Status { json } => status(cli.manifest, json).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "qm", &mut io::stdout());
            Ok(true)
        }
    }
}

/// Locate the manifest: explicit flag, working directory, user config dir.
fn find_manifest(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let local = PathBuf::from("quartermaster.toml");
    if local.exists() {
        return Ok(local);
    }
    if let Some(config) = dirs::config_dir() {
        let candidate = config.join("quartermaster").join("quartermaster.toml");
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(QmError::ManifestError(
        "no manifest found; pass --manifest or create quartermaster.toml".to_string(),
    ))
}

async fn ensure(manifest_path: Option<PathBuf>, packages: &[String]) -> Result<bool> {
    let manifest = Manifest::load(&find_manifest(manifest_path)?)?;
    let process = Arc::new(TokioProcessRunner);
    let registry = Arc::new(CommandRegistry::new(manifest.registry.clone(), process.clone())?);
    let installer = Installer::new(registry.clone(), process);

    let names: Vec<String> = if packages.is_empty() {
        manifest.roots().into_iter().map(String::from).collect()
    } else {
        packages.to_vec()
    };

    if names.is_empty() {
        println!("Nothing to ensure: the manifest declares no packages");
        return Ok(true);
    }

    println!("Ensuring {} packages...", names.len().to_string().bold());

    // Version pins resolve against the registry here, before any install
    // starts, so a traversal never sees an unresolved "latest".
    let mut trees = Vec::with_capacity(names.len());
    for name in &names {
        trees.push(build_tree(&manifest, name, registry.as_ref()).await?);
    }

    let multi = MultiProgress::new();
    let spinner_style = ProgressStyle::with_template("{spinner} {msg}")
        .expect("static template");

    let ensures = trees.iter().map(|tree| {
        let pb = multi.add(ProgressBar::new_spinner().with_style(spinner_style.clone()));
        pb.set_message(tree.name.clone());
        pb.enable_steady_tick(Duration::from_millis(100));
        let installer = &installer;
        async move {
            let outcome = installer.ensure_all(tree).await;
            pb.finish_and_clear();
            (tree, outcome)
        }
    });
    let results = join_all(ensures).await;

    let mut failed = 0usize;
    let mut changed = 0usize;
    for (tree, outcome) in &results {
        let state = if outcome.changed { "updated" } else { "unchanged" };
        if outcome.success {
            println!(
                "  {} {} {} ({})",
                "✓".green(),
                tree.name.bold(),
                tree.version.dimmed(),
                state
            );
        } else {
            println!(
                "  {} {} {} ({})",
                "✗".red(),
                tree.name.bold(),
                tree.version.dimmed(),
                state
            );
        }
        if outcome.changed {
            changed += 1;
        }
        if !outcome.success {
            failed += 1;
        }
    }

    if failed == 0 {
        println!(
            "\n{} Ensured {} packages ({} changed)",
            "✓".green().bold(),
            results.len().to_string().bold(),
            changed
        );
    } else {
        println!(
            "\n{} {} of {} packages failed (see log for diagnostics)",
            "✗".red().bold(),
            failed.to_string().bold(),
            results.len()
        );
    }

    Ok(failed == 0)
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    name: String,
    target: Option<String>,
    installed: Option<String>,
}

async fn status(manifest_path: Option<PathBuf>, json: bool) -> Result<bool> {
    let manifest = Manifest::load(&find_manifest(manifest_path)?)?;
    let process = Arc::new(TokioProcessRunner);
    let registry = Arc::new(CommandRegistry::new(manifest.registry.clone(), process)?);

    let queries = manifest.packages.iter().map(|(name, spec)| {
        let registry = registry.clone();
        async move {
            let installed = registry.installed_version(name).await.unwrap_or_else(|err| {
                tracing::warn!(package = %name, error = %err, "installed-version query failed");
                None
            });
            StatusEntry {
                name: name.clone(),
                target: spec.version.clone(),
                installed,
            }
        }
    });
    let entries = join_all(queries).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).map_err(|e| QmError::Other(e.into()))?
        );
        return Ok(true);
    }

    for entry in &entries {
        let target = entry.target.as_deref().unwrap_or("latest");
        match &entry.installed {
            Some(installed) if Some(installed.as_str()) == entry.target.as_deref() => {
                println!("  {} {} {}", "✓".green(), entry.name.bold(), installed.dimmed());
            }
            Some(installed) => {
                println!(
                    "  {} {} {} → {}",
                    "↑".yellow(),
                    entry.name.bold(),
                    installed.dimmed(),
                    target
                );
            }
            None => {
                println!(
                    "  {} {} not installed (target {})",
                    "✗".red(),
                    entry.name.bold(),
                    target
                );
            }
        }
    }

    Ok(true)
}

//! drivemerge CLI - find PDFs in Google Drive and merge them into one document.
//!
//! This tool signs in with Google, searches Drive (shared drives included)
//! for each requested name, downloads the first match and concatenates the
//! results into a single PDF saved locally.

mod config;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drivemerge_document::{merge, page_count, Exporter, LocalExporter};
use drivemerge_drive::{
    Authenticator, CredentialStore, DriveClient, LoopbackConsentFlow, ReqwestTransport,
};
use drivemerge_pipeline::{count_by_state, ItemState, ItemStatus, Pipeline};

use config::AppConfig;

#[derive(Parser)]
#[command(name = "drivemerge")]
#[command(about = "drivemerge - Merge PDFs found in Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config dir>/drivemerge/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search Drive for each name, download the matches and merge them.
    Merge {
        /// Document names, merged in the order given.
        names: Vec<String>,

        /// File with one name per line, appended after NAMES.
        #[arg(short, long)]
        list: Option<PathBuf>,

        /// Name of the merged file.
        #[arg(short, long, default_value = "merged.pdf")]
        output: String,

        /// Directory to save into (overrides the config file).
        #[arg(short = 'd', long)]
        out_dir: Option<PathBuf>,

        /// Maximum concurrent searches/downloads (overrides the config file).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the sign-in URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the file a name would resolve to.
    Search {
        /// Name to look for.
        name: String,

        /// Print the sign-in URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Merge local PDF files without contacting Drive.
    Combine {
        /// Files to merge, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the effective configuration.
    Config {
        /// Write a default configuration file if none exists.
        #[arg(long)]
        init: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path().context("Cannot determine the config directory")?,
    };

    match cli.command {
        Commands::Merge {
            names,
            list,
            output,
            out_dir,
            concurrency,
            no_browser,
        } => {
            let mut config = AppConfig::load(&config_path)?;
            if let Some(dir) = out_dir {
                config.output_dir = Some(dir);
            }
            if let Some(limit) = concurrency {
                config.pipeline.concurrency = limit;
            }
            let names = collect_names(names, list.as_deref())?;
            cmd_merge(&config, names, &output, no_browser).await
        }

        Commands::Search { name, no_browser } => {
            let config = AppConfig::load(&config_path)?;
            cmd_search(&config, &name, no_browser).await
        }

        Commands::Combine { files, output } => cmd_combine(&files, &output).await,

        Commands::Config { init } => cmd_config(&config_path, init),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "drivemerge", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Names from the command line followed by those in the list file.
fn collect_names(mut names: Vec<String>, list: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = list {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        names.extend(parse_name_list(&content));
    }

    if names.iter().all(|name| name.trim().is_empty()) {
        anyhow::bail!("No document names given. Pass names or --list FILE");
    }

    Ok(names)
}

/// One name per line; blank lines and `#` comments are skipped.
fn parse_name_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Sign in and build a Drive client sharing the new credential.
async fn connect(config: &AppConfig, no_browser: bool) -> Result<DriveClient> {
    let flow = if no_browser {
        LoopbackConsentFlow::without_browser()
    } else {
        LoopbackConsentFlow::new()
    };
    let store = Arc::new(CredentialStore::new());
    let authenticator = Authenticator::new(config.auth.clone(), Arc::new(flow), store.clone())
        .context("Invalid authentication settings")?;

    authenticator
        .request_token()
        .await
        .context("Sign-in failed")?;

    let transport = Arc::new(ReqwestTransport::new()?);
    Ok(DriveClient::new(transport, store).with_api_base(config.drive_api_base.clone()))
}

/// Search, download, merge and save.
async fn cmd_merge(
    config: &AppConfig,
    names: Vec<String>,
    output: &str,
    no_browser: bool,
) -> Result<()> {
    info!("Merging {} documents", names.len());

    let client = Arc::new(connect(config, no_browser).await?);
    let out_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let exporter = Arc::new(LocalExporter::new(out_dir));
    let pipeline = Pipeline::new(client, exporter, config.pipeline.clone());

    run_pipeline(&pipeline, &names, output).await?;
    Ok(())
}

/// Run the pipeline and print per-item results.
async fn run_pipeline(pipeline: &Pipeline, names: &[String], output: &str) -> Result<PathBuf> {
    let report = pipeline
        .run(names, output)
        .await
        .context("Failed to produce the merged document")?;
    print_items(&report.items);

    println!(
        "\nSaved {} ({} pages)",
        report.output.display(),
        report.pages
    );
    Ok(report.output)
}

/// Show the first match for a name.
async fn cmd_search(config: &AppConfig, name: &str, no_browser: bool) -> Result<()> {
    let client = connect(config, no_browser).await?;

    match client.search(name).await.context("Search failed")? {
        Some(file) => {
            println!("Found: {}", file.name);
            println!("  ID: {}", file.id);
            println!("  Type: {}", file.mime_type);
        }
        None => println!("No PDF matching '{}'", name),
    }

    Ok(())
}

/// Merge local files.
async fn cmd_combine(files: &[PathBuf], output: &Path) -> Result<()> {
    let mut buffers = Vec::with_capacity(files.len());
    for file in files {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        buffers.push(data);
    }

    let merged = merge(&buffers).context("Failed to merge")?;
    let pages = page_count(&merged)?;

    let file_name = output
        .file_name()
        .and_then(|name| name.to_str())
        .context("Output must name a file")?;
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let path = LocalExporter::new(dir)
        .save(&merged, file_name)
        .await
        .context("Failed to save merged document")?;

    println!("Saved {} ({} pages from {} files)", path.display(), pages, files.len());
    Ok(())
}

/// Print the effective configuration, optionally creating the file.
fn cmd_config(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        AppConfig::default().save(path)?;
        println!("Wrote default configuration to {}", path.display());
    }

    let config = AppConfig::load(path)?;
    println!("Configuration ({}):", path.display());
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

fn print_items(items: &[ItemStatus]) {
    println!("{:>3}  {:<12} {:<40} DETAIL", "#", "STATUS", "NAME");
    for item in items {
        let detail = match item.state() {
            ItemState::Downloaded => item
                .data_len()
                .map(|len| format!("{} bytes", len))
                .unwrap_or_default(),
            _ => item.message.clone().unwrap_or_default(),
        };
        println!(
            "{:>3}  {:<12} {:<40} {}",
            item.id,
            item.state().as_str(),
            item.name,
            detail
        );
    }

    let counts = count_by_state(items);
    let downloaded = counts.get(&ItemState::Downloaded).copied().unwrap_or(0);
    println!("{} of {} documents downloaded", downloaded, items.len());
}

//! Case storage command line tool

mod config;
mod constants;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use common::ImportOptions;
use config::{BackendArgs, CliConfig};
use constants::DEFAULT_SWEEP_INTERVAL_SECONDS;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::{CaseStorageEngine, ExpirationSweeper, ObjectReader};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "casectl")]
#[command(about = "Import, inspect and manage stored cases")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LifetimeArgs {
    /// Delete the case automatically after this many hours
    #[arg(long, value_name = "HOURS")]
    expire_after: Option<i64>,
    /// Mark the case for search indexing
    #[arg(long)]
    indexed: bool,
}

impl LifetimeArgs {
    fn options(&self) -> Result<ImportOptions> {
        let expire_after = self
            .expire_after
            .map(|hours| {
                chrono::Duration::try_hours(hours)
                    .with_context(|| format!("--expire-after {} hours is out of range", hours))
            })
            .transpose()?;
        Ok(ImportOptions {
            expire_after,
            indexed: self.indexed,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import a case file and print its record
    Import {
        /// File to import, or '-' for standard input
        file: PathBuf,
        /// Name to store the case under (default: the file name)
        #[arg(short, long)]
        name: Option<String>,
        #[command(flatten)]
        lifetime: LifetimeArgs,
    },
    /// Write a case back with its compression layer removed; archives come back as uploaded
    Get {
        case_id: Uuid,
        /// Output file (default: standard output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the decompressed content of one case member
    Member {
        case_id: Uuid,
        name: String,
        /// Output file (default: standard output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print whether a case, or one of its members, exists
    Exists {
        case_id: Uuid,
        member: Option<String>,
    },
    /// List the members of a case
    Ls {
        case_id: Uuid,
        /// Regular expression member names must fully match
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Print the record of a case
    Info { case_id: Uuid },
    /// Copy a case under a new id and print the new record
    Dup {
        case_id: Uuid,
        #[command(flatten)]
        lifetime: LifetimeArgs,
    },
    /// Delete a case
    Rm { case_id: Uuid },
    /// Keep a case forever by clearing its expiration
    Keep { case_id: Uuid },
    /// Delete expired cases
    Sweep {
        /// Keep sweeping until interrupted
        #[arg(long)]
        watch: bool,
        /// Seconds between sweeps in watch mode
        #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECONDS)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = CliConfig::load(&cli.backend)?.build_engine().await?;

    match cli.command {
        Commands::Import {
            file,
            name,
            lifetime,
        } => import(&engine, &file, name, lifetime.options()?).await?,
        Commands::Get { case_id, output } => {
            let content = engine.retrieve(case_id).await?;
            write_output(content, output.as_deref()).await?;
        }
        Commands::Member {
            case_id,
            name,
            output,
        } => {
            let content = engine.retrieve_member(case_id, &name).await?;
            write_output(content, output.as_deref()).await?;
        }
        Commands::Exists { case_id, member } => {
            let exists = match member {
                Some(name) => engine.member_exists(case_id, &name).await?,
                None => engine.case_exists(case_id).await?,
            };
            println!("{}", exists);
        }
        Commands::Ls { case_id, filter } => {
            for name in engine.list_members(case_id, filter.as_deref()).await? {
                println!("{}", name);
            }
        }
        Commands::Info { case_id } => match engine.find_case(case_id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("Case {} not found", case_id),
        },
        Commands::Dup { case_id, lifetime } => {
            let record = engine.duplicate(case_id, lifetime.options()?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Rm { case_id } => engine.delete(case_id).await?,
        Commands::Keep { case_id } => {
            if !engine.disable_expiration(case_id).await? {
                bail!("Case {} not found", case_id);
            }
        }
        Commands::Sweep { watch, interval } => {
            let sweeper = ExpirationSweeper::new(engine, Duration::from_secs(interval.max(1)));
            if watch {
                let shutdown = CancellationToken::new();
                let on_signal = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for interrupt: {}", e);
                    }
                    on_signal.cancel();
                });
                sweeper.run(shutdown).await;
            } else {
                let report = sweeper.sweep_once(Utc::now()).await?;
                for case_id in &report.deleted {
                    println!("{}", case_id);
                }
                if !report.failed.is_empty() {
                    bail!("Failed to delete {} expired case(s)", report.failed.len());
                }
            }
        }
    }

    Ok(())
}

async fn import(
    engine: &CaseStorageEngine,
    file: &Path,
    name: Option<String>,
    options: ImportOptions,
) -> Result<()> {
    let record = if file == Path::new("-") {
        let name = name.context("--name is required when importing from standard input")?;
        engine.import(&name, tokio::io::stdin(), options).await?
    } else {
        let name = match name {
            Some(name) => name,
            None => file
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .with_context(|| format!("Cannot derive a case name from {:?}", file))?,
        };
        let content = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("Failed to open {:?}", file))?;
        engine.import(&name, content, options).await?
    };

    info!("Imported {} as case {}", record.original_filename, record.id);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn write_output(mut content: ObjectReader, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {:?}", path))?;
            let mut writer = tokio::io::BufWriter::new(file);
            tokio::io::copy(&mut content, &mut writer)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            writer.flush().await?;
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut content, &mut stdout).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

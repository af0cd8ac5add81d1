//! Command-line client for bulk record synchronization.

mod api;
mod config;
mod report;
mod settings;

use anyhow::{bail, Context};
use api::ApiClient;
use clap::{Parser, Subcommand};
use config::Config;
use metasync_engine::derive::{DeriveOptions, DeriveRun};
use metasync_engine::tracker::{TrackerExport, TrackerPipeline};
use metasync_engine::{ChunkedCommitter, CollectionSpec, Record, METADATA_CHUNK_SIZE};
use report::CsvReport;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "metasync", version, about = "Bulk synchronization against a remote metadata store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recompute derived fields for the events of one container stage
    DeriveValues {
        /// Container (program) id
        #[arg(long)]
        program: String,
        /// Stage id within the container
        #[arg(long)]
        stage: String,
        /// Root org unit; all descendants are in scope
        #[arg(long)]
        root_org_unit: String,
        /// Rule-set settings file (JSON)
        #[arg(long)]
        settings: PathBuf,
        /// Where to write the change report
        #[arg(long, default_value = "derive-report.csv")]
        report: PathBuf,
        /// Actually post the changes; without this flag the run is a dry run
        #[arg(long)]
        post: bool,
    },
    /// Push records from a file into a metadata collection
    SyncCollection {
        /// Collection endpoint, e.g. categoryOptions
        #[arg(long)]
        collection: String,
        /// JSON file holding an array of records
        input: PathBuf,
    },
    /// Export container metadata and tracker data to a file
    Export {
        /// Container ids to export
        #[arg(required = true)]
        ids: Vec<String>,
        /// Output file
        #[arg(long, default_value = "tracker-export.json")]
        output: PathBuf,
        /// Replace the output file if it already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Import a previously exported file
    Import {
        /// Export file to import
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("metasync=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let client = ApiClient::new(&config);

    match cli.command {
        Command::DeriveValues {
            program,
            stage,
            root_org_unit,
            settings,
            report,
            post,
        } => {
            let rule_set = settings::load_rule_set(&settings)?;
            let sink = CsvReport::new(report);
            let options = DeriveOptions {
                container: program,
                stage,
                root_org_unit,
                post,
            };

            let summary = DeriveRun::new(&client, &sink).execute(&options, &rule_set)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::SyncCollection { collection, input } => {
            let desired = read_records(&input)?;
            let spec = CollectionSpec::metadata(collection);

            let outcome =
                ChunkedCommitter::new(&client, &spec).commit_all(&desired, METADATA_CHUNK_SIZE);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_clean() {
                bail!("{} records skipped", outcome.records_skipped.len());
            }
        }
        Command::Export {
            ids,
            output,
            overwrite,
        } => {
            if output.exists() && !overwrite {
                bail!(
                    "{} already exists, pass --overwrite to replace it",
                    output.display()
                );
            }

            let export = TrackerPipeline::new(&client).export(&ids)?;
            write_export(&output, &export)?;
            tracing::info!(path = %output.display(), "export written");
        }
        Command::Import { input } => {
            let export = read_export(&input)?;
            TrackerPipeline::new(&client).import(&export)?;
            tracing::info!("import complete");
        }
    }

    Ok(())
}

fn write_export(path: &Path, export: &TrackerExport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn read_export(path: &Path) -> anyhow::Result<TrackerExport> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("decoding {}", path.display()))
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("decoding {}", path.display()))
}

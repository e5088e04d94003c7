use anyhow::{Context, Result, bail};
use civic_core::config::CivicConfig;
use civic_core::db::{self, SqliteSink};
use civic_core::fetch::FileFetcher;
use civic_core::jurisdiction::{self, Jurisdiction};
use civic_core::schema::{Membership, Person};
use civic_core::PassReport;
use clap::{Parser, Subcommand};
use schemars::schema_for;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "larue")]
#[command(about = "LaRue Civic Intelligence CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export canonical JSON Schemas to the ./schemas directory
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Run scrapers and persist what they yield
    Scrape {
        #[arg(long)]
        config: PathBuf,
        /// Only this jurisdiction (default: all, one thread each)
        #[arg(long)]
        jurisdiction: Option<String>,
        /// Only this scraper kind; requires --jurisdiction
        #[arg(long, requires = "jurisdiction")]
        kind: Option<String>,
    },
    /// Show who holds a seat
    Seat {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        jurisdiction: String,
        /// Seat display text, e.g. "District 1"
        #[arg(long)]
        post: String,
    },
    /// Obsidian vault rendering
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for canonical types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Write people, organization and index notes from the store
    Build {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => {
                init_logging(None);
                schema_export(&out_dir)
            }
        },
        Commands::Scrape {
            config,
            jurisdiction,
            kind,
        } => {
            let config = load_config(&config)?;
            scrape(&config, jurisdiction.as_deref(), kind.as_deref())
        }
        Commands::Seat {
            config,
            jurisdiction,
            post,
        } => {
            let config = load_config(&config)?;
            seat(&config, &jurisdiction, &post)
        }
        Commands::Vault { command } => match command {
            VaultCommands::Build { config, out } => {
                let config = load_config(&config)?;
                let conn = open_store(&config)?;
                let summary = obsidian::build_vault(&conn, &out)?;
                println!(
                    "Wrote {} people, {} organizations, {} seats to {}",
                    summary.people,
                    summary.organizations,
                    summary.seats,
                    out.display()
                );
                Ok(())
            }
        },
    }
}

/// `RUST_LOG` wins over the config file's filter.
fn init_logging(config_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: &Path) -> Result<CivicConfig> {
    let config = CivicConfig::load(path)?;
    init_logging(Some(&config.logging.filter));
    Ok(config)
}

fn open_store(config: &CivicConfig) -> Result<rusqlite::Connection> {
    let path = config.database_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let path = path
        .to_str()
        .with_context(|| format!("database path is not UTF-8: {}", path.display()))?;
    db::open(path)
}

fn schema_export(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    write_schema(out_dir, "Person", schema_for!(civic_core::schema::Person))?;
    write_schema(out_dir, "Organization", schema_for!(civic_core::schema::Organization))?;
    write_schema(out_dir, "Post", schema_for!(civic_core::schema::Post))?;
    write_schema(out_dir, "Membership", schema_for!(civic_core::schema::Membership))?;
    write_schema(out_dir, "SourceRef", schema_for!(civic_core::schema::SourceRef))?;
    write_schema(out_dir, "Entity", schema_for!(civic_core::schema::Entity))?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn write_schema(out_dir: &Path, name: &str, schema: schemars::schema::RootSchema) -> Result<()> {
    let json = serde_json::to_string_pretty(&schema)?;
    fs::write(out_dir.join(format!("{name}.schema.json")), json)?;
    Ok(())
}

fn scrape(config: &CivicConfig, only: Option<&str>, kind: Option<&str>) -> Result<()> {
    let jurisdictions = config.build_jurisdictions()?;
    let fetcher = FileFetcher::new(&config.base_dir);
    let mut sink = SqliteSink::new(open_store(config)?);

    let reports: Vec<PassReport> = match only {
        Some(id) => {
            let jurisdiction = find(&jurisdictions, id)?;
            match kind {
                Some(kind) => vec![jurisdiction.run(kind, &fetcher, &mut sink, &config.dispatch)?],
                None => jurisdiction.run_all(&fetcher, &mut sink, &config.dispatch)?,
            }
        }
        None => {
            let shared = Mutex::new(sink);
            let mut reports = Vec::new();
            for result in
                jurisdiction::run_concurrently(&jurisdictions, &fetcher, &shared, &config.dispatch)
            {
                reports.extend(result?);
            }
            reports
        }
    };

    let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
    if failures > 0 {
        tracing::warn!(failures, "pass finished with failures");
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn find<'j>(jurisdictions: &'j [Jurisdiction], id: &str) -> Result<&'j Jurisdiction> {
    match jurisdictions.iter().find(|j| j.id() == id) {
        Some(j) => Ok(j),
        None => bail!("jurisdiction {id} is not configured"),
    }
}

#[derive(Serialize)]
struct SeatReport<'a> {
    jurisdiction_id: &'a str,
    post_id: &'a str,
    people: Vec<Person>,
    memberships: Vec<Membership>,
}

fn seat(config: &CivicConfig, jurisdiction_id: &str, post_id: &str) -> Result<()> {
    let conn = open_store(config)?;
    let report = SeatReport {
        jurisdiction_id,
        post_id,
        people: db::people_at_seat(&conn, jurisdiction_id, post_id)?,
        memberships: db::memberships_at_seat(&conn, jurisdiction_id, post_id)?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Sample store — edit the record store from the command line.
///
/// Usage:
///   sample_store [--config <path> | --schema-dir <dir> --data-dir <dir>] <command>
///
/// Commands:
///   tables                                   — list declared tables and columns
///   upsert --table <t> --set col=value ...   — insert or replace one row, then save
///   save                                     — rewrite every table's data file
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use student_essays::core::config::{EssayConfig, StoreConfig};
use student_essays::store::{RecordStore, RowFields};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sample_store", version, about = "Edit the essay record store")]
struct Args {
    /// RON config whose `store` section names the directories
    #[arg(long, conflicts_with_all = ["schema_dir", "data_dir"])]
    config: Option<PathBuf>,

    #[arg(long)]
    schema_dir: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List declared tables
    Tables,
    /// Insert or replace one row, then save
    Upsert {
        #[arg(long)]
        table: String,
        /// col=value; `col=NULL` stores NULL
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        fields: Vec<(String, Option<String>)>,
    },
    /// Rewrite every table's data file
    Save,
}

fn parse_assignment(raw: &str) -> Result<(String, Option<String>), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected col=value, got '{raw}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err("column name is empty".to_string());
    }
    let value = if value == "NULL" {
        None
    } else {
        Some(value.to_string())
    };
    Ok((column.to_string(), value))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn store_config(args: &Args) -> Result<StoreConfig, Box<dyn std::error::Error>> {
    if let Some(path) = &args.config {
        return Ok(EssayConfig::load_from_ron(path)?
            .store
            .unwrap_or_default());
    }
    let mut config = StoreConfig::default();
    if let Some(dir) = &args.schema_dir {
        config.schema_dir = dir.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = store_config(&args)?;
    let mut store = RecordStore::open(&config)?;

    match args.command {
        Command::Tables => {
            for table in store.tables() {
                println!(
                    "{} (key: {}): {}",
                    table.name,
                    table.primary_key_column(),
                    table.columns.join(", ")
                );
            }
        }
        Command::Upsert { table, fields } => {
            let fields: RowFields = fields.into_iter().collect();
            store.upsert(&table, &fields)?;
            let path = store.save_table(&table)?;
            println!("Saved {}", path.display());
        }
        Command::Save => {
            store.save_all()?;
            println!("Saved {} tables", store.tables().len());
        }
    }

    store.close()?;
    Ok(())
}

/// Essay generator — produce a batch of synthetic student essays.
///
/// Usage: essay_gen --topic <t> --grade <g> --subject <s> --assignment-type <a>
///                  --prompt <p> [--count <n>] [--config <path>] [--sink <kind>]
///                  [--section LABEL=CONTENT]... [--seed <n>] [--env-file <path>]
///
/// Reads the API key from OPENAI_API_KEY, after loading `.env` from the
/// working directory if present, or from `--env-file` alone when given.
/// Exits with status 1 when every requested essay failed.
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use student_essays::core::completion::ResponsesClient;
use student_essays::core::config::{Credentials, EssayConfig};
use student_essays::core::pipeline::EssayGenerator;
use student_essays::core::sink::{CsvSink, ScriptSink, StoreSink};
use student_essays::schema::essay::EssayRequest;
use student_essays::store::RecordStore;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Script,
    Csv,
    Store,
}

#[derive(Parser, Debug)]
#[command(name = "essay_gen", version, about = "Generate synthetic student essays")]
struct Args {
    /// RON config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of essays to generate
    #[arg(long, default_value_t = 10)]
    count: usize,

    #[arg(long)]
    topic: String,

    /// e.g. "8th grade"
    #[arg(long)]
    grade: String,

    #[arg(long)]
    subject: String,

    /// e.g. "essay", "lab report"
    #[arg(long, default_value = "essay")]
    assignment_type: String,

    /// Assignment instructions given to every student
    #[arg(long, default_value = "")]
    prompt: String,

    /// Extra task material as LABEL=CONTENT; may be repeated
    #[arg(long = "section", value_parser = parse_section)]
    sections: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = SinkKind::Script)]
    sink: SinkKind,

    /// Overrides the config seed
    #[arg(long)]
    seed: Option<u64>,

    /// Read OPENAI_API_KEY from this file instead of the environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn parse_section(raw: &str) -> Result<(String, String), String> {
    let (label, content) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=CONTENT, got '{raw}'"))?;
    if label.trim().is_empty() {
        return Err("section label is empty".to_string());
    }
    Ok((label.trim().to_string(), content.to_string()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("Every essay in the batch failed; nothing usable was generated.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the batch produced no essays at all.
fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EssayConfig::load_from_ron(path)?,
        None => EssayConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let credentials = match &args.env_file {
        Some(path) => Credentials::from_env_file(path)?,
        None => {
            if let Err(e) = dotenvy::dotenv() {
                tracing::debug!(error = %e, "no .env loaded");
            }
            Credentials::from_env()
        }
    };
    let client = ResponsesClient::new(&config, credentials)?;
    let mut generator = EssayGenerator::builder(client).config(&config).build()?;

    let mut request = EssayRequest::new(
        args.topic,
        args.grade,
        args.subject,
        args.assignment_type,
        args.prompt,
    );
    for (label, content) in args.sections {
        request = request.with_section(label, content);
    }

    let report = match args.sink {
        SinkKind::Script => {
            let mut sink = ScriptSink::new(&config.output_dir);
            generator.generate_into(&request, args.count, &mut sink)?
        }
        SinkKind::Csv => {
            let mut sink = CsvSink::new(&config.output_dir);
            generator.generate_into(&request, args.count, &mut sink)?
        }
        SinkKind::Store => {
            let store_config = config.store.clone().unwrap_or_default();
            let mut store = RecordStore::open(&store_config)?;
            let mut sink = StoreSink::new(&mut store, store_config.table.as_str());
            let report = generator.generate_into(&request, args.count, &mut sink)?;
            store.close()?;
            report
        }
    };

    println!(
        "Generated {} of {} essays on '{}' ({} failed)",
        report.succeeded,
        args.count,
        request.topic,
        report.failed
    );
    Ok(!report.all_failed())
}

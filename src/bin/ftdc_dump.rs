use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;

use ftdc::{Reader, ReaderConfig, SchemaChangePolicy, TimeRange};

/// Dump decoded samples from a MongoDB FTDC diagnostic file as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "ftdc-dump", version, about)]
struct Args {
    /// Path to the FTDC file, or `-` to read from stdin.
    path: String,

    /// Only emit samples at or after this RFC 3339 timestamp.
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Only emit samples strictly before this RFC 3339 timestamp.
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Only emit the named metric (dotted path). May be repeated; if
    /// omitted, all metrics are emitted.
    #[arg(long = "metric")]
    metrics: Vec<String>,

    /// Treat a reference-schema change between chunks as a hard error
    /// instead of the default silent rollover.
    #[arg(long)]
    strict_schema: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ftdc-dump: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ReaderConfig::new();

    if args.start.is_some() || args.end.is_some() {
        config = config.with_time_range(TimeRange::new(args.start, args.end));
    }
    if !args.metrics.is_empty() {
        let wanted = args.metrics.clone();
        config = config.with_metric_filter(move |path: &str| wanted.iter().any(|m| m == path));
    }
    if args.strict_schema {
        config = config.with_schema_change_policy(SchemaChangePolicy::Error);
    }

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    if args.path == "-" {
        let reader = Reader::with_config(BufReader::new(io::stdin()), config);
        dump(reader, &mut out)
    } else {
        let file = File::open(&args.path)
            .with_context(|| format!("opening {}", args.path))?;
        let reader = Reader::with_config(BufReader::new(file), config);
        dump(reader, &mut out)
    }
}

fn dump<R: io::Read>(reader: Reader<R>, out: &mut impl Write) -> anyhow::Result<()> {
    let mut count = 0usize;
    for sample in reader {
        let sample = sample?;
        serde_json::to_writer(&mut *out, &sample).context("serializing sample")?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    log::info!("wrote {count} sample(s)");
    Ok(())
}

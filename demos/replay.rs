//! Replays recorded trace records through a counter pipeline.
//!
//! Records are read as JSON lines (one `TraceRecord` per line) from a file or
//! stdin, pushed through an in-memory record source and written by the chosen
//! sink.
//!
//! Run with:
//! ```bash
//! cargo run --example replay --features demo -- records.jsonl \
//!     --counter System.Runtime:cpu-usage,working-set --format table
//! ```
//!
//! Logging goes to stderr and is controlled by `FLUSSI_LOG` (default `warn`).

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use flussi::filter::ProviderSubscription;
use flussi::record::TraceRecord;
use flussi::sample::SessionId;
use flussi::session::{ConfigurationFactory, MetricSourceConfiguration, SessionLimits};
use flussi::settings::CounterPipelineSettings;
use flussi::sinks::json::JsonSink;
use flussi::sinks::prometheus::PrometheusSink;
use flussi::sinks::table::{TableSink, TableStyle};
use flussi::sinks::CounterSink;
use flussi::source::memory::MemoryRecordSource;
use flussi::CounterPipeline;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Output format for the replayed samples.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// JSON lines, written while replaying
    Json,
    /// Latest values as a table, printed at the end
    Table,
    /// Latest values as a compact multi-column table
    Compact,
    /// Prometheus exposition format, printed at the end
    Prometheus,
}

/// Table style selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum StyleChoice {
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Markdown,
    Blank,
}

impl From<StyleChoice> for TableStyle {
    fn from(choice: StyleChoice) -> Self {
        match choice {
            StyleChoice::Ascii => TableStyle::Ascii,
            StyleChoice::Rounded => TableStyle::Rounded,
            StyleChoice::Sharp => TableStyle::Sharp,
            StyleChoice::Modern => TableStyle::Modern,
            StyleChoice::Markdown => TableStyle::Markdown,
            StyleChoice::Blank => TableStyle::Blank,
        }
    }
}

/// Replays recorded counter events through a flussi pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON lines file with trace records (stdin if omitted)
    records: Option<PathBuf>,

    /// Counters to keep, as `Provider` or `Provider:counter,counter` (repeatable)
    #[arg(short = 'n', long = "counter")]
    counters: Vec<String>,

    /// Sampling interval in seconds
    #[arg(short, long, default_value = "1")]
    interval: f64,

    /// Session id of the recording (for System.Diagnostics.Metrics records)
    #[arg(long)]
    session: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Table style (for table/compact formats)
    #[arg(short, long, value_enum, default_value = "rounded")]
    style: StyleChoice,

    /// Number of columns (for compact format)
    #[arg(short, long, default_value = "3")]
    columns: usize,

    /// Prometheus metric namespace (prefix)
    #[arg(long, default_value = "dotnet")]
    namespace: String,

    /// Pause between records, in milliseconds
    #[arg(long, default_value = "0")]
    delay: u64,
}

/// Reuses the session id of the recording so its metrics records match.
struct PinnedSession(SessionId);

impl ConfigurationFactory for PinnedSession {
    fn create(
        &self,
        interval_seconds: f64,
        subscriptions: &[ProviderSubscription],
        limits: SessionLimits,
    ) -> MetricSourceConfiguration {
        MetricSourceConfiguration::with_session_id(
            self.0.clone(),
            interval_seconds,
            subscriptions,
            limits,
        )
    }
}

/// Parses `Provider` or `Provider:a,b,c`.
fn parse_counter(spec: &str) -> (&str, Vec<&str>) {
    match spec.split_once(':') {
        Some((provider, names)) => (
            provider.trim(),
            names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect(),
        ),
        None => (spec.trim(), Vec::new()),
    }
}

fn read_records(path: Option<&PathBuf>) -> Result<Vec<TraceRecord>, Box<dyn Error>> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TraceRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(line = index + 1, error = %err, "skipping unreadable record"),
        }
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FLUSSI_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let records = read_records(args.records.as_ref())?;
    info!(count = records.len(), "loaded records");

    let mut settings = CounterPipelineSettings::new().with_interval(args.interval);
    for spec in &args.counters {
        let (provider, names) = parse_counter(spec);
        settings = settings.with_counters(provider, names);
    }

    let mut table = None;
    let mut prometheus = None;
    let sink: Arc<dyn CounterSink> = match args.format {
        OutputFormat::Json => Arc::new(JsonSink::new(io::stdout()).flush_each_line(true)),
        OutputFormat::Table | OutputFormat::Compact => {
            let sink = Arc::new(
                TableSink::new()
                    .with_style(args.style.into())
                    .compact(matches!(args.format, OutputFormat::Compact))
                    .columns(args.columns),
            );
            table = Some(Arc::clone(&sink));
            sink as Arc<dyn CounterSink>
        }
        OutputFormat::Prometheus => {
            let sink = Arc::new(PrometheusSink::new().with_namespace(&args.namespace));
            prometheus = Some(Arc::clone(&sink));
            sink as Arc<dyn CounterSink>
        }
    };

    let mut pipeline = CounterPipeline::new(settings, vec![sink])?;
    if let Some(session) = args.session {
        pipeline = pipeline.with_configuration_factory(PinnedSession(SessionId::new(session)));
    }

    let token = CancellationToken::new();
    let source = MemoryRecordSource::new();

    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let transport = source.clone();
    let pipeline_token = token.clone();
    let running = tokio::spawn(async move { pipeline.start(&transport, pipeline_token).await });

    tokio::select! {
        _ = source.wait_for_record_handler() => {}
        _ = token.cancelled() => {}
    }
    for record in &records {
        if token.is_cancelled() {
            break;
        }
        source.push(record);
        if args.delay > 0 {
            tokio::time::sleep(Duration::from_millis(args.delay)).await;
        }
    }
    source.complete();

    running.await??;

    if let Some(table) = table {
        println!("{}", table.render());
    }
    if let Some(prometheus) = prometheus {
        print!("{}", prometheus.render()?);
    }

    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use cpwatch::duration::parse_duration;
use cpwatch::report::export_to_file;
use cpwatch::{save_raw, FileSource, LogOptions, RunLock, Settings};
use cpwatch_adapters::breadcrumbs::expand_breadcrumbs;
use cpwatch_adapters::catchpoint::{
    CatchpointAdapter, TestDataRequest, TestSelection, TimeWindow, DEFAULT_ENDPOINT,
};
use cpwatch_adapters::extract::ExtractOptions;
use cpwatch_types::{
    DataKind, Interval, QueryError, QueryTable, RenderError, Stat, SummaryTable, TestDataset,
    TestType, Value,
};

#[derive(Parser, Debug)]
#[command(name = "cpwatch")]
#[command(about = "Fetch, query and summarize Catchpoint synthetic test data")]
struct Args {
    /// Env file with CP_* settings (defaults to .env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Refuse to run while another run holds this lock file
    #[arg(long, global = true)]
    lock: Option<PathBuf>,

    /// How long to wait for the lock (e.g. "30s", "2m")
    #[arg(long, global = true, default_value = "30s")]
    lock_wait: String,

    /// Debug logging with source locations
    #[arg(short, long, global = true)]
    debug: bool,

    /// No log output on the console
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Append log records to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download test data and print, query or summarize it
    Fetch(FetchArgs),

    /// Extract a response saved with --save-raw
    Replay {
        /// Saved response file
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show a folder and the nodes it runs on
    Folder {
        folder_id: String,
    },

    /// List the tests in a folder
    Tests {
        folder_id: String,

        /// web, transaction, api or all
        #[arg(long, default_value = "all")]
        test_type: TestType,
    },

    /// Print the explorer enumerations (metric, dimension and interval ids)
    Enumerations {
        /// Only this section, e.g. "metrics"
        section: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct SelectionArgs {
    /// A single test id
    #[arg(long)]
    test_id: Option<String>,

    /// Comma-separated test ids
    #[arg(long, value_delimiter = ',')]
    test_ids: Option<Vec<String>>,

    /// Every test in this folder
    #[arg(long)]
    folder: Option<String>,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Test type filter for --folder: web, transaction, api or all
    #[arg(long, default_value = "all")]
    test_type: TestType,

    /// aggregated or raw
    #[arg(long, default_value = "aggregated")]
    kind: DataKind,

    /// 5m, 10m, 15m, 30m, 1h, 2h, 3h, 4h, 5h, 6h or 1d
    #[arg(long, default_value = "15m")]
    interval: Interval,

    /// Window start, %Y-%m-%dT%H:%M:%S (UTC)
    #[arg(long, requires = "end", conflicts_with = "hours")]
    start: Option<String>,

    /// Window end, %Y-%m-%dT%H:%M:%S (UTC)
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Trailing window length in hours
    #[arg(long)]
    hours: Option<f64>,

    /// Save the raw response for later replay
    #[arg(long)]
    save_raw: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// SQL to run against the `data` table
    #[arg(long)]
    sql: Option<String>,

    /// Summary statistic: p95, p75, p50, mean or median
    #[arg(long)]
    stat: Option<Stat>,

    /// Dimension to group the summary by
    #[arg(long)]
    group_by: Option<String>,

    /// Write the result as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the result as an HTML table
    #[arg(long)]
    html: Option<PathBuf>,

    /// Write a JSON report of the dataset (and summary)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Split breadcrumb headers into typed columns
    #[arg(long)]
    expand_headers: bool,

    /// Drop rows with values at or above the threshold
    #[arg(long)]
    exclude_outliers: bool,

    /// Drop rows with failures
    #[arg(long)]
    exclude_errors: bool,

    /// Outlier threshold in ms
    #[arg(long)]
    threshold: Option<f64>,
}

impl OutputArgs {
    fn extract_options(&self, settings: &Settings) -> ExtractOptions {
        let mut options = settings.extract_options();
        if self.exclude_outliers {
            options.include_outliers = false;
        }
        if self.exclude_errors {
            options.include_errors = false;
        }
        if let Some(threshold) = self.threshold {
            options.outlier_threshold = threshold;
        }
        options
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.env_file.as_deref())?;
    cpwatch::logging::init(&LogOptions {
        debug: args.debug || settings.cp_debug,
        quiet: args.quiet || settings.cp_quiet,
        log_file: args.log_file.clone().or_else(|| settings.cp_log_file.clone()),
    })?;

    let _lock = match &args.lock {
        Some(path) => Some(RunLock::acquire(path, parse_duration(&args.lock_wait)?)?),
        None => None,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(&settings, args.command))
}

fn build_adapter(settings: &Settings) -> Result<CatchpointAdapter> {
    let mut builder = CatchpointAdapter::builder()
        .api_key(settings.api_key()?)
        .endpoint(settings.cp_endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT));
    if let Some(timeout) = settings.timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

async fn run(settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Replay { file, output } => {
            let source = FileSource::new(&file);
            info!(source = source.description(), "replaying");
            let dataset = source.load(&output.extract_options(settings))?;
            present(dataset, &output)
        }
        Command::Fetch(args) => fetch(&build_adapter(settings)?, settings, args).await,
        Command::Folder { folder_id } => {
            let folder = build_adapter(settings)?.folder_details(&folder_id).await?;
            println!("{} ({})", folder.name, folder.id);
            let table = QueryTable {
                columns: vec!["id".into(), "name".into(), "network_type".into()],
                rows: folder
                    .nodes
                    .into_iter()
                    .map(|n| vec![Value::Int(n.id), n.name.into(), n.network_type.into()])
                    .collect(),
            };
            print!("{}", table);
            Ok(())
        }
        Command::Tests { folder_id, test_type } => {
            let tests = build_adapter(settings)?
                .tests_in_folder(&folder_id, test_type)
                .await?;
            let table = QueryTable {
                columns: ["id", "name", "test_type", "monitor", "request_data"]
                    .map(String::from)
                    .to_vec(),
                rows: tests
                    .into_iter()
                    .map(|t| {
                        vec![
                            t.id.into(),
                            t.name.into(),
                            t.test_type.into(),
                            t.monitor.into(),
                            t.request_data.into(),
                        ]
                    })
                    .collect(),
            };
            print!("{}", table);
            Ok(())
        }
        Command::Enumerations { section } => {
            let sections = build_adapter(settings)?.enumerations().await?;
            let json = match section {
                Some(name) => sections
                    .get(&name)
                    .with_context(|| format!("no enumeration section {}", name))?
                    .clone(),
                None => serde_json::to_value(&sections)?,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
    }
}

async fn fetch(adapter: &CatchpointAdapter, settings: &Settings, args: FetchArgs) -> Result<()> {
    let selection = match (args.selection.test_id, args.selection.test_ids, args.selection.folder) {
        (Some(id), _, _) => TestSelection::TestId(id),
        (_, Some(ids), _) => TestSelection::TestIds(ids),
        (_, _, Some(id)) => TestSelection::Folder {
            id,
            test_type: args.test_type,
        },
        (None, None, None) => anyhow::bail!("one of --test-id, --test-ids or --folder is required"),
    };
    let window = match (args.start, args.end, args.hours) {
        (Some(start), Some(end), _) => TimeWindow::Absolute { start, end },
        (_, _, Some(hours)) => TimeWindow::Trailing { hours },
        _ => TimeWindow::default(),
    };

    let mut request = TestDataRequest::new(selection)
        .window(window)
        .interval(args.interval)
        .kind(args.kind)
        .extract_options(args.output.extract_options(settings));
    if let Some(ids) = settings.metric_ids() {
        request.metric_ids = ids;
    }
    if let Some(ids) = settings.dimension_ids() {
        request.dimension_ids = ids;
    }
    if let Some(ids) = settings.sub_source_ids() {
        request.sub_source_ids = ids;
    }
    if let Some(ids) = settings.tracepoint_ids() {
        request.tracepoint_ids = ids;
    }

    let started = Instant::now();
    let dataset = adapter.fetch_test_data(&request).await?;
    info!(
        rows = dataset.len(),
        excluded = dataset.excluded_rows().len(),
        elapsed = ?started.elapsed(),
        "fetched test data"
    );

    if let Some(path) = &args.save_raw {
        save_raw(path, dataset.raw_response())?;
        info!(path = %path.display(), "saved raw response");
    }

    present(dataset, &args.output)
}

/// What a run prints and writes.
enum Output<'a> {
    Dataset(&'a TestDataset),
    Query(QueryTable),
    Summary(SummaryTable),
    Empty(QueryError),
}

impl Output<'_> {
    fn to_csv(&self) -> Result<String, RenderError> {
        match self {
            Output::Dataset(d) => d.to_csv(),
            Output::Query(q) => q.to_csv(),
            Output::Summary(s) => s.to_csv(),
            Output::Empty(_) => Ok(String::new()),
        }
    }

    fn to_html(&self) -> String {
        match self {
            Output::Dataset(d) => d.to_html(),
            Output::Query(q) => q.to_html(),
            Output::Summary(s) => s.to_html(),
            Output::Empty(_) => String::new(),
        }
    }
}

fn present(dataset: TestDataset, output: &OutputArgs) -> Result<()> {
    let stats = dataset.stats();
    debug!(?stats, "extraction stats");

    let dataset = if output.expand_headers {
        expand_breadcrumbs(&dataset)?
    } else {
        dataset
    };

    let summary = match (&output.group_by, output.stat) {
        (Some(group_by), stat) => {
            Some(dataset.summary(output.sql.as_deref(), stat.unwrap_or_default(), group_by))
        }
        (None, Some(stat)) => anyhow::bail!("--stat {} needs --group-by", stat),
        (None, None) => None,
    };

    let result = match summary {
        Some(Ok(summary)) => Output::Summary(summary),
        Some(Err(cpwatch::SummaryError::Query(QueryError::NoRows))) => {
            Output::Empty(QueryError::NoRows)
        }
        Some(Err(e)) => return Err(e.into()),
        None => match &output.sql {
            Some(sql) => match dataset.query(sql) {
                Ok(table) => Output::Query(table),
                Err(QueryError::NoRows) => Output::Empty(QueryError::NoRows),
                Err(e) => return Err(e.into()),
            },
            None => Output::Dataset(&dataset),
        },
    };

    match &result {
        Output::Dataset(d) => print!("{}", d),
        Output::Query(q) => print!("{}", q),
        Output::Summary(s) => print!("{}", s),
        Output::Empty(e) => println!("{}", e),
    }

    if let Some(path) = &output.csv {
        write_output(path, &result.to_csv()?)?;
    }
    if let Some(path) = &output.html {
        write_output(path, &result.to_html())?;
    }
    if let Some(path) = &output.export {
        let summary = match &result {
            Output::Summary(s) => Some(s),
            _ => None,
        };
        export_to_file(&dataset, summary, path)?;
        info!(path = %path.display(), "exported report");
    }
    Ok(())
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote output");
    Ok(())
}

//! CLI for aquameter stores.
//!
//! Provides commands for managing the aggregation tasks of a store and for
//! inspecting the sensors and statistics it holds.

use std::sync::Arc;
use std::time::Duration;

use aquameter::config::{
    DEFAULT_BUCKET, DEFAULT_ORG, DEFAULT_RAW_SERIES, DEFAULT_STORE_URL, DEFAULT_TOKEN,
    StoreLocation,
};
use aquameter::service::{FieldStats, QueryService, StatisticsRecord};
use aquameter::task::{DeleteOutcome, TaskRegistry, TaskStatus};
use aquameter::{Store, StoreConfig, TaskManager};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// aquameter — Sensor measurement store and aggregation task CLI.
#[derive(Parser)]
#[command(name = "aquameter", version, about)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Store connection options, shared with the server.
#[derive(Args)]
struct StoreArgs {
    /// Store location: memory:// or file://<path>.
    #[arg(long, global = true, env = "AQUAMETER_STORE_URL", default_value = DEFAULT_STORE_URL)]
    store_url: String,

    /// Store access token.
    #[arg(long, global = true, env = "AQUAMETER_STORE_TOKEN", default_value = DEFAULT_TOKEN, hide_env_values = true)]
    store_token: String,

    /// Store organization.
    #[arg(long, global = true, env = "AQUAMETER_STORE_ORG", default_value = DEFAULT_ORG)]
    store_org: String,

    /// Store bucket.
    #[arg(long, global = true, env = "AQUAMETER_STORE_BUCKET", default_value = DEFAULT_BUCKET)]
    store_bucket: String,

    /// Name of the raw measurement series.
    #[arg(long, global = true, env = "AQUAMETER_RAW_SERIES", default_value = DEFAULT_RAW_SERIES)]
    raw_series: String,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Register every aggregation task that is not registered yet.
    Setup,

    /// List registered aggregation tasks.
    List,

    /// Delete one aggregation task by name.
    Delete {
        /// Task name, e.g. aggregate_1m_mean.
        name: String,
    },

    /// Delete every registered aggregation task.
    DeleteAll,

    /// Resume a paused aggregation task.
    Enable {
        /// Task name.
        name: String,
    },

    /// Pause an aggregation task without deleting it.
    Disable {
        /// Task name.
        name: String,
    },

    /// List sensors that reported in the last 30 days.
    Sensors,

    /// Show per-window statistics of one sensor.
    Stats {
        /// Sensor to inspect.
        sensor_id: String,

        /// Range start: relative (e.g. "-1h", "-7d") or RFC 3339.
        #[arg(long, default_value = "-1h", allow_hyphen_values = true)]
        start: String,

        /// Resolution override (1m or 5m).
        #[arg(long)]
        window: Option<String>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Output format for statistics.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup => cmd_setup(&cli.store),
        Commands::List => cmd_list(&cli.store),
        Commands::Delete { name } => cmd_delete(&cli.store, &name),
        Commands::DeleteAll => cmd_delete_all(&cli.store),
        Commands::Enable { name } => cmd_set_status(&cli.store, &name, TaskStatus::Active),
        Commands::Disable { name } => cmd_set_status(&cli.store, &name, TaskStatus::Inactive),
        Commands::Sensors => cmd_sensors(&cli.store),
        Commands::Stats {
            sensor_id,
            start,
            window,
            format,
        } => cmd_stats(&cli.store, &sensor_id, &start, window.as_deref(), &format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig {
            url: self.store_url.clone(),
            token: self.store_token.clone(),
            org: self.store_org.clone(),
            bucket: self.store_bucket.clone(),
            raw_series: self.raw_series.clone(),
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Opens the store read-only; a running server keeps ownership of it.
    fn open(&self) -> Result<Store, Box<dyn std::error::Error>> {
        Ok(Store::open_read_only(&self.config())?)
    }

    /// Task manager over the store's registry, without opening the store.
    fn tasks(&self) -> Result<TaskManager, Box<dyn std::error::Error>> {
        let location = self.config().location()?;
        if location == StoreLocation::Memory {
            tracing::warn!("memory:// store: nothing written by this command outlives it");
        }
        Ok(TaskManager::new(TaskRegistry::for_location(&location)))
    }
}

/// Implements `aquameter setup`.
fn cmd_setup(args: &StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = args.tasks()?.setup_all();

    for name in &report.created {
        println!("created  {name}");
    }
    for name in &report.existing {
        println!("exists   {name}");
    }
    for (name, e) in &report.failed {
        println!("failed   {name}: {e}");
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} task(s) could not be created", report.failed.len()).into())
    }
}

/// Implements `aquameter list`.
fn cmd_list(args: &StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tasks = args.tasks()?.list()?;
    if tasks.is_empty() {
        println!("No aggregation tasks registered");
        return Ok(());
    }

    println!("{:<22} {:<8} {:<8} {:<8} last run", "name", "status", "every", "offset");
    for task in &tasks {
        let last_run = task
            .last_run
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        println!(
            "{:<22} {:<8} {:<8} {:<8} {last_run}",
            task.name,
            task.status.to_string(),
            format_secs(task.every.num_seconds()),
            format_secs(task.offset.num_seconds()),
        );
    }

    Ok(())
}

/// Implements `aquameter delete <name>`.
fn cmd_delete(args: &StoreArgs, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    match args.tasks()?.delete(name)? {
        DeleteOutcome::Removed => println!("Deleted {name}"),
        DeleteOutcome::NotFound => println!("No task named {name}"),
    }
    Ok(())
}

/// Implements `aquameter delete-all`.
fn cmd_delete_all(args: &StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let removed = args.tasks()?.delete_all();
    println!("Deleted {removed} task(s)");
    Ok(())
}

/// Implements `aquameter enable|disable <name>`.
fn cmd_set_status(
    args: &StoreArgs,
    name: &str,
    status: TaskStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    args.tasks()?.set_status(name, status)?;
    println!("{name} is now {status}");
    Ok(())
}

/// Implements `aquameter sensors`.
fn cmd_sensors(args: &StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = args.open()?;
    let service = QueryService::new(Arc::new(store), args.raw_series.as_str());

    for sensor in service.list_sensors(Utc::now())? {
        println!("{sensor}");
    }
    Ok(())
}

/// Implements `aquameter stats <sensor_id>`.
fn cmd_stats(
    args: &StoreArgs,
    sensor_id: &str,
    start: &str,
    window: Option<&str>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = args.open()?;
    let service = QueryService::new(Arc::new(store), args.raw_series.as_str());
    let result = service.get_statistics(sensor_id, Some(start), None, window, Utc::now())?;

    match format {
        OutputFormat::Csv => {
            println!(
                "# sensor={sensor_id}, window={}, windows={}",
                result.window,
                result.records.len()
            );
            println!(
                "timestamp,temperature_mean,temperature_min,temperature_max,temperature_count,\
                 conductivity_mean,conductivity_min,conductivity_max,conductivity_count"
            );
            for record in &result.records {
                println!("{}", csv_row(record));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "sensor_id": sensor_id,
                "window": result.window.label(),
                "count": result.records.len(),
                "statistics": result.records,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn csv_row(record: &StatisticsRecord) -> String {
    format!(
        "{},{},{}",
        record.timestamp.to_rfc3339(),
        csv_stats(&record.temperature),
        csv_stats(&record.conductivity)
    )
}

fn csv_stats(stats: &FieldStats) -> String {
    let value = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    format!(
        "{},{},{},{}",
        value(stats.mean),
        value(stats.min),
        value(stats.max),
        stats.count.map(|c| c.to_string()).unwrap_or_default()
    )
}

/// Formats seconds as a human-readable duration.
fn format_secs(secs: i64) -> String {
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

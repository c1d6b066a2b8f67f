use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tabled::{Table, Tabled, settings::Style};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rowdrift::{AppConfig, AuditEntry, AuditLog, ChangeKind, MonitorConfig, PassReport, Reconciler};
use rowdrift::bigquery::{BqClient, BqStores};
use rowdrift::error::{BigQueryError, RowDriftError};

#[derive(Parser)]
#[command(name = "rowdrift")]
#[command(about = "Checksum-based change detection and audit trail for BigQuery tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the monitor configuration file
    #[arg(short, long, default_value = "./rowdrift.yaml", env = "ROWDRIFT_CONFIG")]
    config: PathBuf,

    /// GCP project ID (overrides the config file)
    #[arg(short, long, env = "GCP_PROJECT_ID")]
    project: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// Create the tracking dataset, checksum ledger and audit tables
    Init,

    /// Run one reconciliation pass
    Run {
        /// Only reconcile this table (all monitors if not specified)
        #[arg(short, long)]
        table: Option<String>,

        /// Output format for the pass summary
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// Run passes on the configured interval until interrupted
    Watch,

    /// List recent audit entries for a table
    Audit {
        /// Monitored table name
        #[arg(short, long)]
        table: String,

        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output format: table, yaml, json
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Yaml,
    Json,
}

#[derive(Tabled)]
struct AuditTableRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Primary Key")]
    primary_key: i64,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
}

impl From<&AuditEntry> for AuditTableRow {
    fn from(entry: &AuditEntry) -> Self {
        let symbol = match entry.change_kind {
            ChangeKind::Insert => "+",
            ChangeKind::Update => "~",
            ChangeKind::Delete => "-",
        };
        AuditTableRow {
            id: entry.id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            primary_key: entry.primary_key,
            change: format!("{} {}", symbol, entry.change_kind),
            timestamp: entry
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("rowdrift=debug,info")
    } else {
        EnvFilter::new("rowdrift=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: Box<dyn std::error::Error>) {
    if let Some(RowDriftError::BigQuery(bq)) = err.downcast_ref::<RowDriftError>() {
        print_bq_error(bq);
        return;
    }

    eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err);
}

fn print_bq_error(err: &BigQueryError) {
    eprintln!("\n\x1b[31m✗ BigQuery Error [{}]\x1b[0m", err.error_code());
    eprintln!("  {}", err);
    eprintln!("\n\x1b[33mSuggestion:\x1b[0m");
    for line in err.suggestion().lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(&cli.config)?;
    let project = cli.project.or_else(|| config.project.clone());

    match cli.command {
        Commands::Validate => {
            cmd_validate(&cli.config, &config)?;
        }

        Commands::Init => {
            let client = connect(project).await?;
            BqStores::init(&client, &config.tracking_dataset).await?;
            println!("✓ Tracking tables ready in {}.{}", client.project_id(), config.tracking_dataset);
        }

        Commands::Run { table, output } => {
            let monitors = select_monitors(&config, table.as_deref())?;
            let stores = open_stores(project, &config).await?;
            cmd_run(&stores, &monitors, output).await?;
        }

        Commands::Watch => {
            let stores = open_stores(project, &config).await?;
            cmd_watch(&stores, &config).await?;
        }

        Commands::Audit { table, limit, output } => {
            let stores = open_stores(project, &config).await?;
            cmd_audit(&stores, &table, limit, output).await?;
        }
    }

    Ok(())
}

async fn connect(project: Option<String>) -> Result<BqClient, Box<dyn std::error::Error>> {
    let project = project
        .ok_or("Project ID required (--project, GCP_PROJECT_ID or `project` in the config file)")?;
    Ok(BqClient::new(project).await?)
}

async fn open_stores(project: Option<String>, config: &AppConfig) -> Result<BqStores, Box<dyn std::error::Error>> {
    let client = connect(project).await?;
    Ok(BqStores::new(client, &config.dataset, &config.tracking_dataset))
}

fn cmd_validate(path: &Path, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("✓ {}", path.display());
    println!("  dataset: {}  tracking: {}  every {}s", config.dataset, config.tracking_dataset, config.schedule.interval_secs);
    for monitor in &config.monitors {
        println!(
            "  {} (key: {}, order: {:?}, deletes/pass: {})",
            monitor.table_name, monitor.primary_key_column, monitor.column_order, monitor.max_deletes_per_pass
        );
    }
    Ok(())
}

fn select_monitors(config: &AppConfig, table: Option<&str>) -> Result<Vec<MonitorConfig>, Box<dyn std::error::Error>> {
    match table {
        Some(name) => {
            let monitor = config
                .monitor(name)
                .ok_or_else(|| format!("Table '{}' is not configured as a monitor", name))?;
            Ok(vec![monitor.clone()])
        }
        None => Ok(config.monitors.clone()),
    }
}

async fn run_monitor(stores: &BqStores, monitor: &MonitorConfig) -> rowdrift::Result<PassReport> {
    let reconciler = Reconciler::new(monitor.clone(), &stores.ledger, &stores.audit, &stores.snapshot)?;
    reconciler.run_pass().await
}

async fn cmd_run(stores: &BqStores, monitors: &[MonitorConfig], output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let mut reports = Vec::new();
    let mut failed = 0;

    for monitor in monitors {
        match run_monitor(stores, monitor).await {
            Ok(report) => {
                if !report.is_clean() {
                    failed += 1;
                }
                reports.push(report);
            }
            Err(e) => {
                error!(table = %monitor.table_name, error = %e, "Pass failed");
                failed += 1;
            }
        }
    }

    match output {
        OutputFormat::Table => {
            for report in &reports {
                print_report(report);
            }
        }
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&reports)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    if failed > 0 {
        return Err(format!("{} of {} monitors did not complete cleanly", failed, monitors.len()).into());
    }
    Ok(())
}

fn print_report(report: &PassReport) {
    let status = if report.is_clean() { "✓" } else { "✗" };
    println!(
        "{} {}: {} scanned, +{} ~{} -{}, {} unchanged ({}ms)",
        status,
        report.table_name,
        report.rows_scanned,
        report.count(ChangeKind::Insert),
        report.count(ChangeKind::Update),
        report.count(ChangeKind::Delete),
        report.unchanged,
        report.duration_ms().unwrap_or(0),
    );
    for failure in &report.failures {
        let key = failure.primary_key.map(|k| k.to_string()).unwrap_or_else(|| "?".to_string());
        println!("    \x1b[31m✗\x1b[0m row {}: {}", key, failure.error);
    }
}

async fn cmd_watch(stores: &BqStores, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.schedule.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        monitors = config.monitors.len(),
        interval_secs = config.schedule.interval_secs,
        "Watching tables"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for monitor in &config.monitors {
                    match run_monitor(stores, monitor).await {
                        Ok(report) if report.is_clean() => {}
                        Ok(report) => warn!(
                            table = %report.table_name,
                            failures = report.failures.len(),
                            "Pass completed with row failures"
                        ),
                        Err(e) => error!(table = %monitor.table_name, error = %e, "Pass failed"),
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn cmd_audit(stores: &BqStores, table: &str, limit: usize, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let entries = stores.audit.recent(table, limit).await?;

    match output {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No audit entries for {}", table);
                return Ok(());
            }
            let rows: Vec<AuditTableRow> = entries.iter().map(AuditTableRow::from).collect();
            let mut rendered = Table::new(rows);
            rendered.with(Style::rounded());
            println!("{}", rendered);
        }
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&entries)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }

    Ok(())
}

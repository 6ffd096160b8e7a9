use std::sync::Arc;

use clap::{Parser, Subcommand};

use eggledger::{EggLedger, MissionProgress, SyncState, SyncStatus};

#[derive(Parser)]
#[command(name = "eggledger", about = "Mission history sync and export CLI")]
struct Cli {
    /// Database path (default: ~/.eggledger/eggledger.db)
    #[arg(long)]
    db: Option<String>,

    /// Application root holding exports and settings (default: ~/.eggledger)
    #[arg(long)]
    root: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl eggledger::SyncProgress for StderrProgress {
    fn on_state(&self, state: SyncState) {
        log::debug!("sync state: {state:?}");
    }

    fn on_mission_progress(&self, progress: &MissionProgress) {
        let line = format!(
            "\r  Fetching missions: {}/{} ({}), ETA {}   ",
            progress.finished,
            progress.total,
            progress.finished_percentage,
            progress
                .expected_finish_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S"),
        );
        if progress.finished == progress.total {
            eprintln!("{line}");
        } else {
            eprint!("{line}");
        }
    }

    fn on_message(&self, message: &str, is_error: bool) {
        if is_error {
            eprintln!("error: {message}");
        } else {
            eprintln!("{message}");
        }
    }

    fn on_exported_files(&self, files: &[String]) {
        for file in files {
            eprintln!("  {file}");
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an account's missions and export them
    Sync {
        /// Account ID (EI...)
        account_id: String,
    },
    /// List known accounts and what is stored for them
    Accounts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored missions of an account
    Missions {
        /// Account ID (EI...)
        account_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show or change local settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show recent sync runs
    Status,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show current settings
    Show,
    /// Turn automatic reference data refresh on or off
    AutoRefresh {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

async fn handle_sync(ledger: Arc<EggLedger>, account_id: &str) -> anyhow::Result<()> {
    let handle = ledger.start_sync(account_id, Arc::new(StderrProgress))?;

    let interrupter = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received, stopping...");
                ledger.cancel_sync();
            }
        })
    };
    let report = handle.await?;
    interrupter.abort();
    ledger.settings().flush().await?;

    match report.status {
        SyncStatus::Success => {
            eprintln!(
                "Done: {} of {} missions fetched{}",
                report.missions_fetched,
                report.missions_total,
                if report.export_reused { " (exports reused)" } else { "" },
            );
            Ok(())
        }
        SyncStatus::Interrupted => anyhow::bail!("sync interrupted"),
        SyncStatus::Failed => anyhow::bail!(
            "sync failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn handle_accounts(ledger: &EggLedger, json: bool) -> anyhow::Result<()> {
    let accounts = ledger.existing_data().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }
    if accounts.is_empty() {
        println!("No accounts synced yet.");
        return Ok(());
    }
    for summary in accounts {
        let account = &summary.account;
        let last = summary
            .last_run
            .as_ref()
            .map(|run| format!("{} at {}", run.status, run.started_at))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {:<20} EB {:<8} {:<20} {:>5} missions  last sync: {}",
            account.id, account.nickname, account.eb_string, account.role, summary.mission_count, last,
        );
    }
    Ok(())
}

async fn handle_missions(ledger: &EggLedger, account_id: &str, json: bool) -> anyhow::Result<()> {
    let rows = ledger.mission_rows(account_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No missions stored for {account_id}.");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}  {:<24} {:<8} {:>2}*  {}  cap {:>3}{}  {} drops",
            row.launched_at,
            row.ship,
            row.duration_type,
            row.level,
            row.id,
            row.capacity,
            if row.is_dub_cap { " (dub)" } else { "" },
            row.drop_count,
        );
    }
    println!("{} missions", rows.len());
    Ok(())
}

async fn handle_config(ledger: &EggLedger, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match ledger.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            ledger.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = ledger.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_settings(ledger: &EggLedger, action: SettingsAction) -> anyhow::Result<()> {
    let settings = ledger.settings();
    match action {
        SettingsAction::Show => {
            let data = settings.snapshot();
            println!("  File:          {}", settings.path().display());
            println!("  Accounts:      {}", data.known_accounts.len());
            println!(
                "  Auto-refresh:  {}",
                if settings.auto_refresh_reference_data() { "on" } else { "off" }
            );
            println!(
                "  Update check:  {}",
                data.last_update_check_at
                    .map(|t| format!("{} (latest {})", t.to_rfc3339(), data.known_latest_version))
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        SettingsAction::AutoRefresh { enabled } => {
            settings.set_auto_refresh_reference_data(enabled);
            settings.flush().await?;
            println!("Settings updated.");
        }
    }
    Ok(())
}

async fn print_status(ledger: &EggLedger) -> anyhow::Result<()> {
    let runs = ledger.sync_runs().await?;
    println!("Ledger Status");
    println!("  Root:      {}", ledger.root_dir().display());
    println!("  Accounts:  {}", ledger.settings().known_accounts().len());
    println!(
        "  API:       {}",
        ledger.config().api_base_url.as_deref().unwrap_or("(not configured)")
    );
    if runs.is_empty() {
        println!("  Last sync: never");
        return Ok(());
    }
    println!("Recent syncs");
    for run in runs {
        println!(
            "  {}  {:<22} {:<11} {}/{} fetched{}",
            run.started_at,
            run.account_id,
            run.status,
            run.missions_fetched,
            run.missions_total,
            run.error_message
                .map(|e| format!("  ({e})"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let root = match &cli.root {
        Some(path) => std::path::PathBuf::from(path),
        None => eggledger::storage::default_root()?,
    };
    let db = match &cli.db {
        Some(path) => eggledger::Database::open_at(path).await?,
        None => eggledger::Database::open_at(root.join("eggledger.db")).await?,
    };
    let ledger = EggLedger::open(db, root).await?;

    match cli.command {
        Commands::Status => print_status(&ledger).await?,
        Commands::Config { action } => handle_config(&ledger, action).await?,
        Commands::Settings { action } => handle_settings(&ledger, action).await?,
        Commands::Accounts { json } => handle_accounts(&ledger, json).await?,
        Commands::Missions { account_id, json } => {
            handle_missions(&ledger, &account_id, json).await?
        }
        Commands::Sync { account_id } => handle_sync(Arc::new(ledger), &account_id).await?,
    }

    Ok(())
}

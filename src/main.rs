// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use household_registry::{
    classify, handlers, login, seed_admin, AppConfig, ExportFormat, HouseholdForm, Overrides, Role,
    Session, SqliteStore,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Household poverty registry
#[derive(Parser, Debug)]
#[command(name = "household-registry")]
#[command(about = "Record households and classify them as Miskin, Menengah or Kaya")]
#[command(version)]
struct Cli {
    /// TOML config file (default: $HOUSEHOLD_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "HOUSEHOLD_DB")]
    database: Option<PathBuf>,

    /// Directory for uploaded photos
    #[arg(long, global = true, env = "HOUSEHOLD_UPLOADS")]
    uploads: Option<PathBuf>,

    /// Directory for exported reports
    #[arg(long, global = true, env = "HOUSEHOLD_EXPORTS")]
    exports: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "HOUSEHOLD_USER")]
    user: String,

    #[arg(long, env = "HOUSEHOLD_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and seed the administrator account
    Init,

    /// Interactive terminal UI (default)
    Tui,

    /// Score a household without storing it
    Classify {
        #[arg(long)]
        income: f64,
        #[arg(long)]
        education: String,
        #[arg(long)]
        children: i64,
        #[arg(long)]
        occupation: String,
    },

    /// Add one household
    Add {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        education: String,
        #[arg(long)]
        children: i64,
        #[arg(long)]
        income: f64,
        #[arg(long)]
        occupation: String,
        /// png/jpg/jpeg photo of the house
        #[arg(long)]
        photo: Option<PathBuf>,
    },

    /// List households, newest first
    List {
        #[command(flatten)]
        auth: Credentials,
        /// Case-insensitive name filter
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        json: bool,
    },

    /// Delete every household with exactly this name
    Delete {
        #[command(flatten)]
        auth: Credentials,
        name: String,
    },

    /// Bulk import from .csv, .xlsx, .xls or .ods
    Import {
        #[command(flatten)]
        auth: Credentials,
        file: PathBuf,
    },

    /// Write all households to a dated xlsx or pdf report
    Export {
        #[command(flatten)]
        auth: Credentials,
        format: ExportFormat,
        /// Output directory (default: the configured exports directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// User administration (administrator only)
    Users {
        #[command(flatten)]
        auth: Credentials,
        #[command(subcommand)]
        action: UsersCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    List,
    Add {
        username: String,
        #[arg(long)]
        new_password: String,
        #[arg(long, default_value = "user", value_parser = parse_role)]
        role: Role,
    },
}

fn parse_role(s: &str) -> std::result::Result<Role, String> {
    Role::from_label(s).ok_or_else(|| format!("unknown role '{}' (expected admin or user)", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::resolve(&Overrides {
        config: cli.config.clone(),
        database: cli.database.clone(),
        uploads_dir: cli.uploads.clone(),
        exports_dir: cli.exports.clone(),
    })?;

    let command = cli.command.unwrap_or(Command::Tui);

    // The alternate screen owns the terminal, so the TUI logs to a file
    if matches!(command, Command::Tui) {
        init_tracing(Some(&config.log_file()))?;
    } else {
        init_tracing(None)?;
    }

    match command {
        Command::Init => run_init(&config),
        Command::Tui => run_ui_mode(&config),
        Command::Classify {
            income,
            education,
            children,
            occupation,
        } => {
            run_classify(income, &education, children, &occupation);
            Ok(())
        }
        Command::Add {
            auth,
            name,
            address,
            education,
            children,
            income,
            occupation,
            photo,
        } => {
            let (store, session) = open_session(&config, &auth)?;
            let form = HouseholdForm {
                name,
                address,
                education,
                num_children: children,
                monthly_income: income,
                occupation,
                photo,
            };
            let saved = handlers::add_household(&session, &store, &config.uploads_dir, &form)?;
            println!(
                "✓ Saved #{} {}: score {} → {}",
                saved.record.id,
                saved.record.name,
                saved.breakdown.total(),
                saved.record.classification
            );
            Ok(())
        }
        Command::List { auth, search, json } => {
            let (store, session) = open_session(&config, &auth)?;
            run_list(&session, &store, &search, json)
        }
        Command::Delete { auth, name } => {
            let (store, session) = open_session(&config, &auth)?;
            let removed = handlers::delete_by_name(&session, &store, &name)?;
            println!("✓ Deleted {} record(s) named '{}'", removed, name);
            Ok(())
        }
        Command::Import { auth, file } => {
            let (store, session) = open_session(&config, &auth)?;
            let report = handlers::import_file(&session, &store, &file)
                .with_context(|| format!("Failed to import {}", file.display()))?;

            println!("{}", report.summary());
            for warning in &report.warnings {
                println!("  ⚠ row {}: {}", warning.row, warning.message);
            }
            Ok(())
        }
        Command::Export { auth, format, out } => {
            let (store, session) = open_session(&config, &auth)?;
            let dir = out.unwrap_or_else(|| config.exports_dir.clone());
            let path = handlers::export(&session, &store, format, &dir, Local::now().date_naive())?;
            println!("✓ Saved {}", path.display());
            Ok(())
        }
        Command::Users { auth, action } => {
            let (store, session) = open_session(&config, &auth)?;
            run_users(&session, &store, action)
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("household_registry=info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Open the database, creating the schema and administrator on first use
fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    let store = SqliteStore::new(config.database.clone());
    store
        .init()
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;

    if seed_admin(&store, &config.admin_username, &config.admin_password)? {
        info!(username = %config.admin_username, "administrator account created");
    }

    Ok(store)
}

fn open_session(config: &AppConfig, auth: &Credentials) -> Result<(SqliteStore, Session)> {
    let store = open_store(config)?;
    let session = login(&store, &auth.user, &auth.password)?;
    Ok((store, session))
}

fn run_init(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    println!("✓ Database ready at {}", store.path().display());
    println!("✓ Households stored: {}", store.count_households()?);
    println!("✓ Administrator: {}", config.admin_username);
    Ok(())
}

fn run_classify(income: f64, education: &str, children: i64, occupation: &str) {
    let breakdown = classify::score(income, education, children, occupation);

    println!("Income      {:>5}", breakdown.income);
    println!("Education   {:>5}", breakdown.education);
    println!("Children    {:>5}", breakdown.children);
    println!("Occupation  {:>5}", breakdown.occupation);
    println!("Total       {:>5}", breakdown.total());
    println!("→ {}", breakdown.classification());
}

fn run_list(session: &Session, store: &SqliteStore, search: &str, json: bool) -> Result<()> {
    let view = handlers::dashboard(session, store, search)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view.records)?);
        return Ok(());
    }

    println!(
        "Total: {}  Miskin: {}  Menengah: {}  Kaya: {}",
        view.counts.total, view.counts.poor, view.counts.middle, view.counts.wealthy
    );
    println!(
        "{:<5} {:<24} {:<14} {:>3} {:>12} {:<28} {:<9} {}",
        "ID", "Name", "Education", "Ch", "Income", "Occupation", "Class", "Created"
    );
    for h in &view.records {
        println!(
            "{:<5} {:<24} {:<14} {:>3} {:>12.0} {:<28} {:<9} {}",
            h.id,
            h.name,
            h.education,
            h.num_children,
            h.monthly_income,
            h.occupation,
            h.classification,
            h.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn run_users(session: &Session, store: &SqliteStore, action: UsersCommand) -> Result<()> {
    match action {
        UsersCommand::List => {
            for user in handlers::users(session, store)? {
                println!(
                    "{:<5} {:<20} {:<6} {}",
                    user.id,
                    user.username,
                    user.role,
                    user.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        UsersCommand::Add {
            username,
            new_password,
            role,
        } => {
            let user = handlers::add_user(session, store, &username, &new_password, role)?;
            println!("✓ Created user '{}' ({})", user.username, user.role);
        }
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    info!(database = %config.database.display(), "starting terminal UI");

    let mut app = ui::App::new(store, config);
    ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    anyhow::bail!("TUI mode not available; rebuild with `--features tui` or use a subcommand")
}

// Household Registry - Core Library
// Exposes all modules for use in the CLI, the terminal UI, and tests

pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod handlers;
pub mod import;
pub mod report;
pub mod uploads;

// Re-export commonly used types
pub use auth::{login, seed_admin, Role, Session, UserSummary};
pub use classify::{
    classify, classify_raw, score, Classification, ClassifyError, Education, Occupation,
    ScoreBreakdown,
};
pub use config::{AppConfig, Overrides};
pub use db::{setup_database, Household, HouseholdStore, NewHousehold, SqliteStore, User, UserStore};
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use handlers::{Dashboard, HouseholdForm, SavedHousehold};
pub use import::{ImportReport, ImportWarning, Table};
pub use report::TierCounts;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

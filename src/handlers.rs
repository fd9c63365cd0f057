// Page actions behind the CLI and the terminal UI
//
// Every handler takes the caller's Session; there is no way to reach the
// data without one.

use crate::auth::{self, Role, Session, UserSummary};
use crate::classify::{self, Education, Occupation, ScoreBreakdown};
use crate::db::{Household, HouseholdStore, NewHousehold, UserStore};
use crate::error::{Error, Result};
use crate::export::{self, ExportFormat};
use crate::import::{self, ImportReport};
use crate::report::{self, TierCounts};
use crate::uploads;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// ADD RECORD
// ============================================================================

/// Manual entry as typed into the form
#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdForm {
    pub name: String,
    pub address: String,
    pub education: String,
    pub num_children: i64,
    pub monthly_income: f64,
    pub occupation: String,
    pub photo: Option<PathBuf>,
}

impl HouseholdForm {
    /// Pickers only offer known categories, but the CLI takes free text
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("name is required".to_string()));
        }
        if Education::from_label(&self.education).is_none() {
            return Err(Error::InvalidInput(format!(
                "unknown education level '{}'",
                self.education
            )));
        }
        if Occupation::from_label(&self.occupation).is_none() {
            return Err(Error::InvalidInput(format!(
                "unknown occupation '{}'",
                self.occupation
            )));
        }
        if self.num_children < 0 {
            return Err(Error::InvalidInput(
                "number of children cannot be negative".to_string(),
            ));
        }
        if !self.monthly_income.is_finite() || self.monthly_income < 0.0 {
            return Err(Error::InvalidInput(
                "monthly income must be zero or more".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedHousehold {
    pub record: Household,
    pub breakdown: ScoreBreakdown,
}

pub fn add_household(
    session: &Session,
    store: &impl HouseholdStore,
    uploads_dir: &Path,
    form: &HouseholdForm,
) -> Result<SavedHousehold> {
    form.validate()?;

    let breakdown = classify::score(
        form.monthly_income,
        &form.education,
        form.num_children,
        &form.occupation,
    );

    let image_path = match &form.photo {
        Some(source) => Some(uploads::import_image_file(uploads_dir, source)?),
        None => None,
    };

    let record = NewHousehold {
        name: form.name.trim().to_string(),
        address: form.address.trim().to_string(),
        education: form.education.clone(),
        num_children: form.num_children,
        monthly_income: form.monthly_income,
        occupation: form.occupation.clone(),
        classification: breakdown.classification(),
        image_path: image_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
    };

    let stored = match store.insert(&record) {
        Ok(stored) => stored,
        Err(e) => {
            if let Some(path) = &image_path {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %cleanup, "orphaned upload left behind");
                }
            }
            return Err(e);
        }
    };

    info!(
        user = session.username(),
        id = stored.id,
        classification = %stored.classification,
        "household saved"
    );

    Ok(SavedHousehold {
        record: stored,
        breakdown,
    })
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub records: Vec<Household>,
    pub counts: TierCounts,
    /// Names available for deletion, across all records
    pub names: Vec<String>,
}

/// Counts cover the filtered rows, matching what the table shows
pub fn dashboard(session: &Session, store: &impl HouseholdStore, query: &str) -> Result<Dashboard> {
    let all = store.fetch_all()?;
    let names = report::distinct_names(&all);
    let records = report::filter_by_name(&all, query);

    tracing::debug!(
        user = session.username(),
        query,
        shown = records.len(),
        total = all.len(),
        "dashboard loaded"
    );

    Ok(Dashboard {
        counts: TierCounts::from_records(&records),
        records,
        names,
    })
}

/// Removes every record whose name matches exactly
/// (the empty name included, since imports may store it)
pub fn delete_by_name(session: &Session, store: &impl HouseholdStore, name: &str) -> Result<usize> {
    let removed = store.delete_by_name(name)?;
    info!(user = session.username(), name, removed, "records deleted by name");
    Ok(removed)
}

// ============================================================================
// IMPORT / EXPORT
// ============================================================================

pub fn import_file(session: &Session, store: &impl HouseholdStore, path: &Path) -> Result<ImportReport> {
    let report = import::import_file(store, path)?;
    info!(
        user = session.username(),
        file = %path.display(),
        inserted = report.inserted,
        failed = report.warnings.len(),
        "bulk import finished"
    );
    Ok(report)
}

/// Export every stored record, regardless of any dashboard filter
pub fn export(
    session: &Session,
    store: &impl HouseholdStore,
    format: ExportFormat,
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    let records = store.fetch_all()?;
    let path = export::write_export(&records, format, dir, date)?;
    info!(user = session.username(), path = %path.display(), "export requested");
    Ok(path)
}

// ============================================================================
// USERS
// ============================================================================

pub fn users(session: &Session, store: &impl UserStore) -> Result<Vec<UserSummary>> {
    auth::list_users(session, store)
}

pub fn add_user(
    session: &Session,
    store: &impl UserStore,
    username: &str,
    password: &str,
    role: Role,
) -> Result<UserSummary> {
    auth::create_user(session, store, username, password, role)
}

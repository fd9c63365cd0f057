use crate::auth::Role;
use crate::classify::Classification;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Household record as stored
/// Never updated after creation: classification is frozen at insert time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub education: String,
    pub num_children: i64,
    pub monthly_income: f64,
    pub occupation: String,
    pub classification: Classification,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Household record before it has an id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewHousehold {
    pub name: String,
    pub address: String,
    pub education: String,
    pub num_children: i64,
    pub monthly_income: f64,
    pub occupation: String,
    pub classification: Classification,
    pub image_path: Option<String>,
}

/// Stored login identity. The digest never leaves the auth module's checks.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// REPOSITORY TRAITS
// ============================================================================

pub trait HouseholdStore {
    /// Insert one record; fails on constraint violation
    fn insert(&self, record: &NewHousehold) -> Result<Household>;

    /// Every record, newest creation time first
    fn fetch_all(&self) -> Result<Vec<Household>>;

    /// Remove every record whose name matches exactly; returns rows removed
    fn delete_by_name(&self, name: &str) -> Result<usize>;
}

pub trait UserStore {
    /// Insert a user; a duplicate username is a constraint violation
    fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<User>;

    fn find_user(&self, username: &str) -> Result<Option<User>>;

    fn list_users(&self) -> Result<Vec<User>>;
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin' CHECK (role IN ('admin', 'user')),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS households (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            education TEXT NOT NULL,
            num_children INTEGER NOT NULL CHECK (num_children >= 0),
            monthly_income REAL NOT NULL CHECK (monthly_income >= 0),
            occupation TEXT NOT NULL,
            classification TEXT NOT NULL CHECK (classification IN ('Miskin', 'Menengah', 'Kaya')),
            image_path TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_households_name ON households(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_households_created_at ON households(created_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed store. Every operation opens and closes its own connection;
/// there is no pooling and no statement spans more than one call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the parent directory and the schema if missing
    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.connect()?;
        setup_database(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn count_households(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM households", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn unknown_label(idx: usize, kind: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown {} '{}'", kind, raw).into(),
    )
}

const HOUSEHOLD_COLUMNS: &str = "id, name, address, education, num_children, monthly_income,
     occupation, classification, image_path, created_at";

fn household_from_row(row: &Row<'_>) -> rusqlite::Result<Household> {
    let classification_str: String = row.get(7)?;
    let created_at_str: String = row.get(9)?;

    Ok(Household {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        education: row.get(3)?,
        num_children: row.get(4)?,
        monthly_income: row.get(5)?,
        occupation: row.get(6)?,
        classification: Classification::from_label(&classification_str)
            .ok_or_else(|| unknown_label(7, "classification", &classification_str))?,
        image_path: row.get(8)?,
        created_at: parse_timestamp(9, &created_at_str)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(3)?;
    let created_at_str: String = row.get(4)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::from_label(&role_str).ok_or_else(|| unknown_label(3, "role", &role_str))?,
        created_at: parse_timestamp(4, &created_at_str)?,
    })
}

impl HouseholdStore for SqliteStore {
    fn insert(&self, record: &NewHousehold) -> Result<Household> {
        let conn = self.connect()?;
        let created_at = now_timestamp();

        conn.execute(
            "INSERT INTO households (
                name, address, education, num_children, monthly_income,
                occupation, classification, image_path, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.name,
                record.address,
                record.education,
                record.num_children,
                record.monthly_income,
                record.occupation,
                record.classification.label(),
                record.image_path,
                created_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(id, name = %record.name, "household row inserted");

        let stored = conn.query_row(
            &format!("SELECT {} FROM households WHERE id = ?1", HOUSEHOLD_COLUMNS),
            params![id],
            household_from_row,
        )?;

        Ok(stored)
    }

    fn fetch_all(&self) -> Result<Vec<Household>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM households ORDER BY created_at DESC, id DESC",
            HOUSEHOLD_COLUMNS
        ))?;

        let households = stmt
            .query_map([], household_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(households)
    }

    fn delete_by_name(&self, name: &str) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM households WHERE name = ?1", params![name])?;
        Ok(removed)
    }
}

impl UserStore for SqliteStore {
    fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<User> {
        let conn = self.connect()?;
        let created_at = now_timestamp();

        conn.execute(
            "INSERT INTO users (username, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, role.label(), created_at],
        )?;

        let id = conn.last_insert_rowid();
        let user = conn.query_row(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )?;

        Ok(user)
    }

    fn find_user(&self, username: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
        )?;

        let mut rows = stmt.query_map(params![username], user_from_row)?;
        match rows.next() {
            Some(user) => Ok(Some(user?)),
            None => Ok(None),
        }
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at FROM users ORDER BY id",
        )?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(users)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::error::Error;
    use tempfile::TempDir;

    /// Fresh store in its own temp directory; keep the TempDir alive
    pub(crate) fn temp_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("households.db"));
        store.init().unwrap();
        (dir, store)
    }

    pub(crate) fn new_household(name: &str, income: f64, children: i64) -> NewHousehold {
        NewHousehold {
            name: name.to_string(),
            address: "Jl. Merdeka 1".to_string(),
            education: "SMP".to_string(),
            num_children: children,
            monthly_income: income,
            occupation: "Wiraswasta kecil".to_string(),
            classification: classify(income, "SMP", children, "Wiraswasta kecil"),
            image_path: None,
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (_dir, store) = temp_store();
        store.init().unwrap();
        store.init().unwrap();
        assert_eq!(store.count_households().unwrap(), 0);
    }

    #[test]
    fn test_insert_returns_stored_record() {
        let (_dir, store) = temp_store();

        let record = new_household("Budi", 2_500_000.0, 3);
        let stored = store.insert(&record).unwrap();

        assert!(stored.id > 0);
        assert_eq!(stored.name, "Budi");
        assert_eq!(stored.num_children, 3);
        assert_eq!(stored.monthly_income, 2_500_000.0);
        assert_eq!(stored.classification, record.classification);
        assert_eq!(stored.image_path, None);
        assert_eq!(store.count_households().unwrap(), 1);
    }

    #[test]
    fn test_fetch_all_newest_first() {
        let (_dir, store) = temp_store();

        store.insert(&new_household("first", 1.0, 0)).unwrap();
        store.insert(&new_household("second", 1.0, 0)).unwrap();
        store.insert(&new_household("third", 1.0, 0)).unwrap();

        let names: Vec<String> = store
            .fetch_all()
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();

        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_delete_by_name_removes_all_duplicates() {
        let (_dir, store) = temp_store();

        store.insert(&new_household("Alice", 1_000_000.0, 1)).unwrap();
        store.insert(&new_household("Bob", 1_000_000.0, 1)).unwrap();
        store.insert(&new_household("Alice", 5_000_000.0, 2)).unwrap();
        store.insert(&new_household("alice", 5_000_000.0, 2)).unwrap();

        let removed = store.delete_by_name("Alice").unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<String> = store
            .fetch_all()
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(remaining, vec!["alice", "Bob"]);
    }

    #[test]
    fn test_delete_by_name_without_match_removes_nothing() {
        let (_dir, store) = temp_store();
        store.insert(&new_household("Bob", 1_000_000.0, 1)).unwrap();

        assert_eq!(store.delete_by_name("Alice").unwrap(), 0);
        assert_eq!(store.count_households().unwrap(), 1);
    }

    #[test]
    fn test_negative_income_violates_constraint() {
        let (_dir, store) = temp_store();

        let err = store.insert(&new_household("Minus", -5.0, 0)).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)), "got {:?}", err);
        assert_eq!(store.count_households().unwrap(), 0);
    }

    #[test]
    fn test_users_unique_and_listed_in_order() {
        let (_dir, store) = temp_store();

        store.insert_user("admin", "digest-a", Role::Admin).unwrap();
        store.insert_user("operator", "digest-b", Role::User).unwrap();

        let err = store.insert_user("admin", "digest-c", Role::User).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "admin");
        assert_eq!(users[1].role, Role::User);

        let found = store.find_user("operator").unwrap().unwrap();
        assert_eq!(found.password_hash, "digest-b");
        assert!(store.find_user("ghost").unwrap().is_none());
    }
}

// Authentication Gate
// Salted password digests, login, and the role-carrying Session that every
// handler receives explicitly.

use crate::db::UserStore;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{info, warn};

/// Scheme tag at the start of every stored digest
const DIGEST_SCHEME: &str = "sha256";

/// Rounds of SHA-256 applied over salt || password
pub const DEFAULT_ITERATIONS: u32 = 10_000;

// ============================================================================
// ROLES & SESSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Logged-in operator. Only `login` constructs one; dropping it is logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
    role: Role,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "only administrators can manage users".to_string(),
            ))
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(username: &str, role: Role) -> Self {
        Session {
            username: username.to_string(),
            role,
        }
    }
}

/// User as shown in the administration table (no digest)
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// PASSWORD DIGESTS
// ============================================================================

fn stretch(salt: &str, password: &str, iterations: u32) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }

    format!("{:x}", digest)
}

/// Produce `sha256$<iterations>$<salt>$<hex>` with a fresh random salt
pub fn hash_password(password: &str) -> String {
    hash_password_with(password, DEFAULT_ITERATIONS)
}

pub fn hash_password_with(password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = stretch(&salt, password, iterations);
    format!("{}${}${}${}", DIGEST_SCHEME, iterations, salt, digest)
}

/// Check a password against a stored digest. Malformed digests never match.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 || parts[0] != DIGEST_SCHEME {
        return false;
    }

    let iterations: u32 = match parts[1].parse() {
        Ok(n) if n > 0 => n,
        _ => return false,
    };

    let candidate = stretch(parts[2], password, iterations);
    constant_time_eq(candidate.as_bytes(), parts[3].as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// GATE
// ============================================================================

/// Check credentials: (success, role). The role is only present on success.
pub fn verify(store: &impl UserStore, username: &str, password: &str) -> Result<(bool, Option<Role>)> {
    let user = match store.find_user(username)? {
        Some(user) => user,
        None => return Ok((false, None)),
    };

    if verify_password(&user.password_hash, password) {
        Ok((true, Some(user.role)))
    } else {
        Ok((false, None))
    }
}

/// Trim the credentials, verify them, and open a session
pub fn login(store: &impl UserStore, username: &str, password: &str) -> Result<Session> {
    let username = username.trim();
    let password = password.trim();

    match verify(store, username, password)? {
        (true, Some(role)) => {
            info!(username, %role, "login succeeded");
            Ok(Session {
                username: username.to_string(),
                role,
            })
        }
        _ => {
            warn!(username, "login failed");
            Err(Error::LoginFailed)
        }
    }
}

/// Create the administrator account on first run. Returns true when created.
pub fn seed_admin(store: &impl UserStore, username: &str, password: &str) -> Result<bool> {
    if store.find_user(username)?.is_some() {
        return Ok(false);
    }

    store.insert_user(username, &hash_password(password), Role::Admin)?;
    info!(username, "seeded administrator account");
    Ok(true)
}

pub fn create_user(
    session: &Session,
    store: &impl UserStore,
    username: &str,
    password: &str,
    role: Role,
) -> Result<UserSummary> {
    session.require_admin()?;

    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(Error::InvalidInput(
            "username and password are required".to_string(),
        ));
    }

    let user = store.insert_user(username, &hash_password(password), role)?;
    info!(created_by = session.username(), username, %role, "user created");

    Ok(UserSummary {
        id: user.id,
        username: user.username,
        role: user.role,
        created_at: user.created_at,
    })
}

pub fn list_users(session: &Session, store: &impl UserStore) -> Result<Vec<UserSummary>> {
    session.require_admin()?;

    Ok(store
        .list_users()?
        .into_iter()
        .map(|u| UserSummary {
            id: u.id,
            username: u.username,
            role: u.role,
            created_at: u.created_at,
        })
        .collect())
}

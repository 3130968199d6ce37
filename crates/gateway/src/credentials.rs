//! Credential store: user records, password digests and capability checks.
//!
//! Users are loaded once at startup from a JSON file (plus an optional
//! environment-supplied admin) and are read-only afterwards.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use proto::{ConfigError, GatewayError, Permission};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Minimum accepted length of a plaintext password.
pub const MIN_PASSWORD_LEN: usize = 8;

const DIGEST_HEX_LEN: usize = 64;

/// Returns the lowercase hex SHA-256 digest of `plain`.
pub fn digest_password(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

/// An authenticated identity with its granted capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    username: String,
    password_digest: String,
    permissions: BTreeSet<Permission>,
}

impl User {
    /// Builds a user from an already validated lowercase digest.
    pub fn new(
        username: impl Into<String>,
        password_digest: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            username: username.into(),
            password_digest: password_digest.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_digest(&self) -> &str {
        &self.password_digest
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Fails with [`GatewayError::Authorization`] unless `permission` is granted.
    pub fn require(&self, permission: Permission) -> Result<(), GatewayError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(GatewayError::Authorization {
                username: self.username.clone(),
                permission,
            })
        }
    }
}

/// One entry of the `users` list in the users file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserEntry {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password_plain: Option<String>,
    #[serde(default)]
    pub password_digest: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

/// Admin identity supplied through the environment.
#[derive(Debug, Clone)]
pub struct AdminOverride {
    pub username: String,
    pub password: String,
}

impl UserEntry {
    /// Validates the entry and turns it into a [`User`].
    pub fn into_user(self) -> Result<User, ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingField("users[].username".to_string()));
        }
        let username = self.username;

        let digest = match (self.password_plain, self.password_digest) {
            (Some(plain), None) => {
                check_password_length(&username, &plain)?;
                digest_password(&plain)
            }
            (None, Some(digest)) => normalize_digest(&username, &digest)?,
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    field: format!("users.{username}"),
                    reason: "set either password_plain or password_digest, not both".to_string(),
                });
            }
            (None, None) => {
                return Err(ConfigError::MissingField(format!(
                    "users.{username}.password_plain or password_digest"
                )));
            }
        };

        let mut permissions = BTreeSet::new();
        let mut unknown = BTreeSet::new();
        for name in self.permissions {
            match name.parse::<Permission>() {
                Ok(permission) => {
                    permissions.insert(permission);
                }
                Err(name) => {
                    unknown.insert(name);
                }
            }
        }
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownPermissions {
                username,
                permissions: unknown.into_iter().collect(),
            });
        }

        Ok(User {
            username,
            password_digest: digest,
            permissions,
        })
    }
}

impl AdminOverride {
    /// Turns the override into a user holding every permission.
    pub fn into_user(self) -> Result<User, ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingField("DOLESA_ADMIN_USERNAME".to_string()));
        }
        check_password_length(&self.username, &self.password)?;
        Ok(User::new(
            self.username,
            digest_password(&self.password),
            Permission::ALL,
        ))
    }
}

fn check_password_length(username: &str, plain: &str) -> Result<(), ConfigError> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Err(ConfigError::InvalidValue {
            field: format!("users.{username}.password_plain"),
            reason: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }
    Ok(())
}

fn normalize_digest(username: &str, digest: &str) -> Result<String, ConfigError> {
    let digest = digest.trim();
    if digest.len() != DIGEST_HEX_LEN || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidValue {
            field: format!("users.{username}.password_digest"),
            reason: format!("expected {DIGEST_HEX_LEN} hexadecimal characters (SHA-256)"),
        });
    }
    Ok(digest.to_ascii_lowercase())
}

/// Read-only set of users keyed by username.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, User>,
}

impl CredentialStore {
    /// Validates every entry and applies the admin override last.
    pub fn from_entries(
        entries: impl IntoIterator<Item = UserEntry>,
        admin: Option<AdminOverride>,
    ) -> Result<Self, ConfigError> {
        let mut users = HashMap::new();
        for entry in entries {
            let user = entry.into_user()?;
            if users.contains_key(user.username()) {
                return Err(ConfigError::DuplicateUser(user.username.clone()));
            }
            users.insert(user.username.clone(), user);
        }

        if let Some(admin) = admin {
            let user = admin.into_user()?;
            if users.contains_key(user.username()) {
                info!(username = %user.username, "Admin override replaces configured user");
            }
            users.insert(user.username.clone(), user);
        }

        debug!(count = users.len(), "Credential store ready");
        Ok(Self { users })
    }

    /// Loads `{"users": [...]}` from a JSON file.
    pub fn load(path: &Path, admin: Option<AdminOverride>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: UsersFile = serde_json::from_str(&content).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "Loading users");
        Self::from_entries(file.users, admin)
    }

    /// Verifies a username/password pair.
    ///
    /// Unknown usernames and wrong passwords yield the same error.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&User, GatewayError> {
        let supplied = digest_password(password);
        let Some(user) = self.users.get(username) else {
            debug!(username, "Unknown user");
            return Err(GatewayError::Authentication);
        };
        if bool::from(supplied.as_bytes().ct_eq(user.password_digest.as_bytes())) {
            Ok(user)
        } else {
            debug!(username, "Password mismatch");
            Err(GatewayError::Authentication)
        }
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Usernames in sorted order.
    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.users.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

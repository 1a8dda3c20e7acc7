//! Declared capability table: which roles may edit which fields.
//!
//! The table is resolved once from its declared form (built-in default or a
//! TOML document) into per-role lookup maps, so each permission check is a
//! couple of hash lookups.
//!
//! TOML format:
//!
//! ```toml
//! [roles.administrator]
//! collections = { "*" = ["*"] }
//!
//! [roles.editor]
//! collections = { products = ["*"], pages = ["title", "body"] }
//! deny = { products = ["sku"] }
//! ```

use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Matches any collection or any field.
pub const WILDCARD: &str = "*";

/// Role of the viewer, as derived by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Customer,
    Anonymous,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Editor => "editor",
            Self::Customer => "customer",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "editor" => Ok(Self::Editor),
            "customer" => Ok(Self::Customer),
            "anonymous" | "public" => Ok(Self::Anonymous),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Which fields of a collection a role may edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    Any,
    Only(HashSet<String>),
}

impl FieldRule {
    fn from_list(fields: Vec<String>) -> Self {
        if fields.iter().any(|f| f == WILDCARD) {
            Self::Any
        } else {
            Self::Only(fields.into_iter().collect())
        }
    }

    pub fn allows(&self, field: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(fields) => fields.contains(field),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Only(fields) if fields.is_empty())
    }
}

/// Resolved capabilities of a single role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePolicy {
    /// Rule applied to collections without an explicit entry.
    fallback: Option<FieldRule>,
    collections: HashMap<String, FieldRule>,
    /// Fields that stay read-only even when a rule above grants them.
    denied: HashMap<String, HashSet<String>>,
}

impl RolePolicy {
    /// A policy granting every field of every collection.
    pub fn unrestricted() -> Self {
        Self {
            fallback: Some(FieldRule::Any),
            ..Self::default()
        }
    }

    /// Grants `fields` of `collection` (`"*"` for either means all).
    pub fn grant<I, S>(mut self, collection: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule = FieldRule::from_list(fields.into_iter().map(Into::into).collect());
        if collection == WILDCARD {
            self.fallback = Some(rule);
        } else {
            self.collections.insert(collection.to_string(), rule);
        }
        self
    }

    /// Marks `fields` of `collection` as read-only for this role.
    pub fn deny<I, S>(mut self, collection: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied
            .entry(collection.to_string())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    fn rule_for(&self, collection: &str) -> Option<&FieldRule> {
        self.collections.get(collection).or(self.fallback.as_ref())
    }

    fn is_denied(&self, collection: &str, field: &str) -> bool {
        [collection, WILDCARD].iter().any(|c| {
            self.denied
                .get(*c)
                .is_some_and(|fields| fields.contains(field) || fields.contains(WILDCARD))
        })
    }

    pub fn allows_collection(&self, collection: &str) -> bool {
        self.rule_for(collection).is_some_and(|rule| !rule.is_empty())
    }

    pub fn allows_field(&self, collection: &str, field: &str) -> bool {
        !self.is_denied(collection, field)
            && self.rule_for(collection).is_some_and(|rule| rule.allows(field))
    }
}

/// Role → capability lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    roles: HashMap<Role, RolePolicy>,
}

impl Default for CapabilityTable {
    /// Administrators and editors may edit everything; customers and
    /// anonymous viewers may edit nothing.
    fn default() -> Self {
        Self::empty()
            .with_role(Role::Administrator, RolePolicy::unrestricted())
            .with_role(Role::Editor, RolePolicy::unrestricted())
    }
}

impl CapabilityTable {
    /// A table that grants nothing to anyone.
    pub fn empty() -> Self {
        Self {
            roles: HashMap::new(),
        }
    }

    /// Replaces the policy of `role`.
    pub fn with_role(mut self, role: Role, policy: RolePolicy) -> Self {
        self.roles.insert(role, policy);
        self
    }

    /// Returns the resolved policy of `role`, if any.
    pub fn policy(&self, role: Role) -> Option<&RolePolicy> {
        self.roles.get(&role)
    }

    pub fn allows_collection(&self, role: Role, collection: &str) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|p| p.allows_collection(collection))
    }

    pub fn allows_field(&self, role: Role, collection: &str, field: &str) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|p| p.allows_field(collection, field))
    }

    /// Parses a table from a TOML document. Unknown role names are skipped
    /// with a warning.
    pub fn from_toml_str(contents: &str) -> AuthResult<Self> {
        let file: CapabilityFile = toml::from_str(contents)?;
        Ok(file.resolve())
    }

    /// Loads a table from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_toml_str(&contents)?;
        info!("Loaded capability table from {:?} ({} roles)", path, table.roles.len());
        Ok(table)
    }
}

/// Raw TOML structure of a capability table.
#[derive(Deserialize)]
struct CapabilityFile {
    #[serde(default)]
    roles: HashMap<String, RoleSection>,
}

#[derive(Deserialize, Default)]
struct RoleSection {
    #[serde(default)]
    collections: HashMap<String, Vec<String>>,
    #[serde(default)]
    deny: HashMap<String, Vec<String>>,
}

impl CapabilityFile {
    fn resolve(self) -> CapabilityTable {
        let mut table = CapabilityTable::empty();
        for (name, section) in self.roles {
            let role = match name.parse::<Role>() {
                Ok(role) => role,
                Err(e) => {
                    warn!("Skipping capability entry: {}", e);
                    continue;
                }
            };
            let mut policy = RolePolicy::default();
            for (collection, fields) in section.collections {
                policy = policy.grant(&collection, fields);
            }
            for (collection, fields) in section.deny {
                policy = policy.deny(&collection, fields);
            }
            table.roles.insert(role, policy);
        }
        table
    }
}

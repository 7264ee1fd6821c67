//! Role table and permission evaluation.
//!
//! The role table is loaded once at startup from a JSON document and never
//! mutated afterward; evaluation is a pure function over it. A role name
//! absent from the table is always a deny value, never an error.

use std::collections::HashMap;

use serde::Deserialize;

use crate::chain::config::ConfigError;

/// A structured `resource:action` permission.
///
/// Strings are split once, at the configuration boundary; matching then
/// compares the structured fields, so a resource name containing the
/// separator cannot confuse a check when constructed via [`Permission::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    resource: String,
    action: String,
}

/// Wildcard action granting every action on a resource. There is no
/// cross-resource wildcard.
pub const ACTION_ANY: &str = "*";

impl Permission {
    pub fn new(resource: &str, action: &str) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    /// Parse a `resource:action` string. The split is on the first `:`;
    /// the action part may itself contain the separator.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.split_once(':') {
            Some((resource, action)) if !resource.is_empty() && !action.is_empty() => {
                Ok(Self::new(resource, action))
            }
            _ => Err(ConfigError::Malformed(format!(
                "permission {raw:?} is not of the form resource:action"
            ))),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether this held permission grants the requested one: same
    /// resource and either the exact action or the `*` wildcard.
    pub fn grants(&self, requested: &Permission) -> bool {
        self.resource == requested.resource
            && (self.action == requested.action || self.action == ACTION_ANY)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Which organizations a role may act for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgConstraint {
    /// Any organization (`"*"` in configuration).
    Any,
    /// Exactly one organization MSP.
    One(String),
    /// Any of a set of organization MSPs.
    Set(Vec<String>),
}

impl OrgConstraint {
    pub fn allows(&self, org_msp: &str) -> bool {
        match self {
            OrgConstraint::Any => true,
            OrgConstraint::One(msp) => msp == org_msp,
            OrgConstraint::Set(msps) => msps.iter().any(|m| m == org_msp),
        }
    }
}

/// A named role: its permission set and organization constraint.
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
    pub org: OrgConstraint,
}

#[derive(Deserialize)]
struct RawDocument {
    roles: HashMap<String, RawRole>,
}

#[derive(Deserialize)]
struct RawRole {
    permissions: Vec<String>,
    #[serde(rename = "orgMSP")]
    org_msp: RawOrg,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrg {
    One(String),
    Many(Vec<String>),
}

/// Immutable mapping from role name to role, shared process-wide.
#[derive(Debug, Clone)]
pub struct RoleTable {
    roles: HashMap<String, Role>,
}

impl RoleTable {
    /// Read and parse the role configuration file. Any failure here is a
    /// fatal startup error; the process must not serve requests after it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&data)
    }

    /// Parse a role table from a JSON document of the form
    /// `{"roles": {"Name": {"permissions": [...], "orgMSP": ...}}}` where
    /// `orgMSP` is `"*"`, a single MSP string, or an array of MSP strings.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument =
            serde_json::from_str(data).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let mut roles = HashMap::new();
        for (name, raw_role) in raw.roles {
            let permissions = raw_role
                .permissions
                .iter()
                .map(|p| Permission::parse(p))
                .collect::<Result<Vec<_>, _>>()?;

            let org = match raw_role.org_msp {
                RawOrg::One(msp) if msp == "*" => OrgConstraint::Any,
                RawOrg::One(msp) => OrgConstraint::One(msp),
                RawOrg::Many(msps) => OrgConstraint::Set(msps),
            };

            roles.insert(
                name.clone(),
                Role {
                    name,
                    permissions,
                    org,
                },
            );
        }

        Ok(Self { roles })
    }

    /// Build a table from already-structured roles.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Whether the named role holds the requested permission, exactly or
    /// via the per-resource wildcard. Unknown roles deny.
    pub fn has_permission(&self, role_name: &str, requested: &Permission) -> bool {
        match self.roles.get(role_name) {
            Some(role) => role.permissions.iter().any(|held| held.grants(requested)),
            None => false,
        }
    }

    /// Whether the named role may act for the given organization MSP.
    /// Unknown roles deny.
    pub fn has_org_access(&self, role_name: &str, org_msp: &str) -> bool {
        match self.roles.get(role_name) {
            Some(role) => role.org.allows(org_msp),
            None => false,
        }
    }

    pub fn is_valid_role(&self, role_name: &str) -> bool {
        self.roles.contains_key(role_name)
    }

    pub fn role_permissions(&self, role_name: &str) -> &[Permission] {
        self.roles
            .get(role_name)
            .map(|r| r.permissions.as_slice())
            .unwrap_or(&[])
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

//! Per-request authorization pipeline.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! identity presence, then permission, then organization. No ledger call
//! of any kind may happen before the pipeline succeeds; any missing or
//! ambiguous input resolves to a denial.

use std::sync::Arc;

use log::warn;
use thiserror::Error;

use crate::rbac::roles::{Permission, RoleTable};

/// Resolved caller identity, produced by the external authentication
/// layer. Untrusted until validated against the role table.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Subject id (user id from the authentication layer).
    pub subject: String,
    /// Role name to evaluate against the role table.
    pub role: String,
    /// MSP id of the organization the caller claims to act for.
    pub org_msp: String,
}

/// Authorization failures. `Display` carries internal detail for logs;
/// production-facing responses must use [`AuthError::public_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no resolved identity on request")]
    Unauthenticated,

    #[error("subject {subject} (role {role}) denied permission {permission}")]
    PermissionDenied {
        subject: String,
        role: String,
        permission: String,
    },

    #[error("subject {subject} denied for organization {org_msp}")]
    OrganizationMismatch { subject: String, org_msp: String },
}

impl AuthError {
    /// Client-safe message. Never names the permission or organization
    /// that failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "Authentication required",
            AuthError::PermissionDenied { .. } => "Insufficient permissions",
            AuthError::OrganizationMismatch { .. } => "Organization access denied",
        }
    }
}

/// Capability-query surface attached to a request after authorization.
///
/// Lets in-handler business logic ask finer-grained questions without
/// re-running the pipeline.
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    roles: Arc<RoleTable>,
    identity: Identity,
}

impl AuthorizedRequest {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Does this identity's role hold the given permission?
    pub fn can(&self, permission: &Permission) -> bool {
        self.roles.has_permission(&self.identity.role, permission)
    }

    /// Is this identity's organization authorized for its role?
    pub fn org_allowed(&self) -> bool {
        self.roles
            .has_org_access(&self.identity.role, &self.identity.org_msp)
    }
}

/// Fail-closed authorization gate over the immutable role table.
pub struct AuthorizationGate {
    roles: Arc<RoleTable>,
}

impl AuthorizationGate {
    pub fn new(roles: Arc<RoleTable>) -> Self {
        Self { roles }
    }

    /// Run the pipeline: identity presence, permission, organization.
    ///
    /// On success the returned [`AuthorizedRequest`] is the proof that a
    /// ledger call may proceed.
    pub fn authorize(
        &self,
        identity: Option<&Identity>,
        required: &Permission,
    ) -> Result<AuthorizedRequest, AuthError> {
        let identity = identity.ok_or(AuthError::Unauthenticated)?;

        if !self.roles.has_permission(&identity.role, required) {
            warn!(
                "Access denied for subject {} (role: {}) - missing permission: {}",
                identity.subject, identity.role, required
            );
            return Err(AuthError::PermissionDenied {
                subject: identity.subject.clone(),
                role: identity.role.clone(),
                permission: required.to_string(),
            });
        }

        if !self.roles.has_org_access(&identity.role, &identity.org_msp) {
            warn!(
                "Access denied for subject {} - organization mismatch ({})",
                identity.subject, identity.org_msp
            );
            return Err(AuthError::OrganizationMismatch {
                subject: identity.subject.clone(),
                org_msp: identity.org_msp.clone(),
            });
        }

        Ok(AuthorizedRequest {
            roles: Arc::clone(&self.roles),
            identity: identity.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::roles::tests::dfir_table;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(dfir_table()))
    }

    fn identity(role: &str, org: &str) -> Identity {
        Identity {
            subject: "u-1007".to_string(),
            role: role.to_string(),
            org_msp: org.to_string(),
        }
    }

    #[test]
    fn missing_identity_fails_first() {
        let err = gate()
            .authorize(None, &Permission::new("evidence", "read"))
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[test]
    fn auditor_cannot_write_evidence() {
        // Auditor holds evidence:read and ipfs:read with org "*".
        let id = identity("Auditor", "CourtMSP");
        let err = gate()
            .authorize(Some(&id), &Permission::new("evidence", "write"))
            .unwrap_err();
        match err {
            AuthError::PermissionDenied { ref role, ref permission, .. } => {
                assert_eq!(role, "Auditor");
                assert_eq!(permission, "evidence:write");
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
        assert_eq!(err.public_message(), "Insufficient permissions");
    }

    #[test]
    fn admin_wildcard_authorizes_delete() {
        // Admin holds evidence:* with org "*": wildcard match, org pass.
        let id = identity("Admin", "PoliceMSP");
        let request = gate()
            .authorize(Some(&id), &Permission::new("evidence", "delete"))
            .unwrap();
        assert!(request.org_allowed());
        assert_eq!(request.identity().subject, "u-1007");
    }

    #[test]
    fn org_check_runs_after_permission_check() {
        // CourtUser holds evidence:read but is constrained to CourtMSP;
        // the permission passes and the organization check then denies.
        let id = identity("CourtUser", "PoliceMSP");
        let err = gate()
            .authorize(Some(&id), &Permission::new("evidence", "read"))
            .unwrap_err();
        assert!(matches!(err, AuthError::OrganizationMismatch { .. }));
        assert_eq!(err.public_message(), "Organization access denied");
    }

    #[test]
    fn unknown_role_is_denied_not_an_error() {
        let id = identity("Ghost", "ForensicLabMSP");
        let err = gate()
            .authorize(Some(&id), &Permission::new("evidence", "read"))
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
    }

    #[test]
    fn capability_surface_answers_without_reauthorizing() {
        let id = identity("Investigator", "ForensicLabMSP");
        let request = gate()
            .authorize(Some(&id), &Permission::new("evidence", "create"))
            .unwrap();

        assert!(request.can(&Permission::new("evidence", "transfer")));
        assert!(!request.can(&Permission::new("evidence", "analyze")));
        assert!(request.org_allowed());
    }

    #[test]
    fn public_messages_do_not_leak_detail() {
        let id = identity("Auditor", "CourtMSP");
        let err = gate()
            .authorize(Some(&id), &Permission::new("evidence", "write"))
            .unwrap_err();
        let public = err.public_message();
        assert!(!public.contains("evidence"));
        assert!(!public.contains("Auditor"));
    }
}

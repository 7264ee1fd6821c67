//! Role-based access control.
//!
//! Two layers: a pure evaluation core ([`roles`]) over the immutable role
//! table, and the per-request [`gate`] pipeline that composes identity
//! presence, permission, and organization checks ahead of any ledger call.

pub mod gate;
pub mod roles;

pub use gate::{AuthError, AuthorizationGate, AuthorizedRequest, Identity};
pub use roles::{OrgConstraint, Permission, Role, RoleTable, ACTION_ANY};

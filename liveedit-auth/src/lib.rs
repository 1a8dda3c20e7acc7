//! Permission gate for inline editing.
//!
//! Editing a field is allowed when:
//! 1. the caller is authenticated, or is inside a trusted editing context
//!    (e.g. the content studio's live preview), and
//! 2. the caller's role is granted the `(collection, field)` pair by a
//!    [`CapabilityTable`].
//!
//! The gate is advisory. The engine never enforces it; callers consult it
//! before entering edit mode, and the backing store remains the
//! authoritative enforcement point.

mod capability;
mod error;
mod gate;

pub use capability::{CapabilityTable, FieldRule, Role, RolePolicy, WILDCARD};
pub use error::{AuthError, AuthResult};
pub use gate::{AuthState, Authorizer, GateAuthorizer, PermissionGate, can_edit};

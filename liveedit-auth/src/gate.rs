//! The `can_edit` predicate and its authorization collaborator.

use crate::capability::{CapabilityTable, Role};
use liveedit_types::FieldKey;
use serde::{Deserialize, Serialize};

/// Authorization collaborator consulted by the gate.
///
/// Implemented by whatever derives the viewer's identity; [`GateAuthorizer`]
/// is the table-backed implementation.
pub trait Authorizer: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn can_edit_collection(&self, collection: &str) -> bool;
    fn can_edit_field(&self, collection: &str, field: &str) -> bool;
}

/// Authentication state of the current viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub authenticated: bool,
    /// Rendering inside the content studio's preview frame, where the
    /// studio session stands in for a storefront login.
    #[serde(default)]
    pub trusted_context: bool,
    pub role: Role,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            trusted_context: false,
            role: Role::Anonymous,
        }
    }

    pub fn signed_in(role: Role) -> Self {
        Self {
            authenticated: true,
            trusted_context: false,
            role,
        }
    }

    /// Marks the state as running inside a trusted editing context.
    pub fn in_trusted_context(mut self) -> Self {
        self.trusted_context = true;
        self
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Binds an [`AuthState`] to a [`CapabilityTable`].
#[derive(Debug, Clone, Copy)]
pub struct GateAuthorizer<'a> {
    state: AuthState,
    table: &'a CapabilityTable,
}

impl<'a> GateAuthorizer<'a> {
    pub fn new(state: AuthState, table: &'a CapabilityTable) -> Self {
        Self { state, table }
    }
}

impl Authorizer for GateAuthorizer<'_> {
    fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    fn can_edit_collection(&self, collection: &str) -> bool {
        self.table.allows_collection(self.state.role, collection)
    }

    fn can_edit_field(&self, collection: &str, field: &str) -> bool {
        self.table.allows_field(self.state.role, collection, field)
    }
}

/// Combines authentication (or a trusted context) with the collaborator's
/// capability answers.
pub fn can_edit(
    authorizer: &dyn Authorizer,
    trusted_context: bool,
    collection: &str,
    field: &str,
) -> bool {
    (authorizer.is_authenticated() || trusted_context)
        && authorizer.can_edit_collection(collection)
        && authorizer.can_edit_field(collection, field)
}

/// Table-backed permission gate.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    table: CapabilityTable,
}

impl PermissionGate {
    pub fn new(table: CapabilityTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Whether a viewer in `auth` may edit `field` of `collection`.
    pub fn can_edit(&self, auth: &AuthState, collection: &str, field: &str) -> bool {
        let authorizer = GateAuthorizer::new(*auth, &self.table);
        can_edit(&authorizer, auth.trusted_context, collection, field)
    }

    /// [`PermissionGate::can_edit`] for a field key.
    pub fn can_edit_key(&self, auth: &AuthState, key: &FieldKey) -> bool {
        self.can_edit(auth, key.collection(), &key.field)
    }
}

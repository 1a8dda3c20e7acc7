use liveedit_auth::{
    AuthState, Authorizer, CapabilityTable, PermissionGate, Role, RolePolicy, can_edit,
};
use liveedit_types::FieldKey;

fn editor_table() -> CapabilityTable {
    CapabilityTable::empty()
        .with_role(Role::Administrator, RolePolicy::unrestricted())
        .with_role(
            Role::Editor,
            RolePolicy::default()
                .grant("products", ["*"])
                .grant("pages", ["title", "body"])
                .deny("products", ["sku"]),
        )
}

// ── PermissionGate ──────────────────────────────────────────────

#[test]
fn anonymous_cannot_edit() {
    let gate = PermissionGate::default();
    assert!(!gate.can_edit(&AuthState::anonymous(), "products", "title"));
}

#[test]
fn administrator_can_edit_anything() {
    let gate = PermissionGate::new(editor_table());
    let admin = AuthState::signed_in(Role::Administrator);
    assert!(gate.can_edit(&admin, "products", "sku"));
    assert!(gate.can_edit(&admin, "orders", "status"));
}

#[test]
fn editor_limited_by_table() {
    let gate = PermissionGate::new(editor_table());
    let editor = AuthState::signed_in(Role::Editor);

    assert!(gate.can_edit(&editor, "products", "title"));
    assert!(gate.can_edit(&editor, "pages", "body"));
    assert!(!gate.can_edit(&editor, "pages", "slug"));
    assert!(!gate.can_edit(&editor, "orders", "status"));
}

#[test]
fn deny_list_overrides_wildcard_grant() {
    let gate = PermissionGate::new(editor_table());
    let editor = AuthState::signed_in(Role::Editor);
    assert!(!gate.can_edit(&editor, "products", "sku"));
}

#[test]
fn trusted_context_substitutes_for_login() {
    let gate = PermissionGate::new(editor_table());
    let mut state = AuthState::signed_in(Role::Editor);
    state.authenticated = false;
    assert!(!gate.can_edit(&state, "products", "title"));

    let trusted = state.in_trusted_context();
    assert!(gate.can_edit(&trusted, "products", "title"));
}

#[test]
fn trusted_context_does_not_grant_capabilities() {
    let gate = PermissionGate::new(editor_table());
    let customer = AuthState::signed_in(Role::Customer).in_trusted_context();
    assert!(!gate.can_edit(&customer, "products", "title"));
}

#[test]
fn can_edit_key_uses_collection_and_field() {
    let gate = PermissionGate::new(editor_table());
    let editor = AuthState::signed_in(Role::Editor);
    assert!(gate.can_edit_key(&editor, &FieldKey::new("pages", "home", "title")));
    assert!(!gate.can_edit_key(&editor, &FieldKey::new("pages", "home", "slug")));
}

// ── can_edit with a custom collaborator ─────────────────────────

struct FixedAuthorizer {
    authenticated: bool,
    collection: bool,
    field: bool,
}

impl Authorizer for FixedAuthorizer {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
    fn can_edit_collection(&self, _collection: &str) -> bool {
        self.collection
    }
    fn can_edit_field(&self, _collection: &str, _field: &str) -> bool {
        self.field
    }
}

#[test]
fn can_edit_requires_every_condition() {
    let all = FixedAuthorizer {
        authenticated: true,
        collection: true,
        field: true,
    };
    assert!(can_edit(&all, false, "c", "f"));

    let no_collection = FixedAuthorizer {
        collection: false,
        ..all
    };
    assert!(!can_edit(&no_collection, false, "c", "f"));

    let no_field = FixedAuthorizer { field: false, ..all };
    assert!(!can_edit(&no_field, false, "c", "f"));

    let anonymous = FixedAuthorizer {
        authenticated: false,
        ..all
    };
    assert!(!can_edit(&anonymous, false, "c", "f"));
    assert!(can_edit(&anonymous, true, "c", "f"));
}

use liveedit_auth::{AuthError, CapabilityTable, Role, RolePolicy};
use std::io::Write;

const POLICY: &str = r#"
[roles.administrator]
collections = { "*" = ["*"] }

[roles.editor]
collections = { products = ["*"], pages = ["title", "body"] }
deny = { products = ["sku"] }

[roles.superuser]
collections = { "*" = ["*"] }
"#;

// ── Role ────────────────────────────────────────────────────────

#[test]
fn role_parse_and_display() {
    assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
    assert_eq!(" Editor ".parse::<Role>().unwrap(), Role::Editor);
    assert_eq!("public".parse::<Role>().unwrap(), Role::Anonymous);
    assert!("superuser".parse::<Role>().is_err());
    assert_eq!(Role::Customer.to_string(), "customer");
}

// ── Default table ───────────────────────────────────────────────

#[test]
fn default_table_grants_staff_only() {
    let table = CapabilityTable::default();
    assert!(table.allows_field(Role::Administrator, "products", "title"));
    assert!(table.allows_field(Role::Editor, "pages", "body"));
    assert!(!table.allows_field(Role::Customer, "products", "title"));
    assert!(!table.allows_collection(Role::Anonymous, "products"));
}

#[test]
fn empty_table_grants_nothing() {
    let table = CapabilityTable::empty();
    assert!(!table.allows_field(Role::Administrator, "products", "title"));
    assert!(table.policy(Role::Administrator).is_none());
}

#[test]
fn collection_with_no_fields_is_not_editable() {
    let table = CapabilityTable::empty().with_role(
        Role::Editor,
        RolePolicy::default().grant("pages", Vec::<String>::new()),
    );
    assert!(!table.allows_collection(Role::Editor, "pages"));
}

// ── TOML loading ────────────────────────────────────────────────

#[test]
fn parses_toml_policy() {
    let table = CapabilityTable::from_toml_str(POLICY).unwrap();

    assert!(table.allows_field(Role::Administrator, "orders", "status"));
    assert!(table.allows_field(Role::Editor, "products", "title"));
    assert!(!table.allows_field(Role::Editor, "products", "sku"));
    assert!(table.allows_field(Role::Editor, "pages", "title"));
    assert!(!table.allows_field(Role::Editor, "pages", "slug"));
    assert!(!table.allows_collection(Role::Editor, "orders"));
}

#[test]
fn unknown_roles_are_skipped() {
    let table = CapabilityTable::from_toml_str(POLICY).unwrap();
    assert!(table.policy(Role::Customer).is_none());
}

#[test]
fn global_deny_applies_to_every_collection() {
    let toml = r#"
        [roles.editor]
        collections = { "*" = ["*"] }
        deny = { "*" = ["id"] }
    "#;
    let table = CapabilityTable::from_toml_str(toml).unwrap();
    assert!(!table.allows_field(Role::Editor, "products", "id"));
    assert!(table.allows_field(Role::Editor, "products", "title"));
}

#[test]
fn malformed_toml_is_an_error() {
    let err = CapabilityTable::from_toml_str("[roles.editor\ncollections = 3").unwrap_err();
    assert!(matches!(err, AuthError::Parse(_)));
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(POLICY.as_bytes()).unwrap();

    let table = CapabilityTable::load_from(file.path()).unwrap();
    assert!(table.allows_field(Role::Editor, "pages", "body"));
}

#[test]
fn load_from_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = CapabilityTable::load_from(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, AuthError::Io { .. }));
}

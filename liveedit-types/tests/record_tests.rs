use liveedit_types::{Error, Record};
use serde_json::json;

#[test]
fn empty_record() {
    let record = Record::new();
    assert!(record.is_empty());
    assert_eq!(record.len(), 0);
    assert!(record.get("title").is_none());
}

#[test]
fn set_and_get() {
    let mut record = Record::new();
    assert_eq!(record.set("title", json!("Mug")), None);
    assert_eq!(record.set("title", json!("Cup")), Some(json!("Mug")));
    assert_eq!(record.get("title"), Some(&json!("Cup")));
}

#[test]
fn from_json_object() {
    let record = Record::from_json(json!({"title": "Mug", "price": 12})).unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record.get("price"), Some(&json!(12)));

    let mut names: Vec<_> = record.field_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["price", "title"]);
}

#[test]
fn from_json_rejects_non_object() {
    assert!(matches!(
        Record::from_json(json!([1, 2, 3])),
        Err(Error::NotAnObject)
    ));
}

#[test]
fn from_json_str_reports_parse_errors() {
    assert!(matches!(
        Record::from_json_str("{not json"),
        Err(Error::Serialization(_))
    ));
}

#[test]
fn serializes_transparently() {
    let record = Record::new().with("title", json!("Mug"));
    let s = serde_json::to_string(&record).unwrap();
    assert_eq!(s, r#"{"title":"Mug"}"#);
    assert_eq!(record.clone().into_json(), json!({"title": "Mug"}));
}

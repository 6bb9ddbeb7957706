use serde_json::json;

use crate::schema::validate;

#[test]
fn no_schema_always_passes() {
    let row = json!({"anything": "goes"}).as_object().unwrap().clone();
    assert!(validate(None, &row).is_ok());
}

#[test]
fn required_fields_enforced() {
    let schema = json!({
        "type": "object",
        "required": ["name", "email"],
        "properties": {
            "name": {"type": "string"},
            "email": {"type": "string"}
        }
    });
    let ok = json!({"name": "Ada", "email": "ada@x.com"}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &ok).is_ok());

    let missing = json!({"name": "Ada"}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &missing).is_err());
}

#[test]
fn property_type_mismatch_fails() {
    let schema = json!({
        "type": "object",
        "properties": {"age": {"type": "integer"}}
    });
    let bad = json!({"age": "not a number"}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &bad).is_err());
}

#[test]
fn unspecified_properties_are_not_validated() {
    let schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}}
    });
    let row = json!({"name": "Ada", "extra": 123}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &row).is_ok());
}

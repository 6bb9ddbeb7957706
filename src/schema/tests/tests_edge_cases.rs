use serde_json::json;

use crate::schema::validate;

#[test]
fn advisory_keywords_are_ignored() {
    let schema = json!({
        "type": "object",
        "properties": {
            "email": {
                "type": "string",
                "format": "email",
                "pattern": "^.+@.+$",
                "minLength": 5
            }
        }
    });
    // Violates format/pattern/minLength but those are advisory only.
    let row = json!({"email": "x"}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &row).is_ok());
}

#[test]
fn nested_object_properties_validate_recursively() {
    let schema = json!({
        "type": "object",
        "properties": {
            "address": {
                "type": "object",
                "required": ["city"],
                "properties": {"city": {"type": "string"}}
            }
        }
    });
    let missing_city = json!({"address": {}}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &missing_city).is_err());

    let ok = json!({"address": {"city": "Warsaw"}}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &ok).is_ok());
}

#[test]
fn integer_type_accepts_whole_number_values() {
    let schema = json!({"type": "object", "properties": {"count": {"type": "integer"}}});
    let row = json!({"count": 42}).as_object().unwrap().clone();
    assert!(validate(Some(&schema), &row).is_ok());
}

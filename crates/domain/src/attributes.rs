use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Flattens nested record attributes into dotted paths.
///
/// Objects are descended into; arrays and scalars are leaves.
/// `{"payload": {"body": {"title": "x"}}}` becomes `{"payload.body.title": "x"}`.
#[must_use]
pub fn flatten_attributes(attributes: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut flattened = BTreeMap::new();
    flatten_into(&mut flattened, None, attributes);
    flattened
}

fn flatten_into(
    flattened: &mut BTreeMap<String, Value>,
    parent: Option<&str>,
    attributes: &Map<String, Value>,
) {
    for (key, value) in attributes {
        let path = match parent {
            Some(parent) => format!("{parent}.{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(flattened, Some(path.as_str()), nested),
            leaf => {
                flattened.insert(path, leaf.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::flatten_attributes;

    #[test]
    fn nested_objects_become_dotted_paths() {
        let attributes = json!({
            "is_active": true,
            "payload": {"body": {"title": "hello", "tags": ["a", "b"]}}
        });
        let Some(attributes) = attributes.as_object() else {
            panic!("fixture must be an object");
        };

        let flattened = flatten_attributes(attributes);
        let keys: Vec<&str> = flattened.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["is_active", "payload.body.tags", "payload.body.title"]
        );
        assert_eq!(flattened.get("payload.body.tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn empty_objects_produce_no_paths() {
        let attributes = json!({"payload": {}});
        let Some(attributes) = attributes.as_object() else {
            panic!("fixture must be an object");
        };
        assert!(flatten_attributes(attributes).is_empty());
    }
}

//! # Manifest Parsing
//!
//! Splits multi-document YAML into [`DynamicObject`]s. Empty and null
//! documents (trailing separators, `--- ~`) are skipped.

use kube::api::DynamicObject;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while parsing rendered manifests
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document {index} is not valid YAML: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("document {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("document {index} is not a valid object: {message}")]
    InvalidObject { index: usize, message: String },
}

fn require_str(value: &serde_json::Value, pointer: &str) -> bool {
    value
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Parse manifest text into objects, preserving document order
pub fn parse_manifests(text: &str) -> Result<Vec<DynamicObject>, ParseError> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let yaml = serde_yaml::Value::deserialize(document)
            .map_err(|source| ParseError::Yaml { index, source })?;
        if yaml.is_null() {
            continue;
        }

        let json = serde_json::to_value(&yaml).map_err(|e| ParseError::InvalidObject {
            index,
            message: e.to_string(),
        })?;
        if !json.is_object() {
            return Err(ParseError::InvalidObject {
                index,
                message: "document is not a mapping".to_string(),
            });
        }
        for (pointer, field) in [
            ("/apiVersion", "apiVersion"),
            ("/kind", "kind"),
            ("/metadata/name", "metadata.name"),
        ] {
            if !require_str(&json, pointer) {
                return Err(ParseError::MissingField { index, field });
            }
        }

        let object: DynamicObject =
            serde_json::from_value(json).map_err(|e| ParseError::InvalidObject {
                index,
                message: e.to_string(),
            })?;
        objects.push(object);
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_OBJECTS: &str = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: demo
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: demo
spec:
  replicas: 1
";

    #[test]
    fn test_parse_preserves_order_and_types() {
        let objects = parse_manifests(TWO_OBJECTS).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "ServiceAccount");
        assert_eq!(objects[1].types.as_ref().unwrap().api_version, "apps/v1");
        assert_eq!(objects[1].data["spec"]["replicas"], 1);
    }

    #[test]
    fn test_null_documents_and_redundant_separators_are_skipped() {
        let noisy = format!("---\n---\n{TWO_OBJECTS}---\n~\n---\nnull\n---\n");
        assert_eq!(
            parse_manifests(&noisy).unwrap().len(),
            parse_manifests(TWO_OBJECTS).unwrap().len()
        );
        assert!(parse_manifests("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_documents_fail() {
        let err = parse_manifests("apiVersion: v1\nkind: [unclosed\n").unwrap_err();
        assert!(matches!(err, ParseError::Yaml { .. }));

        let err = parse_manifests("kind: ConfigMap\nmetadata:\n  name: x\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField {
                field: "apiVersion",
                ..
            }
        ));

        let err = parse_manifests("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidObject { index: 0, .. }));
    }
}

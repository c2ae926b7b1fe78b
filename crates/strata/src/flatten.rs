//! flattening of nested mappings into single-level settings
//!
//! `{"Common": {"Mode": "Prod"}}` flattened with separator `__` becomes `Common__Mode = Prod`.
//! Only objects are descended into; every other value is a leaf and is rendered with
//! [Value::render] (arrays therefore stay a single, opaque json setting).
use crate::value::{Mapping, Value};

/// A single flat key/value setting
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, derive_new::new)]
pub struct FlattenedSetting {
    pub key: String,
    pub value: String,
}

/// Flatten `mapping`, depth-first in source order
pub fn flatten(mapping: &Mapping, separator: &str) -> Vec<FlattenedSetting> {
    flatten_with_prefix(None, mapping, separator)
}

/// Flatten `mapping` with every key nested under `prefix`
///
/// An empty prefix behaves like no prefix at all.
pub fn flatten_with_prefix(
    prefix: Option<&str>,
    mapping: &Mapping,
    separator: &str,
) -> Vec<FlattenedSetting> {
    let mut settings = vec![];
    flatten_into(
        &mut settings,
        prefix.filter(|prefix| !prefix.is_empty()),
        mapping,
        separator,
    );
    settings
}

fn flatten_into(
    settings: &mut Vec<FlattenedSetting>,
    prefix: Option<&str>,
    mapping: &Mapping,
    separator: &str,
) {
    for (key, value) in mapping {
        let key = match prefix {
            Some(prefix) => format!("{prefix}{separator}{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(settings, Some(key.as_str()), nested, separator),
            leaf => {
                tracing::trace!(%key, "flattened setting");
                settings.push(FlattenedSetting::new(key, leaf.render()));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::parse_mapping;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(document: serde_json::Value) -> Mapping {
        parse_mapping(document).unwrap().expect("document must be an object")
    }

    fn pairs(settings: &[FlattenedSetting]) -> Vec<(&str, &str)> {
        settings
            .iter()
            .map(|setting| (setting.key.as_str(), setting.value.as_str()))
            .collect()
    }

    #[test]
    fn nested_keys_are_joined() {
        let settings = flatten(
            &mapping(json!({"Common": {"Mode": "Prod", "Retries": 3}})),
            "__",
        );
        assert_eq!(
            pairs(&settings),
            vec![("Common__Mode", "Prod"), ("Common__Retries", "3")]
        );
    }

    #[test]
    fn depth_first_in_source_order() {
        let settings = flatten(
            &mapping(json!({
                "b": {"y": {"deep": 1}, "x": 2},
                "a": 3.5,
                "c": {"z": true}
            })),
            ":",
        );
        assert_eq!(
            pairs(&settings),
            vec![("b:y:deep", "1"), ("b:x", "2"), ("a", "3.5"), ("c:z", "true")]
        );
    }

    #[test]
    fn flat_mapping_is_returned_as_is() {
        let source = mapping(json!({"Mode": "Prod", "Retries": 3, "Ratio": 0.25, "On": false}));
        let settings = flatten(&source, "__");
        let expected: Vec<_> = source
            .iter()
            .map(|(key, value)| FlattenedSetting::new(key.clone(), value.render()))
            .collect();
        assert_eq!(settings, expected);
    }

    #[test]
    fn null_leaf_is_empty_and_arrays_are_opaque() {
        let settings = flatten(
            &mapping(json!({"Group": {"Missing": null, "Hosts": ["a", "b"], "Empty": {}}})),
            "__",
        );
        assert_eq!(
            pairs(&settings),
            vec![("Group__Missing", ""), ("Group__Hosts", r#"["a","b"]"#)]
        );
    }

    #[test]
    fn prefix_is_prepended() {
        let source = mapping(json!({"Size": 64, "Theme": {"Dark": true}}));
        let settings = flatten_with_prefix(Some("ServiceIconsOptions"), &source, "__");
        assert_eq!(
            pairs(&settings),
            vec![
                ("ServiceIconsOptions__Size", "64"),
                ("ServiceIconsOptions__Theme__Dark", "true")
            ]
        );

        assert_eq!(flatten_with_prefix(Some(""), &source, "__"), flatten(&source, "__"));
    }

    #[test]
    fn one_setting_per_scalar_leaf() {
        let source = mapping(json!({
            "a": {"b": {"c": 1, "d": [1, 2]}, "e": null},
            "f": "g",
            "h": {}
        }));
        let settings = flatten(&source, ".");
        assert_eq!(settings.len(), 4);
        assert_eq!(
            settings.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            vec!["a.b.c", "a.b.d", "a.e", "f"]
        );
    }
}

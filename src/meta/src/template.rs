// Copyright 2026 The Feature Platform Coordinator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The SQL template resolver (C5, §4.5): rewrites `{{name.variant}}`
//! placeholders into quoted, provider-canonical identifiers, failing closed
//! on any unresolved reference.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// The mapping from `"<name>.<variant>"` to a provider-canonical table
/// identifier, as built by `mapNameVariantsToTables` (§4.5) over a
/// resource's dependency list.
pub type TableMapping = HashMap<String, String>;

/// Substitutes every `{{name.variant}}` occurrence in `template` with its
/// mapped identifier, double-quoted. Matching is exact and non-nested
/// (§4.5); any occurrence absent from `mapping` fails the whole resolution
/// rather than emitting a partial string.
pub fn resolve(template: &str, mapping: &TableMapping) -> Result<String, TemplateError> {
    let mut missing = None;
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let key = format!("{}.{}", &caps[1], &caps[2]);
        match mapping.get(&key) {
            Some(resolved) => {
                result.push_str(&template[last_end..whole.start()]);
                result.push('"');
                result.push_str(resolved);
                result.push('"');
                last_end = whole.end();
            }
            None => {
                missing = Some(key);
                break;
            }
        }
    }

    if let Some(key) = missing {
        return Err(TemplateError::UnresolvedReference(key));
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unresolved template reference: {0}")]
    UnresolvedReference(String),
}

impl From<TemplateError> for fpcoord_common::Error {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::UnresolvedReference(key) => fpcoord_common::Error::TemplateUnresolved(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_occurrence() {
        let template = "Some example text {{n1.v1}} and more {{n2.v2}}";
        let mapping: TableMapping = [
            ("n1.v1".to_string(), "replacement1".to_string()),
            ("n2.v2".to_string(), "replacement2".to_string()),
        ]
        .into_iter()
        .collect();

        let resolved = resolve(template, &mapping).unwrap();
        assert_eq!(
            resolved,
            r#"Some example text "replacement1" and more "replacement2""#
        );
    }

    #[test]
    fn errors_on_unresolved_reference_without_partial_output() {
        let template = "select * from {{n1.v1}} join {{n3.v3}}";
        let mapping: TableMapping = [("n1.v1".to_string(), "t1".to_string())].into_iter().collect();

        let err = resolve(template, &mapping).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedReference(k) if k == "n3.v3"));
    }

    #[test]
    fn template_with_no_placeholders_is_returned_unchanged() {
        let template = "select * from orders";
        let mapping = TableMapping::new();
        assert_eq!(resolve(template, &mapping).unwrap(), template);
    }

    #[test]
    fn nested_braces_are_not_supported_and_do_not_match() {
        let template = "{{ {{n1.v1}} }}";
        let mapping: TableMapping = [("n1.v1".to_string(), "t1".to_string())].into_iter().collect();
        // The inner `{{n1.v1}}` still matches; the outer braces are left as
        // literal text since the grammar has no nesting concept (§4.5).
        let resolved = resolve(template, &mapping).unwrap();
        assert_eq!(resolved, "{{ \"t1\" }}");
    }
}

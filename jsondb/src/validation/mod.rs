use crate::document::{indexed_value, max_id, Document};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Result of checking a collection against its unique indexes
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub documents: usize,
    pub fields: Vec<FieldReport>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Per-field counts gathered during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    pub field: String,
    /// Documents carrying a non-null value for the field
    pub present: usize,
    pub distinct: usize,
}

impl FieldReport {
    pub fn is_unique(&self) -> bool {
        self.present == self.distinct
    }
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// First field whose values are no longer unique.
    pub fn first_violation(&self) -> Option<&FieldReport> {
        self.fields.iter().find(|f| !f.is_unique())
    }
}

/// Re-scan `documents` and count distinct values for every unique field.
/// Documents without a value for a field are reported as warnings; they do
/// not break uniqueness.
pub fn check_unique_fields(
    fields: &BTreeSet<String>,
    documents: &[Document],
    counter: Option<i64>,
) -> ValidationResult {
    let mut result = ValidationResult {
        documents: documents.len(),
        ..Default::default()
    };

    for field in fields {
        let mut seen: Vec<&Value> = Vec::new();
        let mut present = 0;

        for doc in documents {
            if let Some(value) = indexed_value(doc, field) {
                present += 1;
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
        }

        let report = FieldReport {
            field: field.clone(),
            present,
            distinct: seen.len(),
        };

        if !report.is_unique() {
            result.errors.push(format!(
                "Unique field '{field}' has {} duplicate value(s)",
                present - seen.len()
            ));
        }

        let missing = documents.len() - present;
        if missing > 0 {
            result.warnings.push(format!(
                "{missing} document(s) have no value for unique field '{field}'"
            ));
        }

        result.fields.push(report);
    }

    if let (Some(counter), Some(max)) = (counter, max_id(documents)) {
        if counter < max {
            result.warnings.push(format!(
                "Id counter {counter} is behind the largest _id {max}; run reindex"
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use serde_json::json;

    fn fields(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_collection() {
        let docs = vec![
            doc(json!({ "url": "https://a.example" })),
            doc(json!({ "url": "https://b.example" })),
        ];
        let result = check_unique_fields(&fields(&["url"]), &docs, None);
        assert!(result.is_ok());
        assert!(!result.has_warnings());
        assert_eq!(result.documents, 2);
        assert_eq!(
            result.fields,
            vec![FieldReport {
                field: "url".into(),
                present: 2,
                distinct: 2
            }]
        );
    }

    #[test]
    fn test_duplicate_values_are_errors() {
        let docs = vec![
            doc(json!({ "title": "todo" })),
            doc(json!({ "title": "todo" })),
            doc(json!({ "title": "done" })),
        ];
        let result = check_unique_fields(&fields(&["title"]), &docs, None);
        assert!(!result.is_ok());
        let violation = result.first_violation().unwrap();
        assert_eq!(violation.field, "title");
        assert_eq!(violation.distinct, 2);
        assert_eq!(violation.present, 3);
    }

    #[test]
    fn test_missing_values_are_warnings() {
        let docs = vec![
            doc(json!({ "title": "a" })),
            doc(json!({ "body": "no title" })),
            doc(json!({ "title": null })),
        ];
        let result = check_unique_fields(&fields(&["title"]), &docs, None);
        assert!(result.is_ok());
        assert!(result.has_warnings());
        assert!(result.warnings[0].contains("2 document(s)"));
    }

    #[test]
    fn test_counter_behind_data() {
        let docs = vec![doc(json!({ "_id": 7 }))];
        let result = check_unique_fields(&fields(&["_id"]), &docs, Some(3));
        assert!(result.is_ok());
        assert!(result.warnings.iter().any(|w| w.contains("reindex")));
    }
}

//! Predicate selection, positional lookup and text filters.

use crate::document::{get_field, indexed_value, Document};
use crate::error::{JsonDbError, Result};
use regex::Regex;
use serde_json::Value;

/// Documents matching `predicate`, in collection order.
pub fn select<P>(documents: &[Document], predicate: P) -> Vec<Document>
where
    P: Fn(&Document) -> bool,
{
    documents.iter().filter(|d| predicate(d)).cloned().collect()
}

/// Matching documents paired with their position in the collection.
pub fn select_with_position<P>(documents: &[Document], predicate: P) -> Vec<(usize, Document)>
where
    P: Fn(&Document) -> bool,
{
    documents
        .iter()
        .enumerate()
        .filter(|(_, d)| predicate(d))
        .map(|(pos, d)| (pos, d.clone()))
        .collect()
}

/// Positions of matching documents, ascending.
pub fn positions<P>(documents: &[Document], predicate: P) -> Vec<usize>
where
    P: Fn(&Document) -> bool,
{
    documents
        .iter()
        .enumerate()
        .filter(|(_, d)| predicate(d))
        .map(|(pos, _)| pos)
        .collect()
}

/// A predicate built from data rather than code, for callers that take
/// filters from the command line.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    /// String field matches the regex
    Matches(String, Regex),
    /// String field contains the text, or array field contains it as an element
    Contains(String, String),
    /// Array field holds every listed value (tag filtering)
    ContainsAll(String, Vec<Value>),
    Exists(String),
    Missing(String),
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
}

const OPERATORS: [&str; 4] = ["!=", "*=", "=", "~"];

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains_all<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::ContainsAll(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => get_field(doc, field) == Some(value),
            Filter::Ne(field, value) => get_field(doc, field) != Some(value),
            Filter::Matches(field, re) => get_field(doc, field)
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)),
            Filter::Contains(field, needle) => match get_field(doc, field) {
                Some(Value::String(s)) => s.contains(needle.as_str()),
                Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(needle.as_str())),
                _ => false,
            },
            Filter::ContainsAll(field, wanted) => match get_field(doc, field) {
                Some(Value::Array(items)) => wanted.iter().all(|w| items.contains(w)),
                _ => false,
            },
            Filter::Exists(field) => indexed_value(doc, field).is_some(),
            Filter::Missing(field) => indexed_value(doc, field).is_none(),
            Filter::All(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Any(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }

    /// Turn the filter into a closure usable with `Collection::find` and friends.
    pub fn into_predicate(self) -> impl Fn(&Document) -> bool {
        move |doc| self.matches(doc)
    }

    /// Parse a single clause:
    ///
    /// - `field=value` / `field!=value` (value is read as JSON, falling back to a string)
    /// - `field*=text` substring or element match
    /// - `field~regex`
    /// - `field?` present, `!field?` missing
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(JsonDbError::InvalidPredicate(
                "empty filter expression".into(),
            ));
        }

        let Some((pos, op)) = find_operator(expr) else {
            return match expr.strip_suffix('?') {
                Some(field) => match field.strip_prefix('!') {
                    Some(field) => Ok(Filter::Missing(parse_field(field, expr)?)),
                    None => Ok(Filter::Exists(parse_field(field, expr)?)),
                },
                None => Err(JsonDbError::InvalidPredicate(format!(
                    "expected field=value, field!=value, field*=text, field~regex, field? or !field? in '{expr}'"
                ))),
            };
        };
        let field = parse_field(&expr[..pos], expr)?;
        let raw = &expr[pos + op.len()..];

        match op {
            "=" => Ok(Filter::Eq(field, parse_value(raw))),
            "!=" => Ok(Filter::Ne(field, parse_value(raw))),
            "*=" => Ok(Filter::Contains(field, raw.to_string())),
            _ => {
                let re = Regex::new(raw).map_err(|e| {
                    JsonDbError::InvalidPredicate(format!("bad regex in '{expr}': {e}"))
                })?;
                Ok(Filter::Matches(field, re))
            }
        }
    }

    /// Parse several clauses and require all of them. No clauses match everything.
    pub fn parse_all<S: AsRef<str>>(exprs: &[S]) -> Result<Self> {
        let filters = exprs
            .iter()
            .map(|e| Filter::parse(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(match filters.len() {
            1 => filters.into_iter().next().unwrap_or(Filter::All(Vec::new())),
            _ => Filter::All(filters),
        })
    }
}

fn find_operator(expr: &str) -> Option<(usize, &'static str)> {
    expr.char_indices().find_map(|(pos, _)| {
        OPERATORS
            .iter()
            .find(|op| expr[pos..].starts_with(*op))
            .map(|op| (pos, *op))
    })
}

fn parse_field(raw: &str, expr: &str) -> Result<String> {
    let field = raw.trim();
    if field.is_empty() {
        return Err(JsonDbError::InvalidPredicate(format!(
            "missing field name in '{expr}'"
        )));
    }
    Ok(field.to_string())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn notes() -> Vec<Document> {
        vec![
            doc(json!({ "title": "groceries", "tags": ["home", "todo"], "priority": 2 })),
            doc(json!({ "title": "taxes", "tags": ["todo"], "priority": 1 })),
            doc(json!({ "title": "ideas", "tags": ["home"] })),
        ]
    }

    #[test]
    fn test_select_respects_order() {
        let docs = notes();
        let found = select(&docs, |d| d.contains_key("priority"));
        assert_eq!(found, docs[..2].to_vec());
        assert!(select(&docs, |_| false).is_empty());
    }

    #[test]
    fn test_select_with_position() {
        let docs = notes();
        let found = select_with_position(&docs, |d| d["title"] != json!("taxes"));
        let found_positions: Vec<usize> = found.iter().map(|(p, _)| *p).collect();
        assert_eq!(found_positions, vec![0, 2]);
        assert_eq!(found[1].1, docs[2]);
        assert_eq!(positions(&docs, |_| true), vec![0, 1, 2]);
    }

    #[test]
    fn test_contains_all_tags() {
        let docs = notes();
        let f = Filter::contains_all("tags", ["home", "todo"]);
        assert_eq!(select(&docs, f.into_predicate()), vec![docs[0].clone()]);
    }

    #[test]
    fn test_parse_eq_reads_json_values() {
        let docs = notes();
        let f = Filter::parse("priority=1").unwrap();
        assert_eq!(select(&docs, |d| f.matches(d)), vec![docs[1].clone()]);

        let f = Filter::parse("title=ideas").unwrap();
        assert_eq!(select(&docs, |d| f.matches(d)), vec![docs[2].clone()]);
    }

    #[test]
    fn test_parse_operators() {
        let docs = notes();
        let count = |expr: &str| {
            let f = Filter::parse(expr).unwrap();
            select(&docs, |d| f.matches(d)).len()
        };

        assert_eq!(count("title!=taxes"), 2);
        assert_eq!(count("title*=ea"), 1);
        assert_eq!(count("tags*=home"), 2);
        assert_eq!(count("title~^t"), 1);
        assert_eq!(count("priority?"), 2);
        assert_eq!(count("!priority?"), 1);
        assert_eq!(count("title=what?"), 0);
    }

    #[test]
    fn test_parse_all_and_nested_fields() {
        let docs = vec![
            doc(json!({ "author": { "name": "Ada" }, "year": 1843 })),
            doc(json!({ "author": { "name": "Alan" }, "year": 1936 })),
        ];
        let f = Filter::parse_all(&["author.name~^A", "year!=1843"]).unwrap();
        assert_eq!(select(&docs, f.into_predicate()), vec![docs[1].clone()]);

        let everything = Filter::parse_all::<&str>(&[]).unwrap();
        assert_eq!(select(&docs, everything.into_predicate()).len(), 2);
    }

    #[test]
    fn test_not_and_any() {
        let docs = notes();
        let f = Filter::Not(Box::new(Filter::Any(vec![
            Filter::eq("title", "taxes"),
            Filter::eq("title", "ideas"),
        ])));
        assert_eq!(select(&docs, f.into_predicate()), vec![docs[0].clone()]);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "   ", "title", "=value", "?", "!?", "title~("] {
            assert!(
                matches!(Filter::parse(bad), Err(JsonDbError::InvalidPredicate(_))),
                "expected InvalidPredicate for {bad:?}"
            );
        }
    }
}

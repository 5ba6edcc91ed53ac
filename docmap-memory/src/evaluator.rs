//! Filter document evaluation for in-memory document filtering.
//!
//! This module evaluates MongoDB-style filter documents against stored documents and
//! provides the value ordering used for sorting and comparisons.
//!
//! Supported operators:
//!
//! - Logical: `$and`, `$or`, `$nor`, `$not`
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`
//! - Element: `$exists`
//! - String: `$regex` with `$options` (`i`, `m`, `s`, `x`)
//! - Array: `$all`, `$size`
//!
//! Field names may be dotted paths (`address.city`, `tags.0`). An equality condition on
//! an array field matches when any element is equal, as in MongoDB.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid};
use regex::{Regex, RegexBuilder};

use docmap_core::error::{DocumentStoreError, DocumentStoreResult};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or missing value
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Object identifier
    ObjectId(oid::ObjectId),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Any other BSON value, compared structurally
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Rank of the value's type in the BSON comparison order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    /// Total order across all values: by type rank first, then by value.
    ///
    /// Used for sorting and for `$min`/`$max`; filter comparisons only match values of the
    /// same type and use [`PartialOrd`] instead.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| match (self, other) {
                (Comparable::Array(a), Comparable::Array(b)) => a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len())),
                _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
            })
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Compares two BSON values in BSON comparison order.
pub(crate) fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    Comparable::from(left).total_cmp(&Comparable::from(right))
}

/// Returns `true` if the two values are equal under numeric normalization.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted field path inside a document.
///
/// Numeric path segments index into arrays.
pub(crate) fn resolve_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Sorts documents in place by a sort spec (`{ field: 1 | -1, ... }`), keys in order.
///
/// Missing fields sort as null. The sort is stable.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) -> DocumentStoreResult<()> {
    let keys = sort
        .iter()
        .map(|(field, direction)| {
            let descending = match direction {
                Bson::Int32(value) => *value < 0,
                Bson::Int64(value) => *value < 0,
                Bson::Double(value) => *value < 0.0,
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "invalid sort direction for {field}: {other}"
                    )))
                }
            };
            Ok((field.as_str(), descending))
        })
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(field, descending)| {
                let left = resolve_path(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
                let right = resolve_path(b, field).map(Comparable::from).unwrap_or(Comparable::Null);
                let ordering = left.total_cmp(&right);

                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(())
}


pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies `filter`. An empty filter matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for unsupported or malformed operators.
    pub fn matches(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(key, condition)?,
                "$or" => self.any(key, condition)?,
                "$nor" => !self.any(key, condition)?,
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported top-level query operator {op}"
                    )))
                }
                field => self.matches_field(resolve_path(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        filter: &Document,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn clauses<'f>(op: &str, condition: &'f Bson) -> DocumentStoreResult<Vec<&'f Document>> {
        match condition {
            Bson::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| {
                    item.as_document().ok_or_else(|| {
                        DocumentStoreError::InvalidDocument(format!("{op} entries must be documents"))
                    })
                })
                .collect(),
            _ => Err(DocumentStoreError::InvalidDocument(format!(
                "{op} requires a non-empty array"
            ))),
        }
    }

    fn all(&self, op: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        for clause in Self::clauses(op, condition)? {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, op: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        for clause in Self::clauses(op, condition)? {
            if self.matches(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn matches_field(&self, value: Option<&Bson>, condition: &Bson) -> DocumentStoreResult<bool> {
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => Self::matches_operators(value, ops),
            Bson::RegularExpression(regex) => {
                let regex = build_regex(regex.pattern.as_str(), regex.options.as_str())?;
                Ok(matches_regex(value, &regex))
            }
            _ => Ok(matches_eq(value, condition)),
        }
    }

    fn matches_operators(value: Option<&Bson>, ops: &Document) -> DocumentStoreResult<bool> {
        for (op, operand) in ops {
            let matched = match op.as_str() {
                "$eq" => matches_eq(value, operand),
                "$ne" => !matches_eq(value, operand),
                "$gt" => matches_cmp(value, operand, Ordering::is_gt),
                "$gte" => matches_cmp(value, operand, Ordering::is_ge),
                "$lt" => matches_cmp(value, operand, Ordering::is_lt),
                "$lte" => matches_cmp(value, operand, Ordering::is_le),
                "$in" => operand_array(op, operand)?
                    .iter()
                    .any(|candidate| matches_eq(value, candidate)),
                "$nin" => !operand_array(op, operand)?
                    .iter()
                    .any(|candidate| matches_eq(value, candidate)),
                "$exists" => value.is_some() == is_truthy(operand),
                "$all" => match value {
                    Some(Bson::Array(items)) => operand_array(op, operand)?
                        .iter()
                        .all(|wanted| items.iter().any(|item| values_equal(item, wanted))),
                    _ => false,
                },
                "$size" => match (value, operand.as_i64().or_else(|| operand.as_i32().map(i64::from))) {
                    (Some(Bson::Array(items)), Some(size)) => items.len() as i64 == size,
                    (_, None) => {
                        return Err(DocumentStoreError::InvalidDocument("$size requires an integer".into()))
                    }
                    _ => false,
                },
                "$regex" => {
                    let options = ops.get_str("$options").unwrap_or("");
                    let regex = match operand {
                        Bson::String(pattern) => build_regex(pattern, options)?,
                        Bson::RegularExpression(regex) => build_regex(regex.pattern.as_str(), regex.options.as_str())?,
                        _ => return Err(DocumentStoreError::InvalidDocument("$regex requires a string".into())),
                    };
                    matches_regex(value, &regex)
                }
                "$options" => true,
                "$not" => match operand {
                    Bson::Document(inner) if is_operator_document(inner) => !Self::matches_operators(value, inner)?,
                    Bson::RegularExpression(regex) => {
                        !matches_regex(value, &build_regex(regex.pattern.as_str(), regex.options.as_str())?)
                    }
                    _ => {
                        return Err(DocumentStoreError::InvalidDocument(
                            "$not requires an operator document or a regex".into(),
                        ))
                    }
                },
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported query operator {other}"
                    )))
                }
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn operand_array<'b>(op: &str, operand: &'b Bson) -> DocumentStoreResult<&'b Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{op} requires an array")))
}

/// Returns `false` for `false`, null and numeric zero, `true` otherwise.
pub(crate) fn is_truthy(value: &Bson) -> bool {
    match Comparable::from(value) {
        Comparable::Null => false,
        Comparable::Bool(value) => value,
        Comparable::Number(value) => value != 0.0,
        _ => true,
    }
}

/// Equality with MongoDB's array semantics: an array field matches if it equals the
/// operand or contains an element equal to it. A missing field equals null.
fn matches_eq(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(value) => {
            values_equal(value, operand)
                || matches!(value, Bson::Array(items) if items.iter().any(|item| values_equal(item, operand)))
        }
    }
}

/// Ordered comparison; only values of the same type compare.
fn matches_cmp(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let compare = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&Comparable::from(operand))
            .is_some_and(accept)
    };

    match value {
        Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => items.iter().any(compare),
        Some(value) => compare(value),
        None => false,
    }
}

fn build_regex(pattern: &str, options: &str) -> DocumentStoreResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|err| DocumentStoreError::InvalidDocument(format!("invalid regex {pattern}: {err}")))
}

fn matches_regex(value: Option<&Bson>, regex: &Regex) -> bool {
    match value {
        Some(Bson::String(text)) => regex.is_match(text),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::new(document).matches(&filter).unwrap()
    }

    fn sample() -> Document {
        doc! {
            "_id": oid::ObjectId::new(),
            "name": "world",
            "value": "Hello",
            "count": 3,
            "tags": ["a", "b"],
            "address": { "city": "Oslo" },
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&sample(), doc! {}));
    }

    #[test]
    fn equality_normalizes_numbers() {
        let document = sample();

        assert!(matches(&document, doc! { "count": 3i64 }));
        assert!(matches(&document, doc! { "count": 3.0 }));
        assert!(!matches(&document, doc! { "count": 4 }));
    }

    #[test]
    fn equality_matches_array_elements() {
        let document = sample();

        assert!(matches(&document, doc! { "tags": "a" }));
        assert!(matches(&document, doc! { "tags": ["a", "b"] }));
        assert!(!matches(&document, doc! { "tags": "c" }));
    }

    #[test]
    fn null_matches_missing_field() {
        assert!(matches(&sample(), doc! { "missing": Bson::Null }));
        assert!(!matches(&sample(), doc! { "name": Bson::Null }));
    }

    #[test]
    fn dotted_paths_descend() {
        let document = sample();

        assert!(matches(&document, doc! { "address.city": "Oslo" }));
        assert!(matches(&document, doc! { "tags.1": "b" }));
        assert!(!matches(&document, doc! { "address.zip": { "$exists": true } }));
    }

    #[test]
    fn object_ids_compare_by_value() {
        let id = oid::ObjectId::new();
        let document = doc! { "_id": id };

        assert!(matches(&document, doc! { "_id": id }));
        assert!(!matches(&document, doc! { "_id": oid::ObjectId::new() }));
    }

    #[test]
    fn comparison_operators() {
        let document = sample();

        assert!(matches(&document, doc! { "count": { "$gt": 2, "$lte": 3 } }));
        assert!(!matches(&document, doc! { "count": { "$lt": 3 } }));
        // values of different types never compare
        assert!(!matches(&document, doc! { "count": { "$gt": "2" } }));
    }

    #[test]
    fn membership_operators() {
        let document = sample();

        assert!(matches(&document, doc! { "name": { "$in": ["world", "moon"] } }));
        assert!(matches(&document, doc! { "name": { "$nin": ["moon"] } }));
        assert!(matches(&document, doc! { "tags": { "$all": ["b", "a"] } }));
        assert!(matches(&document, doc! { "tags": { "$size": 2 } }));
    }

    #[test]
    fn logical_operators() {
        let document = sample();

        assert!(matches(&document, doc! { "$or": [{ "name": "moon" }, { "value": "Hello" }] }));
        assert!(!matches(&document, doc! { "$and": [{ "name": "world" }, { "value": "Bye" }] }));
        assert!(matches(&document, doc! { "$nor": [{ "name": "moon" }] }));
        assert!(matches(&document, doc! { "count": { "$not": { "$gt": 5 } } }));
    }

    #[test]
    fn regex_honours_options() {
        let document = sample();

        assert!(matches(&document, doc! { "name": { "$regex": "^WOR", "$options": "i" } }));
        assert!(!matches(&document, doc! { "name": { "$regex": "^WOR" } }));
        assert!(matches(&document, doc! { "tags": { "$regex": "^b$" } }));
    }

    #[test]
    fn regular_expression_values_filter() {
        let document = sample();
        let regex = |pattern: &str, options: &str| {
            Bson::RegularExpression(bson::Regex {
                pattern: pattern.try_into().unwrap(),
                options: options.try_into().unwrap(),
            })
        };

        assert!(matches(&document, doc! { "name": regex("^WOR", "i") }));
        assert!(!matches(&document, doc! { "name": regex("^WOR", "") }));
        assert!(matches(&document, doc! { "value": { "$regex": regex("^hel", "i") } }));
        assert!(matches(&document, doc! { "value": { "$not": regex("^Bye", "") } }));
        assert!(!matches(&document, doc! { "name": { "$not": regex("orl", "") } }));
    }

    #[test]
    fn unsupported_operator_is_an_error() {
        let document = sample();

        assert!(matches!(
            DocumentEvaluator::new(&document).matches(&doc! { "name": { "$where": "1" } }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            DocumentEvaluator::new(&document).matches(&doc! { "$text": { "$search": "x" } }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn sort_is_multi_key_and_stable() {
        let mut documents = vec![
            doc! { "n": 1, "g": "b" },
            doc! { "n": 2, "g": "a" },
            doc! { "n": 3, "g": "b" },
            doc! { "n": 4 },
        ];

        sort_documents(&mut documents, &doc! { "g": -1, "n": 1 }).unwrap();

        let order = documents
            .iter()
            .map(|d| d.get_i32("n").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(order, vec![1, 3, 2, 4]);
    }
}

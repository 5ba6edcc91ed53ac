//! Aggregation pipeline execution for the in-memory backend.
//!
//! Stages run in order over a snapshot of the collection:
//!
//! - `$match` - filter documents with the [evaluator](crate::evaluator)
//! - `$group` - group by an `_id` expression with `$sum`, `$avg`, `$min`, `$max`, `$first`,
//!   `$last`, `$push`, `$addToSet` and `$count` accumulators
//! - `$sort` - order documents by a sort spec
//! - `$redact` - keep or prune whole documents by a `$$KEEP` / `$$PRUNE` expression
//! - `$limit`, `$skip`
//!
//! Expressions support field paths (`"$field.sub"`), `$$ROOT`, the redaction variables,
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$and`, `$or`, `$not`, `$in`, `$cond` and
//! `$literal`. `$$DESCEND` keeps the document as a whole; embedded documents are not redacted
//! individually.

use std::cmp::Ordering;
use bson::{Bson, Document};
use tracing::trace;

use docmap_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{REDACT_KEEP, REDACT_PRUNE},
};

use crate::evaluator::{DocumentEvaluator, compare_values, is_truthy, resolve_path, sort_documents, values_equal};

const REDACT_DESCEND: &str = "$$DESCEND";

fn unsupported(what: &str) -> DocumentStoreError {
    DocumentStoreError::Backend(format!("unsupported aggregation {what} in the in-memory store"))
}

fn malformed(what: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(what.into())
}

/// Runs `pipeline` over `documents` and returns the result documents.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> DocumentStoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(malformed("an aggregation stage must have exactly one field")),
        };

        trace!(stage = %name, input = documents.len(), "running aggregation stage");

        documents = match name.as_str() {
            "$match" => DocumentEvaluator::filter_documents(&documents, stage_document(name, spec)?)?,
            "$group" => group(documents, stage_document(name, spec)?)?,
            "$sort" => {
                sort_documents(&mut documents, stage_document(name, spec)?)?;
                documents
            }
            "$redact" => redact(documents, spec)?,
            "$limit" => {
                let limit = stage_count(name, spec)?;
                documents.into_iter().take(limit).collect()
            }
            "$skip" => {
                let skip = stage_count(name, spec)?;
                documents.into_iter().skip(skip).collect()
            }
            other => return Err(unsupported(&format!("stage {other}"))),
        };
    }

    Ok(documents)
}

fn stage_document<'s>(name: &str, spec: &'s Bson) -> DocumentStoreResult<&'s Document> {
    spec.as_document()
        .ok_or_else(|| malformed(format!("{name} requires a document")))
}

fn stage_count(name: &str, spec: &Bson) -> DocumentStoreResult<usize> {
    match spec {
        Bson::Int32(value) if *value >= 0 => Ok(*value as usize),
        Bson::Int64(value) if *value >= 0 => Ok(*value as usize),
        _ => Err(malformed(format!("{name} requires a non-negative integer"))),
    }
}

fn redact(documents: Vec<Document>, expression: &Bson) -> DocumentStoreResult<Vec<Document>> {
    let mut kept = Vec::with_capacity(documents.len());

    for document in documents {
        match evaluate(&document, expression)? {
            Bson::String(decision) if decision == REDACT_KEEP || decision == REDACT_DESCEND => kept.push(document),
            Bson::String(decision) if decision == REDACT_PRUNE => {}
            other => {
                return Err(malformed(format!(
                    "$redact must resolve to $$KEEP, $$PRUNE or $$DESCEND, got {other}"
                )))
            }
        }
    }

    Ok(kept)
}

/// Running state of one `$group` accumulator.
#[derive(Debug)]
enum Accumulator {
    Sum(NumericSum),
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

/// A sum that stays integral until a double is added or the integer total overflows.
#[derive(Debug, Default)]
struct NumericSum {
    int: i64,
    float: f64,
    is_float: bool,
    is_wide: bool,
}

impl NumericSum {
    fn add(&mut self, value: &Bson) {
        match value {
            Bson::Int32(value) => self.add_int(i64::from(*value)),
            Bson::Int64(value) => {
                self.add_int(*value);
                self.is_wide = true;
            }
            Bson::Double(value) => {
                self.float += *value;
                self.is_float = true;
            }
            _ => {}
        }
    }

    fn add_int(&mut self, value: i64) {
        if self.is_float {
            self.float += value as f64;
            return;
        }

        match self.int.checked_add(value) {
            Some(total) => self.int = total,
            None => {
                self.float = self.int as f64 + value as f64;
                self.int = 0;
                self.is_float = true;
            }
        }
    }

    fn result(&self) -> Bson {
        if self.is_float {
            Bson::Double(self.float + self.int as f64)
        } else if self.is_wide {
            Bson::Int64(self.int)
        } else {
            i32::try_from(self.int)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(self.int))
        }
    }
}

/// Replaces `current` when `value` orders `better` than it. Nulls and missing values are ignored.
fn keep_extreme(current: &mut Option<Bson>, value: Option<Bson>, better: fn(Ordering) -> bool) {
    let Some(value) = value.filter(|value| !matches!(value, Bson::Null)) else {
        return;
    };

    if current
        .as_ref()
        .is_none_or(|existing| better(compare_values(&value, existing)))
    {
        *current = Some(value);
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

impl Accumulator {
    fn new(op: &str) -> DocumentStoreResult<Self> {
        Ok(match op {
            "$sum" | "$count" => Accumulator::Sum(NumericSum::default()),
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            other => return Err(unsupported(&format!("accumulator {other}"))),
        })
    }

    /// Folds one input. `value` is `None` when the expression hit a missing field.
    fn add(&mut self, value: Option<Bson>) {
        match self {
            Accumulator::Sum(sum) => {
                if let Some(value) = value {
                    sum.add(&value);
                }
            }
            Accumulator::Avg { total, count } => {
                if let Some(number) = value.as_ref().and_then(as_number) {
                    *total += number;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => keep_extreme(current, value, Ordering::is_lt),
            Accumulator::Max(current) => keep_extreme(current, value, Ordering::is_gt),
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value.unwrap_or(Bson::Null));
                }
            }
            Accumulator::Last(current) => *current = value.unwrap_or(Bson::Null),
            Accumulator::Push(items) => items.extend(value),
            Accumulator::AddToSet(items) => {
                if let Some(value) = value {
                    if !items.iter().any(|item| values_equal(item, &value)) {
                        items.push(value);
                    }
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum(sum) => sum.result(),
            Accumulator::Avg { total, count } => match count {
                0 => Bson::Null,
                count => Bson::Double(total / count as f64),
            },
            Accumulator::Min(value) | Accumulator::Max(value) => value.unwrap_or(Bson::Null),
            Accumulator::First(value) => value.unwrap_or(Bson::Null),
            Accumulator::Last(value) => value,
            Accumulator::Push(items) | Accumulator::AddToSet(items) => Bson::Array(items),
        }
    }
}

/// One output field of a `$group` stage.
struct GroupField<'s> {
    name: &'s str,
    op: &'s str,
    expression: &'s Bson,
}

fn group(documents: Vec<Document>, spec: &Document) -> DocumentStoreResult<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| malformed("$group requires an _id expression"))?;

    let fields = spec
        .iter()
        .filter(|(name, _)| name.as_str() != "_id")
        .map(|(name, accumulator)| {
            let mut entries = accumulator
                .as_document()
                .map(|doc| doc.iter())
                .into_iter()
                .flatten();

            match (entries.next(), entries.next()) {
                (Some((op, expression)), None) => Ok(GroupField { name, op, expression }),
                _ => Err(malformed(format!("$group field {name} must be a single accumulator"))),
            }
        })
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    // groups keep first-seen order
    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();

    for document in &documents {
        let key = evaluate(document, key_expression)?;
        let index = match groups.iter().position(|(existing, _)| values_equal(existing, &key)) {
            Some(index) => index,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|field| Accumulator::new(field.op))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };

        for (field, accumulator) in fields.iter().zip(groups[index].1.iter_mut()) {
            let value = match field.op {
                "$count" => Some(Bson::Int32(1)),
                _ => evaluate_optional(document, field.expression)?,
            };
            accumulator.add(value);
        }
    }

    Ok(
        groups
            .into_iter()
            .map(|(key, accumulators)| {
                let mut output = Document::new();
                output.insert("_id", key);

                for (field, accumulator) in fields.iter().zip(accumulators) {
                    output.insert(field.name, accumulator.finish());
                }

                output
            })
            .collect()
    )
}

/// Like [`evaluate`], but reports a bare field path that resolves to nothing as `None`.
fn evaluate_optional(document: &Document, expression: &Bson) -> DocumentStoreResult<Option<Bson>> {
    match expression {
        Bson::String(path) if path.starts_with('$') && !path.starts_with("$$") => {
            Ok(resolve_path(document, &path[1..]).cloned())
        }
        _ => evaluate(document, expression).map(Some),
    }
}

/// Evaluates an aggregation expression against one document.
pub(crate) fn evaluate(document: &Document, expression: &Bson) -> DocumentStoreResult<Bson> {
    match expression {
        Bson::String(variable) if variable.starts_with("$$") => match variable.as_str() {
            "$$ROOT" | "$$CURRENT" => Ok(Bson::Document(document.clone())),
            REDACT_KEEP | REDACT_PRUNE | REDACT_DESCEND => Ok(expression.clone()),
            other => Err(unsupported(&format!("variable {other}"))),
        },
        Bson::String(path) if path.starts_with('$') => Ok(
            resolve_path(document, &path[1..])
                .cloned()
                .unwrap_or(Bson::Null)
        ),
        Bson::Array(items) => items
            .iter()
            .map(|item| evaluate(document, item))
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(Bson::Array),
        Bson::Document(spec) => match spec.keys().next() {
            Some(op) if op.starts_with('$') => {
                if spec.len() != 1 {
                    return Err(malformed(format!("expression {op} must be the only field of its document")));
                }
                let operand = spec.get(op).unwrap_or(&Bson::Null);
                evaluate_operator(document, op, operand)
            }
            _ => spec
                .iter()
                .map(|(name, value)| Ok((name.clone(), evaluate(document, value)?)))
                .collect::<DocumentStoreResult<Document>>()
                .map(Bson::Document),
        },
        literal => Ok(literal.clone()),
    }
}

fn arguments<'e>(op: &str, operand: &'e Bson, arity: usize) -> DocumentStoreResult<&'e [Bson]> {
    match operand {
        Bson::Array(items) if items.len() == arity => Ok(items),
        _ => Err(malformed(format!("{op} takes {arity} arguments"))),
    }
}

fn evaluate_operator(document: &Document, op: &str, operand: &Bson) -> DocumentStoreResult<Bson> {
    let compare = |accept: fn(Ordering) -> bool| -> DocumentStoreResult<Bson> {
        let args = arguments(op, operand, 2)?;
        let left = evaluate(document, &args[0])?;
        let right = evaluate(document, &args[1])?;

        Ok(Bson::Boolean(accept(compare_values(&left, &right))))
    };

    match op {
        "$eq" => compare(Ordering::is_eq),
        "$ne" => compare(Ordering::is_ne),
        "$gt" => compare(Ordering::is_gt),
        "$gte" => compare(Ordering::is_ge),
        "$lt" => compare(Ordering::is_lt),
        "$lte" => compare(Ordering::is_le),
        "$and" | "$or" => {
            let items = operand
                .as_array()
                .ok_or_else(|| malformed(format!("{op} requires an array")))?;
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                results.push(is_truthy(&evaluate(document, item)?));
            }

            Ok(Bson::Boolean(match op {
                "$and" => results.iter().all(|result| *result),
                _ => results.iter().any(|result| *result),
            }))
        }
        "$not" => {
            let argument = match operand {
                Bson::Array(items) => arguments(op, operand, 1).map(|_| &items[0])?,
                other => other,
            };

            Ok(Bson::Boolean(!is_truthy(&evaluate(document, argument)?)))
        }
        "$in" => {
            let args = arguments(op, operand, 2)?;
            let needle = evaluate(document, &args[0])?;

            match evaluate(document, &args[1])? {
                Bson::Array(haystack) => Ok(Bson::Boolean(
                    haystack.iter().any(|item| values_equal(item, &needle))
                )),
                _ => Err(malformed("$in requires an array as its second argument")),
            }
        }
        "$cond" => {
            let (condition, then, otherwise) = match operand {
                Bson::Array(_) => {
                    let args = arguments(op, operand, 3)?;
                    (&args[0], &args[1], &args[2])
                }
                Bson::Document(branches) => match (branches.get("if"), branches.get("then"), branches.get("else")) {
                    (Some(condition), Some(then), Some(otherwise)) => (condition, then, otherwise),
                    _ => return Err(malformed("$cond requires if, then and else")),
                },
                _ => return Err(malformed("$cond requires an array or a document")),
            };

            if is_truthy(&evaluate(document, condition)?) {
                evaluate(document, then)
            } else {
                evaluate(document, otherwise)
            }
        }
        "$literal" => Ok(operand.clone()),
        other => Err(unsupported(&format!("expression {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn greetings() -> Vec<Document> {
        vec![
            doc! { "name": "world", "value": "Hello", "n": 1 },
            doc! { "name": "moon", "value": "Hello", "n": 2 },
            doc! { "name": "world", "value": "Bye", "n": 3 },
            doc! { "name": "sun", "value": "Hi", "n": 4.5 },
        ]
    }

    #[test]
    fn match_then_group_with_accumulators() {
        let result = run_pipeline(greetings(), &[
            doc! { "$match": { "name": { "$ne": "sun" } } },
            doc! { "$group": {
                "_id": "$name",
                "total": { "$sum": "$n" },
                "count": { "$count": {} },
                "values": { "$push": "$value" },
                "first": { "$first": "$value" },
                "max": { "$max": "$n" },
            } },
            doc! { "$sort": { "_id": 1 } },
        ])
        .unwrap();

        assert_eq!(result, vec![
            doc! { "_id": "moon", "total": 2, "count": 1, "values": ["Hello"], "first": "Hello", "max": 2 },
            doc! { "_id": "world", "total": 4, "count": 2, "values": ["Hello", "Bye"], "first": "Hello", "max": 3 },
        ]);
    }

    #[test]
    fn sum_widens_to_double() {
        let result = run_pipeline(greetings(), &[
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$n" }, "avg": { "$avg": "$n" } } },
        ])
        .unwrap();

        assert_eq!(result, vec![doc! { "_id": Bson::Null, "total": 10.5, "avg": 2.625 }]);
    }

    #[test]
    fn sum_overflow_widens_to_double() {
        let documents = vec![
            doc! { "n": i64::MAX },
            doc! { "n": 1 },
            doc! { "n": 1i64 },
        ];

        let result = run_pipeline(documents, &[
            doc! { "$group": { "_id": Bson::Null, "s": { "$sum": "$n" } } },
        ])
        .unwrap();

        assert_eq!(result, vec![doc! { "_id": Bson::Null, "s": 9223372036854775808.0 }]);
    }

    #[test]
    fn add_to_set_deduplicates() {
        let result = run_pipeline(greetings(), &[
            doc! { "$group": { "_id": Bson::Null, "values": { "$addToSet": "$value" } } },
        ])
        .unwrap();

        assert_eq!(result[0].get_array("values").unwrap().len(), 3);
    }

    #[test]
    fn redact_keeps_and_prunes() {
        let result = run_pipeline(greetings(), &[
            doc! { "$redact": { "$cond": [{ "$eq": ["$value", "Hello"] }, "$$KEEP", "$$PRUNE"] } },
        ])
        .unwrap();

        let names = result
            .iter()
            .map(|d| d.get_str("name").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["world", "moon"]);
    }

    #[test]
    fn redact_accepts_document_form_and_descend() {
        let result = run_pipeline(greetings(), &[
            doc! { "$redact": { "$cond": {
                "if": { "$and": [{ "$gt": ["$n", 1] }, { "$in": ["$value", ["Hello", "Bye"]] }] },
                "then": "$$DESCEND",
                "else": "$$PRUNE",
            } } },
        ])
        .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[test]
    fn redact_rejects_other_results() {
        assert!(matches!(
            run_pipeline(greetings(), &[doc! { "$redact": "$name" }]),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn skip_and_limit() {
        let result = run_pipeline(greetings(), &[
            doc! { "$sort": { "n": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 2 },
        ])
        .unwrap();

        assert_eq!(result.iter().map(|d| d.get_str("name").unwrap()).collect::<Vec<_>>(), vec!["world", "moon"]);
    }

    #[test]
    fn unknown_stage_is_a_backend_error() {
        assert!(matches!(
            run_pipeline(greetings(), &[doc! { "$lookup": {} }]),
            Err(DocumentStoreError::Backend(_))
        ));
    }

    #[test]
    fn group_by_compound_key() {
        let result = run_pipeline(greetings(), &[
            doc! { "$group": { "_id": { "value": "$value" }, "names": { "$push": "$name" } } },
        ])
        .unwrap();

        assert_eq!(result[0], doc! { "_id": { "value": "Hello" }, "names": ["world", "moon"] });
    }
}

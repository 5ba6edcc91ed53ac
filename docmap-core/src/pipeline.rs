//! Aggregation pipeline construction.
//!
//! The client only shapes pipelines; the backend executes them. Two shapes are supported,
//! both with a fixed stage order:
//!
//! - **grouped**: `$match` → `$group` → `$sort` (sort only when a sort spec is given)
//! - **redacted**: `$match` → `$redact` → `$sort` (sort only when a sort spec is given)

use bson::{Document, doc};

/// Keeps a document in a `$redact` stage.
pub const REDACT_KEEP: &str = "$$KEEP";
/// Drops a document in a `$redact` stage.
pub const REDACT_PRUNE: &str = "$$PRUNE";

/// A single aggregation stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Filters documents using a filter document.
    Match(Document),
    /// Groups documents by the `_id` expression of the group spec.
    Group(Document),
    /// Keeps documents for which the condition holds and prunes the rest.
    Redact(Document),
    /// Sorts documents by the given sort spec.
    Sort(Document),
}

impl Stage {
    /// Returns the stage operator name.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Group(_) => "$group",
            Stage::Redact(_) => "$redact",
            Stage::Sort(_) => "$sort",
        }
    }

    /// Converts this stage into its store document.
    pub fn to_document(&self) -> Document {
        match self {
            Stage::Match(filter) => doc! { "$match": filter },
            Stage::Group(spec) => doc! { "$group": spec },
            Stage::Redact(condition) => doc! {
                "$redact": { "$cond": [condition, REDACT_KEEP, REDACT_PRUNE] },
            },
            Stage::Sort(spec) => doc! { "$sort": spec },
        }
    }
}

/// An ordered list of aggregation stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Builds a match → group → sort pipeline.
    ///
    /// The sort stage is omitted entirely when `sort` is empty.
    pub fn grouped(filter: Document, group: Document, sort: Document) -> Self {
        Self { stages: vec![Stage::Match(filter), Stage::Group(group)] }
            .with_sort(sort)
    }

    /// Builds a match → redact → sort pipeline.
    ///
    /// `condition` is an aggregation expression; documents for which it evaluates to
    /// true are kept, the rest are pruned. The sort stage is omitted entirely when
    /// `sort` is empty.
    pub fn redacted(filter: Document, condition: Document, sort: Document) -> Self {
        Self { stages: vec![Stage::Match(filter), Stage::Redact(condition)] }
            .with_sort(sort)
    }

    fn with_sort(mut self, sort: Document) -> Self {
        if !sort.is_empty() {
            self.stages.push(Stage::Sort(sort));
        }
        self
    }

    /// Returns the stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Converts the pipeline into the store representation.
    pub fn into_documents(self) -> Vec<Document> {
        self.stages
            .iter()
            .map(Stage::to_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pipeline: &Pipeline) -> Vec<&'static str> {
        pipeline
            .stages()
            .iter()
            .map(Stage::name)
            .collect()
    }

    #[test]
    fn grouped_pipeline_without_sort_has_two_stages() {
        let pipeline = Pipeline::grouped(
            doc! { "name": "world" },
            doc! { "_id": "$name", "count": { "$sum": 1 } },
            doc! {},
        );

        assert_eq!(names(&pipeline), vec!["$match", "$group"]);
    }

    #[test]
    fn grouped_pipeline_appends_sort_last() {
        let pipeline = Pipeline::grouped(
            doc! {},
            doc! { "_id": "$name" },
            doc! { "_id": 1 },
        );

        assert_eq!(names(&pipeline), vec!["$match", "$group", "$sort"]);
        assert_eq!(
            pipeline.into_documents(),
            vec![
                doc! { "$match": {} },
                doc! { "$group": { "_id": "$name" } },
                doc! { "$sort": { "_id": 1 } },
            ]
        );
    }

    #[test]
    fn redacted_pipeline_wraps_condition() {
        let condition = doc! { "$eq": ["$value", "Hello"] };
        let pipeline = Pipeline::redacted(doc! { "name": "world" }, condition.clone(), doc! {});

        assert_eq!(names(&pipeline), vec!["$match", "$redact"]);
        assert_eq!(
            pipeline.into_documents()[1],
            doc! { "$redact": { "$cond": [condition, "$$KEEP", "$$PRUNE"] } }
        );
    }

    #[test]
    fn redacted_pipeline_appends_sort_last() {
        let pipeline = Pipeline::redacted(doc! {}, doc! { "$eq": [1, 1] }, doc! { "name": -1 });

        assert_eq!(names(&pipeline), vec!["$match", "$redact", "$sort"]);
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn construction_is_deterministic() {
        let build = || Pipeline::grouped(doc! { "a": 1 }, doc! { "_id": "$a" }, doc! { "b": 1 });

        assert_eq!(build(), build());
    }
}

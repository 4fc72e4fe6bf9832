use std::fmt;

use bson::{Bson, Document};

use crate::expression::Expression;

/// A filter document that uses an operator or shape the evaluator cannot run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl FilterParseError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a MongoDB-style filter into an [`Expression`].
///
/// Sibling keys are ANDed. A plain value is an equality test; a sub-document
/// whose first key starts with `$` is a set of operators on that field.
/// Only `$and` and `$or` are accepted at the top level. `{}` matches
/// everything.
pub fn parse_filter(doc: &Document) -> Result<Expression<'_>, FilterParseError> {
    let clauses = doc
        .iter()
        .map(|(key, value)| match key.as_str() {
            "$and" => branches(key, value).map(Expression::And),
            "$or" => branches(key, value).map(Expression::Or),
            op if op.starts_with('$') => Err(FilterParseError::new(format!(
                "unsupported top-level operator {op}"
            ))),
            field => condition(field, value),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(conjunction(clauses))
}

fn conjunction(mut clauses: Vec<Expression<'_>>) -> Expression<'_> {
    match clauses.len() {
        0 => Expression::All,
        1 => clauses.swap_remove(0),
        _ => Expression::And(clauses),
    }
}

fn branches<'a>(op: &str, value: &'a Bson) -> Result<Vec<Expression<'a>>, FilterParseError> {
    let Bson::Array(items) = value else {
        return Err(FilterParseError::new(format!("{op} takes an array of filters")));
    };
    if items.is_empty() {
        return Err(FilterParseError::new(format!("{op} needs at least one filter")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(sub) => parse_filter(sub),
            other => Err(FilterParseError::new(format!(
                "{op} entries must be documents, got {other}"
            ))),
        })
        .collect()
}

fn condition<'a>(field: &'a str, value: &'a Bson) -> Result<Expression<'a>, FilterParseError> {
    match value {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            let clauses = ops
                .iter()
                .map(|(op, operand)| operator(field, op, operand))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conjunction(clauses))
        }
        _ => Ok(Expression::Eq(field, value)),
    }
}

fn operator<'a>(
    field: &'a str,
    op: &str,
    operand: &'a Bson,
) -> Result<Expression<'a>, FilterParseError> {
    let expr = match op {
        "$eq" => Expression::Eq(field, operand),
        "$ne" => Expression::Ne(field, operand),
        "$gt" => Expression::Gt(field, operand),
        "$gte" => Expression::Gte(field, operand),
        "$lt" => Expression::Lt(field, operand),
        "$lte" => Expression::Lte(field, operand),
        "$in" => Expression::In(field, members(op, operand)?),
        "$nin" => Expression::Nin(field, members(op, operand)?),
        "$exists" => Expression::Exists(field, truthy(operand)?),
        other => {
            return Err(FilterParseError::new(format!(
                "unsupported operator {other} on {field}"
            )));
        }
    };
    Ok(expr)
}

fn members<'a>(op: &str, operand: &'a Bson) -> Result<Vec<&'a Bson>, FilterParseError> {
    match operand {
        Bson::Array(values) => Ok(values.iter().collect()),
        other => Err(FilterParseError::new(format!("{op} takes an array, got {other}"))),
    }
}

// The shell accepts `1`/`0` for `$exists` as well as booleans.
fn truthy(operand: &Bson) -> Result<bool, FilterParseError> {
    match operand {
        Bson::Boolean(b) => Ok(*b),
        Bson::Int32(n) => Ok(*n != 0),
        Bson::Int64(n) => Ok(*n != 0),
        other => Err(FilterParseError::new(format!(
            "$exists takes a boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn parse(filter: &Document) -> Expression<'_> {
        parse_filter(filter).unwrap()
    }

    #[test]
    fn empty_filter_selects_everything() {
        assert_eq!(parse(&doc! {}), Expression::All);
    }

    #[test]
    fn plain_value_is_equality() {
        let filter = doc! { "status": "active" };
        assert_eq!(
            parse(&filter),
            Expression::Eq("status", &Bson::String("active".into()))
        );
    }

    #[test]
    fn sibling_fields_are_anded() {
        let filter = doc! { "status": "active", "tier": 2 };
        let Expression::And(clauses) = parse(&filter) else {
            panic!("expected a conjunction");
        };
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn exists_accepts_booleans_and_numbers() {
        let filter = doc! { "url": { "$exists": true } };
        assert_eq!(parse(&filter), Expression::Exists("url", true));
        let filter = doc! { "url": { "$exists": 0 } };
        assert_eq!(parse(&filter), Expression::Exists("url", false));
        let filter = doc! { "url": { "$exists": "yes" } };
        assert!(parse_filter(&filter).is_err());
    }

    #[test]
    fn in_collects_operands() {
        let filter = doc! { "_id": { "$in": [1, 2, 3] } };
        let Expression::In("_id", values) = parse(&filter) else {
            panic!("expected $in on _id");
        };
        assert_eq!(values.len(), 3);

        let scalar = doc! { "_id": { "$in": 1 } };
        let err = parse_filter(&scalar).unwrap_err();
        assert!(err.0.contains("$in takes an array"));
    }

    #[test]
    fn range_on_one_field() {
        let filter = doc! { "age": { "$gte": 18, "$lt": 65 } };
        assert_eq!(
            parse(&filter),
            Expression::And(vec![
                Expression::Gte("age", &Bson::Int32(18)),
                Expression::Lt("age", &Bson::Int32(65)),
            ])
        );
    }

    #[test]
    fn or_of_subfilters() {
        let filter = doc! { "$or": [ { "a": 1 }, { "b": 2 } ] };
        let Expression::Or(branches) = parse(&filter) else {
            panic!("expected a disjunction");
        };
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn embedded_document_compares_whole() {
        let filter = doc! { "meta": { "source": "feed" } };
        assert!(matches!(
            parse(&filter),
            Expression::Eq("meta", Bson::Document(d)) if d.len() == 1
        ));
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(parse_filter(&doc! { "$where": "1 == 1" }).is_err());
        assert!(parse_filter(&doc! { "$or": [] }).is_err());
        assert!(parse_filter(&doc! { "$and": [1] }).is_err());

        let err = parse_filter(&doc! { "a": { "$near": 1 } }).unwrap_err();
        assert_eq!(err.to_string(), "invalid filter: unsupported operator $near on a");
    }
}

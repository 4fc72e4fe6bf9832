use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::expression::Expression;

/// Resolve a dot-separated path inside a document.
///
/// Only descends through embedded documents; array positions are not
/// addressable by path.
pub fn get_path<'d>(doc: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        match current {
            Bson::Document(sub) => current = sub.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Evaluate whether a document matches the given expression.
pub fn matches(doc: &Document, expr: &Expression) -> bool {
    match expr {
        Expression::All => true,
        Expression::And(children) => children.iter().all(|child| matches(doc, child)),
        Expression::Or(children) => children.iter().any(|child| matches(doc, child)),
        Expression::Eq(field, val) => field_eq(doc, field, val),
        Expression::Ne(field, val) => !field_eq(doc, field, val),
        Expression::In(field, values) => values.iter().any(|val| field_eq(doc, field, val)),
        Expression::Nin(field, values) => !values.iter().any(|val| field_eq(doc, field, val)),
        Expression::Gt(field, val)
        | Expression::Gte(field, val)
        | Expression::Lt(field, val)
        | Expression::Lte(field, val) => {
            let predicate: fn(Ordering) -> bool = match expr {
                Expression::Gt(..) => |o| o == Ordering::Greater,
                Expression::Gte(..) => |o| o != Ordering::Less,
                Expression::Lt(..) => |o| o == Ordering::Less,
                _ => |o| o != Ordering::Greater,
            };
            match get_path(doc, field) {
                Some(Bson::Array(arr)) => arr
                    .iter()
                    .any(|elem| value_cmp(elem, val).is_some_and(predicate)),
                Some(stored) => value_cmp(stored, val).is_some_and(predicate),
                None => false,
            }
        }
        Expression::Exists(field, expected) => {
            // $exists checks physical presence; an explicit null counts as present
            get_path(doc, field).is_some() == *expected
        }
    }
}

fn field_eq(doc: &Document, field: &str, val: &Bson) -> bool {
    match get_path(doc, field) {
        // $eq: null matches both missing fields and explicit null values
        None => matches!(val, Bson::Null),
        Some(Bson::Array(arr)) if !matches!(val, Bson::Array(_)) => {
            arr.iter().any(|elem| value_eq(elem, val))
        }
        Some(stored) => value_eq(stored, val),
    }
}

/// Equality with numeric cross-type coercion; everything else compares structurally.
pub fn value_eq(stored: &Bson, query: &Bson) -> bool {
    match (as_f64(stored), as_f64(query)) {
        (Some(a), Some(b)) => a == b,
        _ => stored == query,
    }
}

fn value_cmp(stored: &Bson, query: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_f64(stored), as_f64(query)) {
        return a.partial_cmp(&b);
    }
    match (stored, query) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        // Incompatible types: silent exclusion
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_filter;
    use bson::doc;

    fn check(doc: &Document, filter: Document) -> bool {
        let expr = parse_filter(&filter).unwrap();
        matches(doc, &expr)
    }

    #[test]
    fn get_path_descends_into_subdocuments() {
        let doc = doc! { "meta": { "source": { "name": "feed" } } };
        assert_eq!(
            get_path(&doc, "meta.source.name"),
            Some(&Bson::String("feed".into()))
        );
        assert_eq!(get_path(&doc, "meta.missing"), None);
        assert_eq!(get_path(&doc, "meta.source.name.deeper"), None);
    }

    #[test]
    fn exists_counts_null_as_present() {
        let doc = doc! { "_id": 1, "url": Bson::Null };
        assert!(check(&doc, doc! { "url": { "$exists": true } }));
        assert!(!check(&doc, doc! { "title": { "$exists": true } }));
        assert!(check(&doc, doc! { "title": { "$exists": false } }));
    }

    #[test]
    fn eq_null_matches_missing() {
        let doc = doc! { "_id": 1 };
        assert!(check(&doc, doc! { "url": Bson::Null }));
    }

    #[test]
    fn eq_numeric_cross_type() {
        let doc = doc! { "_id": 1, "score": 5_i64 };
        assert!(check(&doc, doc! { "score": 5 }));
        assert!(check(&doc, doc! { "score": 5.0 }));
    }

    #[test]
    fn eq_matches_array_element() {
        let doc = doc! { "_id": 1, "tags": ["a", "b"] };
        assert!(check(&doc, doc! { "tags": "b" }));
        assert!(!check(&doc, doc! { "tags": "c" }));
    }

    #[test]
    fn in_and_nin() {
        let doc = doc! { "_id": 3, "status": "active" };
        assert!(check(&doc, doc! { "_id": { "$in": [1, 3] } }));
        assert!(!check(&doc, doc! { "_id": { "$in": [1, 2] } }));
        assert!(check(&doc, doc! { "status": { "$nin": ["deleted"] } }));
    }

    #[test]
    fn range_operators() {
        let doc = doc! { "_id": 1, "age": 30 };
        assert!(check(&doc, doc! { "age": { "$gte": 30, "$lt": 31 } }));
        assert!(!check(&doc, doc! { "age": { "$gt": 30 } }));
        assert!(!check(&doc, doc! { "age": { "$gt": "20" } }));
    }

    #[test]
    fn or_of_conditions() {
        let doc = doc! { "_id": 1, "a": 1 };
        assert!(check(&doc, doc! { "$or": [ { "a": 2 }, { "a": 1 } ] }));
        assert!(!check(&doc, doc! { "$and": [ { "a": 1 }, { "b": 1 } ] }));
    }

    #[test]
    fn ne_treats_missing_as_not_equal() {
        let doc = doc! { "_id": 1 };
        assert!(check(&doc, doc! { "status": { "$ne": "active" } }));
    }
}

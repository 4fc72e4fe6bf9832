use bson::Bson;

/// A recursive filter expression tree.
///
/// Borrows field names and operands from the filter document it was parsed
/// from, so the lifetime `'a` is tied to that `bson::Document`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<'a> {
    // Logical
    And(Vec<Expression<'a>>),
    Or(Vec<Expression<'a>>),
    // Comparison
    Eq(&'a str, &'a Bson),
    Ne(&'a str, &'a Bson),
    Gt(&'a str, &'a Bson),
    Gte(&'a str, &'a Bson),
    Lt(&'a str, &'a Bson),
    Lte(&'a str, &'a Bson),
    // Set membership
    In(&'a str, Vec<&'a Bson>),
    Nin(&'a str, Vec<&'a Bson>),
    // Existence
    Exists(&'a str, bool),
    /// Matches every document. Produced by an empty filter document.
    All,
}

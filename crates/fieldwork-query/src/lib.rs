mod eval;
mod expression;
mod parse_filter;
mod projection;

pub use eval::{get_path, matches, value_eq};
pub use expression::Expression;
pub use parse_filter::{FilterParseError, parse_filter};
pub use projection::Projection;

/// Name of the identifier field every document carries.
pub const ID_FIELD: &str = "_id";

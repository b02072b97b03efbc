pub mod extract;
pub mod model;

pub use extract::{extract, flatten_query, format_elapsed, parse_annotation};
pub use model::*;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

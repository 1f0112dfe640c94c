//! Query translation for JSON:API collection endpoints.
//!
//! Turns the raw query string of a request into a normalized
//! [`QueryDescriptor`], enforcing the controller's [`QueryPolicy`]
//! allow-lists and the configured [`Pagination`] ceiling.
//!
//! ```ignore
//! use crudapi_query::{Pagination, QueryPolicy, QueryTranslator};
//!
//! let policy = QueryPolicy::new().allow_filters(["status"]).allow_sorts(["createdAt"]);
//! let translator = QueryTranslator::new(policy, Pagination::new(20, 100));
//! let query = translator.parse("filter[status]=published&sort=-createdAt&page[limit]=1000")?;
//! assert_eq!(query.page.limit, 100);
//! ```

pub mod descriptor;
pub mod filter;
pub mod parser;
pub mod policy;

pub use descriptor::{
    FilterCondition, FilterMap, FilterOperator, FilterValue, IncludePath, Page, QueryDescriptor,
    SortDirection, SortField,
};
pub use filter::parse_filter_object;
pub use parser::{QueryError, QueryTranslator, parse_query};
pub use policy::{OnDisallowed, Pagination, QueryPolicy};

//! Query translation: filters, identifiers and request descriptors.

pub mod compiler;
pub mod filter;
pub mod identifier;
pub mod request;

pub use compiler::{FilterCompiler, FilterParams, EARLIEST_YEAR};
pub use filter::{FilterClause, FilterExpression, FilterOp, Operator};
pub use identifier::{Identifier, LookupTarget};
pub use request::{
    Cursor, Limits, PageMode, SearchRequest, SortDirection, SortSpec, CURSOR_EXHAUSTED,
    CURSOR_START, MAX_OFFSET_RESULTS, MAX_PAGE_SIZE,
};

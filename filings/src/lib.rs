//! IRS Form 990 filings: the normalized [`Document`] model and the XML
//! parser that produces it.

pub mod errors;
pub mod parse;
mod scan;
pub mod types;

pub use errors::{FilingError, Result};
pub use parse::{parse_dir, parse_file, parse_filing};
pub use types::{Document, ParseOutcome, ParsedSegment, ReturnTypeTally, SkipReason};

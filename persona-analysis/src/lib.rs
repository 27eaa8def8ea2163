pub mod citation;
pub mod keywords;
pub mod stats;

pub use citation::{Citation, CitationMap, CitationMapper, CitedItem, Highlight};
pub use stats::ActivityStats;

//! Wires the fetcher, prompt builder, model client and report writer into
//! one linear run.

pub mod pipeline;
pub mod profile_url;

pub use pipeline::{PersonaPipeline, Pipeline};
pub use profile_url::parse_profile_input;

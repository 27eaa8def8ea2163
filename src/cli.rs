//! Command-line arguments.

use clap::Parser;
use persona_core::Settings;
use std::path::PathBuf;

/// Generates a personality persona for a Reddit user from their public
/// posts and comments.
#[derive(Debug, Parser)]
#[command(version, long_about = None)]
pub struct Args {
    /// Reddit profile URL or username; prompted for when omitted
    pub profile: Option<String>,

    /// Maximum number of posts to analyze
    #[arg(long, value_name = "N")]
    pub max_posts: Option<usize>,

    /// Maximum number of comments to analyze
    #[arg(long, value_name = "N")]
    pub max_comments: Option<usize>,

    /// Directory the report is written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// TOML settings file (overrides PERSONA_CONFIG)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Flags win over the settings file.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(max_posts) = self.max_posts {
            settings.max_posts = max_posts;
        }
        if let Some(max_comments) = self.max_comments {
            settings.max_comments = max_comments;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
    }
}

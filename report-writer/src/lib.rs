use chrono::{DateTime, Utc};
use persona_analysis::{ActivityStats, CitationMap, Highlight};
use persona_core::{CoreError, PersonaResult, UserProfile};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

const RULE_WIDTH: usize = 80;
const TOP_SUBREDDITS: usize = 10;
const TOP_KEYWORDS: usize = 15;

/// Everything that goes into one persona report.
#[derive(Debug, Clone)]
pub struct Report {
    pub profile: UserProfile,
    pub persona: PersonaResult,
    pub citations: CitationMap,
    pub stats: ActivityStats,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(f, "{}", rule)?;
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", rule)?;
    writeln!(f)
}

fn highlight_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[Highlight]) -> fmt::Result {
    writeln!(f, "{}:", title)?;
    if items.is_empty() {
        writeln!(f, "- none")?;
    }
    for item in items {
        writeln!(f, "- [{}:{}] {}", item.kind, item.id, item.snippet)?;
        writeln!(f, "  URL: {} (Score: {})", item.url, item.score)?;
    }
    writeln!(f)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        heading(f, "USER INFORMATION")?;
        writeln!(f, "Generated on: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Username: {}", self.profile.username)?;
        writeln!(f, "Account Created: {}", self.profile.created_utc.format("%Y-%m-%d"))?;
        writeln!(f, "Total Karma: {}", self.profile.total_karma())?;
        writeln!(f)?;

        heading(f, "GENERATED PERSONA")?;
        writeln!(f, "{}", self.persona.raw)?;
        writeln!(f)?;

        heading(f, "ANALYSIS DATA")?;
        writeln!(f, "Posts analyzed: {}", self.stats.post_count)?;
        writeln!(f, "Comments analyzed: {}", self.stats.comment_count)?;
        writeln!(f, "Subreddits active in: {}", self.stats.total_subreddits())?;
        match self.stats.post_comment_ratio() {
            Some(ratio) => writeln!(f, "Post/comment ratio: {:.2}", ratio)?,
            None => writeln!(f, "Post/comment ratio: n/a")?,
        }
        if let Some(gap) = self.stats.avg_time_between_posts {
            writeln!(f, "Average time between posts: {:.1} hours", gap.num_minutes() as f64 / 60.0)?;
        }
        writeln!(f)?;

        writeln!(f, "Top Subreddits:")?;
        for (name, count) in self.stats.top_subreddits(TOP_SUBREDDITS) {
            writeln!(f, "- r/{}: {} interactions", name, count)?;
        }
        writeln!(f)?;

        writeln!(f, "Top Interests (Keywords):")?;
        for (word, count) in self.stats.top_keywords(TOP_KEYWORDS) {
            writeln!(f, "- {}: {} mentions", word, count)?;
        }
        writeln!(f)?;

        heading(f, "CITATIONS")?;
        for citation in &self.citations.citations {
            writeln!(f, "{}:", citation.label)?;
            if citation.items.is_empty() {
                writeln!(f, "- no supporting posts or comments found")?;
            }
            for item in &citation.items {
                let how = if item.explicit { ", cited by id" } else { "" };
                writeln!(
                    f,
                    "- [{}:{}] r/{} (overlap {:.2}{})",
                    item.kind, item.id, item.subreddit, item.score, how
                )?;
                writeln!(f, "  \"{}\"", item.snippet)?;
                writeln!(f, "  URL: {}", item.url)?;
            }
            writeln!(f)?;
        }

        highlight_list(f, "High-Scoring Posts", &self.citations.highlighted_posts)?;
        highlight_list(f, "High-Scoring Comments", &self.citations.highlighted_comments)
    }
}

/// `persona_{username}.txt`, with anything outside `[A-Za-z0-9_-]` replaced.
pub fn file_name_for(username: &str) -> String {
    let safe: String = username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("persona_{}.txt", safe)
}

/// Writes reports into one directory. A report is rendered into a temporary
/// file next to its destination and only renamed into place once complete.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, username: &str) -> PathBuf {
        self.output_dir.join(file_name_for(username))
    }

    pub fn write(&self, report: &Report) -> Result<PathBuf, CoreError> {
        let path = self.path_for(&report.profile.username);
        let write_error = |source: std::io::Error| {
            error!("Failed to write report {}: {}", path.display(), source);
            CoreError::ReportWrite {
                path: path.display().to_string(),
                source,
            }
        };

        let rendered = report.render();
        debug!("Rendered report for {} ({} bytes)", report.profile.username, rendered.len());

        let mut temp = NamedTempFile::new_in(&self.output_dir).map_err(write_error)?;
        temp.write_all(rendered.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&path).map_err(|e| write_error(e.error))?;

        info!("Persona report saved to {}", path.display());
        Ok(path)
    }
}

use crate::keywords::WordFrequencies;
use chrono::Duration;
use persona_core::ActivityBatch;
use std::collections::HashMap;

pub const TOP_KEYWORD_COUNT: usize = 20;

/// Aggregate figures about one user's fetched activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityStats {
    pub post_count: usize,
    pub comment_count: usize,
    /// Sorted by count (descending), then name.
    pub subreddit_counts: Vec<(String, usize)>,
    pub avg_time_between_posts: Option<Duration>,
    pub top_keywords: Vec<(String, usize)>,
    pub total_words: usize,
    pub unique_words: usize,
}

impl ActivityStats {
    pub fn from_batch(batch: &ActivityBatch) -> Self {
        let mut per_subreddit: HashMap<&str, usize> = HashMap::new();
        let mut frequencies = WordFrequencies::default();

        for item in batch.iter() {
            *per_subreddit.entry(item.subreddit.as_str()).or_insert(0) += 1;
            frequencies.add_text(&item.text());
        }

        let mut subreddit_counts: Vec<(String, usize)> = per_subreddit
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        subreddit_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            post_count: batch.post_count(),
            comment_count: batch.comment_count(),
            subreddit_counts,
            avg_time_between_posts: average_gap(batch),
            top_keywords: frequencies.top(TOP_KEYWORD_COUNT),
            total_words: frequencies.total_words(),
            unique_words: frequencies.unique_words(),
        }
    }

    pub fn total_subreddits(&self) -> usize {
        self.subreddit_counts.len()
    }

    pub fn top_subreddits(&self, n: usize) -> &[(String, usize)] {
        &self.subreddit_counts[..n.min(self.subreddit_counts.len())]
    }

    pub fn top_keywords(&self, n: usize) -> &[(String, usize)] {
        &self.top_keywords[..n.min(self.top_keywords.len())]
    }

    /// Posts per comment. `None` when there are no comments.
    pub fn post_comment_ratio(&self) -> Option<f64> {
        if self.comment_count == 0 {
            None
        } else {
            Some(self.post_count as f64 / self.comment_count as f64)
        }
    }
}

fn average_gap(batch: &ActivityBatch) -> Option<Duration> {
    let mut times: Vec<_> = batch.posts().iter().map(|p| p.created_utc).collect();
    if times.len() < 2 {
        return None;
    }
    times.sort();
    let span = *times.last()? - *times.first()?;
    Some(span / (times.len() as i32 - 1))
}
